use bitcoin::Network;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::services::chain::ChainData;

#[derive(Debug, Deserialize)]
struct MempoolSpaceFees {
    #[serde(rename = "fastestFee")]
    fastest_fee: u64,
    #[serde(rename = "halfHourFee")]
    half_hour_fee: u64,
    #[serde(rename = "hourFee")]
    hour_fee: u64,
    #[serde(rename = "economyFee")]
    economy_fee: u64,
    #[serde(rename = "minimumFee")]
    minimum_fee: u64,
}

/// Suggested sat/vB rates for a caller choosing a fee. Advisory only, the engine
/// always uses the rate the caller passes in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeEstimates {
    pub fastest: u64, // next block
    pub fast: u64,    // 2-3 blocks
    pub normal: u64,  // 6 blocks
    pub slow: u64,    // 12-24 blocks
    pub minimum: u64,
    pub source: String,
    pub timestamp: i64,
}

#[derive(Debug, Clone)]
struct CachedFeeEstimates {
    estimates: FeeEstimates,
    last_updated: Instant,
}

impl FeeEstimates {
    /// Esplora's confirmation-target map, rounded up to whole sat/vB.
    fn from_targets(targets: &HashMap<u16, f64>, fallback: &FeeEstimates) -> Self {
        let rate = |target: u16, default: u64| {
            targets
                .get(&target)
                .map(|r| (r.ceil() as u64).max(1))
                .unwrap_or(default)
        };
        Self {
            fastest: rate(1, fallback.fastest),
            fast: rate(3, fallback.fast),
            normal: rate(6, fallback.normal),
            slow: rate(144, fallback.slow),
            minimum: 1,
            source: "esplora".to_string(),
            timestamp: chrono::Utc::now().timestamp(),
        }
    }
}

pub struct FeeEstimator {
    chain: Arc<dyn ChainData>,
    http_client: reqwest::Client,
    network: Network,
    cache: RwLock<Option<CachedFeeEstimates>>,
    cache_duration: Duration,
}

impl FeeEstimator {
    pub fn new(chain: Arc<dyn ChainData>, network: Network) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("Falling back to default HTTP client: {}", e);
                reqwest::Client::new()
            });

        Self {
            chain,
            http_client,
            network,
            cache: RwLock::new(None),
            cache_duration: Duration::from_secs(300), // 5 minutes
        }
    }

    /// Never fails: sources are tried in order and the network defaults close the chain.
    pub async fn get_fee_estimates(&self) -> FeeEstimates {
        if let Some(cached) = self.get_cached_estimates() {
            return cached;
        }

        let estimates = self.try_multiple_sources().await;
        self.cache_estimates(estimates.clone());
        estimates
    }

    async fn try_multiple_sources(&self) -> FeeEstimates {
        if matches!(self.network, Network::Bitcoin | Network::Testnet) {
            match self.fetch_mempool_space_estimates().await {
                Ok(estimates) => return estimates,
                Err(e) => tracing::warn!("mempool.space fee estimates unavailable: {}", e),
            }
        }

        match self.chain.fetch_fee_estimates().await {
            Ok(targets) if !targets.is_empty() => {
                return FeeEstimates::from_targets(&targets, &self.get_default_estimates())
            }
            Ok(_) => tracing::warn!("Chain source returned no fee estimates"),
            Err(e) => tracing::warn!("Chain fee estimates unavailable: {}", e),
        }

        tracing::warn!("Using default fee estimates for {}", self.network);
        self.get_default_estimates()
    }

    async fn fetch_mempool_space_estimates(&self) -> Result<FeeEstimates, reqwest::Error> {
        let base_url = match self.network {
            Network::Bitcoin => "https://mempool.space",
            _ => "https://mempool.space/testnet",
        };

        let url = format!("{}/api/v1/fees/recommended", base_url);
        let response: MempoolSpaceFees = self
            .http_client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(FeeEstimates {
            fastest: response.fastest_fee,
            fast: response.half_hour_fee,
            normal: response.hour_fee,
            slow: response.economy_fee,
            minimum: response.minimum_fee,
            source: "mempool.space".to_string(),
            timestamp: chrono::Utc::now().timestamp(),
        })
    }

    fn get_default_estimates(&self) -> FeeEstimates {
        let (fastest, fast, normal, slow) = match self.network {
            Network::Bitcoin => (50, 30, 20, 10),
            _ => (10, 5, 2, 1),
        };
        FeeEstimates {
            fastest,
            fast,
            normal,
            slow,
            minimum: 1,
            source: "default".to_string(),
            timestamp: chrono::Utc::now().timestamp(),
        }
    }

    fn get_cached_estimates(&self) -> Option<FeeEstimates> {
        let cache = self.cache.read();
        cache
            .as_ref()
            .filter(|cached| cached.last_updated.elapsed() < self.cache_duration)
            .map(|cached| cached.estimates.clone())
    }

    fn cache_estimates(&self, estimates: FeeEstimates) {
        *self.cache.write() = Some(CachedFeeEstimates {
            estimates,
            last_updated: Instant::now(),
        });
    }
}
