use anyhow::{anyhow, Context, Result};
use bitcoin::{Address, Amount, Network};
use std::str::FromStr;

use crate::services::onchain::redirect::RedirectPolicy;

pub const DUST_LIMIT_SATS: u64 = 546;
pub const DEFAULT_SWEEP_FEE_RATE: u64 = 50;
pub const DEFAULT_PORT: u16 = 3020;

/// Process-wide settings, passed explicitly into the engine so a test and a production
/// configuration can live side by side.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub network: Network,
    pub esplora_url: String,
    pub dust_limit: Amount,
    pub redirect: Option<RedirectPolicy>,
    /// sat/vB used by sweeps
    pub sweep_fee_rate: u64,
    pub port: u16,
}

impl EngineConfig {
    pub fn new(network: Network) -> Self {
        Self {
            network,
            esplora_url: default_esplora_url(network).to_string(),
            dust_limit: Amount::from_sat(DUST_LIMIT_SATS),
            redirect: None,
            sweep_fee_rate: DEFAULT_SWEEP_FEE_RATE,
            port: DEFAULT_PORT,
        }
    }

    pub fn with_redirect(mut self, redirect: RedirectPolicy) -> Self {
        self.redirect = Some(redirect);
        self
    }

    pub fn with_sweep_fee_rate(mut self, sat_per_vb: u64) -> Self {
        self.sweep_fee_rate = sat_per_vb;
        self
    }

    pub fn from_env() -> Result<Self> {
        // load env vars
        dotenv::dotenv().ok();

        let network = parse_network(
            &std::env::var("BITCOIN_NETWORK").unwrap_or_else(|_| "regtest".to_string()),
        );
        let mut config = Self::new(network);

        if let Ok(url) = std::env::var("ESPLORA_URL") {
            config.esplora_url = url;
        }

        if let Ok(rate) = std::env::var("SWEEP_FEE_RATE") {
            config.sweep_fee_rate = rate
                .parse::<u64>()
                .ok()
                .filter(|r| *r > 0)
                .ok_or_else(|| anyhow!("SWEEP_FEE_RATE must be a positive integer, got {}", rate))?;
        }

        if let Ok(port) = std::env::var("PORT") {
            config.port = port.parse::<u16>().context("PORT must be a number")?;
        }

        let threshold = std::env::var("REDIRECT_THRESHOLD_SATS").ok();
        let address = std::env::var("REDIRECT_ADDRESS").ok();
        config.redirect = match (threshold, address) {
            (Some(threshold), Some(address)) => {
                let threshold = threshold
                    .parse::<u64>()
                    .context("REDIRECT_THRESHOLD_SATS must be a number of satoshis")?;
                let address = Address::from_str(&address)
                    .context("REDIRECT_ADDRESS is not a valid address")?
                    .require_network(network)
                    .context("REDIRECT_ADDRESS belongs to a different network")?;
                Some(RedirectPolicy::new(Amount::from_sat(threshold), address))
            }
            (None, None) => None,
            _ => {
                return Err(anyhow!(
                    "REDIRECT_THRESHOLD_SATS and REDIRECT_ADDRESS must be set together"
                ))
            }
        };

        Ok(config)
    }
}

pub fn parse_network(name: &str) -> Network {
    match name {
        "mainnet" => Network::Bitcoin,
        "testnet" => Network::Testnet,
        "signet" => Network::Signet,
        _ => Network::Regtest,
    }
}

fn default_esplora_url(network: Network) -> &'static str {
    match network {
        Network::Bitcoin => "https://blockstream.info/api",
        Network::Testnet => "https://blockstream.info/testnet/api",
        Network::Signet => "https://mempool.space/signet/api",
        _ => "http://localhost:3000",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_network_defaults_to_regtest() {
        assert_eq!(parse_network("mainnet"), Network::Bitcoin);
        assert_eq!(parse_network("testnet"), Network::Testnet);
        assert_eq!(parse_network("signet"), Network::Signet);
        assert_eq!(parse_network("anything"), Network::Regtest);
    }

    #[test]
    fn test_new_config_has_no_redirect() {
        let config = EngineConfig::new(Network::Testnet);
        assert!(config.redirect.is_none());
        assert_eq!(config.dust_limit, Amount::from_sat(546));
        assert_eq!(config.sweep_fee_rate, 50);
        assert_eq!(config.esplora_url, "https://blockstream.info/testnet/api");
    }
}
