pub mod fee_estimator;
pub mod fee_model;
pub mod redirect;
pub mod replacement;
pub mod signer;
pub mod sweep;
pub mod transaction_builder;

pub use fee_estimator::{FeeEstimates, FeeEstimator};
pub use replacement::{OriginalFee, ReplacementBuilder};
pub use signer::{sign_draft, KeyLookup, KeyRing, SigningKey};
pub use sweep::SweepEngine;
pub use transaction_builder::{PaymentRequest, TransactionBuilder};

use bitcoin::consensus::encode::deserialize_hex;
use bitcoin::{Address, Amount, OutPoint, Transaction, Txid};
use std::str::FromStr;
use std::sync::Arc;

use crate::config::EngineConfig;
use crate::error::{RbfError, RbfResult};
use crate::models::requests::KeyCredential;
use crate::models::transaction::{
    BalanceResponse, CreatedTransaction, DerivedAddresses, ReplacementKind, ReplacementTransaction,
    SweepResult, TransactionDetails, TxOutResponse, UtxoResponse,
};
use crate::services::chain::ChainData;

/// Entry point for every on-chain operation. Holds no per-request state, so one
/// instance serves all requests concurrently.
pub struct RbfEngine {
    config: Arc<EngineConfig>,
    chain: Arc<dyn ChainData>,
    transaction_builder: TransactionBuilder,
    replacement_builder: ReplacementBuilder,
    sweep_engine: SweepEngine,
    fee_estimator: FeeEstimator,
}

impl RbfEngine {
    pub fn new(config: EngineConfig, chain: Arc<dyn ChainData>) -> Self {
        Self {
            transaction_builder: TransactionBuilder::new(&config),
            replacement_builder: ReplacementBuilder::new(&config),
            sweep_engine: SweepEngine::new(&config),
            fee_estimator: FeeEstimator::new(chain.clone(), config.network),
            config: Arc::new(config),
            chain,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn parse_address(&self, address: &str) -> RbfResult<Address> {
        Address::from_str(address)
            .map_err(|e| RbfError::InvalidAddress(format!("{}: {}", address, e)))?
            .require_network(self.config.network)
            .map_err(|e| RbfError::InvalidAddress(format!("{}: {}", address, e)))
    }

    pub fn parse_txid(&self, txid: &str) -> RbfResult<Txid> {
        Txid::from_str(txid).map_err(|e| RbfError::InvalidTxid(format!("{}: {}", txid, e)))
    }

    pub fn signing_key(&self, credential: &KeyCredential) -> RbfResult<SigningKey> {
        SigningKey::from_credential(credential, self.config.network)
    }

    pub fn derive_addresses(&self, key: &SigningKey) -> DerivedAddresses {
        DerivedAddresses {
            address: key.address().to_string(),
            legacy_address: key.legacy_address().to_string(),
            network: self.config.network.to_string(),
        }
    }

    /// Builds and signs a payment spending every UTXO of the key's address.
    /// The transaction is returned, not broadcast.
    pub async fn create_transaction(
        &self,
        key: &SigningKey,
        destination: Address,
        amount: Amount,
        fee_rate: u64,
        rbf: bool,
    ) -> RbfResult<CreatedTransaction> {
        let source = key.address();
        let utxos = self.chain.fetch_utxos(&source).await?;

        let request = PaymentRequest {
            destination,
            amount,
            fee_rate,
            rbf,
        };
        let built = self.transaction_builder.build_payment(&source, &utxos, &request)?;
        let signed = sign_draft(&built.draft, key)?;

        tracing::info!(
            "Created transaction {} paying {} sats to {} ({} vB, fee {} sats)",
            signed.txid,
            amount.to_sat(),
            built.destination,
            signed.vsize,
            signed.fee.to_sat()
        );

        Ok(CreatedTransaction {
            fee_rate: signed.fee_rate(),
            raw_hex: signed.hex,
            txid: signed.txid,
            fee: signed.fee.to_sat(),
            size: signed.vsize,
            rbf_enabled: rbf,
            destination: built.destination.to_string(),
            redirect: built.redirect,
        })
    }

    /// Re-spends the inputs of an unconfirmed transaction at a higher fee, either keeping
    /// its payment (accelerate) or returning everything to the key's address (cancel).
    pub async fn replace_transaction(
        &self,
        key: &SigningKey,
        original_txid: Txid,
        new_fee_rate: u64,
        kind: ReplacementKind,
    ) -> RbfResult<ReplacementTransaction> {
        let original = self
            .chain
            .fetch_transaction(&original_txid)
            .await?
            .ok_or(RbfError::TransactionNotFound { txid: original_txid })?;
        if original.confirmed {
            return Err(RbfError::OriginalAlreadyConfirmed { txid: original_txid });
        }

        let outpoints: Vec<OutPoint> = original.inputs.iter().map(|input| input.outpoint).collect();
        let funding = self.chain.fetch_funding_values(&outpoints).await?;
        let original_fee = OriginalFee::measure(&original, funding)?;

        tracing::info!(
            "Original {} paid {} sats over {} vB ({:.2} sat/vB), requested {} sat/vB",
            original_txid,
            original_fee.fee.to_sat(),
            original_fee.vsize,
            original_fee.fee_rate(),
            new_fee_rate
        );

        let quote = replacement::validate(&original, &original_fee, kind, new_fee_rate)?;
        let draft =
            self.replacement_builder
                .build(kind, &original, &original_fee, &key.address(), quote)?;
        let signed = sign_draft(&draft, key)?;

        let result = ReplacementTransaction {
            fee_rate: signed.fee_rate(),
            raw_hex: signed.hex,
            txid: signed.txid,
            replaced_txid: original_txid,
            kind,
            fee: signed.fee.to_sat(),
            size: signed.vsize,
            original_fee: original_fee.fee.to_sat(),
            original_fee_rate: original_fee.fee_rate(),
        };
        tracing::info!("Replacement {:?}", result.link());
        Ok(result)
    }

    pub async fn sweep(
        &self,
        key: &SigningKey,
        source: Address,
        destination: Address,
    ) -> RbfResult<SweepResult> {
        let utxos = self.chain.fetch_utxos(&source).await?;
        let draft = self.sweep_engine.build_sweep(&source, &utxos, &destination)?;
        let signed = sign_draft(&draft, key)?;

        let swept_amount = draft.total_output().to_sat();
        tracing::info!(
            "Swept {} sats from {} to {} in {}",
            swept_amount,
            source,
            destination,
            signed.txid
        );

        Ok(SweepResult {
            raw_hex: signed.hex,
            txid: signed.txid,
            swept_amount,
            fee: signed.fee.to_sat(),
            fee_rate: self.sweep_engine.fee_rate(),
            from_address: source.to_string(),
            to_address: destination.to_string(),
        })
    }

    pub async fn balance(&self, address: Address) -> RbfResult<BalanceResponse> {
        // independent lookups
        let (balance, utxos) = tokio::try_join!(
            self.chain.fetch_balance(&address),
            self.chain.fetch_utxos(&address)
        )?;

        Ok(BalanceResponse {
            address: address.to_string(),
            total: balance.total(),
            balance,
            utxos: utxos.iter().map(UtxoResponse::from).collect(),
        })
    }

    pub async fn transaction_details(&self, txid: Txid) -> RbfResult<TransactionDetails> {
        let tx = self
            .chain
            .fetch_transaction(&txid)
            .await?
            .ok_or(RbfError::TransactionNotFound { txid })?;
        let status = self.chain.fetch_tx_status(&txid).await?;

        Ok(TransactionDetails {
            txid,
            status,
            vsize: tx.vsize,
            input_count: tx.inputs.len(),
            outputs: tx.outputs.iter().map(TxOutResponse::from).collect(),
            rbf_signaled: tx.inputs.iter().any(|input| input.sequence.is_rbf()),
        })
    }

    pub async fn broadcast(&self, tx_hex: &str) -> RbfResult<Txid> {
        let tx: Transaction = deserialize_hex(tx_hex.trim())
            .map_err(|e| RbfError::InvalidTransactionHex(e.to_string()))?;
        Ok(self.chain.broadcast(&tx).await?)
    }

    pub async fn fee_estimates(&self) -> FeeEstimates {
        self.fee_estimator.get_fee_estimates().await
    }
}
