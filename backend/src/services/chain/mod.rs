pub mod esplora;
#[cfg(test)]
pub mod memory;

pub use esplora::EsploraChainData;

use async_trait::async_trait;
use bitcoin::{Address, OutPoint, Transaction, TxOut, Txid};
use std::collections::HashMap;

use crate::error::ChainError;
use crate::models::transaction::{Balance, OriginalTransaction, TxStatusInfo, Utxo};

/// Read/broadcast boundary to the blockchain. No business logic lives behind it.
#[async_trait]
pub trait ChainData: Send + Sync {
    /// Unspent outputs locked to `address`.
    async fn fetch_utxos(&self, address: &Address) -> Result<Vec<Utxo>, ChainError>;

    async fn fetch_balance(&self, address: &Address) -> Result<Balance, ChainError>;

    /// `Ok(None)` when the source has never seen the transaction.
    async fn fetch_transaction(&self, txid: &Txid) -> Result<Option<OriginalTransaction>, ChainError>;

    async fn fetch_tx_status(&self, txid: &Txid) -> Result<TxStatusInfo, ChainError>;

    /// Funding outputs for each outpoint, in the order given.
    async fn fetch_funding_values(&self, outpoints: &[OutPoint]) -> Result<Vec<TxOut>, ChainError>;

    /// Confirmation target (blocks) to sat/vB.
    async fn fetch_fee_estimates(&self) -> Result<HashMap<u16, f64>, ChainError>;

    async fn broadcast(&self, tx: &Transaction) -> Result<Txid, ChainError>;
}
