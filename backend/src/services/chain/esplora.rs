use async_trait::async_trait;
use bitcoin::{Address, OutPoint, Transaction, TxOut, Txid};
use futures::future::try_join_all;
use std::collections::{BTreeSet, HashMap};

use super::ChainData;
use crate::error::ChainError;
use crate::models::transaction::{Balance, OriginalInput, OriginalTransaction, TxStatusInfo, Utxo};

// ChainData impl for Esplora
pub struct EsploraChainData {
    client: esplora_client::AsyncClient,
}

impl EsploraChainData {
    pub fn new(url: &str) -> Result<Self, ChainError> {
        let client = esplora_client::Builder::new(url).build_async()?;
        Ok(Self { client })
    }

    async fn get_tx(&self, txid: &Txid) -> Result<Option<Transaction>, ChainError> {
        match self.client.get_tx(txid).await {
            Ok(tx) => Ok(tx),
            Err(esplora_client::Error::TransactionNotFound(_)) => {
                tracing::debug!("Transaction not found: {}", txid);
                Ok(None)
            }
            Err(e) => {
                tracing::error!("Error fetching transaction {}: {}", txid, e);
                Err(e.into())
            }
        }
    }
}

#[async_trait]
impl ChainData for EsploraChainData {
    async fn fetch_utxos(&self, address: &Address) -> Result<Vec<Utxo>, ChainError> {
        tracing::debug!("Finding UTXOs for address: {}", address);

        // the utxo endpoint is unpaginated and already excludes spent outputs
        let utxos = self.client.get_address_utxos(address).await.map_err(|e| {
            tracing::error!("Error fetching UTXOs: {}", e);
            ChainError::from(e)
        })?;

        let utxos: Vec<Utxo> = utxos
            .into_iter()
            .map(|utxo| Utxo {
                outpoint: OutPoint {
                    txid: utxo.txid,
                    vout: utxo.vout,
                },
                value: utxo.value,
                confirmed: utxo.status.confirmed,
            })
            .collect();

        tracing::debug!("Found {} UTXOs for address {}", utxos.len(), address);
        Ok(utxos)
    }

    async fn fetch_balance(&self, address: &Address) -> Result<Balance, ChainError> {
        let stats = self.client.get_address_stats(address).await.map_err(|e| {
            tracing::error!("Error fetching address stats: {}", e);
            ChainError::from(e)
        })?;

        let chain = stats.chain_stats;
        let mempool = stats.mempool_stats;
        Ok(Balance {
            confirmed: chain.funded_txo_sum.saturating_sub(chain.spent_txo_sum),
            unconfirmed: mempool.funded_txo_sum as i64 - mempool.spent_txo_sum as i64,
        })
    }

    async fn fetch_transaction(&self, txid: &Txid) -> Result<Option<OriginalTransaction>, ChainError> {
        let Some(tx) = self.get_tx(txid).await? else {
            return Ok(None);
        };
        let status = self.fetch_tx_status(txid).await?;

        Ok(Some(OriginalTransaction {
            txid: *txid,
            confirmed: status.confirmed,
            vsize: tx.vsize() as u64,
            inputs: tx
                .input
                .iter()
                .map(|txin| OriginalInput {
                    outpoint: txin.previous_output,
                    sequence: txin.sequence,
                })
                .collect(),
            outputs: tx.output,
        }))
    }

    async fn fetch_tx_status(&self, txid: &Txid) -> Result<TxStatusInfo, ChainError> {
        let status = self.client.get_tx_status(txid).await?;
        Ok(TxStatusInfo {
            confirmed: status.confirmed,
            block_height: status.block_height,
            block_time: status.block_time,
        })
    }

    async fn fetch_funding_values(&self, outpoints: &[OutPoint]) -> Result<Vec<TxOut>, ChainError> {
        // one lookup per distinct parent, issued together
        let parents: BTreeSet<Txid> = outpoints.iter().map(|o| o.txid).collect();
        let fetched = try_join_all(parents.into_iter().map(|txid| async move {
            let tx = self
                .get_tx(&txid)
                .await?
                .ok_or(ChainError::MissingTransaction { txid })?;
            Ok::<_, ChainError>((txid, tx))
        }))
        .await?;
        let parents: HashMap<Txid, Transaction> = fetched.into_iter().collect();

        outpoints
            .iter()
            .map(|outpoint| {
                parents
                    .get(&outpoint.txid)
                    .and_then(|tx| tx.output.get(outpoint.vout as usize))
                    .cloned()
                    .ok_or(ChainError::MissingOutput {
                        txid: outpoint.txid,
                        vout: outpoint.vout,
                    })
            })
            .collect()
    }

    async fn fetch_fee_estimates(&self) -> Result<HashMap<u16, f64>, ChainError> {
        Ok(self.client.get_fee_estimates().await?)
    }

    async fn broadcast(&self, tx: &Transaction) -> Result<Txid, ChainError> {
        let txid = tx.compute_txid();
        tracing::info!("Broadcasting transaction: {}", txid);

        match self.client.broadcast(tx).await {
            Ok(_) => {
                tracing::info!("Successfully broadcast transaction: {}", txid);
                Ok(txid)
            }
            Err(e) => {
                tracing::error!("Error broadcasting transaction: {}", e);
                Err(e.into())
            }
        }
    }
}
