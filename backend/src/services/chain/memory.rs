//! In-memory chain used by the engine tests.

use async_trait::async_trait;
use bitcoin::{
    absolute::LockTime, transaction::Version, Address, Amount, OutPoint, ScriptBuf, Sequence,
    Transaction, TxIn, TxOut, Txid, Witness,
};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};

use super::ChainData;
use crate::error::ChainError;
use crate::models::transaction::{Balance, OriginalInput, OriginalTransaction, TxStatusInfo, Utxo};

#[derive(Default)]
struct State {
    txs: HashMap<Txid, (Transaction, bool)>,
    spent: HashSet<OutPoint>,
    broadcasts: Vec<Txid>,
    offline: bool,
    next_lock_time: u32,
}

#[derive(Default)]
pub struct MemoryChain {
    state: Mutex<State>,
}

impl MemoryChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a confirmed transaction paying `value` to `script_pubkey`.
    pub fn fund(&self, script_pubkey: &ScriptBuf, value: u64) -> OutPoint {
        let mut state = self.state.lock();
        state.next_lock_time += 1;
        let tx = Transaction {
            version: Version::TWO,
            lock_time: LockTime::from_consensus(state.next_lock_time),
            input: vec![TxIn {
                previous_output: OutPoint::null(),
                script_sig: ScriptBuf::new(),
                sequence: Sequence::MAX,
                witness: Witness::new(),
            }],
            output: vec![TxOut {
                value: Amount::from_sat(value),
                script_pubkey: script_pubkey.clone(),
            }],
        };
        let txid = tx.compute_txid();
        state.txs.insert(txid, (tx, true));
        OutPoint { txid, vout: 0 }
    }

    /// Stores `tx`, evicting any other transaction that spends one of its inputs.
    pub fn insert(&self, tx: Transaction, confirmed: bool) -> Txid {
        let mut state = self.state.lock();
        let txid = tx.compute_txid();
        let conflicts: Vec<Txid> = state
            .txs
            .iter()
            .filter(|(other_txid, (other, _))| {
                **other_txid != txid
                    && other.input.iter().any(|a| {
                        tx.input.iter().any(|b| b.previous_output == a.previous_output)
                    })
            })
            .map(|(other_txid, _)| *other_txid)
            .collect();
        for conflict in conflicts {
            state.txs.remove(&conflict);
        }
        for txin in &tx.input {
            state.spent.insert(txin.previous_output);
        }
        state.txs.insert(txid, (tx, confirmed));
        txid
    }

    pub fn confirm(&self, txid: &Txid) {
        if let Some(entry) = self.state.lock().txs.get_mut(txid) {
            entry.1 = true;
        }
    }

    pub fn set_offline(&self, offline: bool) {
        self.state.lock().offline = offline;
    }

    pub fn broadcasts(&self) -> Vec<Txid> {
        self.state.lock().broadcasts.clone()
    }

    fn check_online(&self) -> Result<(), ChainError> {
        if self.state.lock().offline {
            return Err(ChainError::Other("connection refused".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ChainData for MemoryChain {
    async fn fetch_utxos(&self, address: &Address) -> Result<Vec<Utxo>, ChainError> {
        self.check_online()?;
        let script_pubkey = address.script_pubkey();
        let script_pubkey = &script_pubkey;
        let state = self.state.lock();

        let mut utxos: Vec<Utxo> = state
            .txs
            .iter()
            .flat_map(|(txid, (tx, confirmed))| {
                tx.output.iter().enumerate().filter_map(move |(vout, out)| {
                    (&out.script_pubkey == script_pubkey).then(|| Utxo {
                        outpoint: OutPoint {
                            txid: *txid,
                            vout: vout as u32,
                        },
                        value: out.value,
                        confirmed: *confirmed,
                    })
                })
            })
            .filter(|utxo| !state.spent.contains(&utxo.outpoint))
            .collect();
        utxos.sort_by_key(|u| u.outpoint);
        Ok(utxos)
    }

    async fn fetch_balance(&self, address: &Address) -> Result<Balance, ChainError> {
        let utxos = self.fetch_utxos(address).await?;
        Ok(utxos.iter().fold(Balance::default(), |mut b, u| {
            if u.confirmed {
                b.confirmed += u.value.to_sat();
            } else {
                b.unconfirmed += u.value.to_sat() as i64;
            }
            b
        }))
    }

    async fn fetch_transaction(&self, txid: &Txid) -> Result<Option<OriginalTransaction>, ChainError> {
        self.check_online()?;
        let state = self.state.lock();
        Ok(state.txs.get(txid).map(|(tx, confirmed)| OriginalTransaction {
            txid: *txid,
            confirmed: *confirmed,
            vsize: tx.vsize() as u64,
            inputs: tx
                .input
                .iter()
                .map(|txin| OriginalInput {
                    outpoint: txin.previous_output,
                    sequence: txin.sequence,
                })
                .collect(),
            outputs: tx.output.clone(),
        }))
    }

    async fn fetch_tx_status(&self, txid: &Txid) -> Result<TxStatusInfo, ChainError> {
        self.check_online()?;
        let state = self.state.lock();
        let confirmed = state.txs.get(txid).map(|(_, c)| *c).unwrap_or(false);
        Ok(TxStatusInfo {
            confirmed,
            block_height: confirmed.then_some(100),
            block_time: None,
        })
    }

    async fn fetch_funding_values(&self, outpoints: &[OutPoint]) -> Result<Vec<TxOut>, ChainError> {
        self.check_online()?;
        let state = self.state.lock();
        outpoints
            .iter()
            .map(|o| {
                let (tx, _) = state
                    .txs
                    .get(&o.txid)
                    .ok_or(ChainError::MissingTransaction { txid: o.txid })?;
                tx.output
                    .get(o.vout as usize)
                    .cloned()
                    .ok_or(ChainError::MissingOutput {
                        txid: o.txid,
                        vout: o.vout,
                    })
            })
            .collect()
    }

    async fn fetch_fee_estimates(&self) -> Result<HashMap<u16, f64>, ChainError> {
        self.check_online()?;
        Ok(HashMap::from([(1, 12.0), (3, 8.5), (6, 4.0), (144, 1.2)]))
    }

    async fn broadcast(&self, tx: &Transaction) -> Result<Txid, ChainError> {
        self.check_online()?;
        let txid = self.insert(tx.clone(), false);
        self.state.lock().broadcasts.push(txid);
        Ok(txid)
    }
}
