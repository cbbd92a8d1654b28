use bitcoin::{
    absolute::LockTime, transaction::Version, Amount, OutPoint, ScriptBuf, Sequence, Transaction,
    TxIn, TxOut, Txid, Witness,
};
use serde::{Deserialize, Serialize};

use crate::services::onchain::fee_model::FeeQuote;

/// A spendable output owned by the source address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utxo {
    pub outpoint: OutPoint,
    pub value: Amount,
    pub confirmed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputSpec {
    pub script_pubkey: ScriptBuf,
    pub value: Amount,
}

impl OutputSpec {
    pub fn new(script_pubkey: ScriptBuf, value: Amount) -> Self {
        Self { script_pubkey, value }
    }

    fn to_txout(&self) -> TxOut {
        TxOut {
            value: self.value,
            script_pubkey: self.script_pubkey.clone(),
        }
    }
}

/// An input plus the funding output it spends, which segwit signing needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DraftInput {
    pub outpoint: OutPoint,
    pub prevout: TxOut,
    pub sequence: Sequence,
}

impl DraftInput {
    pub fn signals_rbf(&self) -> bool {
        self.sequence.is_rbf()
    }
}

/// Unsigned transaction shape. Finalized by the signer.
#[derive(Debug, Clone)]
pub struct TransactionDraft {
    pub inputs: Vec<DraftInput>,
    pub outputs: Vec<OutputSpec>,
    pub quote: FeeQuote,
}

impl TransactionDraft {
    pub fn total_input(&self) -> Amount {
        self.inputs.iter().map(|i| i.prevout.value).sum()
    }

    pub fn total_output(&self) -> Amount {
        self.outputs.iter().map(|o| o.value).sum()
    }

    /// Implied fee, `None` when outputs exceed inputs.
    pub fn fee(&self) -> Option<Amount> {
        self.total_input().checked_sub(self.total_output())
    }

    pub fn signals_rbf(&self) -> bool {
        self.inputs.iter().any(DraftInput::signals_rbf)
    }

    pub fn to_unsigned_tx(&self) -> Transaction {
        Transaction {
            version: Version::TWO,
            lock_time: LockTime::ZERO,
            input: self
                .inputs
                .iter()
                .map(|i| TxIn {
                    previous_output: i.outpoint,
                    script_sig: ScriptBuf::new(),
                    sequence: i.sequence,
                    witness: Witness::new(),
                })
                .collect(),
            output: self.outputs.iter().map(OutputSpec::to_txout).collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SignedTransaction {
    pub tx: Transaction,
    pub hex: String,
    pub txid: Txid,
    pub vsize: u64,
    pub fee: Amount,
}

impl SignedTransaction {
    pub fn fee_rate(&self) -> f64 {
        if self.vsize == 0 {
            return 0.0;
        }
        self.fee.to_sat() as f64 / self.vsize as f64
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginalInput {
    pub outpoint: OutPoint,
    pub sequence: Sequence,
}

/// A previously broadcast transaction as the chain data source reports it.
#[derive(Debug, Clone)]
pub struct OriginalTransaction {
    pub txid: Txid,
    pub confirmed: bool,
    pub vsize: u64,
    pub inputs: Vec<OriginalInput>,
    pub outputs: Vec<TxOut>,
}

impl OriginalTransaction {
    pub fn total_output(&self) -> Amount {
        self.outputs.iter().map(|o| o.value).sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplacementKind {
    Accelerate,
    Cancel,
}

impl ReplacementKind {
    pub fn from_cancel_flag(cancel: bool) -> Self {
        if cancel {
            ReplacementKind::Cancel
        } else {
            ReplacementKind::Accelerate
        }
    }

    /// Outputs the replacement is expected to carry when sizing its fee.
    pub fn output_count(self) -> usize {
        match self {
            ReplacementKind::Cancel => 1,
            ReplacementKind::Accelerate => 2,
        }
    }
}

/// Which transaction replaced which. Callers track which one is live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplacementLink {
    pub original_txid: Txid,
    pub replacement_txid: Txid,
    pub kind: ReplacementKind,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TxStatusInfo {
    pub confirmed: bool,
    pub block_height: Option<u32>,
    pub block_time: Option<u64>,
}

/// `unconfirmed` is the mempool delta, negative while a mempool tx spends confirmed coins.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct Balance {
    pub confirmed: u64,
    pub unconfirmed: i64,
}

impl Balance {
    pub fn total(&self) -> u64 {
        self.confirmed.saturating_add_signed(self.unconfirmed)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RedirectNotice {
    pub requested: String,
    pub applied: String,
    pub threshold_sats: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreatedTransaction {
    pub raw_hex: String,
    pub txid: Txid,
    pub fee: u64,
    pub size: u64,
    pub fee_rate: f64,
    pub rbf_enabled: bool,
    pub destination: String,
    pub redirect: Option<RedirectNotice>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReplacementTransaction {
    pub raw_hex: String,
    pub txid: Txid,
    pub replaced_txid: Txid,
    pub kind: ReplacementKind,
    pub fee: u64,
    pub size: u64,
    pub fee_rate: f64,
    pub original_fee: u64,
    pub original_fee_rate: f64,
}

impl ReplacementTransaction {
    pub fn link(&self) -> ReplacementLink {
        ReplacementLink {
            original_txid: self.replaced_txid,
            replacement_txid: self.txid,
            kind: self.kind,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SweepResult {
    pub raw_hex: String,
    pub txid: Txid,
    pub swept_amount: u64,
    pub fee: u64,
    pub fee_rate: u64,
    pub from_address: String,
    pub to_address: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct UtxoResponse {
    pub txid: Txid,
    pub vout: u32,
    pub value: u64,
    pub confirmed: bool,
}

impl From<&Utxo> for UtxoResponse {
    fn from(utxo: &Utxo) -> Self {
        Self {
            txid: utxo.outpoint.txid,
            vout: utxo.outpoint.vout,
            value: utxo.value.to_sat(),
            confirmed: utxo.confirmed,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BalanceResponse {
    pub address: String,
    pub balance: Balance,
    pub total: u64,
    pub utxos: Vec<UtxoResponse>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DerivedAddresses {
    pub address: String,
    pub legacy_address: String,
    pub network: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransactionDetails {
    pub txid: Txid,
    pub status: TxStatusInfo,
    pub vsize: u64,
    pub input_count: usize,
    pub outputs: Vec<TxOutResponse>,
    pub rbf_signaled: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct TxOutResponse {
    pub value: u64,
    pub script_pubkey: String,
}

impl From<&TxOut> for TxOutResponse {
    fn from(out: &TxOut) -> Self {
        Self {
            value: out.value.to_sat(),
            script_pubkey: out.script_pubkey.to_hex_string(),
        }
    }
}
