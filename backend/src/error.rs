use bitcoin::{Amount, Txid};

/// Failure talking to the chain data source. Surfaced as-is, never retried here.
#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    #[error("esplora request failed: {0}")]
    Esplora(#[from] esplora_client::Error),
    #[error("funding transaction {txid} not found")]
    MissingTransaction { txid: Txid },
    #[error("funding output {txid}:{vout} does not exist")]
    MissingOutput { txid: Txid, vout: u32 },
    #[error("chain data source failed: {0}")]
    Other(String),
}

/// Everything the engine can report back to a caller.
///
/// Amounts are carried as numbers so a caller can see the exact shortfall and resubmit.
#[derive(Debug, thiserror::Error)]
pub enum RbfError {
    #[error("no UTXOs available for {address}")]
    NoUtxos { address: String },

    #[error("insufficient funds: have {available} sats, need {required} sats")]
    InsufficientFunds { available: u64, required: u64 },

    #[error("output of {value} sats is at or below the dust limit of {dust_limit} sats")]
    AmountBelowDust { value: u64, dust_limit: u64 },

    #[error("sweep of {swept} sats after a {fee} sat fee would be dust")]
    DustAfterFees { swept: i64, fee: u64 },

    #[error(
        "replacement must pay more than {original_fee} sats and {original_fee_rate:.2} sat/vB \
         (offered {new_fee} sats at {new_fee_rate} sat/vB, need at least {required_fee} sats \
         and {required_fee_rate} sat/vB)"
    )]
    ReplacementFeeTooLow {
        original_fee: u64,
        original_fee_rate: f64,
        new_fee: u64,
        new_fee_rate: u64,
        required_fee: u64,
        required_fee_rate: u64,
    },

    #[error("transaction {txid} is already confirmed and cannot be replaced")]
    OriginalAlreadyConfirmed { txid: Txid },

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("cannot sign input {input}: {reason}")]
    SignatureFailure { input: usize, reason: String },

    #[error("invalid fee rate {0} sat/vB")]
    InvalidFeeRate(u64),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("transaction {txid} has no recipient output to keep")]
    RecipientOutputNotFound { txid: Txid },

    #[error("invalid txid: {0}")]
    InvalidTxid(String),

    #[error("transaction {txid} not found")]
    TransactionNotFound { txid: Txid },

    #[error("invalid transaction hex: {0}")]
    InvalidTransactionHex(String),

    #[error("fee of {fee} sats does not cover the required {required} sats")]
    FeeBelowQuote { fee: i64, required: u64 },

    #[error("chain data unavailable: {0}")]
    ChainDataUnavailable(#[from] ChainError),
}

impl RbfError {
    pub(crate) fn insufficient(available: Amount, required: Amount) -> Self {
        RbfError::InsufficientFunds {
            available: available.to_sat(),
            required: required.to_sat(),
        }
    }

    /// True when the caller's input caused the failure rather than a collaborator.
    pub fn is_caller_error(&self) -> bool {
        !matches!(
            self,
            RbfError::ChainDataUnavailable(_) | RbfError::FeeBelowQuote { .. }
        )
    }
}

pub type RbfResult<T> = Result<T, RbfError>;
