use serde::Deserialize;
use std::fmt;

/// The caller's signing capability: a WIF key or a mnemonic.
#[derive(Clone, Deserialize)]
pub struct KeyCredential {
    pub private_key: Option<String>,
    pub mnemonic: Option<String>,
    pub derivation_path: Option<String>,
}

// Secrets never reach logs, only whether they were supplied.
impl fmt::Debug for KeyCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redacted = |secret: &Option<String>| secret.as_ref().map(|_| "<redacted>");
        f.debug_struct("KeyCredential")
            .field("private_key", &redacted(&self.private_key))
            .field("mnemonic", &redacted(&self.mnemonic))
            .field("derivation_path", &self.derivation_path)
            .finish()
    }
}

fn default_rbf() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct CreateTransactionRequest {
    #[serde(flatten)]
    pub credential: KeyCredential,
    pub to_address: String,
    pub amount: u64,
    pub fee_rate: u64,
    #[serde(default = "default_rbf")]
    pub rbf: bool,
}

#[derive(Debug, Deserialize)]
pub struct ReplaceTransactionRequest {
    #[serde(flatten)]
    pub credential: KeyCredential,
    pub original_txid: String,
    pub new_fee_rate: u64,
    #[serde(default)]
    pub cancel: bool,
}

#[derive(Debug, Deserialize)]
pub struct SweepRequest {
    #[serde(flatten)]
    pub credential: KeyCredential,
    pub from_address: String,
    pub to_address: String,
}

#[derive(Debug, Deserialize)]
pub struct BroadcastRequest {
    pub tx_hex: String,
}

#[derive(Debug, Deserialize)]
pub struct ImportKeyRequest {
    #[serde(flatten)]
    pub credential: KeyCredential,
}
