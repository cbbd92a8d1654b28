use bip39::{Language, Mnemonic};
use bitcoin::bip32::{DerivationPath, Xpriv};
use bitcoin::consensus::encode::serialize_hex;
use bitcoin::hashes::Hash;
use bitcoin::secp256k1::{Message, Secp256k1};
use bitcoin::sighash::SighashCache;
use bitcoin::{
    Address, CompressedPublicKey, EcdsaSighashType, Network, NetworkKind, PrivateKey, Script,
    ScriptBuf, Witness,
};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{RbfError, RbfResult};
use crate::models::requests::KeyCredential;
use crate::models::transaction::{SignedTransaction, TransactionDraft};

pub const DEFAULT_DERIVATION_PATH: &str = "m/84'/0'/0'/0/0";

/// A single P2WPKH signing key. Construction is the only place a credential is parsed.
#[derive(Clone)]
pub struct SigningKey {
    private_key: PrivateKey,
    public_key: CompressedPublicKey,
    network: Network,
}

impl SigningKey {
    pub fn from_private_key(private_key: PrivateKey, network: Network) -> RbfResult<Self> {
        if private_key.network != NetworkKind::from(network) {
            return Err(RbfError::InvalidKey(format!(
                "key does not belong to {}",
                network
            )));
        }

        let secp = Secp256k1::signing_only();
        let public_key = CompressedPublicKey::from_private_key(&secp, &private_key).map_err(|_| {
            RbfError::InvalidKey("uncompressed keys cannot spend P2WPKH outputs".to_string())
        })?;

        Ok(Self {
            private_key,
            public_key,
            network,
        })
    }

    pub fn from_wif(wif: &str, network: Network) -> RbfResult<Self> {
        let private_key = PrivateKey::from_wif(wif.trim())
            .map_err(|e| RbfError::InvalidKey(format!("invalid WIF: {}", e)))?;
        Self::from_private_key(private_key, network)
    }

    /// BIP39 phrase (empty passphrase) derived along `path`.
    pub fn from_mnemonic(phrase: &str, path: Option<&str>, network: Network) -> RbfResult<Self> {
        let mnemonic = Mnemonic::parse_in(Language::English, phrase.trim())
            .map_err(|e| RbfError::InvalidKey(format!("invalid mnemonic: {}", e)))?;
        let seed = mnemonic.to_seed("");

        let secp = Secp256k1::new();
        let master_key = Xpriv::new_master(network, &seed)
            .map_err(|e| RbfError::InvalidKey(format!("failed to derive master key: {}", e)))?;

        let path = DerivationPath::from_str(path.unwrap_or(DEFAULT_DERIVATION_PATH))
            .map_err(|e| RbfError::InvalidKey(format!("invalid derivation path: {}", e)))?;
        let child_key = master_key
            .derive_priv(&secp, &path)
            .map_err(|e| RbfError::InvalidKey(format!("failed to derive child key: {}", e)))?;

        Self::from_private_key(PrivateKey::new(child_key.private_key, network), network)
    }

    pub fn from_credential(credential: &KeyCredential, network: Network) -> RbfResult<Self> {
        match (&credential.private_key, &credential.mnemonic) {
            (Some(wif), None) => Self::from_wif(wif, network),
            (None, Some(phrase)) => {
                Self::from_mnemonic(phrase, credential.derivation_path.as_deref(), network)
            }
            (Some(_), Some(_)) => Err(RbfError::InvalidKey(
                "supply either a private key or a mnemonic, not both".to_string(),
            )),
            (None, None) => Err(RbfError::InvalidKey("private key required".to_string())),
        }
    }

    pub fn address(&self) -> Address {
        Address::p2wpkh(&self.public_key, self.network)
    }

    pub fn legacy_address(&self) -> Address {
        Address::p2pkh(self.public_key.pubkey_hash(), self.network)
    }

    pub fn script_pubkey(&self) -> ScriptBuf {
        ScriptBuf::new_p2wpkh(&self.public_key.wpubkey_hash())
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("address", &self.address().to_string())
            .finish_non_exhaustive()
    }
}

/// Finds the key able to spend a funding script.
pub trait KeyLookup {
    fn key_for(&self, script_pubkey: &Script) -> Option<&SigningKey>;
}

impl KeyLookup for SigningKey {
    fn key_for(&self, script_pubkey: &Script) -> Option<&SigningKey> {
        (self.script_pubkey().as_script() == script_pubkey).then_some(self)
    }
}

/// Several keys, for drafts whose inputs are owned by different keys.
#[derive(Debug, Default, Clone)]
pub struct KeyRing {
    keys: HashMap<ScriptBuf, SigningKey>,
}

impl KeyRing {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: SigningKey) {
        self.keys.insert(key.script_pubkey(), key);
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl FromIterator<SigningKey> for KeyRing {
    fn from_iter<I: IntoIterator<Item = SigningKey>>(iter: I) -> Self {
        let mut ring = KeyRing::new();
        for key in iter {
            ring.insert(key);
        }
        ring
    }
}

impl KeyLookup for KeyRing {
    fn key_for(&self, script_pubkey: &Script) -> Option<&SigningKey> {
        self.keys.get(script_pubkey)
    }
}

/// Finalizes a draft: checks the fee invariant, then produces a P2WPKH witness per input.
pub fn sign_draft(draft: &TransactionDraft, keys: &dyn KeyLookup) -> RbfResult<SignedTransaction> {
    let fee = draft
        .fee()
        .ok_or_else(|| RbfError::insufficient(draft.total_input(), draft.total_output()))?;
    if fee < draft.quote.absolute_fee {
        return Err(RbfError::FeeBelowQuote {
            fee: fee.to_sat() as i64,
            required: draft.quote.absolute_fee.to_sat(),
        });
    }

    let mut tx = draft.to_unsigned_tx();
    let secp = Secp256k1::signing_only();

    let mut witnesses = Vec::with_capacity(draft.inputs.len());
    {
        let mut sighash_cache = SighashCache::new(&tx);
        for (input_index, input) in draft.inputs.iter().enumerate() {
            let script_pubkey = &input.prevout.script_pubkey;
            let key = keys
                .key_for(script_pubkey)
                .ok_or_else(|| RbfError::SignatureFailure {
                    input: input_index,
                    reason: format!("no key for funding script {}", script_pubkey),
                })?;

            let sighash = sighash_cache
                .p2wpkh_signature_hash(
                    input_index,
                    script_pubkey,
                    input.prevout.value,
                    EcdsaSighashType::All,
                )
                .map_err(|e| RbfError::SignatureFailure {
                    input: input_index,
                    reason: format!("failed to compute p2wpkh sighash: {}", e),
                })?;

            let message = Message::from_digest(sighash.to_byte_array());
            let signature = secp.sign_ecdsa(&message, &key.private_key.inner);
            let signature = bitcoin::ecdsa::Signature::sighash_all(signature);

            witnesses.push(Witness::p2wpkh(&signature, &key.public_key.0));
            tracing::debug!("Signed input {} with P2WPKH", input_index);
        }
    }

    for (txin, witness) in tx.input.iter_mut().zip(witnesses) {
        txin.witness = witness;
    }

    Ok(SignedTransaction {
        hex: serialize_hex(&tx),
        txid: tx.compute_txid(),
        vsize: tx.vsize() as u64,
        fee,
        tx,
    })
}
