use bitcoin::{Address, Amount, Sequence};

use super::fee_model;
use super::transaction_builder::inputs_from_utxos;
use crate::config::EngineConfig;
use crate::error::{RbfError, RbfResult};
use crate::models::transaction::{OutputSpec, TransactionDraft, Utxo};

/// Moves an entire UTXO set into a single output at the configured priority rate.
pub struct SweepEngine {
    dust_limit: Amount,
    fee_rate: u64,
}

impl SweepEngine {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            dust_limit: config.dust_limit,
            fee_rate: config.sweep_fee_rate,
        }
    }

    pub fn fee_rate(&self) -> u64 {
        self.fee_rate
    }

    pub fn build_sweep(
        &self,
        source: &Address,
        utxos: &[Utxo],
        destination: &Address,
    ) -> RbfResult<TransactionDraft> {
        if utxos.is_empty() {
            return Err(RbfError::NoUtxos {
                address: source.to_string(),
            });
        }

        let quote = fee_model::quote(utxos.len(), 1, self.fee_rate)?;
        let total_input: Amount = utxos.iter().map(|utxo| utxo.value).sum();

        let swept = total_input.to_sat() as i64 - quote.absolute_fee.to_sat() as i64;
        if swept <= self.dust_limit.to_sat() as i64 {
            return Err(RbfError::DustAfterFees {
                swept,
                fee: quote.absolute_fee.to_sat(),
            });
        }

        tracing::info!(
            "Sweeping {} UTXOs ({} sats) from {} to {}, fee {} sats at {} sat/vB",
            utxos.len(),
            total_input.to_sat(),
            source,
            destination,
            quote.absolute_fee.to_sat(),
            self.fee_rate
        );

        Ok(TransactionDraft {
            inputs: inputs_from_utxos(
                &source.script_pubkey(),
                utxos,
                Sequence::ENABLE_RBF_NO_LOCKTIME,
            ),
            outputs: vec![OutputSpec::new(
                destination.script_pubkey(),
                Amount::from_sat(swept as u64),
            )],
            quote,
        })
    }
}
