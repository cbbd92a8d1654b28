use bitcoin::{Address, Amount, ScriptBuf, Sequence, TxOut};

use super::fee_model;
use super::redirect::{resolve_destination, RedirectPolicy};
use crate::config::EngineConfig;
use crate::error::{RbfError, RbfResult};
use crate::models::transaction::{DraftInput, OutputSpec, RedirectNotice, TransactionDraft, Utxo};

#[derive(Debug, Clone)]
pub struct PaymentRequest {
    pub destination: Address,
    pub amount: Amount,
    /// sat/vB
    pub fee_rate: u64,
    pub rbf: bool,
}

#[derive(Debug, Clone)]
pub struct BuiltPayment {
    pub draft: TransactionDraft,
    pub destination: Address,
    pub redirect: Option<RedirectNotice>,
}

pub fn sequence_for(rbf: bool) -> Sequence {
    if rbf {
        Sequence::ENABLE_RBF_NO_LOCKTIME
    } else {
        Sequence::MAX
    }
}

/// Every UTXO becomes an input, funded by `source_script`.
pub fn inputs_from_utxos(
    source_script: &ScriptBuf,
    utxos: &[Utxo],
    sequence: Sequence,
) -> Vec<DraftInput> {
    utxos
        .iter()
        .map(|utxo| DraftInput {
            outpoint: utxo.outpoint,
            prevout: TxOut {
                value: utxo.value,
                script_pubkey: source_script.clone(),
            },
            sequence,
        })
        .collect()
}

pub struct TransactionBuilder {
    dust_limit: Amount,
    redirect: Option<RedirectPolicy>,
}

impl TransactionBuilder {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            dust_limit: config.dust_limit,
            redirect: config.redirect.clone(),
        }
    }

    /// Spends the whole UTXO set of `source` into one payment plus change.
    pub fn build_payment(
        &self,
        source: &Address,
        utxos: &[Utxo],
        request: &PaymentRequest,
    ) -> RbfResult<BuiltPayment> {
        if utxos.is_empty() {
            return Err(RbfError::NoUtxos {
                address: source.to_string(),
            });
        }
        if request.amount < self.dust_limit {
            return Err(RbfError::AmountBelowDust {
                value: request.amount.to_sat(),
                dust_limit: self.dust_limit.to_sat(),
            });
        }

        // payment + potential change
        let quote = fee_model::quote(utxos.len(), 2, request.fee_rate)?;

        let total_input: Amount = utxos.iter().map(|utxo| utxo.value).sum();
        let required = request
            .amount
            .checked_add(quote.absolute_fee)
            .ok_or(RbfError::InvalidFeeRate(request.fee_rate))?;
        let change = total_input
            .checked_sub(required)
            .ok_or_else(|| RbfError::insufficient(total_input, required))?;

        let (destination, redirect) =
            resolve_destination(self.redirect.as_ref(), request.amount, request.destination.clone());
        if let Some(notice) = &redirect {
            tracing::warn!(
                "Payment of {} sats above {} sat threshold redirected from {} to {}",
                request.amount.to_sat(),
                notice.threshold_sats,
                notice.requested,
                notice.applied
            );
        }

        let source_script = source.script_pubkey();
        let mut outputs = vec![OutputSpec::new(destination.script_pubkey(), request.amount)];

        // change below dust is left to the miner
        if change >= self.dust_limit {
            outputs.push(OutputSpec::new(source_script.clone(), change));
        } else if change > Amount::ZERO {
            tracing::info!("Dropping {} sat change below dust, absorbed into fee", change.to_sat());
        }

        let draft = TransactionDraft {
            inputs: inputs_from_utxos(&source_script, utxos, sequence_for(request.rbf)),
            outputs,
            quote,
        };

        tracing::info!(
            "Built payment draft: {} inputs totaling {} sats, {} outputs, fee {} sats at {} sat/vB",
            draft.inputs.len(),
            total_input.to_sat(),
            draft.outputs.len(),
            quote.absolute_fee.to_sat(),
            request.fee_rate
        );

        Ok(BuiltPayment {
            draft,
            destination,
            redirect,
        })
    }
}
