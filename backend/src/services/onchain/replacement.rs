use bitcoin::{Address, Amount, Sequence, TxOut};

use super::fee_model::{self, FeeQuote};
use crate::config::EngineConfig;
use crate::error::{ChainError, RbfError, RbfResult};
use crate::models::transaction::{
    DraftInput, OriginalTransaction, OutputSpec, ReplacementKind, TransactionDraft,
};

/// Fee the original transaction actually paid, measured from its recorded shape.
#[derive(Debug, Clone)]
pub struct OriginalFee {
    pub fee: Amount,
    /// as reported by the chain, not re-estimated
    pub vsize: u64,
    pub funding: Vec<TxOut>,
}

impl OriginalFee {
    /// `funding` must line up with `original.inputs`.
    pub fn measure(original: &OriginalTransaction, funding: Vec<TxOut>) -> RbfResult<Self> {
        if funding.len() != original.inputs.len() {
            return Err(ChainError::Other(format!(
                "expected {} funding outputs for {}, got {}",
                original.inputs.len(),
                original.txid,
                funding.len()
            ))
            .into());
        }

        let total_input: Amount = funding.iter().map(|out| out.value).sum();
        let fee = total_input
            .checked_sub(original.total_output())
            .ok_or_else(|| {
                ChainError::Other(format!(
                    "transaction {} spends more than its inputs hold",
                    original.txid
                ))
            })?;

        Ok(Self {
            fee,
            vsize: original.vsize,
            funding,
        })
    }

    pub fn fee_rate(&self) -> f64 {
        if self.vsize == 0 {
            return 0.0;
        }
        self.fee.to_sat() as f64 / self.vsize as f64
    }

    pub fn total_input(&self) -> Amount {
        self.funding.iter().map(|out| out.value).sum()
    }

    /// Smallest whole sat/vB rate strictly above the original rate.
    fn required_fee_rate(&self) -> u64 {
        self.fee.to_sat() / self.vsize.max(1) + 1
    }

    /// `rate > fee / vsize` without leaving integers.
    fn rate_exceeds(&self, fee_rate: u64) -> bool {
        u128::from(fee_rate) * u128::from(self.vsize) > u128::from(self.fee.to_sat())
    }
}

/// Decides whether a replacement at `new_fee_rate` would be relayed, returning its fee quote.
///
/// The replacement spends the same inputs, so the quote uses the original input count.
/// Both the absolute fee and the rate must strictly exceed the original's.
pub fn validate(
    original: &OriginalTransaction,
    original_fee: &OriginalFee,
    kind: ReplacementKind,
    new_fee_rate: u64,
) -> RbfResult<FeeQuote> {
    if original.confirmed {
        return Err(RbfError::OriginalAlreadyConfirmed {
            txid: original.txid,
        });
    }

    let quote = fee_model::quote(original.inputs.len(), kind.output_count(), new_fee_rate)?;

    if quote.absolute_fee <= original_fee.fee || !original_fee.rate_exceeds(new_fee_rate) {
        tracing::warn!(
            "Rejecting {:?} of {}: {} sats at {} sat/vB vs original {} sats at {:.2} sat/vB",
            kind,
            original.txid,
            quote.absolute_fee.to_sat(),
            new_fee_rate,
            original_fee.fee.to_sat(),
            original_fee.fee_rate()
        );
        return Err(RbfError::ReplacementFeeTooLow {
            original_fee: original_fee.fee.to_sat(),
            original_fee_rate: original_fee.fee_rate(),
            new_fee: quote.absolute_fee.to_sat(),
            new_fee_rate,
            required_fee: original_fee.fee.to_sat() + 1,
            required_fee_rate: original_fee.required_fee_rate(),
        });
    }

    Ok(quote)
}

pub struct ReplacementBuilder {
    dust_limit: Amount,
}

impl ReplacementBuilder {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            dust_limit: config.dust_limit,
        }
    }

    pub fn build(
        &self,
        kind: ReplacementKind,
        original: &OriginalTransaction,
        original_fee: &OriginalFee,
        source: &Address,
        quote: FeeQuote,
    ) -> RbfResult<TransactionDraft> {
        if !original.inputs.iter().any(|input| input.sequence.is_rbf()) {
            tracing::warn!(
                "Original transaction {} does not signal RBF, nodes without full-RBF may reject the replacement",
                original.txid
            );
        }

        let inputs: Vec<DraftInput> = original
            .inputs
            .iter()
            .zip(&original_fee.funding)
            .map(|(input, prevout)| DraftInput {
                outpoint: input.outpoint,
                prevout: prevout.clone(),
                sequence: Sequence::ENABLE_RBF_NO_LOCKTIME,
            })
            .collect();

        let total_input = original_fee.total_input();
        let source_script = source.script_pubkey();

        let outputs = match kind {
            ReplacementKind::Cancel => {
                let value = total_input
                    .checked_sub(quote.absolute_fee)
                    .ok_or_else(|| RbfError::insufficient(total_input, quote.absolute_fee))?;
                if value <= self.dust_limit {
                    return Err(RbfError::AmountBelowDust {
                        value: value.to_sat(),
                        dust_limit: self.dust_limit.to_sat(),
                    });
                }
                vec![OutputSpec::new(source_script, value)]
            }
            ReplacementKind::Accelerate => {
                let recipient = original
                    .outputs
                    .iter()
                    .find(|out| out.script_pubkey != source_script)
                    .ok_or(RbfError::RecipientOutputNotFound {
                        txid: original.txid,
                    })?;

                let required = recipient
                    .value
                    .checked_add(quote.absolute_fee)
                    .ok_or(RbfError::InvalidFeeRate(quote.fee_rate))?;
                let change = total_input
                    .checked_sub(required)
                    .ok_or_else(|| RbfError::insufficient(total_input, required))?;

                let mut outputs = vec![OutputSpec::new(recipient.script_pubkey.clone(), recipient.value)];
                if change > self.dust_limit {
                    outputs.push(OutputSpec::new(source_script, change));
                }
                outputs
            }
        };

        tracing::info!(
            "Built {:?} replacement for {}: {} inputs, {} outputs, fee {} sats",
            kind,
            original.txid,
            inputs.len(),
            outputs.len(),
            quote.absolute_fee.to_sat()
        );

        Ok(TransactionDraft {
            inputs,
            outputs,
            quote,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::transaction::OriginalInput;
    use crate::services::onchain::signer::tests::test_key;
    use bitcoin::hashes::Hash;
    use bitcoin::{Network, OutPoint, ScriptBuf, Txid};
    use proptest::prelude::*;

    fn outpoint(vout: u32) -> OutPoint {
        OutPoint {
            txid: Txid::all_zeros(),
            vout,
        }
    }

    fn txout(script: ScriptBuf, value: u64) -> TxOut {
        TxOut {
            value: Amount::from_sat(value),
            script_pubkey: script,
        }
    }

    /// One 100k input paying `pay` to a recipient with change back to the source.
    fn original(pay: u64, fee: u64, vsize: u64) -> (OriginalTransaction, OriginalFee) {
        let source = test_key(1).script_pubkey();
        let recipient = test_key(3).script_pubkey();
        let tx = OriginalTransaction {
            txid: Txid::all_zeros(),
            confirmed: false,
            vsize,
            inputs: vec![OriginalInput {
                outpoint: outpoint(0),
                sequence: Sequence::ENABLE_RBF_NO_LOCKTIME,
            }],
            outputs: vec![
                txout(recipient, pay),
                txout(source.clone(), 100_000 - pay - fee),
            ],
        };
        let fee = OriginalFee::measure(&tx, vec![txout(source, 100_000)]).unwrap();
        (tx, fee)
    }

    fn fixed_quote(output_count: usize, sats: u64) -> FeeQuote {
        FeeQuote {
            estimated_weight: fee_model::estimate_weight(1, output_count),
            fee_rate: 20,
            absolute_fee: Amount::from_sat(sats),
        }
    }

    fn builder() -> ReplacementBuilder {
        ReplacementBuilder::new(&EngineConfig::new(Network::Testnet))
    }

    #[test]
    fn test_measure_original_fee() {
        let (_, fee) = original(50_000, 500, 100);
        assert_eq!(fee.fee, Amount::from_sat(500));
        assert_eq!(fee.fee_rate(), 5.0);
        assert_eq!(fee.total_input(), Amount::from_sat(100_000));
    }

    #[test]
    fn test_measure_rejects_misaligned_funding() {
        let (tx, _) = original(50_000, 500, 100);
        let err = OriginalFee::measure(&tx, vec![]).unwrap_err();
        assert!(matches!(err, RbfError::ChainDataUnavailable(_)));
    }

    #[test]
    fn test_unchanged_fee_rate_rejected() {
        let (tx, fee) = original(50_000, 500, 100);
        let err = validate(&tx, &fee, ReplacementKind::Accelerate, 5).unwrap_err();
        match err {
            RbfError::ReplacementFeeTooLow {
                original_fee,
                new_fee,
                required_fee,
                required_fee_rate,
                ..
            } => {
                assert_eq!(original_fee, 500);
                assert_eq!(new_fee, 703);
                assert_eq!(required_fee, 501);
                assert_eq!(required_fee_rate, 6);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_higher_rate_with_lower_fee_rejected() {
        // reported size far above the estimate: 2 sat/vB over 1000 vbytes
        let (tx, fee) = original(50_000, 2_000, 1_000);
        let err = validate(&tx, &fee, ReplacementKind::Cancel, 3).unwrap_err();
        assert!(matches!(err, RbfError::ReplacementFeeTooLow { new_fee: 329, .. }));
    }

    #[test]
    fn test_higher_rate_and_fee_accepted() {
        let (tx, fee) = original(50_000, 500, 100);
        let quote = validate(&tx, &fee, ReplacementKind::Accelerate, 6).unwrap();
        assert_eq!(quote.absolute_fee, Amount::from_sat(843));
        assert_eq!(quote.estimated_weight, fee_model::estimate_weight(1, 2));
    }

    #[test]
    fn test_confirmed_original_rejected() {
        let (mut tx, fee) = original(50_000, 500, 100);
        tx.confirmed = true;
        let err = validate(&tx, &fee, ReplacementKind::Cancel, 50).unwrap_err();
        assert!(matches!(err, RbfError::OriginalAlreadyConfirmed { .. }));
    }

    #[test]
    fn test_cancel_returns_everything_to_sender() {
        let (tx, fee) = original(50_000, 500, 100);
        let source = test_key(1).address();
        let draft = builder()
            .build(ReplacementKind::Cancel, &tx, &fee, &source, fixed_quote(1, 2_000))
            .unwrap();

        assert_eq!(draft.outputs.len(), 1);
        assert_eq!(draft.outputs[0].script_pubkey, source.script_pubkey());
        assert_eq!(draft.outputs[0].value, Amount::from_sat(98_000));
        assert_eq!(draft.inputs.len(), 1);
        assert_eq!(draft.inputs[0].outpoint, outpoint(0));
        assert!(draft.signals_rbf());
    }

    #[test]
    fn test_cancel_into_dust_rejected() {
        let (tx, fee) = original(50_000, 500, 100);
        let err = builder()
            .build(
                ReplacementKind::Cancel,
                &tx,
                &fee,
                &test_key(1).address(),
                fixed_quote(1, 99_600),
            )
            .unwrap_err();
        assert!(matches!(err, RbfError::AmountBelowDust { value: 400, dust_limit: 546 }));
    }

    #[test]
    fn test_cancel_leaving_exactly_dust_rejected() {
        let (tx, fee) = original(50_000, 500, 100);
        let err = builder()
            .build(
                ReplacementKind::Cancel,
                &tx,
                &fee,
                &test_key(1).address(),
                fixed_quote(1, 99_454),
            )
            .unwrap_err();
        assert!(matches!(err, RbfError::AmountBelowDust { value: 546, dust_limit: 546 }));
    }

    #[test]
    fn test_accelerate_drops_change_of_exactly_dust() {
        let (tx, fee) = original(50_000, 500, 100);
        let draft = builder()
            .build(
                ReplacementKind::Accelerate,
                &tx,
                &fee,
                &test_key(1).address(),
                fixed_quote(2, 49_454),
            )
            .unwrap();

        assert_eq!(draft.outputs.len(), 1);
        assert_eq!(draft.outputs[0].value, Amount::from_sat(50_000));
        assert_eq!(draft.fee(), Some(Amount::from_sat(50_000)));
    }

    #[test]
    fn test_accelerate_keeps_change_just_above_dust() {
        let (tx, fee) = original(50_000, 500, 100);
        let draft = builder()
            .build(
                ReplacementKind::Accelerate,
                &tx,
                &fee,
                &test_key(1).address(),
                fixed_quote(2, 49_453),
            )
            .unwrap();

        assert_eq!(draft.outputs.len(), 2);
        assert_eq!(draft.outputs[1].value, Amount::from_sat(547));
    }

    #[test]
    fn test_accelerate_keeps_recipient_and_shrinks_change() {
        let (tx, fee) = original(50_000, 500, 100);
        let draft = builder()
            .build(
                ReplacementKind::Accelerate,
                &tx,
                &fee,
                &test_key(1).address(),
                fixed_quote(2, 1_500),
            )
            .unwrap();

        assert_eq!(draft.outputs.len(), 2);
        assert_eq!(draft.outputs[0].script_pubkey, test_key(3).script_pubkey());
        assert_eq!(draft.outputs[0].value, Amount::from_sat(50_000));
        assert_eq!(draft.outputs[1].value, Amount::from_sat(48_500));
        assert_eq!(draft.fee(), Some(Amount::from_sat(1_500)));
    }

    #[test]
    fn test_accelerate_without_recipient_output() {
        let source = test_key(1);
        let (mut tx, fee) = original(50_000, 500, 100);
        tx.outputs = vec![txout(source.script_pubkey(), 99_500)];
        let err = builder()
            .build(
                ReplacementKind::Accelerate,
                &tx,
                &fee,
                &source.address(),
                fixed_quote(2, 1_000),
            )
            .unwrap_err();
        assert!(matches!(err, RbfError::RecipientOutputNotFound { .. }));
    }

    proptest! {
        #[test]
        fn accepted_replacements_beat_fee_and_rate(
            original_fee in 100u64..20_000,
            vsize in 110u64..400,
            new_rate in 1u64..200,
        ) {
            let (tx, fee) = original(50_000, original_fee, vsize);
            match validate(&tx, &fee, ReplacementKind::Accelerate, new_rate) {
                Ok(quote) => {
                    prop_assert!(quote.absolute_fee > fee.fee);
                    prop_assert!(new_rate as f64 > fee.fee_rate());
                }
                Err(RbfError::ReplacementFeeTooLow { new_fee, .. }) => {
                    prop_assert!(new_fee <= original_fee || new_rate as f64 <= fee.fee_rate());
                }
                Err(other) => prop_assert!(false, "unexpected error: {other:?}"),
            }
        }
    }
}
