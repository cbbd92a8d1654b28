use bitcoin::{Amount, Weight};
use serde::Serialize;

use crate::error::{RbfError, RbfResult};

// P2WPKH spend: 41 bytes of outpoint/sequence/empty script_sig plus ~108 witness bytes.
pub const INPUT_WEIGHT: Weight = Weight::from_wu(272);
// P2WPKH output: 8 byte value + 23 byte script.
pub const OUTPUT_WEIGHT: Weight = Weight::from_wu(124);
// version, locktime, counts and the segwit marker/flag.
pub const TX_OVERHEAD_WEIGHT: Weight = Weight::from_wu(42);

/// Fee for a transaction shape at a given rate. Every component sizes fees through here so
/// that the same shape always yields the same number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FeeQuote {
    pub estimated_weight: Weight,
    /// sat/vB
    pub fee_rate: u64,
    pub absolute_fee: Amount,
}

impl FeeQuote {
    pub fn virtual_bytes(&self) -> f64 {
        self.estimated_weight.to_wu() as f64 / 4.0
    }
}

pub fn estimate_weight(input_count: usize, output_count: usize) -> Weight {
    INPUT_WEIGHT * input_count as u64 + OUTPUT_WEIGHT * output_count as u64 + TX_OVERHEAD_WEIGHT
}

/// `ceil(vbytes * fee_rate)`, computed in weight units so the half-vbyte overhead
/// never goes through floating point.
pub fn quote(input_count: usize, output_count: usize, fee_rate: u64) -> RbfResult<FeeQuote> {
    if fee_rate == 0 {
        return Err(RbfError::InvalidFeeRate(fee_rate));
    }

    let estimated_weight = estimate_weight(input_count, output_count);
    let sats = estimated_weight
        .to_wu()
        .checked_mul(fee_rate)
        .ok_or(RbfError::InvalidFeeRate(fee_rate))?
        .div_ceil(4);

    Ok(FeeQuote {
        estimated_weight,
        fee_rate,
        absolute_fee: Amount::from_sat(sats),
    })
}
