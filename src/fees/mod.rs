mod blockstream;
mod client;
mod config;
mod electrum;
pub mod error;
mod mempool_space;

use async_trait::async_trait;

use crate::primitives::{bitcoin::FeeRate, *};
pub use blockstream::*;
pub use client::*;
pub use config::*;
pub use electrum::*;
use error::FeeEstimationError;
pub use mempool_space::*;

/// Version, locktime, in/out counts and segwit marker, rounded up.
pub const TX_OVERHEAD_VBYTES: usize = 11;
/// P2WPKH input including its witness.
pub const INPUT_VBYTES: usize = 68;
/// P2WPKH output.
pub const OUTPUT_VBYTES: usize = 31;
/// Change below this is folded into the fee.
pub const DUST_LIMIT: Satoshis = Satoshis::from_sats(546);

#[async_trait]
pub trait FeeRateEstimator: Send + Sync {
    async fn fee_rate(&self, priority: TxPriority) -> Result<FeeRate, FeeEstimationError>;
}

/// A fixed rate, for regtest deployments without a fee source.
#[derive(Debug, Clone, Copy)]
pub struct StaticFeeRate(FeeRate);

impl StaticFeeRate {
    pub fn new(sats_per_vbyte: f32) -> Self {
        Self(FeeRate::from_sat_per_vb(sats_per_vbyte))
    }
}

#[async_trait]
impl FeeRateEstimator for StaticFeeRate {
    async fn fee_rate(&self, _: TxPriority) -> Result<FeeRate, FeeEstimationError> {
        Ok(self.0)
    }
}

pub fn estimate_tx_vbytes(n_inputs: usize, n_outputs: usize) -> usize {
    TX_OVERHEAD_VBYTES + INPUT_VBYTES * n_inputs + OUTPUT_VBYTES * n_outputs
}

pub fn estimate_fee(fee_rate: FeeRate, n_inputs: usize, n_outputs: usize) -> Satoshis {
    Satoshis::from(fee_rate.fee_vb(estimate_tx_vbytes(n_inputs, n_outputs)))
}

/// Fee a single queued payout is expected to add to a batch: its own output
/// plus one input to fund it.
pub fn marginal_payout_fee(fee_rate: FeeRate) -> Satoshis {
    Satoshis::from(fee_rate.fee_vb(INPUT_VBYTES + OUTPUT_VBYTES))
}
