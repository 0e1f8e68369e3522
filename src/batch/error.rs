use thiserror::Error;

use super::entity::BatchStatus;
use crate::primitives::*;

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("BatchError - InsufficientFunds: needed {needed} sats, available {available} sats")]
    InsufficientFunds {
        needed: Satoshis,
        available: Satoshis,
    },
    #[error("BatchError - InvalidState: batch {batch_id} is {status}")]
    InvalidState {
        batch_id: BatchId,
        status: BatchStatus,
    },
    #[error("BatchError - Unbalanced: batch {batch_id} spends {inputs} sats but allocates {allocated} sats")]
    Unbalanced {
        batch_id: BatchId,
        inputs: Satoshis,
        allocated: Satoshis,
    },
}
