use thiserror::Error;

use crate::primitives::{bitcoin::AddressError, *};

#[derive(Error, Debug)]
pub enum PayoutError {
    #[error("PayoutError - Payout {0} is already committed to batch {1}")]
    PayoutAlreadyCommitted(PayoutRequestId, BatchId),
    #[error("PayoutError - Payout {0} is already cancelled")]
    PayoutAlreadyCancelled(PayoutRequestId),
    #[error("PayoutError - external_id already exists: {0}")]
    ExternalIdAlreadyExists(String),
    #[error("PayoutError - Payout value must be greater than zero")]
    ZeroValue,
    #[error("PayoutError - Invalid destination '{0}': {1}")]
    InvalidDestination(String, AddressError),
    #[error("PayoutError - NewPayoutBuilder: {0}")]
    Builder(#[from] super::NewPayoutBuilderError),
}
