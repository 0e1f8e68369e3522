use thiserror::Error;

use crate::{
    batch::{error::BatchError, BatchStatus},
    event_log::error::EventLogError,
    fees::error::FeeEstimationError,
    node::error::NodeError,
    payout::error::PayoutError,
    primitives::*,
    signing_client::error::SigningClientError,
    utxo::error::UtxoError,
};

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("LedgerError - InvalidTransition: {0}")]
    InvalidTransition(#[from] UtxoError),
    #[error("LedgerError - InsufficientFunds: needed {needed} sats, available {available} sats")]
    InsufficientFunds {
        needed: Satoshis,
        available: Satoshis,
    },
    #[error("LedgerError - InvalidState: batch {batch_id} is {status}")]
    InvalidState {
        batch_id: BatchId,
        status: BatchStatus,
    },
    #[error("LedgerError - UnbalancedBatch: batch {batch_id} spends {inputs} sats but allocates {allocated} sats")]
    UnbalancedBatch {
        batch_id: BatchId,
        inputs: Satoshis,
        allocated: Satoshis,
    },
    #[error("LedgerError - NodeError: {0}")]
    NodeError(#[from] NodeError),
    #[error("LedgerError - SigningClient: {0}")]
    SigningClient(#[from] SigningClientError),
    #[error("LedgerError - FeeEstimation: {0}")]
    FeeEstimation(#[from] FeeEstimationError),
    #[error("LedgerError - ReorgCompensationFailure: wallet {wallet_id}: {reason}")]
    ReorgCompensationFailure { wallet_id: WalletId, reason: String },
    #[error("LedgerError - WalletHalted: wallet {wallet_id} is halted: {reason}")]
    WalletHalted { wallet_id: WalletId, reason: String },
    #[error("LedgerError - WalletNotFound: {0}")]
    WalletNotFound(WalletId),
    #[error("LedgerError - WalletNameNotFound: {0}")]
    WalletNameNotFound(String),
    #[error("LedgerError - WalletAlreadyExists: {0}")]
    WalletAlreadyExists(String),
    #[error("LedgerError - InvalidSettleThreshold: {0} must be at least 1")]
    InvalidSettleThreshold(u32),
    #[error("LedgerError - PayoutNotFound: {0}")]
    PayoutNotFound(PayoutRequestId),
    #[error("LedgerError - Payout: {0}")]
    Payout(#[from] PayoutError),
    #[error("LedgerError - BatchNotFound: {0}")]
    BatchNotFound(BatchId),
    #[error("LedgerError - NoPendingPayouts: wallet {0} has no queued payouts")]
    NoPendingPayouts(WalletId),
    #[error("LedgerError - LockTimeout: could not lock wallet {0} in time")]
    LockTimeout(WalletId),
    #[error("LedgerError - CorruptLog: wallet {wallet_id} expected sequence {expected} found {found}")]
    CorruptLog {
        wallet_id: WalletId,
        expected: u64,
        found: u64,
    },
    #[error("LedgerError - MissingWalletCreated: log of wallet {0} does not start with its creation")]
    MissingWalletCreated(WalletId),
    #[error("LedgerError - EventLog: {0}")]
    EventLog(#[from] EventLogError),
}

impl From<BatchError> for LedgerError {
    fn from(err: BatchError) -> Self {
        match err {
            BatchError::InsufficientFunds { needed, available } => {
                LedgerError::InsufficientFunds { needed, available }
            }
            BatchError::InvalidState { batch_id, status } => {
                LedgerError::InvalidState { batch_id, status }
            }
            BatchError::Unbalanced {
                batch_id,
                inputs,
                allocated,
            } => LedgerError::UnbalancedBatch {
                batch_id,
                inputs,
                allocated,
            },
        }
    }
}

impl LedgerError {
    /// Errors caused by a notification that no longer fits the wallet state.
    pub fn is_stale_notification(&self) -> bool {
        matches!(
            self,
            LedgerError::InvalidTransition(_) | LedgerError::InvalidState { .. }
        )
    }
}
