use thiserror::Error;

use crate::{
    event_log::error::EventLogError, fees::error::FeeEstimationError, ledger::error::LedgerError,
    node::error::NodeError, signing_client::error::SigningClientError,
};

#[derive(Error, Debug)]
pub enum ApplicationError {
    #[error("ApplicationError - Ledger: {0}")]
    Ledger(#[from] LedgerError),
    #[error("ApplicationError - EventLog: {0}")]
    EventLog(#[from] EventLogError),
    #[error("ApplicationError - Node: {0}")]
    Node(#[from] NodeError),
    #[error("ApplicationError - FeeEstimation: {0}")]
    FeeEstimation(#[from] FeeEstimationError),
    #[error("ApplicationError - SigningClient: {0}")]
    SigningClient(#[from] SigningClientError),
}
