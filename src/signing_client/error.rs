use thiserror::Error;

use crate::primitives::bitcoin::{consensus, AddressError};

#[derive(Error, Debug)]
pub enum SigningClientError {
    #[error("SigningClientError - CouldNotConnect: {0}")]
    CouldNotConnect(String),
    #[error("SigningClientError - RemoteCallFailure: {0}")]
    RemoteCallFailure(String),
    #[error("SigningClientError - Encode: {0}")]
    Encode(#[from] consensus::encode::Error),
    #[error("SigningClientError - IncompleteSignature: signer could not sign every input")]
    IncompleteSignature,
    #[error("SigningClientError - MissingChangeAddress: batch carries change but no change address was given")]
    MissingChangeAddress,
    #[error("SigningClientError - InvalidChangeAddress: {0}")]
    InvalidChangeAddress(#[from] AddressError),
    #[error("SigningClientError - Join: {0}")]
    Join(#[from] tokio::task::JoinError),
}
