use thiserror::Error;

#[derive(Debug, Error)]
pub enum FeeEstimationError {
    #[error("FeeEstimationError - FeeEstimation: {0}")]
    FeeEstimation(#[from] reqwest::Error),
    #[error("FeeEstimationError - Middleware: {0}")]
    Middleware(#[from] reqwest_middleware::Error),
    #[error("FeeEstimationError - CouldNotDecodeResponseBody: {0}")]
    CouldNotDecodeResponseBody(reqwest::Error),
    #[error("FeeEstimationError - Electrum: {0}")]
    Electrum(#[from] electrum_client::Error),
    #[error("FeeEstimationError - NoEstimate: source had no estimate for {0} blocks")]
    NoEstimate(usize),
    #[error("FeeEstimationError - Join: {0}")]
    Join(#[from] tokio::task::JoinError),
}
