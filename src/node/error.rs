use thiserror::Error;

#[derive(Error, Debug)]
pub enum NodeError {
    #[error("NodeError - CouldNotConnect: {0}")]
    CouldNotConnect(String),
    #[error("NodeError - Rejected: {0}")]
    Rejected(String),
    #[error("NodeError - Rpc: {0}")]
    Rpc(bitcoincore_rpc::Error),
    #[error("NodeError - Join: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl From<bitcoincore_rpc::Error> for NodeError {
    fn from(err: bitcoincore_rpc::Error) -> Self {
        match err {
            bitcoincore_rpc::Error::JsonRpc(bitcoincore_rpc::jsonrpc::Error::Rpc(rpc)) => {
                NodeError::Rejected(rpc.message)
            }
            err => NodeError::Rpc(err),
        }
    }
}
