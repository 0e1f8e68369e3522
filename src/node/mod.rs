mod bitcoind;
pub mod error;

use async_trait::async_trait;

use crate::primitives::bitcoin::{Transaction, Txid};
pub use bitcoind::*;
use error::NodeError;

#[async_trait]
pub trait NodeClient: Send + Sync {
    async fn tip_height(&self) -> Result<u32, NodeError>;
    async fn broadcast(&self, tx: &Transaction) -> Result<Txid, NodeError>;
}
