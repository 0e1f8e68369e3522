use async_trait::async_trait;
use bitcoincore_rpc::{Auth, Client, RpcApi};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use std::sync::Arc;

use super::{error::NodeError, NodeClient};
use crate::primitives::bitcoin::{Transaction, Txid};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BitcoindConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_rpc_user")]
    pub rpc_user: String,
    #[serde(default = "default_rpc_password")]
    pub rpc_password: String,
    #[serde(default)]
    pub change_address: Option<String>,
}

impl Default for BitcoindConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            rpc_user: default_rpc_user(),
            rpc_password: default_rpc_password(),
            change_address: None,
        }
    }
}

impl BitcoindConfig {
    pub(crate) fn rpc_client(&self) -> Result<Client, bitcoincore_rpc::Error> {
        let auth = Auth::UserPass(self.rpc_user.clone(), self.rpc_password.clone());
        Client::new(&self.endpoint, auth)
    }
}

fn default_endpoint() -> String {
    "http://127.0.0.1:18443".to_string()
}

fn default_rpc_user() -> String {
    "rpcuser".to_string()
}

fn default_rpc_password() -> String {
    "rpcpassword".to_string()
}

#[derive(Clone)]
pub struct BitcoindNode {
    inner: Arc<Client>,
}

impl BitcoindNode {
    pub fn connect(config: &BitcoindConfig) -> Result<Self, NodeError> {
        let client = config.rpc_client().map_err(|e| {
            NodeError::CouldNotConnect(format!("Failed to connect to bitcoind: {e}"))
        })?;
        Ok(Self {
            inner: Arc::new(client),
        })
    }
}

#[async_trait]
impl NodeClient for BitcoindNode {
    #[instrument(name = "bitcoind.tip_height", skip(self), err)]
    async fn tip_height(&self) -> Result<u32, NodeError> {
        let client = Arc::clone(&self.inner);
        let height = tokio::task::spawn_blocking(move || client.get_block_count()).await??;
        Ok(height as u32)
    }

    #[instrument(name = "bitcoind.broadcast", skip_all, fields(txid = %tx.txid()), err)]
    async fn broadcast(&self, tx: &Transaction) -> Result<Txid, NodeError> {
        let client = Arc::clone(&self.inner);
        let tx = tx.clone();
        let txid = tokio::task::spawn_blocking(move || client.send_raw_transaction(&tx)).await??;
        Ok(txid)
    }
}
