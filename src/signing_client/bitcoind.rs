use async_trait::async_trait;
use bitcoincore_rpc::{json::AddressType, Client, RpcApi};
use tracing::instrument;

use std::sync::Arc;

use super::{error::*, r#trait::*};
use crate::{
    node::BitcoindConfig,
    primitives::bitcoin::{Address, Network, NetworkUnchecked, Transaction},
};

/// Signs with the keys held by the bitcoind wallet the rpc user has access to.
#[derive(Clone)]
pub struct BitcoindSigner {
    inner: Arc<Client>,
    change_address: Option<String>,
    network: Network,
}

impl BitcoindSigner {
    pub fn connect(cfg: &BitcoindConfig, network: Network) -> Result<Self, SigningClientError> {
        let client = cfg.rpc_client().map_err(|e| {
            SigningClientError::CouldNotConnect(format!("Failed to connect to bitcoind: {e}"))
        })?;
        Ok(Self {
            inner: Arc::new(client),
            change_address: cfg.change_address.clone(),
            network,
        })
    }
}

#[async_trait]
impl TransactionSigner for BitcoindSigner {
    /// The configured change address, or a fresh one from the wallet.
    async fn change_address(&self) -> Result<Address, SigningClientError> {
        let address = match &self.change_address {
            Some(address) => address.parse::<Address<NetworkUnchecked>>()?,
            None => {
                let client = Arc::clone(&self.inner);
                tokio::task::spawn_blocking(move || {
                    client.get_raw_change_address(Some(AddressType::Bech32))
                })
                .await?
                .map_err(|e| {
                    SigningClientError::RemoteCallFailure(format!(
                        "Failed to get change address from bitcoind: {e}"
                    ))
                })?
            }
        };
        Ok(address.require_network(self.network)?)
    }

    #[instrument(name = "bitcoind.sign", skip_all, fields(n_inputs = inputs.len()), err)]
    async fn sign(
        &self,
        unsigned: Transaction,
        inputs: &[SigningInput],
    ) -> Result<Transaction, SigningClientError> {
        let client = Arc::clone(&self.inner);
        let response = tokio::task::spawn_blocking(move || {
            client.sign_raw_transaction_with_wallet(&unsigned, None, None)
        })
        .await?
        .map_err(|e| {
            SigningClientError::RemoteCallFailure(format!("Failed to sign tx via bitcoind: {e}"))
        })?;
        if !response.complete {
            return Err(SigningClientError::IncompleteSignature);
        }
        Ok(response.transaction()?)
    }
}
