use async_trait::async_trait;

use super::error::*;
use crate::primitives::{
    bitcoin::{Address, OutPoint, Transaction},
    Satoshis,
};

/// What a signer needs to know about each input it is asked to sign.
#[derive(Debug, Clone)]
pub struct SigningInput {
    pub outpoint: OutPoint,
    pub value: Satoshis,
    pub derivation_path: String,
}

#[async_trait]
pub trait TransactionSigner: Send + Sync {
    async fn change_address(&self) -> Result<Address, SigningClientError>;

    async fn sign(
        &self,
        unsigned: Transaction,
        inputs: &[SigningInput],
    ) -> Result<Transaction, SigningClientError>;
}
