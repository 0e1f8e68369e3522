use chrono::{DateTime, Utc};
use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use super::error::PayoutError;
use crate::primitives::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PayoutStatus {
    Queued,
    Batched { batch_id: BatchId },
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayoutRequest {
    pub id: PayoutRequestId,
    pub wallet_id: WalletId,
    pub destination: PayoutDestination,
    pub value: Satoshis,
    pub submitted_at: DateTime<Utc>,
    pub external_id: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub status: PayoutStatus,
}

impl PayoutRequest {
    pub fn is_queued(&self) -> bool {
        self.status == PayoutStatus::Queued
    }

    pub(crate) fn commit_to_batch(&mut self, batch_id: BatchId) -> Result<(), PayoutError> {
        match self.status {
            PayoutStatus::Queued => {
                self.status = PayoutStatus::Batched { batch_id };
                Ok(())
            }
            PayoutStatus::Batched { batch_id: current } => {
                Err(PayoutError::PayoutAlreadyCommitted(self.id, current))
            }
            PayoutStatus::Cancelled => Err(PayoutError::PayoutAlreadyCancelled(self.id)),
        }
    }

    pub(crate) fn cancel(&mut self) -> Result<bool, PayoutError> {
        match self.status {
            PayoutStatus::Queued => {
                self.status = PayoutStatus::Cancelled;
                Ok(true)
            }
            PayoutStatus::Cancelled => Ok(false),
            PayoutStatus::Batched { batch_id } => {
                Err(PayoutError::PayoutAlreadyCommitted(self.id, batch_id))
            }
        }
    }

    pub(crate) fn return_to_queue(&mut self) {
        self.status = PayoutStatus::Queued;
    }
}

#[derive(Debug, Builder, Clone)]
pub struct NewPayout {
    #[builder(setter(into))]
    pub(crate) id: PayoutRequestId,
    #[builder(setter(into))]
    pub(crate) wallet_id: WalletId,
    pub(crate) destination: PayoutDestination,
    #[builder(setter(into))]
    pub(crate) value: Satoshis,
    #[builder(default, setter(into, strip_option))]
    pub(crate) external_id: Option<String>,
    #[builder(default, setter(strip_option))]
    pub(crate) metadata: Option<serde_json::Value>,
}

impl NewPayout {
    pub fn builder() -> NewPayoutBuilder {
        let mut builder = NewPayoutBuilder::default();
        builder.id(PayoutRequestId::new());
        builder
    }

    pub fn id(&self) -> PayoutRequestId {
        self.id
    }

    pub fn wallet_id(&self) -> WalletId {
        self.wallet_id
    }

    pub(crate) fn validate(&self, network: bitcoin::Network) -> Result<(), PayoutError> {
        if self.value == Satoshis::ZERO {
            return Err(PayoutError::ZeroValue);
        }
        self.destination
            .onchain_address(network)
            .map_err(|e| PayoutError::InvalidDestination(self.destination.to_string(), e))?;
        Ok(())
    }

    pub(crate) fn into_request(self, submitted_at: DateTime<Utc>) -> PayoutRequest {
        PayoutRequest {
            id: self.id,
            wallet_id: self.wallet_id,
            destination: self.destination,
            value: self.value,
            submitted_at,
            external_id: self.external_id,
            metadata: self.metadata,
            status: PayoutStatus::Queued,
        }
    }
}
