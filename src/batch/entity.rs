use serde::{Deserialize, Serialize};

use super::error::BatchError;
use crate::primitives::{
    bitcoin::{FeeRate, OutPoint, Txid},
    *,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Open,
    Broadcast,
    Confirmed,
    Cancelled,
}

impl std::fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Open => "open",
            Self::Broadcast => "broadcast",
            Self::Confirmed => "confirmed",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchPayout {
    pub payout_id: PayoutRequestId,
    pub destination: PayoutDestination,
    pub value: Satoshis,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PayoutBatch {
    pub id: BatchId,
    pub wallet_id: WalletId,
    pub payouts: Vec<BatchPayout>,
    pub inputs: Vec<OutPoint>,
    pub estimated_fee: Satoshis,
    pub change: Satoshis,
    pub sats_per_vbyte: f32,
    pub txid: Option<Txid>,
    pub status: BatchStatus,
    pub confirmed_height: Option<u32>,
    pub cancel_reason: Option<String>,
}

impl PayoutBatch {
    pub fn total_payouts(&self) -> Satoshis {
        self.payouts.iter().map(|p| p.value).sum()
    }

    pub fn fee_rate(&self) -> FeeRate {
        FeeRate::from_sat_per_vb(self.sats_per_vbyte)
    }

    /// Open and Broadcast batches hold their inputs and count as outgoing.
    pub fn is_active(&self) -> bool {
        matches!(self.status, BatchStatus::Open | BatchStatus::Broadcast)
    }

    pub(crate) fn check_balanced(&self, input_total: Satoshis) -> Result<(), BatchError> {
        let allocated = self.total_payouts() + self.estimated_fee + self.change;
        if allocated != input_total {
            return Err(BatchError::Unbalanced {
                batch_id: self.id,
                inputs: input_total,
                allocated,
            });
        }
        Ok(())
    }

    fn invalid_state(&self) -> BatchError {
        BatchError::InvalidState {
            batch_id: self.id,
            status: self.status,
        }
    }

    /// Returns false when the batch already carries this txid.
    pub(crate) fn broadcast(&mut self, txid: Txid) -> Result<bool, BatchError> {
        match self.status {
            BatchStatus::Open => {
                self.status = BatchStatus::Broadcast;
                self.txid = Some(txid);
                Ok(true)
            }
            BatchStatus::Broadcast if self.txid == Some(txid) => Ok(false),
            _ => Err(self.invalid_state()),
        }
    }

    pub(crate) fn confirm(&mut self, block_height: u32) -> Result<bool, BatchError> {
        match self.status {
            BatchStatus::Broadcast => {
                self.status = BatchStatus::Confirmed;
                self.confirmed_height = Some(block_height);
                Ok(true)
            }
            BatchStatus::Confirmed => Ok(false),
            _ => Err(self.invalid_state()),
        }
    }

    pub(crate) fn cancel(&mut self, reason: String) -> Result<bool, BatchError> {
        match self.status {
            BatchStatus::Open => {
                self.status = BatchStatus::Cancelled;
                self.cancel_reason = Some(reason);
                Ok(true)
            }
            BatchStatus::Cancelled => Ok(false),
            _ => Err(self.invalid_state()),
        }
    }

    /// Puts a batch that lost inputs to a reorg back into the Open state.
    pub(crate) fn reopen(
        &mut self,
        remaining_inputs: Vec<OutPoint>,
        estimated_fee: Satoshis,
        change: Satoshis,
    ) -> Result<(), BatchError> {
        if self.status == BatchStatus::Cancelled {
            return Err(self.invalid_state());
        }
        self.inputs = remaining_inputs;
        self.estimated_fee = estimated_fee;
        self.change = change;
        self.txid = None;
        self.confirmed_height = None;
        self.status = BatchStatus::Open;
        Ok(())
    }

    pub(crate) fn dissolve(&mut self, reason: String) -> Result<(), BatchError> {
        if self.status == BatchStatus::Cancelled {
            return Err(self.invalid_state());
        }
        self.status = BatchStatus::Cancelled;
        self.cancel_reason = Some(reason);
        Ok(())
    }
}
