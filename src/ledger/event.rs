use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    primitives::{
        bitcoin::{OutPoint, Txid},
        *,
    },
    utxo::UtxoEvent,
};

/// How a batch that lost an input to a reorg is repaired.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BatchCompensation {
    /// The surviving inputs still fund the batch. It goes back to Open.
    Reopened {
        batch_id: BatchId,
        remaining_inputs: Vec<OutPoint>,
        estimated_fee: Satoshis,
        change: Satoshis,
    },
    /// The batch is cancelled, surviving inputs released and payouts re-queued.
    Dissolved {
        batch_id: BatchId,
        released_inputs: Vec<OutPoint>,
    },
}

impl BatchCompensation {
    pub fn batch_id(&self) -> BatchId {
        match self {
            Self::Reopened { batch_id, .. } | Self::Dissolved { batch_id, .. } => *batch_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerEvent {
    WalletCreated {
        wallet_id: WalletId,
        name: String,
        settle_threshold: u32,
    },
    SettleThresholdUpdated {
        settle_threshold: u32,
    },
    ChainTipUpdated {
        height: u32,
    },
    FeeRateObserved {
        sats_per_vbyte: f32,
    },
    Utxo {
        event: UtxoEvent,
    },
    PayoutSubmitted {
        id: PayoutRequestId,
        destination: PayoutDestination,
        value: Satoshis,
        submitted_at: DateTime<Utc>,
        external_id: Option<String>,
        metadata: Option<serde_json::Value>,
    },
    PayoutCancelled {
        payout_id: PayoutRequestId,
    },
    BatchFormed {
        batch_id: BatchId,
        payout_ids: Vec<PayoutRequestId>,
        inputs: Vec<OutPoint>,
        estimated_fee: Satoshis,
        change: Satoshis,
        sats_per_vbyte: f32,
    },
    BatchBroadcast {
        batch_id: BatchId,
        txid: Txid,
    },
    BatchConfirmed {
        batch_id: BatchId,
        block_height: u32,
    },
    BatchCancelled {
        batch_id: BatchId,
        reason: String,
    },
    ReorgCompensated {
        outpoint: OutPoint,
        compensation: BatchCompensation,
    },
}

impl LedgerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::WalletCreated { .. } => "wallet_created",
            Self::SettleThresholdUpdated { .. } => "settle_threshold_updated",
            Self::ChainTipUpdated { .. } => "chain_tip_updated",
            Self::FeeRateObserved { .. } => "fee_rate_observed",
            Self::Utxo { event } => event.name(),
            Self::PayoutSubmitted { .. } => "payout_submitted",
            Self::PayoutCancelled { .. } => "payout_cancelled",
            Self::BatchFormed { .. } => "batch_formed",
            Self::BatchBroadcast { .. } => "batch_broadcast",
            Self::BatchConfirmed { .. } => "batch_confirmed",
            Self::BatchCancelled { .. } => "batch_cancelled",
            Self::ReorgCompensated { .. } => "reorg_compensated",
        }
    }
}

impl From<UtxoEvent> for LedgerEvent {
    fn from(event: UtxoEvent) -> Self {
        LedgerEvent::Utxo { event }
    }
}

/// One committed ledger transaction as it is stored in the event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub sequence: u64,
    pub recorded_at: DateTime<Utc>,
    pub events: Vec<LedgerEvent>,
}

impl LedgerEntry {
    pub fn event_types(&self) -> Vec<String> {
        self.events.iter().map(|e| e.name().to_string()).collect()
    }
}
