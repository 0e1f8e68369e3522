use serde::{Deserialize, Serialize};

use crate::primitives::{
    bitcoin::{OutPoint, Txid},
    Satoshis,
};

/// What the chain watcher reports about a wallet. Notifications may arrive
/// more than once and out of order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChainNotification {
    OutputDetected {
        outpoint: OutPoint,
        value: Satoshis,
        derivation_path: String,
        block_height: Option<u32>,
    },
    OutputConfirmed {
        outpoint: OutPoint,
        block_height: u32,
    },
    TipAdvanced {
        height: u32,
    },
    Reorg {
        invalidated: Vec<OutPoint>,
    },
    SpendConfirmed {
        txid: Txid,
        block_height: u32,
    },
}

impl ChainNotification {
    pub fn name(&self) -> &'static str {
        match self {
            Self::OutputDetected { .. } => "output_detected",
            Self::OutputConfirmed { .. } => "output_confirmed",
            Self::TipAdvanced { .. } => "tip_advanced",
            Self::Reorg { .. } => "reorg",
            Self::SpendConfirmed { .. } => "spend_confirmed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum IngestOutcome {
    Applied { sequence: u64 },
    /// Redelivery of something the ledger already reflects.
    Unchanged,
    /// The notification no longer fits the wallet and was skipped.
    Dropped { reason: String },
}
