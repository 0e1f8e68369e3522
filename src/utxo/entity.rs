use serde::{Deserialize, Serialize};

use super::error::UtxoError;
use crate::primitives::{bitcoin::OutPoint, *};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum UtxoState {
    Pending,
    Confirmed,
    Settled,
    Encumbered,
    Spent,
    Invalidated,
}

impl std::fmt::Display for UtxoState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Settled => "settled",
            Self::Encumbered => "encumbered",
            Self::Spent => "spent",
            Self::Invalidated => "invalidated",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UtxoEvent {
    Detected {
        outpoint: OutPoint,
        value: Satoshis,
        derivation_path: String,
        block_height: Option<u32>,
    },
    ConfirmationAdvanced {
        outpoint: OutPoint,
        block_height: u32,
    },
    Invalidated {
        outpoint: OutPoint,
    },
    Encumbered {
        outpoint: OutPoint,
        batch_id: BatchId,
    },
    Released {
        outpoint: OutPoint,
    },
    Spent {
        outpoint: OutPoint,
        batch_id: BatchId,
    },
}

impl UtxoEvent {
    pub fn outpoint(&self) -> OutPoint {
        match self {
            Self::Detected { outpoint, .. }
            | Self::ConfirmationAdvanced { outpoint, .. }
            | Self::Invalidated { outpoint }
            | Self::Encumbered { outpoint, .. }
            | Self::Released { outpoint }
            | Self::Spent { outpoint, .. } => *outpoint,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Detected { .. } => "detected",
            Self::ConfirmationAdvanced { .. } => "confirmation_advanced",
            Self::Invalidated { .. } => "invalidated",
            Self::Encumbered { .. } => "encumbered",
            Self::Released { .. } => "released",
            Self::Spent { .. } => "spent",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Applied,
    AlreadyApplied,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Reservation {
    Encumbered { batch_id: BatchId },
    Spent { batch_id: BatchId },
}

impl Reservation {
    pub fn batch_id(&self) -> BatchId {
        match self {
            Self::Encumbered { batch_id } | Self::Spent { batch_id } => *batch_id,
        }
    }
}

/// Chain context needed to derive a utxo's confirmation state.
#[derive(Debug, Clone, Copy)]
pub struct ChainView {
    pub tip: Option<u32>,
    pub settle_threshold: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utxo {
    pub outpoint: OutPoint,
    pub wallet_id: WalletId,
    pub value: Satoshis,
    pub derivation_path: String,
    pub detected_height: Option<u32>,
    pub(crate) reservation: Option<Reservation>,
    pub(crate) invalidated: bool,
}

impl Utxo {
    pub(crate) fn detected(
        wallet_id: WalletId,
        outpoint: OutPoint,
        value: Satoshis,
        derivation_path: String,
        block_height: Option<u32>,
    ) -> Self {
        Self {
            outpoint,
            wallet_id,
            value,
            derivation_path,
            detected_height: block_height,
            reservation: None,
            invalidated: false,
        }
    }

    pub fn confirmations(&self, tip: Option<u32>) -> u32 {
        match (self.detected_height, tip) {
            (Some(height), Some(tip)) if tip >= height => tip - height + 1,
            _ => 0,
        }
    }

    pub fn state(&self, chain: ChainView) -> UtxoState {
        if self.invalidated {
            return UtxoState::Invalidated;
        }
        match self.reservation {
            Some(Reservation::Spent { .. }) => return UtxoState::Spent,
            Some(Reservation::Encumbered { .. }) => return UtxoState::Encumbered,
            None => (),
        }
        match self.confirmations(chain.tip) {
            0 => UtxoState::Pending,
            n if n < chain.settle_threshold => UtxoState::Confirmed,
            _ => UtxoState::Settled,
        }
    }

    pub fn reserved_by(&self) -> Option<BatchId> {
        self.reservation.map(|r| r.batch_id())
    }

    /// Applies any event other than `Detected` to an existing utxo.
    pub(crate) fn apply(
        &mut self,
        event: &UtxoEvent,
        chain: ChainView,
    ) -> Result<Transition, UtxoError> {
        let state = self.state(chain);
        let outpoint = self.outpoint;
        let invalid = || UtxoError::InvalidTransition {
            outpoint,
            state: Some(state),
            event: event.name(),
        };
        match event {
            UtxoEvent::Detected { value, .. } => {
                if *value == self.value {
                    Ok(Transition::AlreadyApplied)
                } else {
                    Err(invalid())
                }
            }
            UtxoEvent::ConfirmationAdvanced { block_height, .. } => {
                if self.detected_height == Some(*block_height) {
                    return Ok(Transition::AlreadyApplied);
                }
                if self.invalidated || self.detected_height.is_some() {
                    return Err(invalid());
                }
                self.detected_height = Some(*block_height);
                Ok(Transition::Applied)
            }
            UtxoEvent::Invalidated { .. } => {
                if self.invalidated {
                    return Ok(Transition::AlreadyApplied);
                }
                if self.reservation.is_some() {
                    // reserved outputs are only invalidated together with their batch
                    return Err(invalid());
                }
                self.invalidated = true;
                Ok(Transition::Applied)
            }
            UtxoEvent::Encumbered { batch_id, .. } => match (state, self.reservation) {
                (UtxoState::Encumbered, Some(Reservation::Encumbered { batch_id: current }))
                    if current == *batch_id =>
                {
                    Ok(Transition::AlreadyApplied)
                }
                (UtxoState::Settled, None) => {
                    self.reservation = Some(Reservation::Encumbered {
                        batch_id: *batch_id,
                    });
                    Ok(Transition::Applied)
                }
                _ => Err(invalid()),
            },
            UtxoEvent::Released { .. } => match state {
                UtxoState::Encumbered => {
                    self.reservation = None;
                    Ok(Transition::Applied)
                }
                UtxoState::Pending | UtxoState::Confirmed | UtxoState::Settled => {
                    Ok(Transition::AlreadyApplied)
                }
                _ => Err(invalid()),
            },
            UtxoEvent::Spent { batch_id, .. } => match self.reservation {
                Some(Reservation::Spent { batch_id: current }) if current == *batch_id => {
                    Ok(Transition::AlreadyApplied)
                }
                Some(Reservation::Encumbered { batch_id: current })
                    if current == *batch_id && !self.invalidated =>
                {
                    self.reservation = Some(Reservation::Spent {
                        batch_id: *batch_id,
                    });
                    Ok(Transition::Applied)
                }
                _ => Err(invalid()),
            },
        }
    }
}

/// Read view of a utxo with its state derived against the current chain tip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WalletUtxo {
    pub outpoint: OutPoint,
    pub wallet_id: WalletId,
    pub value: Satoshis,
    pub derivation_path: String,
    pub detected_height: Option<u32>,
    pub confirmations: u32,
    pub state: UtxoState,
    pub batch_id: Option<BatchId>,
}

impl WalletUtxo {
    pub(crate) fn new(utxo: &Utxo, chain: ChainView) -> Self {
        Self {
            outpoint: utxo.outpoint,
            wallet_id: utxo.wallet_id,
            value: utxo.value,
            derivation_path: utxo.derivation_path.clone(),
            detected_height: utxo.detected_height,
            confirmations: utxo.confirmations(chain.tip),
            state: utxo.state(chain),
            batch_id: utxo.reserved_by(),
        }
    }
}
