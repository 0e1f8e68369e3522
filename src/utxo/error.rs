use thiserror::Error;

use super::entity::UtxoState;
use crate::primitives::bitcoin::OutPoint;

#[derive(Debug, Error)]
pub enum UtxoError {
    #[error("UtxoError - InvalidTransition: cannot apply '{event}' to {outpoint} in state {}", describe_state(.state))]
    InvalidTransition {
        outpoint: OutPoint,
        state: Option<UtxoState>,
        event: &'static str,
    },
}

fn describe_state(state: &Option<UtxoState>) -> String {
    match state {
        Some(state) => state.to_string(),
        None => "unknown".to_string(),
    }
}
