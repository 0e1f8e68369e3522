mod notification;

use tracing::instrument;

use std::collections::HashSet;

use crate::{
    batch::{self, BatchStatus},
    ledger::{error::LedgerError, *},
    node::NodeClient,
    primitives::{bitcoin::OutPoint, *},
    utxo::*,
};
pub use notification::*;

/// Turns chain notifications into ledger transactions.
#[derive(Clone)]
pub struct EventIngestor {
    ledger: Ledger,
}

impl EventIngestor {
    pub fn new(ledger: Ledger) -> Self {
        Self { ledger }
    }

    #[instrument(
        name = "ingestor.ingest",
        skip(self, notification),
        fields(notification = notification.name(), error, error.level, error.message),
        err
    )]
    pub async fn ingest(
        &self,
        wallet_id: WalletId,
        notification: ChainNotification,
    ) -> Result<IngestOutcome, LedgerError> {
        let mut guard = self.ledger.lock(wallet_id).await?;
        guard.ledger().check_not_halted()?;

        if let ChainNotification::Reorg { invalidated } = &notification {
            let result = match plan_reorg(guard.ledger(), invalidated) {
                Ok(events) => self.ledger.commit(&mut guard, events).await,
                Err(e) => Err(e),
            };
            return match result {
                Ok(sequence) => Ok(outcome(sequence)),
                Err(e) => {
                    let reason = e.to_string();
                    crate::tracing::insert_error_fields(tracing::Level::ERROR, &reason);
                    tracing::error!(%wallet_id, %reason, "reorg compensation failed, halting wallet");
                    guard.halt(reason.clone());
                    Err(LedgerError::ReorgCompensationFailure { wallet_id, reason })
                }
            };
        }

        let result = match plan(guard.ledger(), &notification) {
            Ok(events) => self.ledger.commit(&mut guard, events).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(sequence) => Ok(outcome(sequence)),
            Err(e) if e.is_stale_notification() => {
                tracing::warn!(%wallet_id, error = %e, "dropping notification");
                Ok(IngestOutcome::Dropped {
                    reason: e.to_string(),
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Queries the node before taking the wallet lock.
    #[instrument(name = "ingestor.sync_tip", skip(self, node), err)]
    pub async fn sync_tip(
        &self,
        wallet_id: WalletId,
        node: &dyn NodeClient,
    ) -> Result<IngestOutcome, LedgerError> {
        let height = node.tip_height().await?;
        self.ingest(wallet_id, ChainNotification::TipAdvanced { height })
            .await
    }
}

fn outcome(sequence: Option<u64>) -> IngestOutcome {
    match sequence {
        Some(sequence) => IngestOutcome::Applied { sequence },
        None => IngestOutcome::Unchanged,
    }
}

fn tip_update(ledger: &WalletLedger, height: u32) -> Option<LedgerEvent> {
    match ledger.chain_tip() {
        Some(tip) if tip >= height => None,
        _ => Some(LedgerEvent::ChainTipUpdated { height }),
    }
}

fn plan(
    ledger: &WalletLedger,
    notification: &ChainNotification,
) -> Result<Vec<LedgerEvent>, LedgerError> {
    let mut events = Vec::new();
    match notification {
        ChainNotification::OutputDetected {
            outpoint,
            value,
            derivation_path,
            block_height,
        } => {
            events.push(
                UtxoEvent::Detected {
                    outpoint: *outpoint,
                    value: *value,
                    derivation_path: derivation_path.clone(),
                    block_height: *block_height,
                }
                .into(),
            );
            if let Some(block_height) = block_height {
                events.push(
                    UtxoEvent::ConfirmationAdvanced {
                        outpoint: *outpoint,
                        block_height: *block_height,
                    }
                    .into(),
                );
                events.extend(tip_update(ledger, *block_height));
            }
        }
        ChainNotification::OutputConfirmed {
            outpoint,
            block_height,
        } => {
            events.push(
                UtxoEvent::ConfirmationAdvanced {
                    outpoint: *outpoint,
                    block_height: *block_height,
                }
                .into(),
            );
            events.extend(tip_update(ledger, *block_height));
        }
        ChainNotification::TipAdvanced { height } => {
            events.push(LedgerEvent::ChainTipUpdated { height: *height });
        }
        ChainNotification::SpendConfirmed { txid, block_height } => {
            // spends of transactions we did not build are not ours to track
            if let Some(batch) = ledger.batch_by_txid(*txid) {
                events.push(LedgerEvent::BatchConfirmed {
                    batch_id: batch.id,
                    block_height: *block_height,
                });
                events.extend(tip_update(ledger, *block_height));
            }
        }
        ChainNotification::Reorg { invalidated } => return plan_reorg(ledger, invalidated),
    }
    Ok(events)
}

/// Plans against a staged copy so that several invalidated inputs of the
/// same batch are compensated one after the other.
fn plan_reorg(
    ledger: &WalletLedger,
    invalidated: &[OutPoint],
) -> Result<Vec<LedgerEvent>, LedgerError> {
    let mut staged = ledger.clone();
    let mut events = Vec::new();
    let mut seen = HashSet::new();
    for outpoint in invalidated.iter().filter(|o| seen.insert(**o)) {
        let utxo = match staged.utxo(*outpoint) {
            Some(utxo) if utxo.state != UtxoState::Invalidated => utxo,
            _ => continue,
        };
        let mut step = Vec::with_capacity(2);
        if let Some(batch_id) = utxo.batch_id {
            step.push(LedgerEvent::ReorgCompensated {
                outpoint: *outpoint,
                compensation: compensation(&staged, batch_id, *outpoint)?,
            });
        }
        step.push(UtxoEvent::Invalidated { outpoint: *outpoint }.into());
        for event in step.iter() {
            staged.apply_event(event)?;
        }
        events.extend(step);
    }
    Ok(events)
}

fn compensation(
    ledger: &WalletLedger,
    batch_id: BatchId,
    lost: OutPoint,
) -> Result<BatchCompensation, LedgerError> {
    let batch = ledger
        .batch(batch_id)
        .filter(|b| b.status != BatchStatus::Cancelled)
        .ok_or_else(|| LedgerError::ReorgCompensationFailure {
            wallet_id: ledger.wallet_id(),
            reason: format!("utxo {lost} is held by unknown or cancelled batch {batch_id}"),
        })?;
    let remaining: Vec<_> = batch
        .inputs
        .iter()
        .filter(|input| **input != lost)
        .filter_map(|input| ledger.utxo_value(input).map(|value| (*input, value)))
        .collect();
    let compensation = match batch::fund(
        &remaining,
        batch.total_payouts(),
        batch.payouts.len(),
        batch.fee_rate(),
    ) {
        Some(funding) => BatchCompensation::Reopened {
            batch_id,
            remaining_inputs: funding.inputs,
            estimated_fee: funding.fee,
            change: funding.change,
        },
        None => BatchCompensation::Dissolved {
            batch_id,
            released_inputs: remaining.into_iter().map(|(outpoint, _)| outpoint).collect(),
        },
    };
    Ok(compensation)
}
