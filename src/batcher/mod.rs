mod assembly;

use tracing::instrument;

use std::sync::Arc;

use crate::{
    batch::{self, BatchStatus, PayoutBatch},
    fees::{self, FeeRateEstimator},
    ledger::{error::LedgerError, *},
    node::NodeClient,
    payout::{error::PayoutError, *},
    primitives::{bitcoin::Txid, *},
    signing_client::{SigningInput, TransactionSigner},
    utxo::UtxoEvent,
};

const OPERATOR_CANCEL_REASON: &str = "cancelled by operator";

/// Accepts payouts, groups them into batches and hands batches to the node.
#[derive(Clone)]
pub struct PayoutBatcher {
    ledger: Ledger,
    fees: Arc<dyn FeeRateEstimator>,
    node: Arc<dyn NodeClient>,
    signer: Arc<dyn TransactionSigner>,
}

impl PayoutBatcher {
    pub fn new(
        ledger: Ledger,
        fees: Arc<dyn FeeRateEstimator>,
        node: Arc<dyn NodeClient>,
        signer: Arc<dyn TransactionSigner>,
    ) -> Self {
        Self {
            ledger,
            fees,
            node,
            signer,
        }
    }

    pub async fn submit_payout(
        &self,
        wallet_id: WalletId,
        destination: PayoutDestination,
        value: Satoshis,
    ) -> Result<PayoutRequestId, LedgerError> {
        let payout = NewPayout::builder()
            .wallet_id(wallet_id)
            .destination(destination)
            .value(value)
            .build()
            .map_err(PayoutError::from)?;
        self.submit_payout_with(payout).await
    }

    #[instrument(name = "batcher.submit_payout", skip(self, payout), fields(wallet_id = %payout.wallet_id(), payout_id = %payout.id()), err)]
    pub async fn submit_payout_with(
        &self,
        payout: NewPayout,
    ) -> Result<PayoutRequestId, LedgerError> {
        payout.validate(self.ledger.network())?;
        // the rate prices the queued payout's fee reservation, a submission
        // does not depend on it
        let fee_rate = match self.fees.fee_rate(self.ledger.config().tx_priority).await {
            Ok(fee_rate) => Some(fee_rate),
            Err(e) => {
                tracing::warn!(error = %e, "no fee rate for submitted payout");
                None
            }
        };
        let request = payout.into_request(chrono::Utc::now());
        self.ledger
            .with_wallet_lock(request.wallet_id, |ledger| {
                if let Some(external_id) = &request.external_id {
                    if ledger.find_payout_by_external_id(external_id).is_some() {
                        return Err(PayoutError::ExternalIdAlreadyExists(external_id.clone()).into());
                    }
                }
                let mut events: Vec<_> = fee_rate
                    .map(|fee_rate| LedgerEvent::FeeRateObserved {
                        sats_per_vbyte: fee_rate.as_sat_per_vb(),
                    })
                    .into_iter()
                    .collect();
                events.push(LedgerEvent::PayoutSubmitted {
                    id: request.id,
                    destination: request.destination.clone(),
                    value: request.value,
                    submitted_at: request.submitted_at,
                    external_id: request.external_id.clone(),
                    metadata: request.metadata.clone(),
                });
                Ok((request.id, events))
            })
            .await
    }

    /// Cancelling an already cancelled payout succeeds without effect.
    #[instrument(name = "batcher.cancel_payout", skip(self), err)]
    pub async fn cancel_payout(
        &self,
        wallet_id: WalletId,
        payout_id: PayoutRequestId,
    ) -> Result<(), LedgerError> {
        self.ledger
            .with_wallet_lock(wallet_id, |ledger| {
                let payout = ledger
                    .payout(payout_id)
                    .ok_or(LedgerError::PayoutNotFound(payout_id))?;
                match payout.status {
                    PayoutStatus::Queued => {
                        Ok(((), vec![LedgerEvent::PayoutCancelled { payout_id }]))
                    }
                    PayoutStatus::Cancelled => Ok(((), vec![])),
                    PayoutStatus::Batched { batch_id } => {
                        Err(PayoutError::PayoutAlreadyCommitted(payout_id, batch_id).into())
                    }
                }
            })
            .await
    }

    /// Absorbs every queued payout of the wallet into a new Open batch.
    #[instrument(name = "batcher.form_batch", skip(self), fields(batch_id, n_payouts, n_inputs), err)]
    pub async fn form_batch(&self, wallet_id: WalletId) -> Result<BatchId, LedgerError> {
        let fee_rate = self
            .fees
            .fee_rate(self.ledger.config().tx_priority)
            .await?;
        self.ledger
            .with_wallet_lock(wallet_id, |ledger| {
                let payouts: Vec<_> = ledger.queued_payouts().collect();
                if payouts.is_empty() {
                    return Err(LedgerError::NoPendingPayouts(wallet_id));
                }
                let payout_total: Satoshis = payouts.iter().map(|p| p.value).sum();
                let funding = batch::select_largest_first(
                    ledger.settled_candidates(),
                    payout_total,
                    payouts.len(),
                    fee_rate,
                )?;

                let batch_id = BatchId::new();
                let span = tracing::Span::current();
                span.record("batch_id", tracing::field::display(batch_id));
                span.record("n_payouts", payouts.len());
                span.record("n_inputs", funding.inputs.len());

                let mut events = vec![
                    LedgerEvent::FeeRateObserved {
                        sats_per_vbyte: fee_rate.as_sat_per_vb(),
                    },
                    LedgerEvent::BatchFormed {
                        batch_id,
                        payout_ids: payouts.iter().map(|p| p.id).collect(),
                        inputs: funding.inputs.clone(),
                        estimated_fee: funding.fee,
                        change: funding.change,
                        sats_per_vbyte: fee_rate.as_sat_per_vb(),
                    },
                ];
                events.extend(funding.inputs.iter().map(|outpoint| {
                    LedgerEvent::from(UtxoEvent::Encumbered {
                        outpoint: *outpoint,
                        batch_id,
                    })
                }));
                Ok((batch_id, events))
            })
            .await
    }

    #[instrument(name = "batcher.cancel_batch", skip(self), err)]
    pub async fn cancel_batch(
        &self,
        wallet_id: WalletId,
        batch_id: BatchId,
    ) -> Result<(), LedgerError> {
        let mut guard = self.ledger.lock(wallet_id).await?;
        guard.ledger().check_not_halted()?;
        let batch = guard
            .ledger()
            .batch(batch_id)
            .ok_or(LedgerError::BatchNotFound(batch_id))?;
        if batch.status != BatchStatus::Open || guard.is_in_flight(batch_id) {
            return Err(LedgerError::InvalidState {
                batch_id,
                status: batch.status,
            });
        }
        let events = cancellation(guard.ledger(), batch, OPERATOR_CANCEL_REASON.to_string());
        self.ledger.commit(&mut guard, events).await?;
        Ok(())
    }

    /// Signs and broadcasts an Open batch. The wallet lock is released while
    /// the signer and node are called; the batch is marked in flight meanwhile.
    /// A failed broadcast cancels the batch and is not retried.
    #[instrument(name = "batcher.broadcast", skip(self), fields(txid), err)]
    pub async fn broadcast(&self, wallet_id: WalletId, batch_id: BatchId) -> Result<Txid, LedgerError> {
        let (batch, signing_inputs) = {
            let mut guard = self.ledger.lock(wallet_id).await?;
            guard.ledger().check_not_halted()?;
            let batch = guard
                .ledger()
                .batch(batch_id)
                .ok_or(LedgerError::BatchNotFound(batch_id))?
                .clone();
            match (batch.status, batch.txid) {
                (BatchStatus::Broadcast, Some(txid)) => return Ok(txid),
                (BatchStatus::Open, _) if !guard.is_in_flight(batch_id) => (),
                (status, _) => return Err(LedgerError::InvalidState { batch_id, status }),
            }
            let signing_inputs = signing_inputs(guard.ledger(), &batch);
            guard.mark_in_flight(batch_id);
            (batch, signing_inputs)
        };

        let result = self.sign_and_send(&batch, signing_inputs).await;

        // the node may already have the transaction, so the outcome is
        // recorded no matter how long the lock is contended
        let mut guard = self.ledger.lock_without_timeout(wallet_id).await?;
        guard.clear_in_flight(batch_id);
        match result {
            Ok(txid) => {
                tracing::Span::current().record("txid", tracing::field::display(txid));
                let current = guard
                    .ledger()
                    .batch(batch_id)
                    .ok_or(LedgerError::BatchNotFound(batch_id))?;
                let mut events = vec![LedgerEvent::BatchBroadcast { batch_id, txid }];
                events.extend(current.inputs.iter().map(|outpoint| {
                    LedgerEvent::from(UtxoEvent::Spent {
                        outpoint: *outpoint,
                        batch_id,
                    })
                }));
                self.ledger.commit(&mut guard, events).await?;
                Ok(txid)
            }
            Err(e) => {
                tracing::warn!(%batch_id, error = %e, "broadcast failed, cancelling batch");
                let events = guard
                    .ledger()
                    .batch(batch_id)
                    .map(|current| cancellation(guard.ledger(), current, e.to_string()));
                if let Some(events) = events {
                    self.ledger.commit(&mut guard, events).await?;
                }
                Err(e)
            }
        }
    }

    async fn sign_and_send(
        &self,
        batch: &PayoutBatch,
        signing_inputs: Vec<SigningInput>,
    ) -> Result<Txid, LedgerError> {
        let change_address = if batch.change > Satoshis::ZERO {
            Some(self.signer.change_address().await?)
        } else {
            None
        };
        let unsigned = assembly::unsigned_transaction(
            batch,
            self.ledger.network(),
            change_address.as_ref(),
        )?;
        let signed = self.signer.sign(unsigned, &signing_inputs).await?;
        Ok(self.node.broadcast(&signed).await?)
    }

    /// The fee a queued payout reserves at the last observed fee rate, or at
    /// the estimator's current rate before any rate was observed.
    #[instrument(name = "batcher.estimate_payout_fee", skip(self), err)]
    pub async fn estimate_payout_fee(
        &self,
        wallet_id: WalletId,
        value: Satoshis,
    ) -> Result<Satoshis, LedgerError> {
        if value == Satoshis::ZERO {
            return Err(PayoutError::ZeroValue.into());
        }
        let snapshot = self.ledger.snapshot(wallet_id).await?;
        snapshot.check_not_halted()?;
        let fee_rate = match snapshot.fee_rate() {
            Some(fee_rate) => fee_rate,
            None => {
                self.fees
                    .fee_rate(self.ledger.config().tx_priority)
                    .await?
            }
        };
        Ok(fees::marginal_payout_fee(fee_rate))
    }
}

fn signing_inputs(ledger: &WalletLedger, batch: &PayoutBatch) -> Vec<SigningInput> {
    batch
        .inputs
        .iter()
        .filter_map(|outpoint| ledger.utxo(*outpoint))
        .map(|utxo| SigningInput {
            outpoint: utxo.outpoint,
            value: utxo.value,
            derivation_path: utxo.derivation_path,
        })
        .collect()
}

/// Cancels a batch and releases the inputs it still holds.
fn cancellation(ledger: &WalletLedger, batch: &PayoutBatch, reason: String) -> Vec<LedgerEvent> {
    let mut events = vec![LedgerEvent::BatchCancelled {
        batch_id: batch.id,
        reason,
    }];
    events.extend(
        batch
            .inputs
            .iter()
            .filter(|outpoint| {
                ledger
                    .utxo(**outpoint)
                    .map(|u| u.batch_id == Some(batch.id))
                    .unwrap_or(false)
            })
            .map(|outpoint| LedgerEvent::from(UtxoEvent::Released { outpoint: *outpoint })),
    );
    events
}
