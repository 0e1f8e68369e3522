use std::collections::{BTreeMap, HashMap, HashSet};

use super::{error::LedgerError, event::*};
use crate::{
    batch::*,
    payout::{error::PayoutError, *},
    primitives::{
        bitcoin::{FeeRate, OutPoint, Txid},
        *,
    },
    utxo::{error::UtxoError, *},
};

/// Materialized state of one wallet, rebuilt from its event log.
///
/// Events are only ever applied to a staged clone. A failing event may leave
/// the clone half-updated, which is fine because it is discarded.
#[derive(Debug, Clone)]
pub struct WalletLedger {
    wallet_id: WalletId,
    name: String,
    settle_threshold: u32,
    chain_tip: Option<u32>,
    fee_rate: Option<FeeRate>,
    last_sequence: u64,
    halted: Option<String>,
    utxos: BTreeMap<OutPoint, Utxo>,
    payouts: Vec<PayoutRequest>,
    payout_index: HashMap<PayoutRequestId, usize>,
    external_ids: HashMap<String, PayoutRequestId>,
    batches: Vec<PayoutBatch>,
    batch_index: HashMap<BatchId, usize>,
}

impl WalletLedger {
    pub(crate) fn new(wallet_id: WalletId, name: String, settle_threshold: u32) -> Self {
        Self {
            wallet_id,
            name,
            settle_threshold,
            chain_tip: None,
            fee_rate: None,
            last_sequence: 0,
            halted: None,
            utxos: BTreeMap::new(),
            payouts: Vec::new(),
            payout_index: HashMap::new(),
            external_ids: HashMap::new(),
            batches: Vec::new(),
            batch_index: HashMap::new(),
        }
    }

    pub(crate) fn replay(
        wallet_id: WalletId,
        entries: impl IntoIterator<Item = LedgerEntry>,
    ) -> Result<Self, LedgerError> {
        let mut entries = entries.into_iter();
        let first = entries
            .next()
            .ok_or(LedgerError::MissingWalletCreated(wallet_id))?;
        let mut ledger = match first.events.first() {
            Some(LedgerEvent::WalletCreated {
                wallet_id: id,
                name,
                settle_threshold,
            }) if *id == wallet_id => Self::new(wallet_id, name.clone(), *settle_threshold),
            _ => return Err(LedgerError::MissingWalletCreated(wallet_id)),
        };
        ledger.apply_entry(&first)?;
        let mut previous = first;
        for entry in entries {
            // a repeated delivery of the previous entry is harmless, any
            // other reuse of a sequence means two writers diverged
            if entry == previous {
                continue;
            }
            ledger.apply_entry(&entry)?;
            previous = entry;
        }
        Ok(ledger)
    }

    pub(crate) fn apply_entry(&mut self, entry: &LedgerEntry) -> Result<(), LedgerError> {
        let expected = self.last_sequence + 1;
        if entry.sequence != expected {
            return Err(LedgerError::CorruptLog {
                wallet_id: self.wallet_id,
                expected,
                found: entry.sequence,
            });
        }
        for event in entry.events.iter() {
            self.apply_event(event)?;
        }
        self.last_sequence = entry.sequence;
        Ok(())
    }

    /// Returns whether the event changed the ledger.
    pub(crate) fn apply_event(&mut self, event: &LedgerEvent) -> Result<bool, LedgerError> {
        match event {
            LedgerEvent::WalletCreated {
                wallet_id, name, ..
            } => {
                if *wallet_id == self.wallet_id {
                    Ok(false)
                } else {
                    Err(LedgerError::WalletAlreadyExists(name.clone()))
                }
            }
            LedgerEvent::SettleThresholdUpdated { settle_threshold } => {
                if *settle_threshold == 0 {
                    return Err(LedgerError::InvalidSettleThreshold(*settle_threshold));
                }
                let changed = self.settle_threshold != *settle_threshold;
                self.settle_threshold = *settle_threshold;
                Ok(changed)
            }
            LedgerEvent::ChainTipUpdated { height } => match self.chain_tip {
                // the tip never moves backwards, stale deliveries are ignored
                Some(tip) if *height <= tip => Ok(false),
                _ => {
                    self.chain_tip = Some(*height);
                    Ok(true)
                }
            },
            LedgerEvent::FeeRateObserved { sats_per_vbyte } => {
                let fee_rate = FeeRate::from_sat_per_vb(*sats_per_vbyte);
                let changed = self.fee_rate != Some(fee_rate);
                self.fee_rate = Some(fee_rate);
                Ok(changed)
            }
            LedgerEvent::Utxo { event } => self.apply_utxo_event(event),
            LedgerEvent::PayoutSubmitted {
                id,
                destination,
                value,
                submitted_at,
                external_id,
                metadata,
            } => {
                if self.payout_index.contains_key(id) {
                    return Ok(false);
                }
                if let Some(external_id) = external_id {
                    if self.external_ids.contains_key(external_id) {
                        return Err(PayoutError::ExternalIdAlreadyExists(external_id.clone()).into());
                    }
                    self.external_ids.insert(external_id.clone(), *id);
                }
                self.payout_index.insert(*id, self.payouts.len());
                self.payouts.push(PayoutRequest {
                    id: *id,
                    wallet_id: self.wallet_id,
                    destination: destination.clone(),
                    value: *value,
                    submitted_at: *submitted_at,
                    external_id: external_id.clone(),
                    metadata: metadata.clone(),
                    status: PayoutStatus::Queued,
                });
                Ok(true)
            }
            LedgerEvent::PayoutCancelled { payout_id } => Ok(self.payout_mut(*payout_id)?.cancel()?),
            LedgerEvent::BatchFormed {
                batch_id,
                payout_ids,
                inputs,
                estimated_fee,
                change,
                sats_per_vbyte,
            } => {
                if self.batch_index.contains_key(batch_id) {
                    return Ok(false);
                }
                if payout_ids.is_empty() {
                    return Err(LedgerError::NoPendingPayouts(self.wallet_id));
                }
                let mut payouts = Vec::with_capacity(payout_ids.len());
                for payout_id in payout_ids.iter() {
                    let payout = self.payout_mut(*payout_id)?;
                    payout.commit_to_batch(*batch_id)?;
                    payouts.push(BatchPayout {
                        payout_id: payout.id,
                        destination: payout.destination.clone(),
                        value: payout.value,
                    });
                }
                let mut input_total = Satoshis::ZERO;
                for outpoint in inputs.iter() {
                    input_total += self.existing_utxo(*outpoint, event.name())?.value;
                }
                let batch = PayoutBatch {
                    id: *batch_id,
                    wallet_id: self.wallet_id,
                    payouts,
                    inputs: inputs.clone(),
                    estimated_fee: *estimated_fee,
                    change: *change,
                    sats_per_vbyte: *sats_per_vbyte,
                    txid: None,
                    status: BatchStatus::Open,
                    confirmed_height: None,
                    cancel_reason: None,
                };
                batch.check_balanced(input_total)?;
                self.batch_index.insert(*batch_id, self.batches.len());
                self.batches.push(batch);
                Ok(true)
            }
            LedgerEvent::BatchBroadcast { batch_id, txid } => {
                Ok(self.batch_mut(*batch_id)?.broadcast(*txid)?)
            }
            LedgerEvent::BatchConfirmed {
                batch_id,
                block_height,
            } => Ok(self.batch_mut(*batch_id)?.confirm(*block_height)?),
            LedgerEvent::BatchCancelled { batch_id, reason } => {
                let changed = self.batch_mut(*batch_id)?.cancel(reason.clone())?;
                if changed {
                    self.requeue_payouts(*batch_id);
                }
                Ok(changed)
            }
            LedgerEvent::ReorgCompensated {
                outpoint,
                compensation,
            } => {
                self.compensate(*outpoint, compensation)?;
                Ok(true)
            }
        }
    }

    fn apply_utxo_event(&mut self, event: &UtxoEvent) -> Result<bool, LedgerError> {
        let chain = self.chain_view();
        match event {
            UtxoEvent::Detected {
                outpoint,
                value,
                derivation_path,
                block_height,
            } if !self.utxos.contains_key(outpoint) => {
                self.utxos.insert(
                    *outpoint,
                    Utxo::detected(
                        self.wallet_id,
                        *outpoint,
                        *value,
                        derivation_path.clone(),
                        *block_height,
                    ),
                );
                return Ok(true);
            }
            UtxoEvent::Encumbered { outpoint, batch_id } => {
                let owned_by_open_batch = self
                    .batch(*batch_id)
                    .map(|b| b.status == BatchStatus::Open && b.inputs.contains(outpoint))
                    .unwrap_or(false);
                if !owned_by_open_batch {
                    return Err(UtxoError::InvalidTransition {
                        outpoint: *outpoint,
                        state: self.utxos.get(outpoint).map(|u| u.state(chain)),
                        event: event.name(),
                    }
                    .into());
                }
            }
            _ => (),
        }
        let utxo = self
            .utxos
            .get_mut(&event.outpoint())
            .ok_or(UtxoError::InvalidTransition {
                outpoint: event.outpoint(),
                state: None,
                event: event.name(),
            })?;
        Ok(utxo.apply(event, chain)? == Transition::Applied)
    }

    fn compensate(
        &mut self,
        reorged: OutPoint,
        compensation: &BatchCompensation,
    ) -> Result<(), LedgerError> {
        let batch_id = compensation.batch_id();
        let idx = *self
            .batch_index
            .get(&batch_id)
            .ok_or(LedgerError::BatchNotFound(batch_id))?;
        if let Some(utxo) = self.utxos.get_mut(&reorged) {
            if utxo.reserved_by() == Some(batch_id) {
                utxo.reservation = None;
            }
        }
        match compensation {
            BatchCompensation::Reopened {
                remaining_inputs,
                estimated_fee,
                change,
                ..
            } => {
                let wallet_id = self.wallet_id;
                let mut input_total = Satoshis::ZERO;
                for outpoint in remaining_inputs.iter() {
                    let utxo = self
                        .utxos
                        .get_mut(outpoint)
                        .filter(|u| !u.invalidated && u.reserved_by() == Some(batch_id))
                        .ok_or_else(|| LedgerError::ReorgCompensationFailure {
                            wallet_id,
                            reason: format!("input {outpoint} is not held by batch {batch_id}"),
                        })?;
                    utxo.reservation = Some(Reservation::Encumbered { batch_id });
                    input_total += utxo.value;
                }
                let batch = &mut self.batches[idx];
                batch.reopen(remaining_inputs.clone(), *estimated_fee, *change)?;
                batch.check_balanced(input_total)?;
            }
            BatchCompensation::Dissolved {
                released_inputs, ..
            } => {
                for outpoint in released_inputs.iter() {
                    if let Some(utxo) = self.utxos.get_mut(outpoint) {
                        if utxo.reserved_by() == Some(batch_id) {
                            utxo.reservation = None;
                        }
                    }
                }
                self.batches[idx].dissolve(format!("reorg invalidated input {reorged}"))?;
                self.requeue_payouts(batch_id);
            }
        }
        Ok(())
    }

    fn requeue_payouts(&mut self, batch_id: BatchId) {
        for payout in self.payouts.iter_mut() {
            if payout.status == (PayoutStatus::Batched { batch_id }) {
                payout.return_to_queue();
            }
        }
    }

    fn existing_utxo(&self, outpoint: OutPoint, event: &'static str) -> Result<&Utxo, UtxoError> {
        self.utxos
            .get(&outpoint)
            .ok_or(UtxoError::InvalidTransition {
                outpoint,
                state: None,
                event,
            })
    }

    fn payout_mut(&mut self, id: PayoutRequestId) -> Result<&mut PayoutRequest, LedgerError> {
        let idx = *self
            .payout_index
            .get(&id)
            .ok_or(LedgerError::PayoutNotFound(id))?;
        Ok(&mut self.payouts[idx])
    }

    fn batch_mut(&mut self, id: BatchId) -> Result<&mut PayoutBatch, LedgerError> {
        let idx = *self
            .batch_index
            .get(&id)
            .ok_or(LedgerError::BatchNotFound(id))?;
        Ok(&mut self.batches[idx])
    }

    pub(crate) fn mark_committed(&mut self, sequence: u64) {
        self.last_sequence = sequence;
    }

    pub(crate) fn halt(&mut self, reason: String) {
        self.halted = Some(reason);
    }

    pub fn check_not_halted(&self) -> Result<(), LedgerError> {
        match &self.halted {
            Some(reason) => Err(LedgerError::WalletHalted {
                wallet_id: self.wallet_id,
                reason: reason.clone(),
            }),
            None => Ok(()),
        }
    }

    pub fn wallet_id(&self) -> WalletId {
        self.wallet_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn settle_threshold(&self) -> u32 {
        self.settle_threshold
    }

    pub fn chain_tip(&self) -> Option<u32> {
        self.chain_tip
    }

    pub fn fee_rate(&self) -> Option<FeeRate> {
        self.fee_rate
    }

    pub fn last_sequence(&self) -> u64 {
        self.last_sequence
    }

    pub fn halted(&self) -> Option<&str> {
        self.halted.as_deref()
    }

    pub fn chain_view(&self) -> ChainView {
        ChainView {
            tip: self.chain_tip,
            settle_threshold: self.settle_threshold,
        }
    }

    pub fn utxo(&self, outpoint: OutPoint) -> Option<WalletUtxo> {
        self.utxos
            .get(&outpoint)
            .map(|u| WalletUtxo::new(u, self.chain_view()))
    }

    /// Utxos in any of the given states, all utxos for an empty filter.
    /// Ordered by confirmation height with unconfirmed outputs last, then by outpoint.
    pub fn utxos(&self, filter: &HashSet<UtxoState>) -> Vec<WalletUtxo> {
        let chain = self.chain_view();
        let mut utxos: Vec<_> = self
            .utxos
            .values()
            .map(|u| WalletUtxo::new(u, chain))
            .filter(|u| filter.is_empty() || filter.contains(&u.state))
            .collect();
        utxos.sort_by_key(|u| (u.detected_height.is_none(), u.detected_height, u.outpoint));
        utxos
    }

    pub(crate) fn raw_utxos(&self) -> impl Iterator<Item = &Utxo> {
        self.utxos.values()
    }

    pub(crate) fn utxo_value(&self, outpoint: &OutPoint) -> Option<Satoshis> {
        self.utxos.get(outpoint).map(|u| u.value)
    }

    pub(crate) fn settled_candidates(&self) -> Vec<(OutPoint, Satoshis)> {
        let chain = self.chain_view();
        self.utxos
            .values()
            .filter(|u| u.state(chain) == UtxoState::Settled)
            .map(|u| (u.outpoint, u.value))
            .collect()
    }

    pub fn payouts(&self) -> &[PayoutRequest] {
        &self.payouts
    }

    pub fn payout(&self, id: PayoutRequestId) -> Option<&PayoutRequest> {
        self.payout_index.get(&id).map(|idx| &self.payouts[*idx])
    }

    pub fn find_payout_by_external_id(&self, external_id: &str) -> Option<&PayoutRequest> {
        self.external_ids
            .get(external_id)
            .and_then(|id| self.payout(*id))
    }

    /// Queued payouts in submission order.
    pub fn queued_payouts(&self) -> impl Iterator<Item = &PayoutRequest> {
        self.payouts.iter().filter(|p| p.is_queued())
    }

    pub fn batches(&self) -> &[PayoutBatch] {
        &self.batches
    }

    pub fn batch(&self, id: BatchId) -> Option<&PayoutBatch> {
        self.batch_index.get(&id).map(|idx| &self.batches[*idx])
    }

    pub fn batch_by_txid(&self, txid: Txid) -> Option<&PayoutBatch> {
        self.batches.iter().find(|b| b.txid == Some(txid))
    }
}
