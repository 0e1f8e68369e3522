use chrono::Utc;
use tokio::sync::{watch, Mutex, OwnedMutexGuard, RwLock};
use tracing::instrument;

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::Duration,
};

use super::{error::LedgerError, event::*, wallet::WalletLedger};
use crate::{event_log::EventLog, primitives::*};

struct WalletWriter {
    ledger: Arc<WalletLedger>,
    publisher: watch::Sender<Arc<WalletLedger>>,
    in_flight: HashSet<BatchId>,
}

struct WalletSlot {
    writer: Arc<Mutex<WalletWriter>>,
    snapshot: watch::Receiver<Arc<WalletLedger>>,
}

/// One writer lock per wallet plus a published snapshot for lock-free reads.
#[derive(Clone)]
pub struct WalletLocks {
    wallets: Arc<RwLock<HashMap<WalletId, WalletSlot>>>,
    lock_timeout: Option<Duration>,
}

impl WalletLocks {
    pub fn new(lock_timeout: Option<Duration>) -> Self {
        Self {
            wallets: Arc::new(RwLock::new(HashMap::new())),
            lock_timeout,
        }
    }

    /// Installs a replayed or freshly created wallet, replacing any previous state.
    pub(crate) async fn install(&self, ledger: WalletLedger) {
        let wallet_id = ledger.wallet_id();
        let ledger = Arc::new(ledger);
        let (publisher, snapshot) = watch::channel(Arc::clone(&ledger));
        let writer = WalletWriter {
            ledger,
            publisher,
            in_flight: HashSet::new(),
        };
        self.wallets.write().await.insert(
            wallet_id,
            WalletSlot {
                writer: Arc::new(Mutex::new(writer)),
                snapshot,
            },
        );
    }

    pub async fn snapshot(&self, wallet_id: WalletId) -> Result<Arc<WalletLedger>, LedgerError> {
        let wallets = self.wallets.read().await;
        let slot = wallets
            .get(&wallet_id)
            .ok_or(LedgerError::WalletNotFound(wallet_id))?;
        let snapshot = Arc::clone(&slot.snapshot.borrow());
        Ok(snapshot)
    }

    pub async fn snapshots(&self) -> Vec<Arc<WalletLedger>> {
        let wallets = self.wallets.read().await;
        wallets
            .values()
            .map(|slot| Arc::clone(&slot.snapshot.borrow()))
            .collect()
    }

    #[instrument(name = "wallet_locks.lock", skip(self), err)]
    pub async fn lock(&self, wallet_id: WalletId) -> Result<WalletGuard, LedgerError> {
        self.acquire(wallet_id, self.lock_timeout).await
    }

    /// Waits for the lock however long it takes. For recording work that
    /// already happened outside the ledger and must not be lost.
    #[instrument(name = "wallet_locks.lock_without_timeout", skip(self), err)]
    pub async fn lock_without_timeout(
        &self,
        wallet_id: WalletId,
    ) -> Result<WalletGuard, LedgerError> {
        self.acquire(wallet_id, None).await
    }

    async fn acquire(
        &self,
        wallet_id: WalletId,
        timeout: Option<Duration>,
    ) -> Result<WalletGuard, LedgerError> {
        let writer = {
            let wallets = self.wallets.read().await;
            let slot = wallets
                .get(&wallet_id)
                .ok_or(LedgerError::WalletNotFound(wallet_id))?;
            Arc::clone(&slot.writer)
        };
        let inner = match timeout {
            Some(timeout) => tokio::time::timeout(timeout, writer.lock_owned())
                .await
                .map_err(|_| LedgerError::LockTimeout(wallet_id))?,
            None => writer.lock_owned().await,
        };
        Ok(WalletGuard { wallet_id, inner })
    }
}

/// Exclusive write access to one wallet. Dropping the guard releases the lock.
pub struct WalletGuard {
    wallet_id: WalletId,
    inner: OwnedMutexGuard<WalletWriter>,
}

impl WalletGuard {
    pub fn wallet_id(&self) -> WalletId {
        self.wallet_id
    }

    pub fn ledger(&self) -> &WalletLedger {
        &self.inner.ledger
    }

    /// Stages `events` on a copy of the ledger, appends them to the log and
    /// publishes the result. Nothing is appended when no event changes state.
    /// A failed append halts the wallet until it is recovered from the log.
    #[instrument(name = "ledger.commit", skip_all, fields(wallet_id = %self.wallet_id, n_events = events.len(), sequence), err)]
    pub(crate) async fn commit(
        &mut self,
        log: &dyn EventLog,
        events: Vec<LedgerEvent>,
    ) -> Result<Option<u64>, LedgerError> {
        self.ledger().check_not_halted()?;
        let mut staged = self.ledger().clone();
        let mut changed = false;
        for event in events.iter() {
            changed |= staged.apply_event(event)?;
        }
        if !changed {
            return Ok(None);
        }
        let entry = LedgerEntry {
            sequence: staged.last_sequence() + 1,
            recorded_at: Utc::now(),
            events,
        };
        if let Err(e) = log.append(self.wallet_id, &entry).await {
            // the entry may or may not have reached the log, only a replay
            // can tell which state is durable
            tracing::error!(wallet_id = %self.wallet_id, sequence = entry.sequence, error = %e, "append failed, halting wallet");
            self.halt(format!("append of sequence {} failed: {e}", entry.sequence));
            return Err(e.into());
        }
        staged.mark_committed(entry.sequence);
        tracing::Span::current().record("sequence", entry.sequence);
        self.publish(staged);
        Ok(Some(entry.sequence))
    }

    /// Marks the wallet as halted. Only the in-memory state changes, a
    /// restart replays the log and clears it.
    pub(crate) fn halt(&mut self, reason: String) {
        let mut staged = self.ledger().clone();
        staged.halt(reason);
        self.publish(staged);
    }

    pub(crate) fn mark_in_flight(&mut self, batch_id: BatchId) -> bool {
        self.inner.in_flight.insert(batch_id)
    }

    pub(crate) fn clear_in_flight(&mut self, batch_id: BatchId) {
        self.inner.in_flight.remove(&batch_id);
    }

    pub fn is_in_flight(&self, batch_id: BatchId) -> bool {
        self.inner.in_flight.contains(&batch_id)
    }

    fn publish(&mut self, ledger: WalletLedger) {
        let ledger = Arc::new(ledger);
        self.inner.ledger = Arc::clone(&ledger);
        self.inner.publisher.send_replace(ledger);
    }
}
