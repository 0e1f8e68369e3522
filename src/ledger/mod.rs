mod config;
pub mod error;
mod event;
mod lock;
mod wallet;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::instrument;

use std::{collections::HashSet, sync::Arc};

use crate::{
    balance::WalletBalanceSummary,
    event_log::EventLog,
    primitives::{bitcoin::OutPoint, *},
    utxo::*,
};
pub use config::*;
use error::LedgerError;
pub use event::*;
pub use lock::*;
pub use wallet::*;

/// Owns every wallet's state and the log it is rebuilt from.
#[derive(Clone)]
pub struct Ledger {
    log: Arc<dyn EventLog>,
    locks: WalletLocks,
    creation: Arc<Mutex<()>>,
    config: LedgerConfig,
}

impl Ledger {
    pub fn new(config: LedgerConfig, log: Arc<dyn EventLog>) -> Self {
        Self {
            log,
            locks: WalletLocks::new(config.lock_timeout),
            creation: Arc::new(Mutex::new(())),
            config,
        }
    }

    pub async fn init(config: LedgerConfig, log: Arc<dyn EventLog>) -> Result<Self, LedgerError> {
        let ledger = Self::new(config, log);
        ledger.recover().await?;
        Ok(ledger)
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn network(&self) -> bitcoin::Network {
        self.config.network
    }

    /// Rebuilds every wallet from its log, discarding in-memory state
    /// (including a halt). Returns the number of wallets recovered.
    ///
    /// A wallet halted by a failed append comes back with whatever the log
    /// actually holds, which may include the entry whose append reported
    /// the failure.
    #[instrument(name = "ledger.recover", skip(self), fields(n_wallets), err)]
    pub async fn recover(&self) -> Result<usize, LedgerError> {
        let wallet_ids = self.log.wallet_ids().await?;
        for wallet_id in wallet_ids.iter() {
            let entries = self.log.load(*wallet_id).await?;
            let ledger = WalletLedger::replay(*wallet_id, entries)?;
            tracing::info!(%wallet_id, sequence = ledger.last_sequence(), "wallet recovered");
            self.locks.install(ledger).await;
        }
        tracing::Span::current().record("n_wallets", wallet_ids.len());
        Ok(wallet_ids.len())
    }

    #[instrument(name = "ledger.create_wallet", skip(self), err)]
    pub async fn create_wallet(
        &self,
        name: String,
        settle_threshold: Option<u32>,
    ) -> Result<WalletId, LedgerError> {
        let settle_threshold = settle_threshold.unwrap_or(self.config.default_settle_threshold);
        if settle_threshold == 0 {
            return Err(LedgerError::InvalidSettleThreshold(settle_threshold));
        }
        let _creation = self.creation.lock().await;
        if self.find_wallet_by_name(&name).await.is_ok() {
            return Err(LedgerError::WalletAlreadyExists(name));
        }
        let wallet_id = WalletId::new();
        let entry = LedgerEntry {
            sequence: 1,
            recorded_at: Utc::now(),
            events: vec![LedgerEvent::WalletCreated {
                wallet_id,
                name: name.clone(),
                settle_threshold,
            }],
        };
        self.log.append(wallet_id, &entry).await?;
        let mut ledger = WalletLedger::new(wallet_id, name, settle_threshold);
        ledger.mark_committed(entry.sequence);
        self.locks.install(ledger).await;
        Ok(wallet_id)
    }

    #[instrument(name = "ledger.set_settle_threshold", skip(self), err)]
    pub async fn set_settle_threshold(
        &self,
        wallet_id: WalletId,
        settle_threshold: u32,
    ) -> Result<(), LedgerError> {
        if settle_threshold == 0 {
            return Err(LedgerError::InvalidSettleThreshold(settle_threshold));
        }
        self.with_wallet_lock(wallet_id, |_| {
            Ok(((), vec![LedgerEvent::SettleThresholdUpdated { settle_threshold }]))
        })
        .await
    }

    /// Runs `op` under the wallet's writer lock and commits the events it
    /// returns before the lock is released.
    pub async fn with_wallet_lock<R, F>(&self, wallet_id: WalletId, op: F) -> Result<R, LedgerError>
    where
        F: FnOnce(&WalletLedger) -> Result<(R, Vec<LedgerEvent>), LedgerError>,
    {
        let mut guard = self.lock(wallet_id).await?;
        guard.ledger().check_not_halted()?;
        let (ret, events) = op(guard.ledger())?;
        self.commit(&mut guard, events).await?;
        Ok(ret)
    }

    pub async fn lock(&self, wallet_id: WalletId) -> Result<WalletGuard, LedgerError> {
        self.locks.lock(wallet_id).await
    }

    pub(crate) async fn lock_without_timeout(
        &self,
        wallet_id: WalletId,
    ) -> Result<WalletGuard, LedgerError> {
        self.locks.lock_without_timeout(wallet_id).await
    }

    pub(crate) async fn commit(
        &self,
        guard: &mut WalletGuard,
        events: Vec<LedgerEvent>,
    ) -> Result<Option<u64>, LedgerError> {
        guard.commit(self.log.as_ref(), events).await
    }

    #[instrument(name = "ledger.apply_event", skip(self), err)]
    pub async fn apply_event(&self, wallet_id: WalletId, event: UtxoEvent) -> Result<(), LedgerError> {
        self.with_wallet_lock(wallet_id, |_| Ok(((), vec![event.into()])))
            .await
    }

    /// Latest published state of a wallet. Never blocks on the writer lock.
    pub async fn snapshot(&self, wallet_id: WalletId) -> Result<Arc<WalletLedger>, LedgerError> {
        self.locks.snapshot(wallet_id).await
    }

    pub async fn list_wallets(&self) -> Vec<Arc<WalletLedger>> {
        let mut wallets = self.locks.snapshots().await;
        wallets.sort_by(|a, b| a.name().cmp(b.name()));
        wallets
    }

    pub async fn find_wallet_by_name(&self, name: &str) -> Result<WalletId, LedgerError> {
        self.locks
            .snapshots()
            .await
            .into_iter()
            .find(|w| w.name() == name)
            .map(|w| w.wallet_id())
            .ok_or_else(|| LedgerError::WalletNameNotFound(name.to_string()))
    }

    pub async fn get_utxos(
        &self,
        wallet_id: WalletId,
        filter: &HashSet<UtxoState>,
    ) -> Result<Vec<WalletUtxo>, LedgerError> {
        Ok(self.snapshot(wallet_id).await?.utxos(filter))
    }

    pub async fn get(
        &self,
        wallet_id: WalletId,
        outpoint: OutPoint,
    ) -> Result<Option<WalletUtxo>, LedgerError> {
        Ok(self.snapshot(wallet_id).await?.utxo(outpoint))
    }

    #[instrument(name = "ledger.get_balance", skip(self), err)]
    pub async fn get_balance(
        &self,
        wallet_id: WalletId,
    ) -> Result<WalletBalanceSummary, LedgerError> {
        let snapshot = self.snapshot(wallet_id).await?;
        snapshot.check_not_halted()?;
        Ok(WalletBalanceSummary::from(snapshot.as_ref()))
    }
}
