#![allow(dead_code)]

use async_trait::async_trait;
use rand::distributions::{Alphanumeric, DistString};
use tokio::sync::{Mutex, Notify};

use std::sync::{
    atomic::{AtomicBool, AtomicU32, Ordering},
    Arc,
};

use utxo_ledger::{
    app::*,
    event_log::{error::EventLogError, EventLog, FileEventLog},
    fees::StaticFeeRate,
    ingest::ChainNotification,
    ledger::{LedgerConfig, LedgerEntry},
    node::{error::NodeError, NodeClient},
    primitives::{bitcoin::*, *},
    signing_client::{error::SigningClientError, SigningInput, TransactionSigner},
};

pub const DESTINATION: &str = "mgWUuj1J1N882jmqFxtDepEC73Rr22E9GU";
pub const CHANGE_ADDRESS: &str = "mipcBbFg9gMiCh81Kj8tqqdgoZub1ZJRfn";
const TXID: &str = "4010e27ff7dc6d9c66a5657e6b3d94b4c4e394d968398d16fefe4637463d194d";

pub fn outpoint(vout: u32) -> OutPoint {
    OutPoint {
        txid: TXID.parse().expect("valid txid"),
        vout,
    }
}

pub fn sats(value: u64) -> Satoshis {
    Satoshis::from(value)
}

pub fn destination() -> PayoutDestination {
    PayoutDestination::OnchainAddress {
        value: DESTINATION.to_string(),
    }
}

pub fn wallet_name() -> String {
    format!(
        "TEST_{}",
        Alphanumeric.sample_string(&mut rand::thread_rng(), 16)
    )
}

/// Node double. Broadcasts can be made to fail or to wait for a release.
#[derive(Default)]
pub struct MockNode {
    pub tip: AtomicU32,
    pub reject_with: Mutex<Option<String>>,
    pub broadcasts: Mutex<Vec<Transaction>>,
    pub hold: Option<BroadcastHold>,
}

#[derive(Default, Clone)]
pub struct BroadcastHold {
    pub entered: Arc<Notify>,
    pub release: Arc<Notify>,
}

impl MockNode {
    pub fn holding(hold: BroadcastHold) -> Self {
        Self {
            hold: Some(hold),
            ..Self::default()
        }
    }
}

#[async_trait]
impl NodeClient for MockNode {
    async fn tip_height(&self) -> Result<u32, NodeError> {
        Ok(self.tip.load(Ordering::SeqCst))
    }

    async fn broadcast(&self, tx: &Transaction) -> Result<Txid, NodeError> {
        if let Some(hold) = &self.hold {
            hold.entered.notify_one();
            hold.release.notified().await;
        }
        if let Some(reason) = self.reject_with.lock().await.clone() {
            return Err(NodeError::Rejected(reason));
        }
        self.broadcasts.lock().await.push(tx.clone());
        Ok(tx.txid())
    }
}

/// Returns the transaction unchanged.
pub struct MockSigner;

#[async_trait]
impl TransactionSigner for MockSigner {
    async fn change_address(&self) -> Result<Address, SigningClientError> {
        Ok(CHANGE_ADDRESS
            .parse::<Address<NetworkUnchecked>>()?
            .require_network(Network::Regtest)?)
    }

    async fn sign(
        &self,
        unsigned: Transaction,
        _: &[SigningInput],
    ) -> Result<Transaction, SigningClientError> {
        Ok(unsigned)
    }
}

/// File log whose appends can be switched to fail, either before anything
/// is written or after the entry already reached the file.
pub struct FlakyLog {
    inner: FileEventLog,
    pub failing: AtomicBool,
    pub fail_after_write: AtomicBool,
}

impl FlakyLog {
    async fn open(dir: &std::path::Path) -> anyhow::Result<Self> {
        Ok(Self {
            inner: FileEventLog::open(dir).await?,
            failing: AtomicBool::new(false),
            fail_after_write: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl EventLog for FlakyLog {
    async fn append(&self, wallet_id: WalletId, entry: &LedgerEntry) -> Result<(), EventLogError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(std::io::Error::new(std::io::ErrorKind::Other, "disk unavailable").into());
        }
        self.inner.append(wallet_id, entry).await?;
        if self.fail_after_write.load(Ordering::SeqCst) {
            return Err(std::io::Error::new(std::io::ErrorKind::Other, "sync failed").into());
        }
        Ok(())
    }

    async fn load(&self, wallet_id: WalletId) -> Result<Vec<LedgerEntry>, EventLogError> {
        self.inner.load(wallet_id).await
    }

    async fn wallet_ids(&self) -> Result<Vec<WalletId>, EventLogError> {
        self.inner.wallet_ids().await
    }
}

pub struct TestEnv {
    pub app: App,
    pub node: Arc<MockNode>,
    pub log: Arc<FlakyLog>,
    pub dir: tempfile::TempDir,
    sats_per_vbyte: f32,
    config: LedgerConfig,
}

impl TestEnv {
    /// Starts a second app on the same log, as after a restart.
    pub async fn restart(&self) -> anyhow::Result<App> {
        let log = Arc::new(FlakyLog::open(self.dir.path()).await?);
        let app = App::init(
            self.config.clone(),
            collaborators(log, Arc::clone(&self.node), self.sats_per_vbyte),
        )
        .await?;
        Ok(app)
    }
}

fn collaborators(log: Arc<FlakyLog>, node: Arc<MockNode>, sats_per_vbyte: f32) -> Collaborators {
    Collaborators {
        log,
        fees: Arc::new(StaticFeeRate::new(sats_per_vbyte)),
        node,
        signer: Arc::new(MockSigner),
    }
}

pub async fn init_env() -> anyhow::Result<TestEnv> {
    init_env_with(MockNode::default()).await
}

pub async fn init_env_with(node: MockNode) -> anyhow::Result<TestEnv> {
    init_env_at(node, 1.0).await
}

pub async fn init_env_at(node: MockNode, sats_per_vbyte: f32) -> anyhow::Result<TestEnv> {
    init_env_configured(node, sats_per_vbyte, LedgerConfig::default()).await
}

pub async fn init_env_configured(
    node: MockNode,
    sats_per_vbyte: f32,
    config: LedgerConfig,
) -> anyhow::Result<TestEnv> {
    let dir = tempfile::tempdir()?;
    let log = Arc::new(FlakyLog::open(dir.path()).await?);
    let node = Arc::new(node);
    let app = App::init(
        config.clone(),
        collaborators(Arc::clone(&log), Arc::clone(&node), sats_per_vbyte),
    )
    .await?;
    Ok(TestEnv {
        app,
        node,
        log,
        dir,
        sats_per_vbyte,
        config,
    })
}

/// Every input of an Open or Broadcast batch is held by that batch alone and
/// the confirmed facet is exactly what settled and reserved utxos add up to.
pub async fn assert_no_double_encumbrance(app: &App, wallet_id: WalletId) -> anyhow::Result<()> {
    let snapshot = app.ledger().snapshot(wallet_id).await?;
    let mut held = std::collections::HashMap::new();
    for batch in snapshot.batches().iter().filter(|b| b.is_active()) {
        for input in batch.inputs.iter() {
            if let Some(other) = held.insert(*input, batch.id) {
                anyhow::bail!("{input} is held by {other} and {}", batch.id);
            }
            let utxo = snapshot.utxo(*input).expect("batch input is a known utxo");
            assert_eq!(utxo.batch_id, Some(batch.id));
        }
    }
    for utxo in snapshot.utxos(&Default::default()) {
        if let Some(batch_id) = utxo.batch_id {
            assert_eq!(held.get(&utxo.outpoint), Some(&batch_id));
        }
    }
    let balance = app.get_balance(wallet_id).await?;
    let reserved: Satoshis = snapshot
        .batches()
        .iter()
        .filter(|b| b.is_active())
        .flat_map(|b| b.inputs.iter())
        .filter_map(|input| snapshot.utxo(*input))
        .map(|u| u.value)
        .sum();
    assert_eq!(balance.confirmed_utxos, balance.logical_settled + reserved);
    Ok(())
}

/// Creates a wallet holding one settled utxo per value, confirmed at height 1
/// with the tip at 1. Utxo `i` sits at `outpoint(i)`.
pub async fn funded_wallet(app: &App, values: &[u64]) -> anyhow::Result<WalletId> {
    let wallet_id = app.create_wallet(wallet_name(), None).await?;
    for (vout, value) in values.iter().enumerate() {
        app.ingest(
            wallet_id,
            ChainNotification::OutputDetected {
                outpoint: outpoint(vout as u32),
                value: sats(*value),
                derivation_path: format!("m/84'/1'/0'/0/{vout}"),
                block_height: Some(1),
            },
        )
        .await?;
    }
    Ok(wallet_id)
}
