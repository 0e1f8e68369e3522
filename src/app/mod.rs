mod config;
pub mod error;

use std::{collections::HashSet, sync::Arc};

use crate::{
    balance::WalletBalanceSummary,
    batch::PayoutBatch,
    batcher::PayoutBatcher,
    event_log::{self, EventLog},
    fees::FeeRateEstimator,
    ingest::*,
    ledger::*,
    node::{BitcoindNode, NodeClient},
    payout::{NewPayout, PayoutRequest},
    primitives::{
        bitcoin::{OutPoint, Txid},
        *,
    },
    signing_client::{BitcoindSigner, TransactionSigner},
    utxo::*,
};
pub use config::*;
use error::ApplicationError;

/// The services the ledger talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub log: Arc<dyn EventLog>,
    pub fees: Arc<dyn FeeRateEstimator>,
    pub node: Arc<dyn NodeClient>,
    pub signer: Arc<dyn TransactionSigner>,
}

#[derive(Clone)]
pub struct App {
    ledger: Ledger,
    ingestor: EventIngestor,
    batcher: PayoutBatcher,
    node: Arc<dyn NodeClient>,
}

impl App {
    /// Connects to everything named in `config` and recovers all wallets.
    pub async fn connect(config: AppConfig) -> Result<Self, ApplicationError> {
        let network = config.ledger.network;
        let collaborators = Collaborators {
            log: event_log::init(&config.event_log).await?,
            fees: config.fees.estimator()?,
            node: Arc::new(BitcoindNode::connect(&config.bitcoind)?),
            signer: Arc::new(BitcoindSigner::connect(&config.bitcoind, network)?),
        };
        Self::init(config.ledger, collaborators).await
    }

    pub async fn init(
        config: LedgerConfig,
        collaborators: Collaborators,
    ) -> Result<Self, ApplicationError> {
        let Collaborators {
            log,
            fees,
            node,
            signer,
        } = collaborators;
        let ledger = Ledger::init(config, log).await?;
        Ok(Self {
            ingestor: EventIngestor::new(ledger.clone()),
            batcher: PayoutBatcher::new(ledger.clone(), fees, Arc::clone(&node), signer),
            ledger,
            node,
        })
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub async fn create_wallet(
        &self,
        name: String,
        settle_threshold: Option<u32>,
    ) -> Result<WalletId, ApplicationError> {
        Ok(self.ledger.create_wallet(name, settle_threshold).await?)
    }

    pub async fn find_wallet_by_name(&self, name: &str) -> Result<WalletId, ApplicationError> {
        Ok(self.ledger.find_wallet_by_name(name).await?)
    }

    pub async fn set_settle_threshold(
        &self,
        wallet_id: WalletId,
        settle_threshold: u32,
    ) -> Result<(), ApplicationError> {
        Ok(self
            .ledger
            .set_settle_threshold(wallet_id, settle_threshold)
            .await?)
    }

    pub async fn get_balance(
        &self,
        wallet_id: WalletId,
    ) -> Result<WalletBalanceSummary, ApplicationError> {
        Ok(self.ledger.get_balance(wallet_id).await?)
    }

    pub async fn list_utxos(
        &self,
        wallet_id: WalletId,
        filter: &HashSet<UtxoState>,
    ) -> Result<Vec<WalletUtxo>, ApplicationError> {
        Ok(self.ledger.get_utxos(wallet_id, filter).await?)
    }

    pub async fn get_utxo(
        &self,
        wallet_id: WalletId,
        outpoint: OutPoint,
    ) -> Result<Option<WalletUtxo>, ApplicationError> {
        Ok(self.ledger.get(wallet_id, outpoint).await?)
    }

    pub async fn ingest(
        &self,
        wallet_id: WalletId,
        notification: ChainNotification,
    ) -> Result<IngestOutcome, ApplicationError> {
        Ok(self.ingestor.ingest(wallet_id, notification).await?)
    }

    pub async fn sync_tip(&self, wallet_id: WalletId) -> Result<IngestOutcome, ApplicationError> {
        Ok(self
            .ingestor
            .sync_tip(wallet_id, self.node.as_ref())
            .await?)
    }

    pub async fn submit_payout(
        &self,
        wallet_id: WalletId,
        destination: PayoutDestination,
        value: Satoshis,
    ) -> Result<PayoutRequestId, ApplicationError> {
        Ok(self
            .batcher
            .submit_payout(wallet_id, destination, value)
            .await?)
    }

    pub async fn submit_payout_with(
        &self,
        payout: NewPayout,
    ) -> Result<PayoutRequestId, ApplicationError> {
        Ok(self.batcher.submit_payout_with(payout).await?)
    }

    pub async fn cancel_payout(
        &self,
        wallet_id: WalletId,
        payout_id: PayoutRequestId,
    ) -> Result<(), ApplicationError> {
        Ok(self.batcher.cancel_payout(wallet_id, payout_id).await?)
    }

    pub async fn estimate_payout_fee(
        &self,
        wallet_id: WalletId,
        value: Satoshis,
    ) -> Result<Satoshis, ApplicationError> {
        Ok(self.batcher.estimate_payout_fee(wallet_id, value).await?)
    }

    pub async fn form_batch(&self, wallet_id: WalletId) -> Result<BatchId, ApplicationError> {
        Ok(self.batcher.form_batch(wallet_id).await?)
    }

    pub async fn cancel_batch(
        &self,
        wallet_id: WalletId,
        batch_id: BatchId,
    ) -> Result<(), ApplicationError> {
        Ok(self.batcher.cancel_batch(wallet_id, batch_id).await?)
    }

    pub async fn broadcast_batch(
        &self,
        wallet_id: WalletId,
        batch_id: BatchId,
    ) -> Result<Txid, ApplicationError> {
        Ok(self.batcher.broadcast(wallet_id, batch_id).await?)
    }

    pub async fn list_batches(
        &self,
        wallet_id: WalletId,
    ) -> Result<Vec<PayoutBatch>, ApplicationError> {
        Ok(self.ledger.snapshot(wallet_id).await?.batches().to_vec())
    }

    pub async fn list_payouts(
        &self,
        wallet_id: WalletId,
    ) -> Result<Vec<PayoutRequest>, ApplicationError> {
        Ok(self.ledger.snapshot(wallet_id).await?.payouts().to_vec())
    }
}
