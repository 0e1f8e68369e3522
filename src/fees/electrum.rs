use async_trait::async_trait;
use bdk::FeeRate;
use electrum_client::{Client, ConfigBuilder, ElectrumApi};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use super::{error::FeeEstimationError, FeeRateEstimator};
use crate::primitives::TxPriority;

#[derive(Debug, Clone)]
pub struct ElectrumFeeEstimator {
    config: ElectrumConfig,
}

impl ElectrumFeeEstimator {
    pub fn new(config: ElectrumConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl FeeRateEstimator for ElectrumFeeEstimator {
    #[instrument(name = "electrum.fee_rate", skip(self), err)]
    async fn fee_rate(&self, priority: TxPriority) -> Result<FeeRate, FeeEstimationError> {
        let n_blocks = priority.n_blocks();
        let url = self.config.url.clone();
        let retries = self.config.number_of_retries;
        let btc_per_kvb = tokio::task::spawn_blocking(move || {
            let client = Client::from_config(&url, ConfigBuilder::new().retry(retries).build())?;
            client.estimate_fee(n_blocks)
        })
        .await??;
        // electrum servers answer -1 when the node cannot estimate
        if btc_per_kvb <= 0.0 {
            return Err(FeeEstimationError::NoEstimate(n_blocks));
        }
        Ok(FeeRate::from_btc_per_kvb(btc_per_kvb as f32))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElectrumConfig {
    #[serde(default = "default_url")]
    pub url: String,
    #[serde(default = "default_number_of_retries")]
    pub number_of_retries: u8,
}

impl Default for ElectrumConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            number_of_retries: default_number_of_retries(),
        }
    }
}

fn default_url() -> String {
    "127.0.0.1:50001".to_string()
}

fn default_number_of_retries() -> u8 {
    10
}
