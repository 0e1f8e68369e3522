use bdk::FeeRate;
use reqwest_middleware::ClientWithMiddleware;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use std::{collections::HashMap, time::Duration};

use super::{client::retrying_client, error::FeeEstimationError};
use crate::primitives::TxPriority;

/// sat/vB keyed by confirmation target in blocks, e.g. `{"1": 87.5, "3": 59.25, "6": 41.125}`.
#[derive(Debug, Deserialize)]
#[serde(transparent)]
struct FeeEstimates(HashMap<String, f32>);

impl FeeEstimates {
    fn fee_rate(&self, priority: TxPriority) -> Result<FeeRate, FeeEstimationError> {
        let n_blocks = priority.n_blocks();
        self.0
            .get(&n_blocks.to_string())
            .filter(|sats_per_vbyte| **sats_per_vbyte > 0.0)
            .map(|sats_per_vbyte| FeeRate::from_sat_per_vb(*sats_per_vbyte))
            .ok_or(FeeEstimationError::NoEstimate(n_blocks))
    }
}

#[derive(Clone)]
pub struct BlockstreamClient {
    http: ClientWithMiddleware,
    endpoint: String,
}

impl BlockstreamClient {
    pub fn new(config: BlockstreamConfig) -> Result<Self, FeeEstimationError> {
        Ok(Self {
            http: retrying_client(config.timeout, config.number_of_retries)?,
            endpoint: format!("{}/api/fee-estimates", config.url.trim_end_matches('/')),
        })
    }

    #[instrument(name = "blockstream.fee_rate", skip(self), err)]
    pub async fn fee_rate(&self, priority: TxPriority) -> Result<FeeRate, FeeEstimationError> {
        let estimates: FeeEstimates = self
            .http
            .get(&self.endpoint)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .map_err(FeeEstimationError::CouldNotDecodeResponseBody)?;
        estimates.fee_rate(priority)
    }
}

#[serde_with::serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockstreamConfig {
    #[serde(default = "default_url")]
    pub url: String,
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    #[serde(default = "default_timeout")]
    pub timeout: Duration,
    #[serde(default = "default_number_of_retries")]
    pub number_of_retries: u32,
}

impl Default for BlockstreamConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            timeout: default_timeout(),
            number_of_retries: default_number_of_retries(),
        }
    }
}

fn default_url() -> String {
    "https://blockstream.info".to_string()
}

fn default_timeout() -> Duration {
    Duration::from_secs(3)
}

fn default_number_of_retries() -> u32 {
    2
}
