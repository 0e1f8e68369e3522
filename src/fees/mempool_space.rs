use bdk::FeeRate;
use reqwest_middleware::ClientWithMiddleware;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use std::time::Duration;

use super::{client::retrying_client, error::FeeEstimationError};
use crate::primitives::TxPriority;

/// Whole sat/vB per target. `economyFee` and `minimumFee` are not used.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecommendedFees {
    fastest_fee: f32,
    half_hour_fee: f32,
    hour_fee: f32,
}

impl RecommendedFees {
    fn fee_rate(&self, priority: TxPriority) -> FeeRate {
        FeeRate::from_sat_per_vb(match priority {
            TxPriority::NextBlock => self.fastest_fee,
            TxPriority::HalfHour => self.half_hour_fee,
            TxPriority::OneHour => self.hour_fee,
        })
    }
}

#[derive(Clone)]
pub struct MempoolSpaceClient {
    http: ClientWithMiddleware,
    endpoint: String,
}

impl MempoolSpaceClient {
    pub fn new(config: MempoolSpaceConfig) -> Result<Self, FeeEstimationError> {
        Ok(Self {
            http: retrying_client(config.timeout, config.number_of_retries)?,
            endpoint: format!(
                "{}/api/v1/fees/recommended",
                config.url.trim_end_matches('/')
            ),
        })
    }

    #[instrument(name = "mempool_space.fee_rate", skip(self), err)]
    pub async fn fee_rate(&self, priority: TxPriority) -> Result<FeeRate, FeeEstimationError> {
        let recommended: RecommendedFees = self
            .http
            .get(&self.endpoint)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .map_err(FeeEstimationError::CouldNotDecodeResponseBody)?;
        Ok(recommended.fee_rate(priority))
    }
}

#[serde_with::serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MempoolSpaceConfig {
    #[serde(default = "default_url")]
    pub url: String,
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    #[serde(default = "default_timeout")]
    pub timeout: Duration,
    #[serde(default)]
    pub number_of_retries: u32,
}

impl Default for MempoolSpaceConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            timeout: default_timeout(),
            number_of_retries: 0,
        }
    }
}

fn default_url() -> String {
    "https://mempool.space".to_string()
}

fn default_timeout() -> Duration {
    Duration::from_secs(10)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_each_priority_to_its_recommendation() -> anyhow::Result<()> {
        let recommended: RecommendedFees = serde_json::from_str(
            r#"{"fastestFee":25,"halfHourFee":20,"hourFee":15,"economyFee":8,"minimumFee":4}"#,
        )?;
        for (priority, expected) in [
            (TxPriority::NextBlock, 25.0),
            (TxPriority::HalfHour, 20.0),
            (TxPriority::OneHour, 15.0),
        ] {
            assert_eq!(recommended.fee_rate(priority).as_sat_per_vb(), expected);
        }
        Ok(())
    }

    #[test]
    fn incomplete_body_is_rejected() {
        assert!(serde_json::from_str::<RecommendedFees>(r#"{"fastestFee":25}"#).is_err());
    }
}
