use async_trait::async_trait;
use bdk::FeeRate;
use reqwest_middleware::ClientWithMiddleware;
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use tracing::instrument;

use std::time::Duration;

use super::{blockstream::*, config::*, error::*, mempool_space::*, FeeRateEstimator};
use crate::primitives::TxPriority;

/// Asks mempool.space first and blockstream when that fails.
#[derive(Clone)]
pub struct FeesClient {
    mempool_space: MempoolSpaceClient,
    blockstream: BlockstreamClient,
}

impl FeesClient {
    pub fn new(config: FeesConfig) -> Result<Self, FeeEstimationError> {
        Ok(Self {
            mempool_space: MempoolSpaceClient::new(config.mempool_space)?,
            blockstream: BlockstreamClient::new(config.blockstream)?,
        })
    }
}

#[async_trait]
impl FeeRateEstimator for FeesClient {
    #[instrument(name = "fees.fee_rate", skip(self), fields(fee_rate), err)]
    async fn fee_rate(&self, priority: TxPriority) -> Result<FeeRate, FeeEstimationError> {
        let fee_rate = match self.mempool_space.fee_rate(priority).await {
            Ok(fee_rate) => fee_rate,
            Err(e) => {
                tracing::warn!(error = %e, "mempool.space unavailable, falling back to blockstream");
                self.blockstream.fee_rate(priority).await?
            }
        };
        tracing::Span::current().record(
            "fee_rate",
            tracing::field::display(fee_rate.as_sat_per_vb()),
        );
        Ok(fee_rate)
    }
}

pub(super) fn retrying_client(
    timeout: Duration,
    number_of_retries: u32,
) -> Result<ClientWithMiddleware, FeeEstimationError> {
    let retry_policy = ExponentialBackoff::builder()
        .retry_bounds(Duration::from_millis(500), Duration::from_secs(10))
        .build_with_max_retries(number_of_retries);
    let client = reqwest::Client::builder().timeout(timeout).build()?;
    Ok(reqwest_middleware::ClientBuilder::new(client)
        .with(RetryTransientMiddleware::new_with_policy(retry_policy))
        .build())
}
