use serde::{Deserialize, Serialize};

use std::sync::Arc;

use super::{
    blockstream::BlockstreamConfig,
    client::FeesClient,
    electrum::{ElectrumConfig, ElectrumFeeEstimator},
    error::FeeEstimationError,
    mempool_space::MempoolSpaceConfig,
    FeeRateEstimator, StaticFeeRate,
};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FeesConfig {
    #[serde(default)]
    pub mempool_space: MempoolSpaceConfig,
    #[serde(default)]
    pub blockstream: BlockstreamConfig,
    #[serde(default)]
    pub electrum: Option<ElectrumConfig>,
    #[serde(default)]
    pub static_sats_per_vbyte: Option<f32>,
}

impl FeesConfig {
    /// A static rate wins over electrum, electrum wins over the http sources.
    pub fn estimator(&self) -> Result<Arc<dyn FeeRateEstimator>, FeeEstimationError> {
        if let Some(sats_per_vbyte) = self.static_sats_per_vbyte {
            return Ok(Arc::new(StaticFeeRate::new(sats_per_vbyte)));
        }
        if let Some(electrum) = &self.electrum {
            return Ok(Arc::new(ElectrumFeeEstimator::new(electrum.clone())));
        }
        Ok(Arc::new(FeesClient::new(self.clone())?))
    }
}
