use serde::{Deserialize, Serialize};

use std::time::Duration;

use crate::primitives::{bitcoin::Network, TxPriority};

#[serde_with::serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    #[serde(default = "default_network")]
    pub network: Network,
    #[serde(default = "default_settle_threshold")]
    pub default_settle_threshold: u32,
    #[serde_as(as = "Option<serde_with::DurationSeconds<u64>>")]
    #[serde(default)]
    pub lock_timeout: Option<Duration>,
    #[serde(default)]
    pub tx_priority: TxPriority,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            network: default_network(),
            default_settle_threshold: default_settle_threshold(),
            lock_timeout: None,
            tx_priority: TxPriority::default(),
        }
    }
}

fn default_network() -> Network {
    Network::Regtest
}

fn default_settle_threshold() -> u32 {
    1
}
