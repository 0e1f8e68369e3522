use serde::{Deserialize, Serialize};

use crate::{event_log::EventLogConfig, fees::FeesConfig, ledger::LedgerConfig, node::BitcoindConfig};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub event_log: EventLogConfig,
    #[serde(default)]
    pub fees: FeesConfig,
    #[serde(default)]
    pub bitcoind: BitcoindConfig,
}
