use serde::{Deserialize, Serialize};

use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventLogConfig {
    File {
        #[serde(default = "default_path")]
        path: PathBuf,
    },
    Postgres {
        #[serde(default)]
        pg_con: String,
        #[serde(default = "default_max_connections")]
        max_connections: u32,
    },
}

impl Default for EventLogConfig {
    fn default() -> Self {
        EventLogConfig::File {
            path: default_path(),
        }
    }
}

fn default_path() -> PathBuf {
    PathBuf::from(".utxo-ledger/events")
}

fn default_max_connections() -> u32 {
    20
}
