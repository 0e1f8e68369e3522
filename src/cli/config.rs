use anyhow::Context;
use serde::{Deserialize, Serialize};

use std::path::Path;

use crate::{app::AppConfig, event_log::EventLogConfig, tracing::TracingConfig};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub app: AppConfig,
    #[serde(default)]
    pub tracing: TracingConfig,
}

pub struct EnvOverride {
    pub pg_con: Option<String>,
}

impl Config {
    pub fn from_path(
        path: Option<impl AsRef<Path>>,
        EnvOverride { pg_con }: EnvOverride,
    ) -> anyhow::Result<Self> {
        let mut config: Config = match path {
            Some(path) => {
                let config_file =
                    std::fs::read_to_string(path).context("Couldn't read config file")?;
                serde_yaml::from_str(&config_file).context("Couldn't parse config file")?
            }
            None => Config::default(),
        };
        if let (Some(con), EventLogConfig::Postgres { pg_con, .. }) =
            (pg_con, &mut config.app.event_log)
        {
            *pg_con = con;
        }
        Ok(config)
    }
}
