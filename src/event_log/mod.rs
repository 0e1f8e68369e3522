mod config;
pub mod error;
mod file;
mod pg;

use async_trait::async_trait;

use std::sync::Arc;

use crate::{ledger::LedgerEntry, primitives::WalletId};
pub use config::*;
use error::EventLogError;
pub use file::*;
pub use pg::*;

/// Append-only, per-wallet store of committed ledger entries.
#[async_trait]
pub trait EventLog: Send + Sync {
    /// Durably appends `entry`. Returns only once the entry would survive a crash.
    async fn append(&self, wallet_id: WalletId, entry: &LedgerEntry) -> Result<(), EventLogError>;

    /// All entries of a wallet in sequence order.
    async fn load(&self, wallet_id: WalletId) -> Result<Vec<LedgerEntry>, EventLogError>;

    async fn wallet_ids(&self) -> Result<Vec<WalletId>, EventLogError>;
}

pub async fn init(config: &EventLogConfig) -> Result<Arc<dyn EventLog>, EventLogError> {
    let log: Arc<dyn EventLog> = match config {
        EventLogConfig::File { path } => Arc::new(FileEventLog::open(path).await?),
        EventLogConfig::Postgres {
            pg_con,
            max_connections,
        } => Arc::new(PgEventLog::connect(pg_con, *max_connections).await?),
    };
    Ok(log)
}
