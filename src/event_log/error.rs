use thiserror::Error;

use crate::primitives::WalletId;

#[derive(Error, Debug)]
pub enum EventLogError {
    #[error("EventLogError - Io: {0}")]
    Io(#[from] std::io::Error),
    #[error("EventLogError - Serialization: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("EventLogError - Sqlx: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("EventLogError - Migrate: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("EventLogError - Corrupt: wallet {wallet_id} has an unreadable entry at line {line}")]
    Corrupt { wallet_id: WalletId, line: usize },
    #[error("EventLogError - SequenceConflict: wallet {wallet_id} already has sequence {sequence}")]
    SequenceConflict { wallet_id: WalletId, sequence: u64 },
}
