use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool};
use tracing::instrument;
use uuid::Uuid;

use super::{error::EventLogError, EventLog};
use crate::{ledger::LedgerEntry, primitives::WalletId};

#[derive(Debug, Clone)]
pub struct PgEventLog {
    pool: PgPool,
}

impl PgEventLog {
    pub async fn connect(pg_con: &str, max_connections: u32) -> Result<Self, EventLogError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(pg_con)
            .await?;
        sqlx::migrate!().run(&pool).await?;
        Ok(Self::new(&pool))
    }

    pub fn new(pool: &PgPool) -> Self {
        Self { pool: pool.clone() }
    }
}

#[async_trait]
impl EventLog for PgEventLog {
    #[instrument(name = "pg_event_log.append", skip(self, entry), fields(sequence = entry.sequence), err)]
    async fn append(&self, wallet_id: WalletId, entry: &LedgerEntry) -> Result<(), EventLogError> {
        let result = sqlx::query(
            r#"INSERT INTO ledger_events (wallet_id, sequence, event_types, entry, recorded_at)
            VALUES ($1, $2, $3, $4, $5)"#,
        )
        .bind(Uuid::from(wallet_id))
        .bind(entry.sequence as i64)
        .bind(entry.event_types())
        .bind(serde_json::to_value(entry)?)
        .bind(entry.recorded_at)
        .execute(&self.pool)
        .await;
        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(EventLogError::SequenceConflict {
                    wallet_id,
                    sequence: entry.sequence,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(name = "pg_event_log.load", skip(self), err)]
    async fn load(&self, wallet_id: WalletId) -> Result<Vec<LedgerEntry>, EventLogError> {
        let rows: Vec<(serde_json::Value,)> = sqlx::query_as(
            r#"SELECT entry FROM ledger_events WHERE wallet_id = $1 ORDER BY sequence"#,
        )
        .bind(Uuid::from(wallet_id))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|(entry,)| Ok(serde_json::from_value(entry)?))
            .collect()
    }

    async fn wallet_ids(&self) -> Result<Vec<WalletId>, EventLogError> {
        let rows: Vec<(Uuid,)> =
            sqlx::query_as(r#"SELECT DISTINCT wallet_id FROM ledger_events ORDER BY wallet_id"#)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(|(id,)| WalletId::from(id)).collect())
    }
}
