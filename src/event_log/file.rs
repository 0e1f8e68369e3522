use async_trait::async_trait;
use tokio::{fs, io::AsyncWriteExt, sync::Mutex};
use tracing::instrument;

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
};

use super::{error::EventLogError, EventLog};
use crate::{ledger::LedgerEntry, primitives::WalletId};

const EXTENSION: &str = "jsonl";

/// One JSON-lines file per wallet below `dir`.
///
/// Appends only accept the sequence that follows the last one on disk. The
/// last sequence is cached per wallet and re-read after a failed append.
#[derive(Debug, Clone)]
pub struct FileEventLog {
    dir: PathBuf,
    last_sequences: Arc<Mutex<HashMap<WalletId, u64>>>,
}

impl FileEventLog {
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self, EventLogError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).await?;
        Ok(Self {
            dir,
            last_sequences: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    fn path(&self, wallet_id: WalletId) -> PathBuf {
        self.dir.join(format!("{wallet_id}.{EXTENSION}"))
    }

    async fn last_sequence(&self, wallet_id: WalletId) -> Result<u64, EventLogError> {
        let cached = self.last_sequences.lock().await.get(&wallet_id).copied();
        match cached {
            Some(sequence) => Ok(sequence),
            None => Ok(self
                .load(wallet_id)
                .await?
                .last()
                .map(|entry| entry.sequence)
                .unwrap_or(0)),
        }
    }

    async fn write_line(&self, wallet_id: WalletId, line: &[u8]) -> Result<(), EventLogError> {
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path(wallet_id))
            .await?;
        file.write_all(line).await?;
        file.sync_data().await?;
        Ok(())
    }
}

#[async_trait]
impl EventLog for FileEventLog {
    #[instrument(name = "file_event_log.append", skip(self, entry), fields(sequence = entry.sequence), err)]
    async fn append(&self, wallet_id: WalletId, entry: &LedgerEntry) -> Result<(), EventLogError> {
        let last = self.last_sequence(wallet_id).await?;
        if entry.sequence != last + 1 {
            return Err(EventLogError::SequenceConflict {
                wallet_id,
                sequence: entry.sequence,
            });
        }
        let mut line = serde_json::to_vec(entry)?;
        line.push(b'\n');
        let result = self.write_line(wallet_id, &line).await;
        let mut last_sequences = self.last_sequences.lock().await;
        match &result {
            Ok(()) => {
                last_sequences.insert(wallet_id, entry.sequence);
            }
            Err(_) => {
                last_sequences.remove(&wallet_id);
            }
        }
        result
    }

    /// A final line without its newline is the remains of an interrupted
    /// append. It is dropped and cut from the file so later appends start clean.
    #[instrument(name = "file_event_log.load", skip(self), err)]
    async fn load(&self, wallet_id: WalletId) -> Result<Vec<LedgerEntry>, EventLogError> {
        let path = self.path(wallet_id);
        let content = match fs::read(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut entries = Vec::new();
        let mut valid_len = 0;
        let mut lines = content.split_inclusive(|b| *b == b'\n').enumerate().peekable();
        while let Some((idx, line)) = lines.next() {
            let is_last = lines.peek().is_none();
            let complete = line.ends_with(b"\n");
            match serde_json::from_slice::<LedgerEntry>(line) {
                Ok(entry) if complete => {
                    entries.push(entry);
                    valid_len += line.len();
                }
                _ if is_last => {
                    tracing::warn!(%wallet_id, line = idx + 1, "dropping torn trailing entry");
                    let file = fs::OpenOptions::new().write(true).open(&path).await?;
                    file.set_len(valid_len as u64).await?;
                    file.sync_data().await?;
                }
                _ => {
                    return Err(EventLogError::Corrupt {
                        wallet_id,
                        line: idx + 1,
                    })
                }
            }
        }
        Ok(entries)
    }

    async fn wallet_ids(&self) -> Result<Vec<WalletId>, EventLogError> {
        let mut ids = Vec::new();
        let mut dir = fs::read_dir(&self.dir).await?;
        while let Some(item) = dir.next_entry().await? {
            let path = item.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            if let Some(id) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse::<WalletId>().ok())
            {
                ids.push(id);
            }
        }
        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::ledger::LedgerEvent;

    fn entry(sequence: u64) -> LedgerEntry {
        LedgerEntry {
            sequence,
            recorded_at: Utc::now(),
            events: vec![LedgerEvent::ChainTipUpdated {
                height: sequence as u32,
            }],
        }
    }

    #[tokio::test]
    async fn appends_and_loads_in_order() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let log = FileEventLog::open(dir.path()).await?;
        let wallet_id = WalletId::new();
        for sequence in 1..=3 {
            log.append(wallet_id, &entry(sequence)).await?;
        }
        let loaded = log.load(wallet_id).await?;
        assert_eq!(
            loaded.iter().map(|e| e.sequence).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert_eq!(log.wallet_ids().await?, vec![wallet_id]);
        assert!(log.load(WalletId::new()).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn torn_tail_is_dropped_and_truncated() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let log = FileEventLog::open(dir.path()).await?;
        let wallet_id = WalletId::new();
        log.append(wallet_id, &entry(1)).await?;
        let mut file = fs::OpenOptions::new()
            .append(true)
            .open(log.path(wallet_id))
            .await?;
        file.write_all(br#"{"sequence":2,"recorded_"#).await?;
        file.sync_data().await?;

        assert_eq!(log.load(wallet_id).await?.len(), 1);
        log.append(wallet_id, &entry(2)).await?;
        let loaded = log.load(wallet_id).await?;
        assert_eq!(
            loaded.iter().map(|e| e.sequence).collect::<Vec<_>>(),
            vec![1, 2]
        );
        Ok(())
    }

    #[tokio::test]
    async fn appends_must_continue_the_sequence() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let log = FileEventLog::open(dir.path()).await?;
        let wallet_id = WalletId::new();
        log.append(wallet_id, &entry(1)).await?;
        log.append(wallet_id, &entry(2)).await?;

        for sequence in [2, 4] {
            assert!(matches!(
                log.append(wallet_id, &entry(sequence)).await,
                Err(EventLogError::SequenceConflict { sequence: s, .. }) if s == sequence
            ));
        }

        // a second handle on the same directory reads the last sequence from disk
        let reopened = FileEventLog::open(dir.path()).await?;
        assert!(matches!(
            reopened.append(wallet_id, &entry(1)).await,
            Err(EventLogError::SequenceConflict { sequence: 1, .. })
        ));
        reopened.append(wallet_id, &entry(3)).await?;
        assert_eq!(
            reopened
                .load(wallet_id)
                .await?
                .iter()
                .map(|e| e.sequence)
                .collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        Ok(())
    }

    #[tokio::test]
    async fn garbage_in_the_middle_is_corruption() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let log = FileEventLog::open(dir.path()).await?;
        let wallet_id = WalletId::new();
        log.append(wallet_id, &entry(1)).await?;
        let mut file = fs::OpenOptions::new()
            .append(true)
            .open(log.path(wallet_id))
            .await?;
        file.write_all(b"not json\n").await?;
        file.sync_data().await?;
        log.append(wallet_id, &entry(2)).await?;

        assert!(matches!(
            log.load(wallet_id).await,
            Err(EventLogError::Corrupt { line: 2, .. })
        ));
        Ok(())
    }
}
