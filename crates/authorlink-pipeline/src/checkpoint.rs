//! Append-only task log
//!
//! One JSON object per line, one line per finished mention. Replaying the
//! log yields the set of completed mentions; the first entry for a mention
//! wins, so a duplicate left behind by an interrupted batch is harmless.

use std::collections::BTreeMap;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use authorlink_core::{DecisionOutcome, LinkError, Resolution, Result, StageStats};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio_util::codec::{AnyDelimiterCodec, FramedRead};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// One finished mention
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskLogEntry {
    #[serde(alias = "task_id")]
    pub mention_id: String,

    #[serde(alias = "result")]
    pub outcome: Resolution,

    #[serde(default, alias = "reasoning")]
    pub rationale: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<u8>,

    #[serde(default)]
    pub stats: StageStats,

    /// Failure text when the mention was logged under a `log_nil` policy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<Uuid>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logged_at: Option<DateTime<Utc>>,
}

impl TaskLogEntry {
    pub fn is_failure(&self) -> bool {
        self.error.is_some()
    }
}

/// Result of reading the log back
#[derive(Debug, Clone, Default)]
pub struct Replay {
    /// First entry per mention
    pub entries: BTreeMap<String, TaskLogEntry>,
    /// Later entries for an already-logged mention
    pub duplicates: usize,
    /// Lines that are not valid entries
    pub invalid: usize,
}

impl Replay {
    pub fn contains(&self, mention_id: &str) -> bool {
        self.entries.contains_key(mention_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// JSONL task log with serialized appends
#[derive(Debug)]
pub struct TaskLog {
    path: PathBuf,
    run_id: Uuid,
    write_lock: Mutex<()>,
}

impl TaskLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            run_id: Uuid::new_v4(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Identifier stamped on every entry written by this instance
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Entry for a decided (or failed) mention, stamped with this run
    pub fn entry(&self, mention_id: impl Into<String>, outcome: DecisionOutcome) -> TaskLogEntry {
        TaskLogEntry {
            mention_id: mention_id.into(),
            outcome: outcome.resolution,
            rationale: outcome.rationale,
            confidence: outcome.confidence,
            stats: outcome.stats,
            error: None,
            run_id: Some(self.run_id),
            logged_at: Some(Utc::now()),
        }
    }

    /// Read every entry; a missing file is an empty log
    pub async fn replay(&self) -> Result<Replay> {
        let _guard = self.write_lock.lock().await;
        let mut replay = Replay::default();

        let file = match File::open(&self.path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(replay),
            Err(e) => return Err(e.into()),
        };

        // Raw bytes per line: a torn append can end inside a UTF-8 sequence
        let codec = AnyDelimiterCodec::new(b"\n".to_vec(), Vec::new());
        let mut lines = FramedRead::new(file, codec);
        let mut line_no = 0usize;
        while let Some(line) = lines.next().await {
            line_no += 1;
            let line = line.map_err(|e| {
                LinkError::Storage(format!(
                    "Failed to read {} at line {line_no}: {e}",
                    self.path.display()
                ))
            })?;

            let parsed = std::str::from_utf8(&line)
                .map_err(|e| e.to_string())
                .and_then(|text| {
                    let text = text.trim();
                    if text.is_empty() {
                        Ok(None)
                    } else {
                        serde_json::from_str::<TaskLogEntry>(text)
                            .map(Some)
                            .map_err(|e| e.to_string())
                    }
                });

            match parsed {
                Ok(None) => {}
                Ok(Some(entry)) => {
                    if replay.entries.contains_key(&entry.mention_id) {
                        replay.duplicates += 1;
                    } else {
                        replay.entries.insert(entry.mention_id.clone(), entry);
                    }
                }
                Err(error) => {
                    warn!(line = line_no, %error, "Skipping unreadable task log line");
                    replay.invalid += 1;
                }
            }
        }

        debug!(
            path = %self.path.display(),
            entries = replay.entries.len(),
            duplicates = replay.duplicates,
            invalid = replay.invalid,
            "Task log replayed"
        );
        Ok(replay)
    }

    /// Append entries as whole lines under the write lock
    pub async fn append(&self, entries: &[TaskLogEntry]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }

        let mut buffer = String::new();
        for entry in entries {
            buffer.push_str(&serde_json::to_string(entry)?);
            buffer.push('\n');
        }

        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }

        // A torn last line must not swallow the first new entry
        if self.ends_mid_line().await? {
            buffer.insert(0, '\n');
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(buffer.as_bytes()).await?;
        file.flush().await?;
        file.sync_data().await?;
        Ok(())
    }

    /// Rewrite the log with one entry per mention.
    ///
    /// Returns the number of lines dropped.
    pub async fn compact(&self) -> Result<usize> {
        let replay = self.replay().await?;
        let dropped = replay.duplicates + replay.invalid;
        if dropped == 0 {
            return Ok(0);
        }

        let mut buffer = String::new();
        for entry in replay.entries.values() {
            buffer.push_str(&serde_json::to_string(entry)?);
            buffer.push('\n');
        }

        let _guard = self.write_lock.lock().await;
        let tmp = self.path.with_extension("jsonl.tmp");
        fs::write(&tmp, buffer).await?;
        fs::rename(&tmp, &self.path).await?;

        info!(
            path = %self.path.display(),
            kept = replay.entries.len(),
            dropped,
            "Task log compacted"
        );
        Ok(dropped)
    }

    async fn ends_mid_line(&self) -> Result<bool> {
        let mut file = match File::open(&self.path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        };
        if file.metadata().await?.len() == 0 {
            return Ok(false);
        }

        file.seek(SeekFrom::End(-1)).await?;
        let mut last = [0u8; 1];
        file.read_exact(&mut last).await?;
        Ok(last[0] != b'\n')
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use authorlink_core::DecisionMode;

    fn outcome(resolution: Resolution) -> DecisionOutcome {
        DecisionOutcome {
            resolution,
            rationale: "because".to_string(),
            confidence: Some(4),
            stats: StageStats {
                mode: DecisionMode::SingleStage,
                candidates: 2,
                oracle_calls: 1,
                ..StageStats::default()
            },
        }
    }

    #[tokio::test]
    async fn test_missing_log_replays_empty() {
        let dir = tempfile::tempdir().unwrap();
        let log = TaskLog::new(dir.path().join("log.jsonl"));
        let replay = log.replay().await.unwrap();
        assert!(replay.is_empty());
    }

    #[tokio::test]
    async fn test_append_and_replay() {
        let dir = tempfile::tempdir().unwrap();
        let log = TaskLog::new(dir.path().join("out/log.jsonl"));

        let first = log.entry("p1-0", outcome(Resolution::Entity("a1".to_string())));
        let second = log.entry("p2-1", outcome(Resolution::Nil));
        log.append(&[first.clone()]).await.unwrap();
        log.append(&[second]).await.unwrap();

        let replay = log.replay().await.unwrap();
        assert_eq!(replay.len(), 2);
        assert_eq!(replay.entries["p1-0"], first);
        assert!(replay.entries["p2-1"].outcome.is_nil());
        assert_eq!(replay.entries["p2-1"].run_id, Some(log.run_id()));
    }

    #[tokio::test]
    async fn test_first_entry_wins_and_compaction() {
        let dir = tempfile::tempdir().unwrap();
        let log = TaskLog::new(dir.path().join("log.jsonl"));

        log.append(&[log.entry("p1-0", outcome(Resolution::Entity("a1".to_string())))])
            .await
            .unwrap();
        log.append(&[log.entry("p1-0", outcome(Resolution::Nil))])
            .await
            .unwrap();

        let replay = log.replay().await.unwrap();
        assert_eq!(replay.duplicates, 1);
        assert_eq!(replay.entries["p1-0"].outcome.label(), "a1");

        assert_eq!(log.compact().await.unwrap(), 1);
        let content = std::fs::read_to_string(log.path()).unwrap();
        assert_eq!(content.lines().count(), 1);
        assert_eq!(log.compact().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_torn_line_is_skipped_and_append_recovers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.jsonl");
        std::fs::write(
            &path,
            "{\"task_id\": \"p1-0\", \"result\": \"NIL\", \"reasoning\": \"legacy\"}\n{\"mention_id\": \"p2-",
        )
        .unwrap();

        let log = TaskLog::new(&path);
        log.append(&[log.entry("p3-0", outcome(Resolution::Nil))])
            .await
            .unwrap();

        let replay = log.replay().await.unwrap();
        assert_eq!(replay.invalid, 1);
        assert!(replay.contains("p1-0"));
        assert!(replay.contains("p3-0"));
        assert_eq!(replay.entries["p1-0"].rationale, "legacy");
        assert_eq!(replay.entries["p1-0"].stats, StageStats::default());
    }

    #[tokio::test]
    async fn test_line_torn_inside_utf8_character_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.jsonl");
        let mut raw = b"{\"mention_id\":\"p1-0\",\"outcome\":\"NIL\"}\n".to_vec();
        raw.extend_from_slice(b"{\"mention_id\":\"p2-0\",\"rationale\":\"");
        raw.extend_from_slice(&[0xE4, 0xB8]);
        std::fs::write(&path, raw).unwrap();

        let log = TaskLog::new(&path);
        let replay = log.replay().await.unwrap();
        assert_eq!(replay.invalid, 1);
        assert!(replay.contains("p1-0"));
        assert!(!replay.contains("p2-0"));

        let entry = log.entry("p2-0", outcome(Resolution::Entity("王".to_string())));
        log.append(&[entry]).await.unwrap();

        let replay = log.replay().await.unwrap();
        assert_eq!(replay.invalid, 1);
        assert_eq!(replay.entries["p2-0"].outcome.label(), "王");
    }
}
