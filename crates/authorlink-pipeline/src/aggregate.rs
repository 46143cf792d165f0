//! Result aggregate: bucket key -> mention IDs

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use authorlink_core::{load_json, Resolution, Result, NIL_BUCKET};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::checkpoint::TaskLogEntry;

/// Mentions grouped by resolved entity, NIL mentions under `new_author`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResultAggregate {
    buckets: BTreeMap<String, BTreeSet<String>>,
}

impl ResultAggregate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from replayed log entries
    pub fn from_entries<'a>(entries: impl IntoIterator<Item = &'a TaskLogEntry>) -> Self {
        let mut aggregate = Self::new();
        for entry in entries {
            aggregate.record(&entry.mention_id, &entry.outcome);
        }
        aggregate
    }

    /// Load a snapshot written by [`write_snapshot`](Self::write_snapshot)
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        load_json(path)
    }

    pub fn record(&mut self, mention_id: &str, resolution: &Resolution) {
        self.buckets
            .entry(resolution.bucket().to_string())
            .or_default()
            .insert(mention_id.to_string());
    }

    pub fn buckets(&self) -> &BTreeMap<String, BTreeSet<String>> {
        &self.buckets
    }

    pub fn mentions(&self, bucket: &str) -> Option<&BTreeSet<String>> {
        self.buckets.get(bucket)
    }

    /// Mentions across every bucket
    pub fn mention_count(&self) -> usize {
        self.buckets.values().map(BTreeSet::len).sum()
    }

    pub fn nil_count(&self) -> usize {
        self.buckets.get(NIL_BUCKET).map_or(0, BTreeSet::len)
    }

    /// Rewrite the full snapshot through a temporary file
    pub async fn write_snapshot(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }

        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(self)?).await?;
        fs::rename(&tmp, path).await?;
        Ok(())
    }
}
