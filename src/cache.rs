//! Content-addressed disk cache for per-item lookup results.
//!
//! The cache is a collaborator with its own persistence lifecycle, decoupled
//! from pipeline checkpointing: losing it costs service calls, never results.
//! Keys are SHA-256 digests of the item id, so the cache file is independent
//! of id formatting.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use snafu::ResultExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::batch::Batch;
use crate::checkpoint::atomic_write;
use crate::error::{SerializeSnafu, StorageError};
use crate::retry::{AttemptOutcome, BatchFetcher};
use crate::service::{ItemResult, ItemStatus};

/// Persistent key/value cache backed by a single JSON file.
pub struct DiskCache {
    path: PathBuf,
    entries: HashMap<String, String>,
    dirty: bool,
}

impl DiskCache {
    /// Open a cache file, starting empty if it does not exist.
    ///
    /// A cache file that fails to parse is discarded with a warning; the
    /// cache is advisory and must never fail the pipeline.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        let entries = match tokio::fs::read(&path).await {
            Ok(bytes) => match serde_json::from_slice::<HashMap<String, String>>(&bytes) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "Failed to parse cache file, starting empty"
                    );
                    HashMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(source) => {
                return Err(StorageError::Read {
                    path: path.display().to_string(),
                    source,
                });
            }
        };

        Ok(Self {
            path,
            entries,
            dirty: false,
        })
    }

    fn digest(key: &str) -> String {
        let digest = Sha256::digest(key.as_bytes());
        digest.iter().map(|b| format!("{b:02x}")).collect()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(&Self::digest(key)).map(String::as_str)
    }

    pub fn put(&mut self, key: &str, value: String) {
        self.entries.insert(Self::digest(key), value);
        self.dirty = true;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Write the cache to disk atomically, if anything changed.
    pub async fn persist(&mut self) -> Result<(), StorageError> {
        if !self.dirty {
            return Ok(());
        }
        let json = serde_json::to_vec_pretty(&self.entries).context(SerializeSnafu)?;
        atomic_write(&self.path, &json).await?;
        self.dirty = false;

        debug!(path = %self.path.display(), entries = self.entries.len(), "Persisted cache");
        Ok(())
    }
}

/// Fetcher wrapper that serves cached items and forwards only misses.
///
/// Hits are merged back in batch order, so the wrapped fetcher is
/// indistinguishable from the inner one apart from the smaller sub-batches it
/// submits. Fresh `Ok` results are cached after each successful attempt.
pub struct CachedFetcher {
    inner: std::sync::Arc<dyn BatchFetcher>,
    cache: Mutex<DiskCache>,
}

impl CachedFetcher {
    pub fn new(inner: std::sync::Arc<dyn BatchFetcher>, cache: DiskCache) -> Self {
        Self {
            inner,
            cache: Mutex::new(cache),
        }
    }
}

#[async_trait]
impl BatchFetcher for CachedFetcher {
    async fn attempt(&self, batch: &Batch) -> AttemptOutcome {
        let (hits, miss_items) = {
            let cache = self.cache.lock().await;
            let mut hits: HashMap<String, String> = HashMap::new();
            let mut misses = Vec::new();
            for item in &batch.items {
                match cache.get(&item.id) {
                    Some(output) => {
                        hits.insert(item.id.clone(), output.to_string());
                    }
                    None => misses.push(item.clone()),
                }
            }
            (hits, misses)
        };

        if miss_items.is_empty() {
            debug!(batch = batch.index, "All items served from cache");
            let results = batch
                .items
                .iter()
                .map(|item| {
                    ItemResult::ok(&item.id, hits.get(&item.id).cloned().unwrap_or_default())
                })
                .collect();
            return AttemptOutcome::Success(results);
        }

        let miss_count = miss_items.len();
        let sub_batch = Batch {
            index: batch.index,
            items: miss_items,
        };

        match self.inner.attempt(&sub_batch).await {
            AttemptOutcome::Success(results) => {
                let mut by_id: HashMap<String, ItemResult> = results
                    .into_iter()
                    .map(|result| (result.id.clone(), result))
                    .collect();

                let mut cache = self.cache.lock().await;
                let merged = batch
                    .items
                    .iter()
                    .map(|item| match hits.get(&item.id) {
                        Some(output) => ItemResult::ok(&item.id, output.clone()),
                        None => {
                            let result = by_id
                                .remove(&item.id)
                                .unwrap_or_else(|| ItemResult::not_found(&item.id));
                            if result.status == ItemStatus::Ok {
                                cache.put(&item.id, result.output.clone());
                            }
                            result
                        }
                    })
                    .collect();

                if let Err(e) = cache.persist().await {
                    warn!(error = %e, "Failed to persist cache");
                }

                debug!(
                    batch = batch.index,
                    hits = hits.len(),
                    misses = miss_count,
                    "Merged cached and fetched results"
                );
                AttemptOutcome::Success(merged)
            }
            other => other,
        }
    }
}
