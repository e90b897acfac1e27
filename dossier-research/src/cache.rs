//! Result cache keyed by (source, normalized query)
//!
//! Keys are the SHA-256 of `source_id \0 normalized_query`, hex encoded.
//! Entries expire after a per-put TTL; expired entries are evicted lazily by
//! the next `get` touching their key (or an explicit `purge_expired`).
//!
//! Concurrent `put`s for one key race; the last writer wins.

use crate::types::{Query, RawRecord, SourceId};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Clone)]
struct CacheEntry {
    records: Arc<Vec<RawRecord>>,
    expires_at: Instant,
}

/// Shared result cache
#[derive(Debug, Default)]
pub struct ResultCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl ResultCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache key for a source/query pair
    pub fn key(source_id: &SourceId, query: &Query) -> String {
        let mut hasher = Sha256::new();
        hasher.update(source_id.as_str().as_bytes());
        hasher.update([0u8]);
        hasher.update(query.normalized().as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Fresh records for the pair; expired entries count as a miss
    pub async fn get(&self, source_id: &SourceId, query: &Query) -> Option<Vec<RawRecord>> {
        let key = Self::key(source_id, query);
        let now = Instant::now();

        {
            let entries = self.entries.read().await;
            match entries.get(&key) {
                None => return None,
                Some(entry) if entry.expires_at > now => {
                    return Some(entry.records.as_ref().clone());
                }
                Some(_) => {}
            }
        }

        // Expired: evict unless a concurrent put already refreshed it
        let mut entries = self.entries.write().await;
        if entries
            .get(&key)
            .is_some_and(|entry| entry.expires_at <= Instant::now())
        {
            entries.remove(&key);
            debug!(source = %source_id, "Evicted expired cache entry");
        }
        None
    }

    /// Store records for the pair, replacing any previous entry
    pub async fn put(&self, source_id: &SourceId, query: &Query, records: Vec<RawRecord>, ttl: Duration) {
        let key = Self::key(source_id, query);
        let entry = CacheEntry {
            records: Arc::new(records),
            expires_at: Instant::now() + ttl,
        };
        debug!(
            source = %source_id,
            records = entry.records.len(),
            ttl_secs = ttl.as_secs(),
            "Cached source result"
        );
        self.entries.write().await.insert(key, entry);
    }

    /// Drop every expired entry; returns how many were removed
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        before - entries.len()
    }

    /// Number of stored entries (including not-yet-evicted expired ones)
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}
