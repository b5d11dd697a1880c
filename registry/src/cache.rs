//! Inspection result caching.
//!
//! A narrow collaborator interface over any key-value store, plus an
//! in-memory implementation with fixed-TTL read-side eviction. The
//! interface is deliberately independent of the backing store
//! technology.

use std::collections::HashMap;

use chrono::Utc;
use imux_core::error::Result;
use parking_lot::RwLock;

use crate::host::RegistryHost;
use crate::inspect::{inspect, ImageSummary};
use crate::reference::ImageReference;
use crate::store::MemoryStore;

/// Default time-to-live for cached inspections, in seconds.
pub const DEFAULT_CACHE_TTL_SECS: i64 = 3600;

/// Key-value collaborator holding resolved platform lists.
pub trait ImageCache: Send + Sync {
    /// Look up a cached summary; expired entries are a miss.
    fn get(&self, image_name: &str) -> Option<ImageSummary>;

    /// Store a summary under its image name.
    fn put(&self, summary: ImageSummary);

    /// Drop a cached summary.
    fn delete(&self, image_name: &str);
}

/// In-memory TTL cache; entries expire on read.
#[derive(Debug)]
pub struct MemoryImageCache {
    ttl_secs: i64,
    entries: RwLock<HashMap<String, ImageSummary>>,
}

impl MemoryImageCache {
    pub fn new(ttl_secs: i64) -> Self {
        Self {
            ttl_secs,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_default_ttl() -> Self {
        Self::new(DEFAULT_CACHE_TTL_SECS)
    }

    fn expired(&self, summary: &ImageSummary) -> bool {
        Utc::now().timestamp() - summary.cached_at >= self.ttl_secs
    }
}

impl Default for MemoryImageCache {
    fn default() -> Self {
        Self::with_default_ttl()
    }
}

impl ImageCache for MemoryImageCache {
    fn get(&self, image_name: &str) -> Option<ImageSummary> {
        let hit = self.entries.read().get(image_name).cloned()?;
        if self.expired(&hit) {
            tracing::debug!(image = image_name, "cache entry expired; evicting");
            self.entries.write().remove(image_name);
            return None;
        }
        Some(hit)
    }

    fn put(&self, summary: ImageSummary) {
        self.entries
            .write()
            .insert(summary.image_name.clone(), summary);
    }

    fn delete(&self, image_name: &str) {
        self.entries.write().remove(image_name);
    }
}

/// Inspect through a cache: serve a fresh hit, otherwise resolve from
/// the registry and store the result (best effort).
pub async fn inspect_cached(
    cache: &dyn ImageCache,
    host: &RegistryHost,
    reference: &ImageReference,
) -> Result<ImageSummary> {
    let name = reference.to_string();
    if let Some(hit) = cache.get(&name) {
        tracing::debug!(image = %name, "serving platform list from cache");
        return Ok(hit);
    }

    // the scratch store lives exactly as long as this inspection
    let store = MemoryStore::new();
    let summary = inspect(host, &store, reference).await?;
    cache.put(summary.clone());
    Ok(summary)
}
