//! In-memory content store scoped to one registry operation.
//!
//! Maps content digests to raw bytes and to mutable label metadata.
//! Labels may exist for digests whose bytes were never pulled (layer
//! blobs are referenced, not downloaded). Nothing is persisted; the
//! store dies with the operation that owns it.

use std::collections::HashMap;

use imux_core::error::{ImuxError, Result};
use parking_lot::RwLock;

/// Label recording which repository a blob was fetched through, keyed
/// by registry so a later push can request a cross-repository mount.
pub fn distribution_source_label(registry: &str) -> String {
    format!("containerd.io/distribution.source.{}", registry)
}

/// Digest-keyed scratch store for one push or inspect operation.
#[derive(Debug, Default)]
pub struct MemoryStore {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
    labels: RwLock<HashMap<String, HashMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store content under its digest.
    pub fn put(&self, digest: &str, bytes: Vec<u8>) {
        self.blobs.write().insert(digest.to_string(), bytes);
    }

    /// Fetch stored content by digest.
    pub fn get(&self, digest: &str) -> Option<Vec<u8>> {
        self.blobs.read().get(digest).cloned()
    }

    /// True when content for the digest is present.
    pub fn contains(&self, digest: &str) -> bool {
        self.blobs.read().contains_key(digest)
    }

    /// Attach or overwrite a label on a digest. The digest does not
    /// need stored bytes, but must be well-formed (`algorithm:hex`).
    pub fn set_label(&self, digest: &str, key: &str, value: &str) -> Result<()> {
        if !digest.contains(':') {
            return Err(ImuxError::Other(format!(
                "can't label malformed digest '{}'",
                digest
            )));
        }
        self.labels
            .write()
            .entry(digest.to_string())
            .or_default()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    /// Read one label from a digest.
    pub fn label(&self, digest: &str, key: &str) -> Option<String> {
        self.labels.read().get(digest)?.get(key).cloned()
    }

    /// All labels attached to a digest.
    pub fn labels(&self, digest: &str) -> HashMap<String, String> {
        self.labels.read().get(digest).cloned().unwrap_or_default()
    }

    /// Number of stored blobs.
    pub fn len(&self) -> usize {
        self.blobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.read().is_empty()
    }
}
