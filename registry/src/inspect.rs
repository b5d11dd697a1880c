//! Image inspection.
//!
//! Resolves one image reference and reports which platforms it
//! provides: a single platform read from the config blob for a leaf
//! manifest, or the children's platform records for an index.

use chrono::Utc;
use imux_core::error::{ImuxError, Result};
use imux_core::manifest::{self, ImageManifest};
use imux_core::platform::Platform;
use oci_spec::image::ImageConfiguration;
use serde::{Deserialize, Serialize};

use crate::assemble::images_from_index;
use crate::fetch::fetch_descriptor;
use crate::host::RegistryHost;
use crate::reference::ImageReference;
use crate::store::MemoryStore;

/// Resolved platform report for one image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageSummary {
    pub image_name: String,
    pub digest: String,
    pub media_type: String,
    pub is_list: bool,
    pub platforms: Vec<Platform>,
    /// Epoch seconds at resolution time; drives cache expiry.
    pub cached_at: i64,
}

/// Resolve an image and report its platform list.
///
/// Attestation entries of an index are excluded: they carry
/// supply-chain metadata, not a runnable platform.
pub async fn inspect(
    host: &RegistryHost,
    store: &MemoryStore,
    reference: &ImageReference,
) -> Result<ImageSummary> {
    let descriptor = fetch_descriptor(host, store, reference).await?;

    let is_list = manifest::is_index_media_type(&descriptor.media_type);
    let platforms = if is_list {
        let (children, _attestations) = images_from_index(store, &descriptor)?;
        children
            .into_iter()
            .map(|d| d.platform.unwrap_or_default())
            .collect()
    } else if manifest::is_manifest_media_type(&descriptor.media_type) {
        vec![config_platform(store, &descriptor.digest, reference)?]
    } else {
        return Err(ImuxError::UnsupportedMediaType {
            media_type: descriptor.media_type,
            digest: descriptor.digest,
        });
    };

    Ok(ImageSummary {
        image_name: reference.to_string(),
        digest: descriptor.digest,
        media_type: descriptor.media_type,
        is_list,
        platforms,
        cached_at: Utc::now().timestamp(),
    })
}

/// Read the platform a leaf manifest's config blob records.
fn config_platform(
    store: &MemoryStore,
    manifest_digest: &str,
    reference: &ImageReference,
) -> Result<Platform> {
    let manifest_bytes = store.get(manifest_digest).ok_or_else(|| {
        ImuxError::Other(format!(
            "manifest {} missing from scratch store",
            manifest_digest
        ))
    })?;
    let parsed: ImageManifest = serde_json::from_slice(&manifest_bytes).map_err(|e| {
        ImuxError::Serialization(format!(
            "could not unmarshal manifest for image '{}': {}",
            reference, e
        ))
    })?;
    let config_bytes = store.get(&parsed.config.digest).ok_or_else(|| {
        ImuxError::Other(format!(
            "config {} missing from scratch store",
            parsed.config.digest
        ))
    })?;
    let config: ImageConfiguration = serde_json::from_slice(&config_bytes).map_err(|e| {
        ImuxError::Serialization(format!(
            "could not unmarshal config for image '{}': {}",
            reference, e
        ))
    })?;

    let mut platform = Platform::new(config.os().to_string(), config.architecture().to_string());
    platform.merge_config(
        config.variant().as_deref(),
        config.os_version().as_deref(),
        config.os_features().as_deref(),
    );
    Ok(platform)
}
