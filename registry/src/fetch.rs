//! Descriptor fetching.
//!
//! Resolves an image reference to its content descriptor and pulls the
//! referenced manifest tree (manifest bytes, index children, config
//! blobs — never layer blobs) into the scratch store.

use imux_core::error::{ImuxError, Result};
use imux_core::manifest::{
    self, Descriptor, ImageIndex, ImageManifest, MEDIA_TYPE_DOCKER_LIST,
    MEDIA_TYPE_DOCKER_MANIFEST, MEDIA_TYPE_OCI_INDEX, MEDIA_TYPE_OCI_MANIFEST,
};
use oci_distribution::client::Client;
use oci_distribution::errors::{OciDistributionError, OciErrorCode};
use oci_distribution::manifest::OciDescriptor;
use oci_distribution::secrets::RegistryAuth;

use crate::host::RegistryHost;
use crate::reference::ImageReference;
use crate::store::{distribution_source_label, MemoryStore};

/// Accept header values for manifest resolution.
const MANIFEST_ACCEPT: &[&str] = &[
    MEDIA_TYPE_OCI_MANIFEST,
    MEDIA_TYPE_DOCKER_MANIFEST,
    MEDIA_TYPE_OCI_INDEX,
    MEDIA_TYPE_DOCKER_LIST,
];

/// Resolve a reference and pull its manifest tree into the store.
///
/// Returns the top-level content descriptor. For a single-platform
/// manifest the config blob is pulled as well; for an index, every
/// child manifest (attestations included) and each child's config blob
/// are pulled. Everything stored is labeled with its source repository
/// so the push pipeline can request cross-repository mounts.
pub async fn fetch_descriptor(
    host: &RegistryHost,
    store: &MemoryStore,
    reference: &ImageReference,
) -> Result<Descriptor> {
    let client = host.client();
    let auth = host.auth();
    let oci_ref = reference.to_oci();

    tracing::debug!(reference = %reference, "resolving manifest descriptor");
    let (bytes, digest) = client
        .pull_manifest_raw(&oci_ref, &auth, MANIFEST_ACCEPT)
        .await
        .map_err(|e| classify_client_error(reference, e))?;

    let media_type = manifest::sniff_media_type(&bytes).ok_or_else(|| ImuxError::Registry {
        registry: reference.registry.clone(),
        message: format!("manifest for {} has no recognizable media type", reference),
    })?;

    let descriptor = Descriptor {
        media_type: media_type.clone(),
        digest: digest.clone(),
        size: bytes.len() as i64,
        urls: None,
        annotations: None,
        platform: None,
    };

    record(store, reference, &digest, bytes.clone());

    if manifest::is_manifest_media_type(&media_type) {
        let parsed: ImageManifest = serde_json::from_slice(&bytes).map_err(|e| {
            ImuxError::Serialization(format!(
                "could not unmarshal manifest for image '{}': {}",
                reference, e
            ))
        })?;
        fetch_config(&client, store, reference, &parsed).await?;
    } else if manifest::is_index_media_type(&media_type) {
        let parsed: ImageIndex = serde_json::from_slice(&bytes).map_err(|e| {
            ImuxError::Serialization(format!(
                "could not unmarshal index for image '{}': {}",
                reference, e
            ))
        })?;
        for child in &parsed.manifests {
            fetch_child(&client, &auth, store, reference, child).await?;
        }
    }
    // other media types surface to the caller, which rejects them

    Ok(descriptor)
}

/// Pull one index child's manifest bytes (and config) into the store.
async fn fetch_child(
    client: &Client,
    auth: &RegistryAuth,
    store: &MemoryStore,
    reference: &ImageReference,
    child: &Descriptor,
) -> Result<()> {
    let child_ref = reference.oci_with_digest(&child.digest);
    tracing::debug!(digest = %child.digest, "pulling index child manifest");
    let (bytes, digest) = client
        .pull_manifest_raw(&child_ref, auth, MANIFEST_ACCEPT)
        .await
        .map_err(|e| classify_client_error(reference, e))?;

    record(store, reference, &digest, bytes.clone());

    if manifest::is_manifest_media_type(&child.media_type) {
        if let Ok(parsed) = serde_json::from_slice::<ImageManifest>(&bytes) {
            fetch_config(client, store, reference, &parsed).await?;
        }
    }
    Ok(())
}

/// Pull a manifest's config blob into the store. Blob pulls reuse the
/// token the client established while resolving the manifest.
async fn fetch_config(
    client: &Client,
    store: &MemoryStore,
    reference: &ImageReference,
    parsed: &ImageManifest,
) -> Result<()> {
    if store.contains(&parsed.config.digest) {
        return Ok(());
    }
    let mut config_bytes = Vec::new();
    client
        .pull_blob(
            &reference.to_oci(),
            &to_oci_descriptor(&parsed.config),
            &mut config_bytes,
        )
        .await
        .map_err(|e| classify_client_error(reference, e))?;
    record(store, reference, &parsed.config.digest, config_bytes);
    Ok(())
}

/// Store bytes under a digest and label them with their source.
fn record(store: &MemoryStore, reference: &ImageReference, digest: &str, bytes: Vec<u8>) {
    store.put(digest, bytes);
    let key = distribution_source_label(&reference.registry);
    if let Err(e) = store.set_label(digest, &key, &reference.repository) {
        tracing::warn!(digest, error = %e, "couldn't update scratch store labels");
    }
}

/// Convert a wire descriptor to the client's descriptor type.
pub(crate) fn to_oci_descriptor(d: &Descriptor) -> OciDescriptor {
    OciDescriptor {
        media_type: d.media_type.clone(),
        digest: d.digest.clone(),
        size: d.size,
        urls: d.urls.clone(),
        annotations: d
            .annotations
            .as_ref()
            .map(|a| a.iter().map(|(k, v)| (k.clone(), v.clone())).collect()),
    }
}

/// Map a protocol client error onto the operation error taxonomy,
/// distinguishing "does not exist" from auth and connection failures.
pub(crate) fn classify_client_error(
    reference: &ImageReference,
    error: OciDistributionError,
) -> ImuxError {
    match error {
        OciDistributionError::UnauthorizedError { .. }
        | OciDistributionError::AuthenticationFailure(_) => ImuxError::Unauthorized {
            registry: reference.registry.clone(),
        },
        OciDistributionError::ImageManifestNotFoundError(_) => ImuxError::NotFound {
            reference: reference.to_string(),
        },
        OciDistributionError::RegistryError { ref envelope, .. } => {
            let not_found = envelope.errors.iter().any(|e| {
                matches!(
                    e.code,
                    OciErrorCode::ManifestUnknown
                        | OciErrorCode::NameUnknown
                        | OciErrorCode::BlobUnknown
                )
            });
            let denied = envelope
                .errors
                .iter()
                .any(|e| matches!(e.code, OciErrorCode::Unauthorized | OciErrorCode::Denied));
            if not_found {
                ImuxError::NotFound {
                    reference: reference.to_string(),
                }
            } else if denied {
                ImuxError::Unauthorized {
                    registry: reference.registry.clone(),
                }
            } else {
                ImuxError::Registry {
                    registry: reference.registry.clone(),
                    message: error.to_string(),
                }
            }
        }
        other => ImuxError::Registry {
            registry: reference.registry.clone(),
            message: other.to_string(),
        },
    }
}
