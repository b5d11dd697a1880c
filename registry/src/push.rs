//! Push pipeline.
//!
//! Serializes an assembled `ManifestList` to its wire form, stages
//! cross-repository member content at the target repository (mounting
//! labeled blobs where the registry allows it, copying scratch-store
//! bytes otherwise), and pushes the index under each requested tag.

use imux_core::error::{ImuxError, Result};
use imux_core::manifest::{
    classify_layer, is_manifest_media_type, Descriptor, ImageIndex, ImageManifest, LayerClass,
};
use oci_distribution::client::Client;
use reqwest::header::HeaderValue;
use sha2::{Digest, Sha256};

use crate::assemble::ManifestList;
use crate::fetch::classify_client_error;
use crate::host::RegistryHost;
use crate::reference::ImageReference;
use crate::store::{distribution_source_label, MemoryStore};

/// Push an assembled index, returning its digest and serialized length.
///
/// One manifest PUT per tag; with no tags, a single push under the
/// reference embedded in the list itself. The returned digest is a pure
/// function of the serialized content, so pushing the same list twice
/// yields the same digest.
pub async fn push_index(
    host: &RegistryHost,
    store: &MemoryStore,
    list: &ManifestList,
    tags: &[String],
) -> Result<(String, usize)> {
    if !host.capabilities.push {
        return Err(ImuxError::Registry {
            registry: host.registry.clone(),
            message: "host configuration does not permit push".to_string(),
        });
    }

    let index = ImageIndex {
        schema_version: 2,
        media_type: Some(list.kind.media_type().to_string()),
        manifests: list
            .entries
            .iter()
            .map(|e| e.descriptor.clone())
            .collect(),
        annotations: None,
    };
    let body = serde_json::to_vec(&index)?;
    let digest = format!("sha256:{}", hex::encode(Sha256::digest(&body)));
    let length = body.len();

    let client = host.client();
    let auth = host.auth();
    // establish push credentials before any upload round-trips
    client
        .auth(
            &list.target.to_oci(),
            &auth,
            oci_distribution::RegistryOperation::Push,
        )
        .await
        .map_err(|e| classify_client_error(&list.target, e))?;

    for entry in &list.entries {
        if entry.push_ref {
            stage_member(&client, store, &list.target, &entry.descriptor).await?;
        }
    }

    let content_type = HeaderValue::from_static(list.kind.media_type());
    if tags.is_empty() {
        let dest = list.target.to_oci();
        tracing::info!(reference = %list.target, digest = %digest, "pushing image index");
        client
            .push_manifest_raw(&dest, body.clone(), content_type.clone())
            .await
            .map_err(|e| classify_client_error(&list.target, e))?;
    } else {
        for tag in tags {
            let dest = list.target.oci_with_tag(tag);
            tracing::info!(reference = %dest, digest = %digest, "pushing image index");
            client
                .push_manifest_raw(&dest, body.clone(), content_type.clone())
                .await
                .map_err(|e| classify_client_error(&list.target, e))?;
        }
    }

    Ok((digest, length))
}

/// Make a cross-repository member's content available in the target
/// repository: every distributable blob it references, then the member
/// manifest itself, pushed by digest.
async fn stage_member(
    client: &Client,
    store: &MemoryStore,
    target: &ImageReference,
    descriptor: &Descriptor,
) -> Result<()> {
    let bytes = store.get(&descriptor.digest).ok_or_else(|| {
        ImuxError::Other(format!(
            "manifest {} missing from scratch store",
            descriptor.digest
        ))
    })?;

    if is_manifest_media_type(&descriptor.media_type) {
        let parsed: ImageManifest = serde_json::from_slice(&bytes).map_err(|e| {
            ImuxError::Serialization(format!(
                "could not unmarshal manifest object from descriptor '{}': {}",
                descriptor.digest, e
            ))
        })?;

        let label_key = distribution_source_label(&target.registry);
        for blob in std::iter::once(&parsed.config).chain(parsed.layers.iter()) {
            match classify_layer(&blob.media_type) {
                LayerClass::NonDistributable => {
                    tracing::debug!(digest = %blob.digest, "skipping non-distributable blob");
                    continue;
                }
                LayerClass::Manifest => continue,
                LayerClass::Distributable | LayerClass::Unknown => {}
            }
            ensure_blob(client, store, target, blob, &label_key).await?;
        }
    }

    let dest = target.oci_with_digest(&descriptor.digest);
    let content_type = HeaderValue::from_str(&descriptor.media_type).map_err(|e| {
        ImuxError::Other(format!(
            "manifest media type '{}' is not a valid header value: {}",
            descriptor.media_type, e
        ))
    })?;
    tracing::debug!(digest = %descriptor.digest, repository = %target.repository, "staging member manifest in target repository");
    client
        .push_manifest_raw(&dest, bytes, content_type)
        .await
        .map_err(|e| classify_client_error(target, e))?;
    Ok(())
}

/// Guarantee one blob exists in the target repository: request a
/// cross-repository mount from the labeled source repository, falling
/// back to a full copy of scratch-store bytes.
async fn ensure_blob(
    client: &Client,
    store: &MemoryStore,
    target: &ImageReference,
    blob: &Descriptor,
    label_key: &str,
) -> Result<()> {
    let target_oci = target.to_oci();

    if let Some(source_repo) = store.label(&blob.digest, label_key) {
        if source_repo != target.repository {
            let source = oci_distribution::Reference::with_digest(
                target.api_host().to_string(),
                source_repo.clone(),
                blob.digest.clone(),
            );
            match client.mount_blob(&target_oci, &source, &blob.digest).await {
                Ok(()) => {
                    tracing::debug!(
                        digest = %blob.digest,
                        from = %source_repo,
                        "mounted blob across repositories"
                    );
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!(
                        digest = %blob.digest,
                        from = %source_repo,
                        error = %e,
                        "cross-repo blob mount failed; falling back to copy"
                    );
                }
            }
        }
    }

    if let Some(data) = store.get(&blob.digest) {
        tracing::debug!(digest = %blob.digest, size = data.len(), "copying blob into target repository");
        client
            .push_blob(&target_oci, &data, &blob.digest)
            .await
            .map_err(|e| classify_client_error(target, e))?;
        return Ok(());
    }

    Err(ImuxError::Registry {
        registry: target.registry.clone(),
        message: format!(
            "blob {} could not be mounted into {} and is not held locally",
            blob.digest, target.repository
        ),
    })
}
