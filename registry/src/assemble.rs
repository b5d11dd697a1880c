//! Image index assembly.
//!
//! Walks the requested member images, classifies each fetched
//! descriptor, reconciles platform records, enforces slot uniqueness,
//! and marks layer blobs for cross-repository mounting. The result is
//! an ordered `ManifestList` ready for the push pipeline: platform
//! entries in input order, attestation entries appended after them.

use std::collections::HashMap;

use imux_core::error::{ImuxError, Result};
use imux_core::input::MemberSpec;
use imux_core::manifest::{
    self, classify_layer, Descriptor, ImageIndex, ImageManifest, LayerClass, ManifestKind,
};
use imux_core::platform::Platform;
use oci_spec::image::ImageConfiguration;

use crate::fetch::fetch_descriptor;
use crate::host::RegistryHost;
use crate::reference::ImageReference;
use crate::store::{distribution_source_label, MemoryStore};

/// Assembly policy knobs.
#[derive(Debug, Clone, Copy, Default)]
pub struct AssembleOptions {
    /// Log and skip members that fail to resolve instead of aborting.
    pub ignore_missing: bool,
    /// Wire form of the assembled index.
    pub kind: ManifestKind,
}

/// One manifest of the assembled index.
#[derive(Debug, Clone)]
pub struct ListEntry {
    pub descriptor: Descriptor,
    /// True when the member lives in a different repository than the
    /// target: its content must be staged there before the final push.
    pub push_ref: bool,
}

/// An assembled, not-yet-pushed image index.
#[derive(Debug, Clone)]
pub struct ManifestList {
    /// The target image name as given by the caller.
    pub name: String,
    pub target: ImageReference,
    pub kind: ManifestKind,
    pub entries: Vec<ListEntry>,
}

/// Assemble an index from member images.
pub async fn assemble(
    host: &RegistryHost,
    store: &MemoryStore,
    target: &ImageReference,
    members: &[MemberSpec],
    opts: &AssembleOptions,
) -> Result<ManifestList> {
    let mut platform_entries: Vec<ListEntry> = Vec::new();
    let mut attestation_entries: Vec<ListEntry> = Vec::new();

    tracing::info!(target = %target, members = members.len(), "retrieving digests of member images");
    for member in members {
        let member_ref = ImageReference::parse(&member.image)?;
        if !member_ref.same_registry(target) {
            return Err(ImuxError::RegistryMismatch {
                member: member_ref.to_string(),
                target: target.to_string(),
            });
        }

        let descriptor = match fetch_descriptor(host, store, &member_ref).await {
            Ok(d) => d,
            Err(e) if opts.ignore_missing => {
                tracing::warn!(
                    image = %member.image,
                    error = %e,
                    "couldn't access member image; skipping due to ignore-missing policy"
                );
                continue;
            }
            Err(e) => return Err(e),
        };

        let push_ref = !member_ref.same_repository(target);

        if manifest::is_index_media_type(&descriptor.media_type) {
            // a nested index contributes its children, one level deep
            let (children, attestations) = images_from_index(store, &descriptor)?;
            platform_entries.extend(children.into_iter().map(|descriptor| ListEntry {
                descriptor,
                push_ref,
            }));
            attestation_entries.extend(attestations.into_iter().map(|descriptor| ListEntry {
                descriptor,
                push_ref,
            }));
        } else if manifest::is_manifest_media_type(&descriptor.media_type) {
            let platform = resolve_member_platform(store, &descriptor, member)?;
            let mut descriptor = descriptor;
            descriptor.platform = Some(platform);
            platform_entries.push(ListEntry {
                descriptor,
                push_ref,
            });
        } else {
            return Err(ImuxError::UnsupportedMediaType {
                media_type: descriptor.media_type,
                digest: descriptor.digest,
            });
        }
    }

    detect_platform_collisions(&platform_entries)?;

    for entry in platform_entries.iter().chain(attestation_entries.iter()) {
        annotate_layer_sources(store, &entry.descriptor, &target.registry)?;
    }

    let mut entries = platform_entries;
    entries.append(&mut attestation_entries);

    if opts.ignore_missing && entries.is_empty() {
        // every member was skipped; an empty index is never pushed
        return Err(ImuxError::EmptyIndex);
    }

    Ok(ManifestList {
        name: target.to_string(),
        target: target.clone(),
        kind: opts.kind,
        entries,
    })
}

/// Split an index's children into platform manifests and attestations.
pub(crate) fn images_from_index(
    store: &MemoryStore,
    descriptor: &Descriptor,
) -> Result<(Vec<Descriptor>, Vec<Descriptor>)> {
    let bytes = store.get(&descriptor.digest).ok_or_else(|| {
        ImuxError::Other(format!(
            "index {} missing from scratch store",
            descriptor.digest
        ))
    })?;
    let index: ImageIndex = serde_json::from_slice(&bytes).map_err(|e| {
        ImuxError::Serialization(format!(
            "could not unmarshal index from descriptor '{}': {}",
            descriptor.digest, e
        ))
    })?;

    let mut manifests = Vec::new();
    let mut attestations = Vec::new();
    for entry in index.manifests {
        if entry.is_attestation() {
            attestations.push(entry);
        } else {
            manifests.push(entry);
        }
    }
    Ok((manifests, attestations))
}

/// Compute the authoritative platform for a leaf member.
///
/// When the caller supplied neither os nor architecture, the fetched
/// descriptor's platform wins, then the image configuration's
/// os/architecture. Variant, os version and os features recorded only
/// in the configuration are merged in additively. The final record must
/// be a known os/arch(/variant) combination.
fn resolve_member_platform(
    store: &MemoryStore,
    descriptor: &Descriptor,
    member: &MemberSpec,
) -> Result<Platform> {
    let manifest_bytes = store.get(&descriptor.digest).ok_or_else(|| {
        ImuxError::Other(format!(
            "manifest {} missing from scratch store",
            descriptor.digest
        ))
    })?;
    let parsed: ImageManifest = serde_json::from_slice(&manifest_bytes).map_err(|e| {
        ImuxError::Serialization(format!(
            "could not unmarshal manifest object for image '{}': {}",
            member.image, e
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
            "could not unmarshal config object for image '{}': {}",
            member.image, e
        ))
    })?;

    let mut platform = member.platform.clone();
    if platform.is_unspecified() {
        match descriptor.platform.as_ref().filter(|p| !p.is_unspecified()) {
            Some(from_descriptor) => platform = from_descriptor.clone(),
            None => {
                platform.os = config.os().to_string();
                platform.architecture = config.architecture().to_string();
            }
        }
    }
    platform.merge_config(
        config.variant().as_deref(),
        config.os_version().as_deref(),
        config.os_features().as_deref(),
    );

    if !platform.is_valid() {
        return Err(ImuxError::PlatformValidation {
            image: member.image.clone(),
            os: platform.os.clone(),
            arch: platform.architecture.clone(),
            variant: platform.variant.clone().unwrap_or_default(),
        });
    }
    Ok(platform)
}

/// Enforce slot uniqueness across the platform entries (attestations
/// never participate). Runs as one reduction pass after classification,
/// so the outcome is deterministic regardless of fetch order.
pub(crate) fn detect_platform_collisions(entries: &[ListEntry]) -> Result<()> {
    let mut slots: HashMap<String, String> = HashMap::new();
    for entry in entries {
        let signature = entry
            .descriptor
            .platform
            .as_ref()
            .map(Platform::signature)
            .unwrap_or_default();
        if let Some(existing) = slots.get(&signature) {
            return Err(ImuxError::PlatformCollision {
                signature,
                existing: existing.clone(),
                conflicting: entry.descriptor.digest.clone(),
            });
        }
        slots.insert(signature, entry.descriptor.digest.clone());
    }
    Ok(())
}

/// Mark an accepted manifest's layer blobs with their source repository
/// so the push step can request cross-repository mounts. Label failures
/// are logged, never fatal; the mount is an optimization.
fn annotate_layer_sources(
    store: &MemoryStore,
    descriptor: &Descriptor,
    registry: &str,
) -> Result<()> {
    if !manifest::is_manifest_media_type(&descriptor.media_type) {
        // nested-index children carry no layer list of their own
        return Ok(());
    }
    let bytes = store.get(&descriptor.digest).ok_or_else(|| {
        ImuxError::Other(format!(
            "manifest {} missing from scratch store",
            descriptor.digest
        ))
    })?;
    let parsed: ImageManifest = serde_json::from_slice(&bytes).map_err(|e| {
        ImuxError::Serialization(format!(
            "could not unmarshal manifest object from descriptor '{}': {}",
            descriptor.digest, e
        ))
    })?;

    let key = distribution_source_label(registry);
    let Some(source_repo) = store.label(&descriptor.digest, &key) else {
        tracing::debug!(digest = %descriptor.digest, "manifest has no source label; skipping mount marks");
        return Ok(());
    };

    for layer in &parsed.layers {
        match classify_layer(&layer.media_type) {
            LayerClass::NonDistributable | LayerClass::Manifest => continue,
            LayerClass::Unknown => {
                tracing::warn!(
                    digest = %layer.digest,
                    media_type = %layer.media_type,
                    "unrecognized layer media type; treating as distributable for cross-repo mount"
                );
            }
            LayerClass::Distributable => {}
        }
        if let Err(e) = store.set_label(&layer.digest, &key, &source_repo) {
            tracing::warn!(digest = %layer.digest, error = %e, "couldn't update scratch store labels");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use imux_core::manifest::{
        ANNOTATION_REFERENCE_TYPE, MEDIA_TYPE_OCI_INDEX, MEDIA_TYPE_OCI_MANIFEST,
        REFERENCE_TYPE_ATTESTATION,
    };
    use std::collections::BTreeMap;

    fn entry(digest: &str, platform: Option<Platform>) -> ListEntry {
        ListEntry {
            descriptor: Descriptor {
                media_type: MEDIA_TYPE_OCI_MANIFEST.to_string(),
                digest: digest.to_string(),
                size: 1,
                urls: None,
                annotations: None,
                platform,
            },
            push_ref: false,
        }
    }

    #[test]
    fn test_collision_names_both_digests() {
        let entries = vec![
            entry("sha256:aaa", Some(Platform::new("linux", "amd64"))),
            entry("sha256:bbb", Some(Platform::new("linux", "arm64"))),
            entry("sha256:ccc", Some(Platform::new("linux", "amd64"))),
        ];
        let err = detect_platform_collisions(&entries).unwrap_err();
        match err {
            ImuxError::PlatformCollision {
                existing,
                conflicting,
                signature,
            } => {
                assert_eq!(existing, "sha256:aaa");
                assert_eq!(conflicting, "sha256:ccc");
                assert!(signature.contains("amd64"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_no_collision_for_distinct_variants() {
        let v7 = Platform::parse("linux/arm/v7").unwrap();
        let v6 = Platform::parse("linux/arm/v6").unwrap();
        let entries = vec![entry("sha256:aaa", Some(v7)), entry("sha256:bbb", Some(v6))];
        assert!(detect_platform_collisions(&entries).is_ok());
    }

    #[test]
    fn test_images_from_index_separates_attestations() {
        let store = MemoryStore::new();

        let mut attestation_annotations = BTreeMap::new();
        attestation_annotations.insert(
            ANNOTATION_REFERENCE_TYPE.to_string(),
            REFERENCE_TYPE_ATTESTATION.to_string(),
        );
        let index = ImageIndex {
            schema_version: 2,
            media_type: Some(MEDIA_TYPE_OCI_INDEX.to_string()),
            manifests: vec![
                Descriptor {
                    media_type: MEDIA_TYPE_OCI_MANIFEST.to_string(),
                    digest: "sha256:platform".to_string(),
                    size: 1,
                    urls: None,
                    annotations: None,
                    platform: Some(Platform::new("linux", "amd64")),
                },
                Descriptor {
                    media_type: MEDIA_TYPE_OCI_MANIFEST.to_string(),
                    digest: "sha256:attest".to_string(),
                    size: 1,
                    urls: None,
                    annotations: Some(attestation_annotations),
                    platform: None,
                },
            ],
            annotations: None,
        };
        let bytes = serde_json::to_vec(&index).unwrap();
        store.put("sha256:idx", bytes);

        let descriptor = Descriptor {
            media_type: MEDIA_TYPE_OCI_INDEX.to_string(),
            digest: "sha256:idx".to_string(),
            size: 1,
            urls: None,
            annotations: None,
            platform: None,
        };
        let (platforms, attestations) = images_from_index(&store, &descriptor).unwrap();
        assert_eq!(platforms.len(), 1);
        assert_eq!(platforms[0].digest, "sha256:platform");
        assert_eq!(attestations.len(), 1);
        assert_eq!(attestations[0].digest, "sha256:attest");
    }

    #[test]
    fn test_images_from_index_malformed_is_error() {
        let store = MemoryStore::new();
        store.put("sha256:idx", b"not an index".to_vec());
        let descriptor = Descriptor {
            media_type: MEDIA_TYPE_OCI_INDEX.to_string(),
            digest: "sha256:idx".to_string(),
            size: 1,
            urls: None,
            annotations: None,
            platform: None,
        };
        assert!(images_from_index(&store, &descriptor).is_err());
    }

    /// Store a manifest + config pair for reconciliation tests.
    fn seed_leaf(store: &MemoryStore, config_json: &str) -> Descriptor {
        let config_bytes = config_json.as_bytes().to_vec();
        store.put("sha256:cfg", config_bytes);
        let manifest = ImageManifest {
            schema_version: 2,
            media_type: Some(MEDIA_TYPE_OCI_MANIFEST.to_string()),
            config: Descriptor {
                media_type: "application/vnd.oci.image.config.v1+json".to_string(),
                digest: "sha256:cfg".to_string(),
                size: config_json.len() as i64,
                urls: None,
                annotations: None,
                platform: None,
            },
            layers: vec![],
            annotations: None,
        };
        store.put("sha256:man", serde_json::to_vec(&manifest).unwrap());
        Descriptor {
            media_type: MEDIA_TYPE_OCI_MANIFEST.to_string(),
            digest: "sha256:man".to_string(),
            size: 1,
            urls: None,
            annotations: None,
            platform: None,
        }
    }

    const AMD64_V8_CONFIG: &str = r#"{
        "os": "linux", "architecture": "amd64", "variant": "v8",
        "rootfs": {"type": "layers", "diff_ids": []}
    }"#;

    #[test]
    fn test_reconcile_descriptor_platform_wins_over_config() {
        let store = MemoryStore::new();
        let mut descriptor = seed_leaf(&store, AMD64_V8_CONFIG);
        descriptor.platform = Some(Platform::new("linux", "arm64"));
        let member = MemberSpec::new("ghcr.io/org/app:tag");

        let platform = resolve_member_platform(&store, &descriptor, &member).unwrap();
        // descriptor os/arch wins; variant is merged from the config
        assert_eq!(platform.os, "linux");
        assert_eq!(platform.architecture, "arm64");
        assert_eq!(platform.variant, Some("v8".to_string()));
    }

    #[test]
    fn test_reconcile_falls_back_to_config() {
        let store = MemoryStore::new();
        let descriptor = seed_leaf(
            &store,
            r#"{"os": "linux", "architecture": "amd64",
                "rootfs": {"type": "layers", "diff_ids": []}}"#,
        );
        let member = MemberSpec::new("ghcr.io/org/app:tag");

        let platform = resolve_member_platform(&store, &descriptor, &member).unwrap();
        assert_eq!(platform.os, "linux");
        assert_eq!(platform.architecture, "amd64");
        assert_eq!(platform.variant, None);
    }

    #[test]
    fn test_reconcile_caller_platform_wins() {
        let store = MemoryStore::new();
        let mut descriptor = seed_leaf(&store, AMD64_V8_CONFIG);
        descriptor.platform = Some(Platform::new("linux", "amd64"));
        let member = MemberSpec {
            image: "ghcr.io/org/app:tag".to_string(),
            platform: Platform::new("linux", "arm64"),
        };

        let platform = resolve_member_platform(&store, &descriptor, &member).unwrap();
        assert_eq!(platform.architecture, "arm64");
        // additive merge still applies to fields the caller left empty
        assert_eq!(platform.variant, Some("v8".to_string()));
    }

    #[test]
    fn test_reconcile_rejects_invalid_combination() {
        let store = MemoryStore::new();
        let descriptor = seed_leaf(
            &store,
            r#"{"os": "linux", "architecture": "wasm",
                "rootfs": {"type": "layers", "diff_ids": []}}"#,
        );
        let member = MemberSpec::new("ghcr.io/org/app:tag");

        let err = resolve_member_platform(&store, &descriptor, &member).unwrap_err();
        match err {
            ImuxError::PlatformValidation { image, os, arch, .. } => {
                assert_eq!(image, "ghcr.io/org/app:tag");
                assert_eq!(os, "linux");
                assert_eq!(arch, "wasm");
            }
            other => panic!("expected platform validation error, got: {other}"),
        }
    }

    #[test]
    fn test_annotate_layer_sources_skips_foreign_layers() {
        let store = MemoryStore::new();
        let manifest = ImageManifest {
            schema_version: 2,
            media_type: Some(MEDIA_TYPE_OCI_MANIFEST.to_string()),
            config: Descriptor {
                media_type: "application/vnd.oci.image.config.v1+json".to_string(),
                digest: "sha256:cfg".to_string(),
                size: 2,
                urls: None,
                annotations: None,
                platform: None,
            },
            layers: vec![
                Descriptor {
                    media_type: "application/vnd.oci.image.layer.v1.tar+gzip".to_string(),
                    digest: "sha256:ordinary".to_string(),
                    size: 2,
                    urls: None,
                    annotations: None,
                    platform: None,
                },
                Descriptor {
                    media_type: "application/vnd.docker.image.rootfs.foreign.diff.tar.gzip"
                        .to_string(),
                    digest: "sha256:foreign".to_string(),
                    size: 2,
                    urls: None,
                    annotations: None,
                    platform: None,
                },
            ],
            annotations: None,
        };
        let bytes = serde_json::to_vec(&manifest).unwrap();
        store.put("sha256:man", bytes);
        let key = distribution_source_label("ghcr.io");
        store.set_label("sha256:man", &key, "org/app").unwrap();

        let descriptor = Descriptor {
            media_type: MEDIA_TYPE_OCI_MANIFEST.to_string(),
            digest: "sha256:man".to_string(),
            size: 1,
            urls: None,
            annotations: None,
            platform: None,
        };
        annotate_layer_sources(&store, &descriptor, "ghcr.io").unwrap();

        assert_eq!(
            store.label("sha256:ordinary", &key),
            Some("org/app".to_string())
        );
        assert_eq!(store.label("sha256:foreign", &key), None);
    }
}
