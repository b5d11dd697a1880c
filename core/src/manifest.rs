//! Wire-level manifest model.
//!
//! Serde mappings for the two manifest families a registry can serve
//! (OCI and Docker schema 2), the content descriptors that tie them
//! together, and the media-type policy used when deciding which layer
//! blobs may be cross-repository mounted.
//!
//! Annotation maps are `BTreeMap` so repeated serialization of the same
//! index yields identical bytes (and therefore an identical digest).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::platform::Platform;

/// OCI image manifest media type.
pub const MEDIA_TYPE_OCI_MANIFEST: &str = "application/vnd.oci.image.manifest.v1+json";

/// OCI image index media type.
pub const MEDIA_TYPE_OCI_INDEX: &str = "application/vnd.oci.image.index.v1+json";

/// Docker schema 2 manifest media type.
pub const MEDIA_TYPE_DOCKER_MANIFEST: &str = "application/vnd.docker.distribution.manifest.v2+json";

/// Docker schema 2 manifest list media type.
pub const MEDIA_TYPE_DOCKER_LIST: &str =
    "application/vnd.docker.distribution.manifest.list.v2+json";

/// Annotation marking a manifest as attached supply-chain metadata
/// rather than a runnable platform image.
pub const ANNOTATION_REFERENCE_TYPE: &str = "vnd.docker.reference.type";

/// Annotation value identifying an attestation manifest.
pub const REFERENCE_TYPE_ATTESTATION: &str = "attestation-manifest";

/// Layer media types that are safe to cross-repository mount.
const DISTRIBUTABLE_LAYER_TYPES: &[&str] = &[
    "application/vnd.docker.image.rootfs.diff.tar.gzip",
    "application/vnd.oci.image.layer.v1.tar",
    "application/vnd.oci.image.layer.v1.tar+gzip",
    "application/vnd.oci.image.layer.v1.tar+zstd",
];

/// Layer media types that must never leave their origin registry.
const NON_DISTRIBUTABLE_LAYER_TYPES: &[&str] = &[
    "application/vnd.docker.image.rootfs.foreign.diff.tar.gzip",
    "application/vnd.oci.image.layer.nondistributable.v1.tar",
    "application/vnd.oci.image.layer.nondistributable.v1.tar+gzip",
    "application/vnd.oci.image.layer.nondistributable.v1.tar+zstd",
];

/// Config blob media types.
const CONFIG_TYPES: &[&str] = &[
    "application/vnd.oci.image.config.v1+json",
    "application/vnd.docker.container.image.v1+json",
];

/// Transfer classification of a blob referenced from a manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerClass {
    /// Ordinary layer or config content; may be mounted or copied.
    Distributable,
    /// Foreign/non-distributable layer; never transferred or marked.
    NonDistributable,
    /// A manifest media type; handled by the manifest push path.
    Manifest,
    /// Not in any known set; requires an explicit decision upstream.
    Unknown,
}

/// Classify a blob media type for cross-repo transfer purposes.
pub fn classify_layer(media_type: &str) -> LayerClass {
    if NON_DISTRIBUTABLE_LAYER_TYPES.contains(&media_type) {
        return LayerClass::NonDistributable;
    }
    if is_manifest_media_type(media_type) || is_index_media_type(media_type) {
        return LayerClass::Manifest;
    }
    if DISTRIBUTABLE_LAYER_TYPES.contains(&media_type) || CONFIG_TYPES.contains(&media_type) {
        return LayerClass::Distributable;
    }
    LayerClass::Unknown
}

/// True for a single-platform image manifest media type.
pub fn is_manifest_media_type(media_type: &str) -> bool {
    media_type == MEDIA_TYPE_OCI_MANIFEST || media_type == MEDIA_TYPE_DOCKER_MANIFEST
}

/// True for an image index / manifest list media type.
pub fn is_index_media_type(media_type: &str) -> bool {
    media_type == MEDIA_TYPE_OCI_INDEX || media_type == MEDIA_TYPE_DOCKER_LIST
}

/// Which wire form an assembled index is serialized to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ManifestKind {
    /// OCI image index (`application/vnd.oci.image.index.v1+json`)
    #[default]
    OciIndex,
    /// Docker schema 2 manifest list
    DockerList,
}

impl ManifestKind {
    /// The media type written into (and used to push) the index.
    pub fn media_type(&self) -> &'static str {
        match self {
            ManifestKind::OciIndex => MEDIA_TYPE_OCI_INDEX,
            ManifestKind::DockerList => MEDIA_TYPE_DOCKER_LIST,
        }
    }

    /// Parse a user-supplied kind name (`oci` or `docker`).
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "oci" | "oci-index" => Some(ManifestKind::OciIndex),
            "docker" | "v2.2" => Some(ManifestKind::DockerList),
            _ => None,
        }
    }
}

/// Content descriptor: a digest-addressed pointer to a blob or manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    pub media_type: String,

    pub digest: String,

    pub size: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub urls: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<BTreeMap<String, String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<Platform>,
}

impl Descriptor {
    /// True when this descriptor carries the attestation reference-type
    /// annotation.
    pub fn is_attestation(&self) -> bool {
        self.annotations
            .as_ref()
            .and_then(|a| a.get(ANNOTATION_REFERENCE_TYPE))
            .map(|v| v == REFERENCE_TYPE_ATTESTATION)
            .unwrap_or(false)
    }
}

/// Single-platform image manifest (OCI or Docker schema 2).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageManifest {
    pub schema_version: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,

    pub config: Descriptor,

    #[serde(default)]
    pub layers: Vec<Descriptor>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<BTreeMap<String, String>>,
}

/// Image index / manifest list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageIndex {
    pub schema_version: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,

    #[serde(default)]
    pub manifests: Vec<Descriptor>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<BTreeMap<String, String>>,
}

/// Determine the media type of a raw manifest body.
///
/// Registries are required to echo the manifest's own `mediaType`, but
/// older OCI images may omit the field; fall back to structural
/// detection (an index has `manifests`, a manifest has `config`).
pub fn sniff_media_type(body: &[u8]) -> Option<String> {
    #[derive(Deserialize)]
    struct Probe {
        #[serde(rename = "mediaType")]
        media_type: Option<String>,
        manifests: Option<serde_json::Value>,
        config: Option<serde_json::Value>,
    }

    let probe: Probe = serde_json::from_slice(body).ok()?;
    if let Some(mt) = probe.media_type {
        return Some(mt);
    }
    if probe.manifests.is_some() {
        return Some(MEDIA_TYPE_OCI_INDEX.to_string());
    }
    if probe.config.is_some() {
        return Some(MEDIA_TYPE_OCI_MANIFEST.to_string());
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(media_type: &str) -> Descriptor {
        Descriptor {
            media_type: media_type.to_string(),
            digest: "sha256:aaaa".to_string(),
            size: 2,
            urls: None,
            annotations: None,
            platform: None,
        }
    }

    #[test]
    fn test_classify_distributable_layers() {
        assert_eq!(
            classify_layer("application/vnd.docker.image.rootfs.diff.tar.gzip"),
            LayerClass::Distributable
        );
        assert_eq!(
            classify_layer("application/vnd.oci.image.layer.v1.tar+gzip"),
            LayerClass::Distributable
        );
        assert_eq!(
            classify_layer("application/vnd.oci.image.config.v1+json"),
            LayerClass::Distributable
        );
    }

    #[test]
    fn test_classify_foreign_layers() {
        assert_eq!(
            classify_layer("application/vnd.docker.image.rootfs.foreign.diff.tar.gzip"),
            LayerClass::NonDistributable
        );
        assert_eq!(
            classify_layer("application/vnd.oci.image.layer.nondistributable.v1.tar+gzip"),
            LayerClass::NonDistributable
        );
    }

    #[test]
    fn test_classify_manifest_types() {
        assert_eq!(classify_layer(MEDIA_TYPE_OCI_MANIFEST), LayerClass::Manifest);
        assert_eq!(classify_layer(MEDIA_TYPE_DOCKER_LIST), LayerClass::Manifest);
    }

    #[test]
    fn test_classify_unknown() {
        assert_eq!(
            classify_layer("application/vnd.example.custom.v1+json"),
            LayerClass::Unknown
        );
    }

    #[test]
    fn test_attestation_detection() {
        let mut d = descriptor(MEDIA_TYPE_OCI_MANIFEST);
        assert!(!d.is_attestation());

        let mut annotations = BTreeMap::new();
        annotations.insert(
            ANNOTATION_REFERENCE_TYPE.to_string(),
            REFERENCE_TYPE_ATTESTATION.to_string(),
        );
        d.annotations = Some(annotations);
        assert!(d.is_attestation());
    }

    #[test]
    fn test_attestation_requires_exact_value() {
        let mut annotations = BTreeMap::new();
        annotations.insert(
            ANNOTATION_REFERENCE_TYPE.to_string(),
            "sbom".to_string(),
        );
        let mut d = descriptor(MEDIA_TYPE_OCI_MANIFEST);
        d.annotations = Some(annotations);
        assert!(!d.is_attestation());
    }

    #[test]
    fn test_manifest_kind_media_types() {
        assert_eq!(ManifestKind::OciIndex.media_type(), MEDIA_TYPE_OCI_INDEX);
        assert_eq!(ManifestKind::DockerList.media_type(), MEDIA_TYPE_DOCKER_LIST);
    }

    #[test]
    fn test_manifest_kind_parse() {
        assert_eq!(ManifestKind::parse("oci"), Some(ManifestKind::OciIndex));
        assert_eq!(ManifestKind::parse("docker"), Some(ManifestKind::DockerList));
        assert_eq!(ManifestKind::parse("both"), None);
    }

    #[test]
    fn test_descriptor_wire_format() {
        let mut d = descriptor(MEDIA_TYPE_OCI_MANIFEST);
        d.platform = Some(Platform::new("linux", "amd64"));
        let json = serde_json::to_value(&d).unwrap();
        assert_eq!(json["mediaType"], MEDIA_TYPE_OCI_MANIFEST);
        assert_eq!(json["digest"], "sha256:aaaa");
        assert_eq!(json["platform"]["os"], "linux");
        assert!(json.get("urls").is_none());
        assert!(json.get("annotations").is_none());
    }

    #[test]
    fn test_index_round_trip() {
        let index = ImageIndex {
            schema_version: 2,
            media_type: Some(MEDIA_TYPE_OCI_INDEX.to_string()),
            manifests: vec![descriptor(MEDIA_TYPE_OCI_MANIFEST)],
            annotations: None,
        };
        let bytes = serde_json::to_vec(&index).unwrap();
        let parsed: ImageIndex = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(parsed, index);
        assert!(String::from_utf8(bytes).unwrap().contains("schemaVersion"));
    }

    #[test]
    fn test_serialization_is_stable() {
        let mut annotations = BTreeMap::new();
        annotations.insert("z".to_string(), "1".to_string());
        annotations.insert("a".to_string(), "2".to_string());
        let index = ImageIndex {
            schema_version: 2,
            media_type: Some(MEDIA_TYPE_OCI_INDEX.to_string()),
            manifests: vec![descriptor(MEDIA_TYPE_OCI_MANIFEST)],
            annotations: Some(annotations),
        };
        let first = serde_json::to_vec(&index).unwrap();
        let second = serde_json::to_vec(&index).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_parse_docker_manifest_body() {
        let body = format!(
            r#"{{"schemaVersion":2,"mediaType":"{}","config":{{"mediaType":"application/vnd.docker.container.image.v1+json","digest":"sha256:cfg","size":10}},"layers":[]}}"#,
            MEDIA_TYPE_DOCKER_MANIFEST
        );
        let manifest: ImageManifest = serde_json::from_str(&body).unwrap();
        assert_eq!(manifest.config.digest, "sha256:cfg");
        assert!(manifest.layers.is_empty());
    }

    #[test]
    fn test_sniff_media_type_from_field() {
        let body = format!(r#"{{"schemaVersion":2,"mediaType":"{}"}}"#, MEDIA_TYPE_DOCKER_LIST);
        assert_eq!(
            sniff_media_type(body.as_bytes()).as_deref(),
            Some(MEDIA_TYPE_DOCKER_LIST)
        );
    }

    #[test]
    fn test_sniff_media_type_structural() {
        let index = r#"{"schemaVersion":2,"manifests":[]}"#;
        assert_eq!(
            sniff_media_type(index.as_bytes()).as_deref(),
            Some(MEDIA_TYPE_OCI_INDEX)
        );
        let manifest = r#"{"schemaVersion":2,"config":{"mediaType":"x","digest":"sha256:c","size":1},"layers":[]}"#;
        assert_eq!(
            sniff_media_type(manifest.as_bytes()).as_deref(),
            Some(MEDIA_TYPE_OCI_MANIFEST)
        );
        assert_eq!(sniff_media_type(b"{}"), None);
        assert_eq!(sniff_media_type(b"not json"), None);
    }
}
