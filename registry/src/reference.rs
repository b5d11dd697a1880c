//! Image reference parsing.
//!
//! Parses image references like `registry.example.com/org/app:v1.2` into
//! structured components, applying the registry default-domain and
//! default-tag normalization rules so two spellings of the same
//! repository compare equal.

use imux_core::error::{ImuxError, Result};

/// Default registry when none is specified.
const DEFAULT_REGISTRY: &str = "docker.io";

/// Default tag when none is specified.
const DEFAULT_TAG: &str = "latest";

/// Hostname actually serving the default registry's API.
const DEFAULT_REGISTRY_API_HOST: &str = "registry-1.docker.io";

/// Hostname under which credential files store default-registry logins.
const LEGACY_DEFAULT_HOSTNAME: &str = "index.docker.io";

/// Parsed image reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    /// Registry hostname (e.g., "ghcr.io", "docker.io")
    pub registry: String,
    /// Repository path (e.g., "library/nginx", "org/app")
    pub repository: String,
    /// Tag (e.g., "latest", "v0.1.0")
    pub tag: Option<String>,
    /// Digest (e.g., "sha256:abc123...")
    pub digest: Option<String>,
}

impl ImageReference {
    /// Parse an image reference string.
    ///
    /// Supports formats:
    /// - `nginx` → docker.io/library/nginx:latest
    /// - `nginx:1.25` → docker.io/library/nginx:1.25
    /// - `myuser/myimage` → docker.io/myuser/myimage:latest
    /// - `ghcr.io/org/image:tag` → ghcr.io/org/image:tag
    /// - `ghcr.io/org/image@sha256:abc...` → ghcr.io/org/image@sha256:abc...
    pub fn parse(reference: &str) -> Result<Self> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(ImuxError::ReferenceParse {
                reference: reference.to_string(),
                message: "empty image reference".to_string(),
            });
        }

        // Split off digest first (@ separator)
        let (name_tag, digest) = if let Some(at_pos) = reference.rfind('@') {
            let digest_part = &reference[at_pos + 1..];
            if !digest_part.contains(':') {
                return Err(ImuxError::ReferenceParse {
                    reference: reference.to_string(),
                    message: "invalid digest: expected algorithm:hex".to_string(),
                });
            }
            (&reference[..at_pos], Some(digest_part.to_string()))
        } else {
            (reference, None)
        };

        // Split tag (: separator, but only after the last /)
        let (name, tag) = if let Some(slash_pos) = name_tag.rfind('/') {
            let after_slash = &name_tag[slash_pos + 1..];
            if let Some(colon_pos) = after_slash.rfind(':') {
                let tag = &after_slash[colon_pos + 1..];
                let name = &name_tag[..slash_pos + 1 + colon_pos];
                (name.to_string(), Some(tag.to_string()))
            } else {
                (name_tag.to_string(), None)
            }
        } else if let Some(colon_pos) = name_tag.rfind(':') {
            // Could be registry:port or name:tag — a numeric suffix is a port
            let after_colon = &name_tag[colon_pos + 1..];
            if after_colon.chars().all(|c| c.is_ascii_digit()) {
                (name_tag.to_string(), None)
            } else {
                (name_tag[..colon_pos].to_string(), Some(after_colon.to_string()))
            }
        } else {
            (name_tag.to_string(), None)
        };

        let (registry, repository) = Self::split_registry_repository(&name)?;

        // Apply default tag if no tag and no digest
        let tag = if tag.is_none() && digest.is_none() {
            Some(DEFAULT_TAG.to_string())
        } else {
            tag
        };

        Ok(ImageReference {
            registry,
            repository,
            tag,
            digest,
        })
    }

    /// Split a name into registry and repository components.
    fn split_registry_repository(name: &str) -> Result<(String, String)> {
        // The first component is a registry hostname when it contains a
        // dot or colon, or is "localhost"
        if let Some(slash_pos) = name.find('/') {
            let first = &name[..slash_pos];
            if first.contains('.') || first.contains(':') || first == "localhost" {
                let registry = first.to_string();
                let repo = name[slash_pos + 1..].to_string();
                if repo.is_empty() {
                    return Err(ImuxError::ReferenceParse {
                        reference: name.to_string(),
                        message: "empty repository".to_string(),
                    });
                }
                return Ok((registry, repo));
            }
        }

        if name.is_empty() {
            return Err(ImuxError::ReferenceParse {
                reference: name.to_string(),
                message: "empty repository".to_string(),
            });
        }

        // No registry detected — use default
        let repository = if name.contains('/') {
            name.to_string()
        } else {
            // Single name like "nginx" → "library/nginx" on the default registry
            format!("library/{}", name)
        };

        Ok((DEFAULT_REGISTRY.to_string(), repository))
    }

    /// Hostname to connect to. The default registry's conventional name
    /// is remapped to its API endpoint.
    pub fn api_host(&self) -> &str {
        if self.registry == DEFAULT_REGISTRY {
            DEFAULT_REGISTRY_API_HOST
        } else {
            &self.registry
        }
    }

    /// Hostname under which credential files key this registry's stored
    /// login. The default registry uses its legacy canonical hostname.
    pub fn credential_host(&self) -> &str {
        if self.registry.ends_with("docker.io") {
            LEGACY_DEFAULT_HOSTNAME
        } else {
            &self.registry
        }
    }

    /// True when both references point at the same registry domain.
    pub fn same_registry(&self, other: &ImageReference) -> bool {
        self.registry == other.registry
    }

    /// True when both references point at the same repository path.
    pub fn same_repository(&self, other: &ImageReference) -> bool {
        self.repository == other.repository
    }

    /// The tag or, for digest-only references, the digest.
    pub fn identifier(&self) -> &str {
        if let Some(ref tag) = self.tag {
            tag
        } else if let Some(ref digest) = self.digest {
            digest
        } else {
            DEFAULT_TAG
        }
    }

    /// Convert to the wire client's reference type, connecting via the
    /// API hostname.
    pub fn to_oci(&self) -> oci_distribution::Reference {
        if let Some(ref digest) = self.digest {
            oci_distribution::Reference::with_digest(
                self.api_host().to_string(),
                self.repository.clone(),
                digest.clone(),
            )
        } else {
            oci_distribution::Reference::with_tag(
                self.api_host().to_string(),
                self.repository.clone(),
                self.tag.clone().unwrap_or_else(|| DEFAULT_TAG.to_string()),
            )
        }
    }

    /// The same repository addressed by a specific digest.
    pub fn oci_with_digest(&self, digest: &str) -> oci_distribution::Reference {
        oci_distribution::Reference::with_digest(
            self.api_host().to_string(),
            self.repository.clone(),
            digest.to_string(),
        )
    }

    /// The same repository addressed by a specific tag.
    pub fn oci_with_tag(&self, tag: &str) -> oci_distribution::Reference {
        oci_distribution::Reference::with_tag(
            self.api_host().to_string(),
            self.repository.clone(),
            tag.to_string(),
        )
    }

    /// Get the full normalized reference string.
    pub fn full_reference(&self) -> String {
        let mut s = format!("{}/{}", self.registry, self.repository);
        if let Some(ref tag) = self.tag {
            s.push(':');
            s.push_str(tag);
        }
        if let Some(ref digest) = self.digest {
            s.push('@');
            s.push_str(digest);
        }
        s
    }
}

impl std::fmt::Display for ImageReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.full_reference())
    }
}
