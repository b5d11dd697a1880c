//! Caller input model for an index push.
//!
//! Mirrors the YAML spec file format:
//!
//! ```yaml
//! image: registry.example.com/org/app:latest
//! tags: ["v1.0", "v1"]
//! manifests:
//!   - image: registry.example.com/org/app:amd64
//!     platform:
//!       architecture: amd64
//!       os: linux
//!   - image: registry.example.com/org/app:arm64
//!     platform:
//!       architecture: arm64
//!       os: linux
//!       variant: v8
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{ImuxError, Result};
use crate::platform::Platform;

/// One member image of an index push, with optional explicit platform
/// override fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemberSpec {
    /// Source image reference.
    pub image: String,

    /// Explicit platform; empty fields are filled from the registry.
    #[serde(default)]
    pub platform: Platform,
}

impl MemberSpec {
    /// A member with no explicit platform.
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            platform: Platform::default(),
        }
    }
}

/// A full index push request: target image, extra tags, member images.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexSpec {
    /// Target image reference the index is pushed to.
    pub image: String,

    /// Additional tags to push the index under.
    #[serde(default)]
    pub tags: Vec<String>,

    /// Member images, in the order their entries appear in the index.
    pub manifests: Vec<MemberSpec>,
}

impl IndexSpec {
    /// Parse a YAML spec document.
    pub fn from_yaml(data: &str) -> Result<Self> {
        let spec: IndexSpec = serde_yaml::from_str(data)?;
        if spec.image.is_empty() {
            return Err(ImuxError::Other(
                "spec file is missing the target 'image' field".to_string(),
            ));
        }
        if spec.manifests.is_empty() {
            return Err(ImuxError::Other(
                "spec file lists no member manifests".to_string(),
            ));
        }
        Ok(spec)
    }

    /// Build a spec from a target reference, a template containing the
    /// placeholders `OS`, `ARCH` and `VARIANT`, and a platform list.
    pub fn from_template(target: &str, template: &str, platforms: &[Platform]) -> Result<Self> {
        if platforms.is_empty() {
            return Err(ImuxError::Other("no platforms specified".to_string()));
        }
        let manifests = platforms
            .iter()
            .map(|p| {
                let image = template
                    .replace("OS", &p.os)
                    .replace("ARCH", &p.architecture)
                    .replace("VARIANT", p.variant.as_deref().unwrap_or(""));
                MemberSpec {
                    image,
                    platform: p.clone(),
                }
            })
            .collect();
        Ok(Self {
            image: target.to_string(),
            tags: Vec::new(),
            manifests,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_yaml() {
        let doc = r#"
image: registry.example.com/org/app:latest
tags: ["v1"]
manifests:
  - image: registry.example.com/org/app:amd64
    platform:
      architecture: amd64
      os: linux
  - image: registry.example.com/org/app:arm64
    platform:
      architecture: arm64
      os: linux
      variant: v8
"#;
        let spec = IndexSpec::from_yaml(doc).unwrap();
        assert_eq!(spec.image, "registry.example.com/org/app:latest");
        assert_eq!(spec.tags, vec!["v1"]);
        assert_eq!(spec.manifests.len(), 2);
        assert_eq!(spec.manifests[0].platform.architecture, "amd64");
        assert_eq!(spec.manifests[1].platform.variant, Some("v8".to_string()));
    }

    #[test]
    fn test_from_yaml_platform_optional() {
        let doc = r#"
image: registry.example.com/org/app:latest
manifests:
  - image: registry.example.com/org/app:amd64
"#;
        let spec = IndexSpec::from_yaml(doc).unwrap();
        assert!(spec.manifests[0].platform.is_unspecified());
        assert!(spec.tags.is_empty());
    }

    #[test]
    fn test_from_yaml_missing_image() {
        let doc = "manifests:\n  - image: a/b:c\n";
        assert!(IndexSpec::from_yaml(doc).is_err());
    }

    #[test]
    fn test_from_yaml_no_members() {
        let doc = "image: a/b:c\nmanifests: []\n";
        assert!(IndexSpec::from_yaml(doc).is_err());
    }

    #[test]
    fn test_from_template() {
        let platforms = vec![
            Platform::parse("linux/amd64").unwrap(),
            Platform::parse("linux/arm/v7").unwrap(),
        ];
        let spec = IndexSpec::from_template(
            "example.com/org/app:latest",
            "example.com/org/app:OS-ARCHVARIANT",
            &platforms,
        )
        .unwrap();
        assert_eq!(spec.manifests[0].image, "example.com/org/app:linux-amd64");
        assert_eq!(spec.manifests[1].image, "example.com/org/app:linux-armv7");
        assert_eq!(spec.manifests[1].platform.variant, Some("v7".to_string()));
    }

    #[test]
    fn test_from_template_empty_platforms() {
        assert!(IndexSpec::from_template("a/b:c", "a/b:ARCH", &[]).is_err());
    }
}
