//! Platform records for image index entries.
//!
//! A platform is the 5-tuple (architecture, os, variant, os version,
//! os features) that identifies one slot in an image index. Two index
//! entries may never occupy the same slot.

use serde::{Deserialize, Serialize};

use crate::error::{ImuxError, Result};

/// Known os/arch combinations, following the Go toolchain port list.
const VALID_OS_ARCH: &[&str] = &[
    "darwin/386",
    "darwin/amd64",
    "darwin/arm",
    "darwin/arm64",
    "dragonfly/amd64",
    "freebsd/386",
    "freebsd/amd64",
    "freebsd/arm",
    "linux/386",
    "linux/amd64",
    "linux/arm",
    "linux/arm64",
    "linux/loong64",
    "linux/mips64",
    "linux/mips64le",
    "linux/ppc64",
    "linux/ppc64le",
    "linux/riscv64",
    "linux/s390x",
    "netbsd/386",
    "netbsd/amd64",
    "netbsd/arm",
    "openbsd/386",
    "openbsd/amd64",
    "openbsd/arm",
    "plan9/386",
    "plan9/amd64",
    "solaris/amd64",
    "windows/386",
    "windows/amd64",
    "windows/arm",
    "windows/arm64",
];

/// Known os/arch/variant combinations.
const VALID_OS_ARCH_VARIANT: &[&str] = &[
    "linux/arm/v5",
    "linux/arm/v6",
    "linux/arm/v7",
    "linux/arm64/v8",
];

/// Target platform for one manifest in an image index.
///
/// Field names follow the OCI image index wire format (`os.version`,
/// `os.features`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Platform {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub architecture: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub os: String,

    #[serde(
        rename = "os.version",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub os_version: Option<String>,

    #[serde(
        rename = "os.features",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub os_features: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
}

impl Platform {
    /// Create a platform from os and architecture strings.
    pub fn new(os: impl Into<String>, architecture: impl Into<String>) -> Self {
        Self {
            os: os.into(),
            architecture: architecture.into(),
            ..Default::default()
        }
    }

    /// Parse an `os/arch` or `os/arch/variant` string.
    pub fn parse(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split('/').collect();
        match parts.as_slice() {
            [os, arch] if !os.is_empty() && !arch.is_empty() => Ok(Self::new(*os, *arch)),
            [os, arch, variant] if !os.is_empty() && !arch.is_empty() && !variant.is_empty() => {
                Ok(Self {
                    os: os.to_string(),
                    architecture: arch.to_string(),
                    variant: Some(variant.to_string()),
                    ..Default::default()
                })
            }
            _ => Err(ImuxError::Other(format!(
                "invalid platform '{}': expected os/arch or os/arch/variant",
                s
            ))),
        }
    }

    /// True when neither os nor architecture has been set.
    pub fn is_unspecified(&self) -> bool {
        self.os.is_empty() && self.architecture.is_empty()
    }

    /// The platform slot signature: two index entries with equal
    /// signatures occupy the same slot.
    pub fn signature(&self) -> String {
        format!(
            "{}-{}-{}-{}-{}",
            self.architecture,
            self.os,
            self.variant.as_deref().unwrap_or(""),
            self.os_version.as_deref().unwrap_or(""),
            self.os_features
                .as_deref()
                .map(|f| f.join("."))
                .unwrap_or_default(),
        )
    }

    /// Fill variant, os version and os features from an image
    /// configuration when this platform does not carry them. Existing
    /// values are never overwritten.
    pub fn merge_config(
        &mut self,
        variant: Option<&str>,
        os_version: Option<&str>,
        os_features: Option<&[String]>,
    ) {
        if self.variant.is_none() {
            if let Some(v) = variant.filter(|v| !v.is_empty()) {
                self.variant = Some(v.to_string());
            }
        }
        if self.os_version.is_none() {
            if let Some(v) = os_version.filter(|v| !v.is_empty()) {
                self.os_version = Some(v.to_string());
            }
        }
        if self.os_features.is_none() {
            if let Some(f) = os_features.filter(|f| !f.is_empty()) {
                self.os_features = Some(f.to_vec());
            }
        }
    }

    /// Check the os/arch (and variant, when present) against the known
    /// combination table.
    pub fn is_valid(&self) -> bool {
        match self.variant.as_deref() {
            Some(variant) if !variant.is_empty() => {
                let key = format!("{}/{}/{}", self.os, self.architecture, variant);
                VALID_OS_ARCH_VARIANT.contains(&key.as_str())
            }
            _ => {
                let key = format!("{}/{}", self.os, self.architecture);
                VALID_OS_ARCH.contains(&key.as_str())
            }
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.os, self.architecture)?;
        if let Some(ref variant) = self.variant {
            write!(f, "/{}", variant)?;
        }
        Ok(())
    }
}
