//! imux Core - Foundational Types and Abstractions
//!
//! This module provides the foundational types used across the imux
//! workspace: the error taxonomy, platform records, the wire-level
//! manifest model, and the caller-facing input model for index pushes.

pub mod error;
pub mod input;
pub mod manifest;
pub mod platform;

// Re-export commonly used types
pub use error::{ImuxError, Result};
pub use input::{IndexSpec, MemberSpec};
pub use manifest::{Descriptor, ImageIndex, ImageManifest, LayerClass, ManifestKind};
pub use platform::Platform;

/// imux version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
