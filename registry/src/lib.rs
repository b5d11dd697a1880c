//! imux Registry - image index assembly engine.
//!
//! Talks the registry's content-addressable protocol to resolve member
//! images, reconciles their platform records, assembles a
//! multi-architecture image index, and pushes it — requesting
//! cross-repository blob mounts so shared layers are never re-uploaded.
//!
//! One operation owns one [`MemoryStore`]; nothing persists between
//! operations, and every registry call is an explicit, cancellable
//! async boundary.

pub mod assemble;
pub mod cache;
pub mod credentials;
pub mod fetch;
pub mod host;
pub mod inspect;
pub mod push;
pub mod reference;
pub mod store;

// Re-export common types
pub use assemble::{assemble, AssembleOptions, ListEntry, ManifestList};
pub use cache::{inspect_cached, ImageCache, MemoryImageCache, DEFAULT_CACHE_TTL_SECS};
pub use credentials::{AuthConfig, CredentialHelper, Credentials, ExecCredentialHelper};
pub use fetch::fetch_descriptor;
pub use host::{HostCapabilities, HostOptions, RegistryHost};
pub use inspect::{inspect, ImageSummary};
pub use push::push_index;
pub use reference::ImageReference;
pub use store::{distribution_source_label, MemoryStore};

/// imux Registry version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
