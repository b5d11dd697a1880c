use thiserror::Error;

/// imux error types
#[derive(Error, Debug)]
pub enum ImuxError {
    /// Image reference could not be parsed
    #[error("invalid image reference '{reference}': {message}")]
    ReferenceParse { reference: String, message: String },

    /// Credential resolution failed
    #[error("credential error: {0}")]
    Credential(String),

    /// Registry network or protocol error
    #[error("registry error: {registry} - {message}")]
    Registry { registry: String, message: String },

    /// Repository or tag does not exist at the registry
    #[error("repository or tag not found: {reference}")]
    NotFound { reference: String },

    /// Registry denied access
    #[error("access denied by registry: {registry}")]
    Unauthorized { registry: String },

    /// Media type is not a manifest or index type
    #[error("cannot include unknown media type '{media_type}' (digest {digest}) in an image index")]
    UnsupportedMediaType { media_type: String, digest: String },

    /// OS/architecture/variant combination is not a known platform
    #[error("manifest entry for image {image} has unsupported os/arch or os/arch/variant combination: {os}/{arch}/{variant}")]
    PlatformValidation {
        image: String,
        os: String,
        arch: String,
        variant: String,
    },

    /// Two manifests resolved to the same platform slot
    #[error("cannot include two manifests with the same platform; digest {existing} already provides platform {signature} (this digest: {conflicting})")]
    PlatformCollision {
        signature: String,
        existing: String,
        conflicting: String,
    },

    /// Every member was skipped; an empty index is never pushed
    #[error("all entries were skipped due to missing source image references; no image index to push")]
    EmptyIndex,

    /// Member image lives at a different registry than the target
    #[error("source image ({member}) registry does not match target image ({target}) registry")]
    RegistryMismatch { member: String, target: String },

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for ImuxError {
    fn from(err: serde_json::Error) -> Self {
        ImuxError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for ImuxError {
    fn from(err: serde_yaml::Error) -> Self {
        ImuxError::Serialization(err.to_string())
    }
}

/// Result type alias for imux operations
pub type Result<T> = std::result::Result<T, ImuxError>;
