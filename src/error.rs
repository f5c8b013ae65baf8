use thiserror::Error;

use crate::events::{IdentityKey, MediaType};

/// Library error type for thumbnail slot operations.
#[derive(Debug, Error)]
pub enum Error {
    /// One or more configured library directories are invalid or unreadable.
    #[error("invalid library directory: {0}")]
    BadDir(String),

    /// The bitmap cache could not answer a lookup. Callers treat this as a miss.
    #[error("cache lookup failed: {0}")]
    CacheLookup(String),

    /// No source file is registered for the requested key.
    #[error("no source registered for {0}")]
    UnknownKey(IdentityKey),

    /// The source cannot produce a bitmap for this media type.
    #[error("unsupported media type {0}")]
    UnsupportedMedia(MediaType),

    /// The image bytes could not be decoded.
    #[error(transparent)]
    Decode(#[from] image::ImageError),

    /// A fetch worker panicked or was aborted.
    #[error("fetch worker failed: {0}")]
    Worker(String),

    /// Underlying IO error.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// YAML/serde configuration error.
    #[error(transparent)]
    Config(#[from] serde_yaml::Error),
}
