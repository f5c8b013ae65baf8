use std::fmt;

use crate::bitmap::Bitmap;
use crate::error::Error;
use crate::tasks::loader::Loader;

/// Kind of media a row refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaType {
    Image,
    Video,
    Other(i32),
}

impl From<i32> for MediaType {
    fn from(code: i32) -> Self {
        match code {
            1 => Self::Image,
            3 => Self::Video,
            other => Self::Other(other),
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Image => f.write_str("image"),
            Self::Video => f.write_str("video"),
            Self::Other(code) => write!(f, "media#{code}"),
        }
    }
}

/// Names one loadable image within one source.
///
/// Not unique across sources; cache lookups are scoped by whoever owns the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IdentityKey {
    pub media_type: MediaType,
    pub content_hash: i32,
    pub row_id: i64,
}

impl IdentityKey {
    pub fn new(media_type: impl Into<MediaType>, content_hash: i32, row_id: i64) -> Self {
        Self {
            media_type: media_type.into(),
            content_hash,
            row_id,
        }
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.media_type, self.content_hash, self.row_id)
    }
}

/// What a transport produced for one fetch.
#[derive(Debug)]
pub enum LoadOutcome {
    Loaded(Bitmap),
    Failed(Error),
    Cancelled,
}

/// Posted to the owning thread once a loader settles.
#[derive(Debug)]
pub struct LoadCompleted {
    pub loader: Loader,
    pub outcome: LoadOutcome,
}
