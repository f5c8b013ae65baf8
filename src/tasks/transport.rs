//! Asynchronous fetch transports.
//!
//! A transport receives an identity key plus a one-shot [`FetchCompletion`]
//! and must return immediately; the actual work happens elsewhere.

use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::fs::File;
use std::hash::{Hash, Hasher};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use image::RgbaImage;
use image::imageops::{flip_horizontal, flip_vertical, rotate90, rotate180, rotate270};
use tokio::runtime::Handle;
use tokio::select;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::bitmap::Bitmap;
use crate::cache::MemoryCache;
use crate::error::Error;
use crate::events::{IdentityKey, LoadOutcome, MediaType};
use crate::processing::layout::fit_within;
use crate::tasks::loader::FetchCompletion;

pub trait Transport: Send + Sync {
    /// Start fetching `key`. Must not block. `done` is completed at most once,
    /// or dropped if the transport is torn down first.
    fn fetch(&self, key: IdentityKey, done: FetchCompletion);
}

/// Blocking producer of decoded bitmaps, run on a worker thread.
pub trait Source: Send + Sync + 'static {
    fn decode(&self, key: IdentityKey) -> Result<Bitmap, Error>;
}

impl<F> Source for F
where
    F: Fn(IdentityKey) -> Result<Bitmap, Error> + Send + Sync + 'static,
{
    fn decode(&self, key: IdentityKey) -> Result<Bitmap, Error> {
        self(key)
    }
}

/// Runs fetches on a tokio runtime with bounded decode concurrency.
///
/// Successful decodes are written through to the optional cache, including
/// results of loads that were superseded in the meantime. Without a cache,
/// loads cancelled while queued for a permit are never decoded.
pub struct TokioTransport<S> {
    runtime: Handle,
    source: Arc<S>,
    permits: Arc<Semaphore>,
    cache: Option<Arc<MemoryCache>>,
    cancel: CancellationToken,
}

impl<S: Source> TokioTransport<S> {
    pub fn new(runtime: Handle, source: S, max_in_flight: usize, cancel: CancellationToken) -> Self {
        Self {
            runtime,
            source: Arc::new(source),
            permits: Arc::new(Semaphore::new(max_in_flight.max(1))),
            cache: None,
            cancel,
        }
    }

    #[must_use]
    pub fn with_cache(mut self, cache: Arc<MemoryCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Tear down: queued and in-flight fetches are dropped without completing.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

impl<S: Source> Transport for TokioTransport<S> {
    fn fetch(&self, key: IdentityKey, done: FetchCompletion) {
        if self.cancel.is_cancelled() {
            debug!(%key, "transport shut down, fetch dropped");
            return;
        }
        let source = self.source.clone();
        let permits = self.permits.clone();
        let cache = self.cache.clone();
        let cancel = self.cancel.clone();

        self.runtime.spawn(async move {
            let _permit = select! {
                _ = cancel.cancelled() => return,
                permit = permits.acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => return,
                },
            };

            // Without a cache to warm, a superseded load has no consumer left.
            if cache.is_none() && done.is_cancelled() {
                debug!(%key, loader = done.loader_id(), "skipping decode for cancelled load");
                return;
            }

            let decode = tokio::task::spawn_blocking(move || source.decode(key));
            let joined = select! {
                _ = cancel.cancelled() => return,
                res = decode => res,
            };

            let outcome = match joined {
                Ok(Ok(bitmap)) => {
                    if let Some(cache) = &cache
                        && let Err(err) = cache.insert(key.content_hash, key.row_id, bitmap.clone())
                    {
                        warn!(%key, error = %err, "cache write-through failed");
                    }
                    debug!(%key, loader = done.loader_id(), "fetched");
                    LoadOutcome::Loaded(bitmap)
                }
                Ok(Err(err)) => {
                    debug!(%key, error = %err, "fetch failed");
                    LoadOutcome::Failed(err)
                }
                Err(join) => LoadOutcome::Failed(Error::Worker(join.to_string())),
            };
            done.complete(outcome);
        });
    }
}

/// Keeps every request until the host resolves it by hand.
#[derive(Debug, Default)]
pub struct ManualTransport {
    pending: Mutex<Vec<(IdentityKey, FetchCompletion)>>,
}

impl ManualTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain the outstanding requests in arrival order.
    pub fn take_pending(&self) -> Vec<(IdentityKey, FetchCompletion)> {
        std::mem::take(&mut *self.pending.lock().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn pending_len(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Transport for ManualTransport {
    fn fetch(&self, key: IdentityKey, done: FetchCompletion) {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((key, done));
    }
}

/// Decodes image files registered under `(content_hash, row_id)`.
#[derive(Debug, Clone, Default)]
pub struct ImageFileSource {
    files: HashMap<(i32, i64), PathBuf>,
    max_dim: Option<u32>,
}

impl ImageFileSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `paths` in order, using the position as row id and a hash
    /// of the path as content hash. Returns the keys in the same order.
    pub fn from_paths(paths: impl IntoIterator<Item = PathBuf>) -> (Self, Vec<IdentityKey>) {
        let mut source = Self::new();
        let mut keys = Vec::new();
        for (row_id, path) in paths.into_iter().enumerate() {
            let key = IdentityKey::new(MediaType::Image, path_hash(&path), row_id as i64);
            source.insert(key.content_hash, key.row_id, path);
            keys.push(key);
        }
        (source, keys)
    }

    /// Downscale decoded images so neither side exceeds `max_dim`.
    #[must_use]
    pub fn with_max_dim(mut self, max_dim: Option<u32>) -> Self {
        self.max_dim = max_dim;
        self
    }

    pub fn insert(&mut self, content_hash: i32, row_id: i64, path: PathBuf) {
        self.files.insert((content_hash, row_id), path);
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl Source for ImageFileSource {
    fn decode(&self, key: IdentityKey) -> Result<Bitmap, Error> {
        if key.media_type != MediaType::Image {
            return Err(Error::UnsupportedMedia(key.media_type));
        }
        let path = self
            .files
            .get(&(key.content_hash, key.row_id))
            .ok_or(Error::UnknownKey(key))?;
        let mut img = decode_rgba8_apply_exif(path)?;
        if let Some(max_dim) = self.max_dim {
            let (w, h) = img.dimensions();
            let (tw, th) = fit_within(w, h, max_dim);
            if (tw, th) != (w, h) {
                img = image::imageops::thumbnail(&img, tw, th);
            }
        }
        Ok(Bitmap::from_rgba(img))
    }
}

fn path_hash(path: &Path) -> i32 {
    let mut hasher = DefaultHasher::new();
    path.hash(&mut hasher);
    hasher.finish() as i32
}

// Decodes to RGBA8 and applies EXIF orientation when present. Missing or
// unreadable metadata keeps the stored orientation.
fn decode_rgba8_apply_exif(path: &Path) -> Result<RgbaImage, Error> {
    let img = image::ImageReader::open(path)?
        .with_guessed_format()?
        .decode()?;
    let img = img.to_rgba8();

    let img = match read_orientation(path).unwrap_or(1) {
        2 => flip_horizontal(&img),
        3 => rotate180(&img),
        4 => flip_vertical(&img),
        // transpose
        5 => flip_horizontal(&rotate90(&img)),
        6 => rotate90(&img),
        // transverse
        7 => flip_horizontal(&rotate270(&img)),
        8 => rotate270(&img),
        _ => img,
    };
    Ok(img)
}

fn read_orientation(path: &Path) -> Option<u16> {
    let file = File::open(path).ok()?;
    let mut buf = BufReader::new(file);
    let exif = exif::Reader::new().read_from_container(&mut buf).ok()?;
    let field = exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY)?;
    let orientation = field.value.get_uint(0)? as u16;
    debug!(orientation, path = %path.display(), "exif orientation");
    Some(orientation)
}
