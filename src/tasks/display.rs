//! A visual slot that shows a placeholder until its image arrives.
//!
//! All methods run on the owning (render) thread. Loaders post their results
//! into the item's own queue from worker threads; [`DisplayItem::poll_completions`]
//! drains that queue on the owning thread, so the item itself needs no locks.

use crossbeam_channel::{Receiver, unbounded};
use tracing::{debug, trace, warn};

use crate::bitmap::Bitmap;
use crate::cache::BitmapCache;
use crate::canvas::{Canvas, ColorFilter, Paint, Rect};
use crate::events::{IdentityKey, LoadCompleted, LoadOutcome, MediaType};
use crate::processing::layout::{DrawTransform, cover_transform};
use crate::tasks::loader::{CompletionSender, Loader, LoaderFactory};

pub const PLACEHOLDER_COLOR: u32 = 0xFFCC_CCCC;
const DEBUG_TEXT_COLOR: u32 = 0xFFFF_0000;

/// Whether a compositor may treat the item as fully covering its bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opacity {
    Opaque,
    Translucent,
}

/// Presentation settings, usually taken from the configuration file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayOptions {
    /// ARGB fill painted while no image is loaded.
    pub placeholder_color: u32,
    pub alpha: u8,
    pub rotation_degrees: f32,
    /// Draw the active loader id over the slot.
    pub debug_overlay: bool,
}

impl Default for DisplayOptions {
    fn default() -> Self {
        Self {
            placeholder_color: PLACEHOLDER_COLOR,
            alpha: u8::MAX,
            rotation_degrees: 0.0,
            debug_overlay: false,
        }
    }
}

pub struct DisplayItem<C, F> {
    width: u32,
    height: u32,
    // Target size until the host lays the item out.
    bounds: Rect,
    image: Option<Bitmap>,
    transform: DrawTransform,
    rotation: f32,
    paint: Paint,
    placeholder: Paint,
    debug_overlay: bool,
    active: Option<Loader>,
    cache: C,
    loaders: F,
    completions_tx: CompletionSender,
    completions_rx: Receiver<LoadCompleted>,
    pending_redraw: bool,
}

impl<C: BitmapCache, F: LoaderFactory> DisplayItem<C, F> {
    /// # Panics
    /// If either target dimension is zero.
    pub fn new(width: u32, height: u32, cache: C, loaders: F) -> Self {
        assert!(
            width > 0 && height > 0,
            "display item target must be non-empty, got {width}x{height}"
        );
        let (completions_tx, completions_rx) = unbounded();
        Self {
            width,
            height,
            bounds: Rect::from_size(width, height),
            image: None,
            transform: DrawTransform::IDENTITY,
            rotation: 0.0,
            paint: Paint::default(),
            placeholder: Paint::fill(PLACEHOLDER_COLOR),
            debug_overlay: false,
            active: None,
            cache,
            loaders,
            completions_tx,
            completions_rx,
            pending_redraw: false,
        }
    }

    #[must_use]
    pub fn with_options(mut self, opts: DisplayOptions) -> Self {
        self.placeholder = Paint::fill(opts.placeholder_color);
        self.paint.alpha = opts.alpha;
        self.rotation = opts.rotation_degrees;
        self.debug_overlay = opts.debug_overlay;
        self
    }

    pub fn intrinsic_width(&self) -> u32 {
        self.width
    }

    pub fn intrinsic_height(&self) -> u32 {
        self.height
    }

    pub fn bounds(&self) -> Rect {
        self.bounds
    }

    pub fn image(&self) -> Option<&Bitmap> {
        self.image.as_ref()
    }

    pub fn draw_transform(&self) -> DrawTransform {
        self.transform
    }

    /// The loader whose result may still change this item, if any.
    pub fn active_loader(&self) -> Option<&Loader> {
        self.active.as_ref()
    }

    pub fn is_loading(&self) -> bool {
        self.active.is_some()
    }

    /// Point the item at a new image. A cache hit is installed before this
    /// returns; a miss clears the current image and starts a fresh loader.
    /// Any earlier loader is cancelled and its result will be ignored.
    pub fn set_target(&mut self, media_type: impl Into<MediaType>, content_hash: i32, row_id: i64) {
        let key = IdentityKey::new(media_type, content_hash, row_id);
        if let Some(previous) = self.active.take() {
            previous.cancel();
        }

        let cached = match self.cache.lookup(content_hash, row_id) {
            Ok(hit) => hit,
            Err(err) => {
                debug!(%key, error = %err, "cache lookup failed, treating as miss");
                None
            }
        };

        match cached {
            Some(bitmap) => {
                debug!(%key, "cache hit");
                self.set_image(Some(bitmap));
            }
            None => {
                self.set_image(None);
                let loader = self.loaders.create_loader(self.completions_tx.clone());
                debug!(%key, loader = loader.id(), "cache miss, loading");
                self.active = Some(loader.clone());
                loader.start(key);
            }
        }
        self.invalidate();
    }

    /// Apply every completion queued since the last call. Never blocks.
    /// Returns how many completions were processed.
    pub fn poll_completions(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(completed) = self.completions_rx.try_recv() {
            self.on_load_complete(completed);
            handled += 1;
        }
        handled
    }

    /// Completion callback. Results from anything but the active loader are
    /// dropped silently.
    pub fn on_load_complete(&mut self, completed: LoadCompleted) {
        let LoadCompleted { loader, outcome } = completed;
        let is_current = self.active.as_ref().is_some_and(|active| active.is(&loader));
        if !is_current {
            trace!(loader = loader.id(), "superseded result discarded");
            return;
        }
        self.active = None;

        match outcome {
            LoadOutcome::Loaded(bitmap) => {
                debug!(loader = loader.id(), size = ?bitmap.dimensions(), "image ready");
                self.set_image(Some(bitmap));
            }
            LoadOutcome::Failed(err) => {
                warn!(loader = loader.id(), key = ?loader.key(), error = %err, "load failed, showing placeholder");
            }
            LoadOutcome::Cancelled => {
                debug!(loader = loader.id(), "load cancelled by transport");
            }
        }
        self.invalidate();
    }

    pub fn on_bounds_changed(&mut self, bounds: Rect) {
        self.bounds = bounds;
        self.update_transform();
    }

    /// Paint the current state. Reads only.
    pub fn render<K: Canvas + ?Sized>(&self, canvas: &mut K) {
        let bounds = self.bounds;
        let (cx, cy) = bounds.center();
        match &self.image {
            Some(bitmap) => {
                canvas.save();
                canvas.clip_rect(bounds);
                canvas.concat(&self.transform);
                if self.rotation != 0.0 {
                    canvas.rotate(self.rotation, cx, cy);
                }
                canvas.draw_bitmap(bitmap, 0.0, 0.0, &self.paint);
                canvas.restore();
            }
            None => canvas.draw_rect(bounds, &self.placeholder),
        }

        if self.debug_overlay {
            let label = self
                .active
                .as_ref()
                .map_or_else(|| "-1".to_owned(), |loader| loader.id().to_string());
            canvas.draw_text(&label, cx, cy, &Paint::fill(DEBUG_TEXT_COLOR));
        }
    }

    pub fn opacity(&self) -> Opacity {
        match &self.image {
            Some(bitmap) if !bitmap.has_alpha() && self.paint.alpha == u8::MAX => Opacity::Opaque,
            _ => Opacity::Translucent,
        }
    }

    pub fn alpha(&self) -> u8 {
        self.paint.alpha
    }

    pub fn set_alpha(&mut self, alpha: u8) {
        if alpha != self.paint.alpha {
            self.paint.alpha = alpha;
            self.invalidate();
        }
    }

    pub fn set_color_filter(&mut self, filter: Option<ColorFilter>) {
        self.paint.color_filter = filter;
        self.invalidate();
    }

    pub fn rotation(&self) -> f32 {
        self.rotation
    }

    pub fn set_rotation(&mut self, degrees: f32) {
        if degrees != self.rotation {
            self.rotation = degrees;
            self.invalidate();
        }
    }

    pub fn set_debug_overlay(&mut self, enabled: bool) {
        if enabled != self.debug_overlay {
            self.debug_overlay = enabled;
            self.invalidate();
        }
    }

    /// Returns whether a redraw was requested since the last call, and clears it.
    pub fn take_redraw_request(&mut self) -> bool {
        std::mem::take(&mut self.pending_redraw)
    }

    fn set_image(&mut self, image: Option<Bitmap>) {
        let unchanged = match (&self.image, &image) {
            (Some(current), Some(next)) => current.ptr_eq(next),
            (None, None) => true,
            _ => false,
        };
        if !unchanged {
            self.image = image;
            self.update_transform();
        }
    }

    fn update_transform(&mut self) {
        self.transform = match &self.image {
            Some(bitmap) => cover_transform(bitmap.width(), bitmap.height(), self.bounds),
            None => DrawTransform::IDENTITY,
        };
        self.invalidate();
    }

    fn invalidate(&mut self) {
        self.pending_redraw = true;
    }
}

impl<C, F> std::fmt::Debug for DisplayItem<C, F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DisplayItem")
            .field("target", &(self.width, self.height))
            .field("bounds", &self.bounds)
            .field("image", &self.image)
            .field("transform", &self.transform)
            .field("active", &self.active)
            .finish_non_exhaustive()
    }
}
