use std::path::{Path, PathBuf};

use anyhow::{Context, Result, ensure};
use serde::Deserialize;

use crate::tasks::display::DisplayOptions;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Configuration {
    /// Root directory scanned for images by the demo binary.
    pub library_path: PathBuf,
    /// Target slot width in pixels.
    pub tile_width: u32,
    /// Target slot height in pixels.
    pub tile_height: u32,
    /// RGB fill shown while a slot has no image.
    pub placeholder_color: [u8; 3],
    /// Paint opacity for loaded images.
    pub alpha: u8,
    /// Rotation applied about the slot centre, in degrees.
    pub rotation_degrees: f32,
    /// Overlay each slot with the id of its active loader.
    pub debug_overlay: bool,
    /// Maximum number of concurrent image decodes in the transport.
    pub loader_max_concurrent_decodes: usize,
    /// Number of decoded bitmaps kept in memory.
    pub cache_capacity: usize,
    /// Downscale decoded images so neither side exceeds this.
    pub thumbnail_max_dim: Option<u32>,
}

impl Configuration {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let s = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Ok(serde_yaml::from_str(&s)?)
    }

    /// Validate runtime invariants that cannot be expressed via serde defaults alone.
    pub fn validated(self) -> Result<Self> {
        ensure!(
            self.tile_width > 0 && self.tile_height > 0,
            "tile-width and tile-height must be greater than zero"
        );
        ensure!(
            self.loader_max_concurrent_decodes > 0,
            "loader-max-concurrent-decodes must be greater than zero"
        );
        ensure!(
            self.cache_capacity > 0,
            "cache-capacity must be greater than zero"
        );
        if let Some(max_dim) = self.thumbnail_max_dim {
            ensure!(max_dim > 0, "thumbnail-max-dim must be greater than zero");
        }
        ensure!(
            self.rotation_degrees.is_finite(),
            "rotation-degrees must be a finite number"
        );
        Ok(self)
    }

    pub fn display_options(&self) -> DisplayOptions {
        let [r, g, b] = self.placeholder_color;
        DisplayOptions {
            placeholder_color: 0xFF00_0000 | (u32::from(r) << 16) | (u32::from(g) << 8) | u32::from(b),
            alpha: self.alpha,
            rotation_degrees: self.rotation_degrees,
            debug_overlay: self.debug_overlay,
        }
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            library_path: PathBuf::new(),
            tile_width: 160,
            tile_height: 160,
            placeholder_color: [0xCC, 0xCC, 0xCC],
            alpha: u8::MAX,
            rotation_degrees: 0.0,
            debug_overlay: false,
            loader_max_concurrent_decodes: 4,
            cache_capacity: 256,
            thumbnail_max_dim: None,
        }
    }
}
