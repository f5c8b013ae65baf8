//! Binary entrypoint for the thumbnail slot demo.
//!
//! Targets one slot per library image, pumps completions on the main thread
//! and reports how the slots settled. All logic lives in the library crate.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use tokio_util::sync::CancellationToken;
use tracing::{Level, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use rust_thumb_slot::cache::{BitmapCache, MemoryCache};
use rust_thumb_slot::canvas::{RecordingCanvas, Rect};
use rust_thumb_slot::config::Configuration;
use rust_thumb_slot::scan::{ScanOptions, scan_library};
use rust_thumb_slot::tasks::display::DisplayItem;
use rust_thumb_slot::tasks::loader::TransportLoaderFactory;
use rust_thumb_slot::tasks::transport::{ImageFileSource, TokioTransport};

const PUMP_INTERVAL: Duration = Duration::from_millis(10);

/// Simple CLI
#[derive(Debug, Parser)]
#[command(name = "thumb-slot", about = "Load a photo library into placeholder slots")]
struct Cli {
    /// Path to YAML config file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override the library directory from the config
    #[arg(long, value_name = "DIR")]
    library: Option<PathBuf>,

    /// Give up waiting for outstanding loads after this long (ms)
    #[arg(long, value_name = "MILLIS", default_value_t = 10_000)]
    deadline_ms: u64,

    /// Increase log verbosity (repeatable)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbosity: u8) -> Result<()> {
    // map -v to log level
    let level = match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let filter =
        EnvFilter::from_default_env().add_directive(format!("rust_thumb_slot={level}").parse()?);
    fmt().with_env_filter(filter).with_target(true).init();
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose)?;

    let mut cfg = match &cli.config {
        Some(path) => Configuration::from_yaml_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => Configuration::default(),
    };
    if let Some(library) = cli.library {
        cfg.library_path = library;
    }
    let cfg = cfg.validated().context("validating configuration")?;

    let photos = scan_library(&cfg.library_path, &ScanOptions::default())
        .with_context(|| format!("scanning {}", cfg.library_path.display()))?;
    info!(count = photos.len(), "scanned images");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("starting fetch runtime")?;
    let cancel = CancellationToken::new();
    let cache = Arc::new(MemoryCache::new(cfg.cache_capacity));
    let (source, keys) = ImageFileSource::from_paths(photos);
    let transport = TokioTransport::new(
        runtime.handle().clone(),
        source.with_max_dim(cfg.thumbnail_max_dim),
        cfg.loader_max_concurrent_decodes,
        cancel.clone(),
    )
    .with_cache(cache.clone());
    let factory = TransportLoaderFactory::new(Arc::new(transport));

    let bounds = Rect::from_size(cfg.tile_width, cfg.tile_height);
    let mut slots: Vec<_> = keys
        .iter()
        .map(|key| {
            let cache = cache.clone();
            let lookup = move |hash: i32, row: i64| cache.lookup(hash, row);
            let mut slot = DisplayItem::new(cfg.tile_width, cfg.tile_height, lookup, factory.clone())
                .with_options(cfg.display_options());
            slot.on_bounds_changed(bounds);
            slot.set_target(key.media_type, key.content_hash, key.row_id);
            slot
        })
        .collect();

    // This thread owns every slot: completions are applied only here.
    let deadline = Instant::now() + Duration::from_millis(cli.deadline_ms);
    while slots.iter().any(|s| s.is_loading()) && Instant::now() < deadline {
        for slot in &mut slots {
            slot.poll_completions();
        }
        std::thread::sleep(PUMP_INTERVAL);
    }

    let mut canvas = RecordingCanvas::new();
    let (mut shown, mut placeholders) = (0usize, 0usize);
    for slot in &mut slots {
        slot.poll_completions();
        canvas.clear();
        slot.render(&mut canvas);
        if canvas.bitmaps().next().is_some() {
            shown += 1;
        } else {
            placeholders += 1;
        }
    }
    let pending = slots.iter().filter(|s| s.is_loading()).count();
    if pending > 0 {
        warn!(pending, "deadline passed with loads outstanding");
    }
    info!(
        shown,
        placeholders,
        cached = cache.len(),
        capacity = cache.capacity(),
        "slots settled"
    );

    // Re-targeting the same keys should now be served synchronously.
    let mut hits = 0usize;
    for (slot, key) in slots.iter_mut().zip(&keys) {
        slot.set_target(key.media_type, key.content_hash, key.row_id);
        if !slot.is_loading() {
            hits += 1;
        }
    }
    info!(hits, total = keys.len(), "second pass served from cache");

    cancel.cancel();
    runtime.shutdown_timeout(Duration::from_secs(1));
    Ok(())
}
