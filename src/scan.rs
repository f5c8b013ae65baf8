//! Directory scanning for the image files a library exposes.

use std::path::{Path, PathBuf};

use walkdir::{DirEntry, WalkDir};

use crate::error::Error;

/// Options controlling directory scanning.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Whether to recurse into subdirectories.
    pub recursive: bool,
    /// Optional override for allowed extensions (lowercase, without dot).
    pub exts: Option<Vec<&'static str>>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            recursive: true,
            exts: None,
        }
    }
}

/// Return `true` if `path` has an allowed image extension.
#[must_use]
pub fn is_supported_image(path: &Path, exts: Option<&[&str]>) -> bool {
    let default_exts: &[&str] = &["jpg", "jpeg", "png", "gif", "webp"];
    let exts = exts.unwrap_or(default_exts);
    path.extension()
        .and_then(|s| s.to_str())
        .is_some_and(|ext| {
            let ext = ext.to_ascii_lowercase();
            exts.iter().any(|e| *e == ext)
        })
}

/// Collect image files under `root`, sorted so row ids are stable between runs.
///
/// # Errors
/// Returns [`Error::BadDir`] if `root` is missing or not a directory.
pub fn scan_library(root: &Path, opts: &ScanOptions) -> Result<Vec<PathBuf>, Error> {
    if !root.is_dir() {
        return Err(Error::BadDir(root.display().to_string()));
    }

    let mut wd = WalkDir::new(root).follow_links(true);
    if !opts.recursive {
        wd = wd.max_depth(1);
    }

    let mut out: Vec<PathBuf> = wd
        .into_iter()
        .filter_entry(|e| !is_hidden_dir(e))
        .flatten()
        .filter(|e| e.file_type().is_file())
        .map(DirEntry::into_path)
        .filter(|p| is_supported_image(p, opts.exts.as_deref()))
        .collect();
    out.sort();
    Ok(out)
}

fn is_hidden_dir(entry: &DirEntry) -> bool {
    // Never skip the root; tempfile roots can be dot-dirs.
    if entry.depth() == 0 || !entry.file_type().is_dir() {
        return false;
    }
    entry
        .file_name()
        .to_str()
        .is_some_and(|n| n.starts_with('.'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn finds_images_and_skips_hidden_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("nested")).unwrap();
        fs::create_dir_all(root.join(".cache")).unwrap();
        fs::write(root.join("b.JPG"), b"x").unwrap();
        fs::write(root.join("a.png"), b"x").unwrap();
        fs::write(root.join("notes.txt"), b"x").unwrap();
        fs::write(root.join("nested/c.webp"), b"x").unwrap();
        fs::write(root.join(".cache/d.jpg"), b"x").unwrap();

        let found = scan_library(root, &ScanOptions::default()).unwrap();
        let names: Vec<_> = found
            .iter()
            .map(|p| p.strip_prefix(root).unwrap().to_path_buf())
            .collect();
        assert_eq!(
            names,
            vec![
                PathBuf::from("a.png"),
                PathBuf::from("b.JPG"),
                PathBuf::from("nested/c.webp"),
            ]
        );

        let shallow = ScanOptions {
            recursive: false,
            ..ScanOptions::default()
        };
        assert_eq!(scan_library(root, &shallow).unwrap().len(), 2);
    }

    #[test]
    fn missing_root_is_rejected() {
        let err = scan_library(Path::new("/no/such/library"), &ScanOptions::default());
        assert!(matches!(err, Err(Error::BadDir(_))));
    }
}
