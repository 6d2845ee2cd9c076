//! File system helpers: directory listing, temporary outputs and image IO.

use std::fs;
use std::path::{Path, PathBuf};

use image::RgbImage;

use crate::error::{DefisheyeError, Result};

/// File extensions treated as video containers.
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "avi", "mkv", "webm", "m4v"];

/// List the regular, non-hidden files of a directory in name order.
pub fn list_directory(directory: &Path) -> Result<Vec<PathBuf>> {
    if !directory.is_dir() {
        return Err(DefisheyeError::NoSuchDirectory(directory.to_path_buf()));
    }

    let mut files = Vec::new();
    for entry in fs::read_dir(directory)? {
        let entry = entry?;
        let path = entry.path();
        let hidden = path
            .file_name()
            .map(|name| name.to_string_lossy().starts_with('.'))
            .unwrap_or(true);
        if hidden || !entry.file_type()?.is_file() {
            continue;
        }
        files.push(path);
    }

    files.sort();
    Ok(files)
}

/// Create an empty file in the temp directory that outlives the process.
pub fn create_temporary_file(prefix: &str, suffix: &str) -> Result<PathBuf> {
    let file = tempfile::Builder::new()
        .prefix(prefix)
        .suffix(suffix)
        .tempfile()?;
    let (_, path) = file.keep().map_err(|e| DefisheyeError::Io(e.error))?;
    Ok(path)
}

/// Create an output path inside `directory` named after `source`.
pub fn output_path_for(directory: &Path, source: &Path, prefix: &str, extension: &str) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "output".to_string());

    directory.join(format!("{}_{}.{}", prefix, stem, extension))
}

/// Load an image, failing on unreadable or undecodable files.
pub fn load_image(path: &Path) -> Result<RgbImage> {
    let image = image::open(path).map_err(|source| DefisheyeError::ImageRead {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(image.to_rgb8())
}

/// Load every readable image, skipping the ones that fail.
pub fn resolve_images(paths: &[PathBuf]) -> Vec<(PathBuf, RgbImage)> {
    paths
        .iter()
        .filter_map(|path| match load_image(path) {
            Ok(image) => Some((path.clone(), image)),
            Err(e) => {
                log::warn!("Skipping {}: {}", path.display(), e);
                None
            }
        })
        .collect()
}

/// Write an image; the format follows the file extension.
pub fn save_image(image: &RgbImage, path: &Path) -> Result<()> {
    image.save(path).map_err(|source| DefisheyeError::ImageWrite {
        path: path.to_path_buf(),
        source,
    })
}

pub fn is_video(path: &Path) -> bool {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .map(|e| VIDEO_EXTENSIONS.contains(&e.as_str()))
        .unwrap_or(false)
}
