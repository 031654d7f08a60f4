//! Ordered image sequences
//!
//! A slideshow is built from whatever an [`ImageSource`] returns, in the
//! order it returns it.

use std::fs;
use std::path::{Path, PathBuf};

use image::DynamicImage;
use tracing::{debug, info};

use crate::error::SourceError;

/// File extensions recognised when scanning a directory (lowercase)
pub const SUPPORTED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "gif", "tiff", "tif", "webp"];

/// Something that yields the ordered images of a slideshow
pub trait ImageSource {
    /// Load every image, in presentation order
    fn fetch(&self) -> Result<Vec<DynamicImage>, SourceError>;

    /// Short human-readable description for logs
    fn describe(&self) -> String;
}

/// Every supported image file in a directory, sorted by file name
#[derive(Debug, Clone)]
pub struct DirectoryImageSource {
    dir: PathBuf,
}

impl DirectoryImageSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Supported image files in the directory, sorted by file name
    pub fn list(&self) -> Result<Vec<PathBuf>, SourceError> {
        let entries = fs::read_dir(&self.dir).map_err(|e| SourceError::from_io(&self.dir, e))?;

        let mut paths = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| SourceError::from_io(&self.dir, e))?;
            let path = entry.path();
            if path.is_file() && is_supported(&path) {
                paths.push(path);
            } else {
                debug!("skipping {:?}", path);
            }
        }

        paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
        Ok(paths)
    }
}

impl ImageSource for DirectoryImageSource {
    fn fetch(&self) -> Result<Vec<DynamicImage>, SourceError> {
        let paths = self.list()?;
        info!("found {} image(s) in {:?}", paths.len(), self.dir);
        paths.iter().map(|p| decode_file(p)).collect()
    }

    fn describe(&self) -> String {
        format!("directory {}", self.dir.display())
    }
}

/// An explicit, ordered list of image files
#[derive(Debug, Clone, Default)]
pub struct PathListImageSource {
    paths: Vec<PathBuf>,
}

impl PathListImageSource {
    pub fn new(paths: Vec<PathBuf>) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }
}

impl ImageSource for PathListImageSource {
    fn fetch(&self) -> Result<Vec<DynamicImage>, SourceError> {
        self.paths.iter().map(|p| decode_file(p)).collect()
    }

    fn describe(&self) -> String {
        format!("{} listed file(s)", self.paths.len())
    }
}

fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| SUPPORTED_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Read and decode a single image, guessing the format from its contents
fn decode_file(path: &Path) -> Result<DynamicImage, SourceError> {
    let bytes = fs::read(path).map_err(|e| SourceError::from_io(path, e))?;
    let image = image::load_from_memory(&bytes).map_err(|source| SourceError::Decode {
        path: path.to_path_buf(),
        source,
    })?;

    debug!("decoded {:?} ({}x{})", path, image.width(), image.height());
    Ok(image)
}
