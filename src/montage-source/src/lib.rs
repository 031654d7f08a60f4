//! montage-source - image sequences for slideshow encoding
//!
//! Loads the ordered still images a slideshow is built from, either from a
//! directory or from an explicit list of files.

pub mod error;
pub mod source;

pub use error::SourceError;
pub use source::{DirectoryImageSource, ImageSource, PathListImageSource, SUPPORTED_EXTENSIONS};
