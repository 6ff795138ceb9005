//! Error types for the tiling crate.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur when working with a landscape tile store.
///
/// Only configuration-level failures reach callers of the store's lookup and
/// fetch paths; per-tile and per-layer problems are logged and degrade to
/// `None` or a skipped layer.
#[derive(Debug, Error)]
pub enum TileError {
    /// I/O error reading or writing a file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The landscape root is missing or is not a directory.
    #[error("Landscape at {path} is not configured: {reason}")]
    NotConfigured {
        /// Landscape root that was inspected.
        path: PathBuf,
        /// What is wrong with it.
        reason: String,
    },

    /// No layer with this name was discovered.
    #[error("Layer not found: {0}")]
    LayerNotFound(String),

    /// A tile id string is not a `/`-separated sequence of quadrant digits.
    #[error("Invalid tile id: {0:?}")]
    InvalidTileId(String),

    /// The persisted existence tree could not be parsed.
    #[error("Corrupt existence tree cache at line {line}: {reason}")]
    CorruptDepthTree {
        /// 1-based line number in the cache file (0 when not line-specific).
        line: usize,
        /// What is wrong with the file.
        reason: String,
    },

    /// A `layer.properties` file could not be parsed.
    #[error("Layer properties error: {0}")]
    Properties(#[from] java_properties::PropertiesError),

    /// PNG decoding error.
    #[error("PNG decode error: {0}")]
    PngDecode(#[from] image::ImageError),

    /// TIFF decoding error.
    #[error("TIFF decode error: {0}")]
    TiffDecode(#[from] tiff::TiffError),

    /// The tile image uses a sample layout the decoder does not handle.
    #[error("Unsupported tile data type: {0}")]
    UnsupportedDataType(String),

    /// Invalid tile store configuration.
    #[error("Invalid configuration: {0}")]
    Config(#[from] serde_yaml::Error),

    /// A store lock was poisoned (a thread panicked while holding it).
    #[error("Tile store lock was poisoned")]
    LockPoisoned,
}
