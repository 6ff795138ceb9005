//! Tile store configuration.

use crate::raster::TileFormat;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Settings for a [`TileStore`](crate::TileStore).
///
/// Every field has a default matching the standard landscape layout, so an
/// empty YAML document is a valid configuration.
///
/// ```
/// use dert_tiles::{TileFormat, TileStoreConfig};
///
/// let config = TileStoreConfig::from_yaml_str("tile_format: tiff\n")?;
/// assert_eq!(config.tile_format, TileFormat::Tiff);
/// assert_eq!(config.metadata_dir, "dert");
/// # Ok::<(), dert_tiles::TileError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TileStoreConfig {
    /// Image format of the tile files.
    pub tile_format: TileFormat,
    /// Directory under the landscape root holding internal metadata.
    pub metadata_dir: String,
    /// Scratch sub-pyramid directory, never a layer.
    pub scratch_dir: String,
    /// File name of the existence-tree cache inside `metadata_dir`.
    pub depth_tree_file: String,
    /// Per-layer metadata file name.
    pub layer_properties_file: String,
    /// Layer whose quad-tree defines tile existence when none was discovered.
    pub elevation_layer: String,
    /// Write a freshly discovered existence tree back to the cache file.
    pub persist_existence_tree: bool,
}

impl Default for TileStoreConfig {
    fn default() -> Self {
        Self {
            tile_format: TileFormat::Png,
            metadata_dir: "dert".to_string(),
            scratch_dir: "subpyramid".to_string(),
            depth_tree_file: "depthtree.txt".to_string(),
            layer_properties_file: "layer.properties".to_string(),
            elevation_layer: "elevation".to_string(),
            persist_existence_tree: true,
        }
    }
}

impl TileStoreConfig {
    /// Parse a configuration from YAML text.
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// Load a configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    /// Path of the existence-tree cache, relative to the landscape root.
    pub fn depth_tree_path(&self) -> String {
        format!("{}/{}", self.metadata_dir, self.depth_tree_file)
    }

    /// Whether a root-level directory name is reserved (never a layer).
    pub fn is_reserved_dir(&self, name: &str) -> bool {
        name.eq_ignore_ascii_case(&self.metadata_dir) || name.eq_ignore_ascii_case(&self.scratch_dir)
    }
}
