//! # dert-tiles
//!
//! Out-of-core quad-tree tile store for DERT terrain landscapes.
//!
//! A landscape is a directory of layers. Each layer is a quad-tree of image
//! tiles addressed by [`TileId`]s such as `/1/4/2`, where each digit picks a
//! quadrant (1 = NW, 2 = NE, 3 = SW, 4 = SE) of its parent:
//!
//! ```text
//! landscape/
//!   dert/depthtree.txt        existence tree cache
//!   elevation/
//!     layer.properties
//!     0.png                   root tile
//!     1/0.png  2/0.png ...    level 1
//!     1/4/0.png ...           level 2
//!   texture/
//!     layer.properties
//!     ...
//! ```
//!
//! ## Overview
//!
//! The [`TileStore`] answers which tiles exist without touching tile files:
//! the first time it is asked it loads the existence tree from the cache
//! file, or builds it by probing the elevation layer and writes the cache in
//! the background. After that, existence checks and coordinate lookups are
//! pure in-memory walks of a shared [`DepthTree`].
//!
//! ## Example
//!
//! ```no_run
//! use dert_tiles::{DataType, TileStore, TileStoreConfig};
//!
//! let store = TileStore::connect("landscapes/gale", TileStoreConfig::default())
//!     .expect("landscape not found");
//!
//! for layer in store.discover_layers()? {
//!     println!("{} ({})", layer.name, layer.layer_type);
//! }
//!
//! // Deepest tile under a point 100m east and 250m north of the centre
//! // of a 2km x 2km landscape.
//! if let Some(id) = store.locate_tile_id(100.0, 250.0, 2000.0, 2000.0, None) {
//!     let tile = store.fetch_tile("elevation", &id, DataType::Float);
//!     println!("{id}: {:?}", tile.map(|t| (t.width, t.height)));
//! }
//! # Ok::<(), dert_tiles::TileError>(())
//! ```

mod config;
mod depth_tree;
mod error;
mod layer;
mod raster;
mod storage;
mod store;
mod tile_id;
mod worker;

pub use config::TileStoreConfig;
pub use depth_tree::{DepthNode, DepthTree, NodeIndex, CACHE_HEADER};
pub use error::TileError;
pub use layer::{LayerDescriptor, LayerProperties, LAYER_TYPE_KEY};
pub use raster::{classify, DataType, DecodedImage, RasterTile, TileFormat};
pub use storage::{FileSystemStorage, Storage, StorageEntry};
pub use store::{TileStore, TreeSource, TreeStatus};
pub use tile_id::{HalfExtent, Quadrant, TileBounds, TileId};
pub use worker::{InlineExecutor, Job, PersistState, PersistTracker, TaskExecutor, ThreadExecutor};

/// Result type for tile store operations.
pub type Result<T> = std::result::Result<T, TileError>;
