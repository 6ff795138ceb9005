//! The landscape tile store.
//!
//! ## Thread Safety
//!
//! `TileStore` is shared freely between threads:
//! - The existence tree is built at most once per store. The first caller
//!   loads the cache file or scans storage; concurrent callers wait for it
//!   and receive the same `Arc<DepthTree>`.
//! - Once published the tree is immutable, so lookups clone the `Arc` under a
//!   short lock and walk it without holding anything.
//! - Writing a freshly discovered tree to the cache runs on the background
//!   executor and never blocks a lookup.

use crate::config::TileStoreConfig;
use crate::depth_tree::DepthTree;
use crate::layer::{LayerDescriptor, LayerProperties};
use crate::raster::{DataType, DecodedImage, RasterTile};
use crate::storage::{FileSystemStorage, Storage};
use crate::tile_id::TileId;
use crate::worker::{PersistState, PersistTracker, TaskExecutor, ThreadExecutor};
use crate::{Result, TileError};
use dert_metrics::{metric_defs, metrics, LayerLabels};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::{Duration, Instant};

/// Name of the background thread that writes the existence-tree cache.
const PERSIST_JOB_NAME: &str = "dert-depth-tree-persist";

/// Where a published existence tree came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeSource {
    /// Loaded from the cache file.
    Cache,
    /// Built by probing the elevation layer.
    Discovery,
}

/// Observable state of the existence tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeStatus {
    /// Nothing has asked for the tree yet.
    Uninitialized,
    /// A caller is loading or discovering it.
    Discovering,
    /// Published.
    Ready { source: TreeSource, nodes: usize },
    /// The elevation layer has no root tile. Asking again under a different
    /// elevation layer name retries.
    Unavailable,
}

enum TreeState {
    Uninitialized,
    Discovering,
    Ready { tree: Arc<DepthTree>, source: TreeSource },
    /// The named elevation layer had no root tile.
    Unavailable { layer: String },
}

/// Holds the tree in `Discovering` while one caller builds it.
///
/// Dropped without publishing (the build panicked), it hands the state back
/// to `Uninitialized` so waiters retry instead of blocking forever.
struct DiscoveryGuard<'a> {
    tree: &'a Mutex<TreeState>,
    published: &'a Condvar,
}

impl DiscoveryGuard<'_> {
    fn publish(self, next: TreeState) {
        *self.tree.lock().unwrap_or_else(PoisonError::into_inner) = next;
    }
}

impl Drop for DiscoveryGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.tree.lock().unwrap_or_else(PoisonError::into_inner);
        if matches!(*state, TreeState::Discovering) {
            *state = TreeState::Uninitialized;
        }
        drop(state);
        self.published.notify_all();
    }
}

/// Tile store for one landscape.
pub struct TileStore<S: Storage = FileSystemStorage> {
    storage: Arc<S>,
    config: TileStoreConfig,
    /// Layers found by the last `discover_layers` call.
    layers: RwLock<Option<Vec<LayerDescriptor>>>,
    tree: Mutex<TreeState>,
    /// Signalled when the tree leaves `Discovering`.
    tree_published: Condvar,
    persist: Arc<PersistTracker>,
    executor: Arc<dyn TaskExecutor>,
}

impl<S: Storage> std::fmt::Debug for TileStore<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileStore")
            .field("location", &self.storage.location())
            .field("tree", &self.tree_status())
            .finish()
    }
}

impl TileStore<FileSystemStorage> {
    /// Open a landscape directory.
    ///
    /// Returns `None` when the location does not exist; an unreachable
    /// landscape is an expected condition, not an error.
    pub fn connect<P: AsRef<Path>>(location: P, config: TileStoreConfig) -> Option<Self> {
        let storage = FileSystemStorage::connect(location)?;
        tracing::debug!(root = %storage.root().display(), "connected to landscape");
        Some(Self::with_storage(storage, config))
    }
}

impl<S: Storage> TileStore<S> {
    /// Create a store over any storage backend.
    pub fn with_storage(storage: S, config: TileStoreConfig) -> Self {
        Self {
            storage: Arc::new(storage),
            config,
            layers: RwLock::new(None),
            tree: Mutex::new(TreeState::Uninitialized),
            tree_published: Condvar::new(),
            persist: Arc::new(PersistTracker::new()),
            executor: Arc::new(ThreadExecutor),
        }
    }

    /// Replace the executor used for the cache write.
    pub fn with_executor<E: TaskExecutor + 'static>(mut self, executor: E) -> Self {
        self.executor = Arc::new(executor);
        self
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn config(&self) -> &TileStoreConfig {
        &self.config
    }

    /// Enumerate the layers of the landscape, in name order.
    ///
    /// Hidden entries, the reserved metadata and scratch directories, plain
    /// files, and directories without usable layer properties are skipped.
    /// Finding an elevation layer initializes the existence tree.
    pub fn discover_layers(&self) -> Result<Vec<LayerDescriptor>> {
        if !self.storage.root_is_dir() {
            return Err(TileError::NotConfigured {
                path: PathBuf::from(self.storage.location()),
                reason: "landscape root is not a directory".to_string(),
            });
        }

        let mut entries = self.storage.list_dir("")?;
        entries.sort_by(|a, b| a.name.cmp(&b.name));

        let mut layers = Vec::new();
        for entry in entries {
            if entry.name.starts_with('.') || self.config.is_reserved_dir(&entry.name) || !entry.is_dir {
                continue;
            }
            match self.load_layer(&entry.name) {
                Some(layer) => layers.push(layer),
                None => {
                    let labels = LayerLabels::new(&entry.name).to_labels();
                    metrics::counter!(metric_defs::LAYERS_SKIPPED.name, &labels).increment(1);
                }
            }
        }

        *self.layers.write().map_err(|_| TileError::LockPoisoned)? = Some(layers.clone());
        tracing::info!(location = %self.storage.location(), count = layers.len(), "discovered layers");

        if let Some(elevation) = layers.iter().find(|layer| layer.is_elevation()) {
            self.ensure_tree(&elevation.name);
        }
        Ok(layers)
    }

    fn load_layer(&self, name: &str) -> Option<LayerDescriptor> {
        let path = format!("{}/{}", name, self.config.layer_properties_file);
        if !self.storage.exists(&path) {
            tracing::warn!(layer = name, "no layer properties found, skipping layer");
            return None;
        }
        let bytes = match self.storage.read(&path) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(layer = name, error = %e, "unable to read layer properties, skipping layer");
                return None;
            }
        };
        let properties = match LayerProperties::read(bytes.as_slice()) {
            Ok(properties) => properties,
            Err(e) => {
                tracing::warn!(layer = name, error = %e, "unable to parse layer properties, skipping layer");
                return None;
            }
        };
        let layer = LayerDescriptor::from_properties(name, properties);
        if layer.is_none() {
            tracing::warn!(layer = name, "layer properties have no LayerType, skipping layer");
        }
        layer
    }

    /// Properties of a discovered layer.
    ///
    /// Runs layer discovery first if it has not happened yet.
    pub fn layer_metadata(&self, name: &str) -> Result<LayerProperties> {
        let discovered = self.layers.read().map_err(|_| TileError::LockPoisoned)?.is_some();
        if !discovered {
            self.discover_layers()?;
        }
        let layers = self.layers.read().map_err(|_| TileError::LockPoisoned)?;
        layers
            .iter()
            .flatten()
            .find(|layer| layer.name == name)
            .map(|layer| layer.properties.clone())
            .ok_or_else(|| TileError::LayerNotFound(name.to_string()))
    }

    /// The existence tree, building it on first use.
    ///
    /// Returns `None` when the elevation layer has no tiles at all. A layer
    /// found empty is not checked again, but a different elevation layer
    /// found later by `discover_layers` is.
    pub fn existence_tree(&self) -> Option<Arc<DepthTree>> {
        let layer = self.elevation_layer_name();
        self.ensure_tree(&layer)
    }

    fn elevation_layer_name(&self) -> String {
        let layers = self.layers.read().unwrap_or_else(PoisonError::into_inner);
        layers
            .iter()
            .flatten()
            .find(|layer| layer.is_elevation())
            .map(|layer| layer.name.clone())
            .unwrap_or_else(|| self.config.elevation_layer.clone())
    }

    /// Whether a tile id exists. Malformed ids do not.
    pub fn tile_exists(&self, id: &str) -> bool {
        self.existence_tree().is_some_and(|tree| tree.contains_str(id))
    }

    /// Id of the tile containing `(x, y)`; see [`DepthTree::locate`].
    pub fn locate_tile_id(
        &self,
        x: f64,
        y: f64,
        world_width: f64,
        world_length: f64,
        max_level: Option<u32>,
    ) -> Option<TileId> {
        self.existence_tree()?.locate(x, y, world_width, world_length, max_level)
    }

    /// Load and decode one tile.
    ///
    /// Returns `None` when the tile does not exist or cannot be read; read
    /// and decode failures are logged with the layer and tile id.
    pub fn fetch_tile(&self, layer: &str, id: &TileId, declared: DataType) -> Option<RasterTile> {
        let labels = LayerLabels::new(layer).to_labels();
        let path = self.tile_path(layer, id);

        let exists = match self.existence_tree() {
            Some(tree) => tree.contains(id),
            None => self.storage.exists(&path),
        };
        if !exists {
            tracing::debug!(layer, tile = %id, "tile does not exist");
            metrics::counter!(metric_defs::TILES_MISSING.name, &labels).increment(1);
            return None;
        }

        let decoded = self.storage.read(&path).map_err(TileError::from).and_then(|bytes| {
            metrics::histogram!(metric_defs::TILE_BYTES_READ.name, &labels).record(bytes.len() as f64);
            DecodedImage::decode(self.config.tile_format, &bytes)
        });
        match decoded {
            Ok(image) => {
                metrics::counter!(metric_defs::TILES_FETCHED.name, &labels).increment(1);
                Some(RasterTile::from_decoded(id.clone(), layer, declared, image))
            }
            Err(e) => {
                tracing::warn!(layer, tile = %id, error = %e, "unable to read tile");
                metrics::counter!(metric_defs::TILE_DECODE_FAILURES.name, &labels).increment(1);
                None
            }
        }
    }

    fn tile_path(&self, layer: &str, id: &TileId) -> String {
        format!("{}{}/0.{}", layer, id, self.config.tile_format.extension())
    }

    /// Current state of the existence tree.
    pub fn tree_status(&self) -> TreeStatus {
        match &*self.lock_tree() {
            TreeState::Uninitialized => TreeStatus::Uninitialized,
            TreeState::Discovering => TreeStatus::Discovering,
            TreeState::Ready { tree, source } => TreeStatus::Ready {
                source: *source,
                nodes: tree.len(),
            },
            TreeState::Unavailable { .. } => TreeStatus::Unavailable,
        }
    }

    /// State of the background cache write.
    pub fn persist_state(&self) -> PersistState {
        self.persist.state()
    }

    /// Wait up to `timeout` for a pending cache write to finish.
    pub fn wait_for_persist(&self, timeout: Duration) -> PersistState {
        self.persist.wait(timeout)
    }

    fn lock_tree(&self) -> MutexGuard<'_, TreeState> {
        self.tree.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_tree(&self, layer: &str) -> Option<Arc<DepthTree>> {
        let guard = {
            let mut state = self.lock_tree();
            loop {
                match &*state {
                    TreeState::Ready { tree, .. } => return Some(tree.clone()),
                    // A layer already found empty is not checked again.
                    TreeState::Unavailable { layer: tried } if tried == layer => return None,
                    TreeState::Discovering => {
                        // Someone else is building it; wait and reuse their result.
                        state = self
                            .tree_published
                            .wait(state)
                            .unwrap_or_else(PoisonError::into_inner);
                    }
                    TreeState::Uninitialized | TreeState::Unavailable { .. } => {
                        *state = TreeState::Discovering;
                        break;
                    }
                }
            }
            DiscoveryGuard {
                tree: &self.tree,
                published: &self.tree_published,
            }
        };

        let built = self.build_tree(layer).map(|(tree, source)| (Arc::new(tree), source));

        // Publish before the cache write is queued.
        guard.publish(match &built {
            Some((tree, source)) => TreeState::Ready {
                tree: tree.clone(),
                source: *source,
            },
            None => TreeState::Unavailable {
                layer: layer.to_string(),
            },
        });

        let (tree, source) = built?;
        metrics::gauge!(metric_defs::TREE_NODES.name).set(tree.len() as f64);
        if source == TreeSource::Discovery {
            self.schedule_persist(tree.clone());
        }
        Some(tree)
    }

    fn build_tree(&self, layer: &str) -> Option<(DepthTree, TreeSource)> {
        if let Some(tree) = self.load_cached_tree() {
            metrics::counter!(metric_defs::TREE_CACHE_HITS.name).increment(1);
            return Some((tree, TreeSource::Cache));
        }
        metrics::counter!(metric_defs::TREE_CACHE_MISSES.name).increment(1);

        if !self.storage.exists(&self.tile_path(layer, &TileId::root())) {
            tracing::warn!(layer, "elevation layer has no root tile, landscape has no existence tree");
            return None;
        }

        let labels = LayerLabels::new(layer).to_labels();
        let start = Instant::now();
        let mut checks = 0u64;
        let tree = DepthTree::discover(|id| {
            checks += 1;
            self.storage.exists(&self.tile_path(layer, id))
        });
        let elapsed = start.elapsed();

        metrics::counter!(metric_defs::TREE_EXISTS_CHECKS.name, &labels).increment(checks);
        metrics::histogram!(metric_defs::TREE_DISCOVERY_TIME.name, &labels).record(elapsed.as_secs_f64() * 1000.0);
        tracing::info!(
            layer,
            nodes = tree.len(),
            max_level = tree.max_level(),
            checks,
            elapsed_ms = elapsed.as_millis() as u64,
            "discovered existence tree"
        );
        Some((tree, TreeSource::Discovery))
    }

    fn load_cached_tree(&self) -> Option<DepthTree> {
        let path = self.config.depth_tree_path();
        if !self.storage.exists(&path) {
            tracing::debug!(path, "no existence tree cache");
            return None;
        }
        let bytes = match self.storage.read(&path) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(path, error = %e, "unable to read existence tree cache");
                return None;
            }
        };
        match DepthTree::read_from(bytes.as_slice()) {
            Ok(tree) => {
                tracing::info!(path, nodes = tree.len(), "loaded existence tree from cache");
                Some(tree)
            }
            Err(e) => {
                tracing::warn!(path, error = %e, "discarding existence tree cache");
                None
            }
        }
    }

    fn schedule_persist(&self, tree: Arc<DepthTree>) {
        if !self.config.persist_existence_tree {
            return;
        }
        self.persist.set(PersistState::Pending);

        let storage = Arc::clone(&self.storage);
        let tracker = Arc::clone(&self.persist);
        let path = self.config.depth_tree_path();
        self.executor.submit(
            PERSIST_JOB_NAME,
            Box::new(move || match storage.write(&path, &tree.to_bytes()) {
                Ok(()) => {
                    tracing::info!(path, nodes = tree.len(), "wrote existence tree cache");
                    metrics::counter!(metric_defs::TREE_PERSISTED.name).increment(1);
                    tracker.set(PersistState::Persisted);
                }
                Err(e) => {
                    tracing::error!(path, error = %e, "unable to write existence tree cache");
                    metrics::counter!(metric_defs::TREE_PERSIST_FAILURES.name).increment(1);
                    tracker.set(PersistState::Failed(e.to_string()));
                }
            }),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::InlineExecutor;
    use std::fs;

    fn write_tile(root: &Path, layer: &str, id: &str) {
        let dir = root.join(layer).join(id.trim_start_matches('/'));
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("0.png"), b"placeholder").unwrap();
    }

    fn inline_store(root: &Path) -> TileStore {
        TileStore::connect(root, TileStoreConfig::default())
            .unwrap()
            .with_executor(InlineExecutor)
    }

    #[test]
    fn test_tile_path() {
        let dir = tempfile::tempdir().unwrap();
        let store = inline_store(dir.path());
        assert_eq!(store.tile_path("elevation", &TileId::root()), "elevation/0.png");
        assert_eq!(
            store.tile_path("texture", &"/1/4".parse().unwrap()),
            "texture/1/4/0.png"
        );
    }

    #[test]
    fn test_tree_status_transitions() {
        let dir = tempfile::tempdir().unwrap();
        write_tile(dir.path(), "elevation", "");
        write_tile(dir.path(), "elevation", "/1");

        let store = inline_store(dir.path());
        assert_eq!(store.tree_status(), TreeStatus::Uninitialized);
        assert_eq!(store.persist_state(), PersistState::Idle);

        let tree = store.existence_tree().unwrap();
        assert_eq!(tree.len(), 5);
        assert_eq!(
            store.tree_status(),
            TreeStatus::Ready {
                source: TreeSource::Discovery,
                nodes: 5
            }
        );
        assert_eq!(store.persist_state(), PersistState::Persisted);
        assert!(dir.path().join("dert/depthtree.txt").exists());
    }

    #[test]
    fn test_unavailable_without_root_tile() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("elevation")).unwrap();

        let store = inline_store(dir.path());
        assert!(store.existence_tree().is_none());
        assert_eq!(store.tree_status(), TreeStatus::Unavailable);
        assert!(!store.tile_exists(""));
        assert!(store.locate_tile_id(0.0, 0.0, 10.0, 10.0, None).is_none());
    }

    #[test]
    fn test_persist_disabled() {
        let dir = tempfile::tempdir().unwrap();
        write_tile(dir.path(), "elevation", "");

        let config = TileStoreConfig {
            persist_existence_tree: false,
            ..TileStoreConfig::default()
        };
        let store = TileStore::connect(dir.path(), config)
            .unwrap()
            .with_executor(InlineExecutor);
        assert!(store.existence_tree().is_some());
        assert_eq!(store.persist_state(), PersistState::Idle);
        assert!(!dir.path().join("dert").exists());
    }

    #[test]
    fn test_configured_elevation_layer_name() {
        let dir = tempfile::tempdir().unwrap();
        write_tile(dir.path(), "dem", "");
        write_tile(dir.path(), "dem", "/1");

        let config = TileStoreConfig {
            elevation_layer: "dem".to_string(),
            ..TileStoreConfig::default()
        };
        let store = TileStore::connect(dir.path(), config)
            .unwrap()
            .with_executor(InlineExecutor);
        assert!(store.tile_exists("/3"));
        assert!(!store.tile_exists("/3/1"));
    }
}
