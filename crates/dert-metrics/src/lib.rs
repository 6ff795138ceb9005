//! Metric declarations for the DERT landscape tiling core.
//!
//! Every metric the tile store emits is declared here as a [`Metric`] constant so
//! names, units and label keys live in one place. The `metrics` facade is
//! re-exported; install any recorder in the host application to collect them.
//!
//! # Example
//!
//! ```rust,ignore
//! use dert_metrics::{describe_metrics, metric_defs, LayerLabels};
//!
//! describe_metrics();
//!
//! let labels = LayerLabels::new("elevation");
//! metrics::counter!(metric_defs::TILES_FETCHED.name, &labels.to_labels()).increment(1);
//! ```

pub use metrics;

use metrics::{describe_counter, describe_gauge, describe_histogram, Unit};

/// How a metric is recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Counter,
    Gauge,
    Histogram,
}

/// Name and metadata of one emitted metric.
///
/// Declarations are `const`, so call sites refer to `metric_defs::X.name`
/// instead of repeating string literals:
///
/// ```rust
/// use dert_metrics::{Metric, MetricKind};
/// use metrics::Unit;
///
/// const READ_TIME: Metric = Metric::histogram("dert.example.read_time_ms", "Time spent reading a tile")
///     .in_unit(Unit::Milliseconds)
///     .per_layer();
///
/// assert_eq!(READ_TIME.kind, MetricKind::Histogram);
/// assert_eq!(READ_TIME.labels, &["layer"]);
/// ```
#[derive(Debug, Clone)]
pub struct Metric {
    pub name: &'static str,
    pub kind: MetricKind,
    pub description: &'static str,
    /// `Unit::Count` unless declared otherwise.
    pub unit: Unit,
    /// Label keys every emission of this metric carries.
    pub labels: &'static [&'static str],
}

impl Metric {
    pub const fn counter(name: &'static str, description: &'static str) -> Self {
        Self::declare(name, MetricKind::Counter, description)
    }

    pub const fn gauge(name: &'static str, description: &'static str) -> Self {
        Self::declare(name, MetricKind::Gauge, description)
    }

    pub const fn histogram(name: &'static str, description: &'static str) -> Self {
        Self::declare(name, MetricKind::Histogram, description)
    }

    const fn declare(name: &'static str, kind: MetricKind, description: &'static str) -> Self {
        Self {
            name,
            kind,
            description,
            unit: Unit::Count,
            labels: &[],
        }
    }

    pub const fn in_unit(mut self, unit: Unit) -> Self {
        self.unit = unit;
        self
    }

    /// Tag every emission with the layer name (see [`LayerLabels`]).
    pub const fn per_layer(mut self) -> Self {
        self.labels = metric_defs::LAYER_LABELS;
        self
    }

    /// Hand this metric's unit and description to the installed recorder.
    pub fn describe(&self) {
        match self.kind {
            MetricKind::Counter => describe_counter!(self.name, self.unit, self.description),
            MetricKind::Gauge => describe_gauge!(self.name, self.unit, self.description),
            MetricKind::Histogram => describe_histogram!(self.name, self.unit, self.description),
        }
    }
}

/// All metrics emitted by the tiling core.
pub mod metric_defs {
    use super::{Metric, Unit};

    /// Label keys for per-layer metrics.
    pub const LAYER_LABELS: &[&str] = &["layer"];

    // Existence tree

    pub const TREE_EXISTS_CHECKS: Metric = Metric::counter(
        "dert.depth_tree.exists_checks",
        "Tile existence checks made while discovering the existence tree",
    )
    .per_layer();

    pub const TREE_CACHE_HITS: Metric =
        Metric::counter("dert.depth_tree.cache_hits", "Existence trees loaded from the cache file");

    /// Cache file missing or rejected, forcing a rediscovery.
    pub const TREE_CACHE_MISSES: Metric = Metric::counter(
        "dert.depth_tree.cache_misses",
        "Existence tree cache misses (missing or corrupt cache file)",
    );

    pub const TREE_DISCOVERY_TIME: Metric = Metric::histogram(
        "dert.depth_tree.discovery_time_ms",
        "Wall-clock time of one existence tree discovery pass",
    )
    .in_unit(Unit::Milliseconds)
    .per_layer();

    pub const TREE_NODES: Metric =
        Metric::gauge("dert.depth_tree.nodes", "Number of nodes in the published existence tree");

    pub const TREE_PERSISTED: Metric =
        Metric::counter("dert.depth_tree.persisted", "Existence tree cache files written");

    pub const TREE_PERSIST_FAILURES: Metric = Metric::counter(
        "dert.depth_tree.persist_failures",
        "Existence tree cache file writes that failed",
    );

    // Layers and tiles

    pub const LAYERS_SKIPPED: Metric =
        Metric::counter("dert.layers.skipped", "Layer directories skipped during layer discovery").per_layer();

    pub const TILES_FETCHED: Metric =
        Metric::counter("dert.tiles.fetched", "Tiles decoded and returned to a caller").per_layer();

    /// Fetches for ids absent from the existence tree.
    pub const TILES_MISSING: Metric =
        Metric::counter("dert.tiles.missing", "Tile fetches for ids that do not exist").per_layer();

    pub const TILE_DECODE_FAILURES: Metric =
        Metric::counter("dert.tiles.decode_failures", "Tiles that could not be read or decoded").per_layer();

    pub const TILE_BYTES_READ: Metric =
        Metric::histogram("dert.tiles.bytes_read", "Size of tile files read from storage")
            .in_unit(Unit::Bytes)
            .per_layer();

    /// Everything [`describe_metrics`](crate::describe_metrics) registers.
    pub const ALL: &[&Metric] = &[
        &TREE_EXISTS_CHECKS,
        &TREE_CACHE_HITS,
        &TREE_CACHE_MISSES,
        &TREE_DISCOVERY_TIME,
        &TREE_NODES,
        &TREE_PERSISTED,
        &TREE_PERSIST_FAILURES,
        &LAYERS_SKIPPED,
        &TILES_FETCHED,
        &TILES_MISSING,
        &TILE_DECODE_FAILURES,
        &TILE_BYTES_READ,
    ];
}

/// Labels attached to per-layer metrics.
///
/// ```rust
/// use dert_metrics::LayerLabels;
///
/// let labels = LayerLabels::new("elevation").with_landscape("gale_crater");
/// assert_eq!(labels.to_labels().len(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct LayerLabels {
    /// Layer directory name.
    pub layer: String,
    /// Optional landscape name, for hosts serving more than one landscape.
    pub landscape: Option<String>,
}

impl LayerLabels {
    /// Creates labels for the given layer.
    pub fn new(layer: impl Into<String>) -> Self {
        Self {
            layer: layer.into(),
            landscape: None,
        }
    }

    /// Tags the labels with a landscape name.
    pub fn with_landscape(mut self, landscape: impl Into<String>) -> Self {
        self.landscape = Some(landscape.into());
        self
    }

    /// Converts the labels to the `metrics` crate label format.
    pub fn to_labels(&self) -> Vec<(&'static str, String)> {
        let mut labels = vec![("layer", self.layer.clone())];
        if let Some(landscape) = &self.landscape {
            labels.push(("landscape", landscape.clone()));
        }
        labels
    }
}

/// Describes all tiling metrics to the installed recorder.
///
/// Call once at startup, after the recorder is installed.
pub fn describe_metrics() {
    for metric in metric_defs::ALL {
        metric.describe();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layer_labels() {
        let labels = LayerLabels::new("elevation");
        let label_vec = labels.to_labels();
        assert_eq!(label_vec, vec![("layer", "elevation".to_string())]);
    }

    #[test]
    fn test_layer_labels_with_landscape() {
        let label_vec = LayerLabels::new("color").with_landscape("gale").to_labels();
        assert_eq!(label_vec.len(), 2);
        assert!(label_vec.contains(&("landscape", "gale".to_string())));
    }

    #[test]
    fn test_metric_definitions() {
        assert_eq!(metric_defs::TREE_EXISTS_CHECKS.name, "dert.depth_tree.exists_checks");
        assert_eq!(metric_defs::TREE_EXISTS_CHECKS.kind, MetricKind::Counter);
        assert_eq!(metric_defs::TREE_NODES.kind, MetricKind::Gauge);
        assert_eq!(metric_defs::TREE_DISCOVERY_TIME.unit, Unit::Milliseconds);
        assert_eq!(metric_defs::TILE_BYTES_READ.kind, MetricKind::Histogram);
        assert_eq!(metric_defs::TILES_FETCHED.labels, &["layer"]);
    }

    #[test]
    fn test_metric_names_unique() {
        let mut names: Vec<&str> = metric_defs::ALL.iter().map(|m| m.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), metric_defs::ALL.len());
    }

    #[test]
    fn test_metric_defaults() {
        const PLAIN: Metric = Metric::gauge("plain", "A plain gauge");

        assert_eq!(PLAIN.kind, MetricKind::Gauge);
        assert_eq!(PLAIN.unit, Unit::Count);
        assert!(PLAIN.labels.is_empty());
    }

    #[test]
    fn test_per_layer_metrics_match_layer_labels() {
        let keys: Vec<&str> = LayerLabels::new("elevation").to_labels().iter().map(|(k, _)| *k).collect();
        for metric in metric_defs::ALL.iter().filter(|m| !m.labels.is_empty()) {
            assert_eq!(metric.labels, keys.as_slice(), "{}", metric.name);
        }
    }

    #[test]
    fn test_describe_without_recorder() {
        // With no recorder installed, describing is a no-op.
        describe_metrics();
    }
}
