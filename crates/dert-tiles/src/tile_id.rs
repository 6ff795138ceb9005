//! Hierarchical tile identifiers and the quadrant math behind them.
//!
//! A landscape is a quad-tree over an extent centred on the origin. Each level
//! splits a tile into four quadrants:
//!
//! ```text
//! +---+---+
//! | 1 | 2 |
//! +---+---+
//! | 3 | 4 |
//! +---+---+
//! ```
//!
//! A [`TileId`] is the sequence of quadrant choices from the root, written as
//! `/`-prefixed digits (`"/1/4/2"`). The root tile is the empty string.

use crate::TileError;
use std::fmt;
use std::str::FromStr;

/// One quarter of a tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Quadrant {
    /// Upper left (x < 0, y >= 0).
    NorthWest = 1,
    /// Upper right (x >= 0, y >= 0).
    NorthEast = 2,
    /// Lower left (x < 0, y < 0).
    SouthWest = 3,
    /// Lower right (x >= 0, y < 0).
    SouthEast = 4,
}

impl Quadrant {
    /// All quadrants in digit order.
    pub const ALL: [Quadrant; 4] = [
        Quadrant::NorthWest,
        Quadrant::NorthEast,
        Quadrant::SouthWest,
        Quadrant::SouthEast,
    ];

    /// Quadrant for a digit in `1..=4`.
    pub fn from_digit(digit: u8) -> Option<Self> {
        match digit {
            1 => Some(Quadrant::NorthWest),
            2 => Some(Quadrant::NorthEast),
            3 => Some(Quadrant::SouthWest),
            4 => Some(Quadrant::SouthEast),
            _ => None,
        }
    }

    /// The digit used in tile id strings.
    pub fn digit(self) -> u8 {
        self as u8
    }

    /// Zero-based index into a children array.
    pub fn index(self) -> usize {
        self as usize - 1
    }

    /// Quadrant containing a point relative to the tile centre.
    ///
    /// Only `x < 0` and `y < 0` count as negative, so points on an axis fall
    /// into the east or north half. Persisted landscapes depend on this.
    pub fn containing(x: f64, y: f64) -> Self {
        match (x < 0.0, y < 0.0) {
            (true, false) => Quadrant::NorthWest,
            (false, false) => Quadrant::NorthEast,
            (true, true) => Quadrant::SouthWest,
            (false, true) => Quadrant::SouthEast,
        }
    }

    /// Sign of the child centre offset from the parent centre, as (x, y).
    fn offset_sign(self) -> (f64, f64) {
        match self {
            Quadrant::NorthWest => (-1.0, 1.0),
            Quadrant::NorthEast => (1.0, 1.0),
            Quadrant::SouthWest => (-1.0, -1.0),
            Quadrant::SouthEast => (1.0, -1.0),
        }
    }
}

/// Half-extents of a tile, used while descending the quad-tree.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HalfExtent {
    /// Half of the tile width.
    pub half_width: f64,
    /// Half of the tile length.
    pub half_length: f64,
}

impl HalfExtent {
    /// Half-extents of a whole landscape.
    pub fn of_world(world_width: f64, world_length: f64) -> Self {
        Self {
            half_width: world_width / 2.0,
            half_length: world_length / 2.0,
        }
    }

    /// Pick the quadrant containing `(x, y)` and move the point into the
    /// child's local frame.
    ///
    /// Returns the quadrant, the recentred coordinate and the child's
    /// half-extents.
    pub fn descend(self, x: f64, y: f64) -> (Quadrant, f64, f64, HalfExtent) {
        let quadrant = Quadrant::containing(x, y);
        let child = HalfExtent {
            half_width: self.half_width / 2.0,
            half_length: self.half_length / 2.0,
        };
        let (sx, sy) = quadrant.offset_sign();
        (
            quadrant,
            x - sx * child.half_width,
            y - sy * child.half_length,
            child,
        )
    }
}

/// Axis-aligned bounds of a tile in landscape coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TileBounds {
    /// West edge.
    pub min_x: f64,
    /// East edge.
    pub max_x: f64,
    /// South edge.
    pub min_y: f64,
    /// North edge.
    pub max_y: f64,
}

impl TileBounds {
    /// Check if a coordinate is within the bounds (edges inclusive).
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }

    /// Width of the bounds.
    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    /// Length of the bounds.
    pub fn length(&self) -> f64 {
        self.max_y - self.min_y
    }
}

/// Path from the root tile to a tile in the landscape quad-tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileId {
    path: Vec<Quadrant>,
}

impl TileId {
    /// The root tile (whole landscape).
    pub fn root() -> Self {
        Self { path: Vec::new() }
    }

    /// Build an id from a sequence of quadrants.
    pub fn from_quadrants(path: impl Into<Vec<Quadrant>>) -> Self {
        Self { path: path.into() }
    }

    /// Parse an id, returning `None` if it is malformed.
    ///
    /// Accepts `""` for the root and `"/d/d/..."` with each `d` in `1..=4`.
    pub fn parse(text: &str) -> Option<Self> {
        if text.is_empty() {
            return Some(Self::root());
        }
        let rest = text.strip_prefix('/')?;
        let mut path = Vec::new();
        for segment in rest.split('/') {
            let mut bytes = segment.bytes();
            let quadrant = match (bytes.next(), bytes.next()) {
                (Some(b), None) if b.is_ascii_digit() => Quadrant::from_digit(b - b'0')?,
                _ => return None,
            };
            path.push(quadrant);
        }
        Some(Self { path })
    }

    /// Depth in the quad-tree; the root is level 0.
    pub fn level(&self) -> usize {
        self.path.len()
    }

    /// Whether this is the root tile.
    pub fn is_root(&self) -> bool {
        self.path.is_empty()
    }

    /// Quadrant choices from the root.
    pub fn quadrants(&self) -> &[Quadrant] {
        &self.path
    }

    /// The last quadrant choice, or `None` for the root.
    pub fn quadrant(&self) -> Option<Quadrant> {
        self.path.last().copied()
    }

    /// Id of the child tile in the given quadrant.
    pub fn child(&self, quadrant: Quadrant) -> Self {
        let mut path = Vec::with_capacity(self.path.len() + 1);
        path.extend_from_slice(&self.path);
        path.push(quadrant);
        Self { path }
    }

    /// Id of the parent tile, or `None` for the root.
    pub fn parent(&self) -> Option<Self> {
        let (_, parent) = self.path.split_last()?;
        Some(Self {
            path: parent.to_vec(),
        })
    }

    /// All proper ancestors, from the root down to the parent.
    pub fn ancestors(&self) -> impl Iterator<Item = TileId> + '_ {
        (0..self.path.len()).map(move |n| TileId {
            path: self.path[..n].to_vec(),
        })
    }

    /// Whether `self` is `other` or one of its ancestors.
    pub fn is_ancestor_of(&self, other: &TileId) -> bool {
        other.path.starts_with(&self.path)
    }

    /// Centre of the tile relative to the landscape centre.
    pub fn center(&self, world_width: f64, world_length: f64) -> (f64, f64) {
        let mut half = HalfExtent::of_world(world_width, world_length);
        let (mut x, mut y) = (0.0, 0.0);
        for quadrant in &self.path {
            half.half_width /= 2.0;
            half.half_length /= 2.0;
            let (sx, sy) = quadrant.offset_sign();
            x += sx * half.half_width;
            y += sy * half.half_length;
        }
        (x, y)
    }

    /// Bounds of the tile in landscape coordinates.
    pub fn bounds(&self, world_width: f64, world_length: f64) -> TileBounds {
        let (cx, cy) = self.center(world_width, world_length);
        let scale = 2f64.powi(self.path.len() as i32);
        let half_width = world_width / 2.0 / scale;
        let half_length = world_length / 2.0 / scale;
        TileBounds {
            min_x: cx - half_width,
            max_x: cx + half_width,
            min_y: cy - half_length,
            max_y: cy + half_length,
        }
    }
}

impl fmt::Display for TileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for quadrant in &self.path {
            write!(f, "/{}", quadrant.digit())?;
        }
        Ok(())
    }
}

impl FromStr for TileId {
    type Err = TileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TileId::parse(s).ok_or_else(|| TileError::InvalidTileId(s.to_string()))
    }
}
