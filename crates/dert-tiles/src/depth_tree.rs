//! Quad-tree of the tile ids that exist in a landscape.
//!
//! The tree is stored as an arena: nodes live in a `Vec` and refer to their
//! four children by index. A node either has all four children or none; tile
//! generation always produces complete quadruplets, so discovery only checks
//! the first child of each node.
//!
//! ## Cache file format
//!
//! The tree is persisted as comma-separated text so a landscape only has to be
//! scanned once:
//!
//! ```text
//! Index,Id,Child1,Child2,Child3,Child4
//! 0, , 1, 2, 3, 4
//! 1, /1, -1, -1, -1, -1
//! ...
//! ```
//!
//! Children are row indices, `-1` for a leaf. Row order is free; row 0 is the
//! root. Lines starting with `#` are ignored.

use crate::tile_id::{HalfExtent, Quadrant, TileId};
use crate::{Result, TileError};
use std::collections::{HashMap, HashSet};
use std::io::{BufRead, Write};

/// Column header written at the top of the cache file.
pub const CACHE_HEADER: &str = "Index,Id,Child1,Child2,Child3,Child4";

/// Index of a node within a [`DepthTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeIndex(usize);

/// One node of the existence tree.
#[derive(Debug, Clone)]
pub struct DepthNode {
    id: TileId,
    children: Option<[NodeIndex; 4]>,
}

impl DepthNode {
    /// Id of the tile this node records.
    pub fn id(&self) -> &TileId {
        &self.id
    }

    /// Child nodes in quadrant order, if the children exist.
    pub fn children(&self) -> Option<[NodeIndex; 4]> {
        self.children
    }

    /// Whether this node has no children.
    pub fn is_leaf(&self) -> bool {
        self.children.is_none()
    }
}

/// Quad-tree recording which tiles exist in the backing store.
#[derive(Debug, Clone)]
pub struct DepthTree {
    nodes: Vec<DepthNode>,
}

impl DepthTree {
    /// A tree holding only the root tile.
    pub fn root_only() -> Self {
        Self {
            nodes: vec![DepthNode {
                id: TileId::root(),
                children: None,
            }],
        }
    }

    /// Build a tree by probing for tiles.
    ///
    /// `exists` is asked whether a tile exists. For every known tile only the
    /// first child is checked; if it exists all four children are added and visited.
    /// The root is assumed to exist.
    pub fn discover<F>(mut exists: F) -> Self
    where
        F: FnMut(&TileId) -> bool,
    {
        let mut tree = Self::root_only();
        tree.fill(NodeIndex(0), &mut exists);
        tree
    }

    fn fill<F>(&mut self, index: NodeIndex, exists: &mut F)
    where
        F: FnMut(&TileId) -> bool,
    {
        let parent = self.nodes[index.0].id.clone();
        if !exists(&parent.child(Quadrant::NorthWest)) {
            return;
        }
        let first = self.nodes.len();
        for quadrant in Quadrant::ALL {
            self.nodes.push(DepthNode {
                id: parent.child(quadrant),
                children: None,
            });
        }
        let children = [
            NodeIndex(first),
            NodeIndex(first + 1),
            NodeIndex(first + 2),
            NodeIndex(first + 3),
        ];
        self.nodes[index.0].children = Some(children);
        for child in children {
            self.fill(child, exists);
        }
    }

    /// The root node.
    pub fn root(&self) -> &DepthNode {
        &self.nodes[0]
    }

    /// Node at an index returned by this tree.
    pub fn node(&self, index: NodeIndex) -> &DepthNode {
        &self.nodes[index.0]
    }

    /// Number of tiles recorded in the tree.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Always false; a tree has at least its root.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Deepest level present in the tree.
    pub fn max_level(&self) -> usize {
        self.nodes.iter().map(|n| n.id.level()).max().unwrap_or(0)
    }

    /// All ids in the tree, parents before children.
    pub fn ids(&self) -> impl Iterator<Item = &TileId> {
        self.nodes.iter().map(|n| &n.id)
    }

    /// Ids of the leaf tiles (the finest available resolution).
    pub fn leaves(&self) -> impl Iterator<Item = &TileId> {
        self.nodes.iter().filter(|n| n.is_leaf()).map(|n| &n.id)
    }

    /// Find the node for a tile id.
    pub fn find(&self, id: &TileId) -> Option<&DepthNode> {
        let mut node = self.root();
        for quadrant in id.quadrants() {
            let children = node.children?;
            node = self.node(children[quadrant.index()]);
        }
        Some(node)
    }

    /// Whether a tile exists.
    pub fn contains(&self, id: &TileId) -> bool {
        self.find(id).is_some()
    }

    /// Whether a tile exists, given its id string.
    ///
    /// Malformed ids do not exist.
    pub fn contains_str(&self, id: &str) -> bool {
        TileId::parse(id).is_some_and(|id| self.contains(&id))
    }

    /// Id of the tile containing a landscape coordinate.
    ///
    /// `(x, y)` is relative to the centre of a `world_width` x `world_length`
    /// landscape. With `max_level` of `None` the deepest existing tile is
    /// returned. With `Some(level)` the tile at exactly that level is returned,
    /// or `None` if the tree does not reach that deep at this point.
    pub fn locate(
        &self,
        x: f64,
        y: f64,
        world_width: f64,
        world_length: f64,
        max_level: Option<u32>,
    ) -> Option<TileId> {
        let mut node = self.root();
        let mut half = HalfExtent::of_world(world_width, world_length);
        let (mut x, mut y) = (x, y);
        let mut path = Vec::new();
        loop {
            if max_level.is_some_and(|limit| path.len() as u64 >= u64::from(limit)) {
                return Some(TileId::from_quadrants(path));
            }
            let Some(children) = node.children else {
                return match max_level {
                    None => Some(TileId::from_quadrants(path)),
                    Some(_) => None,
                };
            };
            let (quadrant, cx, cy, child_half) = half.descend(x, y);
            path.push(quadrant);
            node = self.node(children[quadrant.index()]);
            x = cx;
            y = cy;
            half = child_half;
        }
    }

    /// Write the tree in the cache file format.
    pub fn write_to<W: Write>(&self, mut out: W) -> Result<()> {
        writeln!(out, "{}", CACHE_HEADER)?;
        for (index, node) in self.nodes.iter().enumerate() {
            write!(out, "{}, {}", index, node.id)?;
            match node.children {
                Some(children) => {
                    for child in children {
                        write!(out, ", {}", child.0)?;
                    }
                }
                None => write!(out, ", -1, -1, -1, -1")?,
            }
            writeln!(out)?;
        }
        out.flush()?;
        Ok(())
    }

    /// Serialize the tree to a byte buffer in the cache file format.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.nodes.len() * 24);
        // Writing to a Vec cannot fail.
        let _ = self.write_to(&mut buf);
        buf
    }

    /// Parse a tree from the cache file format.
    ///
    /// Anything that would produce a tree violating the existence invariants
    /// (partial quadruplets, ids that do not match their position, shared,
    /// cyclic or unreachable nodes) is rejected.
    pub fn read_from<R: BufRead>(input: R) -> Result<Self> {
        let mut rows: HashMap<usize, CacheRow> = HashMap::new();
        let mut saw_header = false;

        for (n, line) in input.lines().enumerate() {
            let line = line?;
            let line_no = n + 1;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            if !saw_header {
                saw_header = true;
                continue;
            }
            let row = CacheRow::parse(trimmed, line_no)?;
            if rows.insert(row.index, row).is_some() {
                return Err(corrupt(line_no, "duplicate node index"));
            }
        }

        if rows.is_empty() {
            return Err(corrupt(0, "existence tree is empty"));
        }
        let root = rows
            .get(&0)
            .ok_or_else(|| corrupt(0, "missing root node (index 0)"))?;
        if !root.id.is_root() {
            return Err(corrupt(root.line, "node 0 is not the root tile"));
        }

        let mut tree = Self::root_only();
        let mut visited: HashSet<usize> = HashSet::from([0]);
        // (row index in file, arena index)
        let mut pending = vec![(0usize, NodeIndex(0))];

        while let Some((row_index, arena_index)) = pending.pop() {
            let row = &rows[&row_index];
            let Some(child_rows) = row.children else {
                continue;
            };
            let parent_id = tree.nodes[arena_index.0].id.clone();
            let first = tree.nodes.len();
            for (quadrant, child_row_index) in Quadrant::ALL.into_iter().zip(child_rows) {
                let child_row = rows.get(&child_row_index).ok_or_else(|| {
                    corrupt(row.line, format!("child index {} does not exist", child_row_index))
                })?;
                if !visited.insert(child_row_index) {
                    return Err(corrupt(
                        child_row.line,
                        format!("node {} is referenced more than once", child_row_index),
                    ));
                }
                let expected = parent_id.child(quadrant);
                if child_row.id != expected {
                    return Err(corrupt(
                        child_row.line,
                        format!("expected id {:?}, found {:?}", expected.to_string(), child_row.id.to_string()),
                    ));
                }
                tree.nodes.push(DepthNode {
                    id: expected,
                    children: None,
                });
                pending.push((child_row_index, NodeIndex(tree.nodes.len() - 1)));
            }
            tree.nodes[arena_index.0].children = Some([
                NodeIndex(first),
                NodeIndex(first + 1),
                NodeIndex(first + 2),
                NodeIndex(first + 3),
            ]);
        }

        let stray = rows.values().filter(|row| !visited.contains(&row.index)).map(|row| row.line).min();
        if let Some(line) = stray {
            return Err(corrupt(line, "row is not reachable from the root"));
        }
        Ok(tree)
    }
}

/// One parsed line of the cache file.
struct CacheRow {
    index: usize,
    id: TileId,
    children: Option<[usize; 4]>,
    line: usize,
}

impl CacheRow {
    fn parse(line: &str, line_no: usize) -> Result<Self> {
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        if fields.len() < 6 {
            return Err(corrupt(line_no, "expected 6 fields"));
        }
        let index = fields[0]
            .parse::<usize>()
            .map_err(|_| corrupt(line_no, format!("bad node index {:?}", fields[0])))?;
        let id = TileId::parse(fields[1])
            .ok_or_else(|| corrupt(line_no, format!("bad tile id {:?}", fields[1])))?;

        let mut links = [0i64; 4];
        for (slot, field) in links.iter_mut().zip(&fields[2..6]) {
            *slot = field
                .parse::<i64>()
                .map_err(|_| corrupt(line_no, format!("bad child index {:?}", field)))?;
        }
        let children = if links.iter().all(|&c| c < 0) {
            None
        } else if links.iter().all(|&c| c >= 0) {
            Some(links.map(|c| c as usize))
        } else {
            return Err(corrupt(line_no, "partial set of children"));
        };

        Ok(Self {
            index,
            id,
            children,
            line: line_no,
        })
    }
}

fn corrupt(line: usize, reason: impl Into<String>) -> TileError {
    TileError::CorruptDepthTree {
        line,
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::io::Cursor;

    /// Existence check that reports every tile up to `depth` levels as existing.
    fn full_tree(depth: usize) -> DepthTree {
        DepthTree::discover(|id| id.level() <= depth)
    }

    fn id(text: &str) -> TileId {
        text.parse().unwrap()
    }

    #[test]
    fn test_discover_full_tree() {
        let tree = full_tree(2);
        assert_eq!(tree.len(), 1 + 4 + 16);
        assert_eq!(tree.max_level(), 2);
        assert_eq!(tree.leaves().count(), 16);
        assert!(tree.contains(&id("/3/4")));
        assert!(!tree.contains(&id("/3/4/1")));
    }

    #[test]
    fn test_discover_checks_first_child_only() {
        let mut checked = Vec::new();
        let tree = DepthTree::discover(|id| {
            checked.push(id.to_string());
            id.level() <= 1
        });
        assert_eq!(tree.len(), 5);
        assert_eq!(checked, vec!["/1", "/1/1", "/2/1", "/3/1", "/4/1"]);
    }

    #[test]
    fn test_discover_uneven_depth() {
        // Only the north-west branch goes deeper.
        let tree = DepthTree::discover(|id| {
            id.level() == 1 || (id.level() <= 3 && id.quadrants()[0] == Quadrant::NorthWest)
        });
        assert!(tree.contains(&id("/1/2/3")));
        assert!(tree.contains(&id("/2")));
        assert!(!tree.contains(&id("/2/1")));
        assert_eq!(tree.max_level(), 3);
    }

    #[test]
    fn test_contains_str() {
        let tree = full_tree(1);
        assert!(tree.contains_str(""));
        assert!(tree.contains_str("/4"));
        assert!(!tree.contains_str("/4/1"));
        assert!(!tree.contains_str("4"));
        assert!(!tree.contains_str("/9"));
        assert!(!tree.contains_str("garbage"));
    }

    #[test]
    fn test_prefix_closure() {
        let tree = DepthTree::discover(|id| id.level() <= 3 && id.quadrants()[0] != Quadrant::SouthEast);
        let ids: HashSet<&TileId> = tree.ids().collect();
        for tile in tree.ids() {
            for ancestor in tile.ancestors() {
                assert!(ids.contains(&ancestor), "{} missing ancestor {}", tile, ancestor);
            }
        }
    }

    #[test]
    fn test_locate_sample_points() {
        let tree = full_tree(3);
        for (x, y, prefix) in [(-300.0, 300.0, "/1"), (300.0, 300.0, "/2"), (300.0, -300.0, "/4")] {
            let tile = tree.locate(x, y, 1000.0, 1000.0, None).unwrap();
            assert_eq!(tile.level(), 3);
            assert!(tile.to_string().starts_with(prefix), "{} for ({}, {})", tile, x, y);
            assert!(tile.bounds(1000.0, 1000.0).contains(x, y));
        }
    }

    #[test]
    fn test_locate_level_limit() {
        let tree = full_tree(3);
        let tile = tree.locate(-10.0, -10.0, 1000.0, 1000.0, Some(1)).unwrap();
        assert_eq!(tile, id("/3"));
        assert_eq!(tree.locate(-10.0, -10.0, 1000.0, 1000.0, Some(0)), Some(TileId::root()));
        // Deeper than the tree goes.
        assert_eq!(tree.locate(-10.0, -10.0, 1000.0, 1000.0, Some(4)), None);
    }

    #[test]
    fn test_locate_root_only() {
        let tree = DepthTree::root_only();
        assert_eq!(tree.locate(1.0, 1.0, 10.0, 10.0, None), Some(TileId::root()));
        assert_eq!(tree.locate(1.0, 1.0, 10.0, 10.0, Some(1)), None);
    }

    #[test]
    fn test_locate_axis_tie_break() {
        let tree = full_tree(1);
        assert_eq!(tree.locate(0.0, 0.0, 100.0, 100.0, None), Some(id("/2")));
        assert_eq!(tree.locate(-1.0, 0.0, 100.0, 100.0, None), Some(id("/1")));
        assert_eq!(tree.locate(0.0, -1.0, 100.0, 100.0, None), Some(id("/4")));
    }

    #[test]
    fn test_cache_round_trip() {
        let tree = DepthTree::discover(|id| id.level() <= 2 || id.to_string().starts_with("/2/3"));
        let bytes = tree.to_bytes();
        let loaded = DepthTree::read_from(Cursor::new(bytes)).unwrap();

        assert_eq!(loaded.len(), tree.len());
        let original: HashSet<String> = tree.ids().map(|i| i.to_string()).collect();
        let reloaded: HashSet<String> = loaded.ids().map(|i| i.to_string()).collect();
        assert_eq!(original, reloaded);
    }

    #[test]
    fn test_cache_text_layout() {
        let text = String::from_utf8(full_tree(1).to_bytes()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], CACHE_HEADER);
        assert_eq!(lines[1], "0, , 1, 2, 3, 4");
        assert_eq!(lines[2], "1, /1, -1, -1, -1, -1");
        assert_eq!(lines.len(), 6);
    }

    #[test]
    fn test_read_preorder_indices() {
        // Index layout where each child's subtree follows it directly.
        let text = "\
Index,Id,Child1,Child2,Child3,Child4
# comment
0, , 1, 6, 7, 8
1, /1, 2, 3, 4, 5
2, /1/1, -1, -1, -1, -1
3, /1/2, -1, -1, -1, -1
4, /1/3, -1, -1, -1, -1
5, /1/4, -1, -1, -1, -1
6, /2, -1, -1, -1, -1
7, /3, -1, -1, -1, -1
8, /4, -1, -1, -1, -1
";
        let tree = DepthTree::read_from(Cursor::new(text)).unwrap();
        assert_eq!(tree.len(), 9);
        assert!(tree.contains(&id("/1/4")));
        assert!(!tree.contains(&id("/2/1")));
    }

    #[test]
    fn test_read_rejects_corrupt_files() {
        let cases = [
            "",
            "Index,Id,Child1,Child2,Child3,Child4\n",
            "Index,Id,Child1,Child2,Child3,Child4\n0, , 1, 2, 3\n",
            "Index,Id,Child1,Child2,Child3,Child4\n1, /1, -1, -1, -1, -1\n",
            "Index,Id,Child1,Child2,Child3,Child4\n0, /1, -1, -1, -1, -1\n",
            "Index,Id,Child1,Child2,Child3,Child4\n0, , 1, -1, -1, -1\n1, /1, -1, -1, -1, -1\n",
            "Index,Id,Child1,Child2,Child3,Child4\n0, , 1, 2, 3, 4\n1, /1, -1, -1, -1, -1\n",
            "Index,Id,Child1,Child2,Child3,Child4\n0, , 1, 1, 1, 1\n1, /1, -1, -1, -1, -1\n",
            "Index,Id,Child1,Child2,Child3,Child4\n0, , 0, 0, 0, 0\n",
            "Index,Id,Child1,Child2,Child3,Child4\n0, , x, 2, 3, 4\n",
            "Index,Id,Child1,Child2,Child3,Child4\n0, , -1, -1, -1, -1\n0, , -1, -1, -1, -1\n",
        ];
        for text in cases {
            assert!(
                DepthTree::read_from(Cursor::new(text)).is_err(),
                "accepted corrupt input {:?}",
                text
            );
        }
    }

    #[test]
    fn test_read_rejects_out_of_range_indices() {
        let text = "Index,Id,Child1,Child2,Child3,Child4\n0, , -1,-1,-1,-1\n18446744073709551615, /1, -1,-1,-1,-1\n";
        assert!(matches!(
            DepthTree::read_from(Cursor::new(text)),
            Err(TileError::CorruptDepthTree { line: 3, .. })
        ));

        let text = "Index,Id,Child1,Child2,Child3,Child4\n0, , 1, 2, 3, 1000000000000\n\
                    1, /1, -1,-1,-1,-1\n2, /2, -1,-1,-1,-1\n3, /3, -1,-1,-1,-1\n";
        assert!(matches!(
            DepthTree::read_from(Cursor::new(text)),
            Err(TileError::CorruptDepthTree { line: 2, .. })
        ));

        let text = "Index,Id,Child1,Child2,Child3,Child4\n0, , 1, 2, 3, 18446744073709551615\n\
                    1, /1, -1,-1,-1,-1\n2, /2, -1,-1,-1,-1\n3, /3, -1,-1,-1,-1\n\
                    18446744073709551615, /4, -1,-1,-1,-1\n";
        assert!(matches!(
            DepthTree::read_from(Cursor::new(text)),
            Err(TileError::CorruptDepthTree { line: 2, .. })
        ));
    }

    #[test]
    fn test_read_rejects_misplaced_ids() {
        let text = "\
Index,Id,Child1,Child2,Child3,Child4
0, , 1, 2, 3, 4
1, /2, -1, -1, -1, -1
2, /1, -1, -1, -1, -1
3, /3, -1, -1, -1, -1
4, /4, -1, -1, -1, -1
";
        match DepthTree::read_from(Cursor::new(text)) {
            Err(TileError::CorruptDepthTree { line, .. }) => assert_eq!(line, 3),
            other => panic!("expected corrupt tree error, got {:?}", other),
        }
    }

    #[test]
    fn test_random_trees_round_trip_and_locate() {
        use rand::rngs::StdRng;
        use rand::{Rng, SeedableRng};

        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..20 {
            let tree = DepthTree::discover(|id| id.level() <= 5 && rng.gen_bool(0.6));
            let loaded = DepthTree::read_from(Cursor::new(tree.to_bytes())).unwrap();
            assert_eq!(loaded.len(), tree.len());

            for _ in 0..50 {
                let x = rng.gen_range(-500.0..500.0);
                let y = rng.gen_range(-500.0..500.0);
                let tile = tree.locate(x, y, 1000.0, 1000.0, None).unwrap();
                assert!(tree.find(&tile).is_some_and(DepthNode::is_leaf));
                assert!(tile.bounds(1000.0, 1000.0).contains(x, y), "{} does not contain ({}, {})", tile, x, y);
                assert_eq!(loaded.locate(x, y, 1000.0, 1000.0, None), Some(tile));
            }
        }
    }
}
