//! Octree spatial partitioning structure
//!
//! Divides 3D space into hierarchical cubic cells so that box and predicate
//! queries can skip whole subtrees. The tree grows when an inserted box
//! escapes the root cell: every member is detached, the root is doubled along
//! the exceeded axes and all members are reinserted.
//!
//! An object is pushed into every child cell that contains its box. A box that
//! fits no single child stays at the current cell, so members lying on a
//! split plane can be recorded in more than one cell and [`Octree::query`]
//! may report them more than once. Use [`Octree::query_unique`] when identity
//! matters.

use crate::foundation::math::Vec3;
use crate::spatial::{BoundingBox, BoundsError};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use thiserror::Error;

/// Octree errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OctreeError {
    /// The supplied box contains NaN or infinite values
    #[error("invalid bounds: {0}")]
    InvalidBounds(#[from] BoundsError),

    /// The object has not been added to this octree
    #[error("object is not a member of the octree")]
    NotAMember,
}

/// Configuration for octree behavior
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OctreeConfig {
    /// Maximum subdivision depth (root is depth 0)
    pub max_depth: u32,

    /// Initial full extent of the root cell, centered at the origin
    pub initial_size: [f32; 3],
}

impl Default for OctreeConfig {
    fn default() -> Self {
        Self {
            max_depth: 8,
            initial_size: [64.0, 64.0, 64.0],
        }
    }
}

/// Index of a cell in the octree arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct CellId(usize);

/// Single cell in the octree hierarchy
#[derive(Debug, Clone)]
struct Cell<K> {
    bounds: BoundingBox,
    depth: u32,
    children: [Option<CellId>; 8],
    objects: Vec<(K, BoundingBox)>,
}

impl<K> Cell<K> {
    fn new(bounds: BoundingBox, depth: u32) -> Self {
        Self {
            bounds,
            depth,
            children: [None; 8],
            objects: Vec::new(),
        }
    }

    /// Bounds of one octant
    ///
    /// Octant bits: 1 = +X, 2 = +Y, 4 = +Z.
    fn octant_bounds(&self, octant: usize) -> BoundingBox {
        let center = self.bounds.center();
        let (lo, hi) = (self.bounds.min(), self.bounds.max());
        let mut min = lo;
        let mut max = center;
        for axis in 0..3 {
            if octant & (1 << axis) != 0 {
                min[axis] = center[axis];
                max[axis] = hi[axis];
            }
        }
        BoundingBox::from_corners_unchecked(min, max)
    }
}

/// Bookkeeping for one inserted object
#[derive(Debug, Clone)]
struct Member {
    bounds: BoundingBox,
    cells: Vec<CellId>,
    /// Insertion sequence; rebuilds reinsert in this order
    order: u64,
}

/// Cell arena slack tolerated per member and depth level before compaction
const COMPACT_FACTOR: usize = 4;

/// Loose spatial index over keyed bounding boxes
#[derive(Debug, Clone)]
pub struct Octree<K> {
    config: OctreeConfig,
    size: Vec3,
    cells: Vec<Cell<K>>,
    members: HashMap<K, Member>,
    next_order: u64,
}

impl<K: Copy + Eq + Hash> Default for Octree<K> {
    fn default() -> Self {
        Self::new(OctreeConfig::default())
    }
}

impl<K: Copy + Eq + Hash> Octree<K> {
    /// Create an empty octree; the root cell is built on first insertion
    ///
    /// Axes of `initial_size` that are not positive and finite fall back to
    /// the default extent.
    pub fn new(config: OctreeConfig) -> Self {
        let size = Self::initial_size(&config);
        Self {
            config,
            size,
            cells: Vec::new(),
            members: HashMap::new(),
            next_order: 0,
        }
    }

    fn initial_size(config: &OctreeConfig) -> Vec3 {
        let fallback = OctreeConfig::default().initial_size;
        let mut size = Vec3::from(config.initial_size);
        for axis in 0..3 {
            if !(size[axis].is_finite() && size[axis] > 0.0) {
                log::warn!(
                    "Octree initial size {:?} is invalid on axis {axis}; using {}",
                    config.initial_size,
                    fallback[axis]
                );
                size[axis] = fallback[axis];
            }
        }
        size
    }

    /// Current full extent of the root cell
    pub const fn size(&self) -> Vec3 {
        self.size
    }

    /// Maximum subdivision depth
    pub const fn max_depth(&self) -> u32 {
        self.config.max_depth
    }

    /// Bounds of the root cell
    pub fn bounds(&self) -> BoundingBox {
        let half = self.size * 0.5;
        BoundingBox::from_corners_unchecked(-half, half)
    }

    /// Number of members
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// True when there are no members
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Check membership
    pub fn contains(&self, key: &K) -> bool {
        self.members.contains_key(key)
    }

    /// The box a member was last inserted with
    pub fn member_bounds(&self, key: &K) -> Option<BoundingBox> {
        self.members.get(key).map(|member| member.bounds)
    }

    /// Number of allocated cells
    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    /// Number of cells currently holding a member
    pub fn membership_count(&self, key: &K) -> usize {
        self.members.get(key).map_or(0, |member| member.cells.len())
    }

    /// Deepest cell depth a member is stored at
    pub fn depth_of(&self, key: &K) -> Option<u32> {
        self.members
            .get(key)
            .and_then(|member| member.cells.iter().map(|cell| self.cells[cell.0].depth).max())
    }

    /// Add an object
    ///
    /// Returns `Ok(false)` without touching the tree if the key is already a
    /// member. Grows and rebuilds the tree when the box escapes the root.
    pub fn add(&mut self, key: K, bounds: BoundingBox) -> Result<bool, OctreeError> {
        Self::validate(&bounds)?;
        if self.members.contains_key(&key) {
            return Ok(false);
        }

        self.members.insert(
            key,
            Member {
                bounds,
                cells: Vec::new(),
                order: self.next_order,
            },
        );
        self.next_order += 1;

        if self.grow_to_fit(&bounds) {
            self.rebuild();
        } else {
            self.insert(key, bounds);
        }
        Ok(true)
    }

    /// Remove an object from every cell it was recorded in
    ///
    /// Returns `false` if the key was not a member.
    pub fn remove(&mut self, key: &K) -> bool {
        let Some(member) = self.members.remove(key) else {
            return false;
        };
        self.detach(key, &member.cells);
        self.compact_if_sparse();
        true
    }

    /// Replace an object's box: detach everywhere, then reinsert once
    pub fn update(&mut self, key: K, bounds: BoundingBox) -> Result<(), OctreeError> {
        Self::validate(&bounds)?;
        let cells = match self.members.get_mut(&key) {
            Some(member) => {
                member.bounds = bounds;
                std::mem::take(&mut member.cells)
            }
            None => return Err(OctreeError::NotAMember),
        };
        self.detach(&key, &cells);

        if self.grow_to_fit(&bounds) {
            self.rebuild();
        } else {
            self.insert(key, bounds);
            self.compact_if_sparse();
        }
        Ok(())
    }

    /// Remove every member and reset the root size
    pub fn clear(&mut self) {
        self.cells.clear();
        self.members.clear();
        self.size = Self::initial_size(&self.config);
    }

    /// Collect every member whose box intersects `region`
    ///
    /// Objects stored in several cells appear once per cell.
    pub fn query(&self, region: &BoundingBox, results: &mut Vec<K>) {
        self.query_with(|bounds| bounds.intersects(region), results);
    }

    /// Collect every member whose box passes `predicate`
    ///
    /// Subtrees whose cell bounds fail the predicate are pruned, so the
    /// predicate must accept any box containing an accepted box.
    pub fn query_with<F>(&self, predicate: F, results: &mut Vec<K>)
    where
        F: Fn(&BoundingBox) -> bool,
    {
        if self.cells.is_empty() {
            return;
        }

        let mut stack = vec![CellId(0)];
        while let Some(id) = stack.pop() {
            let cell = &self.cells[id.0];
            if !predicate(&cell.bounds) {
                continue;
            }
            results.extend(
                cell.objects
                    .iter()
                    .filter(|(_, bounds)| predicate(bounds))
                    .map(|(key, _)| *key),
            );
            stack.extend(cell.children.iter().rev().flatten());
        }
    }

    /// Set-deduplicated variant of [`Octree::query`]
    pub fn query_unique(&self, region: &BoundingBox) -> HashSet<K> {
        let mut results = Vec::new();
        self.query(region, &mut results);
        results.into_iter().collect()
    }

    fn validate(bounds: &BoundingBox) -> Result<(), OctreeError> {
        if bounds.is_finite() {
            Ok(())
        } else {
            Err(BoundsError::InvalidValue(format!("{bounds:?}")).into())
        }
    }

    /// Double the root along exceeded axes until `bounds` fits
    ///
    /// Returns true when the size changed.
    fn grow_to_fit(&mut self, bounds: &BoundingBox) -> bool {
        let mut grown = false;
        while !self.bounds().contains_box(bounds) {
            let half = self.size * 0.5;
            for axis in 0..3 {
                if bounds.min()[axis] < -half[axis] || bounds.max()[axis] > half[axis] {
                    let reach = bounds.min()[axis].abs().max(bounds.max()[axis].abs());
                    // Doubling alone never escapes a zero extent
                    self.size[axis] = (self.size[axis] * 2.0).max(2.0 * reach);
                }
            }
            grown = true;
        }

        if grown {
            log::info!(
                "Octree grown to {:.1} x {:.1} x {:.1}; rebuilding {} members",
                self.size.x,
                self.size.y,
                self.size.z,
                self.members.len()
            );
        }
        grown
    }

    /// Drop all cells and reinsert every member, oldest first, from a fresh root
    fn rebuild(&mut self) {
        self.cells.clear();
        let mut pending: Vec<(u64, K, BoundingBox)> = self
            .members
            .iter_mut()
            .map(|(key, member)| {
                member.cells.clear();
                (member.order, *key, member.bounds)
            })
            .collect();
        pending.sort_unstable_by_key(|(order, _, _)| *order);
        for (_, key, bounds) in pending {
            self.insert(key, bounds);
        }
    }

    /// Rebuild when emptied cells dominate the arena
    ///
    /// Cells are never freed individually, so moving members leave empty
    /// branches behind.
    fn compact_if_sparse(&mut self) {
        let depth_levels = self.config.max_depth as usize + 1;
        let budget = COMPACT_FACTOR * (self.members.len() + 1) * depth_levels;
        if self.cells.len() > budget {
            log::trace!("Compacting octree: {} cells for {} members", self.cells.len(), self.members.len());
            self.rebuild();
        }
    }

    fn root(&mut self) -> CellId {
        if self.cells.is_empty() {
            let bounds = self.bounds();
            self.cells.push(Cell::new(bounds, 0));
        }
        CellId(0)
    }

    fn insert(&mut self, key: K, bounds: BoundingBox) {
        let root = self.root();
        let mut placed = Vec::new();
        self.insert_into(root, key, &bounds, &mut placed);
        if let Some(member) = self.members.get_mut(&key) {
            member.cells = placed;
        }
    }

    fn insert_into(&mut self, id: CellId, key: K, bounds: &BoundingBox, placed: &mut Vec<CellId>) {
        let depth = self.cells[id.0].depth;
        let mut pushed_down = false;

        if depth < self.config.max_depth {
            for octant in 0..8 {
                let octant_bounds = self.cells[id.0].octant_bounds(octant);
                if !octant_bounds.contains_box(bounds) {
                    continue;
                }
                let child = match self.cells[id.0].children[octant] {
                    Some(child) => child,
                    None => {
                        let child = CellId(self.cells.len());
                        self.cells.push(Cell::new(octant_bounds, depth + 1));
                        self.cells[id.0].children[octant] = Some(child);
                        child
                    }
                };
                self.insert_into(child, key, bounds, placed);
                pushed_down = true;
            }
        }

        if !pushed_down {
            self.cells[id.0].objects.push((key, *bounds));
            placed.push(id);
        }
    }

    fn detach(&mut self, key: &K, cells: &[CellId]) {
        for cell in cells {
            self.cells[cell.0].objects.retain(|(member, _)| member != key);
        }
    }
}
