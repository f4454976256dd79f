//! TilePos - immutable octree tile address.
//!
//! A position is an integer level plus integer grid coordinates at that
//! level. A cell at level `L` covers a cube of side `TILE_CELLS << L` world
//! units anchored at `(x, y, z) * TILE_CELLS << L`. Parent/child
//! relationships are pure coordinate math; no tree structure is stored.

use crate::constants::{MAX_LEVELS, TILE_CELLS};

/// Octree tile position - immutable value type.
///
/// Equality and hashing cover all four fields. Ordering is level-major, then
/// x, z, y, which gives batch operations a stable secondary order.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct TilePos {
  pub level: u8,
  pub x: i32,
  pub y: i32,
  pub z: i32,
}

impl TilePos {
  pub const fn new(level: u8, x: i32, y: i32, z: i32) -> Self {
    Self { level, x, y, z }
  }

  /// Whether the level lies in `[0, MAX_LEVELS)`.
  pub const fn is_level_valid(&self) -> bool {
    self.level < MAX_LEVELS
  }

  /// The parent position one level coarser.
  pub fn up(&self) -> Self {
    Self::new(self.level + 1, self.x >> 1, self.y >> 1, self.z >> 1)
  }

  /// The ancestor position at `target_level >= self.level`.
  pub fn up_to(&self, target_level: u8) -> Self {
    debug_assert!(target_level >= self.level);
    let shift = target_level - self.level;
    Self::new(target_level, self.x >> shift, self.y >> shift, self.z >> shift)
  }

  /// The child position one level finer.
  ///
  /// Child index bits: bit 0 = +x, bit 1 = +y, bit 2 = +z. The 8 children of
  /// `(L, x, y, z)` are exactly `(L-1, 2x+{0,1}, 2y+{0,1}, 2z+{0,1})`.
  pub fn down(&self, child: u8) -> Self {
    debug_assert!(self.level > 0, "no children below level 0");
    debug_assert!(child < 8);
    let pos = Self::new(
      self.level - 1,
      self.x * 2 + (child & 1) as i32,
      self.y * 2 + ((child >> 1) & 1) as i32,
      self.z * 2 + ((child >> 2) & 1) as i32,
    );
    debug_assert_eq!(pos.up(), *self, "octree child/parent invariant violated");
    pos
  }

  /// The minimum-corner descendant at `target_level <= self.level`.
  pub fn down_to(&self, target_level: u8) -> Self {
    debug_assert!(target_level <= self.level);
    let shift = self.level - target_level;
    Self::new(
      target_level,
      self.x << shift,
      self.y << shift,
      self.z << shift,
    )
  }

  /// All 8 children, in child-index order.
  pub fn children(&self) -> impl Iterator<Item = TilePos> + Clone {
    let base = *self;
    (0u8..8).map(move |i| base.down(i))
  }

  /// The 6 face-adjacent positions at the same level, in fixed
  /// -x, +x, -y, +y, -z, +z order.
  pub fn neighbors(&self) -> [TilePos; 6] {
    let Self { level, x, y, z } = *self;
    [
      Self::new(level, x - 1, y, z),
      Self::new(level, x + 1, y, z),
      Self::new(level, x, y - 1, z),
      Self::new(level, x, y + 1, z),
      Self::new(level, x, y, z - 1),
      Self::new(level, x, y, z + 1),
    ]
  }

  /// Whether `other` is a strict descendant of this position.
  pub fn contains(&self, other: &TilePos) -> bool {
    if self.level <= other.level {
      return false;
    }
    let d = self.level - other.level;
    other.x >> d == self.x && other.y >> d == self.y && other.z >> d == self.z
  }

  /// Lazy, restartable enumeration of every position at this level within
  /// the inclusive box `[self - offset_min, self + offset_max]`.
  ///
  /// Enumeration order is ascending x-outer, y-middle, z-inner and is
  /// guaranteed stable: batch invalidation relies on it for reproducibility.
  pub fn all_positions_in_bb(
    &self,
    offset_min: u32,
    offset_max: u32,
  ) -> impl Iterator<Item = TilePos> + Clone {
    let level = self.level;
    let (x0, x1) = (self.x - offset_min as i32, self.x + offset_max as i32);
    let (y0, y1) = (self.y - offset_min as i32, self.y + offset_max as i32);
    let (z0, z1) = (self.z - offset_min as i32, self.z + offset_max as i32);
    (x0..=x1).flat_map(move |x| {
      (y0..=y1).flat_map(move |y| (z0..=z1).map(move |z| TilePos::new(level, x, y, z)))
    })
  }

  /// Manhattan distance in grid cells, computed at the coarser of the two
  /// levels and scaled back to a common unit.
  pub fn manhattan_distance(&self, other: &TilePos) -> i64 {
    if self.level == other.level {
      (self.x - other.x).abs() as i64
        + (self.y - other.y).abs() as i64
        + (self.z - other.z).abs() as i64
    } else {
      let s0 = other.level.saturating_sub(self.level) as u32;
      let s1 = self.level.saturating_sub(other.level) as u32;
      let s2 = s0.max(s1);
      ((((self.x >> s0) - (other.x >> s1)).abs() as i64)
        + (((self.y >> s0) - (other.y >> s1)).abs() as i64)
        + (((self.z >> s0) - (other.z >> s1)).abs() as i64))
        << s2
    }
  }

  /// World-space coordinate of the tile's minimum corner.
  pub fn block_min(&self) -> [i64; 3] {
    let side = self.side_length();
    [
      self.x as i64 * side,
      self.y as i64 * side,
      self.z as i64 * side,
    ]
  }

  /// World-space side length of the cube this position covers.
  pub const fn side_length(&self) -> i64 {
    (TILE_CELLS as i64) << self.level
  }

  /// World-space side length of a single cell within this tile.
  pub const fn cell_size(&self) -> i64 {
    1i64 << self.level
  }
}

impl PartialOrd for TilePos {
  fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
    Some(self.cmp(other))
  }
}

impl Ord for TilePos {
  fn cmp(&self, other: &Self) -> std::cmp::Ordering {
    self
      .level
      .cmp(&other.level)
      .then(self.x.cmp(&other.x))
      .then(self.z.cmp(&other.z))
      .then(self.y.cmp(&other.y))
  }
}

impl std::fmt::Display for TilePos {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "[{}: {}, {}, {}]", self.level, self.x, self.y, self.z)
  }
}

#[cfg(test)]
#[path = "tile_pos_test.rs"]
mod tile_pos_test;
