//! Grid layout constants for tiles and generation sample caches.
//!
//! A tile covers `TILE_CELLS`³ cells at its own level. Stored tiles carry one
//! extra cell layer on every side (the halo) so that mesh extraction never has
//! to fetch data from a neighboring tile:
//!
//! ```text
//! cell index:  -1    0    1   ...   14   15   16
//!               │    └── 16 owned cells ──┘    │
//!               └─ halo                 halo ──┘
//! ```
//!
//! Generation sample caches are one sample wider still (`CACHE_MARGIN`) so
//! that central-difference gradients at halo-cell corners stay in bounds.
//!
//! All padded grids are laid out x-major, y-middle, z-minor, matching the
//! enumeration order of [`TilePos::all_positions_in_bb`].
//!
//! [`TilePos::all_positions_in_bb`]: crate::tile_pos::TilePos::all_positions_in_bb

/// Cells per tile axis.
pub const TILE_CELLS: usize = 16;

/// Exclusive upper bound on tile levels.
pub const MAX_LEVELS: u8 = 32;

/// Cells per axis in a stored tile, including the one-cell halo.
pub const CELLS_PADDED: usize = TILE_CELLS + 2;

/// Padded cells squared.
pub const CELLS_PADDED_SQ: usize = CELLS_PADDED * CELLS_PADDED;

/// Total padded cells in a volumetric tile.
pub const CELLS_PADDED_CB: usize = CELLS_PADDED * CELLS_PADDED * CELLS_PADDED;

/// Lowest valid padded cell coordinate.
pub const CELL_MIN: i32 = -1;

/// Highest valid padded cell coordinate.
pub const CELL_MAX: i32 = TILE_CELLS as i32;

/// Extra sample margin around the halo cells for gradient estimation.
pub const CACHE_MARGIN: i32 = 1;

/// Lowest valid sample cache coordinate.
pub const CACHE_MIN: i32 = CELL_MIN - CACHE_MARGIN;

/// Highest valid sample cache coordinate (halo cell corners need `CELL_MAX + 1`).
pub const CACHE_MAX: i32 = CELL_MAX + 1 + CACHE_MARGIN;

/// Samples per axis in a generation sample cache.
pub const CACHE_SIZE: usize = (CACHE_MAX - CACHE_MIN + 1) as usize;

/// Total samples in a volumetric sample cache.
pub const CACHE_CB: usize = CACHE_SIZE * CACHE_SIZE * CACHE_SIZE;

/// Linear index into a padded cell grid. Coordinates must lie in
/// `[CELL_MIN, CELL_MAX]`.
#[inline(always)]
pub const fn cell_index(x: i32, y: i32, z: i32) -> usize {
  debug_assert!(x >= CELL_MIN && x <= CELL_MAX);
  debug_assert!(y >= CELL_MIN && y <= CELL_MAX);
  debug_assert!(z >= CELL_MIN && z <= CELL_MAX);
  ((x - CELL_MIN) as usize * CELLS_PADDED + (y - CELL_MIN) as usize) * CELLS_PADDED
    + (z - CELL_MIN) as usize
}

/// Linear index into a padded column grid (heightmap tiles). Coordinates must
/// lie in `[CELL_MIN, CELL_MAX]`.
#[inline(always)]
pub const fn column_index(x: i32, z: i32) -> usize {
  debug_assert!(x >= CELL_MIN && x <= CELL_MAX);
  debug_assert!(z >= CELL_MIN && z <= CELL_MAX);
  (x - CELL_MIN) as usize * CELLS_PADDED + (z - CELL_MIN) as usize
}

/// Linear index into a sample cache. Coordinates must lie in
/// `[CACHE_MIN, CACHE_MAX]`.
#[inline(always)]
pub const fn cache_index(x: i32, y: i32, z: i32) -> usize {
  debug_assert!(x >= CACHE_MIN && x <= CACHE_MAX);
  debug_assert!(y >= CACHE_MIN && y <= CACHE_MAX);
  debug_assert!(z >= CACHE_MIN && z <= CACHE_MAX);
  ((x - CACHE_MIN) as usize * CACHE_SIZE + (y - CACHE_MIN) as usize) * CACHE_SIZE
    + (z - CACHE_MIN) as usize
}

#[cfg(test)]
#[path = "constants_test.rs"]
mod constants_test;
