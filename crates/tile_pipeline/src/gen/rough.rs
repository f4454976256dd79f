//! Rough generation from a band-limited field.
//!
//! A rough field answers density queries at any level without touching world
//! data, so rough generation can run for positions whose world regions are
//! not loaded. Unless the field is authoritative, its output is marked
//! inaccurate and gets replaced once exact data becomes available.

use std::sync::Arc;

use glam::DVec3;

use crate::constants::{column_index, CELL_MAX, CELL_MIN, TILE_CELLS};
use crate::gen::{contour_into, SampleCache};
use crate::kind::{HeightColumn, HeightKind, VoxelKind};
use crate::tile::Tile;
use crate::tile_pos::TilePos;
use crate::types::{MaterialId, MATERIAL_AIR};

/// Band-limited field queried by rough generation.
///
/// Implementations must be pure: the same `(level, position)` query always
/// returns the same answer, so regenerating a tile is reproducible.
pub trait RoughField: Send + Sync + 'static {
  /// Signed density at a world position; negative is solid.
  fn density(&self, level: u8, pos: DVec3) -> f64;

  /// Material of the space around a world position.
  fn material(&self, level: u8, pos: DVec3) -> MaterialId;

  /// Terrain surface height and material at a world column.
  fn height(&self, level: u8, x: f64, z: f64) -> (f64, MaterialId);

  /// Whether the field matches the real world exactly. Superflat-style
  /// worlds can answer true and skip the exact pass entirely.
  fn is_authoritative(&self) -> bool {
    false
  }
}

pub struct RoughGenerator<F> {
  field: Arc<F>,
}

impl<F: RoughField> RoughGenerator<F> {
  pub fn new(field: Arc<F>) -> Self {
    Self { field }
  }

  pub fn generate_voxel(&self, pos: TilePos, scratch: &mut SampleCache) -> Tile<VoxelKind> {
    let min = pos.block_min();
    let step = pos.cell_size() as f64;
    let level = pos.level;
    let field = &self.field;
    let mut tile = contour_into(pos, scratch, |x, y, z| {
      let wp = DVec3::new(
        min[0] as f64 + x as f64 * step,
        min[1] as f64 + y as f64 * step,
        min[2] as f64 + z as f64 * step,
      );
      (field.density(level, wp), field.material(level, wp))
    });
    tile.inaccurate = !self.field.is_authoritative();
    tile
  }

  pub fn generate_height(&self, pos: TilePos) -> Tile<HeightKind> {
    let min = pos.block_min();
    let step = pos.cell_size() as f64;
    let mut tile = Tile::new(pos);
    for x in CELL_MIN..=CELL_MAX {
      for z in CELL_MIN..=CELL_MAX {
        let (h, m) = self.field.height(
          pos.level,
          min[0] as f64 + x as f64 * step,
          min[2] as f64 + z as f64 * step,
        );
        tile.cells[column_index(x, z)] = column_for(h, m, min[1] as f64, step);
      }
    }
    tile.inaccurate = !self.field.is_authoritative();
    tile
  }
}

/// Converts a world-space surface height into a tile-local column. Columns
/// whose surface falls outside this tile's vertical slab carry air, so only
/// one slab per column produces geometry.
pub(crate) fn column_for(height: f64, material: MaterialId, min_y: f64, step: f64) -> HeightColumn {
  let local = ((height - min_y) / step) as f32;
  HeightColumn {
    height: local,
    material: if (0.0..TILE_CELLS as f32).contains(&local) {
      material
    } else {
      MATERIAL_AIR
    },
  }
}
