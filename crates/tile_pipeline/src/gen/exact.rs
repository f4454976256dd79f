//! Exact generation from authoritative world data.
//!
//! Exact generation only runs at level 0, where tile cells map one-to-one to
//! world blocks. Whether it can run at all is a capability query answered
//! before scheduling; sampling a region that is not loaded is never allowed
//! to block or to load chunks as a side effect.

use std::sync::Arc;

use crate::constants::{column_index, CACHE_MAX, CACHE_MIN, CELL_MAX, CELL_MIN};
use crate::error::PipelineError;
use crate::gen::rough::column_for;
use crate::gen::{contour_into, SampleCache};
use crate::kind::{HeightKind, VoxelKind};
use crate::tile::Tile;
use crate::tile_pos::TilePos;
use crate::types::MaterialId;

/// Authoritative block access to the live world.
pub trait WorldSampler: Send + Sync + 'static {
  /// Whether the inclusive block region is loaded enough to sample without
  /// side effects.
  fn is_region_available(&self, min: [i64; 3], max: [i64; 3]) -> bool;

  /// Whether any authoritative block data exists inside the inclusive
  /// region at all, loaded or not.
  fn any_data_in_region(&self, min: [i64; 3], max: [i64; 3]) -> bool;

  /// Signed density at an integer block position; negative is solid.
  fn density_at(&self, x: i64, y: i64, z: i64) -> f64;

  fn material_at(&self, x: i64, y: i64, z: i64) -> MaterialId;

  /// Terrain surface height and material at a block column.
  fn height_at(&self, x: i64, z: i64) -> (f64, MaterialId);
}

pub struct ExactGenerator<S> {
  sampler: Arc<S>,
}

impl<S: WorldSampler> ExactGenerator<S> {
  pub fn new(sampler: Arc<S>) -> Self {
    Self { sampler }
  }

  /// Capability query: exact content is possible only at level 0 and only
  /// when the sample region (tile plus halo and gradient margins) is loaded.
  pub fn can_generate(&self, pos: TilePos) -> bool {
    if pos.level != 0 {
      return false;
    }
    let min = pos.block_min();
    self.sampler.is_region_available(
      [
        min[0] + CACHE_MIN as i64,
        min[1] + CACHE_MIN as i64,
        min[2] + CACHE_MIN as i64,
      ],
      [
        min[0] + CACHE_MAX as i64,
        min[1] + CACHE_MAX as i64,
        min[2] + CACHE_MAX as i64,
      ],
    )
  }

  /// Whether any authoritative data lies under the position's block bounds.
  /// Valid at any level; coarse positions fully outside the world's data
  /// have nothing for their children to contribute.
  pub fn any_data_in_bounds(&self, pos: TilePos) -> bool {
    let min = pos.block_min();
    let side = pos.side_length();
    self.sampler.any_data_in_region(
      min,
      [min[0] + side - 1, min[1] + side - 1, min[2] + side - 1],
    )
  }

  pub fn generate_voxel(
    &self,
    pos: TilePos,
    scratch: &mut SampleCache,
  ) -> Result<Tile<VoxelKind>, PipelineError> {
    if !self.can_generate(pos) {
      return Err(PipelineError::GenerationNotAllowed(pos));
    }
    let min = pos.block_min();
    let sampler = &self.sampler;
    let tile = contour_into(pos, scratch, |x, y, z| {
      let (wx, wy, wz) = (min[0] + x as i64, min[1] + y as i64, min[2] + z as i64);
      (sampler.density_at(wx, wy, wz), sampler.material_at(wx, wy, wz))
    });
    Ok(tile)
  }

  pub fn generate_height(&self, pos: TilePos) -> Result<Tile<HeightKind>, PipelineError> {
    if !self.can_generate(pos) {
      return Err(PipelineError::GenerationNotAllowed(pos));
    }
    let min = pos.block_min();
    let mut tile = Tile::new(pos);
    for x in CELL_MIN..=CELL_MAX {
      for z in CELL_MIN..=CELL_MAX {
        let (h, m) = self.sampler.height_at(min[0] + x as i64, min[2] + z as i64);
        tile.cells[column_index(x, z)] = column_for(h, m, min[1] as f64, 1.0);
      }
    }
    Ok(tile)
  }
}
