//! Tile content generation.
//!
//! Three ways to produce a tile, in decreasing order of authority:
//!
//! - exact: sampled from live world data, level 0 only ([`exact`])
//! - scale: combined from the 8 covering children ([`scale`])
//! - rough: sampled from a band-limited field at any level ([`rough`])
//!
//! Rough and exact generation share the same pipeline: fill a [`SampleCache`]
//! with density and material samples, then [`accumulate`] classifies every
//! primal edge and scatters the crossing planes into the cells sharing it.

use glam::DVec3;

use crate::constants::{
  cache_index, cell_index, CACHE_CB, CACHE_MAX, CACHE_MIN, CELL_MAX, CELL_MIN,
};
use crate::error::PipelineError;
use crate::kind::{CellGeom, TileKind};
use crate::tile::Tile;
use crate::tile_pos::TilePos;
use crate::types::{material_max, MaterialId, MATERIAL_AIR};

pub mod exact;
pub mod rough;
pub mod scale;

/// Produces tile content for one kind. The worker picks which operation to
/// run based on [`can_generate_exact`](Self::can_generate_exact), so a
/// refusal is known before any task is scheduled.
pub trait TileGenerator<K: TileKind>: Send + Sync + 'static {
  /// Whether exact generation could run for this position right now.
  fn can_generate_exact(&self, pos: TilePos) -> bool;

  /// Whether any authoritative world data exists under this position's
  /// block bounds. Scaling from children only pays off when some
  /// descendant can eventually see real data; everywhere else a single
  /// rough pass serves the position directly.
  fn has_exact_data(&self, pos: TilePos) -> bool;

  /// Possibly inaccurate content from the band-limited field.
  fn generate_rough(&self, pos: TilePos, scratch: &mut SampleCache)
    -> Result<Tile<K>, PipelineError>;

  /// Authoritative content from world data.
  fn generate_exact(&self, pos: TilePos, scratch: &mut SampleCache)
    -> Result<Tile<K>, PipelineError>;
}

// ============================================================================
// sample cache
// ============================================================================

/// Scratch grid of density and material samples covering one tile plus the
/// halo and gradient margins. Owned by the caller and reusable between
/// tiles; generation takes it explicitly instead of stashing one per thread.
pub struct SampleCache {
  density: Box<[f64]>,
  material: Box<[MaterialId]>,
}

impl Default for SampleCache {
  fn default() -> Self {
    Self::new()
  }
}

impl SampleCache {
  pub fn new() -> Self {
    Self {
      density: vec![1.0; CACHE_CB].into_boxed_slice(),
      material: vec![MATERIAL_AIR; CACHE_CB].into_boxed_slice(),
    }
  }

  /// Signed density at a lattice corner; negative is solid.
  #[inline]
  pub fn density(&self, x: i32, y: i32, z: i32) -> f64 {
    self.density[cache_index(x, y, z)]
  }

  #[inline]
  pub fn material(&self, x: i32, y: i32, z: i32) -> MaterialId {
    self.material[cache_index(x, y, z)]
  }

  /// Fills every sample from `f(x, y, z) -> (density, material)` over the
  /// full cache range, in the same x-major order as the index layout.
  pub fn fill_with(&mut self, mut f: impl FnMut(i32, i32, i32) -> (f64, MaterialId)) {
    let mut i = 0;
    for x in CACHE_MIN..=CACHE_MAX {
      for y in CACHE_MIN..=CACHE_MAX {
        for z in CACHE_MIN..=CACHE_MAX {
          let (d, m) = f(x, y, z);
          self.density[i] = d;
          self.material[i] = m;
          i += 1;
        }
      }
    }
  }

  /// Central-difference gradient at a lattice corner. Points from solid
  /// toward air because density grows outward.
  pub fn gradient(&self, x: i32, y: i32, z: i32) -> DVec3 {
    DVec3::new(
      self.density(x + 1, y, z) - self.density(x - 1, y, z),
      self.density(x, y + 1, z) - self.density(x, y - 1, z),
      self.density(x, y, z + 1) - self.density(x, y, z - 1),
    ) * 0.5
  }
}

#[inline]
fn is_solid(density: f64) -> bool {
  density < 0.0
}

// ============================================================================
// dual-contour accumulation
// ============================================================================

/// Classifies every primal edge of the padded grid and accumulates crossing
/// planes into the 4 cells sharing each edge.
///
/// Each cell records its own 3 minimum-corner edges in `edge_mask` and
/// `edge_solid`; the QEF accumulator additionally receives the planes of
/// neighboring cells' edges, so solving it positions the vertex against the
/// full local surface.
pub fn accumulate(cache: &SampleCache, cells: &mut [CellGeom]) {
  for x in CELL_MIN..=CELL_MAX {
    for y in CELL_MIN..=CELL_MAX {
      for z in CELL_MIN..=CELL_MAX {
        for axis in 0..3usize {
          let mut c1 = [x, y, z];
          c1[axis] += 1;
          let d0 = cache.density(x, y, z);
          let d1 = cache.density(c1[0], c1[1], c1[2]);
          let (solid0, solid1) = (is_solid(d0), is_solid(d1));
          if solid0 == solid1 {
            continue;
          }

          let t = d0 / (d0 - d1);
          let corner = DVec3::new(x as f64, y as f64, z as f64);
          let mut point = corner;
          point[axis] += t;
          let normal = cache
            .gradient(x, y, z)
            .lerp(cache.gradient(c1[0], c1[1], c1[2]), t);

          let solid_corner = if solid0 { [x, y, z] } else { c1 };
          let other = if solid0 { c1 } else { [x, y, z] };
          let material = material_max(
            cache.material(solid_corner[0], solid_corner[1], solid_corner[2]),
            cache.material(other[0], other[1], other[2]),
          );

          {
            let cell = &mut cells[cell_index(x, y, z)];
            cell.edge_mask |= 1 << axis;
            if solid0 {
              cell.edge_solid |= 1 << axis;
            }
            cell.face_material[axis] = material;
          }

          // Scatter the plane into all 4 cells sharing this edge.
          let ua = (axis + 1) % 3;
          let va = (axis + 2) % 3;
          for (du, dv) in [(0, 0), (1, 0), (1, 1), (0, 1)] {
            let mut c = [x, y, z];
            c[ua] -= du;
            c[va] -= dv;
            if c[ua] < CELL_MIN || c[va] < CELL_MIN {
              continue;
            }
            cells[cell_index(c[0], c[1], c[2])]
              .qef
              .add_plane(point, normal);
          }
        }
      }
    }
  }
}

/// Runs the sample-and-accumulate pipeline for a volumetric tile at `pos`,
/// querying `sample` at tile-local lattice corners.
pub(crate) fn contour_into<K: TileKind<Cell = CellGeom>>(
  pos: TilePos,
  cache: &mut SampleCache,
  mut sample: impl FnMut(i32, i32, i32) -> (f64, MaterialId),
) -> Tile<K> {
  cache.fill_with(&mut sample);
  let mut tile = Tile::new(pos);
  accumulate(cache, &mut tile.cells);
  tile
}

// ============================================================================
// per-world generator bundle
// ============================================================================

/// Bundles the rough and exact paths for one world and implements
/// [`TileGenerator`] for both kinds.
pub struct WorldGenerators<F, S> {
  pub rough: rough::RoughGenerator<F>,
  pub exact: exact::ExactGenerator<S>,
}

impl<F: rough::RoughField, S: exact::WorldSampler> WorldGenerators<F, S> {
  pub fn new(field: std::sync::Arc<F>, sampler: std::sync::Arc<S>) -> Self {
    Self {
      rough: rough::RoughGenerator::new(field),
      exact: exact::ExactGenerator::new(sampler),
    }
  }
}

impl<F, S> TileGenerator<crate::kind::VoxelKind> for WorldGenerators<F, S>
where
  F: rough::RoughField,
  S: exact::WorldSampler,
{
  fn can_generate_exact(&self, pos: TilePos) -> bool {
    self.exact.can_generate(pos)
  }

  fn has_exact_data(&self, pos: TilePos) -> bool {
    self.exact.any_data_in_bounds(pos)
  }

  fn generate_rough(
    &self,
    pos: TilePos,
    scratch: &mut SampleCache,
  ) -> Result<Tile<crate::kind::VoxelKind>, PipelineError> {
    Ok(self.rough.generate_voxel(pos, scratch))
  }

  fn generate_exact(
    &self,
    pos: TilePos,
    scratch: &mut SampleCache,
  ) -> Result<Tile<crate::kind::VoxelKind>, PipelineError> {
    self.exact.generate_voxel(pos, scratch)
  }
}

impl<F, S> TileGenerator<crate::kind::HeightKind> for WorldGenerators<F, S>
where
  F: rough::RoughField,
  S: exact::WorldSampler,
{
  fn can_generate_exact(&self, pos: TilePos) -> bool {
    self.exact.can_generate(pos)
  }

  fn has_exact_data(&self, pos: TilePos) -> bool {
    self.exact.any_data_in_bounds(pos)
  }

  fn generate_rough(
    &self,
    pos: TilePos,
    _scratch: &mut SampleCache,
  ) -> Result<Tile<crate::kind::HeightKind>, PipelineError> {
    Ok(self.rough.generate_height(pos))
  }

  fn generate_exact(
    &self,
    pos: TilePos,
    _scratch: &mut SampleCache,
  ) -> Result<Tile<crate::kind::HeightKind>, PipelineError> {
    self.exact.generate_height(pos)
  }
}

#[cfg(test)]
#[path = "gen_test.rs"]
mod gen_test;
