use glam::DVec3;

use super::exact::{ExactGenerator, WorldSampler};
use super::rough::{RoughField, RoughGenerator};
use super::*;
use crate::kind::{HeightKind, TileKind, VoxelKind};
use crate::qef::QefSolver;
use crate::types::MeshOutput;

use std::sync::Arc;

// Infinite flat world: solid below `height`, everywhere.
struct FlatField {
  height: f64,
}

impl RoughField for FlatField {
  fn density(&self, _level: u8, pos: DVec3) -> f64 {
    pos.y - self.height
  }

  fn material(&self, _level: u8, _pos: DVec3) -> u16 {
    1
  }

  fn height(&self, _level: u8, _x: f64, _z: f64) -> (f64, u16) {
    (self.height, 1)
  }
}

struct FlatSampler {
  height: f64,
  loaded_radius: i64,
}

impl WorldSampler for FlatSampler {
  fn is_region_available(&self, min: [i64; 3], max: [i64; 3]) -> bool {
    min.iter().chain(max.iter()).all(|c| c.abs() <= self.loaded_radius)
  }

  fn any_data_in_region(&self, min: [i64; 3], max: [i64; 3]) -> bool {
    // Data exists wherever the region overlaps the loaded cube.
    (0..3).all(|i| min[i] <= self.loaded_radius && max[i] >= -self.loaded_radius)
  }

  fn density_at(&self, _x: i64, y: i64, _z: i64) -> f64 {
    y as f64 - self.height
  }

  fn material_at(&self, _x: i64, _y: i64, _z: i64) -> u16 {
    1
  }

  fn height_at(&self, _x: i64, _z: i64) -> (f64, u16) {
    (self.height, 1)
  }
}

fn extract<K: TileKind>(tile: &crate::tile::Tile<K>) -> MeshOutput {
  let mut out = MeshOutput::new();
  tile.extract(&QefSolver::default(), &mut out);
  out
}

#[test]
fn rough_voxel_generation_meshes_a_flat_world() {
  let rough = RoughGenerator::new(Arc::new(FlatField { height: 7.5 }));
  let mut scratch = SampleCache::new();
  let tile = rough.generate_voxel(TilePos::new(0, 0, 0, 0), &mut scratch);
  assert!(tile.inaccurate);
  assert!(!tile.is_empty());

  let out = extract(&tile);
  assert_eq!(out.vertices.len(), 17 * 17);
  assert_eq!(out.triangle_count(), 16 * 16 * 2);
  for v in &out.vertices {
    assert!((v.position[1] - 7.5).abs() < 1e-4, "{:?}", v.position);
    assert!(v.normal[1] > 0.99);
    assert_eq!(v.material, 1);
  }
}

#[test]
fn coarser_levels_see_the_surface_at_halved_local_height() {
  let rough = RoughGenerator::new(Arc::new(FlatField { height: 7.5 }));
  let mut scratch = SampleCache::new();
  // Level 1 tile spans world y [0, 32) with 2-block cells.
  let tile = rough.generate_voxel(TilePos::new(1, 0, 0, 0), &mut scratch);
  let out = extract(&tile);
  assert!(!out.is_empty());
  for v in &out.vertices {
    assert!((v.position[1] - 3.75).abs() < 1e-4, "{:?}", v.position);
  }
}

#[test]
fn tiles_away_from_the_surface_are_empty() {
  let rough = RoughGenerator::new(Arc::new(FlatField { height: 7.5 }));
  let mut scratch = SampleCache::new();
  let above = rough.generate_voxel(TilePos::new(0, 0, 5, 0), &mut scratch);
  assert!(above.is_empty());
  let below = rough.generate_voxel(TilePos::new(0, 0, -5, 0), &mut scratch);
  assert!(below.is_empty());
}

#[test]
fn exact_generation_is_gated_by_level_and_region_availability() {
  let exact = ExactGenerator::new(Arc::new(FlatSampler {
    height: 7.5,
    loaded_radius: 64,
  }));
  assert!(exact.can_generate(TilePos::new(0, 0, 0, 0)));
  assert!(!exact.can_generate(TilePos::new(1, 0, 0, 0)));
  assert!(!exact.can_generate(TilePos::new(0, 100, 0, 0)));

  let mut scratch = SampleCache::new();
  let err = exact
    .generate_voxel(TilePos::new(0, 100, 0, 0), &mut scratch)
    .unwrap_err();
  assert!(matches!(
    err,
    crate::error::PipelineError::GenerationNotAllowed(_)
  ));
}

#[test]
fn data_coverage_is_answered_at_any_level() {
  let exact = ExactGenerator::new(Arc::new(FlatSampler {
    height: 7.5,
    loaded_radius: 64,
  }));
  // A coarse position over the data still reports coverage even though
  // exact generation itself is gated to level 0.
  assert!(exact.any_data_in_bounds(TilePos::new(2, 0, 0, 0)));
  assert!(exact.any_data_in_bounds(TilePos::new(0, 4, 0, 0)));
  // Positions fully outside the world's data report none.
  assert!(!exact.any_data_in_bounds(TilePos::new(0, 100, 0, 0)));
  assert!(!exact.any_data_in_bounds(TilePos::new(2, 100, 0, 0)));
}

#[test]
fn exact_voxel_output_is_authoritative_and_matches_the_world() {
  let exact = ExactGenerator::new(Arc::new(FlatSampler {
    height: 7.5,
    loaded_radius: 64,
  }));
  let mut scratch = SampleCache::new();
  let tile = exact
    .generate_voxel(TilePos::new(0, 0, 0, 0), &mut scratch)
    .unwrap();
  assert!(!tile.inaccurate);
  let out = extract(&tile);
  assert_eq!(out.vertices.len(), 17 * 17);
  for v in &out.vertices {
    assert!((v.position[1] - 7.5).abs() < 1e-4);
  }
}

#[test]
fn height_generation_fills_only_the_slab_containing_the_surface() {
  let rough = RoughGenerator::new(Arc::new(FlatField { height: 7.5 }));
  let surface_slab = rough.generate_height(TilePos::new(0, 0, 0, 0));
  assert!(!surface_slab.is_empty());
  let out = extract(&surface_slab);
  assert_eq!(out.triangle_count(), 16 * 16 * 2);
  for v in &out.vertices {
    assert_eq!(v.position[1], 7.5);
  }

  // The slab above holds no surface, so its columns are air.
  let above = rough.generate_height(TilePos::new(0, 0, 1, 0));
  assert!(above.is_empty());
  assert!(HeightKind::is_empty(&above.cells));
}

#[test]
fn generator_bundle_prefers_exact_where_available() {
  let bundle = WorldGenerators::new(
    Arc::new(FlatField { height: 7.5 }),
    Arc::new(FlatSampler {
      height: 7.5,
      loaded_radius: 64,
    }),
  );
  let voxel: &dyn TileGenerator<VoxelKind> = &bundle;
  assert!(voxel.can_generate_exact(TilePos::new(0, 0, 0, 0)));
  assert!(!voxel.can_generate_exact(TilePos::new(0, 100, 0, 0)));

  let mut scratch = SampleCache::new();
  let exact = voxel
    .generate_exact(TilePos::new(0, 0, 0, 0), &mut scratch)
    .unwrap();
  assert!(!exact.inaccurate);
  let rough = voxel
    .generate_rough(TilePos::new(0, 100, 0, 0), &mut scratch)
    .unwrap();
  assert!(rough.inaccurate);

  let height: &dyn TileGenerator<HeightKind> = &bundle;
  let tile = height
    .generate_exact(TilePos::new(0, 0, 0, 0), &mut scratch)
    .unwrap();
  assert!(!tile.is_empty());
}
