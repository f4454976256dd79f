use glam::DVec3;

use super::*;
use crate::kind::{HeightKind, TileKind, VoxelKind};

// Builds the payload a flat surface at `height` produces: every cell in the
// crossing layer owns a crossed vertical edge with the solid side below, and
// accumulates the 4 crossing planes of its own vertical edges.
fn flat_plane_cells(height: f64, material: MaterialId) -> Box<[CellGeom]> {
  let layer = height.floor() as i32;
  let mut cells = VoxelKind::new_cells();
  for x in crate::constants::CELL_MIN..=crate::constants::CELL_MAX {
    for z in crate::constants::CELL_MIN..=crate::constants::CELL_MAX {
      let cell = &mut cells[cell_index(x, layer, z)];
      cell.edge_mask = 0b010;
      cell.edge_solid = 0b010;
      cell.face_material[1] = material;
      for dx in 0..2 {
        for dz in 0..2 {
          cell.qef.add_plane(
            DVec3::new((x + dx) as f64, height, (z + dz) as f64),
            DVec3::Y,
          );
        }
      }
    }
  }
  cells
}

#[test]
fn flat_plane_meshes_to_a_regular_grid() {
  let cells = flat_plane_cells(7.5, 3);
  let mut out = MeshOutput::new();
  extract_voxel(&cells, &QefSolver::default(), &mut out);

  // 16x16 owned crossed edges, each quad touching 4 cells from a 17x17
  // vertex sheet.
  assert_eq!(out.triangle_count(), 16 * 16 * 2);
  assert_eq!(out.vertices.len(), 17 * 17);
  for v in &out.vertices {
    assert!((v.position[1] - 7.5).abs() < 1e-5, "{:?}", v.position);
    assert!(v.normal[1] > 0.99, "normal should face up: {:?}", v.normal);
    assert_eq!(v.material, 3);
  }
  assert!(out.bounds.is_valid());
}

#[test]
fn triangles_face_out_of_the_solid_side() {
  // Solid above the plane instead of below.
  let mut cells = flat_plane_cells(7.5, 3);
  for cell in cells.iter_mut() {
    if cell.edge_mask != 0 {
      cell.edge_solid = 0;
    }
  }
  let mut out = MeshOutput::new();
  extract_voxel(&cells, &QefSolver::default(), &mut out);
  assert_eq!(out.triangle_count(), 16 * 16 * 2);
  for v in &out.vertices {
    assert!(v.normal[1] < -0.99, "normal should face down: {:?}", v.normal);
  }
}

#[test]
fn empty_payload_meshes_to_nothing() {
  let cells = VoxelKind::new_cells();
  let mut out = MeshOutput::new();
  extract_voxel(&cells, &QefSolver::default(), &mut out);
  assert!(out.is_empty());
  assert_eq!(out.triangle_count(), 0);
  assert!(VoxelKind::is_empty(&cells));
}

#[test]
fn halo_edges_are_not_owned() {
  // A crossing confined to the halo layer must not emit geometry here; the
  // neighboring tile owns those edges.
  let mut cells = VoxelKind::new_cells();
  let cell = &mut cells[cell_index(-1, 3, 5)];
  cell.edge_mask = 0b001;
  cell.edge_solid = 0b001;
  cell.qef.add_plane(DVec3::new(-0.5, 3.0, 5.0), DVec3::X);
  let mut out = MeshOutput::new();
  extract_voxel(&cells, &QefSolver::default(), &mut out);
  assert!(out.is_empty());
}

#[test]
fn vertices_are_shared_between_adjacent_quads() {
  let cells = flat_plane_cells(2.25, 1);
  let mut out = MeshOutput::new();
  extract_voxel(&cells, &QefSolver::default(), &mut out);
  // Every index must point at a real vertex, and interior vertices must be
  // referenced by several quads.
  let mut refs = vec![0u32; out.vertices.len()];
  for &i in &out.indices {
    refs[i as usize] += 1;
  }
  assert!(refs.iter().all(|&r| r > 0));
  assert!(refs.iter().any(|&r| r >= 6), "interior vertices are shared");
}

#[test]
fn height_grid_meshes_as_a_watertight_sheet() {
  let mut columns = HeightKind::new_cells();
  for col in columns.iter_mut() {
    *col = HeightColumn {
      height: 3.0,
      material: 2,
    };
  }
  let mut out = MeshOutput::new();
  extract_height(&columns, &mut out);
  assert_eq!(out.triangle_count(), 16 * 16 * 2);
  assert_eq!(out.vertices.len(), 17 * 17);
  for v in &out.vertices {
    assert_eq!(v.position[1], 3.0);
    assert!(v.normal[1] > 0.99);
    assert_eq!(v.material, 2);
  }
}

#[test]
fn air_columns_emit_no_quads() {
  let mut columns = HeightKind::new_cells();
  // One single solid column.
  columns[column_index(4, 9)] = HeightColumn {
    height: 1.5,
    material: 7,
  };
  let mut out = MeshOutput::new();
  extract_height(&columns, &mut out);
  assert_eq!(out.triangle_count(), 2);
  assert_eq!(out.vertices.len(), 4);
  assert!(!HeightKind::is_empty(&columns));
}
