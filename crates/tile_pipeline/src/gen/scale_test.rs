use glam::DVec3;

use super::*;
use crate::kind::{HeightKind, TileKind, VoxelKind};
use crate::qef::QefSolver;

fn plane_cells(height: f64) -> Box<[CellGeom]> {
  let layer = height.floor() as i32;
  let mut cells = VoxelKind::new_cells();
  for x in CELL_MIN..=CELL_MAX {
    for z in CELL_MIN..=CELL_MAX {
      let cell = &mut cells[cell_index(x, layer, z)];
      cell.edge_mask = 0b010;
      cell.edge_solid = 0b010;
      cell.face_material[1] = 9;
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
fn scaled_plane_lands_at_half_height_in_the_parent() {
  let child = plane_cells(10.5);
  let mut children: [Option<&[CellGeom]>; 8] = [None; 8];
  children[0] = Some(&child);

  let mut out = VoxelKind::new_cells();
  scale_voxel(&children, &mut out);

  // Child crossing layer y=10 halves into parent cell layer y=5, covering
  // the parent's low octant only.
  let cell = &out[cell_index(3, 5, 4)];
  assert_eq!(cell.edge_mask, 0b010);
  assert_eq!(cell.edge_solid, 0b010);
  assert_eq!(cell.face_material[1], 9);
  let min = DVec3::new(3.0, 5.0, 4.0);
  let v = QefSolver::default().solve(&cell.qef, min, min + DVec3::ONE);
  assert!((v.y - 5.25).abs() < 1e-9, "{v:?}");

  // Outside the child's coverage nothing was produced.
  assert_eq!(out[cell_index(3, 6, 4)], CellGeom::default());
  assert_eq!(out[cell_index(12, 5, 4)], CellGeom::default());
}

#[test]
fn double_crossings_cancel_in_the_parent_edge() {
  let mut child = VoxelKind::new_cells();
  for g in [[4, 4, 4], [5, 4, 4]] {
    let cell = &mut child[cell_index(g[0], g[1], g[2])];
    cell.edge_mask = 0b001;
    cell.edge_solid = if g[0] == 4 { 0b001 } else { 0 };
    cell.qef.add_plane(DVec3::new(g[0] as f64 + 0.5, 4.0, 4.0), DVec3::X);
  }
  let mut children: [Option<&[CellGeom]>; 8] = [None; 8];
  children[0] = Some(&child);

  let mut out = VoxelKind::new_cells();
  scale_voxel(&children, &mut out);
  // The samples at both ends of the parent edge agree again.
  assert_eq!(out[cell_index(2, 2, 2)].edge_mask, 0);
  // The geometry still contributed to the parent cell's accumulator.
  assert!(!out[cell_index(2, 2, 2)].qef.is_empty());
}

#[test]
fn missing_children_scale_to_an_empty_tile() {
  let children: [Option<&[CellGeom]>; 8] = [None; 8];
  let mut out = VoxelKind::new_cells();
  scale_voxel(&children, &mut out);
  assert!(VoxelKind::is_empty(&out));
  assert!(out.iter().all(|c| c.qef.is_empty()));
}

fn columns_of(height: f32, material: u16) -> Box<[HeightColumn]> {
  let mut cols = HeightKind::new_cells();
  for col in cols.iter_mut() {
    *col = HeightColumn { height, material };
  }
  cols
}

#[test]
fn height_scaling_keeps_the_most_deviant_column() {
  let mut child = columns_of(8.0, 1);
  // One spiked column among the 2x2 feeding parent column (0, 0).
  child[column_index(1, 1)] = HeightColumn {
    height: 12.0,
    material: 2,
  };
  let mut children: [Option<&[HeightColumn]>; 8] = [None; 8];
  children[0] = Some(&child);

  let mut out = HeightKind::new_cells();
  scale_height(&children, &mut out);
  // Candidates in parent units: 4, 4, 4, 6; average 4.5; the spike wins.
  let col = &out[column_index(0, 0)];
  assert_eq!(col.height, 6.0);
  assert_eq!(col.material, 2);
  // A flat neighborhood just halves.
  assert_eq!(out[column_index(3, 3)].height, 4.0);
}

#[test]
fn height_scaling_tie_breaks_in_candidate_order() {
  let mut child = columns_of(8.0, 1);
  child[column_index(0, 0)].material = 10;
  child[column_index(1, 0)].material = 20;
  child[column_index(0, 1)].material = 30;
  child[column_index(1, 1)].material = 40;
  let mut children: [Option<&[HeightColumn]>; 8] = [None; 8];
  children[0] = Some(&child);

  let mut out = HeightKind::new_cells();
  scale_height(&children, &mut out);
  // All deviations are zero; the first candidate (child dx=0, dz=0) sticks.
  assert_eq!(out[column_index(0, 0)].material, 10);
}

#[test]
fn height_scaling_reads_all_four_low_children() {
  let mut children: [Option<&[HeightColumn]>; 8] = [None; 8];
  let c0 = columns_of(2.0, 1);
  let c1 = columns_of(4.0, 2);
  let c4 = columns_of(6.0, 3);
  let c5 = columns_of(8.0, 4);
  children[0] = Some(&c0);
  children[1] = Some(&c1);
  children[4] = Some(&c4);
  children[5] = Some(&c5);

  let mut out = HeightKind::new_cells();
  scale_height(&children, &mut out);
  assert_eq!(out[column_index(2, 2)].height, 1.0);
  assert_eq!(out[column_index(10, 2)].height, 2.0);
  assert_eq!(out[column_index(2, 10)].height, 3.0);
  assert_eq!(out[column_index(10, 10)].height, 4.0);
}
