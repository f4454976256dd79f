//! Mesh extraction from tile payloads.
//!
//! Volumetric tiles are dual contoured: one vertex per cell that touches a
//! crossed edge, one quad per crossed primal edge. A tile owns exactly the
//! edges whose minimum corner lies in its owned cell range, and the one-cell
//! halo supplies the vertices those quads need from beyond the owned range.
//! Two neighboring tiles therefore never emit the same quad and never leave
//! a gap between their meshes.
//!
//! Vertices are emitted lazily: a cell gets a vertex only when the first
//! quad referencing it is built, so homogeneous regions cost nothing.

use glam::{DVec3, Vec3};

use crate::constants::{cell_index, column_index, CELLS_PADDED_CB, CELLS_PADDED_SQ, TILE_CELLS};
use crate::kind::{CellGeom, HeightColumn};
use crate::qef::QefSolver;
use crate::types::{MaterialId, MeshOutput, Vertex, MATERIAL_AIR};

const NO_VERTEX: u32 = u32::MAX;

/// Dual contours a padded volumetric payload.
///
/// Quads are emitted for every crossed edge whose minimum corner cell is
/// owned. Winding follows the `edge_solid` bit so triangles face out of the
/// solid side.
pub fn extract_voxel(cells: &[CellGeom], solver: &QefSolver, out: &mut MeshOutput) {
  debug_assert_eq!(cells.len(), CELLS_PADDED_CB);
  out.clear();
  let mut vertex_of_cell = vec![NO_VERTEX; CELLS_PADDED_CB];

  for x in 0..TILE_CELLS as i32 {
    for y in 0..TILE_CELLS as i32 {
      for z in 0..TILE_CELLS as i32 {
        let cell = &cells[cell_index(x, y, z)];
        if cell.edge_mask == 0 {
          continue;
        }
        for axis in 0..3usize {
          if cell.edge_mask & (1 << axis) == 0 {
            continue;
          }
          // The 4 cells sharing this edge, walking around it.
          let ua = (axis + 1) % 3;
          let va = (axis + 2) % 3;
          let mut quad_cells = [[x, y, z]; 4];
          quad_cells[1][ua] -= 1;
          quad_cells[2][ua] -= 1;
          quad_cells[2][va] -= 1;
          quad_cells[3][va] -= 1;

          let material = cell.face_material[axis];
          let mut idx = [0u32; 4];
          for (slot, qc) in idx.iter_mut().zip(quad_cells) {
            *slot = vertex_for_cell(cells, solver, qc, material, &mut vertex_of_cell, out);
          }

          // Walking c, c-u, c-u-v, c-v circles the edge counter-clockwise
          // seen from +axis. A solid lower corner means the surface faces
          // +axis, which is exactly that order; flip it otherwise.
          let order = if cell.edge_solid & (1 << axis) != 0 {
            [0, 1, 2, 3]
          } else {
            [0, 3, 2, 1]
          };
          out.indices.extend([
            idx[order[0]],
            idx[order[1]],
            idx[order[2]],
            idx[order[0]],
            idx[order[2]],
            idx[order[3]],
          ]);
        }
      }
    }
  }

  finish_normals(out);
}

fn vertex_for_cell(
  cells: &[CellGeom],
  solver: &QefSolver,
  cell: [i32; 3],
  material: MaterialId,
  vertex_of_cell: &mut [u32],
  out: &mut MeshOutput,
) -> u32 {
  let ci = cell_index(cell[0], cell[1], cell[2]);
  if vertex_of_cell[ci] != NO_VERTEX {
    return vertex_of_cell[ci];
  }

  let min = DVec3::new(cell[0] as f64, cell[1] as f64, cell[2] as f64);
  let geom = &cells[ci];
  let pos = if geom.qef.is_empty() {
    // Cell borrowed into a quad without crossing data of its own; this only
    // happens for scaled tiles with missing children. Park the vertex at
    // the cell center.
    min + DVec3::splat(0.5)
  } else {
    solver.solve(&geom.qef, min, min + DVec3::ONE)
  };

  let index = out.vertices.len() as u32;
  let position = [pos.x as f32, pos.y as f32, pos.z as f32];
  out.vertices.push(Vertex {
    position,
    normal: [0.0, 1.0, 0.0],
    material,
  });
  out.bounds.encapsulate(position);
  vertex_of_cell[ci] = index;
  index
}

/// Meshes a padded heightmap payload as a displaced grid.
///
/// One quad per owned column with a non-air material; corner vertices sit at
/// the heights of the 4 surrounding columns, so neighboring quads share
/// vertices and the surface is watertight.
pub fn extract_height(columns: &[HeightColumn], out: &mut MeshOutput) {
  debug_assert_eq!(columns.len(), CELLS_PADDED_SQ);
  out.clear();
  let mut vertex_of_column = vec![NO_VERTEX; CELLS_PADDED_SQ];

  for x in 0..TILE_CELLS as i32 {
    for z in 0..TILE_CELLS as i32 {
      let col = &columns[column_index(x, z)];
      if col.material == MATERIAL_AIR {
        continue;
      }
      let v00 = vertex_for_column(columns, [x, z], &mut vertex_of_column, out);
      let v01 = vertex_for_column(columns, [x, z + 1], &mut vertex_of_column, out);
      let v10 = vertex_for_column(columns, [x + 1, z], &mut vertex_of_column, out);
      let v11 = vertex_for_column(columns, [x + 1, z + 1], &mut vertex_of_column, out);
      out.indices.extend([v00, v01, v10, v10, v01, v11]);
    }
  }

  finish_normals(out);
}

fn vertex_for_column(
  columns: &[HeightColumn],
  column: [i32; 2],
  vertex_of_column: &mut [u32],
  out: &mut MeshOutput,
) -> u32 {
  let ci = column_index(column[0], column[1]);
  if vertex_of_column[ci] != NO_VERTEX {
    return vertex_of_column[ci];
  }
  let col = &columns[ci];
  let index = out.vertices.len() as u32;
  let position = [column[0] as f32, col.height, column[1] as f32];
  out.vertices.push(Vertex {
    position,
    normal: [0.0, 1.0, 0.0],
    material: col.material,
  });
  out.bounds.encapsulate(position);
  vertex_of_column[ci] = index;
  index
}

/// Computes area-weighted vertex normals from the emitted triangles.
fn finish_normals(out: &mut MeshOutput) {
  let mut acc = vec![Vec3::ZERO; out.vertices.len()];
  for tri in out.indices.chunks_exact(3) {
    let a = Vec3::from(out.vertices[tri[0] as usize].position);
    let b = Vec3::from(out.vertices[tri[1] as usize].position);
    let c = Vec3::from(out.vertices[tri[2] as usize].position);
    let n = (b - a).cross(c - a);
    acc[tri[0] as usize] += n;
    acc[tri[1] as usize] += n;
    acc[tri[2] as usize] += n;
  }
  for (vertex, n) in out.vertices.iter_mut().zip(acc) {
    vertex.normal = n.try_normalize().unwrap_or(Vec3::Y).to_array();
  }
}

#[cfg(test)]
#[path = "extract_test.rs"]
mod extract_test;
