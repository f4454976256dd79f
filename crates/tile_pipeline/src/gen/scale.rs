//! Scale-up: combining 8 child tiles one level finer into a parent tile.
//!
//! Both policies are pure functions of the child payloads. Missing children
//! simply contribute nothing, so a parent can be scaled from partial data
//! and refined later when the remaining children exist.

use glam::DVec3;

use crate::constants::{
  cell_index, column_index, CELLS_PADDED_CB, CELLS_PADDED_SQ, CELL_MAX, CELL_MIN, TILE_CELLS,
};
use crate::kind::{CellGeom, HeightColumn};

const T: i32 = TILE_CELLS as i32;

// Splits a coordinate on the doubled child grid into (child octant bit,
// child-local coordinate). Coordinates beyond what the children's padding
// covers resolve to nothing.
#[inline]
fn split(g: i32) -> Option<(usize, i32)> {
  if (CELL_MIN..T).contains(&g) {
    Some((0, g))
  } else if (T..=T + CELL_MAX).contains(&g) {
    Some((1, g - T))
  } else {
    None
  }
}

fn child_cell<'a>(
  children: &[Option<&'a [CellGeom]>; 8],
  g: [i32; 3],
) -> Option<(&'a CellGeom, usize)> {
  let (bx, lx) = split(g[0])?;
  let (by, ly) = split(g[1])?;
  let (bz, lz) = split(g[2])?;
  let child = bx | by << 1 | bz << 2;
  children[child].map(|cells| (&cells[cell_index(lx, ly, lz)], child))
}

/// Scales volumetric payloads by summing QEF accumulators.
///
/// Every parent cell merges the accumulators of the up to 8 child cells it
/// covers, re-expressed in the parent's coordinate frame. A parent edge
/// crosses the surface when exactly one of the two child edges along it
/// crosses; two crossings cancel because the end samples agree again.
pub fn scale_voxel(children: &[Option<&[CellGeom]>; 8], out: &mut [CellGeom]) {
  debug_assert_eq!(out.len(), CELLS_PADDED_CB);
  for x in CELL_MIN..=CELL_MAX {
    for y in CELL_MIN..=CELL_MAX {
      for z in CELL_MIN..=CELL_MAX {
        let mut dst = CellGeom::default();

        for dx in 0..2 {
          for dy in 0..2 {
            for dz in 0..2 {
              let g = [2 * x + dx, 2 * y + dy, 2 * z + dz];
              if let Some((cell, child)) = child_cell(children, g) {
                // Child-local point p maps to (p + 16 * octant) / 2 in the
                // parent's frame.
                let octant = DVec3::new(
                  (child & 1) as f64,
                  (child >> 1 & 1) as f64,
                  (child >> 2 & 1) as f64,
                );
                dst.qef.merge(&cell.qef.transformed(0.5, octant * (T as f64 * 0.5)));
              }
            }
          }
        }

        for axis in 0..3usize {
          let g_low = [2 * x, 2 * y, 2 * z];
          let mut g_high = g_low;
          g_high[axis] += 1;
          let low = child_cell(children, g_low).map(|(c, _)| *c);
          let high = child_cell(children, g_high).map(|(c, _)| *c);
          let bit = 1u8 << axis;
          let low_cross = low.is_some_and(|c| c.edge_mask & bit != 0);
          let high_cross = high.is_some_and(|c| c.edge_mask & bit != 0);
          if low_cross == high_cross {
            continue;
          }
          dst.edge_mask |= bit;
          let source = if low_cross { low } else { high };
          if let Some(src) = source {
            dst.edge_solid |= src.edge_solid & bit;
            dst.face_material[axis] = src.face_material[axis];
          }
        }

        out[cell_index(x, y, z)] = dst;
      }
    }
  }
}

/// Scales column payloads by keeping, per output column, the child column
/// that deviates most from the local 2x2 average. Keeping outliers instead
/// of averaging preserves cliffs and peaks that plain downsampling erodes.
/// Ties keep the first candidate in child-index order, so the result is
/// deterministic.
pub fn scale_height(children: &[Option<&[HeightColumn]>; 8], out: &mut [HeightColumn]) {
  debug_assert_eq!(out.len(), CELLS_PADDED_SQ);
  for x in CELL_MIN..=CELL_MAX {
    for z in CELL_MIN..=CELL_MAX {
      let mut candidates: [Option<HeightColumn>; 4] = [None; 4];
      let mut sum = 0.0f32;
      let mut count = 0u32;
      for (slot, (dx, dz)) in [(0, 0), (1, 0), (0, 1), (1, 1)].into_iter().enumerate() {
        let Some((bx, lx)) = split(2 * x + dx) else {
          continue;
        };
        let Some((bz, lz)) = split(2 * z + dz) else {
          continue;
        };
        // Only the low-y children carry this slab's columns.
        let child = bx | bz << 2;
        if let Some(cols) = children[child] {
          let col = cols[column_index(lx, lz)];
          // Child heights are in child-local cell units; halve into the
          // parent's frame.
          let col = HeightColumn {
            height: col.height * 0.5,
            material: col.material,
          };
          sum += col.height;
          count += 1;
          candidates[slot] = Some(col);
        }
      }

      let mut best: Option<HeightColumn> = None;
      if count > 0 {
        let avg = sum / count as f32;
        let mut best_dev = f32::NEG_INFINITY;
        for col in candidates.into_iter().flatten() {
          let dev = (col.height - avg).abs();
          if dev > best_dev {
            best_dev = dev;
            best = Some(col);
          }
        }
      }
      out[column_index(x, z)] = best.unwrap_or_default();
    }
  }
}

#[cfg(test)]
#[path = "scale_test.rs"]
mod scale_test;
