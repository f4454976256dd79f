//! Tile kinds: the payload-specific behavior behind one generic pipeline.
//!
//! Everything above this module (scheduler, storage, worker, provider) is
//! generic over [`TileKind`] and compiled twice, once per kind. The two kinds
//! share the same position type and the same padded-grid conventions; only
//! the per-cell payload, the scale-up policy, and mesh extraction differ.

use crate::constants::{CELLS_PADDED_CB, CELLS_PADDED_SQ};
use crate::mesher;
use crate::qef::{QefData, QefSolver};
use crate::types::{MaterialId, MeshOutput, MATERIAL_AIR};

/// Identifies a tile kind at runtime, for event routing and storage keys.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum ModeId {
  Voxel,
  Height,
}

/// A tile payload family.
pub trait TileKind: Sized + Send + Sync + 'static {
  /// Per-cell payload stored in a padded grid.
  type Cell: Clone + Copy + Default + PartialEq + Send + Sync + 'static;

  const NAME: &'static str;
  const MODE: ModeId;

  /// Cells in one padded payload.
  const CELL_COUNT: usize;

  /// Child indices consulted by [`scale`](Self::scale). Volumes use all 8;
  /// column payloads only see the 4 low-y children.
  const SCALE_CHILDREN: &'static [u8];

  fn new_cells() -> Box<[Self::Cell]> {
    vec![Self::Cell::default(); Self::CELL_COUNT].into_boxed_slice()
  }

  /// Combines child payloads one level finer into `out`. Child slots follow
  /// the child index bit layout; a `None` slot means the child tile does not
  /// exist yet and contributes nothing.
  fn scale(children: &[Option<&[Self::Cell]>; 8], out: &mut [Self::Cell]);

  /// Extracts render geometry from a padded payload into `out`. Vertex
  /// positions are in tile-local cell units.
  fn extract(cells: &[Self::Cell], solver: &QefSolver, out: &mut MeshOutput);

  /// Whether the payload would extract to an empty mesh.
  fn is_empty(cells: &[Self::Cell]) -> bool;
}

// ============================================================================
// voxel
// ============================================================================

/// Per-cell geometry for volumetric tiles.
///
/// Each cell owns the 3 primal edges leaving its minimum corner along +x, +y,
/// +z. `edge_mask` bit `a` is set when edge `a` crosses the surface;
/// `edge_solid` bit `a` records whether the lower corner of that edge is
/// inside the surface, which fixes the quad winding. The QEF accumulator
/// holds every crossing plane sampled within the cell.
#[derive(Clone, Copy, Default, PartialEq, Debug)]
pub struct CellGeom {
  pub qef: QefData,
  pub edge_mask: u8,
  pub edge_solid: u8,
  pub face_material: [MaterialId; 3],
}

impl CellGeom {
  pub const fn has_geometry(&self) -> bool {
    self.edge_mask != 0 || !self.qef.is_empty()
  }
}

/// Volumetric dual-contoured tiles.
pub struct VoxelKind;

impl TileKind for VoxelKind {
  type Cell = CellGeom;

  const NAME: &'static str = "voxel";
  const MODE: ModeId = ModeId::Voxel;
  const CELL_COUNT: usize = CELLS_PADDED_CB;
  const SCALE_CHILDREN: &'static [u8] = &[0, 1, 2, 3, 4, 5, 6, 7];

  fn scale(children: &[Option<&[CellGeom]>; 8], out: &mut [CellGeom]) {
    crate::gen::scale::scale_voxel(children, out);
  }

  fn extract(cells: &[CellGeom], solver: &QefSolver, out: &mut MeshOutput) {
    mesher::extract_voxel(cells, solver, out);
  }

  fn is_empty(cells: &[CellGeom]) -> bool {
    cells.iter().all(|c| c.edge_mask == 0)
  }
}

// ============================================================================
// height
// ============================================================================

/// Per-column payload for heightmap tiles. The height is in tile-local cell
/// units at the column's own level.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct HeightColumn {
  pub height: f32,
  pub material: MaterialId,
}

impl Default for HeightColumn {
  fn default() -> Self {
    Self {
      height: 0.0,
      material: MATERIAL_AIR,
    }
  }
}

/// 2.5D heightmap tiles. Uses the same position type as volumes; the y
/// coordinate selects a vertical slab and only the bottom slab of each
/// parent has column data, so scaling consults the 4 low-y children.
pub struct HeightKind;

impl TileKind for HeightKind {
  type Cell = HeightColumn;

  const NAME: &'static str = "height";
  const MODE: ModeId = ModeId::Height;
  const CELL_COUNT: usize = CELLS_PADDED_SQ;
  const SCALE_CHILDREN: &'static [u8] = &[0, 1, 4, 5];

  fn scale(children: &[Option<&[HeightColumn]>; 8], out: &mut [HeightColumn]) {
    crate::gen::scale::scale_height(children, out);
  }

  fn extract(cells: &[HeightColumn], solver: &QefSolver, out: &mut MeshOutput) {
    let _ = solver;
    mesher::extract_height(cells, out);
  }

  fn is_empty(cells: &[HeightColumn]) -> bool {
    cells.iter().all(|c| c.material == MATERIAL_AIR)
  }
}
