//! Tile containers and content timestamps.

use std::sync::Arc;

use crate::kind::TileKind;
use crate::qef::QefSolver;
use crate::tile_pos::TilePos;
use crate::types::MeshOutput;

/// Monotonic world timestamp ordering tile contents.
///
/// Storage keeps whichever content carries the greatest timestamp, so
/// concurrent writers converge on the newest data regardless of completion
/// order.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Timestamp(pub i64);

impl Timestamp {
  /// Nothing has ever been written.
  pub const BLANK: Timestamp = Timestamp(i64::MIN);

  /// Output of rough or scaled generation that tracks no particular world
  /// edit. Real edit timestamps are always positive, so generated content
  /// loses to any edit-driven rewrite.
  pub const GENERATED: Timestamp = Timestamp(0);

  pub const fn is_blank(self) -> bool {
    self.0 == i64::MIN
  }
}

impl std::fmt::Display for Timestamp {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    if self.is_blank() {
      write!(f, "blank")
    } else {
      write!(f, "{}", self.0)
    }
  }
}

/// Mutable tile contents, owned by a single generation task until published.
pub struct Tile<K: TileKind> {
  pub pos: TilePos,
  pub cells: Box<[K::Cell]>,

  /// Set when the content came from rough generation and may disagree with
  /// the authoritative world. Inaccurate tiles are placeholders that a later
  /// exact pass replaces.
  pub inaccurate: bool,
}

// Manual impl: cells are payload-specific and carry no Debug bound.
impl<K: TileKind> std::fmt::Debug for Tile<K> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Tile")
      .field("pos", &self.pos)
      .field("inaccurate", &self.inaccurate)
      .field("cells", &self.cells.len())
      .finish()
  }
}

impl<K: TileKind> Tile<K> {
  pub fn new(pos: TilePos) -> Self {
    Self {
      pos,
      cells: K::new_cells(),
      inaccurate: false,
    }
  }

  pub fn is_empty(&self) -> bool {
    K::is_empty(&self.cells)
  }

  /// Extracts render geometry from this tile's padded payload.
  pub fn extract(&self, solver: &QefSolver, out: &mut MeshOutput) {
    K::extract(&self.cells, solver, out);
  }
}

/// Published, immutable tile content plus the timestamp it carries.
/// Snapshots are cheap to clone and never change after publication.
pub struct TileSnapshot<K: TileKind> {
  pub pos: TilePos,
  pub timestamp: Timestamp,
  pub tile: Arc<Tile<K>>,
}

impl<K: TileKind> Clone for TileSnapshot<K> {
  fn clone(&self) -> Self {
    Self {
      pos: self.pos,
      timestamp: self.timestamp,
      tile: Arc::clone(&self.tile),
    }
  }
}

impl<K: TileKind> std::fmt::Debug for TileSnapshot<K> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("TileSnapshot")
      .field("pos", &self.pos)
      .field("timestamp", &self.timestamp)
      .field("tile", &self.tile)
      .finish()
  }
}

impl<K: TileKind> TileSnapshot<K> {
  pub fn new(tile: Tile<K>, timestamp: Timestamp) -> Self {
    Self {
      pos: tile.pos,
      timestamp,
      tile: Arc::new(tile),
    }
  }
}
