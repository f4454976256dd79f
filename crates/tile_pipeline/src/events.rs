//! Pipeline event stream.
//!
//! Consumers (renderers, replication layers) subscribe to a channel of tile
//! lifecycle events instead of polling storage. Events carry positions and
//! timestamps only; the content is fetched from storage on demand, so a slow
//! consumer never pins tile data.

use crate::kind::ModeId;
use crate::tile::Timestamp;
use crate::tile_pos::TilePos;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TileEvent {
  /// A tile was (re)generated and its snapshot stored.
  Produced {
    mode: ModeId,
    pos: TilePos,
    timestamp: Timestamp,
  },
  /// A world edit made the stored content stale.
  Invalidated {
    mode: ModeId,
    pos: TilePos,
    timestamp: Timestamp,
  },
}

impl TileEvent {
  pub fn pos(&self) -> TilePos {
    match self {
      TileEvent::Produced { pos, .. } | TileEvent::Invalidated { pos, .. } => *pos,
    }
  }

  pub fn timestamp(&self) -> Timestamp {
    match self {
      TileEvent::Produced { timestamp, .. } | TileEvent::Invalidated { timestamp, .. } => {
        *timestamp
      }
    }
  }
}
