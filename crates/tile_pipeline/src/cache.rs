//! Client-side tile cache.
//!
//! Mirrors produced tiles on a consumer (a renderer, or the client end of a
//! replication link) and fans changes out to listeners. Mutation and
//! notification happen under one lock, so a listener added with replay sees
//! every cached tile exactly once and can never miss or double-observe a
//! concurrent receive. Listener callbacks must therefore be quick and must
//! not call back into the cache.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use crate::kind::TileKind;
use crate::tile::TileSnapshot;
use crate::tile_pos::TilePos;

pub trait TileCacheListener<K: TileKind>: Send + Sync {
  fn tile_added(&self, snapshot: &TileSnapshot<K>);
  fn tile_modified(&self, snapshot: &TileSnapshot<K>);
  fn tile_removed(&self, pos: TilePos);
}

struct CacheState<K: TileKind> {
  tiles: HashMap<TilePos, TileSnapshot<K>>,
  listeners: Vec<Arc<dyn TileCacheListener<K>>>,
}

pub struct TileCache<K: TileKind> {
  state: Mutex<CacheState<K>>,
}

impl<K: TileKind> Default for TileCache<K> {
  fn default() -> Self {
    Self::new()
  }
}

impl<K: TileKind> TileCache<K> {
  pub fn new() -> Self {
    Self {
      state: Mutex::new(CacheState {
        tiles: HashMap::new(),
        listeners: Vec::new(),
      }),
    }
  }

  /// Ingests a snapshot, notifying listeners whether it was new or replaced
  /// the cached content. Snapshots older than the cached one are dropped;
  /// an equal-timestamp redelivery (a replication link resending after a
  /// reconnect) replaces the content and notifies again.
  pub fn receive_tile(&self, snapshot: TileSnapshot<K>) {
    let mut state = self.lock_state();
    let state = &mut *state;
    match state.tiles.get(&snapshot.pos) {
      Some(existing) if existing.timestamp > snapshot.timestamp => {}
      Some(_) => {
        state.tiles.insert(snapshot.pos, snapshot.clone());
        for listener in &state.listeners {
          listener.tile_modified(&snapshot);
        }
      }
      None => {
        state.tiles.insert(snapshot.pos, snapshot.clone());
        for listener in &state.listeners {
          listener.tile_added(&snapshot);
        }
      }
    }
  }

  /// Drops the cached tile at `pos`. Returns whether one was present.
  pub fn unload_tile(&self, pos: TilePos) -> bool {
    let mut state = self.lock_state();
    let state = &mut *state;
    if state.tiles.remove(&pos).is_none() {
      return false;
    }
    for listener in &state.listeners {
      listener.tile_removed(pos);
    }
    true
  }

  pub fn get(&self, pos: TilePos) -> Option<TileSnapshot<K>> {
    self.lock_state().tiles.get(&pos).cloned()
  }

  /// Snapshots for a batch of positions, read under one lock so the batch is
  /// mutually consistent.
  pub fn get_many(&self, positions: &[TilePos]) -> Vec<Option<TileSnapshot<K>>> {
    let state = self.lock_state();
    positions
      .iter()
      .map(|pos| state.tiles.get(pos).cloned())
      .collect()
  }

  /// Every cached position, in stable order.
  pub fn positions(&self) -> Vec<TilePos> {
    let mut positions: Vec<TilePos> = self.lock_state().tiles.keys().copied().collect();
    positions.sort();
    positions
  }

  pub fn len(&self) -> usize {
    self.lock_state().tiles.len()
  }

  pub fn is_empty(&self) -> bool {
    self.lock_state().tiles.is_empty()
  }

  /// Registers a listener. With `replay_existing`, every cached tile is
  /// reported through `tile_added` before the call returns; receives landing
  /// after the call are seen as usual, with nothing missed in between.
  pub fn add_listener(&self, listener: Arc<dyn TileCacheListener<K>>, replay_existing: bool) {
    let mut state = self.lock_state();
    if replay_existing {
      for snapshot in state.tiles.values() {
        listener.tile_added(snapshot);
      }
    }
    state.listeners.push(listener);
  }

  /// Unregisters a previously added listener. Returns whether it was found.
  pub fn remove_listener(&self, listener: &Arc<dyn TileCacheListener<K>>) -> bool {
    let mut state = self.lock_state();
    let before = state.listeners.len();
    state.listeners.retain(|l| !Arc::ptr_eq(l, listener));
    state.listeners.len() != before
  }

  fn lock_state(&self) -> std::sync::MutexGuard<'_, CacheState<K>> {
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }
}

#[cfg(test)]
#[path = "cache_test.rs"]
mod cache_test;
