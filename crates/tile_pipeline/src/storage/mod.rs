//! Tile storage: per-position handles, dirty tracking, and lifecycle.
//!
//! Storage never blocks readers on writers for long: a read clones the
//! current snapshot under a short lock, and a write replaces the snapshot
//! only when it carries a greater timestamp than the stored one. Concurrent
//! writers therefore converge on the newest content no matter which task
//! finishes last.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, RwLock};

use tracing::debug;

use crate::error::PipelineError;
use crate::kind::TileKind;
use crate::tile::{TileSnapshot, Timestamp};
use crate::tile_pos::TilePos;

/// Optional write-through persistence. Saves happen on the writer's thread
/// while the storage lifecycle still counts the write as in flight, so
/// [`TileStorage::close`] drains them too.
pub trait PersistenceSink<K: TileKind>: Send + Sync + 'static {
  fn save(&self, snapshot: &TileSnapshot<K>) -> std::io::Result<()>;

  fn flush(&self) -> std::io::Result<()> {
    Ok(())
  }
}

// ============================================================================
// per-position handle
// ============================================================================

/// One position's storage slot. Handles are created on first touch and
/// shared by everything that reads or writes the position.
pub struct TileHandle<K: TileKind> {
  pos: TilePos,
  slot: RwLock<Option<TileSnapshot<K>>>,
}

impl<K: TileKind> TileHandle<K> {
  fn new(pos: TilePos) -> Self {
    Self {
      pos,
      slot: RwLock::new(None),
    }
  }

  pub fn pos(&self) -> TilePos {
    self.pos
  }

  /// Clones the current snapshot, if any.
  pub fn snapshot(&self) -> Option<TileSnapshot<K>> {
    self
      .slot
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .clone()
  }

  /// Timestamp of the stored content, [`Timestamp::BLANK`] when empty.
  pub fn timestamp(&self) -> Timestamp {
    self
      .slot
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .as_ref()
      .map_or(Timestamp::BLANK, |s| s.timestamp)
  }

  /// Stores `snapshot` if it is newer than the current content. Returns
  /// whether the write took effect.
  fn store_if_newer(&self, snapshot: TileSnapshot<K>) -> bool {
    let mut slot = self.slot.write().unwrap_or_else(PoisonError::into_inner);
    let current = slot.as_ref().map_or(Timestamp::BLANK, |s| s.timestamp);
    if snapshot.timestamp <= current {
      return false;
    }
    *slot = Some(snapshot);
    true
  }
}

// ============================================================================
// dirty tracking
// ============================================================================

/// Tracks which positions have pending world edits, keyed by the timestamp
/// of the newest edit touching them.
///
/// Marking keeps the greatest timestamp seen; clearing succeeds only when
/// the tracked timestamp is covered by the write that cleared it, so an edit
/// racing a regeneration is never lost.
#[derive(Default)]
pub struct DirtyTracker {
  map: RwLock<HashMap<TilePos, Arc<AtomicI64>>>,
}

const CLEAN: i64 = i64::MIN;

impl DirtyTracker {
  pub fn new() -> Self {
    Self::default()
  }

  /// Marks `pos` dirty as of `ts`. Concurrent marks converge on the max.
  pub fn mark(&self, pos: TilePos, ts: Timestamp) {
    {
      let map = self.map.read().unwrap_or_else(PoisonError::into_inner);
      if let Some(cell) = map.get(&pos) {
        cell.fetch_max(ts.0, Ordering::AcqRel);
        return;
      }
    }
    let mut map = self.map.write().unwrap_or_else(PoisonError::into_inner);
    map
      .entry(pos)
      .or_insert_with(|| Arc::new(AtomicI64::new(CLEAN)))
      .fetch_max(ts.0, Ordering::AcqRel);
  }

  /// Dirty timestamp of `pos`, if it is dirty.
  pub fn get(&self, pos: TilePos) -> Option<Timestamp> {
    let map = self.map.read().unwrap_or_else(PoisonError::into_inner);
    let value = map.get(&pos)?.load(Ordering::Acquire);
    (value != CLEAN).then_some(Timestamp(value))
  }

  /// Clears the mark on `pos` if a write at `ts` covers it. A mark newer
  /// than the write stays.
  pub fn clear_up_to(&self, pos: TilePos, ts: Timestamp) -> bool {
    let cell = {
      let map = self.map.read().unwrap_or_else(PoisonError::into_inner);
      match map.get(&pos) {
        Some(cell) => Arc::clone(cell),
        None => return false,
      }
    };
    let mut current = cell.load(Ordering::Acquire);
    loop {
      if current == CLEAN || current > ts.0 {
        return false;
      }
      match cell.compare_exchange(current, CLEAN, Ordering::AcqRel, Ordering::Acquire) {
        Ok(_) => break,
        Err(observed) => current = observed,
      }
    }
    // Reclaim the entry unless someone re-marked it in the meantime.
    let mut map = self.map.write().unwrap_or_else(PoisonError::into_inner);
    if let Some(cell) = map.get(&pos) {
      if cell.load(Ordering::Acquire) == CLEAN {
        map.remove(&pos);
      }
    }
    true
  }

  /// Visits every dirty position. Iterates over a snapshot of the map, so
  /// the callback may mark and clear freely.
  pub fn for_each_dirty(&self, mut f: impl FnMut(TilePos, Timestamp)) {
    let entries: Vec<(TilePos, Arc<AtomicI64>)> = {
      let map = self.map.read().unwrap_or_else(PoisonError::into_inner);
      map.iter().map(|(p, c)| (*p, Arc::clone(c))).collect()
    };
    for (pos, cell) in entries {
      let value = cell.load(Ordering::Acquire);
      if value != CLEAN {
        f(pos, Timestamp(value));
      }
    }
  }
}

// ============================================================================
// storage
// ============================================================================

struct Lifecycle {
  closed: bool,
  in_flight: usize,
}

pub struct TileStorage<K: TileKind> {
  handles: RwLock<HashMap<TilePos, Arc<TileHandle<K>>>>,
  dirty: DirtyTracker,
  lifecycle: Mutex<Lifecycle>,
  drained: Condvar,
  sink: Option<Box<dyn PersistenceSink<K>>>,
}

impl<K: TileKind> Default for TileStorage<K> {
  fn default() -> Self {
    Self::new()
  }
}

impl<K: TileKind> TileStorage<K> {
  pub fn new() -> Self {
    Self::with_sink(None)
  }

  pub fn with_sink(sink: Option<Box<dyn PersistenceSink<K>>>) -> Self {
    Self {
      handles: RwLock::new(HashMap::new()),
      dirty: DirtyTracker::new(),
      lifecycle: Mutex::new(Lifecycle {
        closed: false,
        in_flight: 0,
      }),
      drained: Condvar::new(),
      sink,
    }
  }

  pub fn dirty(&self) -> &DirtyTracker {
    &self.dirty
  }

  /// The shared handle for `pos`, creating it on first touch.
  pub fn handle_for(&self, pos: TilePos) -> Arc<TileHandle<K>> {
    {
      let handles = self.handles.read().unwrap_or_else(PoisonError::into_inner);
      if let Some(handle) = handles.get(&pos) {
        return Arc::clone(handle);
      }
    }
    let mut handles = self.handles.write().unwrap_or_else(PoisonError::into_inner);
    Arc::clone(
      handles
        .entry(pos)
        .or_insert_with(|| Arc::new(TileHandle::new(pos))),
    )
  }

  /// Publishes `snapshot` unless older content already superseded it.
  /// Returns whether the write took effect. A successful write clears any
  /// dirty mark the content covers.
  pub fn write(&self, snapshot: TileSnapshot<K>) -> Result<bool, PipelineError> {
    self.begin_write()?;
    let result = self.write_inner(snapshot);
    self.end_write();
    result
  }

  fn write_inner(&self, snapshot: TileSnapshot<K>) -> Result<bool, PipelineError> {
    let pos = snapshot.pos;
    let ts = snapshot.timestamp;
    let handle = self.handle_for(pos);
    let saved = if handle.store_if_newer(snapshot) {
      self.dirty.clear_up_to(pos, ts);
      if let Some(sink) = &self.sink {
        if let Some(current) = handle.snapshot() {
          sink.save(&current)?;
        }
      }
      true
    } else {
      debug!(%pos, %ts, "stale tile write discarded");
      false
    };
    Ok(saved)
  }

  fn begin_write(&self) -> Result<(), PipelineError> {
    let mut lifecycle = self.lock_lifecycle();
    if lifecycle.closed {
      return Err(PipelineError::StorageClosed);
    }
    lifecycle.in_flight += 1;
    Ok(())
  }

  fn end_write(&self) {
    let mut lifecycle = self.lock_lifecycle();
    lifecycle.in_flight -= 1;
    if lifecycle.in_flight == 0 {
      self.drained.notify_all();
    }
  }

  /// Flushes the persistence sink, if any.
  pub fn flush(&self) -> Result<(), PipelineError> {
    if let Some(sink) = &self.sink {
      sink.flush()?;
    }
    Ok(())
  }

  /// Rejects new writes and blocks until in-flight writes drain. Idempotent.
  pub fn close(&self) {
    let mut lifecycle = self.lock_lifecycle();
    lifecycle.closed = true;
    while lifecycle.in_flight > 0 {
      lifecycle = self
        .drained
        .wait(lifecycle)
        .unwrap_or_else(PoisonError::into_inner);
    }
  }

  pub fn is_closed(&self) -> bool {
    self.lock_lifecycle().closed
  }

  fn lock_lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
    self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
  }
}
