//! Tile provider: the public face of the pipeline.
//!
//! A provider owns the storage, the scheduler, and the generator bundle for
//! one tile kind, and exposes the operations consumers actually perform:
//! requesting tiles, recording world edits, and draining the event stream.
//! World edits advance a shared monotonic timestamp; every affected position
//! at every level is marked dirty under it, so regeneration can prove it
//! caught up by writing content stamped at least that new.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crossbeam_channel::{bounded, Receiver, Sender};
use tracing::debug;

use crate::config::{PipelineConfig, PromotionPolicy};
use crate::constants::{CACHE_MAX, CACHE_MIN, MAX_LEVELS, TILE_CELLS};
use crate::error::PipelineError;
use crate::events::TileEvent;
use crate::gen::TileGenerator;
use crate::kind::TileKind;
use crate::owner::{owner_channel, OwnerExecutor, OwnerRunner};
use crate::scheduler::Scheduler;
use crate::storage::{PersistenceSink, TileStorage};
use crate::tile::Timestamp;
use crate::tile_pos::TilePos;
use crate::worker::{TaskStage, TileTaskHandle, TileWorker};

/// Events queue up until a consumer drains [`TileProvider::events`]; past
/// this many buffered events the oldest consumers would never catch up
/// anyway, so further sends are dropped instead of blocking producers.
const EVENT_QUEUE_CAPACITY: usize = 4096;

pub struct TileProvider<K: TileKind> {
  config: PipelineConfig,
  storage: Arc<TileStorage<K>>,
  worker: TileWorker<K>,
  clock: Arc<AtomicI64>,
  events_tx: Sender<TileEvent>,
  events_rx: Receiver<TileEvent>,
  owner: OwnerExecutor,
  /// Handles of eagerly promoted updates. Dropping a handle cancels an
  /// unstarted task, so these are retained until they complete.
  pending: Mutex<Vec<TileTaskHandle<K>>>,
}

impl<K: TileKind> TileProvider<K> {
  pub fn new(
    config: PipelineConfig,
    generator: Arc<dyn TileGenerator<K>>,
  ) -> (Self, OwnerRunner) {
    Self::with_sink(config, generator, None)
  }

  pub fn with_sink(
    config: PipelineConfig,
    generator: Arc<dyn TileGenerator<K>>,
    sink: Option<Box<dyn PersistenceSink<K>>>,
  ) -> (Self, OwnerRunner) {
    let storage = Arc::new(TileStorage::with_sink(sink));
    let clock = Arc::new(AtomicI64::new(0));
    let (events_tx, events_rx) = bounded(EVENT_QUEUE_CAPACITY);
    let (owner, runner) = owner_channel();
    let worker = TileWorker::new(
      Arc::clone(&storage),
      generator,
      Scheduler::new(config.parallelism),
      Arc::clone(&clock),
      events_tx.clone(),
      owner.clone(),
    );
    (
      Self {
        config,
        storage,
        worker,
        clock,
        events_tx,
        events_rx,
        owner,
        pending: Mutex::new(Vec::new()),
      },
      runner,
    )
  }

  pub fn storage(&self) -> &Arc<TileStorage<K>> {
    &self.storage
  }

  /// A receiver over this provider's event stream. Receivers share one
  /// queue; clone per independent consumer before events start flowing.
  ///
  /// The queue is bounded: with nobody draining it, events past the
  /// capacity are dropped rather than accumulating or stalling workers.
  pub fn events(&self) -> Receiver<TileEvent> {
    self.events_rx.clone()
  }

  /// Marshals work onto the thread driving this provider's [`OwnerRunner`].
  pub fn owner(&self) -> &OwnerExecutor {
    &self.owner
  }

  /// Timestamp of the newest recorded world edit.
  pub fn current_timestamp(&self) -> Timestamp {
    Timestamp(self.clock.load(Ordering::Acquire))
  }

  /// Schedules `pos` for loading at an explicit priority. The returned
  /// handle retains the task; dropping every handle of an unstarted task
  /// cancels it.
  pub fn load(&self, pos: TilePos, priority: i64) -> Result<TileTaskHandle<K>, PipelineError> {
    self.worker.submit(pos, TaskStage::Load, priority)
  }

  /// Schedules `pos` for loading, prioritized by distance to `focus`.
  pub fn request(&self, pos: TilePos, focus: TilePos) -> Result<TileTaskHandle<K>, PipelineError> {
    self.load(pos, priority_for(focus, pos))
  }

  /// Schedules `pos` to catch up with its recorded dirty timestamp.
  pub fn update(&self, pos: TilePos, priority: i64) -> Result<TileTaskHandle<K>, PipelineError> {
    self.worker.submit(pos, TaskStage::Update, priority)
  }

  /// Records a world edit covering the block AABB `[min, max]` (inclusive).
  ///
  /// Every tile whose sample region intersects the edit is marked dirty at a
  /// fresh timestamp, at every level up to the configured maximum, and an
  /// [`TileEvent::Invalidated`] is emitted per position. Under eager
  /// promotion the affected positions are also scheduled for update.
  pub fn on_region_changed(&self, min: [i64; 3], max: [i64; 3]) -> Result<Timestamp, PipelineError> {
    let ts = Timestamp(self.clock.fetch_add(1, Ordering::AcqRel) + 1);
    debug!(?min, ?max, %ts, "world region changed");

    let top = self.config.max_level.min(MAX_LEVELS - 1);
    for level in 0..=top {
      let (lo, hi) = affected_tile_range(level, min, max);
      for x in lo[0]..=hi[0] {
        for y in lo[1]..=hi[1] {
          for z in lo[2]..=hi[2] {
            let pos = TilePos::new(level, x as i32, y as i32, z as i32);
            self.storage.dirty().mark(pos, ts);
            let _ = self.events_tx.try_send(TileEvent::Invalidated {
              mode: K::MODE,
              pos,
              timestamp: ts,
            });
          }
        }
      }
    }

    if self.config.promotion == PromotionPolicy::Eager {
      let handles = self.flush_dirty(0)?;
      let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
      pending.retain(|h| h.try_join().is_none());
      pending.extend(handles);
    }
    Ok(ts)
  }

  /// Schedules an update for every currently dirty position and returns the
  /// task handles. Positions that become dirty during the walk are picked up
  /// by the next call.
  pub fn flush_dirty(&self, base_priority: i64) -> Result<Vec<TileTaskHandle<K>>, PipelineError> {
    let mut positions = Vec::new();
    self.storage.dirty().for_each_dirty(|pos, _| positions.push(pos));
    // Finest levels first so coarse scales see fresh children.
    positions.sort();

    let mut handles = Vec::with_capacity(positions.len());
    for pos in positions {
      handles.push(
        self
          .worker
          .submit(pos, TaskStage::Update, base_priority)?,
      );
    }
    Ok(handles)
  }

  /// Shuts down storage; queued tasks fail with
  /// [`PipelineError::StorageClosed`] when they try to publish.
  pub fn close(&self) {
    self.storage.close();
  }
}

/// Priority for streaming `pos` toward a viewer at `focus`: nearer tiles
/// first, and at equal distance coarser tiles first since they cover more
/// ground per task.
pub fn priority_for(focus: TilePos, pos: TilePos) -> i64 {
  pos.level as i64 - focus.manhattan_distance(&pos)
}

fn floor_div(a: i64, b: i64) -> i64 {
  a.div_euclid(b)
}

fn ceil_div(a: i64, b: i64) -> i64 {
  a.div_euclid(b) + (a.rem_euclid(b) != 0) as i64
}

/// Inclusive tile coordinate range at `level` whose sample regions intersect
/// the block AABB `[min, max]`. A tile's samples span
/// `[CACHE_MIN, CACHE_MAX]` cells around it, so the range extends past the
/// tiles that merely contain the edited blocks.
fn affected_tile_range(level: u8, min: [i64; 3], max: [i64; 3]) -> ([i64; 3], [i64; 3]) {
  let step = 1i64 << level;
  let side = (TILE_CELLS as i64) << level;
  let mut lo = [0i64; 3];
  let mut hi = [0i64; 3];
  for i in 0..3 {
    lo[i] = ceil_div(min[i] - CACHE_MAX as i64 * step, side);
    hi[i] = floor_div(max[i] - CACHE_MIN as i64 * step, side);
  }
  (lo, hi)
}

#[cfg(test)]
#[path = "provider_test.rs"]
mod provider_test;
