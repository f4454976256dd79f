//! Tile worker: turns tile goals into scheduled work.
//!
//! A task is keyed by position and [`TaskStage`]. The production strategy is
//! decided at submission time, not inside the work closure: exact generation
//! when the generator can do it, scaling from the covering children above
//! level 0 where authoritative data exists at all, rough generation
//! otherwise. Scale tasks submit their children as prerequisites, so by the
//! time the parent runs every child snapshot it needs is already in storage.
//! Exact sampling reads live world state and is marshaled onto the owner
//! thread; everything else runs directly on the pool.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use crossbeam_channel::Sender;
use tracing::{debug, trace};
use web_time::Instant;

use crate::error::PipelineError;
use crate::events::TileEvent;
use crate::gen::{SampleCache, TileGenerator};
use crate::kind::TileKind;
use crate::owner::OwnerExecutor;
use crate::scheduler::{Scheduler, TaskHandle};
use crate::storage::TileStorage;
use crate::tile::{Tile, TileSnapshot, Timestamp};
use crate::tile_pos::TilePos;

/// What a task must achieve before it may exit early.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum TaskStage {
  /// Any content suffices: the stored timestamp must reach
  /// [`Timestamp::GENERATED`].
  Load,
  /// Content must catch up with a world edit: the stored timestamp must
  /// reach the position's dirty timestamp.
  Update,
}

/// Scheduler key for tile work.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct TileTaskKey {
  pub stage: TaskStage,
  pub pos: TilePos,
}

pub type TileTaskHandle<K> = TaskHandle<TileTaskKey, TileSnapshot<K>>;
pub type TileScheduler<K> = Scheduler<TileTaskKey, TileSnapshot<K>>;

#[derive(Clone, Copy, PartialEq, Debug)]
enum Strategy {
  Exact,
  Scale,
  Rough,
}

pub struct TileWorker<K: TileKind> {
  storage: Arc<TileStorage<K>>,
  generator: Arc<dyn TileGenerator<K>>,
  scheduler: TileScheduler<K>,
  /// Monotonic world timestamp, shared with whoever records edits.
  clock: Arc<AtomicI64>,
  events: Sender<TileEvent>,
  /// Exact generation samples live world state through this executor.
  owner: OwnerExecutor,
}

impl<K: TileKind> TileWorker<K> {
  pub fn new(
    storage: Arc<TileStorage<K>>,
    generator: Arc<dyn TileGenerator<K>>,
    scheduler: TileScheduler<K>,
    clock: Arc<AtomicI64>,
    events: Sender<TileEvent>,
    owner: OwnerExecutor,
  ) -> Self {
    Self {
      storage,
      generator,
      scheduler,
      clock,
      events,
      owner,
    }
  }

  /// Submits (or joins) the task that brings `pos` up to `stage`'s goal.
  ///
  /// Scale tasks recursively submit one task per covering child as
  /// prerequisites; dirty children get an update, clean ones a load.
  pub fn submit(
    &self,
    pos: TilePos,
    stage: TaskStage,
    priority: i64,
  ) -> Result<TileTaskHandle<K>, PipelineError> {
    let minimum = match stage {
      TaskStage::Load => Timestamp::GENERATED,
      TaskStage::Update => self
        .storage
        .dirty()
        .get(pos)
        .unwrap_or(Timestamp::GENERATED),
    };
    let strategy = if self.generator.can_generate_exact(pos) {
      Strategy::Exact
    } else if pos.level > 0 && self.generator.has_exact_data(pos) {
      Strategy::Scale
    } else {
      // Nothing authoritative anywhere under this position; one rough pass
      // at this level beats fanning out to every descendant.
      Strategy::Rough
    };
    trace!(%pos, ?stage, ?strategy, %minimum, "submitting tile task");

    let mut before = Vec::new();
    if strategy == Strategy::Scale {
      for &child in K::SCALE_CHILDREN {
        let child_pos = pos.down(child);
        let child_stage = if self.storage.dirty().get(child_pos).is_some() {
          TaskStage::Update
        } else {
          TaskStage::Load
        };
        before.push(self.submit(child_pos, child_stage, priority.saturating_add(1))?);
      }
    }

    let key = TileTaskKey { stage, pos };
    let work = self.make_work(pos, stage, minimum, strategy);
    match self.scheduler.submit(key, priority, before, work) {
      Err(PipelineError::ConflictingDependency { .. }) => {
        // The live task was submitted when a different set of children was
        // dirty. Join it with no ordering demands; the work reads child
        // snapshots from storage either way.
        let work = self.make_work(pos, stage, minimum, strategy);
        self.scheduler.submit(key, priority, Vec::new(), work)
      }
      other => other,
    }
  }

  fn make_work(
    &self,
    pos: TilePos,
    stage: TaskStage,
    minimum: Timestamp,
    strategy: Strategy,
  ) -> impl FnOnce() -> Result<TileSnapshot<K>, PipelineError> + Send + 'static {
    let storage = Arc::clone(&self.storage);
    let generator = Arc::clone(&self.generator);
    let clock = Arc::clone(&self.clock);
    let events = self.events.clone();
    let owner = self.owner.clone();
    move || {
      run_task::<K>(
        &storage, &generator, &clock, &events, &owner, pos, stage, minimum, strategy,
      )
    }
  }
}

#[allow(clippy::too_many_arguments)]
fn run_task<K: TileKind>(
  storage: &TileStorage<K>,
  generator: &Arc<dyn TileGenerator<K>>,
  clock: &AtomicI64,
  events: &Sender<TileEvent>,
  owner: &OwnerExecutor,
  pos: TilePos,
  stage: TaskStage,
  minimum: Timestamp,
  strategy: Strategy,
) -> Result<TileSnapshot<K>, PipelineError> {
  let handle = storage.handle_for(pos);
  // Another task may have satisfied this goal already.
  if let Some(existing) = handle.snapshot() {
    if existing.timestamp >= minimum {
      trace!(%pos, ?stage, "goal already met, skipping");
      return Ok(existing);
    }
  }
  let started = Instant::now();

  let (tile, timestamp) = match strategy {
    Strategy::Exact => {
      // Authoritative state is only touchable from its owning thread; block
      // here until that thread served the sampling job.
      let generator = Arc::clone(generator);
      let tile = owner.run(move || {
        let mut scratch = SampleCache::new();
        generator.generate_exact(pos, &mut scratch)
      })??;
      // Exact content reflects the world as of now.
      (tile, Timestamp(clock.load(Ordering::Acquire)).max(minimum))
    }
    Strategy::Rough => {
      if stage == TaskStage::Update {
        // Rough generation cannot observe edits. Retire the dirty mark and
        // keep whatever content exists rather than churning forever.
        storage.dirty().clear_up_to(pos, minimum);
        if let Some(existing) = handle.snapshot() {
          return Ok(existing);
        }
      }
      let mut scratch = SampleCache::new();
      (generator.generate_rough(pos, &mut scratch)?, Timestamp::GENERATED)
    }
    Strategy::Scale => {
      let snapshots: [Option<TileSnapshot<K>>; 8] = std::array::from_fn(|i| {
        K::SCALE_CHILDREN
          .contains(&(i as u8))
          .then(|| storage.handle_for(pos.down(i as u8)).snapshot())
          .flatten()
      });
      let cells: [Option<&[K::Cell]>; 8] =
        std::array::from_fn(|i| snapshots[i].as_ref().map(|s| &s.tile.cells[..]));

      let mut tile = Tile::new(pos);
      K::scale(&cells, &mut tile.cells);
      tile.inaccurate = snapshots.iter().flatten().any(|s| s.tile.inaccurate);
      // The oldest input bounds what the combined content can claim, but the
      // prerequisites already brought every stale child up to `minimum`.
      let oldest = snapshots
        .iter()
        .flatten()
        .map(|s| s.timestamp)
        .min()
        .unwrap_or(Timestamp::GENERATED);
      (tile, oldest.max(minimum))
    }
  };

  let snapshot = TileSnapshot::new(tile, timestamp);
  if storage.write(snapshot.clone())? {
    debug!(
      %pos,
      ?stage,
      %timestamp,
      elapsed_us = started.elapsed().as_micros() as u64,
      "tile produced"
    );
    let _ = events.try_send(TileEvent::Produced {
      mode: K::MODE,
      pos,
      timestamp,
    });
    Ok(snapshot)
  } else {
    // Newer content won the race; hand that out instead.
    Ok(handle.snapshot().unwrap_or(snapshot))
  }
}

#[cfg(test)]
#[path = "worker_test.rs"]
mod worker_test;
