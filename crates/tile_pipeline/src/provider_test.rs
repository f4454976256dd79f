use std::sync::atomic::AtomicUsize;
use std::time::Duration;

use super::*;
use crate::gen::SampleCache;
use crate::kind::{HeightColumn, HeightKind};
use crate::tile::Tile;

struct RoughOnly {
  runs: AtomicUsize,
}

impl TileGenerator<HeightKind> for RoughOnly {
  fn can_generate_exact(&self, _pos: TilePos) -> bool {
    false
  }

  fn has_exact_data(&self, _pos: TilePos) -> bool {
    false
  }

  fn generate_rough(
    &self,
    pos: TilePos,
    _scratch: &mut SampleCache,
  ) -> Result<Tile<HeightKind>, PipelineError> {
    self.runs.fetch_add(1, Ordering::SeqCst);
    let mut tile = Tile::new(pos);
    for c in tile.cells.iter_mut() {
      *c = HeightColumn {
        height: 4.0,
        material: 1,
      };
    }
    tile.inaccurate = true;
    Ok(tile)
  }

  fn generate_exact(
    &self,
    pos: TilePos,
    _scratch: &mut SampleCache,
  ) -> Result<Tile<HeightKind>, PipelineError> {
    Err(PipelineError::GenerationNotAllowed(pos))
  }
}

fn provider(config: PipelineConfig) -> (TileProvider<HeightKind>, OwnerRunner) {
  TileProvider::new(
    config,
    Arc::new(RoughOnly {
      runs: AtomicUsize::new(0),
    }),
  )
}

fn small_config(promotion: PromotionPolicy) -> PipelineConfig {
  PipelineConfig {
    parallelism: 2,
    max_level: 1,
    promotion,
  }
}

const P: TilePos = TilePos::new(0, 0, 0, 0);

#[test]
fn requested_tiles_land_in_storage_and_on_the_event_stream() {
  let (provider, _runner) = provider(small_config(PromotionPolicy::Deferred));
  let events = provider.events();

  let snap = provider.request(P, P).unwrap().join().unwrap();
  assert_eq!(snap.pos, P);
  assert_eq!(provider.storage().handle_for(P).timestamp(), Timestamp::GENERATED);

  match events.recv_timeout(Duration::from_secs(5)).unwrap() {
    TileEvent::Produced { pos, .. } => assert_eq!(pos, P),
    other => panic!("unexpected event {other:?}"),
  }
}

#[test]
fn region_changes_mark_every_covering_level_dirty() {
  let (provider, _runner) = provider(small_config(PromotionPolicy::Deferred));
  let events = provider.events();

  let ts = provider.on_region_changed([0, 0, 0], [0, 0, 0]).unwrap();
  assert_eq!(ts, Timestamp(1));
  assert_eq!(provider.current_timestamp(), ts);

  // The sample region of a tile reaches past its own blocks, so the edit at
  // the corner block touches the neighboring tiles too: 2 per axis at both
  // levels.
  let mut dirty = Vec::new();
  provider.storage().dirty().for_each_dirty(|pos, mark| {
    assert_eq!(mark, ts);
    dirty.push(pos);
  });
  assert_eq!(dirty.len(), 16);
  assert!(dirty.contains(&P));
  assert!(dirty.contains(&TilePos::new(0, -1, -1, -1)));
  assert!(dirty.contains(&TilePos::new(1, 0, 0, 0)));

  let invalidations: Vec<_> = events.try_iter().collect();
  assert_eq!(invalidations.len(), 16);
  assert!(invalidations
    .iter()
    .all(|e| matches!(e, TileEvent::Invalidated { timestamp, .. } if *timestamp == ts)));
}

#[test]
fn edit_timestamps_are_monotonic() {
  let (provider, _runner) = provider(small_config(PromotionPolicy::Deferred));
  let a = provider.on_region_changed([0, 0, 0], [0, 0, 0]).unwrap();
  let b = provider.on_region_changed([100, 0, 0], [100, 0, 0]).unwrap();
  assert!(b > a);
}

#[test]
fn flushing_dirty_positions_retires_their_marks() {
  let (provider, _runner) = provider(small_config(PromotionPolicy::Deferred));
  provider.on_region_changed([0, 0, 0], [0, 0, 0]).unwrap();

  let handles = provider.flush_dirty(0).unwrap();
  assert_eq!(handles.len(), 16);
  for h in &handles {
    h.join().unwrap();
  }

  let mut dirty = 0;
  provider.storage().dirty().for_each_dirty(|_, _| dirty += 1);
  assert_eq!(dirty, 0);
}

#[test]
fn eager_promotion_schedules_updates_automatically() {
  let (provider, _runner) = provider(small_config(PromotionPolicy::Eager));
  provider.on_region_changed([0, 0, 0], [0, 0, 0]).unwrap();

  let mut remaining = usize::MAX;
  for _ in 0..200 {
    remaining = 0;
    provider.storage().dirty().for_each_dirty(|_, _| remaining += 1);
    if remaining == 0 {
      break;
    }
    std::thread::sleep(Duration::from_millis(10));
  }
  assert_eq!(remaining, 0);
}

#[test]
fn nearer_positions_outrank_farther_ones() {
  let focus = TilePos::new(0, 0, 0, 0);
  let near = TilePos::new(0, 1, 0, 0);
  let far = TilePos::new(0, 50, 0, 0);
  assert!(priority_for(focus, near) > priority_for(focus, far));
  // A coarser tile covering the focus outranks a fine tile beside it.
  let coarse = TilePos::new(1, 0, 0, 0);
  assert!(priority_for(focus, coarse) > priority_for(focus, near));
}

#[test]
fn event_overflow_drops_instead_of_blocking_producers() {
  let (provider, _runner) = provider(PipelineConfig {
    parallelism: 2,
    max_level: 0,
    promotion: PromotionPolicy::Deferred,
  });
  let events = provider.events();

  // Far more affected tiles than the event queue holds; nobody drains
  // while the edit is recorded.
  provider.on_region_changed([0, 0, 0], [1023, 0, 1023]).unwrap();
  assert_eq!(events.try_iter().count(), EVENT_QUEUE_CAPACITY);
}

#[test]
fn closing_the_provider_fails_queued_publishes() {
  let (provider, _runner) = provider(small_config(PromotionPolicy::Deferred));
  provider.close();
  let err = provider.load(P, 0).unwrap().join().unwrap_err();
  assert!(matches!(&*err, PipelineError::StorageClosed));
}
