//! Deduplicating shared-future task scheduler.
//!
//! Every task is identified by a key. Submitting a key that is already live
//! joins the existing task instead of running it twice; all holders share
//! one result. A [`TaskHandle`] is the unit of interest: cloning it retains
//! the task, dropping it releases it, and dropping the last handle of a task
//! that has not started yet cancels it and transitively releases its
//! prerequisites. There is no manual retain/release surface.
//!
//! Ready tasks run on the rayon global pool, bounded by a parallelism limit.
//! Higher priority runs first; ties run in submission order.
//!
//! Lock order is scheduler state, then a task's result cell; never the
//! reverse. Handles are only ever dropped outside the state lock.

use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, Weak};

use smallvec::SmallVec;
use tracing::trace;

use crate::error::{PipelineError, SharedError};

/// Bounds required of scheduler keys.
pub trait TaskKey: Clone + Eq + Hash + Debug + Send + 'static {}
impl<K: Clone + Eq + Hash + Debug + Send + 'static> TaskKey for K {}

/// Shared task outcome. `Ok` is shared between every holder of the task.
pub type TaskResult<T> = Result<Arc<T>, SharedError>;

type Work<T> = Box<dyn FnOnce() -> Result<T, PipelineError> + Send + 'static>;

pub struct Scheduler<K: TaskKey, T: Send + Sync + 'static> {
  inner: Arc<Inner<K, T>>,
}

impl<K: TaskKey, T: Send + Sync + 'static> Clone for Scheduler<K, T> {
  fn clone(&self) -> Self {
    Self {
      inner: Arc::clone(&self.inner),
    }
  }
}

/// Retained reference to a live or completed task.
pub struct TaskHandle<K: TaskKey, T: Send + Sync + 'static> {
  inner: Weak<Inner<K, T>>,
  key: K,
  seq: u64,
  cell: Arc<ResultCell<T>>,
}

struct ResultCell<T> {
  slot: Mutex<Option<TaskResult<T>>>,
  done: Condvar,
}

impl<T> ResultCell<T> {
  fn new() -> Self {
    Self {
      slot: Mutex::new(None),
      done: Condvar::new(),
    }
  }

  fn lock_slot(&self) -> MutexGuard<'_, Option<TaskResult<T>>> {
    self.slot.lock().unwrap_or_else(PoisonError::into_inner)
  }
}

#[derive(Clone, Copy, PartialEq, Debug)]
enum Phase {
  /// Prerequisites still pending.
  Waiting,
  /// In the ready heap (possibly as a stale duplicate).
  Ready,
  /// Dispatched to the pool.
  Running,
  /// Result cell is filled.
  Done,
}

struct TaskEntry<K: TaskKey, T: Send + Sync + 'static> {
  seq: u64,
  priority: i64,
  refs: usize,
  phase: Phase,
  pending_deps: usize,
  /// Keys this task was originally submitted with; joins must stay within
  /// this set.
  before_keys: Vec<K>,
  /// Retains prerequisites until this task finishes or is cancelled.
  before_handles: Vec<TaskHandle<K, T>>,
  /// Tasks to notify on completion, seq-stamped so a resubmission under the
  /// same key is never confused with the registered dependent. Usually just
  /// the one parent that submitted this task as a prerequisite.
  dependents: SmallVec<[(K, u64); 2]>,
  work: Option<Work<T>>,
  cell: Arc<ResultCell<T>>,
}

struct ReadyEntry<K> {
  priority: i64,
  seq: u64,
  key: K,
}

impl<K> PartialEq for ReadyEntry<K> {
  fn eq(&self, other: &Self) -> bool {
    self.seq == other.seq
  }
}

impl<K> Eq for ReadyEntry<K> {}

impl<K> PartialOrd for ReadyEntry<K> {
  fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
    Some(self.cmp(other))
  }
}

impl<K> Ord for ReadyEntry<K> {
  fn cmp(&self, other: &Self) -> std::cmp::Ordering {
    // Max-heap: highest priority, then earliest submission.
    self
      .priority
      .cmp(&other.priority)
      .then(other.seq.cmp(&self.seq))
  }
}

struct State<K: TaskKey, T: Send + Sync + 'static> {
  tasks: HashMap<K, TaskEntry<K, T>>,
  ready: BinaryHeap<ReadyEntry<K>>,
  running: usize,
  next_seq: u64,
}

struct Inner<K: TaskKey, T: Send + Sync + 'static> {
  state: Mutex<State<K, T>>,
  parallelism: usize,
}

impl<K: TaskKey, T: Send + Sync + 'static> Scheduler<K, T> {
  pub fn new(parallelism: usize) -> Self {
    Self {
      inner: Arc::new(Inner {
        state: Mutex::new(State {
          tasks: HashMap::new(),
          ready: BinaryHeap::new(),
          running: 0,
          next_seq: 0,
        }),
        parallelism: parallelism.max(1),
      }),
    }
  }

  /// Submits `work` under `key`, to run after every task in `before`.
  ///
  /// If a task with this key is already live, the call joins it: `work` is
  /// dropped unexecuted and the returned handle shares the existing result.
  /// A join whose `before` set is not a subset of the original submission's
  /// fails with [`PipelineError::ConflictingDependency`], because the joiner
  /// would otherwise observe a result computed under weaker ordering than it
  /// asked for.
  pub fn submit(
    &self,
    key: K,
    priority: i64,
    before: Vec<TaskHandle<K, T>>,
    work: impl FnOnce() -> Result<T, PipelineError> + Send + 'static,
  ) -> Result<TaskHandle<K, T>, PipelineError> {
    let mut to_drop = Vec::new();
    let spawns;
    let handle;
    {
      let mut state = self.inner.lock_state();

      if let Some(entry) = state.tasks.get_mut(&key) {
        for h in &before {
          if !entry.before_keys.contains(&h.key) {
            return Err(PipelineError::ConflictingDependency {
              key: format!("{key:?}"),
              detail: format!("{:?} is not a prerequisite of the live task", h.key),
            });
          }
        }
        entry.refs += 1;
        trace!(key = ?key, refs = entry.refs, "joined task");
        let h = self.make_handle(key, entry.seq, Arc::clone(&entry.cell));
        drop(state);
        // `before` and `work` fall away outside the lock.
        return Ok(h);
      }

      let seq = state.next_seq;
      state.next_seq += 1;
      let cell = Arc::new(ResultCell::new());

      let mut pending = 0usize;
      let mut failed_cause: Option<SharedError> = None;
      for h in &before {
        match state.tasks.get_mut(&h.key) {
          Some(dep) if dep.seq == h.seq => {
            if dep.phase == Phase::Done {
              if let Some(Err(cause)) = dep.cell.lock_slot().as_ref() {
                failed_cause.get_or_insert_with(|| Arc::clone(cause));
              }
            } else {
              dep.dependents.push((key.clone(), seq));
              pending += 1;
            }
          }
          // The prerequisite entry is gone, so its result is final.
          _ => {
            if let Some(Err(cause)) = h.cell.lock_slot().as_ref() {
              failed_cause.get_or_insert_with(|| Arc::clone(cause));
            }
          }
        }
      }

      let before_keys: Vec<K> = before.iter().map(|h| h.key.clone()).collect();
      let phase = if failed_cause.is_some() {
        Phase::Done
      } else if pending == 0 {
        Phase::Ready
      } else {
        Phase::Waiting
      };

      if let Some(cause) = failed_cause {
        *cell.lock_slot() = Some(Err(PipelineError::dependency_failed(cause)));
        cell.done.notify_all();
        to_drop = before;
        state.tasks.insert(
          key.clone(),
          TaskEntry {
            seq,
            priority,
            refs: 1,
            phase,
            pending_deps: 0,
            before_keys,
            before_handles: Vec::new(),
            dependents: SmallVec::new(),
            work: None,
            cell: Arc::clone(&cell),
          },
        );
      } else {
        if phase == Phase::Ready {
          state.ready.push(ReadyEntry {
            priority,
            seq,
            key: key.clone(),
          });
        }
        state.tasks.insert(
          key.clone(),
          TaskEntry {
            seq,
            priority,
            refs: 1,
            phase,
            pending_deps: pending,
            before_keys,
            before_handles: before,
            dependents: SmallVec::new(),
            work: Some(Box::new(work)),
            cell: Arc::clone(&cell),
          },
        );
      }

      trace!(key = ?key, seq, priority, pending, "submitted task");
      handle = self.make_handle(key, seq, cell);
      spawns = self.inner.pump_locked(&mut state);
    }
    drop(to_drop);
    for item in spawns {
      self.inner.spawn(item);
    }
    Ok(handle)
  }

  fn make_handle(&self, key: K, seq: u64, cell: Arc<ResultCell<T>>) -> TaskHandle<K, T> {
    TaskHandle {
      inner: Arc::downgrade(&self.inner),
      key,
      seq,
      cell,
    }
  }
}

impl<K: TaskKey, T: Send + Sync + 'static> Inner<K, T> {
  fn lock_state(&self) -> MutexGuard<'_, State<K, T>> {
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Dispatches ready tasks while permits remain. Heap entries whose task
  /// is gone or resubmitted are discarded lazily here.
  fn pump_locked(&self, state: &mut State<K, T>) -> Vec<(K, u64, Work<T>)> {
    let mut spawns = Vec::new();
    while state.running < self.parallelism {
      let Some(top) = state.ready.pop() else {
        break;
      };
      let Some(entry) = state.tasks.get_mut(&top.key) else {
        continue;
      };
      if entry.seq != top.seq || entry.phase != Phase::Ready {
        continue;
      }
      let Some(work) = entry.work.take() else {
        continue;
      };
      entry.phase = Phase::Running;
      state.running += 1;
      spawns.push((top.key, top.seq, work));
    }
    spawns
  }

  fn spawn(self: &Arc<Self>, (key, seq, work): (K, u64, Work<T>)) {
    let inner = Arc::clone(self);
    rayon::spawn(move || {
      let result = work();
      inner.complete(key, seq, result);
    });
  }

  /// Publishes a task's result, wakes joiners, readies or fails dependents.
  fn complete(self: &Arc<Self>, key: K, seq: u64, result: Result<T, PipelineError>) {
    let shared: TaskResult<T> = match result {
      Ok(value) => Ok(Arc::new(value)),
      Err(e) => Err(Arc::new(e)),
    };
    let mut to_drop = Vec::new();
    let spawns;
    {
      let mut state = self.lock_state();
      state.running -= 1;

      let mut queue = VecDeque::new();
      queue.push_back((key, seq, shared));
      while let Some((k, s, res)) = queue.pop_front() {
        for (dk, ds, cause) in finish_entry(&mut state, k, s, res, &mut to_drop) {
          queue.push_back((dk, ds, Err(PipelineError::dependency_failed(cause))));
        }
      }

      spawns = self.pump_locked(&mut state);
    }
    drop(to_drop);
    for item in spawns {
      self.spawn(item);
    }
  }

  /// Drops one reference; the last one cancels an unstarted task.
  fn release(self: &Arc<Self>, key: &K, seq: u64) {
    let mut to_drop = Vec::new();
    {
      let mut state = self.lock_state();
      let Some(entry) = state.tasks.get_mut(key) else {
        return;
      };
      if entry.seq != seq {
        return;
      }
      entry.refs -= 1;
      if entry.refs > 0 {
        return;
      }
      match entry.phase {
        // Already executing; the entry is reclaimed when it completes.
        Phase::Running => {}
        Phase::Done => {
          if let Some(entry) = state.tasks.remove(key) {
            to_drop = entry.before_handles;
          }
        }
        Phase::Waiting | Phase::Ready => {
          if let Some(entry) = state.tasks.remove(key) {
            *entry.cell.lock_slot() = Some(Err(Arc::new(PipelineError::Cancelled)));
            entry.cell.done.notify_all();
            to_drop = entry.before_handles;
            trace!(key = ?key, seq, "cancelled unstarted task");
          }
        }
      }
    }
    // Releasing prerequisites can cascade into further cancellations; each
    // drop re-enters through this function with the lock free.
    drop(to_drop);
  }
}

/// Marks one entry done with `res` and returns the dependents that must now
/// fail (when `res` is an error). Successful completion readies dependents
/// in place.
fn finish_entry<K: TaskKey, T: Send + Sync + 'static>(
  state: &mut State<K, T>,
  key: K,
  seq: u64,
  res: TaskResult<T>,
  to_drop: &mut Vec<TaskHandle<K, T>>,
) -> Vec<(K, u64, SharedError)> {
  let Some(entry) = state.tasks.get_mut(&key) else {
    return Vec::new();
  };
  if entry.seq != seq || entry.phase == Phase::Done {
    return Vec::new();
  }
  entry.phase = Phase::Done;
  entry.work = None;
  *entry.cell.lock_slot() = Some(res.clone());
  entry.cell.done.notify_all();
  to_drop.append(&mut entry.before_handles);
  let dependents = std::mem::take(&mut entry.dependents);
  if entry.refs == 0 {
    state.tasks.remove(&key);
  }

  match res {
    Err(cause) => dependents
      .into_iter()
      .map(|(dk, ds)| (dk, ds, Arc::clone(&cause)))
      .collect(),
    Ok(_) => {
      for (dk, ds) in dependents {
        let Some(dep) = state.tasks.get_mut(&dk) else {
          continue;
        };
        if dep.seq != ds || dep.phase != Phase::Waiting {
          continue;
        }
        dep.pending_deps -= 1;
        if dep.pending_deps == 0 {
          dep.phase = Phase::Ready;
          state.ready.push(ReadyEntry {
            priority: dep.priority,
            seq: ds,
            key: dk,
          });
        }
      }
      Vec::new()
    }
  }
}

// Manual impl: the result cell is a Mutex/Condvar pair with nothing useful
// to print.
impl<K: TaskKey, T: Send + Sync + 'static> Debug for TaskHandle<K, T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("TaskHandle")
      .field("key", &self.key)
      .field("seq", &self.seq)
      .finish_non_exhaustive()
  }
}

impl<K: TaskKey, T: Send + Sync + 'static> TaskHandle<K, T> {
  pub fn key(&self) -> &K {
    &self.key
  }

  /// Blocks until the task completes and returns its shared result.
  pub fn join(&self) -> TaskResult<T> {
    let mut slot = self.cell.lock_slot();
    loop {
      if let Some(result) = slot.as_ref() {
        return result.clone();
      }
      slot = self
        .cell
        .done
        .wait(slot)
        .unwrap_or_else(PoisonError::into_inner);
    }
  }

  /// Returns the result if the task has already completed.
  pub fn try_join(&self) -> Option<TaskResult<T>> {
    self.cell.lock_slot().clone()
  }
}

impl<K: TaskKey, T: Send + Sync + 'static> Clone for TaskHandle<K, T> {
  fn clone(&self) -> Self {
    if let Some(inner) = self.inner.upgrade() {
      let mut state = inner.lock_state();
      if let Some(entry) = state.tasks.get_mut(&self.key) {
        if entry.seq == self.seq {
          entry.refs += 1;
        }
      }
    }
    Self {
      inner: Weak::clone(&self.inner),
      key: self.key.clone(),
      seq: self.seq,
      cell: Arc::clone(&self.cell),
    }
  }
}

impl<K: TaskKey, T: Send + Sync + 'static> Drop for TaskHandle<K, T> {
  fn drop(&mut self) {
    if let Some(inner) = self.inner.upgrade() {
      inner.release(&self.key, self.seq);
    }
  }
}
