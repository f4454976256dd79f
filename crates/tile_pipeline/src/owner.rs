//! Owner-thread executor.
//!
//! Engine resources are frequently only touchable from one designated thread.
//! [`OwnerExecutor`] marshals closures to that thread and blocks the caller
//! until they ran; this is the one sanctioned blocking hand-off between the
//! worker pool and the engine. The owning thread drives an [`OwnerRunner`],
//! either by pumping [`run_pending`](OwnerRunner::run_pending) once per frame
//! or by parking in [`run_until_closed`](OwnerRunner::run_until_closed).

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};

use crate::error::PipelineError;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Cloneable submission side.
#[derive(Clone)]
pub struct OwnerExecutor {
  tx: Sender<Job>,
}

/// Receiving side, owned by the designated thread.
pub struct OwnerRunner {
  rx: Receiver<Job>,
}

/// Creates a connected executor/runner pair.
pub fn owner_channel() -> (OwnerExecutor, OwnerRunner) {
  let (tx, rx) = unbounded();
  (OwnerExecutor { tx }, OwnerRunner { rx })
}

impl OwnerExecutor {
  /// Runs `f` on the owner thread and blocks until it finishes.
  ///
  /// Fails with [`PipelineError::OwnerClosed`] when the runner is gone, which
  /// also covers jobs dropped unexecuted during shutdown.
  pub fn run<R: Send + 'static>(
    &self,
    f: impl FnOnce() -> R + Send + 'static,
  ) -> Result<R, PipelineError> {
    let (done_tx, done_rx) = bounded(1);
    self
      .tx
      .send(Box::new(move || {
        let _ = done_tx.send(f());
      }))
      .map_err(|_| PipelineError::OwnerClosed)?;
    done_rx.recv().map_err(|_| PipelineError::OwnerClosed)
  }
}

impl OwnerRunner {
  /// Runs every job queued so far without blocking.
  pub fn run_pending(&self) {
    while let Ok(job) = self.rx.try_recv() {
      job();
    }
  }

  /// Serves jobs until every [`OwnerExecutor`] clone is dropped.
  pub fn run_until_closed(&self) {
    while let Ok(job) = self.rx.recv() {
      job();
    }
  }
}

#[cfg(test)]
#[path = "owner_test.rs"]
mod owner_test;
