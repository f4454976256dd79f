//! Pipeline error taxonomy.
//!
//! Scheduler results are shared between every holder of a task handle, so
//! failures travel as [`SharedError`] (`Arc`-wrapped) and stay cloneable.

use std::sync::Arc;

use thiserror::Error;

/// Cloneable error handle shared between all awaiters of a task.
pub type SharedError = Arc<PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
  /// Exact generation was requested but the world sampler refused
  /// authoritative access in the current context. Recoverable: callers fall
  /// back to rough generation.
  #[error("exact generation is not allowed at {0:?}")]
  GenerationNotAllowed(crate::tile_pos::TilePos),

  /// A joining submission supplied a `before` list that is not a subset of
  /// the live task's prerequisites.
  #[error("conflicting dependencies for task {key}: {detail}")]
  ConflictingDependency { key: String, detail: String },

  /// A prerequisite task failed, so this task never ran.
  #[error("prerequisite task failed: {cause}")]
  DependencyFailed { cause: SharedError },

  /// The last handle to a not-yet-started task was released.
  #[error("task was cancelled before it started")]
  Cancelled,

  /// A write was submitted after storage began closing.
  #[error("tile storage is closed")]
  StorageClosed,

  /// Persistence failure, surfaced to the flush caller only.
  #[error("storage I/O failed: {0}")]
  StorageIo(#[from] std::io::Error),

  /// The owner thread executor shut down before running the submitted work.
  #[error("owner thread executor is closed")]
  OwnerClosed,
}

impl PipelineError {
  /// Wraps a prerequisite failure for propagation to dependents.
  pub fn dependency_failed(cause: SharedError) -> SharedError {
    // Collapse chains: a dependent of a dependent reports the root cause.
    match &*cause {
      PipelineError::DependencyFailed { cause } => Arc::new(PipelineError::DependencyFailed {
        cause: Arc::clone(cause),
      }),
      _ => Arc::new(PipelineError::DependencyFailed { cause }),
    }
  }
}
