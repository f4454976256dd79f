//! Pipeline configuration.

/// When a world edit triggers regeneration of the affected tiles.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum PromotionPolicy {
  /// Regenerate as soon as the edit is recorded.
  Eager,
  /// Record the dirty mark only; regeneration happens when the tile is next
  /// requested or when dirty positions are explicitly flushed.
  #[default]
  Deferred,
}

#[derive(Clone, Debug)]
pub struct PipelineConfig {
  /// Upper bound on concurrently running tile tasks.
  pub parallelism: usize,
  /// Highest detail level tiles are produced at. Level 0 is full detail;
  /// each level above doubles the cell size.
  pub max_level: u8,
  pub promotion: PromotionPolicy,
}

impl Default for PipelineConfig {
  fn default() -> Self {
    Self {
      parallelism: rayon::current_num_threads(),
      max_level: 8,
      promotion: PromotionPolicy::default(),
    }
  }
}
