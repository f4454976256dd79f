//! tile_pipeline - Engine-independent streaming of multi-LOD volumetric tiles
//!
//! This crate produces, refreshes, and distributes terrain tiles for an
//! infinite sparse voxel world at power-of-two detail levels. Tiles at level
//! 0 sample the world directly; every coarser tile is combined from the 8
//! children it covers, so detail degrades gracefully with distance and edits
//! propagate upward.
//!
//! # Pipeline
//!
//! - **Addressing**: [`TilePos`] is a pure-math octree address; no tree is
//!   stored anywhere.
//! - **Generation**: exact sampling from world data, rough sampling from a
//!   band-limited field, or scale-up from children ([`gen`]).
//! - **Meshing**: dual contouring with QEF vertex placement for volumes, a
//!   displaced grid for heightmaps ([`mesher`]).
//! - **Scheduling**: a deduplicating shared-future scheduler on the rayon
//!   pool; one task per (position, stage) no matter how many consumers ask
//!   ([`scheduler`]).
//! - **Distribution**: timestamped storage with dirty tracking, an event
//!   stream, and a client-side cache with listener fan-out ([`storage`],
//!   [`events`], [`cache`]).
//!
//! The whole pipeline is generic over [`TileKind`] and is instantiated for
//! volumetric ([`VoxelKind`]) and heightmap ([`HeightKind`]) payloads.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tile_pipeline::{
//!   PipelineConfig, TilePos, TileProvider, VoxelKind, WorldGenerators,
//! };
//!
//! let generators = Arc::new(WorldGenerators::new(field, sampler));
//! let (provider, _owner) =
//!   TileProvider::<VoxelKind>::new(PipelineConfig::default(), generators);
//!
//! let focus = TilePos::new(0, 0, 4, 0);
//! let snapshot = provider.request(focus, focus)?.join()?;
//! println!("got {} at {}", snapshot.timestamp, snapshot.pos);
//! ```

pub mod constants;
pub mod error;
pub mod qef;
pub mod tile_pos;
pub mod types;

pub use constants::{cache_index, cell_index, column_index, CELLS_PADDED, TILE_CELLS};
pub use error::{PipelineError, SharedError};
pub use qef::{QefData, QefSolver};
pub use tile_pos::TilePos;
pub use types::{Aabb, MaterialId, MeshOutput, Vertex, MATERIAL_AIR};

// Tile payloads and the kind abstraction
pub mod kind;
pub mod tile;
pub use kind::{CellGeom, HeightColumn, HeightKind, ModeId, TileKind, VoxelKind};
pub use tile::{Tile, TileSnapshot, Timestamp};

// Content production
pub mod gen;
pub mod mesher;
pub use gen::exact::WorldSampler;
pub use gen::rough::RoughField;
pub use gen::{SampleCache, TileGenerator, WorldGenerators};

// Execution and distribution
pub mod cache;
pub mod config;
pub mod events;
pub mod owner;
pub mod provider;
pub mod scheduler;
pub mod storage;
pub mod worker;

pub use cache::{TileCache, TileCacheListener};
pub use config::{PipelineConfig, PromotionPolicy};
pub use events::TileEvent;
pub use owner::{owner_channel, OwnerExecutor, OwnerRunner};
pub use provider::TileProvider;
pub use scheduler::{Scheduler, TaskHandle, TaskResult};
pub use storage::{DirtyTracker, PersistenceSink, TileHandle, TileStorage};
pub use worker::{TaskStage, TileTaskHandle, TileWorker};
