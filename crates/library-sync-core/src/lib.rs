pub mod clock;
pub mod convert;
pub mod engine;
pub mod error;
pub mod evict;
pub mod index;
pub mod merge;
pub mod orchestrator;
pub mod pool;
pub mod snapshot;
pub mod state;

#[cfg(test)]
pub(crate) mod test_support;

pub use clock::{Clock, FixedClock, SequenceClock, SystemClock};
pub use engine::{CatalogEngine, Collaborator, EngineBuilder, EpisodeLookup, PassHandle, PassSummary};
pub use error::{SyncError, TeardownError};
pub use evict::{EvictionReport, StaleEvictor};
pub use index::{CatalogIndex, NodePath};
pub use merge::{merge_catalog, reconcile, ChildSet, Reconcile};
pub use orchestrator::{FetchOrchestrator, PassOptions, PassOutcome};
pub use pool::{PoolOutcome, UnitFailure, WorkPool};
pub use snapshot::{JsonSnapshotStore, MemorySnapshotStore, SnapshotStore};
pub use state::EngineState;
