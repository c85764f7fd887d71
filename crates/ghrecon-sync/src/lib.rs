//! ghrecon-sync - the reconciliation engine.
//!
//! Given a batch of issue and pull-request candidates carrying the
//! desired post-state from the GitHub API, the engine compares each
//! candidate against what is already stored for the same instant (or,
//! in manual mode, against the most recent stored state) and, when
//! divergence is detected or no prior state exists, writes a
//! transactional bundle of synthetic rows under the disjoint id range
//! ≥ 2^48. Reconciliation is append-only: prior rows are never mutated.
//!
//! # Modules
//!
//! - [`store`]: shared SQLite connection and the store-level error type
//! - [`probe`]: stored-state lookups and canonical join-list reads
//! - [`diff`]: field-level divergence detection
//! - [`writer`]: the transactional snapshot writer
//! - [`outcome`]: per-candidate outcome buckets and diagnostics
//! - [`orchestrator`]: the two-phase multi-threaded reconciliation run

pub mod diff;
pub mod orchestrator;
pub mod outcome;
pub mod probe;
pub mod store;
pub mod writer;

pub use orchestrator::{BatchSummary, Reconciler};
pub use outcome::{Outcome, OutcomeCounters, ReasonLog};
pub use store::{Store, StoreError};
pub use writer::SnapshotWriter;
