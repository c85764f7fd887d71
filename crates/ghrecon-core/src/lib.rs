//! ghrecon-core - reconciliation domain model and GitHub API plumbing.
//!
//! This crate holds everything the reconciliation engine needs that is
//! independent of storage: the candidate model the harvester hands over,
//! the remote-object model deserialized from the GitHub REST API, the
//! synthetic-id range, canonical join-list handling, candidate
//! normalization, GDPR login redaction, and the GitHub client used for
//! rate-limit probing.
//!
//! # Modules
//!
//! - [`candidate`]: issue/PR candidates, batches, and same-second collapsing
//! - [`config`]: engine configuration (threads, debug, mode)
//! - [`github`]: API client, typed errors + classifier, rate-limit probe
//! - [`ids`]: the disjoint synthetic event-id range
//! - [`model`]: remote REST objects (issues, PRs, events, users, milestones)
//! - [`redact`]: hide-set driven login redaction
//! - [`timefmt`]: second-precision timestamp formatting

pub mod candidate;
pub mod config;
pub mod github;
pub mod ids;
pub mod model;
pub mod redact;
pub mod timefmt;

pub use candidate::{canonical_id_list, collapse_same_second, Batch, IssueCandidate, PrCandidate};
pub use config::{EngineConfig, SyncMode};
pub use ids::{is_synthetic, synthetic_event_id, SYNTHETIC_EVENT_OFFSET};
pub use redact::HideSet;
