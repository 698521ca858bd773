//! Cross-store orphan reconciliation.
//!
//! Scans the course, assignment, submission and peer-response collections
//! plus the media bucket, finds records whose required parent no longer
//! exists and blobs no submission references, and deletes them in
//! store-sized batches.

pub mod collector;
pub mod config;
pub mod detector;
pub mod error;
pub mod mutator;
pub mod reader;
pub mod report;
pub mod resolver;
pub mod retry;
pub mod stores;

pub use collector::{GarbageCollector, RunOptions};
pub use config::{GcConfig, JanitorAppConfig};
pub use error::{JanitorError, Result, RunAborted, ScanError};
pub use report::{KindCounts, KindSummary, OrphanKind, RunMode, RunReport};
