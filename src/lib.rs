// src/lib.rs

//! Dust: package usage tracker
//!
//! Correlates periodic snapshots of running processes against the installed
//! package list, keeps a durable per-package usage ledger in SQLite, and
//! derives a normalized "dust score" on read.
//!
//! # Architecture
//!
//! - Adapters at the edges: package catalog (pacman) and process snapshot
//!   (/proc) behind traits
//! - One transaction per scan: readers see pre- or post-scan state only
//! - Scores are derived, never stored; tiers drift with wall-clock time
//! - A single scheduler owns mutual exclusion between timer and manual scans

pub mod catalog;
pub mod config;
pub mod db;
mod error;
pub mod ledger;
pub mod procs;
pub mod resolver;
pub mod scanner;
pub mod score;
pub mod server;

pub use catalog::{InstalledPackage, PackageCatalog, PackageMeta, PacmanCatalog};
pub use config::{parse_duration, TrackerConfig};
pub use error::{Error, Result};
pub use ledger::UsageRecord;
pub use procs::{ProcSnapshot, ProcessSnapshot};
pub use resolver::OwnershipIndex;
pub use scanner::{ScanOutcome, ScanScheduler, ScanState, TriggerOutcome};
pub use score::{DustScore, UsageTier};
