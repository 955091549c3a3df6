//! Durable snapshot store for bulk datasets
//!
//! SQLite-backed, one row per dataset id plus a single refresh metadata row.
//! Large payloads live in blob files beside the database.

pub mod snapshot;

pub use snapshot::{Snapshot, SnapshotInfo, SnapshotStore};
