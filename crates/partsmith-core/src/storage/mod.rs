//! # Persistent Storage
//!
//! Disk-backed model catalogue. Component models are stored as basic-model
//! documents keyed by URI, so a store can act as a
//! [`ModelSource`](crate::ModelSource) for any registry.

pub mod redb_store;

pub use redb_store::{ModelRecord, ModelStore, ModelSummary};
