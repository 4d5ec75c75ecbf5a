//! File-based event store for case file and workshop session event sourcing.
//!
//! This module provides a JSONL-based event store with snapshot support,
//! generic over the aggregate it persists.

pub mod file_store;

pub use file_store::{FileAggregateContext, FileEventStore, StoredEvent, StoredSnapshot};
