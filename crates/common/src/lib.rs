//! Shared value types for post versioning.
//!
//! # Invariants
//! - Heads and snapshots share one id space.
//! - A snapshot has exactly one parent and no children of its own.

mod types;

pub use types::{Entry, InvalidItemId, Item, ItemId, ItemStatus, MetaMap, Snapshot, TermId};
