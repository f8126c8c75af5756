//! Revisioning substrate: the repository interface the versioning core
//! consumes, an in-memory implementation and its file-backed persistence.
//!
//! # Invariants
//! - Every mutation takes `&mut self` and appends to the event log.
//! - A persisted state is only loaded when its hash matches the manifest.

mod memory;
mod repository;
mod store;

pub use memory::{MemoryRepository, NewItem, RepoEvent, slugify};
pub use repository::{RepoError, Repository, SnapshotOrder};
pub use store::{IntegrityManifest, ManifestEntry, RepositoryStore, StoreError, StoreMeta};
