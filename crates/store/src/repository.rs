use std::collections::BTreeSet;

use postversion_common::{Entry, Item, ItemId, ItemStatus, MetaMap, Snapshot, TermId};

/// Errors reported by a revisioning substrate.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepoError {
    #[error("item {0} not found")]
    NotFound(ItemId),
    #[error("no changes since the latest snapshot of item {0}")]
    Unchanged(ItemId),
    #[error("substrate rejected the operation: {0}")]
    Rejected(String),
}

/// Ordering of snapshot listings by creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SnapshotOrder {
    #[default]
    NewestFirst,
    OldestFirst,
}

/// The narrow interface the versioning core needs from the storage engine.
///
/// Heads and snapshots share one id space. Reads take `&self`; every
/// mutation takes `&mut self`, so a caller holding the repository mutably
/// is the only writer for the duration of an operation.
pub trait Repository {
    /// Fetch a content item. Snapshot ids yield `NotFound`.
    fn get_item(&self, id: ItemId) -> Result<Item, RepoError>;

    /// Fetch a snapshot. Content item ids yield `NotFound`.
    fn get_snapshot(&self, id: ItemId) -> Result<Snapshot, RepoError>;

    fn get_metadata(&self, id: ItemId) -> Result<MetaMap, RepoError>;

    /// Append a metadata value. With `unique`, nothing is written when the
    /// key already holds a value; the return value says whether a write
    /// happened.
    fn add_metadata(
        &mut self,
        id: ItemId,
        key: &str,
        value: &str,
        unique: bool,
    ) -> Result<bool, RepoError>;

    /// Remove a key, or only the matching value when `value` is given.
    fn delete_metadata(
        &mut self,
        id: ItemId,
        key: &str,
        value: Option<&str>,
    ) -> Result<bool, RepoError>;

    /// Copy the item's current fields into a new snapshot (status `inherit`).
    /// Without `force`, an unchanged item yields `RepoError::Unchanged`.
    fn create_snapshot(&mut self, parent: ItemId, force: bool) -> Result<ItemId, RepoError>;

    /// Snapshots of `parent` whose status is in `statuses` (all when empty).
    fn get_snapshots(
        &self,
        parent: ItemId,
        statuses: &[ItemStatus],
        order: SnapshotOrder,
    ) -> Result<Vec<Snapshot>, RepoError>;

    /// Set the status of an item or a snapshot.
    fn update_item_status(&mut self, id: ItemId, status: ItemStatus) -> Result<(), RepoError>;

    /// Permanently remove a snapshot with its metadata and terms. Returns
    /// false when `id` is not a snapshot.
    fn delete_snapshot(&mut self, id: ItemId) -> Result<bool, RepoError>;

    /// Add every term of `from` to `to`.
    fn copy_term_associations(&mut self, from: ItemId, to: ItemId) -> Result<(), RepoError>;

    fn get_terms(&self, id: ItemId) -> Result<BTreeSet<TermId>, RepoError>;

    /// Whether snapshots are kept for items of this type.
    fn supports_history(&self, item_type: &str) -> bool;

    /// Fetch an id as either a head or a snapshot.
    fn get_entry(&self, id: ItemId) -> Result<Entry, RepoError> {
        match self.get_item(id) {
            Ok(item) => Ok(Entry::Head(item)),
            Err(RepoError::NotFound(_)) => self.get_snapshot(id).map(Entry::Historical),
            Err(e) => Err(e),
        }
    }
}
