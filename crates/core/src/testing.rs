//! Fixtures shared by the unit tests of this crate.

use std::collections::BTreeSet;

use postversion_common::{Item, ItemId, ItemStatus, MetaMap, Snapshot, TermId};
use postversion_store::{MemoryRepository, NewItem, RepoError, Repository, SnapshotOrder};

use crate::config::VersionConfig;

pub fn versioned_config() -> VersionConfig {
    VersionConfig::versioning(["post"])
}

/// A repository holding one published `post` without version metadata.
pub fn published_post() -> (MemoryRepository, ItemId) {
    let mut repo = MemoryRepository::new();
    let id = repo.insert_item(NewItem::new("post", "Versioned Post").with_content("first"));
    (repo, id)
}

/// Substrate operation a [`FailingRepository`] refuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailPoint {
    CreateSnapshot,
    CopyTerms,
    /// Status updates of snapshots.
    SnapshotStatus,
    /// Status updates of content items.
    ItemStatus,
    /// Metadata additions on content items.
    AddMetadata,
    DeleteMetadata,
    DeleteSnapshot,
}

/// Wraps a [`MemoryRepository`] and fails the first operation of one kind.
pub struct FailingRepository {
    pub inner: MemoryRepository,
    pub fail: Option<FailPoint>,
}

impl FailingRepository {
    pub fn new(inner: MemoryRepository, fail: FailPoint) -> Self {
        Self {
            inner,
            fail: Some(fail),
        }
    }

    fn check(&mut self, point: FailPoint) -> Result<(), RepoError> {
        if self.fail == Some(point) {
            self.fail = None;
            Err(RepoError::Rejected(format!("injected failure at {point:?}")))
        } else {
            Ok(())
        }
    }
}

impl Repository for FailingRepository {
    fn get_item(&self, id: ItemId) -> Result<Item, RepoError> {
        self.inner.get_item(id)
    }

    fn get_snapshot(&self, id: ItemId) -> Result<Snapshot, RepoError> {
        self.inner.get_snapshot(id)
    }

    fn get_metadata(&self, id: ItemId) -> Result<MetaMap, RepoError> {
        self.inner.get_metadata(id)
    }

    fn add_metadata(
        &mut self,
        id: ItemId,
        key: &str,
        value: &str,
        unique: bool,
    ) -> Result<bool, RepoError> {
        if self.inner.get_item(id).is_ok() {
            self.check(FailPoint::AddMetadata)?;
        }
        self.inner.add_metadata(id, key, value, unique)
    }

    fn delete_metadata(
        &mut self,
        id: ItemId,
        key: &str,
        value: Option<&str>,
    ) -> Result<bool, RepoError> {
        self.check(FailPoint::DeleteMetadata)?;
        self.inner.delete_metadata(id, key, value)
    }

    fn create_snapshot(&mut self, parent: ItemId, force: bool) -> Result<ItemId, RepoError> {
        self.check(FailPoint::CreateSnapshot)?;
        self.inner.create_snapshot(parent, force)
    }

    fn get_snapshots(
        &self,
        parent: ItemId,
        statuses: &[ItemStatus],
        order: SnapshotOrder,
    ) -> Result<Vec<Snapshot>, RepoError> {
        self.inner.get_snapshots(parent, statuses, order)
    }

    fn update_item_status(&mut self, id: ItemId, status: ItemStatus) -> Result<(), RepoError> {
        if self.inner.get_snapshot(id).is_ok() {
            self.check(FailPoint::SnapshotStatus)?;
        } else {
            self.check(FailPoint::ItemStatus)?;
        }
        self.inner.update_item_status(id, status)
    }

    fn delete_snapshot(&mut self, id: ItemId) -> Result<bool, RepoError> {
        self.check(FailPoint::DeleteSnapshot)?;
        self.inner.delete_snapshot(id)
    }

    fn copy_term_associations(&mut self, from: ItemId, to: ItemId) -> Result<(), RepoError> {
        self.check(FailPoint::CopyTerms)?;
        self.inner.copy_term_associations(from, to)
    }

    fn get_terms(&self, id: ItemId) -> Result<BTreeSet<TermId>, RepoError> {
        self.inner.get_terms(id)
    }

    fn supports_history(&self, item_type: &str) -> bool {
        self.inner.supports_history(item_type)
    }
}
