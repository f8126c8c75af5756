use std::collections::{BTreeMap, BTreeSet};

use chrono::Utc;
use postversion_common::{Item, ItemId, ItemStatus, MetaMap, Snapshot, TermId};
use serde::{Deserialize, Serialize};

use crate::repository::{RepoError, Repository, SnapshotOrder};

/// A record of every mutation applied to the repository.
///
/// Callers drain the log to audit what a lifecycle operation touched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RepoEvent {
    ItemInserted { id: ItemId },
    FieldsUpdated { id: ItemId },
    StatusChanged { id: ItemId, old: ItemStatus, new: ItemStatus },
    SnapshotCreated { id: ItemId, parent: ItemId },
    SnapshotDeleted { id: ItemId, parent: ItemId },
    MetaAdded { id: ItemId, key: String, value: String },
    MetaDeleted { id: ItemId, key: String },
    TermsCopied { from: ItemId, to: ItemId },
}

/// Fields for a content item about to be inserted.
#[derive(Debug, Clone)]
pub struct NewItem {
    pub item_type: String,
    pub title: String,
    pub slug: String,
    pub content: String,
    pub status: ItemStatus,
}

impl NewItem {
    /// A published item whose slug is derived from the title.
    pub fn new(item_type: impl Into<String>, title: impl Into<String>) -> Self {
        let title = title.into();
        Self {
            item_type: item_type.into(),
            slug: slugify(&title),
            title,
            content: String::new(),
            status: ItemStatus::Published,
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    pub fn with_slug(mut self, slug: impl Into<String>) -> Self {
        self.slug = slug.into();
        self
    }

    pub fn with_status(mut self, status: ItemStatus) -> Self {
        self.status = status;
        self
    }
}

/// In-memory revisioning substrate.
///
/// Uses BTreeMap throughout so iteration (and the serialized form) is
/// deterministic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRepository {
    items: BTreeMap<ItemId, Item>,
    snapshots: BTreeMap<ItemId, Snapshot>,
    meta: BTreeMap<ItemId, MetaMap>,
    terms: BTreeMap<ItemId, BTreeSet<TermId>>,
    /// Item types that keep snapshots.
    history_types: BTreeSet<String>,
    next_id: u64,
    #[serde(skip)]
    event_log: Vec<RepoEvent>,
}

impl Default for MemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRepository {
    /// Empty repository where `post` and `page` keep history.
    pub fn new() -> Self {
        Self {
            items: BTreeMap::new(),
            snapshots: BTreeMap::new(),
            meta: BTreeMap::new(),
            terms: BTreeMap::new(),
            history_types: ["post", "page"].into_iter().map(String::from).collect(),
            next_id: 1,
            event_log: Vec::new(),
        }
    }

    /// Declare whether items of `item_type` keep snapshots.
    pub fn register_type(&mut self, item_type: &str, supports_history: bool) {
        if supports_history {
            self.history_types.insert(item_type.to_string());
        } else {
            self.history_types.remove(item_type);
        }
    }

    pub fn insert_item(&mut self, new: NewItem) -> ItemId {
        let id = self.allocate_id();
        let item = Item {
            id,
            item_type: new.item_type,
            title: new.title,
            slug: new.slug,
            content: new.content,
            status: new.status,
            modified_at: Utc::now(),
        };
        self.items.insert(id, item);
        self.meta.insert(id, MetaMap::new());
        self.event_log.push(RepoEvent::ItemInserted { id });
        id
    }

    /// Overwrite the title and/or content of a content item.
    pub fn update_fields(
        &mut self,
        id: ItemId,
        title: Option<&str>,
        content: Option<&str>,
    ) -> Result<(), RepoError> {
        let item = self.items.get_mut(&id).ok_or(RepoError::NotFound(id))?;
        if let Some(title) = title {
            item.title = title.to_string();
        }
        if let Some(content) = content {
            item.content = content.to_string();
        }
        item.modified_at = Utc::now();
        self.event_log.push(RepoEvent::FieldsUpdated { id });
        Ok(())
    }

    pub fn add_term(&mut self, id: ItemId, term: TermId) -> Result<(), RepoError> {
        self.ensure_exists(id)?;
        self.terms.entry(id).or_default().insert(term);
        Ok(())
    }

    /// All content items, in id order.
    pub fn items(&self) -> impl Iterator<Item = &Item> {
        self.items.values()
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    pub fn snapshot_count(&self) -> usize {
        self.snapshots.len()
    }

    /// Drain and return the mutation log.
    pub fn drain_events(&mut self) -> Vec<RepoEvent> {
        std::mem::take(&mut self.event_log)
    }

    pub fn events(&self) -> &[RepoEvent] {
        &self.event_log
    }

    fn allocate_id(&mut self) -> ItemId {
        let id = ItemId(self.next_id);
        self.next_id += 1;
        id
    }

    fn ensure_exists(&self, id: ItemId) -> Result<(), RepoError> {
        if self.items.contains_key(&id) || self.snapshots.contains_key(&id) {
            Ok(())
        } else {
            Err(RepoError::NotFound(id))
        }
    }

    fn latest_snapshot(&self, parent: ItemId) -> Option<&Snapshot> {
        self.snapshots
            .values()
            .filter(|s| s.parent == parent)
            .max_by_key(|s| s.id)
    }
}

impl Repository for MemoryRepository {
    fn get_item(&self, id: ItemId) -> Result<Item, RepoError> {
        self.items.get(&id).cloned().ok_or(RepoError::NotFound(id))
    }

    fn get_snapshot(&self, id: ItemId) -> Result<Snapshot, RepoError> {
        self.snapshots.get(&id).cloned().ok_or(RepoError::NotFound(id))
    }

    fn get_metadata(&self, id: ItemId) -> Result<MetaMap, RepoError> {
        self.ensure_exists(id)?;
        Ok(self.meta.get(&id).cloned().unwrap_or_default())
    }

    fn add_metadata(
        &mut self,
        id: ItemId,
        key: &str,
        value: &str,
        unique: bool,
    ) -> Result<bool, RepoError> {
        self.ensure_exists(id)?;
        let values = self.meta.entry(id).or_default().entry(key.to_string()).or_default();
        if unique && !values.is_empty() {
            return Ok(false);
        }
        values.push(value.to_string());
        self.event_log.push(RepoEvent::MetaAdded {
            id,
            key: key.to_string(),
            value: value.to_string(),
        });
        Ok(true)
    }

    fn delete_metadata(
        &mut self,
        id: ItemId,
        key: &str,
        value: Option<&str>,
    ) -> Result<bool, RepoError> {
        self.ensure_exists(id)?;
        let Some(meta) = self.meta.get_mut(&id) else {
            return Ok(false);
        };
        let removed = match value {
            None => meta.remove(key).is_some(),
            Some(value) => match meta.get_mut(key) {
                Some(values) => {
                    let before = values.len();
                    values.retain(|v| v != value);
                    let removed = values.len() != before;
                    if values.is_empty() {
                        meta.remove(key);
                    }
                    removed
                }
                None => false,
            },
        };
        if removed {
            self.event_log.push(RepoEvent::MetaDeleted {
                id,
                key: key.to_string(),
            });
        }
        Ok(removed)
    }

    fn create_snapshot(&mut self, parent: ItemId, force: bool) -> Result<ItemId, RepoError> {
        let item = self.get_item(parent)?;
        if !force {
            if let Some(latest) = self.latest_snapshot(parent) {
                if latest.title == item.title
                    && latest.content == item.content
                    && latest.slug == item.slug
                {
                    return Err(RepoError::Unchanged(parent));
                }
            }
        }

        let id = self.allocate_id();
        let now = Utc::now();
        self.snapshots.insert(
            id,
            Snapshot {
                id,
                parent,
                title: item.title,
                slug: item.slug,
                content: item.content,
                status: ItemStatus::Inherit,
                created_at: now,
                modified_at: now,
            },
        );
        self.meta.insert(id, MetaMap::new());
        self.event_log.push(RepoEvent::SnapshotCreated { id, parent });
        Ok(id)
    }

    fn get_snapshots(
        &self,
        parent: ItemId,
        statuses: &[ItemStatus],
        order: SnapshotOrder,
    ) -> Result<Vec<Snapshot>, RepoError> {
        if !self.items.contains_key(&parent) {
            return Err(RepoError::NotFound(parent));
        }
        let mut found: Vec<Snapshot> = self
            .snapshots
            .values()
            .filter(|s| s.parent == parent)
            .filter(|s| statuses.is_empty() || statuses.contains(&s.status))
            .cloned()
            .collect();
        // Ids are allocated in creation order.
        found.sort_by_key(|s| s.id);
        if order == SnapshotOrder::NewestFirst {
            found.reverse();
        }
        Ok(found)
    }

    fn update_item_status(&mut self, id: ItemId, status: ItemStatus) -> Result<(), RepoError> {
        let now = Utc::now();
        let old = if let Some(item) = self.items.get_mut(&id) {
            item.modified_at = now;
            std::mem::replace(&mut item.status, status.clone())
        } else if let Some(snap) = self.snapshots.get_mut(&id) {
            snap.modified_at = now;
            std::mem::replace(&mut snap.status, status.clone())
        } else {
            return Err(RepoError::NotFound(id));
        };
        self.event_log.push(RepoEvent::StatusChanged {
            id,
            old,
            new: status,
        });
        Ok(())
    }

    fn delete_snapshot(&mut self, id: ItemId) -> Result<bool, RepoError> {
        let Some(snap) = self.snapshots.remove(&id) else {
            return Ok(false);
        };
        self.meta.remove(&id);
        self.terms.remove(&id);
        self.event_log.push(RepoEvent::SnapshotDeleted {
            id,
            parent: snap.parent,
        });
        Ok(true)
    }

    fn copy_term_associations(&mut self, from: ItemId, to: ItemId) -> Result<(), RepoError> {
        self.ensure_exists(from)?;
        self.ensure_exists(to)?;
        let source = self.terms.get(&from).cloned().unwrap_or_default();
        self.terms.entry(to).or_default().extend(source);
        self.event_log.push(RepoEvent::TermsCopied { from, to });
        Ok(())
    }

    fn get_terms(&self, id: ItemId) -> Result<BTreeSet<TermId>, RepoError> {
        self.ensure_exists(id)?;
        Ok(self.terms.get(&id).cloned().unwrap_or_default())
    }

    fn supports_history(&self, item_type: &str) -> bool {
        self.history_types.contains(item_type)
    }
}

/// Lowercase ASCII slug: runs of non-alphanumerics collapse to one `-`.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('-') && !slug.is_empty() {
            slug.push('-');
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo_with_post() -> (MemoryRepository, ItemId) {
        let mut repo = MemoryRepository::new();
        let id = repo.insert_item(NewItem::new("post", "Hello World").with_content("body"));
        (repo, id)
    }

    #[test]
    fn insert_and_get_item() {
        let (repo, id) = repo_with_post();
        let item = repo.get_item(id).unwrap();
        assert_eq!(item.slug, "hello-world");
        assert_eq!(item.status, ItemStatus::Published);
        assert!(repo.get_snapshot(id).is_err());
    }

    #[test]
    fn unique_metadata_is_not_duplicated() {
        let (mut repo, id) = repo_with_post();
        assert!(repo.add_metadata(id, "version_1", "1", true).unwrap());
        assert!(!repo.add_metadata(id, "version_1", "x", true).unwrap());
        assert_eq!(repo.get_metadata(id).unwrap()["version_1"], vec!["1"]);
    }

    #[test]
    fn delete_metadata_by_value_keeps_other_values() {
        let (mut repo, id) = repo_with_post();
        repo.add_metadata(id, "k", "a", false).unwrap();
        repo.add_metadata(id, "k", "b", false).unwrap();
        assert!(repo.delete_metadata(id, "k", Some("a")).unwrap());
        assert_eq!(repo.get_metadata(id).unwrap()["k"], vec!["b"]);
        assert!(repo.delete_metadata(id, "k", Some("b")).unwrap());
        assert!(!repo.get_metadata(id).unwrap().contains_key("k"));
        assert!(!repo.delete_metadata(id, "k", None).unwrap());
    }

    #[test]
    fn unchanged_snapshot_is_suppressed_unless_forced() {
        let (mut repo, id) = repo_with_post();
        repo.create_snapshot(id, false).unwrap();
        assert_eq!(
            repo.create_snapshot(id, false),
            Err(RepoError::Unchanged(id))
        );
        assert!(repo.create_snapshot(id, true).is_ok());
        assert_eq!(repo.snapshot_count(), 2);
    }

    #[test]
    fn snapshots_filtered_and_ordered() {
        let (mut repo, id) = repo_with_post();
        let first = repo.create_snapshot(id, true).unwrap();
        let second = repo.create_snapshot(id, true).unwrap();
        repo.update_item_status(first, ItemStatus::Published).unwrap();
        repo.update_item_status(second, ItemStatus::Draft).unwrap();

        let all = repo.get_snapshots(id, &[], SnapshotOrder::NewestFirst).unwrap();
        assert_eq!(all.iter().map(|s| s.id).collect::<Vec<_>>(), vec![second, first]);

        let published = repo
            .get_snapshots(id, &[ItemStatus::Published], SnapshotOrder::NewestFirst)
            .unwrap();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].id, first);
    }

    #[test]
    fn delete_snapshot_removes_meta_and_terms() {
        let (mut repo, id) = repo_with_post();
        repo.add_term(id, TermId(7)).unwrap();
        let snap = repo.create_snapshot(id, true).unwrap();
        repo.copy_term_associations(id, snap).unwrap();
        repo.add_metadata(snap, "a", "1", false).unwrap();

        assert!(repo.delete_snapshot(snap).unwrap());
        assert!(repo.get_metadata(snap).is_err());
        assert!(!repo.delete_snapshot(snap).unwrap());
        assert!(!repo.delete_snapshot(id).unwrap());
    }

    #[test]
    fn get_entry_distinguishes_head_and_snapshot() {
        let (mut repo, id) = repo_with_post();
        let snap = repo.create_snapshot(id, true).unwrap();
        assert!(repo.get_entry(id).unwrap().is_head());
        assert_eq!(repo.get_entry(snap).unwrap().parent(), Some(id));
        assert_eq!(
            repo.get_entry(ItemId(999)),
            Err(RepoError::NotFound(ItemId(999)))
        );
    }

    #[test]
    fn events_record_mutations() {
        let (mut repo, id) = repo_with_post();
        repo.update_item_status(id, ItemStatus::Unreleased).unwrap();
        let events = repo.drain_events();
        assert!(matches!(events[0], RepoEvent::ItemInserted { .. }));
        assert!(matches!(
            events[1],
            RepoEvent::StatusChanged {
                new: ItemStatus::Unreleased,
                ..
            }
        ));
        assert!(repo.events().is_empty());
    }

    #[test]
    fn slugify_collapses_separators() {
        assert_eq!(slugify("  Hello,  World! 2 "), "hello-world-2");
        assert_eq!(slugify("---"), "");
    }
}
