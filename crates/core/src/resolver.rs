//! Version resolution: which entries of an item are visible versions and
//! which one is current.

use std::fmt;
use std::str::FromStr;

use postversion_common::{Entry, Item, ItemId, ItemStatus};
use postversion_store::{Repository, SnapshotOrder};

use crate::config::VersionConfig;
use crate::error::VersionError;
use crate::record::{Anomaly, VersionRecord, derive_version};

const VISIBLE: &[ItemStatus] = &[ItemStatus::Published];
const VISIBLE_OR_HIDDEN: &[ItemStatus] = &[ItemStatus::Published, ItemStatus::Draft];

/// Selects a version by number or by label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionSelector {
    Number(u32),
    Label(String),
}

impl VersionSelector {
    pub fn matches(&self, record: &VersionRecord) -> bool {
        match self {
            Self::Number(n) => record.number == *n,
            Self::Label(label) => &record.label == label,
        }
    }
}

impl FromStr for VersionSelector {
    type Err = std::convert::Infallible;

    /// Digits select by number; anything else selects by label.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.parse::<u32>() {
            Ok(n) => Self::Number(n),
            Err(_) => Self::Label(s.to_string()),
        })
    }
}

impl From<u32> for VersionSelector {
    fn from(n: u32) -> Self {
        Self::Number(n)
    }
}

impl From<&str> for VersionSelector {
    fn from(label: &str) -> Self {
        Self::Label(label.to_string())
    }
}

impl fmt::Display for VersionSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Label(label) => write!(f, "'{label}'"),
        }
    }
}

/// An entry together with its version record.
#[derive(Debug, Clone, PartialEq)]
pub struct Version {
    pub entry: Entry,
    pub record: VersionRecord,
}

/// Result of resolving what a reader should see for an item.
///
/// `version` is `None` for items of unversioned types and for items that
/// carry no version metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    pub entry: Entry,
    pub version: Option<VersionRecord>,
}

impl From<Version> for Resolved {
    fn from(v: Version) -> Self {
        Self {
            entry: v.entry,
            version: Some(v.record),
        }
    }
}

/// Versions of one item, newest first, unique by number.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VersionList {
    versions: Vec<Version>,
}

impl VersionList {
    pub fn get(&self, number: u32) -> Option<&Version> {
        self.versions.iter().find(|v| v.record.number == number)
    }

    pub fn contains(&self, number: u32) -> bool {
        self.get(number).is_some()
    }

    /// First version, in enumeration order, matching the selector.
    pub fn find(&self, selector: &VersionSelector) -> Option<&Version> {
        self.versions.iter().find(|v| selector.matches(&v.record))
    }

    /// The highest-numbered version.
    pub fn latest(&self) -> Option<&Version> {
        self.versions.iter().max_by_key(|v| v.record.number)
    }

    pub fn numbers(&self) -> Vec<u32> {
        self.versions.iter().map(|v| v.record.number).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Version> {
        self.versions.iter()
    }

    pub fn len(&self) -> usize {
        self.versions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    fn push(&mut self, version: Version) {
        self.versions.push(version);
    }
}

impl IntoIterator for VersionList {
    type Item = Version;
    type IntoIter = std::vec::IntoIter<Version>;

    fn into_iter(self) -> Self::IntoIter {
        self.versions.into_iter()
    }
}

/// Read-only view over a repository that answers version questions.
pub struct Resolver<'a, R: Repository + ?Sized> {
    repo: &'a R,
    config: &'a VersionConfig,
}

impl<'a, R: Repository + ?Sized> Resolver<'a, R> {
    pub fn new(repo: &'a R, config: &'a VersionConfig) -> Self {
        Self { repo, config }
    }

    /// Fetch a content item, mapping a missing id to `ItemNotFound`.
    pub fn item(&self, id: ItemId) -> Result<Item, VersionError> {
        self.repo.get_item(id).map_err(|e| VersionError::lookup(id, e))
    }

    /// Fetch a content item and require its type to be versioned.
    pub fn versioned_item(&self, id: ItemId) -> Result<Item, VersionError> {
        let item = self.item(id)?;
        if !self.config.is_versioned(&item.item_type) {
            return Err(VersionError::NotVersioned {
                id,
                item_type: item.item_type,
            });
        }
        Ok(item)
    }

    /// Version record of the head item itself.
    pub fn head_version(&self, id: ItemId) -> Result<Option<VersionRecord>, VersionError> {
        self.item(id)?;
        Ok(derive_version(self.repo, id)?)
    }

    /// Visible versions of an item, newest first.
    ///
    /// The head is included only while published. Snapshots are included
    /// when published, or also when hidden if `include_hidden`. Items of
    /// unversioned types have no versions.
    pub fn list_versions(
        &self,
        id: ItemId,
        include_hidden: bool,
    ) -> Result<VersionList, VersionError> {
        let item = self.item(id)?;
        let mut list = VersionList::default();
        if !self.config.is_versioned(&item.item_type) {
            return Ok(list);
        }

        if item.status == ItemStatus::Published {
            if let Some(record) = derive_version(self.repo, id)? {
                list.push(Version {
                    entry: Entry::Head(item.clone()),
                    record,
                });
            }
        }

        let statuses = if include_hidden {
            VISIBLE_OR_HIDDEN
        } else {
            VISIBLE
        };
        let snapshots = self
            .repo
            .get_snapshots(id, statuses, SnapshotOrder::NewestFirst)?;

        for mut snapshot in snapshots {
            let Some(record) = derive_version(self.repo, snapshot.id)? else {
                Anomaly::MissingVersion { id: snapshot.id }.report();
                continue;
            };
            if list.contains(record.number) {
                Anomaly::DuplicateVersionNumber {
                    id: snapshot.id,
                    number: record.number,
                }
                .report();
                continue;
            }
            // Historical entries are addressed through the parent's slug.
            snapshot.slug = item.slug.clone();
            list.push(Version {
                entry: Entry::Historical(snapshot),
                record,
            });
        }

        tracing::trace!(%id, include_hidden, versions = ?list.numbers(), "listed versions");
        Ok(list)
    }

    /// Look up one version among the visible (and optionally hidden) ones.
    ///
    /// Numbers are matched by key; labels by a scan in enumeration order,
    /// first match wins.
    pub fn get_version(
        &self,
        id: ItemId,
        selector: &VersionSelector,
        include_hidden: bool,
    ) -> Result<Option<Version>, VersionError> {
        let list = self.list_versions(id, include_hidden)?;
        let found = match selector {
            VersionSelector::Number(n) => list.get(*n),
            VersionSelector::Label(_) => list.find(selector),
        };
        Ok(found.cloned())
    }

    /// What a reader should see for `id`.
    ///
    /// - snapshot ids resolve through their parent;
    /// - unversioned items are returned unchanged;
    /// - published items are returned with their own version;
    /// - otherwise the highest visible version, or the item unchanged when
    ///   nothing has been published yet.
    pub fn resolve_current(&self, id: ItemId) -> Result<Resolved, VersionError> {
        let entry = self
            .repo
            .get_entry(id)
            .map_err(|e| VersionError::lookup(id, e))?;
        let item = match entry {
            Entry::Historical(snapshot) => return self.resolve_current(snapshot.parent),
            Entry::Head(item) => item,
        };

        if !self.config.is_versioned(&item.item_type) {
            return Ok(Resolved {
                entry: Entry::Head(item),
                version: None,
            });
        }

        if item.status == ItemStatus::Published {
            let version = derive_version(self.repo, id)?;
            return Ok(Resolved {
                entry: Entry::Head(item),
                version,
            });
        }

        let list = self.list_versions(id, false)?;
        match list.latest() {
            Some(latest) => Ok(latest.clone().into()),
            None => {
                let version = derive_version(self.repo, id)?;
                Ok(Resolved {
                    entry: Entry::Head(item),
                    version,
                })
            }
        }
    }
}
