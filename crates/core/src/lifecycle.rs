//! Version lifecycle: create a new version, hide, unhide and delete old
//! ones.
//!
//! # Invariants
//! - Preconditions are checked before the first substrate mutation.
//! - Every committed step of a multi-step operation records its inverse;
//!   a failing step undoes the committed ones newest first.
//! - The head version can never be hidden, unhidden or deleted.

use postversion_common::{ItemId, ItemStatus};
use postversion_store::{RepoError, Repository};

use crate::config::VersionConfig;
use crate::error::VersionError;
use crate::record::{
    VersionRecord, VersionStatus, authoritative_version, derive_version, parse_version_key,
    version_key,
};
use crate::resolver::{Resolver, Version, VersionSelector};
use crate::revision::{VersionKeys, copy_meta_terms};

/// Result of a state transition that may already have been in effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Applied,
    /// The version was already in the requested state.
    Unchanged,
}

/// What `create_new_version` produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedVersion {
    /// The published snapshot now holding the previous version.
    pub snapshot: ItemId,
    /// The previous version, as recorded on the snapshot.
    pub archived: VersionRecord,
    /// The version the head item carries now.
    pub current: VersionRecord,
}

/// Inverse of a committed step.
#[derive(Debug, Clone, PartialEq)]
enum Compensation {
    DeleteSnapshot(ItemId),
    /// Re-add a metadata value that a step removed.
    RestoreMeta { id: ItemId, key: String, value: String },
    /// Remove a metadata value that a step added.
    RemoveMeta { id: ItemId, key: String, value: String },
}

impl Compensation {
    fn apply<R: Repository + ?Sized>(&self, repo: &mut R) -> Result<(), RepoError> {
        match self {
            Self::DeleteSnapshot(id) => {
                if !repo.delete_snapshot(*id)? {
                    return Err(RepoError::NotFound(*id));
                }
            }
            Self::RestoreMeta { id, key, value } => {
                repo.add_metadata(*id, key, value, false)?;
            }
            Self::RemoveMeta { id, key, value } => {
                repo.delete_metadata(*id, key, Some(value))?;
            }
        }
        Ok(())
    }
}

/// Committed steps of one operation, undone newest first on failure.
#[derive(Debug, Default)]
struct Saga {
    completed: Vec<Compensation>,
}

impl Saga {
    fn record(&mut self, compensation: Compensation) {
        self.completed.push(compensation);
    }

    /// Undo every committed step. Returns false if any inverse failed.
    fn rollback<R: Repository + ?Sized>(self, repo: &mut R) -> bool {
        let mut clean = true;
        for compensation in self.completed.into_iter().rev() {
            match compensation.apply(repo) {
                Ok(()) => tracing::warn!(?compensation, "compensated step"),
                Err(e) => {
                    tracing::error!(?compensation, error = %e, "compensation failed");
                    clean = false;
                }
            }
        }
        clean
    }
}

/// Mutating operations on the versions of an item.
///
/// Holds the repository mutably for its lifetime, so one lifecycle is the
/// only writer while it exists.
pub struct Lifecycle<'a, R: Repository + ?Sized> {
    repo: &'a mut R,
    config: &'a VersionConfig,
}

impl<'a, R: Repository + ?Sized> Lifecycle<'a, R> {
    pub fn new(repo: &'a mut R, config: &'a VersionConfig) -> Self {
        Self { repo, config }
    }

    pub fn resolver(&self) -> Resolver<'_, R> {
        Resolver::new(&*self.repo, self.config)
    }

    /// Archive the current version as a published snapshot and move the
    /// item to the next version in `unreleased` status.
    pub fn create_new_version(&mut self, id: ItemId) -> Result<CreatedVersion, VersionError> {
        let _span = tracing::info_span!("create_new_version", %id).entered();

        let current = {
            let resolver = self.resolver();
            resolver.versioned_item(id)?;
            resolver
                .head_version(id)?
                .ok_or(VersionError::NoCurrentVersion(id))?
        };
        let new_number = current
            .number
            .checked_add(1)
            .ok_or(VersionError::VersionOverflow {
                id,
                number: current.number,
            })?;
        let new_label = (self.config.hooks.new_version_label)(new_number, id, &current);
        let old_key = version_key(current.number);
        let new_key = version_key(new_number);

        // Lower version keys still holding a value are retired with the
        // current one, so the head keeps a single version key.
        let stale: Vec<(String, String)> = self
            .repo
            .get_metadata(id)?
            .into_iter()
            .filter(|(key, _)| parse_version_key(key).is_some_and(|n| n != current.number))
            .flat_map(|(key, values)| {
                values
                    .into_iter()
                    .filter(|v| !v.is_empty())
                    .map(move |v| (key.clone(), v))
            })
            .collect();
        if !stale.is_empty() {
            tracing::warn!(%id, stale = ?stale, "retiring duplicate version keys from head");
        }

        let mut saga = Saga::default();

        let snapshot = self.repo.create_snapshot(id, true)?;
        saga.record(Compensation::DeleteSnapshot(snapshot));
        tracing::debug!(%snapshot, "created snapshot");

        let archived = copy_meta_terms(&mut *self.repo, self.config, id, snapshot, VersionKeys::Exclude)
            .and_then(|_| self.repo.add_metadata(snapshot, &old_key, &current.label, true));
        if let Err(e) = archived {
            return Err(self.abort(saga, e));
        }

        if let Err(e) = self.repo.update_item_status(snapshot, ItemStatus::Published) {
            return Err(self.abort(saga, e));
        }
        tracing::debug!(%snapshot, version = current.number, "published snapshot");

        let mut retired = vec![(old_key.clone(), current.label.clone())];
        retired.extend(stale);
        for (key, value) in retired {
            match self.repo.delete_metadata(id, &key, Some(&value)) {
                Ok(true) => saga.record(Compensation::RestoreMeta { id, key, value }),
                Ok(false) => {}
                Err(e) => return Err(self.abort(saga, e)),
            }
        }

        match self.repo.add_metadata(id, &new_key, &new_label, true) {
            Ok(true) => saga.record(Compensation::RemoveMeta {
                id,
                key: new_key.clone(),
                value: new_label.clone(),
            }),
            Ok(false) => {
                let e = RepoError::Rejected(format!("{new_key} already set on item {id}"));
                return Err(self.abort(saga, e));
            }
            Err(e) => return Err(self.abort(saga, e)),
        }

        if let Err(e) = self.repo.update_item_status(id, ItemStatus::Unreleased) {
            return Err(self.abort(saga, e));
        }

        tracing::info!(%id, from = current.number, to = new_number, "created new version");
        Ok(CreatedVersion {
            snapshot,
            archived: VersionRecord {
                item_id: snapshot,
                number: current.number,
                label: current.label,
                status: VersionStatus::Live,
            },
            current: VersionRecord {
                item_id: id,
                number: new_number,
                label: new_label,
                status: VersionStatus::Unreleased,
            },
        })
    }

    /// Hide a visible, non-head version.
    pub fn hide_version(
        &mut self,
        id: ItemId,
        selector: &VersionSelector,
    ) -> Result<Outcome, VersionError> {
        let version = self.locate(id, selector, false)?;
        if version.entry.status() == &ItemStatus::Draft {
            return Ok(Outcome::Unchanged);
        }
        self.repo
            .update_item_status(version.entry.id(), ItemStatus::Draft)?;
        tracing::info!(%id, version = version.record.number, "hid version");
        Ok(Outcome::Applied)
    }

    /// Make a hidden, non-head version visible again.
    pub fn unhide_version(
        &mut self,
        id: ItemId,
        selector: &VersionSelector,
    ) -> Result<Outcome, VersionError> {
        let version = self.locate(id, selector, true)?;
        if version.entry.status() == &ItemStatus::Published {
            return Ok(Outcome::Unchanged);
        }
        self.repo
            .update_item_status(version.entry.id(), ItemStatus::Published)?;
        tracing::info!(%id, version = version.record.number, "unhid version");
        Ok(Outcome::Applied)
    }

    /// Permanently remove a visible or hidden, non-head version.
    pub fn delete_version(
        &mut self,
        id: ItemId,
        selector: &VersionSelector,
    ) -> Result<(), VersionError> {
        let version = self.locate(id, selector, true)?;
        let snapshot = version.entry.id();
        if !self.repo.delete_snapshot(snapshot)? {
            return Err(RepoError::Rejected(format!("snapshot {snapshot} was not deleted")).into());
        }
        tracing::info!(%id, version = version.record.number, %snapshot, "deleted version");
        Ok(())
    }

    /// Give a saved item its version metadata if it has none.
    ///
    /// New items get version 1. Existing items without a version get the
    /// number after their highest visible or hidden version. Returns the
    /// version assigned, if any.
    pub fn on_item_saved(
        &mut self,
        id: ItemId,
        is_new: bool,
    ) -> Result<Option<VersionRecord>, VersionError> {
        let next = {
            let resolver = self.resolver();
            let item = resolver.item(id)?;
            if !self.config.is_versioned(&item.item_type) {
                return Ok(None);
            }
            if is_new {
                1
            } else {
                if authoritative_version(&self.repo.get_metadata(id)?).is_some() {
                    return Ok(None);
                }
                match resolver.list_versions(id, true)?.latest() {
                    Some(v) => v.record.number.checked_add(1).ok_or(
                        VersionError::VersionOverflow {
                            id,
                            number: v.record.number,
                        },
                    )?,
                    None => 1,
                }
            }
        };

        if !self
            .repo
            .add_metadata(id, &version_key(next), &next.to_string(), true)?
        {
            return Ok(None);
        }
        tracing::debug!(%id, version = next, "assigned version to saved item");
        Ok(derive_version(&*self.repo, id)?)
    }

    /// Find the snapshot a hide/unhide/delete targets, refusing the head.
    fn locate(
        &self,
        id: ItemId,
        selector: &VersionSelector,
        include_hidden: bool,
    ) -> Result<Version, VersionError> {
        let resolver = self.resolver();
        resolver.versioned_item(id)?;

        let head = || VersionError::HeadVersion {
            id,
            selector: selector.clone(),
        };

        match resolver.get_version(id, selector, include_hidden)? {
            Some(version) if version.entry.is_head() => Err(head()),
            Some(version) => Ok(version),
            None => {
                // An unreleased head is not listed but is still never a target.
                let is_head = resolver
                    .head_version(id)?
                    .is_some_and(|record| selector.matches(&record));
                Err(if is_head {
                    head()
                } else {
                    VersionError::VersionNotFound {
                        id,
                        selector: selector.clone(),
                    }
                })
            }
        }
    }

    fn abort(&mut self, saga: Saga, cause: RepoError) -> VersionError {
        tracing::warn!(error = %cause, "lifecycle step failed, rolling back");
        if !saga.rollback(&mut *self.repo) {
            tracing::error!(error = %cause, "rollback incomplete, item left inconsistent");
        }
        VersionError::Substrate(cause)
    }
}
