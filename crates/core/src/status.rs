//! Status changes of head items, guarding the `unreleased` marker.

use postversion_common::{Item, ItemId, ItemStatus};
use postversion_store::Repository;

use crate::config::VersionConfig;
use crate::error::VersionError;

/// Status a save of `item` requesting `requested` actually gets.
///
/// A versioned item in `unreleased` keeps that status unless the save asks
/// for `published`, or the `prevent_unreleased_change` hook lets the
/// change through.
pub fn guarded_status(config: &VersionConfig, item: &Item, requested: ItemStatus) -> ItemStatus {
    let guarded = item.status == ItemStatus::Unreleased
        && !matches!(requested, ItemStatus::Published | ItemStatus::Unreleased)
        && config.is_versioned(&item.item_type)
        && (config.hooks.prevent_unreleased_change)(item, &requested);
    if guarded {
        tracing::debug!(id = %item.id, %requested, "kept unreleased status");
        ItemStatus::Unreleased
    } else {
        requested
    }
}

pub struct StatusController<'a, R: Repository + ?Sized> {
    repo: &'a mut R,
    config: &'a VersionConfig,
}

impl<'a, R: Repository + ?Sized> StatusController<'a, R> {
    pub fn new(repo: &'a mut R, config: &'a VersionConfig) -> Self {
        Self { repo, config }
    }

    /// Apply a status requested by a save, after the guard. Returns the
    /// status the item ends up with.
    ///
    /// `unreleased` can only be entered through `create_new_version`.
    pub fn save_status(
        &mut self,
        id: ItemId,
        requested: ItemStatus,
    ) -> Result<ItemStatus, VersionError> {
        let item = self
            .repo
            .get_item(id)
            .map_err(|e| VersionError::lookup(id, e))?;
        let status = guarded_status(self.config, &item, requested);

        if status == item.status {
            return Ok(status);
        }
        if status == ItemStatus::Unreleased {
            return Err(VersionError::ForbiddenTransition { id, status });
        }

        self.repo.update_item_status(id, status.clone())?;
        tracing::info!(%id, from = %item.status, to = %status, "changed item status");
        Ok(status)
    }

    /// Publish the head item, making its own version current.
    pub fn publish(&mut self, id: ItemId) -> Result<ItemStatus, VersionError> {
        self.save_status(id, ItemStatus::Published)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Hooks;
    use crate::error::ErrorKind;
    use crate::lifecycle::Lifecycle;
    use crate::resolver::Resolver;
    use crate::testing::{published_post, versioned_config};
    use postversion_store::{MemoryRepository, NewItem};

    fn unreleased_post(config: &VersionConfig) -> (MemoryRepository, ItemId) {
        let (mut repo, id) = published_post();
        let mut lifecycle = Lifecycle::new(&mut repo, config);
        lifecycle.on_item_saved(id, true).unwrap();
        lifecycle.create_new_version(id).unwrap();
        (repo, id)
    }

    #[test]
    fn guard_keeps_unreleased() {
        let config = versioned_config();
        let (mut repo, id) = unreleased_post(&config);
        let mut controller = StatusController::new(&mut repo, &config);
        for requested in [ItemStatus::Draft, ItemStatus::Other("private".into())] {
            assert_eq!(
                controller.save_status(id, requested).unwrap(),
                ItemStatus::Unreleased
            );
        }
        assert_eq!(repo.get_item(id).unwrap().status, ItemStatus::Unreleased);
    }

    #[test]
    fn hook_can_lift_the_guard() {
        let config = versioned_config()
            .with_hooks(Hooks::default().with_unreleased_guard(|_, requested| {
                requested != &ItemStatus::Draft
            }));
        let (mut repo, id) = unreleased_post(&config);
        let status = StatusController::new(&mut repo, &config)
            .save_status(id, ItemStatus::Draft)
            .unwrap();
        assert_eq!(status, ItemStatus::Draft);
        assert_eq!(repo.get_item(id).unwrap().status, ItemStatus::Draft);
    }

    #[test]
    fn guard_ignores_unversioned_items() {
        let config = versioned_config();
        let mut repo = MemoryRepository::new();
        let id = repo.insert_item(NewItem::new("page", "About"));
        repo.update_item_status(id, ItemStatus::Unreleased).unwrap();
        let item = repo.get_item(id).unwrap();
        assert_eq!(
            guarded_status(&config, &item, ItemStatus::Draft),
            ItemStatus::Draft
        );
    }

    #[test]
    fn unreleased_cannot_be_entered_directly() {
        let config = versioned_config();
        let (mut repo, id) = published_post();
        let err = StatusController::new(&mut repo, &config)
            .save_status(id, ItemStatus::Unreleased)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
        assert_eq!(repo.get_item(id).unwrap().status, ItemStatus::Published);
    }

    #[test]
    fn publishing_makes_new_version_current() {
        let config = versioned_config();
        let (mut repo, id) = unreleased_post(&config);

        let current = Resolver::new(&repo, &config).resolve_current(id).unwrap();
        assert_eq!(current.version.unwrap().number, 1);
        assert!(!current.entry.is_head());

        StatusController::new(&mut repo, &config).publish(id).unwrap();
        let resolver = Resolver::new(&repo, &config);
        let current = resolver.resolve_current(id).unwrap();
        assert!(current.entry.is_head());
        assert_eq!(current.version.unwrap().number, 2);
        assert_eq!(resolver.list_versions(id, false).unwrap().numbers(), vec![2, 1]);
    }

    #[test]
    fn missing_item_is_not_found() {
        let config = versioned_config();
        let mut repo = MemoryRepository::new();
        let err = StatusController::new(&mut repo, &config)
            .publish(ItemId(42))
            .unwrap_err();
        assert_eq!(err, VersionError::ItemNotFound(ItemId(42)));
    }
}
