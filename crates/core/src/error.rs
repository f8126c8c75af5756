use postversion_common::{ItemId, ItemStatus};
use postversion_store::RepoError;

use crate::resolver::VersionSelector;

/// Coarse classification of a [`VersionError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The item or version does not exist, or the item is not versioned.
    NotFound,
    /// The operation is not permitted in the current lifecycle state.
    InvalidState,
    /// The substrate refused or failed an operation.
    SubstrateFailure,
}

/// Errors from versioning operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum VersionError {
    #[error("content item {0} not found")]
    ItemNotFound(ItemId),
    #[error("content type '{item_type}' of item {id} is not versioned")]
    NotVersioned { id: ItemId, item_type: String },
    #[error("version {selector} of item {id} not found")]
    VersionNotFound { id: ItemId, selector: VersionSelector },
    #[error("version {selector} is the head version of item {id}")]
    HeadVersion { id: ItemId, selector: VersionSelector },
    #[error("item {0} has no current version to branch from")]
    NoCurrentVersion(ItemId),
    #[error("item {id} is at version {number}, no higher version number exists")]
    VersionOverflow { id: ItemId, number: u32 },
    #[error("item {id} cannot be moved to status '{status}' directly")]
    ForbiddenTransition { id: ItemId, status: ItemStatus },
    #[error("substrate failure: {0}")]
    Substrate(#[from] RepoError),
}

impl VersionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ItemNotFound(_) | Self::NotVersioned { .. } | Self::VersionNotFound { .. } => {
                ErrorKind::NotFound
            }
            Self::HeadVersion { .. }
            | Self::NoCurrentVersion(_)
            | Self::VersionOverflow { .. }
            | Self::ForbiddenTransition { .. } => ErrorKind::InvalidState,
            Self::Substrate(_) => ErrorKind::SubstrateFailure,
        }
    }

    /// Map a substrate lookup failure for `id` onto `ItemNotFound`.
    pub(crate) fn lookup(id: ItemId, err: RepoError) -> Self {
        match err {
            RepoError::NotFound(missing) if missing == id => Self::ItemNotFound(id),
            other => Self::Substrate(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_taxonomy() {
        let id = ItemId(1);
        assert_eq!(VersionError::ItemNotFound(id).kind(), ErrorKind::NotFound);
        assert_eq!(
            VersionError::HeadVersion {
                id,
                selector: VersionSelector::Number(2)
            }
            .kind(),
            ErrorKind::InvalidState
        );
        assert_eq!(
            VersionError::from(RepoError::Rejected("boom".into())).kind(),
            ErrorKind::SubstrateFailure
        );
    }

    #[test]
    fn lookup_maps_only_the_requested_id() {
        let id = ItemId(3);
        assert_eq!(
            VersionError::lookup(id, RepoError::NotFound(id)),
            VersionError::ItemNotFound(id)
        );
        assert_eq!(
            VersionError::lookup(id, RepoError::NotFound(ItemId(4))).kind(),
            ErrorKind::SubstrateFailure
        );
    }
}
