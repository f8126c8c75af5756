//! Post version control: version records, resolution, the version
//! lifecycle, the unreleased status guard and read-path selection.
//!
//! # Invariants
//! - Version records are derived from `version_<N>` metadata, never stored.
//! - At most one version key per entry holds a value; extra keys are
//!   reported and ignored in favor of the highest.
//! - The head version is never hidden, unhidden or deleted.
//! - `unreleased` is entered only by creating a new version.

mod config;
mod error;
mod lifecycle;
mod query;
mod record;
mod resolver;
mod revision;
mod status;
#[cfg(test)]
mod testing;

pub use config::{ConfigError, HISTORY_ITEM_TYPE, Hooks, Options, VersionConfig};
pub use error::{ErrorKind, VersionError};
pub use lifecycle::{CreatedVersion, Lifecycle, Outcome};
pub use query::{QueryContext, QuerySelector, Selection};
pub use record::{
    Anomaly, VERSION_META_PREFIX, VersionRecord, VersionStatus, authoritative_version,
    derive_version, parse_version_key, prune_version_meta, strip_version_meta, version_key,
};
pub use resolver::{Resolved, Resolver, Version, VersionList, VersionSelector};
pub use revision::{
    VersionKeys, copy_meta_terms, meta_diff, on_snapshot_created, save_revision, terms_changed,
};
pub use status::{StatusController, guarded_status};
