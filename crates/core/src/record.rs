//! Version records derived from `version_<N>` metadata.
//!
//! A version is never stored as such: it is read back from the single
//! `version_<N> = label` metadata entry of an item or snapshot, with the
//! status taken from the entry at read time.

use std::fmt;

use postversion_common::{ItemId, ItemStatus, MetaMap};
use postversion_store::{RepoError, Repository};
use serde::Serialize;

/// Metadata key prefix holding a version number.
pub const VERSION_META_PREFIX: &str = "version_";

pub fn version_key(number: u32) -> String {
    format!("{VERSION_META_PREFIX}{number}")
}

/// Version number encoded in a metadata key, if the key is `version_<digits>`.
pub fn parse_version_key(key: &str) -> Option<u32> {
    let digits = key.strip_prefix(VERSION_META_PREFIX)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Display status of a version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum VersionStatus {
    Live,
    Hidden,
    Unreleased,
    Unknown,
}

impl From<&ItemStatus> for VersionStatus {
    fn from(status: &ItemStatus) -> Self {
        match status {
            ItemStatus::Published => Self::Live,
            ItemStatus::Draft => Self::Hidden,
            ItemStatus::Unreleased => Self::Unreleased,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for VersionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Live => "Live",
            Self::Hidden => "Hidden",
            Self::Unreleased => "Unreleased",
            Self::Unknown => "Unknown",
        })
    }
}

/// One version of a content item: its number, label and current status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionRecord {
    /// The item or snapshot carrying the version metadata.
    pub item_id: ItemId,
    pub number: u32,
    pub label: String,
    pub status: VersionStatus,
}

/// A recoverable inconsistency found while reading versions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Anomaly {
    /// More than one `version_<N>` key holds a value.
    DuplicateVersionMeta { id: ItemId, numbers: Vec<u32> },
    /// A published or hidden snapshot carries no version metadata.
    MissingVersion { id: ItemId },
    /// Two entries of one item claim the same version number.
    DuplicateVersionNumber { id: ItemId, number: u32 },
}

impl Anomaly {
    /// Log the anomaly. Anomalies never abort an operation.
    pub fn report(&self) {
        tracing::warn!(anomaly = %self, "version data anomaly");
    }
}

impl fmt::Display for Anomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateVersionMeta { id, numbers } => write!(
                f,
                "entry {id} has several version keys with values {numbers:?}, keeping the highest"
            ),
            Self::MissingVersion { id } => write!(f, "snapshot {id} has no version metadata"),
            Self::DuplicateVersionNumber { id, number } => {
                write!(f, "entry {id} repeats version {number}, ignoring it")
            }
        }
    }
}

/// The authoritative `(number, label)` in a metadata map: the highest
/// numbered version key with a non-empty value. Also returns the numbers of
/// every key that held a value.
pub fn authoritative_version(meta: &MetaMap) -> Option<((u32, String), Vec<u32>)> {
    let mut with_values: Vec<(u32, &str)> = meta
        .iter()
        .filter_map(|(key, values)| {
            let number = parse_version_key(key)?;
            let label = values.iter().find(|v| !v.is_empty())?;
            Some((number, label.as_str()))
        })
        .collect();
    with_values.sort_by_key(|(number, _)| *number);
    let numbers = with_values.iter().map(|(n, _)| *n).collect();
    let (number, label) = with_values.pop()?;
    Some(((number, label.to_string()), numbers))
}

/// Derive the version record of an item or snapshot.
///
/// `Ok(None)` when the entry has no version metadata with a value.
pub fn derive_version<R: Repository + ?Sized>(
    repo: &R,
    id: ItemId,
) -> Result<Option<VersionRecord>, RepoError> {
    let entry = repo.get_entry(id)?;
    let meta = repo.get_metadata(id)?;
    let Some(((number, label), numbers)) = authoritative_version(&meta) else {
        return Ok(None);
    };
    if numbers.len() > 1 {
        Anomaly::DuplicateVersionMeta { id, numbers }.report();
    }
    Ok(Some(VersionRecord {
        item_id: id,
        number,
        label,
        status: VersionStatus::from(entry.status()),
    }))
}

/// Keep only the highest version key of a metadata map about to be copied,
/// reduced to its first value.
pub fn prune_version_meta(mut meta: MetaMap) -> MetaMap {
    let mut numbered: Vec<(u32, String)> = meta
        .keys()
        .filter_map(|key| parse_version_key(key).map(|n| (n, key.clone())))
        .collect();
    numbered.sort_by_key(|(n, _)| *n);
    let Some((_, keep)) = numbered.pop() else {
        return meta;
    };
    for (_, key) in numbered {
        meta.remove(&key);
    }
    if let Some(values) = meta.get_mut(&keep) {
        values.truncate(1);
    }
    meta
}

/// Remove every version key from a metadata map.
pub fn strip_version_meta(mut meta: MetaMap) -> MetaMap {
    meta.retain(|key, _| parse_version_key(key).is_none());
    meta
}
