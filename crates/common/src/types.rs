use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Identifier shared by content items and their snapshots.
///
/// Heads and snapshots live in one id space, so an id alone is enough to
/// address either.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemId(pub u64);

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("item id must be numeric, got '{0}'")]
pub struct InvalidItemId(pub String);

impl FromStr for ItemId {
    type Err = InvalidItemId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u64>()
            .map(ItemId)
            .map_err(|_| InvalidItemId(s.to_string()))
    }
}

/// Identifier of a taxonomy term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TermId(pub u64);

/// Metadata of an item or snapshot: key to ordered list of values.
pub type MetaMap = BTreeMap<String, Vec<String>>;

/// Lifecycle status of a content item or snapshot.
///
/// Hidden snapshots carry `Draft`. Freshly created snapshots carry `Inherit`
/// until they are published.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ItemStatus {
    Draft,
    Published,
    Unreleased,
    Inherit,
    Other(String),
}

impl ItemStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Draft => "draft",
            Self::Published => "published",
            Self::Unreleased => "unreleased",
            Self::Inherit => "inherit",
            Self::Other(s) => s,
        }
    }
}

impl From<&str> for ItemStatus {
    fn from(s: &str) -> Self {
        match s {
            "draft" => Self::Draft,
            "publish" | "published" => Self::Published,
            "unreleased" => Self::Unreleased,
            "inherit" => Self::Inherit,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<String> for ItemStatus {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

impl From<ItemStatus> for String {
    fn from(status: ItemStatus) -> Self {
        status.as_str().to_string()
    }
}

impl FromStr for ItemStatus {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from(s))
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A content item (the head of its version history).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub item_type: String,
    pub title: String,
    pub slug: String,
    pub content: String,
    pub status: ItemStatus,
    pub modified_at: DateTime<Utc>,
}

/// A historical copy of an item's fields, chained to exactly one parent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: ItemId,
    pub parent: ItemId,
    pub title: String,
    pub slug: String,
    pub content: String,
    pub status: ItemStatus,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

/// Either the head item itself or one of its snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Entry {
    Head(Item),
    Historical(Snapshot),
}

impl Entry {
    pub fn id(&self) -> ItemId {
        match self {
            Self::Head(item) => item.id,
            Self::Historical(snap) => snap.id,
        }
    }

    pub fn status(&self) -> &ItemStatus {
        match self {
            Self::Head(item) => &item.status,
            Self::Historical(snap) => &snap.status,
        }
    }

    /// Parent item id. `None` for heads.
    pub fn parent(&self) -> Option<ItemId> {
        match self {
            Self::Head(_) => None,
            Self::Historical(snap) => Some(snap.parent),
        }
    }

    pub fn slug(&self) -> &str {
        match self {
            Self::Head(item) => &item.slug,
            Self::Historical(snap) => &snap.slug,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Self::Head(item) => &item.title,
            Self::Historical(snap) => &snap.title,
        }
    }

    pub fn modified_at(&self) -> DateTime<Utc> {
        match self {
            Self::Head(item) => item.modified_at,
            Self::Historical(snap) => snap.modified_at,
        }
    }

    pub fn is_head(&self) -> bool {
        matches!(self, Self::Head(_))
    }
}
