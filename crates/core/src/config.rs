//! Versioning configuration: persisted options and explicit extension hooks.
//!
//! Options say which item types are versioned. Hooks replace the ambient
//! filter toggles of a plugin system: every resolver, lifecycle, status and
//! query call receives a [`VersionConfig`] by reference, so no behavior
//! leaks between calls.

use std::fmt;
use std::path::Path;

use postversion_common::{Item, ItemId, ItemStatus, MetaMap, Snapshot};
use serde::{Deserialize, Serialize};

use crate::query::QueryContext;
use crate::record::VersionRecord;

/// Item type that holds snapshots and can never be versioned itself.
pub const HISTORY_ITEM_TYPE: &str = "revision";

/// Types that always keep history, whatever the substrate reports.
const BUILTIN_HISTORY_TYPES: [&str; 2] = ["post", "page"];

/// Errors from loading options.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Persisted versioning options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Item types whose items are versioned.
    pub post_types: Vec<String>,
    /// Metadata keys never copied from an item to its snapshots.
    pub meta_keys_to_ignore: Vec<String>,
    /// Prefix of version permalinks.
    pub permalink_base: String,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            post_types: Vec::new(),
            meta_keys_to_ignore: vec!["_old_slug".to_string()],
            permalink_base: String::new(),
        }
    }
}

impl Options {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Load options from a YAML file. A missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no options file, using defaults");
            return Ok(Self::default());
        }
        let yaml = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&yaml)
    }

    /// Drop types that cannot be versioned: the history type itself and any
    /// type without history support (`post` and `page` always qualify).
    pub fn validated(mut self, supports_history: impl Fn(&str) -> bool) -> Self {
        self.post_types.retain(|ty| {
            let keep = ty != HISTORY_ITEM_TYPE
                && (BUILTIN_HISTORY_TYPES.contains(&ty.as_str()) || supports_history(ty));
            if !keep {
                tracing::warn!(item_type = %ty, "ignoring type that cannot be versioned");
            }
            keep
        });
        self.post_types.dedup();
        self
    }

    pub fn is_versioned(&self, item_type: &str) -> bool {
        self.post_types.iter().any(|ty| ty == item_type)
    }

    /// URL of a specific version of an item.
    pub fn permalink(&self, slug: &str, version: u32) -> String {
        format!(
            "{}/{}/{}",
            self.permalink_base.trim_end_matches('/'),
            slug,
            version
        )
    }
}

type LabelHook = dyn Fn(u32, ItemId, &VersionRecord) -> String + Send + Sync;
type IgnoreHook = dyn Fn(Vec<String>, ItemId, ItemId) -> Vec<String> + Send + Sync;
type MetaCopyHook = dyn Fn(MetaMap, ItemId, ItemId) -> MetaMap + Send + Sync;
type SnapshotPredicate = dyn Fn(&Snapshot) -> bool + Send + Sync;
type ItemIdPredicate = dyn Fn(ItemId) -> bool + Send + Sync;
type TransitionPredicate = dyn Fn(&Item, &ItemStatus) -> bool + Send + Sync;
type QueryPredicate = dyn Fn(&QueryContext) -> bool + Send + Sync;

/// Named extension points.
pub struct Hooks {
    /// Label for a new version: `(new_number, item, current_version)`.
    pub new_version_label: Box<LabelHook>,
    /// Final ignore list for a copy: `(defaults, source, target)`.
    pub meta_keys_to_ignore: Box<IgnoreHook>,
    /// Last chance to edit the metadata diff before it is written.
    pub meta_to_copy: Box<MetaCopyHook>,
    /// Whether a snapshot created by a normal save receives metadata and terms.
    pub duplicate_meta_terms: Box<SnapshotPredicate>,
    /// Whether version lookups for an item may return hidden versions.
    pub show_hidden_versions: Box<ItemIdPredicate>,
    /// Whether the unreleased status guard applies to this save.
    pub prevent_unreleased_change: Box<TransitionPredicate>,
    /// Whether list reads pass items through without version substitution.
    pub show_unreleased: Box<QueryPredicate>,
}

impl Default for Hooks {
    fn default() -> Self {
        Self {
            new_version_label: Box::new(|number, _, _| number.to_string()),
            meta_keys_to_ignore: Box::new(|keys, _, _| keys),
            meta_to_copy: Box::new(|diff, _, _| diff),
            duplicate_meta_terms: Box::new(|_| true),
            show_hidden_versions: Box::new(|_| false),
            prevent_unreleased_change: Box::new(|_, _| true),
            show_unreleased: Box::new(|ctx| ctx.show_unreleased),
        }
    }
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks").finish_non_exhaustive()
    }
}

impl Hooks {
    pub fn with_label(
        mut self,
        hook: impl Fn(u32, ItemId, &VersionRecord) -> String + Send + Sync + 'static,
    ) -> Self {
        self.new_version_label = Box::new(hook);
        self
    }

    pub fn with_ignored_keys(
        mut self,
        hook: impl Fn(Vec<String>, ItemId, ItemId) -> Vec<String> + Send + Sync + 'static,
    ) -> Self {
        self.meta_keys_to_ignore = Box::new(hook);
        self
    }

    pub fn with_meta_filter(
        mut self,
        hook: impl Fn(MetaMap, ItemId, ItemId) -> MetaMap + Send + Sync + 'static,
    ) -> Self {
        self.meta_to_copy = Box::new(hook);
        self
    }

    pub fn with_duplication(
        mut self,
        hook: impl Fn(&Snapshot) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.duplicate_meta_terms = Box::new(hook);
        self
    }

    pub fn with_hidden_versions(
        mut self,
        hook: impl Fn(ItemId) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.show_hidden_versions = Box::new(hook);
        self
    }

    pub fn with_unreleased_guard(
        mut self,
        hook: impl Fn(&Item, &ItemStatus) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.prevent_unreleased_change = Box::new(hook);
        self
    }

    pub fn with_show_unreleased(
        mut self,
        hook: impl Fn(&QueryContext) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.show_unreleased = Box::new(hook);
        self
    }
}

/// Options plus hooks, passed into every versioning call.
#[derive(Debug, Default)]
pub struct VersionConfig {
    pub options: Options,
    pub hooks: Hooks,
}

impl VersionConfig {
    pub fn new(options: Options) -> Self {
        Self {
            options,
            hooks: Hooks::default(),
        }
    }

    pub fn with_hooks(mut self, hooks: Hooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// Versioning config for the given item types with default hooks.
    pub fn versioning<I, S>(types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(Options {
            post_types: types.into_iter().map(Into::into).collect(),
            ..Options::default()
        })
    }

    pub fn is_versioned(&self, item_type: &str) -> bool {
        self.options.is_versioned(item_type)
    }
}
