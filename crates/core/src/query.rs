//! Read-path substitution: list results are swapped for their current
//! versions, single reads may ask for a specific version.

use postversion_common::{Entry, Item, ItemId};
use postversion_store::Repository;

use crate::config::VersionConfig;
use crate::error::{ErrorKind, VersionError};
use crate::record::derive_version;
use crate::resolver::{Resolved, Resolver, VersionSelector};

/// Per-request read context.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryContext {
    /// Return items as stored instead of their current versions.
    pub show_unreleased: bool,
    /// Version asked for by a single-item read.
    pub requested_version: Option<VersionSelector>,
}

impl QueryContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_unreleased(mut self) -> Self {
        self.show_unreleased = true;
        self
    }

    pub fn with_version(mut self, selector: impl Into<VersionSelector>) -> Self {
        self.requested_version = Some(selector.into());
        self
    }
}

/// Outcome of a single-item read.
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    Found(Resolved),
    NotFound,
}

impl Selection {
    pub fn found(self) -> Option<Resolved> {
        match self {
            Self::Found(resolved) => Some(resolved),
            Self::NotFound => None,
        }
    }
}

pub struct QuerySelector<'a, R: Repository + ?Sized> {
    repo: &'a R,
    config: &'a VersionConfig,
}

impl<'a, R: Repository + ?Sized> QuerySelector<'a, R> {
    pub fn new(repo: &'a R, config: &'a VersionConfig) -> Self {
        Self { repo, config }
    }

    fn resolver(&self) -> Resolver<'a, R> {
        Resolver::new(self.repo, self.config)
    }

    /// Rewrite a list result. Items the resolver cannot improve on come
    /// back unchanged, so the result has the same length as the input.
    pub fn map_results(
        &self,
        items: Vec<Item>,
        ctx: &QueryContext,
    ) -> Result<Vec<Resolved>, VersionError> {
        if (self.config.hooks.show_unreleased)(ctx) {
            return items.into_iter().map(|item| self.as_stored(item)).collect();
        }
        let resolver = self.resolver();
        items
            .into_iter()
            .map(|item| {
                if self.config.is_versioned(&item.item_type) {
                    resolver.resolve_current(item.id)
                } else {
                    Ok(Resolved {
                        entry: Entry::Head(item),
                        version: None,
                    })
                }
            })
            .collect()
    }

    /// Read one item, honoring a requested version.
    ///
    /// A requested version that does not exist is `NotFound`, never the
    /// head in its place. Hidden versions are found only when the
    /// `show_hidden_versions` hook allows it for the item.
    pub fn select_single(
        &self,
        id: ItemId,
        ctx: &QueryContext,
    ) -> Result<Selection, VersionError> {
        let resolver = self.resolver();
        let result = match &ctx.requested_version {
            Some(selector) => {
                let include_hidden = (self.config.hooks.show_hidden_versions)(id);
                resolver
                    .get_version(id, selector, include_hidden)
                    .map(|found| found.map(Resolved::from))
            }
            None if (self.config.hooks.show_unreleased)(ctx) => {
                resolver.item(id).and_then(|item| self.as_stored(item)).map(Some)
            }
            None => resolver.resolve_current(id).map(Some),
        };

        match result {
            Ok(Some(resolved)) => Ok(Selection::Found(resolved)),
            Ok(None) => {
                tracing::debug!(%id, requested = ?ctx.requested_version, "requested version not found");
                Ok(Selection::NotFound)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Selection::NotFound),
            Err(e) => Err(e),
        }
    }

    fn as_stored(&self, item: Item) -> Result<Resolved, VersionError> {
        let version = if self.config.is_versioned(&item.item_type) {
            derive_version(self.repo, item.id)?
        } else {
            None
        };
        Ok(Resolved {
            entry: Entry::Head(item),
            version,
        })
    }
}
