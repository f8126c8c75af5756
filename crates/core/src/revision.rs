//! Keeping snapshots consistent with their item: metadata diff-copy, term
//! copy and change detection for saves.

use postversion_common::{ItemId, MetaMap};
use postversion_store::{RepoError, Repository, SnapshotOrder};

use crate::config::VersionConfig;
use crate::error::VersionError;
use crate::record::{prune_version_meta, strip_version_meta};

/// How version keys in the source metadata are treated by a copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionKeys {
    /// Drop them; the caller writes the snapshot's version itself.
    Exclude,
    /// Keep only the highest one, with a single value.
    Prune,
}

/// Metadata present on `source` but missing from `target`.
///
/// Keys absent from the target are taken whole. For keys present on both,
/// only values the target does not already hold are taken.
pub fn meta_diff(source: &MetaMap, target: &MetaMap, ignore: &[String]) -> MetaMap {
    let mut diff = MetaMap::new();
    for (key, values) in source {
        if ignore.iter().any(|k| k == key) {
            continue;
        }
        match target.get(key) {
            None => {
                diff.insert(key.clone(), values.clone());
            }
            Some(existing) => {
                let missing: Vec<String> = values
                    .iter()
                    .filter(|v| !existing.contains(v))
                    .cloned()
                    .collect();
                if !missing.is_empty() {
                    diff.insert(key.clone(), missing);
                }
            }
        }
    }
    diff
}

/// Copy metadata (as a diff) and term associations from `source` to
/// `target`. Returns the number of metadata values written.
pub fn copy_meta_terms<R: Repository + ?Sized>(
    repo: &mut R,
    config: &VersionConfig,
    source: ItemId,
    target: ItemId,
    version_keys: VersionKeys,
) -> Result<usize, RepoError> {
    let hooks = &config.hooks;
    let ignore = (hooks.meta_keys_to_ignore)(
        config.options.meta_keys_to_ignore.clone(),
        source,
        target,
    );

    let source_meta = repo.get_metadata(source)?;
    let target_meta = repo.get_metadata(target)?;
    let diff = (hooks.meta_to_copy)(meta_diff(&source_meta, &target_meta, &ignore), source, target);
    let diff = match version_keys {
        VersionKeys::Exclude => strip_version_meta(diff),
        VersionKeys::Prune => prune_version_meta(diff),
    };

    let mut written = 0;
    for (key, values) in &diff {
        for value in values {
            repo.add_metadata(target, key, value, false)?;
            written += 1;
        }
    }
    repo.copy_term_associations(source, target)?;

    tracing::debug!(%source, %target, written, "copied metadata and terms");
    Ok(written)
}

/// Give a snapshot created by a normal save its parent's metadata and terms.
///
/// Only applies to the latest snapshot of a versioned item and only when
/// `duplicate_meta_terms` allows it. Returns whether a copy happened.
pub fn on_snapshot_created<R: Repository + ?Sized>(
    repo: &mut R,
    config: &VersionConfig,
    snapshot_id: ItemId,
) -> Result<bool, VersionError> {
    let snapshot = repo.get_snapshot(snapshot_id)?;
    let parent = repo
        .get_item(snapshot.parent)
        .map_err(|e| VersionError::lookup(snapshot.parent, e))?;
    if !config.is_versioned(&parent.item_type) {
        return Ok(false);
    }
    if !(config.hooks.duplicate_meta_terms)(&snapshot) {
        tracing::debug!(snapshot = %snapshot_id, "meta/term duplication vetoed");
        return Ok(false);
    }

    let latest = repo
        .get_snapshots(parent.id, &[], SnapshotOrder::NewestFirst)?
        .into_iter()
        .next();
    if latest.map(|s| s.id) != Some(snapshot_id) {
        return Ok(false);
    }

    copy_meta_terms(repo, config, parent.id, snapshot_id, VersionKeys::Prune)?;
    Ok(true)
}

/// Whether the item carries terms its latest snapshot lacks. Such a save
/// must produce a snapshot even if no field changed.
pub fn terms_changed<R: Repository + ?Sized>(repo: &R, id: ItemId) -> Result<bool, RepoError> {
    let Some(latest) = repo
        .get_snapshots(id, &[], SnapshotOrder::NewestFirst)?
        .into_iter()
        .next()
    else {
        return Ok(false);
    };
    let item_terms = repo.get_terms(id)?;
    let snapshot_terms = repo.get_terms(latest.id)?;
    Ok(!item_terms.is_subset(&snapshot_terms))
}

/// Record a save of `id` as a snapshot, then run the automatic copy.
///
/// Returns the new snapshot, or `None` when the type keeps no history or
/// nothing changed.
pub fn save_revision<R: Repository + ?Sized>(
    repo: &mut R,
    config: &VersionConfig,
    id: ItemId,
) -> Result<Option<ItemId>, VersionError> {
    let item = repo.get_item(id).map_err(|e| VersionError::lookup(id, e))?;
    if !repo.supports_history(&item.item_type) {
        return Ok(None);
    }
    let force = terms_changed(repo, id)?;
    let snapshot = match repo.create_snapshot(id, force) {
        Ok(snapshot) => snapshot,
        Err(RepoError::Unchanged(_)) => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    on_snapshot_created(repo, config, snapshot)?;
    Ok(Some(snapshot))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Hooks;
    use crate::testing::{published_post, versioned_config};
    use postversion_common::TermId;

    fn meta(pairs: &[(&str, &[&str])]) -> MetaMap {
        pairs
            .iter()
            .map(|(k, vs)| (k.to_string(), vs.iter().map(|v| v.to_string()).collect()))
            .collect()
    }

    #[test]
    fn diff_adds_only_missing_entries() {
        let source = meta(&[("a", &["1"]), ("b", &["2"])]);
        let target = meta(&[("a", &["1"])]);
        assert_eq!(meta_diff(&source, &target, &[]), meta(&[("b", &["2"])]));
    }

    #[test]
    fn diff_takes_missing_values_of_shared_keys() {
        let source = meta(&[("a", &["1", "2", "3"])]);
        let target = meta(&[("a", &["2"])]);
        assert_eq!(meta_diff(&source, &target, &[]), meta(&[("a", &["1", "3"])]));
    }

    #[test]
    fn diff_respects_ignore_list() {
        let source = meta(&[("_old_slug", &["x"]), ("b", &["2"])]);
        let diff = meta_diff(&source, &MetaMap::new(), &["_old_slug".to_string()]);
        assert_eq!(diff, meta(&[("b", &["2"])]));
    }

    #[test]
    fn copy_writes_diff_and_terms_without_duplicates() {
        let config = versioned_config();
        let (mut repo, id) = published_post();
        repo.add_metadata(id, "a", "1", false).unwrap();
        repo.add_metadata(id, "b", "2", false).unwrap();
        repo.add_metadata(id, "_old_slug", "gone", false).unwrap();
        repo.add_metadata(id, "version_1", "1", true).unwrap();
        repo.add_term(id, TermId(5)).unwrap();

        let snap = repo.create_snapshot(id, true).unwrap();
        repo.add_metadata(snap, "a", "1", false).unwrap();

        let written = copy_meta_terms(&mut repo, &config, id, snap, VersionKeys::Exclude).unwrap();
        assert_eq!(written, 1);
        let snap_meta = repo.get_metadata(snap).unwrap();
        assert_eq!(snap_meta, meta(&[("a", &["1"]), ("b", &["2"])]));
        assert!(repo.get_terms(snap).unwrap().contains(&TermId(5)));
    }

    #[test]
    fn prune_mode_keeps_one_version_key() {
        let config = versioned_config();
        let (mut repo, id) = published_post();
        repo.add_metadata(id, "version_1", "1", false).unwrap();
        repo.add_metadata(id, "version_2", "2", false).unwrap();
        let snap = repo.create_snapshot(id, true).unwrap();

        copy_meta_terms(&mut repo, &config, id, snap, VersionKeys::Prune).unwrap();
        let snap_meta = repo.get_metadata(snap).unwrap();
        assert_eq!(snap_meta, meta(&[("version_2", &["2"])]));
    }

    #[test]
    fn hooks_can_extend_ignore_list_and_filter_diff() {
        let config = versioned_config().with_hooks(
            Hooks::default()
                .with_ignored_keys(|mut keys, _, _| {
                    keys.push("secret".into());
                    keys
                })
                .with_meta_filter(|mut diff, _, _| {
                    diff.remove("skip");
                    diff
                }),
        );
        let (mut repo, id) = published_post();
        repo.add_metadata(id, "secret", "s", false).unwrap();
        repo.add_metadata(id, "skip", "k", false).unwrap();
        repo.add_metadata(id, "keep", "v", false).unwrap();
        let snap = repo.create_snapshot(id, true).unwrap();

        copy_meta_terms(&mut repo, &config, id, snap, VersionKeys::Exclude).unwrap();
        assert_eq!(repo.get_metadata(snap).unwrap(), meta(&[("keep", &["v"])]));
    }

    #[test]
    fn save_revision_copies_to_new_snapshot() {
        let config = versioned_config();
        let (mut repo, id) = published_post();
        repo.add_metadata(id, "version_1", "1", true).unwrap();
        repo.add_metadata(id, "color", "blue", false).unwrap();

        let snap = save_revision(&mut repo, &config, id).unwrap().unwrap();
        assert_eq!(repo.get_metadata(snap).unwrap()["color"], vec!["blue"]);
        // Nothing changed since: no new snapshot.
        assert_eq!(save_revision(&mut repo, &config, id).unwrap(), None);
    }

    #[test]
    fn new_terms_force_a_snapshot() {
        let config = versioned_config();
        let (mut repo, id) = published_post();
        save_revision(&mut repo, &config, id).unwrap().unwrap();
        assert!(!terms_changed(&repo, id).unwrap());

        repo.add_term(id, TermId(9)).unwrap();
        assert!(terms_changed(&repo, id).unwrap());
        let snap = save_revision(&mut repo, &config, id).unwrap().unwrap();
        assert!(repo.get_terms(snap).unwrap().contains(&TermId(9)));
    }

    #[test]
    fn duplication_can_be_vetoed() {
        let config =
            versioned_config().with_hooks(Hooks::default().with_duplication(|_| false));
        let (mut repo, id) = published_post();
        repo.add_metadata(id, "color", "blue", false).unwrap();
        let snap = repo.create_snapshot(id, true).unwrap();

        assert!(!on_snapshot_created(&mut repo, &config, snap).unwrap());
        assert!(repo.get_metadata(snap).unwrap().is_empty());
    }

    #[test]
    fn only_latest_snapshot_receives_copy() {
        let config = versioned_config();
        let (mut repo, id) = published_post();
        repo.add_metadata(id, "color", "blue", false).unwrap();
        let older = repo.create_snapshot(id, true).unwrap();
        repo.create_snapshot(id, true).unwrap();

        assert!(!on_snapshot_created(&mut repo, &config, older).unwrap());
    }
}
