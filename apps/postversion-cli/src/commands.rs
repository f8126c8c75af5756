use std::io::Write;

use anyhow::{Context, anyhow, bail};
use clap::Subcommand;
use postversion_common::{Item, ItemId, ItemStatus};
use postversion_core::{
    Lifecycle, Outcome, QueryContext, QuerySelector, Resolver, StatusController, Version,
    VersionConfig, VersionRecord, VersionStatus, save_revision,
};
use postversion_store::{MemoryRepository, NewItem, Repository};

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create a content item
    Create {
        item_type: String,
        title: String,
        #[arg(long)]
        content: Option<String>,
        #[arg(long)]
        slug: Option<String>,
        /// Create as draft instead of published
        #[arg(long)]
        draft: bool,
    },
    /// Edit a content item and record the save as a snapshot
    Update {
        post_id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        content: Option<String>,
        #[arg(long)]
        status: Option<String>,
    },
    /// List the versions of a post, hidden ones included
    Versions {
        post_id: String,
        /// Log more information on each version
        #[arg(long = "v")]
        verbose: bool,
    },
    /// Archive the current version and start the next one
    NewVersion { post_id: String },
    /// Publish the head of a post
    Publish { post_id: String },
    /// Show what readers currently see for a post
    Current { post_id: String },
    /// Hide a version
    Hide { post_id: String, version: String },
    /// Make a hidden version live again
    Unhide { post_id: String, version: String },
    /// Permanently delete a version
    Delete {
        post_id: String,
        version: String,
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
}

/// Repository plus configuration for one CLI invocation.
pub struct Session {
    repo: MemoryRepository,
    config: VersionConfig,
}

impl Session {
    pub fn new(repo: MemoryRepository, config: VersionConfig) -> Self {
        Self { repo, config }
    }

    pub fn repo(&self) -> &MemoryRepository {
        &self.repo
    }

    /// Run one command. Returns whether the repository changed.
    pub fn run(
        &mut self,
        command: Command,
        out: &mut dyn Write,
        confirm: &mut dyn FnMut(&str) -> std::io::Result<bool>,
    ) -> anyhow::Result<bool> {
        match command {
            Command::Create {
                item_type,
                title,
                content,
                slug,
                draft,
            } => self.create(item_type, title, content, slug, draft, out),
            Command::Update {
                post_id,
                title,
                content,
                status,
            } => self.update(&post_id, title, content, status, out),
            Command::Versions { post_id, verbose } => {
                self.versions(&post_id, verbose, out)?;
                Ok(false)
            }
            Command::NewVersion { post_id } => {
                let post = self.validate_post(&post_id)?;
                let created = Lifecycle::new(&mut self.repo, &self.config)
                    .create_new_version(post.id)
                    .map_err(|e| anyhow!("Failed to create a new version: {e}"))?;
                writeln!(
                    out,
                    "Success: Version {} created. Version {} archived as post {}.",
                    created.current.label, created.archived.label, created.snapshot
                )?;
                Ok(true)
            }
            Command::Publish { post_id } => {
                let post = self.existing_post(&post_id)?;
                StatusController::new(&mut self.repo, &self.config).publish(post.id)?;
                writeln!(out, "Success: Post {} published.", post.id)?;
                Ok(true)
            }
            Command::Current { post_id } => {
                self.current(&post_id, out)?;
                Ok(false)
            }
            Command::Hide { post_id, version } => self.hide(&post_id, &version, out),
            Command::Unhide { post_id, version } => self.unhide(&post_id, &version, out),
            Command::Delete {
                post_id,
                version,
                yes,
            } => self.delete(&post_id, &version, yes, out, confirm),
        }
    }

    fn create(
        &mut self,
        item_type: String,
        title: String,
        content: Option<String>,
        slug: Option<String>,
        draft: bool,
        out: &mut dyn Write,
    ) -> anyhow::Result<bool> {
        let mut new = NewItem::new(item_type, title);
        if let Some(content) = content {
            new = new.with_content(content);
        }
        if let Some(slug) = slug {
            new = new.with_slug(slug);
        }
        if draft {
            new = new.with_status(ItemStatus::Draft);
        }
        let id = self.repo.insert_item(new);
        let version = Lifecycle::new(&mut self.repo, &self.config).on_item_saved(id, true)?;

        match version {
            Some(v) => writeln!(out, "Success: Created post {id} at version {}.", v.label)?,
            None => writeln!(out, "Success: Created post {id}.")?,
        }
        Ok(true)
    }

    fn update(
        &mut self,
        post_id: &str,
        title: Option<String>,
        content: Option<String>,
        status: Option<String>,
        out: &mut dyn Write,
    ) -> anyhow::Result<bool> {
        let post = self.existing_post(post_id)?;
        self.repo
            .update_fields(post.id, title.as_deref(), content.as_deref())?;

        if let Some(requested) = status {
            let requested = ItemStatus::from(requested.as_str());
            let applied = StatusController::new(&mut self.repo, &self.config)
                .save_status(post.id, requested.clone())?;
            if applied != requested {
                writeln!(out, "Warning: Status kept as '{applied}'.")?;
            }
        }

        Lifecycle::new(&mut self.repo, &self.config).on_item_saved(post.id, false)?;
        if let Some(snapshot) = save_revision(&mut self.repo, &self.config, post.id)? {
            tracing::debug!(id = %post.id, %snapshot, "recorded revision");
        }
        writeln!(out, "Success: Updated post {}.", post.id)?;
        Ok(true)
    }

    fn versions(&self, post_id: &str, verbose: bool, out: &mut dyn Write) -> anyhow::Result<()> {
        let post = self.validate_post(post_id)?;
        let resolver = Resolver::new(&self.repo, &self.config);

        let mut rows: Vec<(ItemId, VersionRecord, String)> = Vec::new();
        if post.status == ItemStatus::Unreleased {
            if let Some(record) = resolver.head_version(post.id)? {
                let modified = post.modified_at.format(TIME_FORMAT).to_string();
                rows.push((post.id, record, modified));
            }
        }
        for Version { entry, record } in resolver.list_versions(post.id, true)? {
            let modified = entry.modified_at().format(TIME_FORMAT).to_string();
            rows.push((entry.id(), record, modified));
        }

        writeln!(out, "Versions:")?;
        for (id, record, modified) in rows {
            writeln!(out, "- {} ({}) : {}", record.label, record.number, record.status)?;
            if !verbose {
                continue;
            }
            let url = self.config.options.permalink(&post.slug, record.number);
            writeln!(out, "    Post ID: {id}")?;
            writeln!(out, "    URL: {url}")?;
            writeln!(out, "    Last modified on: {modified}")?;
        }
        Ok(())
    }

    fn current(&self, post_id: &str, out: &mut dyn Write) -> anyhow::Result<()> {
        let post = self.existing_post(post_id)?;
        let resolved = QuerySelector::new(&self.repo, &self.config)
            .select_single(post.id, &QueryContext::new())?
            .found()
            .context("Post does not exist.")?;

        match &resolved.version {
            Some(v) => writeln!(out, "Current: {} ({}) : {}", v.label, v.number, v.status)?,
            None => writeln!(out, "Current: unversioned")?,
        }
        writeln!(out, "Post ID: {}", resolved.entry.id())?;
        writeln!(out, "Title: {}", resolved.entry.title())?;
        Ok(())
    }

    fn hide(&mut self, post_id: &str, raw: &str, out: &mut dyn Write) -> anyhow::Result<bool> {
        let (post, number, version) = self.validate_version(post_id, raw)?;
        if version.record.status == VersionStatus::Hidden {
            bail!("Version is already hidden.");
        }
        let outcome = Lifecycle::new(&mut self.repo, &self.config)
            .hide_version(post.id, &number.into())
            .map_err(|e| anyhow!("Version {number} failed to be hidden: {e}"))?;
        writeln!(out, "Success: Version {number} hidden.")?;
        Ok(outcome == Outcome::Applied)
    }

    fn unhide(&mut self, post_id: &str, raw: &str, out: &mut dyn Write) -> anyhow::Result<bool> {
        let (post, number, version) = self.validate_version(post_id, raw)?;
        if version.record.status == VersionStatus::Live {
            bail!("Version is already live.");
        }
        let outcome = Lifecycle::new(&mut self.repo, &self.config)
            .unhide_version(post.id, &number.into())
            .map_err(|e| anyhow!("Version {number} failed to be unhidden: {e}"))?;
        writeln!(out, "Success: Version {number} unhidden.")?;
        Ok(outcome == Outcome::Applied)
    }

    fn delete(
        &mut self,
        post_id: &str,
        raw: &str,
        yes: bool,
        out: &mut dyn Write,
        confirm: &mut dyn FnMut(&str) -> std::io::Result<bool>,
    ) -> anyhow::Result<bool> {
        let (post, number, version) = self.validate_version(post_id, raw)?;
        let prompt = format!(
            "Are you sure you want to delete version {number} with the label '{}'? This action cannot be undone.",
            version.record.label
        );
        if !yes && !confirm(&prompt)? {
            writeln!(out, "Aborted.")?;
            return Ok(false);
        }
        Lifecycle::new(&mut self.repo, &self.config)
            .delete_version(post.id, &number.into())
            .map_err(|e| anyhow!("Version {number} failed to be deleted: {e}"))?;
        writeln!(out, "Success: Version {number} deleted.")?;
        Ok(true)
    }

    fn existing_post(&self, raw: &str) -> anyhow::Result<Item> {
        let id: ItemId = raw.parse().map_err(|_| anyhow!("Post ID must be numeric."))?;
        self.repo
            .get_item(id)
            .map_err(|_| anyhow!("Post does not exist."))
    }

    /// An existing post of a versioned type.
    fn validate_post(&self, raw: &str) -> anyhow::Result<Item> {
        let post = self.existing_post(raw)?;
        if !self.config.is_versioned(&post.item_type) {
            bail!("Post type '{}' is not versionable.", post.item_type);
        }
        Ok(post)
    }

    /// A post plus one of its visible or hidden versions.
    fn validate_version(&self, post_id: &str, raw: &str) -> anyhow::Result<(Item, u32, Version)> {
        let post = self.validate_post(post_id)?;
        let number: u32 = raw
            .parse()
            .map_err(|_| anyhow!("Version value must be numeric."))?;
        let version = Resolver::new(&self.repo, &self.config)
            .get_version(post.id, &number.into(), true)?
            .context("Version does not exist.")?;
        Ok((post, number, version))
    }
}
