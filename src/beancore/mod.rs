//! The bean collection and its validated mutations.
//!
//! [`Core`] owns the configuration, the store and the in-memory collection.
//! It is built once and passed to whatever needs it. Every mutation is
//! validated against a hypothetical copy of the collection before anything is
//! written, so a rejected change never leaves partial state behind.

use chrono::Utc;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::models::graph::{CycleCheck, LinkCheckResult, LinkGraph};
use crate::models::id::{generate_id, slugify, validate_id};
use crate::models::{Bean, LinkType, normalize_tag};
use crate::storage::frontmatter::normalize_body;
use crate::storage::{LoadWarning, Store};
use crate::{Error, Result};

/// Attempts at finding an unused generated ID before giving up.
const MAX_ID_ATTEMPTS: usize = 16;

/// Owner of a loaded beans directory.
pub struct Core {
    config: Config,
    store: Store,
    beans: BTreeMap<String, Bean>,
    warnings: Vec<LoadWarning>,
}

impl Core {
    /// Open a beans directory with an explicit configuration.
    pub fn open(beans_dir: impl Into<PathBuf>, config: Config) -> Result<Self> {
        let store = Store::open(beans_dir)?;
        let loaded = store.load_all()?;
        Ok(Self {
            config,
            store,
            beans: loaded.beans,
            warnings: loaded.warnings,
        })
    }

    /// Open a beans directory using the `config.kdl` found inside it.
    pub fn load(beans_dir: impl Into<PathBuf>) -> Result<Self> {
        let beans_dir = beans_dir.into();
        if !beans_dir.is_dir() {
            return Err(Error::NotInitialized(beans_dir));
        }
        let config = Config::load(&beans_dir)?;
        Self::open(beans_dir, config)
    }

    /// Create a beans directory with the default configuration and open it.
    pub fn init(beans_dir: impl Into<PathBuf>) -> Result<Self> {
        let store = Store::init(beans_dir)?;
        if Config::write_default(store.root())? {
            tracing::debug!(root = %store.root().display(), "wrote default config");
        }
        Self::load(store.root().to_path_buf())
    }

    /// Re-read every bean from disk.
    pub fn reload(&mut self) -> Result<()> {
        let loaded = self.store.load_all()?;
        self.beans = loaded.beans;
        self.warnings = loaded.warnings;
        Ok(())
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn beans_dir(&self) -> &Path {
        self.store.root()
    }

    /// The directory containing the beans directory.
    pub fn project_root(&self) -> &Path {
        self.store.root().parent().unwrap_or(self.store.root())
    }

    /// Files that could not be loaded.
    pub fn warnings(&self) -> &[LoadWarning] {
        &self.warnings
    }

    pub fn beans(&self) -> &BTreeMap<String, Bean> {
        &self.beans
    }

    /// Graph analysis over the current collection.
    pub fn graph(&self) -> LinkGraph<'_> {
        LinkGraph::new(&self.beans, &self.config)
    }

    /// All beans, in ID order.
    pub fn all(&self) -> Vec<&Bean> {
        self.beans.values().collect()
    }

    pub fn get(&self, id: &str) -> Result<&Bean> {
        self.beans
            .get(id)
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    /// Current ETag of a bean as stored on disk.
    pub fn etag(&self, id: &str) -> Result<String> {
        let bean = self.get(id)?;
        Ok(self.store.reload(bean)?.etag())
    }

    fn id_matches(&self, short: &str) -> Vec<&str> {
        let prefixed = format!("{}{}", self.config.prefix, short);
        self.beans
            .keys()
            .filter(|id| id.starts_with(short) || id.starts_with(&prefixed))
            .map(String::as_str)
            .collect()
    }

    /// Resolve an abbreviated ID to a full one.
    ///
    /// Tries the exact ID, then the configured prefix plus the input, then a
    /// unique ID starting with either.
    pub fn normalize_id(&self, short: &str) -> Option<String> {
        if self.beans.contains_key(short) {
            return Some(short.to_string());
        }
        let prefixed = format!("{}{}", self.config.prefix, short);
        if self.beans.contains_key(&prefixed) {
            return Some(prefixed);
        }
        match self.id_matches(short).as_slice() {
            [only] => Some(only.to_string()),
            _ => None,
        }
    }

    /// Like [`Core::normalize_id`], with an error describing why nothing matched.
    pub fn resolve_id(&self, short: &str) -> Result<String> {
        if let Some(id) = self.normalize_id(short) {
            return Ok(id);
        }
        let matches = self.id_matches(short);
        if matches.len() > 1 {
            return Err(Error::InvalidId(format!(
                "'{}' is ambiguous: {}",
                short,
                matches.join(", ")
            )));
        }
        Err(Error::NotFound(short.to_string()))
    }

    fn new_id(&self, seed: &str) -> Result<String> {
        for _ in 0..MAX_ID_ATTEMPTS {
            let id = generate_id(&self.config.prefix, self.config.id_length, seed);
            if !self.beans.contains_key(&id) {
                return Ok(id);
            }
        }
        Err(Error::Other(format!(
            "could not find an unused ID after {} attempts",
            MAX_ID_ATTEMPTS
        )))
    }

    /// Check status, type, priority and tags against the configuration.
    fn validate_fields(&self, bean: &mut Bean) -> Result<()> {
        if !self.config.is_valid_status(&bean.status) {
            return Err(Error::Validation(format!(
                "invalid status '{}' (expected one of: {})",
                bean.status,
                self.config.statuses.join(", ")
            )));
        }
        if !self.config.is_valid_type(&bean.bean_type) {
            return Err(Error::Validation(format!(
                "invalid type '{}' (expected one of: {})",
                bean.bean_type,
                self.config.types.join(", ")
            )));
        }
        if let Some(priority) = bean.priority.as_deref() {
            if !self.config.is_valid_priority(priority) {
                return Err(Error::Validation(format!(
                    "invalid priority '{}' (expected one of: {})",
                    priority,
                    self.config.priorities.join(", ")
                )));
            }
        }

        let mut tags = Vec::with_capacity(bean.tags.len());
        for tag in &bean.tags {
            let tag = normalize_tag(tag)?;
            if !tags.contains(&tag) {
                tags.push(tag);
            }
        }
        bean.tags = tags;
        Ok(())
    }

    /// Validate the links `bean` adds compared to `previous`.
    ///
    /// Links the bean already had are accepted as they are, broken or not.
    /// Each new link is checked against a hypothetical collection holding the
    /// old links plus every new link accepted so far, so a batch of additions
    /// cannot close a cycle between themselves.
    fn validate_links(&self, bean: &Bean, previous: Option<&Bean>) -> Result<()> {
        let had = |lt: LinkType, target: &str| {
            previous.is_some_and(|p| p.targets(lt).contains(&target))
        };
        let added: Vec<(LinkType, &str)> =
            bean.links().filter(|(lt, t)| !had(*lt, *t)).collect();
        if added.is_empty() {
            return Ok(());
        }

        let mut base = bean.clone();
        base.parent = None;
        base.blocking.clear();
        base.blocked_by.clear();
        base.related.clear();
        base.duplicates.clear();
        for (lt, target) in bean.links().filter(|(lt, t)| had(*lt, *t)) {
            base.add_link(lt, target);
        }

        let mut hypothetical = self.beans.clone();
        hypothetical.insert(bean.id.clone(), base);

        for (link_type, target) in added {
            if target == bean.id {
                return Err(Error::SelfLink {
                    id: bean.id.clone(),
                    link_type,
                });
            }
            if !hypothetical.contains_key(target) {
                return Err(Error::NotFound(target.to_string()));
            }

            let graph = LinkGraph::new(&hypothetical, &self.config);
            if link_type == LinkType::Parent {
                graph.validate_parent(bean, target)?;
            }
            if let CycleCheck::CycleFound(path) = graph.detect_cycle(&bean.id, link_type, target) {
                return Err(Error::Cycle { link_type, path });
            }

            if let Some(entry) = hypothetical.get_mut(&bean.id) {
                entry.add_link(link_type, target);
            }
        }
        Ok(())
    }

    /// Re-check the hierarchy around a bean whose type changed.
    ///
    /// The bean's own parent and every existing child must still form an
    /// allowed pairing. Broken parent references are left alone.
    fn validate_type_change(&self, bean: &Bean, previous: &Bean) -> Result<()> {
        if bean.bean_type == previous.bean_type {
            return Ok(());
        }
        let mut hypothetical = self.beans.clone();
        hypothetical.insert(bean.id.clone(), bean.clone());
        let graph = LinkGraph::new(&hypothetical, &self.config);

        if let Some(parent) = bean.parent.as_deref() {
            if parent != bean.id && hypothetical.contains_key(parent) {
                graph.validate_parent(bean, parent)?;
            }
        }
        for child in graph.children(&bean.id) {
            graph.validate_parent(child, &bean.id)?;
        }
        Ok(())
    }

    /// Create a new bean.
    ///
    /// An empty ID is replaced with a generated one; empty status and type get
    /// the configured defaults; the slug is derived from the title when unset.
    pub fn create(&mut self, mut bean: Bean) -> Result<&Bean> {
        if bean.title.trim().is_empty() {
            return Err(Error::Validation("title cannot be empty".to_string()));
        }
        if bean.id.is_empty() {
            bean.id = self.new_id(&bean.title)?;
        } else {
            validate_id(&bean.id)?;
            if self.beans.contains_key(&bean.id) {
                return Err(Error::Validation(format!(
                    "bean {} already exists",
                    bean.id
                )));
            }
        }
        if bean.status.is_empty() {
            bean.status = self.config.default_status.clone();
        }
        if bean.bean_type.is_empty() {
            bean.bean_type = self.config.default_type.clone();
        }
        if bean.slug.is_none() {
            let slug = slugify(&bean.title);
            bean.slug = (!slug.is_empty()).then_some(slug);
        }
        let now = Utc::now();
        bean.created_at.get_or_insert(now);
        bean.updated_at = Some(now);
        bean.body = normalize_body(&bean.body);
        bean.path = None;

        self.validate_fields(&mut bean)?;
        self.validate_links(&bean, None)?;

        self.store.save(&mut bean)?;
        tracing::debug!(id = %bean.id, "created bean");
        let id = bean.id.clone();
        self.beans.insert(id.clone(), bean);
        self.get(&id)
    }

    /// Replace a bean with a modified copy.
    ///
    /// When `if_match` is given it must equal the ETag of the file currently on
    /// disk, otherwise the update fails with [`Error::Conflict`].
    pub fn update(&mut self, mut bean: Bean, if_match: Option<&str>) -> Result<&Bean> {
        let existing = self.get(&bean.id)?;
        if let Some(provided) = if_match {
            let current = self.store.reload(existing)?.etag();
            if current != provided {
                return Err(Error::Conflict {
                    provided: provided.to_string(),
                    current,
                });
            }
        }

        bean.path = existing.path.clone();
        if bean.slug.is_none() {
            bean.slug = existing.slug.clone();
        }
        if bean.created_at.is_none() {
            bean.created_at = existing.created_at;
        }
        bean.body = normalize_body(&bean.body);

        self.validate_fields(&mut bean)?;
        let existing = existing.clone();
        self.validate_links(&bean, Some(&existing))?;
        self.validate_type_change(&bean, &existing)?;

        self.persist(bean)
    }

    /// Stamp, save and index a bean that has already been validated.
    fn persist(&mut self, mut bean: Bean) -> Result<&Bean> {
        bean.updated_at = Some(Utc::now());
        self.store.save(&mut bean)?;
        tracing::debug!(id = %bean.id, "updated bean");
        let id = bean.id.clone();
        self.beans.insert(id.clone(), bean);
        self.get(&id)
    }

    /// Delete a bean's file. References to it in other beans are left alone
    /// and become broken links.
    pub fn delete(&mut self, id: &str) -> Result<Bean> {
        let bean = self.get(id)?;
        self.store.delete(bean)?;
        tracing::debug!(id = %id, "deleted bean");
        self.beans
            .remove(id)
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    /// Add a validated link. Returns false if the link already existed.
    pub fn add_link(&mut self, id: &str, link_type: LinkType, target: &str) -> Result<bool> {
        let mut bean = self.get(id)?.clone();
        if !bean.add_link(link_type, target) {
            return Ok(false);
        }
        self.update(bean, None)?;
        Ok(true)
    }

    /// Remove a link. Returns how many references were removed.
    pub fn remove_link(&mut self, id: &str, link_type: LinkType, target: &str) -> Result<usize> {
        let mut bean = self.get(id)?.clone();
        let removed = bean.remove_link(link_type, target);
        if removed > 0 {
            self.persist(bean)?;
        }
        Ok(removed)
    }

    /// Set or clear a bean's parent, checking the hierarchy and for cycles.
    pub fn set_parent(&mut self, id: &str, parent: Option<&str>) -> Result<()> {
        let mut bean = self.get(id)?.clone();
        if bean.parent.as_deref() == parent {
            return Ok(());
        }
        bean.parent = parent.map(str::to_string);
        self.update(bean, None)?;
        Ok(())
    }

    /// Integrity scan over the whole collection.
    pub fn check_links(&self) -> LinkCheckResult {
        self.graph().check_all_links()
    }

    /// Strip every reference to `target` from every bean.
    ///
    /// Returns the number of references removed; a bean losing two different
    /// relations to the target counts twice. Beans are saved one at a time and
    /// a failed save stops the sweep without undoing earlier saves.
    pub fn remove_links_to(&mut self, target: &str) -> Result<usize> {
        let affected: Vec<String> = self
            .beans
            .values()
            .filter(|b| b.links().any(|(_, t)| t == target))
            .map(|b| b.id.clone())
            .collect();

        let mut total = 0;
        for id in affected {
            let mut bean = self.get(&id)?.clone();
            let removed: usize = LinkType::all()
                .iter()
                .map(|lt| bean.remove_link(*lt, target))
                .sum();
            self.persist(bean)?;
            total += removed;
        }

        tracing::debug!(target = %target, removed = total, "removed links");
        Ok(total)
    }

    /// Remove broken and self-referencing links. Cycles are left alone.
    pub fn fix_broken_links(&mut self) -> Result<usize> {
        let check = self.check_links();
        let mut invalid: BTreeMap<String, Vec<(LinkType, String)>> = BTreeMap::new();
        for broken in check.broken_links {
            invalid
                .entry(broken.bean_id)
                .or_default()
                .push((broken.link_type, broken.target));
        }
        for self_link in check.self_links {
            let target = self_link.bean_id.clone();
            invalid
                .entry(self_link.bean_id)
                .or_default()
                .push((self_link.link_type, target));
        }

        let mut total = 0;
        for (id, links) in invalid {
            let mut bean = self.get(&id)?.clone();
            let removed: usize = links
                .iter()
                .map(|(lt, target)| bean.remove_link(*lt, target))
                .sum();
            if removed > 0 {
                self.persist(bean)?;
                total += removed;
            }
        }

        tracing::debug!(fixed = total, "fixed broken links");
        Ok(total)
    }
}
