//! Filtering, sorting and the derived views (`ready`, `blocked`, progress).
//!
//! Filters combine with AND across fields and OR within one field's list.
//! Incoming-link filters go through [`LinkGraph::find_incoming_links`].

use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use crate::beancore::Core;
use crate::config::Config;
use crate::models::graph::LinkGraph;
use crate::models::{Bean, LinkType};
use crate::{Error, Result};

/// Status of work that has been picked up.
pub const STATUS_IN_PROGRESS: &str = "in-progress";
/// Status of work that is not yet ready to be picked up.
pub const STATUS_DRAFT: &str = "draft";
/// Status set by `beans complete`.
pub const STATUS_COMPLETED: &str = "completed";
/// Status set by `beans scrap`.
pub const STATUS_SCRAPPED: &str = "scrapped";
/// Type aggregated by the milestones view.
pub const TYPE_MILESTONE: &str = "milestone";

/// Criteria for selecting beans.
#[derive(Debug, Clone, Default)]
pub struct BeanFilter {
    pub statuses: Vec<String>,
    pub exclude_statuses: Vec<String>,
    pub types: Vec<String>,
    pub exclude_types: Vec<String>,
    pub priorities: Vec<String>,
    pub exclude_priorities: Vec<String>,
    /// Match beans with any of these tags
    pub tags: Vec<String>,
    /// Drop beans with any of these tags
    pub exclude_tags: Vec<String>,
    /// Require (true) or forbid (false) a parent
    pub has_parent: Option<bool>,
    /// Require this exact parent
    pub parent: Option<String>,
    /// Require at least one outgoing link of any of these types
    pub has_links: Vec<LinkType>,
    /// Forbid outgoing links of these types
    pub no_links: Vec<LinkType>,
    /// Require at least one incoming link of any of these types
    pub linked_as: Vec<LinkType>,
    /// Forbid incoming links of these types
    pub not_linked_as: Vec<LinkType>,
    /// Require (true) or forbid (false) an unresolved direct blocker
    pub blocked: Option<bool>,
}

fn in_list(list: &[String], value: &str) -> bool {
    list.iter().any(|v| v == value)
}

impl BeanFilter {
    pub fn is_empty(&self) -> bool {
        self.statuses.is_empty()
            && self.exclude_statuses.is_empty()
            && self.types.is_empty()
            && self.exclude_types.is_empty()
            && self.priorities.is_empty()
            && self.exclude_priorities.is_empty()
            && self.tags.is_empty()
            && self.exclude_tags.is_empty()
            && self.has_parent.is_none()
            && self.parent.is_none()
            && self.has_links.is_empty()
            && self.no_links.is_empty()
            && self.linked_as.is_empty()
            && self.not_linked_as.is_empty()
            && self.blocked.is_none()
    }

    /// Check one bean against every criterion.
    pub fn matches(&self, graph: &LinkGraph<'_>, bean: &Bean) -> bool {
        let priority = bean.priority.as_deref().unwrap_or("");

        if !self.statuses.is_empty() && !in_list(&self.statuses, &bean.status) {
            return false;
        }
        if in_list(&self.exclude_statuses, &bean.status) {
            return false;
        }
        if !self.types.is_empty() && !in_list(&self.types, &bean.bean_type) {
            return false;
        }
        if in_list(&self.exclude_types, &bean.bean_type) {
            return false;
        }
        if !self.priorities.is_empty() && !in_list(&self.priorities, priority) {
            return false;
        }
        if in_list(&self.exclude_priorities, priority) {
            return false;
        }
        if !self.tags.is_empty() && !self.tags.iter().any(|t| bean.has_tag(t)) {
            return false;
        }
        if self.exclude_tags.iter().any(|t| bean.has_tag(t)) {
            return false;
        }

        if let Some(want) = self.has_parent {
            if bean.parent.is_some() != want {
                return false;
            }
        }
        if let Some(parent) = self.parent.as_deref() {
            if bean.parent.as_deref() != Some(parent) {
                return false;
            }
        }

        if !self.has_links.is_empty() && !self.has_links.iter().any(|lt| bean.has_links(*lt)) {
            return false;
        }
        if self.no_links.iter().any(|lt| bean.has_links(*lt)) {
            return false;
        }

        if !self.linked_as.is_empty() || !self.not_linked_as.is_empty() {
            let incoming = graph.find_incoming_links(&bean.id);
            let has = |lt: &LinkType| incoming.iter().any(|l| l.link_type == *lt);
            if !self.linked_as.is_empty() && !self.linked_as.iter().any(has) {
                return false;
            }
            if self.not_linked_as.iter().any(has) {
                return false;
            }
        }

        if let Some(want) = self.blocked {
            if graph.is_blocked(&bean.id) != want {
                return false;
            }
        }

        true
    }
}

/// Select the beans matching a filter, in ID order.
pub fn filter_beans<'a>(core: &'a Core, filter: &BeanFilter) -> Vec<&'a Bean> {
    let graph = core.graph();
    core.all()
        .into_iter()
        .filter(|bean| filter.matches(&graph, bean))
        .collect()
}

/// How to order a list of beans.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    /// Status order, then priority, then type, then title
    #[default]
    Default,
    /// Newest first
    Created,
    /// Most recently updated first
    Updated,
    Status,
    Priority,
    Id,
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SortOrder::Default => "default",
            SortOrder::Created => "created",
            SortOrder::Updated => "updated",
            SortOrder::Status => "status",
            SortOrder::Priority => "priority",
            SortOrder::Id => "id",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for SortOrder {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "default" => Ok(SortOrder::Default),
            "created" => Ok(SortOrder::Created),
            "updated" => Ok(SortOrder::Updated),
            "status" => Ok(SortOrder::Status),
            "priority" => Ok(SortOrder::Priority),
            "id" => Ok(SortOrder::Id),
            _ => Err(Error::Validation(format!("unknown sort order: {}", s))),
        }
    }
}

/// Sort beans in place. Ties always fall back to the ID.
pub fn sort_beans(beans: &mut [&Bean], order: SortOrder, config: &Config) {
    beans.sort_by(|a, b| compare(a, b, order, config).then_with(|| a.id.cmp(&b.id)));
}

fn compare(a: &Bean, b: &Bean, order: SortOrder, config: &Config) -> Ordering {
    let status = || config.status_rank(&a.status).cmp(&config.status_rank(&b.status));
    let priority = || {
        config
            .priority_rank(a.priority.as_deref())
            .cmp(&config.priority_rank(b.priority.as_deref()))
    };
    match order {
        SortOrder::Default => status()
            .then_with(priority)
            .then_with(|| config.type_rank(&a.bean_type).cmp(&config.type_rank(&b.bean_type)))
            .then_with(|| a.title.to_lowercase().cmp(&b.title.to_lowercase())),
        // None sorts after any timestamp
        SortOrder::Created => newest_first(a.created_at, b.created_at),
        SortOrder::Updated => newest_first(a.updated_at, b.updated_at),
        SortOrder::Status => status(),
        SortOrder::Priority => priority(),
        SortOrder::Id => Ordering::Equal,
    }
}

fn newest_first<T: Ord>(a: Option<T>, b: Option<T>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => b.cmp(&a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Beans that can be started now: not in progress, not drafts, not resolved
/// and without an unresolved direct blocker.
pub fn ready_beans(core: &Core) -> Vec<&Bean> {
    let config = core.config();
    let graph = core.graph();
    let mut ready: Vec<&Bean> = core
        .all()
        .into_iter()
        .filter(|b| {
            b.status != STATUS_IN_PROGRESS
                && b.status != STATUS_DRAFT
                && !config.is_resolved(&b.status)
                && !graph.is_blocked(&b.id)
        })
        .collect();
    sort_beans(&mut ready, SortOrder::Default, config);
    ready
}

/// A blocked bean with the beans blocking it.
#[derive(Debug, Clone, Serialize)]
pub struct BlockedEntry<'a> {
    pub bean: &'a Bean,
    pub blockers: Vec<&'a Bean>,
}

/// Unresolved beans with at least one unresolved direct blocker.
pub fn blocked_beans(core: &Core) -> Vec<BlockedEntry<'_>> {
    let config = core.config();
    let graph = core.graph();
    let mut beans: Vec<&Bean> = core
        .all()
        .into_iter()
        .filter(|b| !config.is_resolved(&b.status))
        .collect();
    sort_beans(&mut beans, SortOrder::Default, config);

    beans
        .into_iter()
        .filter_map(|bean| {
            let blockers = graph.active_blockers(&bean.id);
            (!blockers.is_empty()).then_some(BlockedEntry { bean, blockers })
        })
        .collect()
}

/// Completion statistics for everything below a bean.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Progress {
    /// Number of descendants
    pub total: usize,
    /// Number of descendants in a resolved status
    pub resolved: usize,
    /// Completion percentage (0-100)
    pub percentage: f64,
    /// Descendant count per status
    pub by_status: BTreeMap<String, usize>,
}

impl Progress {
    pub fn new(total: usize, resolved: usize, by_status: BTreeMap<String, usize>) -> Self {
        let percentage = if total > 0 {
            (resolved as f64 / total as f64) * 100.0
        } else {
            0.0
        };
        Self {
            total,
            resolved,
            percentage,
            by_status,
        }
    }
}

/// Progress over every descendant of a bean.
pub fn progress(core: &Core, id: &str) -> Result<Progress> {
    core.get(id)?;
    let descendants = core.graph().descendants(id);

    let mut by_status = BTreeMap::new();
    let mut resolved = 0;
    for bean in &descendants {
        *by_status.entry(bean.status.clone()).or_insert(0) += 1;
        if core.config().is_resolved(&bean.status) {
            resolved += 1;
        }
    }
    Ok(Progress::new(descendants.len(), resolved, by_status))
}

/// The ready bean to pick up next: highest priority first, then by ID.
pub fn next_bean(core: &Core) -> Option<&Bean> {
    let mut ready = ready_beans(core);
    sort_beans(&mut ready, SortOrder::Priority, core.config());
    ready.first().copied()
}

/// Counts over the whole collection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectProgress {
    pub total: usize,
    pub by_status: BTreeMap<String, usize>,
    pub by_type: BTreeMap<String, usize>,
    /// Unresolved beans with an unresolved direct blocker
    pub blocked: usize,
    /// Unresolved beans blocked directly or through an ancestor
    pub transitively_blocked: usize,
}

pub fn project_progress(core: &Core) -> ProjectProgress {
    let config = core.config();
    let graph = core.graph();
    let mut by_status = BTreeMap::new();
    let mut by_type = BTreeMap::new();
    let mut blocked = 0;
    let mut transitively_blocked = 0;

    for bean in core.all() {
        *by_status.entry(bean.status.clone()).or_insert(0) += 1;
        *by_type.entry(bean.bean_type.clone()).or_insert(0) += 1;
        if config.is_resolved(&bean.status) {
            continue;
        }
        if graph.is_blocked(&bean.id) {
            blocked += 1;
        }
        if graph.is_transitively_blocked(&bean.id) {
            transitively_blocked += 1;
        }
    }

    ProjectProgress {
        total: core.all().len(),
        by_status,
        by_type,
        blocked,
        transitively_blocked,
    }
}

/// A milestone with the progress of everything below it.
#[derive(Debug, Clone, Serialize)]
pub struct MilestoneProgress<'a> {
    pub milestone: &'a Bean,
    pub progress: Progress,
}

/// Every milestone in status order, oldest first within a status.
///
/// Resolved milestones are left out unless `include_resolved` is set.
pub fn milestones(core: &Core, include_resolved: bool) -> Result<Vec<MilestoneProgress<'_>>> {
    let config = core.config();
    let mut found: Vec<&Bean> = core
        .all()
        .into_iter()
        .filter(|b| b.bean_type == TYPE_MILESTONE)
        .filter(|b| include_resolved || !config.is_resolved(&b.status))
        .collect();
    found.sort_by(|a, b| {
        config
            .status_rank(&a.status)
            .cmp(&config.status_rank(&b.status))
            // Oldest first, missing timestamps last
            .then_with(|| a.created_at.is_none().cmp(&b.created_at.is_none()))
            .then_with(|| a.created_at.cmp(&b.created_at))
            .then_with(|| a.id.cmp(&b.id))
    });

    found
        .into_iter()
        .map(|milestone| {
            Ok(MilestoneProgress {
                milestone,
                progress: progress(core, &milestone.id)?,
            })
        })
        .collect()
}
