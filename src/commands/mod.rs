//! Command implementations for the Beans CLI.
//!
//! Each command opens the beans directory, does its work through
//! [`Core`] or the query layer, and returns a result that knows how to print
//! itself as JSON or as human-readable text.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;

use crate::beancore::Core;
use crate::config::{Config, Launcher};
use crate::launcher::{LaunchError, LaunchManager, LaunchSummary};
use crate::models::graph::LinkCheckResult;
use crate::models::{Bean, LinkType};
use crate::query::{self, BeanFilter, Progress, ProjectProgress, SortOrder};
use crate::storage::LoadWarning;
use crate::{Error, Result};

/// Command results that can be serialized to JSON or formatted for humans.
pub trait Output {
    /// Serialize to JSON string.
    fn to_json(&self) -> String;

    /// Format for human-readable output.
    fn to_human(&self) -> String;
}

fn json<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value)
        .unwrap_or_else(|e| serde_json::json!({ "error": e.to_string() }).to_string())
}

fn bean_line(bean: &Bean) -> String {
    let mut line = format!("{} [{}] {} ({})", bean.id, bean.status, bean.title, bean.bean_type);
    if let Some(priority) = &bean.priority {
        let _ = write!(line, " !{}", priority);
    }
    if !bean.tags.is_empty() {
        let _ = write!(line, " #{}", bean.tags.join(" #"));
    }
    line
}

// === Init ===

#[derive(Serialize)]
pub struct InitResult {
    pub beans_dir: PathBuf,
    /// False when a config file was already present
    pub config_written: bool,
}

impl Output for InitResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        if self.config_written {
            format!("Initialized beans in {}", self.beans_dir.display())
        } else {
            format!("Beans already initialized in {}", self.beans_dir.display())
        }
    }
}

/// Create the beans directory and default configuration.
pub fn init(beans_dir: &Path) -> Result<InitResult> {
    std::fs::create_dir_all(beans_dir)?;
    let config_written = Config::write_default(beans_dir)?;
    Core::load(beans_dir)?;
    Ok(InitResult {
        beans_dir: beans_dir.to_path_buf(),
        config_written,
    })
}

// === Create / Show / Update / Delete ===

/// A single bean together with its current ETag.
#[derive(Serialize)]
pub struct BeanResult {
    pub bean: Bean,
    pub etag: String,
}

impl Output for BeanResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        format!("{}\netag: {}", bean_line(&self.bean), self.etag)
    }
}

impl From<&Bean> for BeanResult {
    fn from(bean: &Bean) -> Self {
        Self {
            etag: bean.etag(),
            bean: bean.clone(),
        }
    }
}

/// Fields for a new bean.
#[derive(Debug, Default)]
pub struct CreateOptions {
    pub title: String,
    pub id: Option<String>,
    pub status: Option<String>,
    pub bean_type: Option<String>,
    pub priority: Option<String>,
    pub tags: Vec<String>,
    pub parent: Option<String>,
    pub blocking: Vec<String>,
    pub blocked_by: Vec<String>,
    pub body: Option<String>,
}

pub fn create(beans_dir: &Path, opts: CreateOptions) -> Result<BeanResult> {
    let mut core = Core::load(beans_dir)?;

    let mut bean = Bean::new(opts.id.unwrap_or_default(), opts.title);
    bean.status = opts.status.unwrap_or_default();
    bean.bean_type = opts.bean_type.unwrap_or_default();
    bean.priority = opts.priority;
    bean.tags = opts.tags;
    bean.body = opts.body.unwrap_or_default();
    bean.parent = opts.parent.map(|p| core.resolve_id(&p)).transpose()?;
    for target in &opts.blocking {
        bean.add_blocking(&core.resolve_id(target)?);
    }
    for target in &opts.blocked_by {
        bean.add_blocked_by(&core.resolve_id(target)?);
    }

    let created = core.create(bean)?;
    Ok(created.into())
}

/// A link pointing at the shown bean.
#[derive(Serialize)]
pub struct IncomingRef {
    pub from: String,
    pub link_type: LinkType,
}

#[derive(Serialize)]
pub struct ShowResult {
    pub bean: Bean,
    pub etag: String,
    /// Unresolved direct blockers
    pub blocked_by_active: Vec<String>,
    pub children: Vec<String>,
    pub incoming: Vec<IncomingRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<Progress>,
}

impl Output for ShowResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        let bean = &self.bean;
        let mut out = String::new();
        let _ = writeln!(out, "{}: {}", bean.id, bean.title);
        let _ = writeln!(out, "  status:   {}", bean.status);
        let _ = writeln!(out, "  type:     {}", bean.bean_type);
        if let Some(priority) = &bean.priority {
            let _ = writeln!(out, "  priority: {}", priority);
        }
        if !bean.tags.is_empty() {
            let _ = writeln!(out, "  tags:     {}", bean.tags.join(", "));
        }
        for (link_type, target) in bean.links() {
            let _ = writeln!(out, "  {} -> {}", link_type, target);
        }
        for incoming in &self.incoming {
            let _ = writeln!(out, "  {} <- {}", incoming.link_type, incoming.from);
        }
        if !self.blocked_by_active.is_empty() {
            let _ = writeln!(out, "  BLOCKED by {}", self.blocked_by_active.join(", "));
        }
        if let Some(progress) = &self.progress {
            let _ = writeln!(
                out,
                "  progress: {}/{} ({:.0}%)",
                progress.resolved, progress.total, progress.percentage
            );
        }
        let _ = write!(out, "  etag:     {}", self.etag);
        if !bean.body.is_empty() {
            let _ = write!(out, "\n\n{}", bean.body);
        }
        out
    }
}

pub fn show(beans_dir: &Path, id: &str) -> Result<ShowResult> {
    let core = Core::load(beans_dir)?;
    let id = core.resolve_id(id)?;
    let bean = core.get(&id)?;
    let graph = core.graph();

    let children: Vec<String> = graph.children(&id).iter().map(|b| b.id.clone()).collect();
    let progress = if children.is_empty() {
        None
    } else {
        Some(query::progress(&core, &id)?)
    };

    Ok(ShowResult {
        etag: bean.etag(),
        blocked_by_active: graph
            .active_blockers(&id)
            .iter()
            .map(|b| b.id.clone())
            .collect(),
        incoming: graph
            .find_incoming_links(&id)
            .iter()
            .map(|l| IncomingRef {
                from: l.from.id.clone(),
                link_type: l.link_type,
            })
            .collect(),
        children,
        progress,
        bean: bean.clone(),
    })
}

/// Field changes for an existing bean. `None` leaves a field alone.
#[derive(Debug, Default)]
pub struct UpdateOptions {
    pub title: Option<String>,
    pub status: Option<String>,
    pub bean_type: Option<String>,
    pub priority: Option<String>,
    pub add_tags: Vec<String>,
    pub remove_tags: Vec<String>,
    pub parent: Option<String>,
    pub clear_parent: bool,
    pub body: Option<String>,
    pub if_match: Option<String>,
}

pub fn update(beans_dir: &Path, id: &str, opts: UpdateOptions) -> Result<BeanResult> {
    let mut core = Core::load(beans_dir)?;
    let id = core.resolve_id(id)?;
    let mut bean = core.get(&id)?.clone();

    if let Some(title) = opts.title {
        bean.title = title;
    }
    if let Some(status) = opts.status {
        bean.status = status;
    }
    if let Some(bean_type) = opts.bean_type {
        bean.bean_type = bean_type;
    }
    if let Some(priority) = opts.priority {
        bean.priority = (!priority.is_empty()).then_some(priority);
    }
    for tag in &opts.add_tags {
        bean.add_tag(tag)?;
    }
    for tag in &opts.remove_tags {
        bean.remove_tag(tag);
    }
    if opts.clear_parent {
        bean.parent = None;
    } else if let Some(parent) = opts.parent {
        bean.parent = Some(core.resolve_id(&parent)?);
    }
    if let Some(body) = opts.body {
        bean.body = body;
    }

    let updated = core.update(bean, opts.if_match.as_deref())?;
    Ok(updated.into())
}

#[derive(Serialize)]
pub struct DeleteResult {
    pub id: String,
    /// References to the bean removed from other beans
    pub links_removed: usize,
}

impl Output for DeleteResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        if self.links_removed > 0 {
            format!(
                "Deleted {} (removed {} link(s) to it)",
                self.id, self.links_removed
            )
        } else {
            format!("Deleted {}", self.id)
        }
    }
}

/// Delete a bean, optionally stripping every reference to it first.
pub fn delete(beans_dir: &Path, id: &str, remove_links: bool) -> Result<DeleteResult> {
    let mut core = Core::load(beans_dir)?;
    let id = core.resolve_id(id)?;
    let links_removed = if remove_links {
        core.remove_links_to(&id)?
    } else {
        0
    };
    core.delete(&id)?;
    Ok(DeleteResult { id, links_removed })
}

// === List / Ready / Blocked ===

#[derive(Serialize)]
pub struct BeanList {
    pub beans: Vec<Bean>,
    pub count: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<LoadWarning>,
}

impl BeanList {
    fn new(beans: Vec<&Bean>, warnings: &[LoadWarning]) -> Self {
        Self {
            count: beans.len(),
            beans: beans.into_iter().cloned().collect(),
            warnings: warnings.to_vec(),
        }
    }
}

impl Output for BeanList {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        let mut lines: Vec<String> = self.beans.iter().map(bean_line).collect();
        if lines.is_empty() {
            lines.push("No beans found.".to_string());
        }
        for warning in &self.warnings {
            lines.push(format!(
                "warning: {}: {}",
                warning.path.display(),
                warning.message
            ));
        }
        lines.join("\n")
    }
}

pub fn list(beans_dir: &Path, filter: &BeanFilter, order: SortOrder) -> Result<BeanList> {
    let core = Core::load(beans_dir)?;
    let mut beans = query::filter_beans(&core, filter);
    query::sort_beans(&mut beans, order, core.config());
    Ok(BeanList::new(beans, core.warnings()))
}

pub fn ready(beans_dir: &Path) -> Result<BeanList> {
    let core = Core::load(beans_dir)?;
    Ok(BeanList::new(query::ready_beans(&core), &[]))
}

#[derive(Serialize)]
pub struct BlockedItem {
    pub bean: Bean,
    pub blockers: Vec<String>,
}

#[derive(Serialize)]
pub struct BlockedList {
    pub beans: Vec<BlockedItem>,
    pub count: usize,
}

impl Output for BlockedList {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        if self.beans.is_empty() {
            return "No blocked beans.".to_string();
        }
        self.beans
            .iter()
            .map(|item| {
                format!(
                    "{}\n  blocked by: {}",
                    bean_line(&item.bean),
                    item.blockers.join(", ")
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

pub fn blocked(beans_dir: &Path) -> Result<BlockedList> {
    let core = Core::load(beans_dir)?;
    let beans: Vec<BlockedItem> = query::blocked_beans(&core)
        .into_iter()
        .map(|entry| BlockedItem {
            bean: entry.bean.clone(),
            blockers: entry.blockers.iter().map(|b| b.id.clone()).collect(),
        })
        .collect();
    Ok(BlockedList {
        count: beans.len(),
        beans,
    })
}

// === Workflow ===

/// A status change applied by `start`, `complete` or `scrap`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Transition {
    Start,
    Complete,
    Scrap,
}

impl Transition {
    fn status(self) -> &'static str {
        match self {
            Transition::Start => query::STATUS_IN_PROGRESS,
            Transition::Complete => query::STATUS_COMPLETED,
            Transition::Scrap => query::STATUS_SCRAPPED,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Transition::Start => "Started",
            Transition::Complete => "Completed",
            Transition::Scrap => "Scrapped",
        }
    }
}

#[derive(Serialize)]
pub struct TransitionResult {
    pub action: Transition,
    /// Every bean that was found, changed or not
    pub beans: Vec<Bean>,
    pub count: usize,
    /// IDs whose status actually changed
    pub changed: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl Output for TransitionResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        let mut lines: Vec<String> = self
            .changed
            .iter()
            .map(|id| format!("{} {}", self.action.label(), id))
            .collect();
        lines.extend(self.warnings.iter().map(|w| format!("warning: {}", w)));
        lines.join("\n")
    }
}

fn blocker_message(id: &str, blockers: &[&Bean]) -> String {
    let list: Vec<String> = blockers
        .iter()
        .map(|b| format!("{} ({})", b.id, b.title))
        .collect();
    format!("{} is blocked by: {}", id, list.join(", "))
}

/// Move one bean to the transition's status. Returns the bean and whether
/// anything changed.
fn transition_one<F>(
    core: &mut Core,
    id: &str,
    transition: Transition,
    prepare: &mut F,
    warnings: &mut Vec<String>,
) -> Result<(Bean, bool)>
where
    F: FnMut(&Core, &mut Bean, &mut Vec<String>) -> Result<()>,
{
    let id = core.resolve_id(id)?;
    let mut bean = core.get(&id)?.clone();
    if bean.status == transition.status() {
        warnings.push(format!("{}: already {}", id, transition.status()));
        return Ok((bean, false));
    }
    prepare(&*core, &mut bean, warnings)?;
    bean.status = transition.status().to_string();
    let updated = core.update(bean, None)?;
    Ok((updated.clone(), true))
}

/// Apply a transition to each bean in turn.
///
/// A bean that fails is reported as a warning and the rest still move. The
/// first error is returned only when no bean could be handled at all.
fn apply_transition<F>(
    beans_dir: &Path,
    ids: &[String],
    transition: Transition,
    mut prepare: F,
) -> Result<TransitionResult>
where
    F: FnMut(&Core, &mut Bean, &mut Vec<String>) -> Result<()>,
{
    let mut core = Core::load(beans_dir)?;
    let mut beans = Vec::new();
    let mut changed = Vec::new();
    let mut warnings = Vec::new();
    let mut first_error = None;

    for id in ids {
        match transition_one(&mut core, id, transition, &mut prepare, &mut warnings) {
            Ok((bean, did_change)) => {
                if did_change {
                    changed.push(bean.id.clone());
                }
                beans.push(bean);
            }
            Err(e) => {
                warnings.push(e.to_string());
                first_error.get_or_insert(e);
            }
        }
    }

    if beans.is_empty() {
        if let Some(e) = first_error {
            return Err(e);
        }
    }
    Ok(TransitionResult {
        action: transition,
        count: beans.len(),
        beans,
        changed,
        warnings,
    })
}

/// Set beans to in-progress.
///
/// A bean with unresolved direct blockers is refused unless `force` is set.
/// Blockers inherited from a parent only produce a warning.
pub fn start(beans_dir: &Path, ids: &[String], force: bool) -> Result<TransitionResult> {
    apply_transition(beans_dir, ids, Transition::Start, |core, bean, warnings| {
        let graph = core.graph();
        let direct = graph.active_blockers(&bean.id);
        if !direct.is_empty() {
            let message = blocker_message(&bean.id, &direct);
            if !force {
                return Err(Error::Validation(message));
            }
            warnings.push(format!("{}, starting anyway", message));
            return Ok(());
        }
        let inherited = graph.transitive_blockers(&bean.id);
        if !inherited.is_empty() {
            warnings.push(format!(
                "{} (through a parent)",
                blocker_message(&bean.id, &inherited)
            ));
        }
        Ok(())
    })
}

/// Mark beans completed, appending an optional summary to each body.
pub fn complete(beans_dir: &Path, ids: &[String], summary: Option<&str>) -> Result<TransitionResult> {
    apply_transition(beans_dir, ids, Transition::Complete, |_, bean, _| {
        if let Some(summary) = summary.filter(|s| !s.trim().is_empty()) {
            bean.append_body(&format!("## Summary of Changes\n\n{}", summary));
        }
        Ok(())
    })
}

/// Mark beans scrapped. The reason is required and appended to each body.
pub fn scrap(beans_dir: &Path, ids: &[String], reason: &str) -> Result<TransitionResult> {
    if reason.trim().is_empty() {
        return Err(Error::Validation("a reason is required to scrap a bean".to_string()));
    }
    apply_transition(beans_dir, ids, Transition::Scrap, |_, bean, _| {
        bean.append_body(&format!("## Reasons for Scrapping\n\n{}", reason));
        Ok(())
    })
}

#[derive(Serialize)]
pub struct NextResult {
    pub bean: Option<Bean>,
}

impl Output for NextResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        match &self.bean {
            Some(bean) => bean_line(bean),
            None => "No beans ready to start.".to_string(),
        }
    }
}

pub fn next(beans_dir: &Path) -> Result<NextResult> {
    let core = Core::load(beans_dir)?;
    Ok(NextResult {
        bean: query::next_bean(&core).cloned(),
    })
}

// === Progress ===

#[derive(Serialize)]
pub struct ProgressReport {
    #[serde(flatten)]
    pub progress: ProjectProgress,
    #[serde(skip)]
    status_order: Vec<String>,
    #[serde(skip)]
    type_order: Vec<String>,
}

/// `name count` lines in configured order, then any names the config lacks.
fn count_lines(counts: &BTreeMap<String, usize>, order: &[String]) -> Vec<String> {
    let known = order.iter().filter_map(|name| counts.get(name).map(|n| (name, n)));
    let unknown = counts.iter().filter(|(name, _)| !order.contains(*name));
    known
        .chain(unknown)
        .map(|(name, n)| format!("  {:<12} {}", name, n))
        .collect()
}

impl Output for ProgressReport {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        let p = &self.progress;
        let mut lines = vec![format!("Project progress ({} beans)", p.total), String::new()];
        lines.push("By status".to_string());
        lines.extend(count_lines(&p.by_status, &self.status_order));
        lines.push(String::new());
        lines.push("By type".to_string());
        lines.extend(count_lines(&p.by_type, &self.type_order));
        lines.push(String::new());
        if p.transitively_blocked == 0 {
            lines.push("No blocked beans".to_string());
        } else {
            lines.push(format!(
                "Blocked: {} bean(s), {} including inherited blockers",
                p.blocked, p.transitively_blocked
            ));
        }
        lines.join("\n")
    }
}

pub fn progress(beans_dir: &Path) -> Result<ProgressReport> {
    let core = Core::load(beans_dir)?;
    Ok(ProgressReport {
        progress: query::project_progress(&core),
        status_order: core.config().statuses.clone(),
        type_order: core.config().types.clone(),
    })
}

#[derive(Serialize)]
pub struct MilestoneItem {
    pub milestone: Bean,
    pub progress: Progress,
}

#[derive(Serialize)]
pub struct MilestoneList {
    pub milestones: Vec<MilestoneItem>,
    pub count: usize,
}

impl Output for MilestoneList {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        if self.milestones.is_empty() {
            return "No milestones found.".to_string();
        }
        let mut lines = Vec::new();
        for item in &self.milestones {
            let m = &item.milestone;
            lines.push(format!("{} [{}] {}", m.id, m.status, m.title));
            let p = &item.progress;
            if p.total == 0 {
                lines.push("  No children".to_string());
            } else {
                lines.push(format!("  {:.0}% ({}/{})", p.percentage, p.resolved, p.total));
            }
        }
        lines.join("\n")
    }
}

pub fn milestones(beans_dir: &Path, include_resolved: bool) -> Result<MilestoneList> {
    let core = Core::load(beans_dir)?;
    let milestones: Vec<MilestoneItem> = query::milestones(&core, include_resolved)?
        .into_iter()
        .map(|m| MilestoneItem {
            milestone: m.milestone.clone(),
            progress: m.progress,
        })
        .collect();
    Ok(MilestoneList {
        count: milestones.len(),
        milestones,
    })
}

// === Archive ===

#[derive(Serialize)]
pub struct ArchiveResult {
    pub archived: Vec<String>,
    /// References to archived beans removed from the remaining ones
    pub links_removed: usize,
}

impl Output for ArchiveResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        if self.archived.is_empty() {
            return "No resolved beans to archive.".to_string();
        }
        let mut out = format!("Archived {} bean(s)", self.archived.len());
        if self.links_removed > 0 {
            let _ = write!(out, " (removed {} link(s) to them)", self.links_removed);
        }
        out
    }
}

/// Delete every bean in a resolved status.
pub fn archive(beans_dir: &Path, remove_links: bool) -> Result<ArchiveResult> {
    let mut core = Core::load(beans_dir)?;
    let archived: Vec<String> = core
        .all()
        .into_iter()
        .filter(|b| core.config().is_resolved(&b.status))
        .map(|b| b.id.clone())
        .collect();

    for id in &archived {
        core.delete(id)?;
    }
    let mut links_removed = 0;
    if remove_links {
        for id in &archived {
            links_removed += core.remove_links_to(id)?;
        }
    }
    tracing::info!(count = archived.len(), links_removed, "archived beans");
    Ok(ArchiveResult {
        archived,
        links_removed,
    })
}

// === Links ===

#[derive(Serialize)]
pub struct LinkResult {
    pub id: String,
    pub link_type: LinkType,
    pub target: String,
    /// Number of references added or removed
    pub changed: usize,
}

impl Output for LinkResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        if self.changed == 0 {
            format!("No change: {} {} {}", self.id, self.link_type, self.target)
        } else {
            format!("{} {} {}", self.id, self.link_type, self.target)
        }
    }
}

/// Add a link from `id` to `target`.
pub fn link(beans_dir: &Path, id: &str, link_type: LinkType, target: &str) -> Result<LinkResult> {
    let mut core = Core::load(beans_dir)?;
    let id = core.resolve_id(id)?;
    let target = core.resolve_id(target)?;
    let added = if link_type == LinkType::Parent {
        let unchanged = core.get(&id)?.parent.as_deref() == Some(target.as_str());
        core.set_parent(&id, Some(&target))?;
        !unchanged
    } else {
        core.add_link(&id, link_type, &target)?
    };
    Ok(LinkResult {
        id,
        link_type,
        target,
        changed: usize::from(added),
    })
}

/// Remove a link. The target does not need to exist, so broken links can be
/// removed by hand.
pub fn unlink(beans_dir: &Path, id: &str, link_type: LinkType, target: &str) -> Result<LinkResult> {
    let mut core = Core::load(beans_dir)?;
    let id = core.resolve_id(id)?;
    let target = core.normalize_id(target).unwrap_or_else(|| target.to_string());
    let changed = core.remove_link(&id, link_type, &target)?;
    Ok(LinkResult {
        id,
        link_type,
        target,
        changed,
    })
}

#[derive(Serialize)]
pub struct CheckReport {
    #[serde(flatten)]
    pub result: LinkCheckResult,
    pub total_issues: usize,
    /// Links removed by `--fix`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fixed: Option<usize>,
}

impl Output for CheckReport {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        let mut lines = Vec::new();
        if let Some(fixed) = self.fixed {
            lines.push(format!("Removed {} invalid link(s).", fixed));
        }
        for broken in &self.result.broken_links {
            lines.push(format!(
                "broken link: {} {} {} (not found)",
                broken.bean_id, broken.link_type, broken.target
            ));
        }
        for self_link in &self.result.self_links {
            lines.push(format!(
                "self link: {} {} itself",
                self_link.bean_id, self_link.link_type
            ));
        }
        for cycle in &self.result.cycles {
            lines.push(format!(
                "{} cycle: {}",
                cycle.link_type,
                cycle.path.join(" -> ")
            ));
        }
        if self.total_issues == 0 {
            lines.push("No link issues found.".to_string());
        }
        lines.join("\n")
    }
}

/// Scan for broken links, self links and cycles; with `fix`, remove the
/// broken and self links first and report what remains.
pub fn check(beans_dir: &Path, fix: bool) -> Result<CheckReport> {
    let mut core = Core::load(beans_dir)?;
    let fixed = if fix {
        Some(core.fix_broken_links()?)
    } else {
        None
    };
    let result = core.check_links();
    Ok(CheckReport {
        total_issues: result.total_issues(),
        result,
        fixed,
    })
}

// === Launch ===

/// Which script to run for `beans launch`.
#[derive(Debug, Clone)]
pub enum LaunchTarget {
    Named(String),
    Exec(String),
}

#[derive(Serialize)]
pub struct LaunchReport {
    pub launcher: String,
    #[serde(flatten)]
    pub summary: LaunchSummary,
}

impl LaunchReport {
    pub fn success(&self) -> bool {
        self.summary.all_successful
    }
}

impl Output for LaunchReport {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        let mut lines: Vec<String> = self
            .summary
            .launches
            .iter()
            .map(|launch| {
                let mut line = format!("{} {}: {}", launch.status, launch.bean.id, launch.bean.title);
                if let Some(duration) = launch.duration() {
                    let _ = write!(line, " ({}ms)", duration.num_milliseconds());
                }
                line
            })
            .collect();
        let counts = self.summary.counts;
        lines.push(format!(
            "{}: {} succeeded, {} failed, {} total",
            self.launcher, counts.success, counts.failed, counts.total
        ));
        if let Some(first) = &self.summary.first_error {
            if let Some(error) = &first.error {
                lines.push(format!("first failure ({}): {}", first.bean.id, error));
            }
        }
        lines.join("\n")
    }
}

/// Run a launcher against the given beans in parallel and wait for them.
///
/// Ctrl-C stops every running launch.
pub fn launch(beans_dir: &Path, target: LaunchTarget, ids: &[String]) -> Result<LaunchReport> {
    let core = Core::load(beans_dir)?;
    let launcher = match target {
        LaunchTarget::Named(name) => core
            .config()
            .launcher(&name)
            .cloned()
            .ok_or(LaunchError::UnknownLauncher(name))?,
        LaunchTarget::Exec(exec) => Launcher {
            name: "exec".to_string(),
            exec,
            description: None,
        },
    };
    if ids.is_empty() {
        return Err(Error::Validation("no beans given to launch".to_string()));
    }

    let mut beans = Vec::with_capacity(ids.len());
    for id in ids {
        let id = core.resolve_id(id)?;
        beans.push(core.get(&id)?.clone());
    }

    let beans_dir = std::path::absolute(core.beans_dir())?;
    let name = launcher.name.clone();
    let manager = Arc::new(LaunchManager::new(launcher, beans));

    let interrupt = Arc::downgrade(&manager);
    if let Err(e) = ctrlc::set_handler(move || {
        if let Some(manager) = interrupt.upgrade() {
            manager.stop();
        }
    }) {
        tracing::warn!(error = %e, "could not install Ctrl-C handler");
    }

    manager.start(&beans_dir)?;
    let summary = manager.wait();
    Ok(LaunchReport {
        launcher: name,
        summary,
    })
}
