//! CLI argument definitions for Beans.

use clap::{Args, Parser, Subcommand};

use crate::models::LinkType;
use crate::query::{BeanFilter, SortOrder};

/// Beans - work items as a graph of markdown files.
///
/// Start with `beans init`, then `beans create` and `beans ready` to find work.
#[derive(Parser, Debug)]
#[command(name = "beans")]
#[command(author, version, about = "Track work items as linked markdown files", long_about = None)]
pub struct Cli {
    /// Output in human-readable format instead of JSON
    #[arg(short = 'H', long = "human", global = true)]
    pub human_readable: bool,

    /// Use <path> as the beans directory instead of searching upwards for `.beans`.
    /// Can also be set via BEANS_PATH environment variable.
    #[arg(short = 'C', long = "beans-path", global = true, env = "BEANS_PATH")]
    pub beans_path: Option<std::path::PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the beans directory and a default config.kdl
    Init,

    /// Create a new bean
    Create {
        /// Bean title
        title: String,

        /// Explicit ID (generated when omitted)
        #[arg(long)]
        id: Option<String>,

        #[arg(short, long)]
        status: Option<String>,

        #[arg(short = 't', long = "type")]
        bean_type: Option<String>,

        #[arg(short, long)]
        priority: Option<String>,

        /// Tag to add (repeatable)
        #[arg(long = "tag")]
        tags: Vec<String>,

        /// Parent bean ID
        #[arg(long)]
        parent: Option<String>,

        /// ID of a bean this one blocks (repeatable)
        #[arg(long)]
        blocking: Vec<String>,

        /// ID of a bean blocking this one (repeatable)
        #[arg(long = "blocked-by")]
        blocked_by: Vec<String>,

        /// Markdown body
        #[arg(short, long)]
        body: Option<String>,
    },

    /// Show a bean with its links
    Show {
        /// Bean ID (full, without prefix, or a unique prefix)
        id: String,
    },

    /// List beans
    List {
        #[command(flatten)]
        filter: FilterArgs,

        /// Sort order: default, created, updated, status, priority, id
        #[arg(long, default_value = "default")]
        sort: SortOrder,
    },

    /// Change fields of a bean
    Update {
        id: String,

        #[arg(long)]
        title: Option<String>,

        #[arg(short, long)]
        status: Option<String>,

        #[arg(short = 't', long = "type")]
        bean_type: Option<String>,

        /// New priority; an empty string clears it
        #[arg(short, long)]
        priority: Option<String>,

        /// Tag to add (repeatable)
        #[arg(long = "tag")]
        add_tags: Vec<String>,

        /// Tag to remove (repeatable)
        #[arg(long = "remove-tag")]
        remove_tags: Vec<String>,

        /// New parent bean ID
        #[arg(long, conflicts_with = "no_parent")]
        parent: Option<String>,

        /// Remove the parent
        #[arg(long)]
        no_parent: bool,

        /// Replace the markdown body
        #[arg(short, long)]
        body: Option<String>,

        /// Only update if the bean's current ETag matches
        #[arg(long)]
        if_match: Option<String>,
    },

    /// Delete a bean
    Delete {
        id: String,

        /// Also remove every link pointing at the bean
        #[arg(long)]
        remove_links: bool,
    },

    /// Add a link: `beans link <id> <type> <target>`
    Link {
        id: String,
        /// parent, blocking, blocked_by, related or duplicates
        link_type: LinkType,
        target: String,
    },

    /// Remove a link: `beans unlink <id> <type> <target>`
    Unlink {
        id: String,
        link_type: LinkType,
        target: String,
    },

    /// Show beans ready to work on (no unresolved blockers)
    Ready,

    /// Show beans waiting on unresolved blockers
    Blocked,

    /// Show the highest-priority bean ready to start
    Next,

    /// Set beans to in-progress, refusing blocked ones unless forced
    Start {
        #[arg(required = true)]
        ids: Vec<String>,

        /// Start even if a bean is blocked
        #[arg(short, long)]
        force: bool,
    },

    /// Mark beans as completed
    Complete {
        #[arg(required = true)]
        ids: Vec<String>,

        /// Summary of changes to append to the body
        #[arg(short = 'm', long)]
        summary: Option<String>,
    },

    /// Mark beans as scrapped
    Scrap {
        #[arg(required = true)]
        ids: Vec<String>,

        /// Why the work was dropped; appended to the body
        #[arg(short = 'm', long, required = true)]
        reason: String,
    },

    /// Counts by status and type, plus blocked beans
    Progress,

    /// Milestones with the completion of everything below them
    Milestones {
        /// Include completed and scrapped milestones
        #[arg(long)]
        include_done: bool,
    },

    /// Delete every bean in a resolved status
    Archive {
        /// Also remove links pointing at the archived beans
        #[arg(long)]
        remove_links: bool,
    },

    /// Check links for broken targets, self references and cycles
    Check {
        /// Remove broken and self-referencing links
        #[arg(long)]
        fix: bool,
    },

    /// Run a launcher against beans in parallel
    Launch {
        /// Name of a launcher from config.kdl
        #[arg(short, long, conflicts_with = "exec", required_unless_present = "exec")]
        launcher: Option<String>,

        /// Ad-hoc script to run instead of a configured launcher
        #[arg(short, long)]
        exec: Option<String>,

        /// Bean IDs
        #[arg(required = true)]
        ids: Vec<String>,
    },
}

/// Filters shared by listing commands.
#[derive(Args, Debug, Default)]
pub struct FilterArgs {
    /// Only these statuses (repeatable)
    #[arg(short, long = "status")]
    pub status: Vec<String>,

    /// Exclude these statuses (repeatable)
    #[arg(long = "no-status")]
    pub exclude_status: Vec<String>,

    /// Only these types (repeatable)
    #[arg(short = 't', long = "type")]
    pub bean_type: Vec<String>,

    #[arg(long = "no-type")]
    pub exclude_type: Vec<String>,

    #[arg(short, long = "priority")]
    pub priority: Vec<String>,

    #[arg(long = "no-priority")]
    pub exclude_priority: Vec<String>,

    /// Beans with any of these tags
    #[arg(long = "tag")]
    pub tag: Vec<String>,

    #[arg(long = "no-tag")]
    pub exclude_tag: Vec<String>,

    /// Only children of this bean
    #[arg(long)]
    pub parent: Option<String>,

    /// Only beans with a parent
    #[arg(long, conflicts_with = "no_parent")]
    pub has_parent: bool,

    /// Only beans without a parent
    #[arg(long)]
    pub no_parent: bool,

    /// Beans with outgoing links of this type
    #[arg(long)]
    pub has_link: Vec<LinkType>,

    /// Beans without outgoing links of this type
    #[arg(long)]
    pub no_link: Vec<LinkType>,

    /// Beans targeted by links of this type
    #[arg(long)]
    pub linked_as: Vec<LinkType>,

    /// Beans not targeted by links of this type
    #[arg(long)]
    pub not_linked_as: Vec<LinkType>,

    /// Only beans with an unresolved direct blocker
    #[arg(long, conflicts_with = "unblocked")]
    pub blocked: bool,

    /// Only beans without an unresolved direct blocker
    #[arg(long)]
    pub unblocked: bool,
}

fn flag(yes: bool, no: bool) -> Option<bool> {
    match (yes, no) {
        (true, _) => Some(true),
        (_, true) => Some(false),
        _ => None,
    }
}

impl FilterArgs {
    /// Build a query filter. `parent` must already be a resolved ID.
    pub fn into_filter(self, parent: Option<String>) -> BeanFilter {
        BeanFilter {
            statuses: self.status,
            exclude_statuses: self.exclude_status,
            types: self.bean_type,
            exclude_types: self.exclude_type,
            priorities: self.priority,
            exclude_priorities: self.exclude_priority,
            tags: self.tag,
            exclude_tags: self.exclude_tag,
            has_parent: flag(self.has_parent, self.no_parent),
            parent,
            has_links: self.has_link,
            no_links: self.no_link,
            linked_as: self.linked_as,
            not_linked_as: self.not_linked_as,
            blocked: flag(self.blocked, self.unblocked),
        }
    }
}
