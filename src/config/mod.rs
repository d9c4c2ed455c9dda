//! Project configuration for Beans.
//!
//! Configuration lives in `config.kdl` inside the beans directory. It is read
//! once and injected into [`crate::beancore::Core`]; nothing in the crate looks
//! it up globally.
//!
//! # KDL Schema
//!
//! ```kdl
//! prefix "beans-"
//! id-length 4
//! statuses "in-progress" "todo" "draft" "completed" "scrapped"
//! resolved-statuses "completed" "scrapped"
//! types "milestone" "epic" "bug" "feature" "task"
//! priorities "critical" "high" "normal" "low" "deferred"
//! default-status "todo"
//! default-type "task"
//!
//! // Legal parent types per bean type. A type with no arguments may not have
//! // a parent; a type that is not listed may have any parent.
//! hierarchy {
//!     milestone
//!     epic "milestone"
//! }
//!
//! launcher "agent" {
//!     exec "my-agent --bean $BEANS_ID"
//!     description "Run the agent on a bean"
//! }
//! ```
//!
//! The order of `statuses`, `types` and `priorities` drives default sorting.

use kdl::{KdlDocument, KdlNode};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::{Error, Result};

/// Name of the configuration file inside the beans directory.
pub const CONFIG_FILE_NAME: &str = "config.kdl";

/// The configuration written by `beans init`. Parses to [`Config::default`].
pub const DEFAULT_CONFIG_KDL: &str = r#"// Beans project configuration

// ID prefix and number of random characters after it
prefix "beans-"
id-length 4

// Status order drives default sorting
statuses "in-progress" "todo" "draft" "completed" "scrapped"
resolved-statuses "completed" "scrapped"
types "milestone" "epic" "bug" "feature" "task"
priorities "critical" "high" "normal" "low" "deferred"
default-status "todo"
default-type "task"

// Legal parent types per bean type
hierarchy {
    milestone
    epic "milestone"
    feature "milestone" "epic"
    task "milestone" "epic"
    bug "milestone" "epic"
}

// External launchers, run with `beans launch --launcher <name>`:
//
// launcher "agent" {
//     exec "my-agent --bean $BEANS_ID"
//     description "Run the agent on a bean"
// }
"#;

/// A named external command that can be launched against beans.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Launcher {
    pub name: String,
    /// Script to run; single line runs through `sh -c`, multi-line needs a shebang
    pub exec: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Beans project configuration.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Config {
    /// Prefix for generated IDs
    pub prefix: String,
    /// Number of random characters in generated IDs
    pub id_length: usize,
    /// Ordered list of valid statuses
    pub statuses: Vec<String>,
    /// Statuses that count as done for blocking purposes
    pub resolved_statuses: Vec<String>,
    /// Ordered list of valid types
    pub types: Vec<String>,
    /// Ordered list of valid priorities
    pub priorities: Vec<String>,
    pub default_status: String,
    pub default_type: String,
    /// Legal parent types per type
    pub hierarchy: BTreeMap<String, Vec<String>>,
    pub launchers: Vec<Launcher>,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for Config {
    fn default() -> Self {
        let mut hierarchy = BTreeMap::new();
        hierarchy.insert("milestone".to_string(), Vec::new());
        hierarchy.insert("epic".to_string(), strings(&["milestone"]));
        for t in ["feature", "task", "bug"] {
            hierarchy.insert(t.to_string(), strings(&["milestone", "epic"]));
        }

        Self {
            prefix: "beans-".to_string(),
            id_length: 4,
            statuses: strings(&["in-progress", "todo", "draft", "completed", "scrapped"]),
            resolved_statuses: strings(&["completed", "scrapped"]),
            types: strings(&["milestone", "epic", "bug", "feature", "task"]),
            priorities: strings(&["critical", "high", "normal", "low", "deferred"]),
            default_status: "todo".to_string(),
            default_type: "task".to_string(),
            hierarchy,
            launchers: Vec::new(),
        }
    }
}

impl Config {
    /// Load the configuration from a beans directory.
    ///
    /// A missing `config.kdl` yields the defaults.
    pub fn load(beans_dir: &Path) -> Result<Self> {
        let path = beans_dir.join(CONFIG_FILE_NAME);
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path)
            .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        Self::from_kdl(&content).map_err(|e| match e {
            Error::Config(msg) => Error::Config(format!("{}: {}", path.display(), msg)),
            other => other,
        })
    }

    /// Parse a KDL document. Keys that are absent keep their default value.
    pub fn from_kdl(content: &str) -> Result<Self> {
        let doc: KdlDocument = content
            .parse()
            .map_err(|e| Error::Config(format!("Failed to parse KDL: {}", e)))?;

        let mut config = Self::default();
        for node in doc.nodes() {
            match node.name().value() {
                "prefix" => {
                    config.prefix = require_string(node)?;
                }
                "id-length" => {
                    let value = node
                        .entries()
                        .first()
                        .and_then(|e| e.value().as_integer())
                        .ok_or_else(|| Error::Config("id-length must be an integer".to_string()))?;
                    config.id_length = usize::try_from(value)
                        .map_err(|_| Error::Config(format!("invalid id-length: {}", value)))?;
                }
                "statuses" => config.statuses = string_args(node),
                "resolved-statuses" => config.resolved_statuses = string_args(node),
                "types" => config.types = string_args(node),
                "priorities" => config.priorities = string_args(node),
                "default-status" => config.default_status = require_string(node)?,
                "default-type" => config.default_type = require_string(node)?,
                "hierarchy" => {
                    config.hierarchy.clear();
                    if let Some(children) = node.children() {
                        for child in children.nodes() {
                            config
                                .hierarchy
                                .insert(child.name().value().to_string(), string_args(child));
                        }
                    }
                }
                "launcher" => config.launchers.push(parse_launcher(node)?),
                _ => {
                    // Ignore unknown fields for forward compatibility
                }
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Check the configuration for internal consistency.
    pub fn validate(&self) -> Result<()> {
        if self.statuses.is_empty() {
            return Err(Error::Config("statuses cannot be empty".to_string()));
        }
        if self.types.is_empty() {
            return Err(Error::Config("types cannot be empty".to_string()));
        }
        if self.id_length == 0 {
            return Err(Error::Config("id-length must be at least 1".to_string()));
        }
        if !self.is_valid_status(&self.default_status) {
            return Err(Error::Config(format!(
                "default-status '{}' is not a configured status",
                self.default_status
            )));
        }
        if !self.is_valid_type(&self.default_type) {
            return Err(Error::Config(format!(
                "default-type '{}' is not a configured type",
                self.default_type
            )));
        }
        if let Some(s) = self
            .resolved_statuses
            .iter()
            .find(|s| !self.is_valid_status(s))
        {
            return Err(Error::Config(format!(
                "resolved status '{}' is not a configured status",
                s
            )));
        }
        Ok(())
    }

    pub fn is_valid_status(&self, status: &str) -> bool {
        self.statuses.iter().any(|s| s == status)
    }

    pub fn is_valid_type(&self, bean_type: &str) -> bool {
        self.types.iter().any(|t| t == bean_type)
    }

    pub fn is_valid_priority(&self, priority: &str) -> bool {
        self.priorities.iter().any(|p| p == priority)
    }

    /// Returns true if the status counts as done (completed, scrapped, ...).
    pub fn is_resolved(&self, status: &str) -> bool {
        self.resolved_statuses.iter().any(|s| s == status)
    }

    /// Sort position of a status; unknown statuses sort last.
    pub fn status_rank(&self, status: &str) -> usize {
        rank(&self.statuses, status)
    }

    pub fn type_rank(&self, bean_type: &str) -> usize {
        rank(&self.types, bean_type)
    }

    /// Sort position of a priority; missing and unknown priorities sort last.
    pub fn priority_rank(&self, priority: Option<&str>) -> usize {
        priority.map_or(self.priorities.len(), |p| rank(&self.priorities, p))
    }

    /// Legal parent types for a bean type, or `None` when unrestricted.
    pub fn allowed_parents(&self, bean_type: &str) -> Option<&[String]> {
        self.hierarchy.get(bean_type).map(Vec::as_slice)
    }

    pub fn launcher(&self, name: &str) -> Option<&Launcher> {
        self.launchers.iter().find(|l| l.name == name)
    }

    /// Write the default configuration into a beans directory unless one exists.
    pub fn write_default(beans_dir: &Path) -> Result<bool> {
        let path = beans_dir.join(CONFIG_FILE_NAME);
        if path.exists() {
            return Ok(false);
        }
        fs::write(&path, DEFAULT_CONFIG_KDL)?;
        Ok(true)
    }
}

fn rank(list: &[String], value: &str) -> usize {
    list.iter().position(|v| v == value).unwrap_or(list.len())
}

/// Collect every positional string argument of a node.
fn string_args(node: &KdlNode) -> Vec<String> {
    node.entries()
        .iter()
        .filter(|e| e.name().is_none())
        .filter_map(|e| e.value().as_string())
        .map(|s| s.to_string())
        .collect()
}

/// Get a string argument from a node's first entry.
fn get_string_arg(node: &KdlNode) -> Option<String> {
    node.entries()
        .first()
        .and_then(|e| e.value().as_string())
        .map(|s| s.to_string())
}

fn require_string(node: &KdlNode) -> Result<String> {
    get_string_arg(node).ok_or_else(|| {
        Error::Config(format!(
            "{} must have a string argument",
            node.name().value()
        ))
    })
}

/// Parse a `launcher "name" { ... }` block.
fn parse_launcher(node: &KdlNode) -> Result<Launcher> {
    let name = get_string_arg(node)
        .ok_or_else(|| Error::Config("launcher node must have a name argument".to_string()))?;

    let mut exec = None;
    let mut description = None;
    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "exec" => exec = get_string_arg(child),
                "description" => description = get_string_arg(child),
                _ => {}
            }
        }
    }

    let exec = exec
        .filter(|e| !e.trim().is_empty())
        .ok_or_else(|| Error::Config(format!("launcher '{}' needs an exec script", name)))?;

    Ok(Launcher {
        name,
        exec,
        description,
    })
}
