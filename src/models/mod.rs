//! Data models for Beans entities.
//!
//! This module defines the core data structures:
//! - `Bean` - A work item with status, type, tags and relationship fields
//! - `LinkType` - The relationship kinds a bean can declare towards another bean
//!
//! Bean helpers are pure: no I/O and no validation against project configuration.

pub mod graph;
pub mod id;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::PathBuf;

use crate::{Error, Result};

/// A work item tracked by Beans.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bean {
    /// Unique identifier (e.g., "beans-a1b2")
    pub id: String,

    /// Human-readable file name suffix, derived from the title
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,

    /// Path of the file this bean was loaded from, relative to the beans directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    /// Bean title
    pub title: String,

    /// Current status (one of the configured statuses)
    pub status: String,

    /// Bean type (one of the configured types)
    #[serde(rename = "type")]
    pub bean_type: String,

    /// Priority (one of the configured priorities)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,

    /// Normalized tags
    #[serde(default)]
    pub tags: Vec<String>,

    /// Parent bean ID for hierarchical organization
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,

    /// Bean IDs this bean blocks
    #[serde(default)]
    pub blocking: Vec<String>,

    /// Bean IDs that block this bean
    #[serde(default)]
    pub blocked_by: Vec<String>,

    /// Informational links
    #[serde(default)]
    pub related: Vec<String>,

    /// Bean IDs this bean duplicates
    #[serde(default)]
    pub duplicates: Vec<String>,

    /// Creation timestamp
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,

    /// Last update timestamp
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,

    /// Markdown body
    #[serde(default)]
    pub body: String,
}

impl Bean {
    /// Create a new bean with the given ID and title.
    ///
    /// Status and type are left empty so that `Core::create` can apply the
    /// configured defaults.
    pub fn new(id: String, title: String) -> Self {
        Self {
            id,
            title,
            ..Default::default()
        }
    }

    /// Add a tag after normalizing it. Adding an existing tag is a no-op.
    pub fn add_tag(&mut self, tag: &str) -> Result<()> {
        let tag = normalize_tag(tag)?;
        if !self.tags.contains(&tag) {
            self.tags.push(tag);
        }
        Ok(())
    }

    /// Remove a tag. Returns true if it was present.
    pub fn remove_tag(&mut self, tag: &str) -> bool {
        let tag = tag.trim().to_lowercase();
        let before = self.tags.len();
        self.tags.retain(|t| *t != tag);
        self.tags.len() != before
    }

    /// Append a section to the body, separated from existing text by a blank line.
    pub fn append_body(&mut self, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        let existing = self.body.trim_end();
        self.body = if existing.is_empty() {
            text.to_string()
        } else {
            format!("{}\n\n{}", existing, text)
        };
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        let tag = tag.trim().to_lowercase();
        self.tags.iter().any(|t| *t == tag)
    }

    pub fn add_blocking(&mut self, id: &str) -> bool {
        add_unique(&mut self.blocking, id)
    }

    pub fn remove_blocking(&mut self, id: &str) -> bool {
        remove_all(&mut self.blocking, id) > 0
    }

    pub fn add_blocked_by(&mut self, id: &str) -> bool {
        add_unique(&mut self.blocked_by, id)
    }

    pub fn remove_blocked_by(&mut self, id: &str) -> bool {
        remove_all(&mut self.blocked_by, id) > 0
    }

    /// Add an outgoing link of the given type. Setting the parent replaces any
    /// existing parent. Returns true if the bean changed.
    pub fn add_link(&mut self, link_type: LinkType, target: &str) -> bool {
        match link_type {
            LinkType::Parent => {
                if self.parent.as_deref() == Some(target) {
                    false
                } else {
                    self.parent = Some(target.to_string());
                    true
                }
            }
            LinkType::Blocking => self.add_blocking(target),
            LinkType::BlockedBy => self.add_blocked_by(target),
            LinkType::Related => add_unique(&mut self.related, target),
            LinkType::Duplicates => add_unique(&mut self.duplicates, target),
        }
    }

    /// Remove every outgoing link of the given type pointing at `target`.
    /// Returns how many references were removed.
    pub fn remove_link(&mut self, link_type: LinkType, target: &str) -> usize {
        match link_type {
            LinkType::Parent => {
                if self.parent.as_deref() == Some(target) {
                    self.parent = None;
                    1
                } else {
                    0
                }
            }
            LinkType::Blocking => remove_all(&mut self.blocking, target),
            LinkType::BlockedBy => remove_all(&mut self.blocked_by, target),
            LinkType::Related => remove_all(&mut self.related, target),
            LinkType::Duplicates => remove_all(&mut self.duplicates, target),
        }
    }

    /// Outgoing targets for one link type.
    pub fn targets(&self, link_type: LinkType) -> Vec<&str> {
        match link_type {
            LinkType::Parent => self.parent.as_deref().into_iter().collect(),
            LinkType::Blocking => self.blocking.iter().map(String::as_str).collect(),
            LinkType::BlockedBy => self.blocked_by.iter().map(String::as_str).collect(),
            LinkType::Related => self.related.iter().map(String::as_str).collect(),
            LinkType::Duplicates => self.duplicates.iter().map(String::as_str).collect(),
        }
    }

    /// Every outgoing link, in link type order then declaration order.
    pub fn links(&self) -> impl Iterator<Item = (LinkType, &str)> + '_ {
        LinkType::all()
            .iter()
            .flat_map(move |lt| self.targets(*lt).into_iter().map(move |t| (*lt, t)))
    }

    pub fn has_links(&self, link_type: LinkType) -> bool {
        !self.targets(link_type).is_empty()
    }

    /// Content hash over the mutable fields, used for optimistic concurrency.
    ///
    /// Identity, location and timestamps are excluded so that a bean re-read
    /// from disk hashes the same as the in-memory copy it was written from.
    pub fn etag(&self) -> String {
        let mut hasher = Sha256::new();
        let mut field = |name: &str, value: &str| {
            hasher.update(name.as_bytes());
            hasher.update([0u8]);
            hasher.update(value.as_bytes());
            hasher.update([0u8]);
        };
        field("title", &self.title);
        field("status", &self.status);
        field("type", &self.bean_type);
        field("priority", self.priority.as_deref().unwrap_or(""));
        field("tags", &self.tags.join(","));
        field("parent", self.parent.as_deref().unwrap_or(""));
        field("blocking", &self.blocking.join(","));
        field("blocked_by", &self.blocked_by.join(","));
        field("related", &self.related.join(","));
        field("duplicates", &self.duplicates.join(","));
        field("body", &self.body);
        let hash = hasher.finalize();
        format!("{:x}", hash)[..16].to_string()
    }
}

/// Normalize a tag: trimmed and lowercased, non-empty, no whitespace.
pub fn normalize_tag(tag: &str) -> Result<String> {
    let tag = tag.trim().to_lowercase();
    if tag.is_empty() {
        return Err(Error::Validation("tag cannot be empty".to_string()));
    }
    if tag.chars().any(char::is_whitespace) {
        return Err(Error::Validation(format!(
            "tag '{}' cannot contain whitespace",
            tag
        )));
    }
    Ok(tag)
}

fn add_unique(list: &mut Vec<String>, id: &str) -> bool {
    if list.iter().any(|existing| existing == id) {
        false
    } else {
        list.push(id.to_string());
        true
    }
}

fn remove_all(list: &mut Vec<String>, id: &str) -> usize {
    let before = list.len();
    list.retain(|existing| existing != id);
    before - list.len()
}

/// Type of relationship between beans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkType {
    /// Hierarchical containment (child → parent)
    Parent,
    /// Source must finish before target can start
    Blocking,
    /// Target must finish before source can start
    BlockedBy,
    /// Informational link
    Related,
    /// Source duplicates target
    Duplicates,
}

impl LinkType {
    /// Get all link types, in the order relation fields are scanned.
    pub fn all() -> &'static [LinkType] {
        &[
            LinkType::Parent,
            LinkType::Blocking,
            LinkType::BlockedBy,
            LinkType::Related,
            LinkType::Duplicates,
        ]
    }

    /// Returns true if links of this type must stay acyclic.
    pub fn is_acyclic(&self) -> bool {
        matches!(
            self,
            LinkType::Parent | LinkType::Blocking | LinkType::BlockedBy
        )
    }
}

impl fmt::Display for LinkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LinkType::Parent => "parent",
            LinkType::Blocking => "blocking",
            LinkType::BlockedBy => "blocked_by",
            LinkType::Related => "related",
            LinkType::Duplicates => "duplicates",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for LinkType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "parent" => Ok(LinkType::Parent),
            "blocking" | "blocks" => Ok(LinkType::Blocking),
            "blocked_by" | "blocked-by" => Ok(LinkType::BlockedBy),
            "related" => Ok(LinkType::Related),
            "duplicates" => Ok(LinkType::Duplicates),
            _ => Err(format!("Unknown link type: {}", s)),
        }
    }
}
