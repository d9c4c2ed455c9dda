//! Markdown files with YAML front matter.
//!
//! A bean file looks like:
//!
//! ```text
//! ---
//! title: Fix the login page
//! status: todo
//! type: bug
//! parent: beans-a1b2
//! blocking:
//! - beans-c3d4
//! ---
//!
//! Free-form markdown body.
//! ```
//!
//! Every relation key accepts either a single ID or a list. Older files keep
//! their relations in a `links:` map; those are folded into the typed fields on
//! read and never written back in that shape.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::models::{Bean, LinkType};
use crate::{Error, Result};

/// A scalar-or-list value, as found in hand-edited front matter.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum StringList {
    One(String),
    Many(Vec<String>),
}

impl StringList {
    fn into_vec(self) -> Vec<String> {
        match self {
            StringList::One(s) => vec![s],
            StringList::Many(v) => v,
        }
    }
}

fn list(value: Option<StringList>) -> Vec<String> {
    value.map(StringList::into_vec).unwrap_or_default()
}

/// Front matter as read from disk.
#[derive(Debug, Default, Deserialize)]
struct RawFrontMatter {
    #[serde(default)]
    title: String,
    #[serde(default)]
    status: String,
    #[serde(default, rename = "type")]
    bean_type: String,
    priority: Option<String>,
    tags: Option<StringList>,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
    parent: Option<String>,
    blocking: Option<StringList>,
    blocked_by: Option<StringList>,
    related: Option<StringList>,
    duplicates: Option<StringList>,
    links: Option<BTreeMap<String, StringList>>,
}

/// Front matter as written to disk.
#[derive(Debug, Serialize)]
struct FrontMatterOut<'a> {
    title: &'a str,
    status: &'a str,
    #[serde(rename = "type")]
    bean_type: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    priority: Option<&'a str>,
    #[serde(skip_serializing_if = "is_empty")]
    tags: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    created_at: Option<&'a DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    updated_at: Option<&'a DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    parent: Option<&'a str>,
    #[serde(skip_serializing_if = "is_empty")]
    blocking: &'a [String],
    #[serde(skip_serializing_if = "is_empty")]
    blocked_by: &'a [String],
    #[serde(skip_serializing_if = "is_empty")]
    related: &'a [String],
    #[serde(skip_serializing_if = "is_empty")]
    duplicates: &'a [String],
}

fn is_empty(list: &&[String]) -> bool {
    list.is_empty()
}

/// Split a document into its front matter block and body.
///
/// Returns `Ok(None)` when the document does not start with `---`, and an
/// error when the block is never closed.
pub fn split_frontmatter(content: &str) -> Result<Option<(&str, &str)>> {
    let content = content.trim_start_matches('\u{feff}');
    let mut lines = content.split_inclusive('\n');

    let first = match lines.next() {
        Some(line) => line,
        None => return Ok(None),
    };
    if first.trim_end() != "---" {
        return Ok(None);
    }

    let start = first.len();
    let mut offset = start;
    for line in lines {
        let trimmed = line.trim_end();
        if trimmed == "---" || trimmed == "..." {
            let yaml = &content[start..offset];
            let body = &content[offset + line.len()..];
            return Ok(Some((yaml, body)));
        }
        offset += line.len();
    }

    Err(Error::Validation(
        "front matter is not terminated by '---'".to_string(),
    ))
}

/// Canonical form of a body: no leading blank lines, no trailing whitespace.
pub fn normalize_body(body: &str) -> String {
    body.trim_start_matches(['\r', '\n']).trim_end().to_string()
}

/// Parse a bean file. `id` and `slug` come from the file name.
pub fn parse_bean(id: &str, slug: Option<String>, content: &str) -> Result<Bean> {
    let (raw, body) = match split_frontmatter(content)? {
        Some((yaml, body)) if yaml.trim().is_empty() => (RawFrontMatter::default(), body),
        Some((yaml, body)) => (serde_yaml::from_str::<RawFrontMatter>(yaml)?, body),
        None => (RawFrontMatter::default(), content),
    };

    let mut bean = Bean {
        id: id.to_string(),
        slug,
        title: raw.title,
        status: raw.status,
        bean_type: raw.bean_type,
        priority: raw.priority.filter(|p| !p.is_empty()),
        created_at: raw.created_at,
        updated_at: raw.updated_at,
        parent: raw.parent.filter(|p| !p.is_empty()),
        body: normalize_body(body),
        ..Default::default()
    };

    for tag in list(raw.tags) {
        bean.add_tag(&tag)?;
    }
    for target in list(raw.blocking) {
        bean.add_blocking(&target);
    }
    for target in list(raw.blocked_by) {
        bean.add_blocked_by(&target);
    }
    for target in list(raw.related) {
        bean.add_link(LinkType::Related, &target);
    }
    for target in list(raw.duplicates) {
        bean.add_link(LinkType::Duplicates, &target);
    }

    for (key, targets) in raw.links.unwrap_or_default() {
        let link_type = match key.parse::<LinkType>() {
            Ok(lt) => lt,
            Err(_) => {
                tracing::warn!(bean = %id, key = %key, "ignoring unknown link key");
                continue;
            }
        };
        for target in targets.into_vec() {
            if link_type == LinkType::Parent && bean.parent.is_some() {
                continue;
            }
            bean.add_link(link_type, &target);
        }
    }

    Ok(bean)
}

/// Render a bean as a markdown document with front matter.
pub fn render_bean(bean: &Bean) -> Result<String> {
    let fm = FrontMatterOut {
        title: &bean.title,
        status: &bean.status,
        bean_type: &bean.bean_type,
        priority: bean.priority.as_deref(),
        tags: &bean.tags,
        created_at: bean.created_at.as_ref(),
        updated_at: bean.updated_at.as_ref(),
        parent: bean.parent.as_deref(),
        blocking: &bean.blocking,
        blocked_by: &bean.blocked_by,
        related: &bean.related,
        duplicates: &bean.duplicates,
    };
    let yaml = serde_yaml::to_string(&fm)?;

    let mut out = String::with_capacity(yaml.len() + bean.body.len() + 16);
    out.push_str("---\n");
    out.push_str(&yaml);
    out.push_str("---\n");
    let body = normalize_body(&bean.body);
    if !body.is_empty() {
        out.push('\n');
        out.push_str(&body);
        out.push('\n');
    }
    Ok(out)
}
