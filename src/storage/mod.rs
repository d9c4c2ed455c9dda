//! Storage layer for Beans data.
//!
//! Every bean is one markdown file with YAML front matter, stored in the beans
//! directory (usually `.beans/` at the project root). File names encode the ID
//! and an optional slug: `<id>--<slug>.md`.
//!
//! Loading is best-effort: a malformed file becomes a [`LoadWarning`] and the
//! rest of the directory still loads. Only an unreadable root is fatal.
//! Writes go through a temporary file in the same directory and are renamed
//! into place.

pub mod frontmatter;

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::models::Bean;
use crate::models::id::{build_filename, parse_filename};
use crate::{Error, Result};

/// Default name of the beans directory inside a project.
pub const BEANS_DIR_NAME: &str = ".beans";

/// A bean file that could not be loaded.
#[derive(Debug, Clone, serde::Serialize)]
pub struct LoadWarning {
    /// Path relative to the beans directory
    pub path: PathBuf,
    pub message: String,
}

/// Everything read from a beans directory.
#[derive(Debug, Default)]
pub struct LoadResult {
    pub beans: BTreeMap<String, Bean>,
    pub warnings: Vec<LoadWarning>,
}

/// File-per-bean store rooted at a beans directory.
#[derive(Debug, Clone)]
pub struct Store {
    root: PathBuf,
}

impl Store {
    /// Open an existing beans directory.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(Error::NotInitialized(root));
        }
        Ok(Self { root })
    }

    /// Create the beans directory if needed and open it.
    pub fn init(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Read every bean under the root, recursively.
    ///
    /// Hidden entries and non-markdown files are skipped. When two files carry
    /// the same ID the first in path order wins and the other is a warning.
    pub fn load_all(&self) -> Result<LoadResult> {
        let mut files = Vec::new();
        collect_markdown_files(&self.root, &mut files).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::NotInitialized(self.root.clone())
            } else {
                Error::Io(e)
            }
        })?;
        files.sort();

        let mut result = LoadResult::default();
        for path in files {
            let rel = path.strip_prefix(&self.root).unwrap_or(&path).to_path_buf();
            match self.load_file(&rel) {
                Ok(bean) => {
                    if result.beans.contains_key(&bean.id) {
                        tracing::warn!(id = %bean.id, path = %rel.display(), "duplicate bean ID");
                        result.warnings.push(LoadWarning {
                            path: rel,
                            message: format!("duplicate bean ID {}", bean.id),
                        });
                    } else {
                        result.beans.insert(bean.id.clone(), bean);
                    }
                }
                Err(e) => {
                    tracing::warn!(path = %rel.display(), error = %e, "skipping bean file");
                    result.warnings.push(LoadWarning {
                        path: rel,
                        message: e.to_string(),
                    });
                }
            }
        }

        tracing::debug!(
            root = %self.root.display(),
            beans = result.beans.len(),
            warnings = result.warnings.len(),
            "loaded beans"
        );
        Ok(result)
    }

    /// Load a single bean file given its path relative to the root.
    pub fn load_file(&self, rel: &Path) -> Result<Bean> {
        let name = rel
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::InvalidId(format!("bad file name: {}", rel.display())))?;
        let (id, slug) = parse_filename(name);
        if id.is_empty() {
            return Err(Error::InvalidId(format!(
                "no ID in file name: {}",
                rel.display()
            )));
        }

        let content = fs::read_to_string(self.root.join(rel))?;
        let slug = (!slug.is_empty()).then_some(slug);
        let mut bean = frontmatter::parse_bean(&id, slug, &content)?;
        bean.path = Some(rel.to_path_buf());
        Ok(bean)
    }

    /// Re-read a bean from the file it was loaded from.
    pub fn reload(&self, bean: &Bean) -> Result<Bean> {
        let rel = self.existing_path(bean)?;
        self.load_file(&rel)
    }

    /// Canonical file name for a bean, relative to the root.
    pub fn canonical_path(bean: &Bean) -> PathBuf {
        PathBuf::from(build_filename(&bean.id, bean.slug.as_deref().unwrap_or("")))
    }

    /// Write a bean to its canonical path.
    ///
    /// If the bean previously lived somewhere else (an old slug, a nested
    /// directory) that file is removed once the new one is in place.
    pub fn save(&self, bean: &mut Bean) -> Result<()> {
        let rel = Self::canonical_path(bean);
        let target = self.root.join(&rel);
        let content = frontmatter::render_bean(bean)?;

        let mut tmp = tempfile::NamedTempFile::new_in(&self.root)?;
        tmp.write_all(content.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&target).map_err(|e| Error::Io(e.error))?;

        if let Some(old) = bean.path.as_ref().filter(|old| **old != rel) {
            let old_path = self.root.join(old);
            if old_path.exists() {
                fs::remove_file(&old_path)?;
                tracing::debug!(id = %bean.id, from = %old.display(), to = %rel.display(), "moved bean file");
            }
        }

        tracing::debug!(id = %bean.id, path = %rel.display(), "saved bean");
        bean.path = Some(rel);
        Ok(())
    }

    /// Remove a bean's file.
    pub fn delete(&self, bean: &Bean) -> Result<()> {
        let rel = self.existing_path(bean)?;
        fs::remove_file(self.root.join(&rel))?;
        tracing::debug!(id = %bean.id, path = %rel.display(), "deleted bean");
        Ok(())
    }

    fn existing_path(&self, bean: &Bean) -> Result<PathBuf> {
        let rel = bean
            .path
            .clone()
            .unwrap_or_else(|| Self::canonical_path(bean));
        if self.root.join(&rel).is_file() {
            Ok(rel)
        } else {
            Err(Error::NotFound(bean.id.clone()))
        }
    }
}

fn collect_markdown_files(dir: &Path, files: &mut Vec<PathBuf>) -> std::io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        if name.to_string_lossy().starts_with('.') {
            continue;
        }
        let path = entry.path();
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            collect_markdown_files(&path, files)?;
        } else if file_type.is_file() && path.extension().is_some_and(|ext| ext == "md") {
            files.push(path);
        }
    }
    Ok(())
}

/// Find the beans directory by walking up from `start`.
pub fn find_beans_dir(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .map(|dir| dir.join(BEANS_DIR_NAME))
        .find(|candidate| candidate.is_dir())
}
