//! Beans - work items as a graph of markdown files.
//!
//! This library provides the core functionality for the `beans` CLI tool:
//! loading and saving beans, analysing the links between them, and running
//! external launchers against them in parallel.

pub mod beancore;
pub mod cli;
pub mod commands;
pub mod config;
pub mod launcher;
pub mod models;
pub mod query;
pub mod storage;

use models::LinkType;
use std::path::PathBuf;


/// Library-level error type for Beans operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("No beans directory found at {0} (run `beans init` first)")]
    NotInitialized(PathBuf),

    #[error("Bean not found: {0}")]
    NotFound(String),

    #[error("Invalid ID format: {0}")]
    InvalidId(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Bean {id} cannot link to itself via {link_type}")]
    SelfLink { id: String, link_type: LinkType },

    #[error("Adding this {link_type} link would create a cycle: {}", path.join(" -> "))]
    Cycle { link_type: LinkType, path: Vec<String> },

    #[error("Bean was modified since it was read (expected ETag {provided}, found {current})")]
    Conflict { provided: String, current: String },

    #[error(transparent)]
    Launch(#[from] launcher::LaunchError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

/// Result type alias for Beans operations.
pub type Result<T> = std::result::Result<T, Error>;
