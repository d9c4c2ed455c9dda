//! Beans CLI - track work items as linked markdown files.

use beans::cli::{Cli, Commands};
use beans::commands::{self, CreateOptions, LaunchTarget, Output, UpdateOptions};
use beans::storage::{BEANS_DIR_NAME, find_beans_dir};
use clap::Parser;
use std::env;
use std::path::{Path, PathBuf};
use std::process;
use tracing_subscriber::EnvFilter;

fn main() {
    let cli = Cli::parse();
    let human = cli.human_readable;

    init_logging();

    let beans_dir = resolve_beans_dir(cli.beans_path);
    tracing::debug!(beans_dir = %beans_dir.display(), "resolved beans directory");

    match run_command(cli.command, &beans_dir, human) {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(e) => {
            if human {
                eprintln!("Error: {}", e);
            } else {
                eprintln!("{}", serde_json::json!({ "error": e.to_string() }));
            }
            process::exit(1);
        }
    }
}

/// Log to stderr, filtered by `BEANS_LOG` (default `warn`).
fn init_logging() {
    let filter = EnvFilter::try_from_env("BEANS_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Resolve the beans directory.
///
/// Priority: -C/--beans-path flag > BEANS_PATH env var > nearest `.beans`
/// above the current directory > `./.beans`.
fn resolve_beans_dir(explicit_path: Option<PathBuf>) -> PathBuf {
    if let Some(path) = explicit_path {
        return path;
    }
    let cwd = env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    find_beans_dir(&cwd).unwrap_or_else(|| cwd.join(BEANS_DIR_NAME))
}

/// Run one command. `Ok(false)` means the command ran but reports failure.
fn run_command(command: Commands, beans_dir: &Path, human: bool) -> Result<bool, beans::Error> {
    match command {
        Commands::Init => output(&commands::init(beans_dir)?, human),

        Commands::Create {
            title,
            id,
            status,
            bean_type,
            priority,
            tags,
            parent,
            blocking,
            blocked_by,
            body,
        } => {
            let result = commands::create(
                beans_dir,
                CreateOptions {
                    title,
                    id,
                    status,
                    bean_type,
                    priority,
                    tags,
                    parent,
                    blocking,
                    blocked_by,
                    body,
                },
            )?;
            output(&result, human);
        }

        Commands::Show { id } => output(&commands::show(beans_dir, &id)?, human),

        Commands::List { filter, sort } => {
            let parent = match filter.parent.as_deref() {
                Some(parent) => Some(beans::beancore::Core::load(beans_dir)?.resolve_id(parent)?),
                None => None,
            };
            let result = commands::list(beans_dir, &filter.into_filter(parent), sort)?;
            output(&result, human);
        }

        Commands::Update {
            id,
            title,
            status,
            bean_type,
            priority,
            add_tags,
            remove_tags,
            parent,
            no_parent,
            body,
            if_match,
        } => {
            let result = commands::update(
                beans_dir,
                &id,
                UpdateOptions {
                    title,
                    status,
                    bean_type,
                    priority,
                    add_tags,
                    remove_tags,
                    parent,
                    clear_parent: no_parent,
                    body,
                    if_match,
                },
            )?;
            output(&result, human);
        }

        Commands::Delete { id, remove_links } => {
            output(&commands::delete(beans_dir, &id, remove_links)?, human)
        }

        Commands::Link {
            id,
            link_type,
            target,
        } => output(&commands::link(beans_dir, &id, link_type, &target)?, human),

        Commands::Unlink {
            id,
            link_type,
            target,
        } => output(&commands::unlink(beans_dir, &id, link_type, &target)?, human),

        Commands::Ready => output(&commands::ready(beans_dir)?, human),

        Commands::Blocked => output(&commands::blocked(beans_dir)?, human),

        Commands::Next => output(&commands::next(beans_dir)?, human),

        Commands::Start { ids, force } => output(&commands::start(beans_dir, &ids, force)?, human),

        Commands::Complete { ids, summary } => {
            output(&commands::complete(beans_dir, &ids, summary.as_deref())?, human)
        }

        Commands::Scrap { ids, reason } => {
            output(&commands::scrap(beans_dir, &ids, &reason)?, human)
        }

        Commands::Progress => output(&commands::progress(beans_dir)?, human),

        Commands::Milestones { include_done } => {
            output(&commands::milestones(beans_dir, include_done)?, human)
        }

        Commands::Archive { remove_links } => {
            output(&commands::archive(beans_dir, remove_links)?, human)
        }

        Commands::Check { fix } => {
            let report = commands::check(beans_dir, fix)?;
            output(&report, human);
            return Ok(report.total_issues == 0);
        }

        Commands::Launch {
            launcher,
            exec,
            ids,
        } => {
            let target = match (launcher, exec) {
                (Some(name), _) => LaunchTarget::Named(name),
                (None, Some(exec)) => LaunchTarget::Exec(exec),
                (None, None) => {
                    return Err(beans::Error::Validation(
                        "either --launcher or --exec is required".to_string(),
                    ));
                }
            };
            let report = commands::launch(beans_dir, target, &ids)?;
            output(&report, human);
            return Ok(report.success());
        }
    }
    Ok(true)
}

fn output<T: Output>(result: &T, human: bool) {
    if human {
        println!("{}", result.to_human());
    } else {
        println!("{}", result.to_json());
    }
}
