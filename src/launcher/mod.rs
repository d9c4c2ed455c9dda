//! Running external commands against beans.
//!
//! A launcher is a script from `config.kdl`. A single-line script runs through
//! `sh -c`. A multi-line script must start with a shebang; the interpreter it
//! names is started and the whole script is fed to it on stdin.
//!
//! Every launched process runs in the project root and receives:
//! - `BEANS_ROOT` - the project root (parent of the beans directory)
//! - `BEANS_DIR` - the beans directory
//! - `BEANS_ID` - the bean's ID
//! - `BEANS_TASK` - the bean's title

pub mod manager;

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

pub use manager::{BeanLaunch, LaunchCounts, LaunchManager, LaunchStatus, LaunchSummary};

pub const ENV_ROOT: &str = "BEANS_ROOT";
pub const ENV_DIR: &str = "BEANS_DIR";
pub const ENV_ID: &str = "BEANS_ID";
pub const ENV_TASK: &str = "BEANS_TASK";

/// Why a launch could not run, or how it ended badly.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LaunchError {
    #[error("launcher script is empty")]
    EmptyScript,

    #[error("multi-line script must start with a shebang")]
    MissingShebang,

    #[error("invalid shebang: {0}")]
    InvalidShebang(String),

    #[error("failed to start command: {0}")]
    Spawn(String),

    #[error("failed to wait for command: {0}")]
    Wait(String),

    /// The process ran and exited unsuccessfully.
    #[error("{}", exit_message(.status, .stderr))]
    Exited {
        code: Option<i32>,
        status: String,
        stderr: String,
    },

    #[error("stopped by user")]
    Stopped,

    #[error("launches have already been started")]
    AlreadyStarted,

    #[error("launch manager has been stopped")]
    ManagerStopped,

    #[error("unknown launcher: {0}")]
    UnknownLauncher(String),
}

fn exit_message(status: &str, stderr: &str) -> String {
    if stderr.trim().is_empty() {
        status.to_string()
    } else {
        format!("{}\n\nOutput:\n{}", status, stderr)
    }
}

/// Where a launched process's stdout goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Share the parent's terminal
    Inherit,
    /// Throw it away
    Discard,
}

impl OutputMode {
    /// Interactive output for a single launch, silence for parallel ones.
    pub fn for_launch_count(count: usize) -> Self {
        if count == 1 {
            OutputMode::Inherit
        } else {
            OutputMode::Discard
        }
    }

    fn stdio(self) -> Stdio {
        match self {
            OutputMode::Inherit => Stdio::inherit(),
            OutputMode::Discard => Stdio::null(),
        }
    }
}

/// A command ready to spawn, plus the script to write to its stdin if any.
#[derive(Debug)]
pub struct PreparedCommand {
    pub command: Command,
    pub stdin_script: Option<String>,
}

/// Project root for a beans directory.
pub fn project_root(beans_dir: &Path) -> PathBuf {
    match beans_dir.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Build the command for running `script` against one bean.
///
/// Stderr is always piped so failures can carry it; stdout follows `output`.
pub fn build_command(
    script: &str,
    beans_dir: &Path,
    bean_id: &str,
    bean_title: &str,
    output: OutputMode,
) -> Result<PreparedCommand, LaunchError> {
    let script = script.trim_end();
    if script.trim().is_empty() {
        return Err(LaunchError::EmptyScript);
    }

    let root = project_root(beans_dir);
    let (mut command, stdin_script) = match script.split_once('\n') {
        None => {
            let mut command = Command::new("sh");
            command.arg("-c").arg(script);
            (command, None)
        }
        Some((first, _)) => {
            let shebang = first
                .trim_end()
                .strip_prefix("#!")
                .ok_or(LaunchError::MissingShebang)?;
            let mut parts = shebang.split_whitespace();
            let program = parts
                .next()
                .ok_or_else(|| LaunchError::InvalidShebang(first.to_string()))?;
            let mut command = Command::new(program);
            command.args(parts);
            (command, Some(script.to_string()))
        }
    };

    command
        .current_dir(&root)
        .env(ENV_ROOT, &root)
        .env(ENV_DIR, beans_dir)
        .env(ENV_ID, bean_id)
        .env(ENV_TASK, bean_title)
        .stdout(output.stdio())
        .stderr(Stdio::piped())
        .stdin(if stdin_script.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });

    Ok(PreparedCommand {
        command,
        stdin_script,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsStr;

    fn env_value<'a>(command: &'a Command, key: &str) -> Option<&'a OsStr> {
        command
            .get_envs()
            .find(|(k, _)| *k == OsStr::new(key))
            .and_then(|(_, v)| v)
    }

    #[test]
    fn test_single_line_runs_through_sh() {
        let prepared = build_command(
            "echo hello",
            Path::new("/work/project/.beans"),
            "beans-a1",
            "Do things",
            OutputMode::Discard,
        )
        .unwrap();
        let command = &prepared.command;

        assert_eq!(command.get_program(), "sh");
        let args: Vec<_> = command.get_args().collect();
        assert_eq!(args, vec!["-c", "echo hello"]);
        assert!(prepared.stdin_script.is_none());
        assert_eq!(command.get_current_dir(), Some(Path::new("/work/project")));
    }

    #[test]
    fn test_environment_variables() {
        let prepared = build_command(
            "true",
            Path::new("/work/project/.beans"),
            "beans-a1",
            "Do things",
            OutputMode::Discard,
        )
        .unwrap();
        let command = &prepared.command;

        assert_eq!(env_value(command, ENV_ROOT), Some(OsStr::new("/work/project")));
        assert_eq!(
            env_value(command, ENV_DIR),
            Some(OsStr::new("/work/project/.beans"))
        );
        assert_eq!(env_value(command, ENV_ID), Some(OsStr::new("beans-a1")));
        assert_eq!(env_value(command, ENV_TASK), Some(OsStr::new("Do things")));
    }

    #[test]
    fn test_multi_line_uses_shebang_interpreter() {
        let script = "#!/usr/bin/env bash\necho one\necho two\n";
        let prepared = build_command(
            script,
            Path::new("/p/.beans"),
            "id",
            "title",
            OutputMode::Discard,
        )
        .unwrap();

        assert_eq!(prepared.command.get_program(), "/usr/bin/env");
        let args: Vec<_> = prepared.command.get_args().collect();
        assert_eq!(args, vec!["bash"]);
        assert_eq!(
            prepared.stdin_script.as_deref(),
            Some("#!/usr/bin/env bash\necho one\necho two")
        );
    }

    #[test]
    fn test_multi_line_without_shebang_errors() {
        let result = build_command(
            "echo one\necho two",
            Path::new("/p/.beans"),
            "id",
            "title",
            OutputMode::Discard,
        );
        assert_eq!(result.unwrap_err(), LaunchError::MissingShebang);
    }

    #[test]
    fn test_invalid_shebang_errors() {
        let result = build_command(
            "#!   \necho one",
            Path::new("/p/.beans"),
            "id",
            "title",
            OutputMode::Discard,
        );
        assert!(matches!(result, Err(LaunchError::InvalidShebang(_))));
    }

    #[test]
    fn test_empty_script_errors() {
        let result = build_command("  \n ", Path::new("/p/.beans"), "id", "t", OutputMode::Discard);
        assert_eq!(result.unwrap_err(), LaunchError::EmptyScript);
    }

    #[test]
    fn test_relative_beans_dir_root() {
        assert_eq!(project_root(Path::new(".beans")), PathBuf::from("."));
        assert_eq!(project_root(Path::new("/a/.beans")), PathBuf::from("/a"));
    }

    #[test]
    fn test_exit_error_includes_stderr() {
        let err = LaunchError::Exited {
            code: Some(2),
            status: "exit status: 2".to_string(),
            stderr: "boom\n".to_string(),
        };
        assert_eq!(err.to_string(), "exit status: 2\n\nOutput:\nboom\n");

        let quiet = LaunchError::Exited {
            code: Some(2),
            status: "exit status: 2".to_string(),
            stderr: String::new(),
        };
        assert_eq!(quiet.to_string(), "exit status: 2");
    }

    #[test]
    fn test_output_mode_for_launch_count() {
        assert_eq!(OutputMode::for_launch_count(1), OutputMode::Inherit);
        assert_eq!(OutputMode::for_launch_count(3), OutputMode::Discard);
    }
}
