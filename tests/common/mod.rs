//! Common test utilities for beans integration tests.

#![allow(dead_code)]

use assert_cmd::Command;
pub use tempfile::TempDir;

/// A project directory with its own `.beans` directory.
///
/// Commands run with the project as working directory, so the beans
/// directory is found the same way it is for a real user.
pub struct TestEnv {
    pub project_dir: TempDir,
}

impl TestEnv {
    pub fn new() -> Self {
        Self {
            project_dir: TempDir::new().unwrap(),
        }
    }

    /// Create a new test environment and run `beans init`.
    pub fn init() -> Self {
        let env = Self::new();
        env.beans().arg("init").assert().success();
        env
    }

    /// Get a Command for the beans binary running in the project directory.
    pub fn beans(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_beans"));
        cmd.current_dir(self.project_dir.path());
        cmd.env_remove("BEANS_PATH");
        cmd
    }

    pub fn path(&self) -> &std::path::Path {
        self.project_dir.path()
    }

    pub fn beans_dir(&self) -> std::path::PathBuf {
        self.project_dir.path().join(".beans")
    }

    /// Run a command that must succeed and parse its JSON output.
    pub fn json(&self, args: &[&str]) -> serde_json::Value {
        let output = self.beans().args(args).assert().success().get_output().stdout.clone();
        serde_json::from_slice(&output).unwrap()
    }

    /// Create a bean and return its ID.
    pub fn create(&self, args: &[&str]) -> String {
        let mut full = vec!["create"];
        full.extend_from_slice(args);
        let value = self.json(&full);
        value["bean"]["id"].as_str().unwrap().to_string()
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}
