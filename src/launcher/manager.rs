//! Parallel launches of one launcher across many beans.
//!
//! Each bean gets its own child process and a monitor thread that polls it
//! until it exits. All launch records live behind one `RwLock`, so a summary
//! is always taken from a single consistent snapshot.

use std::io::{Read, Write};
use std::path::Path;
use std::process::{Child, ChildStderr};
use std::sync::{Arc, Mutex, MutexGuard, Once, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

use super::{LaunchError, OutputMode, build_command};
use crate::config::Launcher;
use crate::models::Bean;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Lifecycle of a single launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LaunchStatus {
    Pending,
    Running,
    Success,
    Failed,
}

impl LaunchStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, LaunchStatus::Success | LaunchStatus::Failed)
    }
}

impl std::fmt::Display for LaunchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LaunchStatus::Pending => "pending",
            LaunchStatus::Running => "running",
            LaunchStatus::Success => "success",
            LaunchStatus::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// One bean's launch record.
#[derive(Debug, Clone, Serialize)]
pub struct BeanLaunch {
    pub bean: Bean,
    pub status: LaunchStatus,
    #[serde(serialize_with = "serialize_error", skip_serializing_if = "Option::is_none")]
    pub error: Option<LaunchError>,
    /// Captured stderr
    #[serde(skip_serializing_if = "String::is_empty")]
    pub output: String,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

fn serialize_error<S: Serializer>(
    error: &Option<LaunchError>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match error {
        Some(e) => serializer.serialize_str(&e.to_string()),
        None => serializer.serialize_none(),
    }
}

impl BeanLaunch {
    fn pending(bean: Bean) -> Self {
        Self {
            bean,
            status: LaunchStatus::Pending,
            error: None,
            output: String::new(),
            started_at: None,
            finished_at: None,
        }
    }

    fn fail(&mut self, error: LaunchError) {
        let now = Utc::now();
        self.status = LaunchStatus::Failed;
        self.error = Some(error);
        self.started_at.get_or_insert(now);
        self.finished_at = Some(now);
    }

    /// Wall time from start to finish, once finished.
    pub fn duration(&self) -> Option<chrono::Duration> {
        Some(self.finished_at? - self.started_at?)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LaunchCounts {
    pub pending: usize,
    pub running: usize,
    pub success: usize,
    pub failed: usize,
    pub total: usize,
}

impl LaunchCounts {
    fn tally(launches: &[BeanLaunch]) -> Self {
        let mut counts = LaunchCounts {
            total: launches.len(),
            ..Default::default()
        };
        for launch in launches {
            match launch.status {
                LaunchStatus::Pending => counts.pending += 1,
                LaunchStatus::Running => counts.running += 1,
                LaunchStatus::Success => counts.success += 1,
                LaunchStatus::Failed => counts.failed += 1,
            }
        }
        counts
    }
}

/// Consistent view of every launch at one instant.
#[derive(Debug, Clone, Serialize)]
pub struct LaunchSummary {
    pub launches: Vec<BeanLaunch>,
    /// No launch is pending or running
    pub complete: bool,
    pub all_successful: bool,
    /// Earliest-started failed launch
    pub first_error: Option<BeanLaunch>,
    pub counts: LaunchCounts,
}

impl LaunchSummary {
    fn from_launches(launches: &[BeanLaunch]) -> Self {
        let counts = LaunchCounts::tally(launches);
        let complete = counts.pending == 0 && counts.running == 0;
        let first_error = launches
            .iter()
            .enumerate()
            .filter(|(_, l)| l.status == LaunchStatus::Failed && l.error.is_some())
            .min_by_key(|(i, l)| (l.started_at, *i))
            .map(|(_, l)| l.clone());

        LaunchSummary {
            launches: launches.to_vec(),
            complete,
            all_successful: complete && counts.failed == 0,
            first_error,
            counts,
        }
    }
}

#[derive(Default)]
struct State {
    launches: Vec<BeanLaunch>,
    children: Vec<Option<Arc<Mutex<Child>>>>,
    started: bool,
    stopped: bool,
}

/// Runs a launcher against a fixed set of beans, all at once.
pub struct LaunchManager {
    launcher: Launcher,
    output: OutputMode,
    state: Arc<RwLock<State>>,
    monitors: Mutex<Vec<JoinHandle<()>>>,
    stop_once: Once,
}

impl LaunchManager {
    pub fn new(launcher: Launcher, beans: Vec<Bean>) -> Self {
        let output = OutputMode::for_launch_count(beans.len());
        let children = beans.iter().map(|_| None).collect();
        let launches = beans.into_iter().map(BeanLaunch::pending).collect();
        Self {
            launcher,
            output,
            state: Arc::new(RwLock::new(State {
                launches,
                children,
                started: false,
                stopped: false,
            })),
            monitors: Mutex::new(Vec::new()),
            stop_once: Once::new(),
        }
    }

    pub fn with_output(mut self, output: OutputMode) -> Self {
        self.output = output;
        self
    }

    pub fn launcher(&self) -> &Launcher {
        &self.launcher
    }

    /// Start every launch.
    ///
    /// A launch that cannot start is marked failed right away; the others
    /// still run. Starting twice, or after [`stop`](Self::stop), is an error.
    pub fn start(&self, beans_dir: &Path) -> Result<(), LaunchError> {
        let mut state = write(&self.state);
        if state.stopped {
            return Err(LaunchError::ManagerStopped);
        }
        if state.started {
            return Err(LaunchError::AlreadyStarted);
        }
        state.started = true;

        tracing::info!(
            launcher = %self.launcher.name,
            count = state.launches.len(),
            "starting launches"
        );

        for index in 0..state.launches.len() {
            let bean = &state.launches[index].bean;
            match self.spawn(bean, beans_dir) {
                Ok((child, stderr)) => {
                    tracing::debug!(id = %bean.id, pid = child.id(), "launch running");
                    let child = Arc::new(Mutex::new(child));
                    state.children[index] = Some(Arc::clone(&child));
                    let launch = &mut state.launches[index];
                    launch.status = LaunchStatus::Running;
                    launch.started_at = Some(Utc::now());

                    let shared = Arc::clone(&self.state);
                    let handle = thread::spawn(move || monitor(shared, index, child, stderr));
                    lock(&self.monitors).push(handle);
                }
                Err(e) => {
                    tracing::warn!(id = %bean.id, error = %e, "launch failed to start");
                    state.launches[index].fail(e);
                }
            }
        }
        Ok(())
    }

    fn spawn(&self, bean: &Bean, beans_dir: &Path) -> Result<(Child, Option<ChildStderr>), LaunchError> {
        let prepared = build_command(&self.launcher.exec, beans_dir, &bean.id, &bean.title, self.output)?;
        let mut command = prepared.command;
        let mut child = command
            .spawn()
            .map_err(|e| LaunchError::Spawn(e.to_string()))?;

        if let Some(script) = prepared.stdin_script {
            if let Some(mut stdin) = child.stdin.take() {
                let id = bean.id.clone();
                thread::spawn(move || {
                    if let Err(e) = stdin.write_all(script.as_bytes()) {
                        tracing::debug!(id = %id, error = %e, "could not write script to stdin");
                    }
                });
            }
        }

        let stderr = child.stderr.take();
        Ok((child, stderr))
    }

    /// Kill every running launch and mark it failed.
    ///
    /// Only the first call does anything.
    pub fn stop(&self) {
        self.stop_once.call_once(|| {
            let mut state = write(&self.state);
            state.stopped = true;

            let State {
                launches, children, ..
            } = &mut *state;
            for (launch, child) in launches.iter_mut().zip(children.iter()) {
                if launch.status != LaunchStatus::Running {
                    continue;
                }
                if let Some(child) = child {
                    if let Err(e) = lock(child).kill() {
                        tracing::debug!(id = %launch.bean.id, error = %e, "kill failed");
                    }
                }
                launch.fail(LaunchError::Stopped);
                tracing::info!(id = %launch.bean.id, "launch stopped");
            }
        });
    }

    pub fn is_stopped(&self) -> bool {
        read(&self.state).stopped
    }

    /// Snapshot of every launch.
    pub fn summary(&self) -> LaunchSummary {
        LaunchSummary::from_launches(&read(&self.state).launches)
    }

    pub fn counts(&self) -> LaunchCounts {
        LaunchCounts::tally(&read(&self.state).launches)
    }

    pub fn is_complete(&self) -> bool {
        read(&self.state)
            .launches
            .iter()
            .all(|l| l.status.is_terminal())
    }

    /// Block until every monitor has finished, then return the final summary.
    pub fn wait(&self) -> LaunchSummary {
        let handles: Vec<_> = lock(&self.monitors).drain(..).collect();
        for handle in handles {
            if handle.join().is_err() {
                tracing::warn!("launch monitor panicked");
            }
        }
        self.summary()
    }
}

impl Drop for LaunchManager {
    fn drop(&mut self) {
        self.stop();
    }
}

fn monitor(
    state: Arc<RwLock<State>>,
    index: usize,
    child: Arc<Mutex<Child>>,
    stderr: Option<ChildStderr>,
) {
    let reader = stderr.map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            // A killed process may leave a partial read behind; keep what arrived.
            let _ = pipe.read_to_end(&mut buf);
            String::from_utf8_lossy(&buf).into_owned()
        })
    });

    let exit = loop {
        let polled = lock(&child).try_wait();
        match polled {
            Ok(Some(status)) => break Ok(status),
            Ok(None) => thread::sleep(POLL_INTERVAL),
            Err(e) => break Err(e),
        }
    };

    // Stopped launches are already settled; a grandchild may still hold
    // stderr open, so don't wait on the reader.
    if read(&state).launches[index].status != LaunchStatus::Running {
        return;
    }

    let output = reader
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default();

    let mut state = write(&state);
    let launch = &mut state.launches[index];
    if launch.status != LaunchStatus::Running {
        return;
    }
    launch.output = output.clone();
    match exit {
        Ok(status) if status.success() => {
            launch.status = LaunchStatus::Success;
            launch.finished_at = Some(Utc::now());
            tracing::debug!(id = %launch.bean.id, "launch succeeded");
        }
        Ok(status) => {
            tracing::debug!(id = %launch.bean.id, %status, "launch failed");
            launch.fail(LaunchError::Exited {
                code: status.code(),
                status: status.to_string(),
                stderr: output,
            });
        }
        Err(e) => {
            tracing::warn!(id = %launch.bean.id, error = %e, "could not wait on launch");
            launch.fail(LaunchError::Wait(e.to_string()));
        }
    }
}

fn read(state: &RwLock<State>) -> RwLockReadGuard<'_, State> {
    state.read().unwrap_or_else(PoisonError::into_inner)
}

fn write(state: &RwLock<State>) -> RwLockWriteGuard<'_, State> {
    state.write().unwrap_or_else(PoisonError::into_inner)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;
    use tempfile::TempDir;

    fn launcher(exec: &str) -> Launcher {
        Launcher {
            name: "test".to_string(),
            exec: exec.to_string(),
            description: None,
        }
    }

    fn beans(n: usize) -> Vec<Bean> {
        (1..=n)
            .map(|i| Bean::new(format!("b{}", i), format!("Bean {}", i)))
            .collect()
    }

    fn beans_dir() -> (TempDir, std::path::PathBuf) {
        let dir = TempDir::new().unwrap();
        let beans = dir.path().join(".beans");
        std::fs::create_dir(&beans).unwrap();
        (dir, beans)
    }

    #[test]
    fn test_parallel_launches_with_one_failure() {
        let (_dir, beans_dir) = beans_dir();
        let script = r#"if [ "$BEANS_ID" = "b3" ]; then echo boom >&2; exit 3; fi"#;
        let manager = LaunchManager::new(launcher(script), beans(5));
        manager.start(&beans_dir).unwrap();

        let summary = manager.wait();
        assert!(summary.complete);
        assert!(!summary.all_successful);
        assert_eq!(summary.counts.success, 4);
        assert_eq!(summary.counts.failed, 1);
        assert_eq!(summary.counts.total, 5);

        for launch in &summary.launches {
            if launch.bean.id == "b3" {
                assert_eq!(launch.status, LaunchStatus::Failed);
            } else {
                assert_eq!(launch.status, LaunchStatus::Success, "{}", launch.bean.id);
                assert!(launch.error.is_none());
            }
        }

        let failed = summary.first_error.unwrap();
        assert_eq!(failed.bean.id, "b3");
        assert!(failed.output.contains("boom"));
        match failed.error {
            Some(LaunchError::Exited { code, ref stderr, .. }) => {
                assert_eq!(code, Some(3));
                assert!(stderr.contains("boom"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(failed.finished_at.is_some());
    }

    #[test]
    fn test_launch_sees_environment() {
        let (dir, beans_dir) = beans_dir();
        let script = r#"[ "$BEANS_TASK" = "Bean 1" ] && [ "$BEANS_DIR" = "$BEANS_ROOT/.beans" ] && [ -d .beans ]"#;
        let manager = LaunchManager::new(launcher(script), beans(1)).with_output(OutputMode::Discard);
        manager.start(&beans_dir).unwrap();

        let summary = manager.wait();
        assert!(summary.all_successful, "{:?}", summary.first_error);
        drop(dir);
    }

    #[test]
    fn test_counts_stay_consistent_while_running() {
        let (_dir, beans_dir) = beans_dir();
        let manager = LaunchManager::new(launcher("sleep 0.2"), beans(4));
        manager.start(&beans_dir).unwrap();

        let deadline = Instant::now() + Duration::from_secs(10);
        while !manager.is_complete() && Instant::now() < deadline {
            let summary = manager.summary();
            let c = summary.counts;
            assert_eq!(c.pending + c.running + c.success + c.failed, c.total);
            assert_eq!(c.total, summary.launches.len());
            assert_eq!(summary.complete, c.pending == 0 && c.running == 0);
            thread::sleep(Duration::from_millis(10));
        }

        let summary = manager.wait();
        assert!(summary.all_successful);
        assert_eq!(summary.counts.success, 4);
    }

    #[test]
    fn test_start_failure_marks_every_launch_failed() {
        let (_dir, beans_dir) = beans_dir();
        let manager = LaunchManager::new(launcher("echo one\necho two"), beans(3));
        manager.start(&beans_dir).unwrap();

        let summary = manager.summary();
        assert!(summary.complete);
        assert_eq!(summary.counts.failed, 3);
        assert!(summary.launches.iter().all(|l| l.error == Some(LaunchError::MissingShebang)));
        assert_eq!(summary.first_error.unwrap().bean.id, "b1");
    }

    #[test]
    fn test_shebang_script_runs() {
        let (_dir, beans_dir) = beans_dir();
        let script = "#!/bin/sh\necho from-script >&2\nexit 4\n";
        let manager = LaunchManager::new(launcher(script), beans(1)).with_output(OutputMode::Discard);
        manager.start(&beans_dir).unwrap();

        let summary = manager.wait();
        let failed = summary.first_error.unwrap();
        assert!(failed.output.contains("from-script"));
    }

    #[test]
    fn test_stop_kills_running_launches() {
        let (_dir, beans_dir) = beans_dir();
        let manager = LaunchManager::new(launcher("exec sleep 30"), beans(2));
        manager.start(&beans_dir).unwrap();
        assert_eq!(manager.counts().running, 2);

        let begun = Instant::now();
        manager.stop();
        manager.stop();
        let summary = manager.wait();

        assert!(begun.elapsed() < Duration::from_secs(10));
        assert!(manager.is_stopped());
        assert_eq!(summary.counts.failed, 2);
        assert!(summary.launches.iter().all(|l| l.error == Some(LaunchError::Stopped)));
        assert!(summary.launches.iter().all(|l| l.finished_at.is_some()));
    }

    #[test]
    fn test_start_twice_and_after_stop() {
        let (_dir, beans_dir) = beans_dir();
        let manager = LaunchManager::new(launcher("true"), beans(1));
        manager.start(&beans_dir).unwrap();
        assert_eq!(manager.start(&beans_dir), Err(LaunchError::AlreadyStarted));
        manager.wait();

        let stopped = LaunchManager::new(launcher("true"), beans(1));
        stopped.stop();
        assert_eq!(stopped.start(&beans_dir), Err(LaunchError::ManagerStopped));
    }

    #[test]
    fn test_empty_summary() {
        let manager = LaunchManager::new(launcher("true"), Vec::new());
        let summary = manager.summary();
        assert!(summary.complete);
        assert!(summary.all_successful);
        assert!(summary.first_error.is_none());
        assert_eq!(summary.counts, LaunchCounts::default());
    }

    #[test]
    fn test_pending_before_start() {
        let manager = LaunchManager::new(launcher("true"), beans(2));
        let summary = manager.summary();
        assert!(!summary.complete);
        assert!(!summary.all_successful);
        assert_eq!(summary.counts.pending, 2);
    }
}
