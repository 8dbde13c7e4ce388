//! Host build engine collaborator

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, error, info};

use crate::errors::PluginError;

/// A build file known to the engine
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BuildFileHandle {
    path: PathBuf,
}

impl BuildFileHandle {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// How the engine finished a target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildState {
    /// Build tool exited successfully
    Finished,
    /// Build tool ran and failed
    Failed,
    /// Build tool could not be started
    FailedToRun,
}

/// Raw result of running a target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildReport {
    pub state: BuildState,
    pub error_count: u32,
}

/// The host's build engine.
///
/// The registration methods are not required to be thread-safe against each
/// other; [`BuildPipeline`](crate::build::pipeline::BuildPipeline) serializes
/// them.
#[async_trait]
pub trait BuildEngine: Send + Sync {
    fn find_build_file(&self, path: &Path) -> Option<BuildFileHandle>;

    fn register_build_file(&self, path: &Path) -> Result<BuildFileHandle, PluginError>;

    fn unregister_build_file(&self, handle: &BuildFileHandle);

    /// Run `targets` (empty runs the default target)
    async fn run_target(&self, handle: &BuildFileHandle, targets: &[String]) -> BuildReport;
}

/// Build engine driving an external build tool as a child process:
/// `<program> -f <build file> [targets...]`
pub struct CommandBuildEngine {
    program: String,
    registered: Mutex<HashSet<PathBuf>>,
}

impl CommandBuildEngine {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            registered: Mutex::new(HashSet::new()),
        }
    }
}

#[async_trait]
impl BuildEngine for CommandBuildEngine {
    fn find_build_file(&self, path: &Path) -> Option<BuildFileHandle> {
        let registered = self.registered.lock().unwrap_or_else(|e| e.into_inner());
        registered.get(path).map(|p| BuildFileHandle::new(p.clone()))
    }

    fn register_build_file(&self, path: &Path) -> Result<BuildFileHandle, PluginError> {
        if !path.is_file() {
            return Err(PluginError::ConfigError(format!(
                "Build file not found: {}",
                path.display()
            )));
        }
        let mut registered = self.registered.lock().unwrap_or_else(|e| e.into_inner());
        registered.insert(path.to_path_buf());
        Ok(BuildFileHandle::new(path))
    }

    fn unregister_build_file(&self, handle: &BuildFileHandle) {
        let mut registered = self.registered.lock().unwrap_or_else(|e| e.into_inner());
        registered.remove(handle.path());
    }

    async fn run_target(&self, handle: &BuildFileHandle, targets: &[String]) -> BuildReport {
        info!(
            "Running {} on {} (targets: {:?})",
            self.program,
            handle.path().display(),
            targets
        );

        let mut command = Command::new(&self.program);
        command
            .arg("-f")
            .arg(handle.path())
            .args(targets)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = handle.path().parent() {
            command.current_dir(dir);
        }

        let output = match command.output().await {
            Ok(output) => output,
            Err(e) => {
                error!("Failed to start {}: {}", self.program, e);
                return BuildReport {
                    state: BuildState::FailedToRun,
                    error_count: 0,
                };
            }
        };

        let error_count = count_error_lines(&output.stdout) + count_error_lines(&output.stderr);
        let state = if output.status.success() {
            BuildState::Finished
        } else {
            BuildState::Failed
        };
        debug!(?state, error_count, "Build tool exited with {}", output.status);

        BuildReport { state, error_count }
    }
}

fn count_error_lines(output: &[u8]) -> u32 {
    let count = String::from_utf8_lossy(output)
        .lines()
        .filter(|line| line.to_ascii_lowercase().contains("error"))
        .count();
    u32::try_from(count).unwrap_or(u32::MAX)
}
