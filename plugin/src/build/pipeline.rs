//! Build pipeline: runs one target of a module's build file

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::build::engine::{BuildEngine, BuildFileHandle, BuildReport, BuildState};
use crate::errors::PluginError;

/// Result of one pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildOutcome {
    Success,
    /// The build could not start: missing or corrupt build file, missing tool
    FailedToRun,
    FailedWithErrors(u32),
}

impl BuildOutcome {
    /// Exit status decides the outcome; error lines in a successful build
    /// are not failures.
    pub fn from_report(report: BuildReport) -> Self {
        match report.state {
            BuildState::Finished => BuildOutcome::Success,
            BuildState::Failed => BuildOutcome::FailedWithErrors(report.error_count),
            BuildState::FailedToRun => BuildOutcome::FailedToRun,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, BuildOutcome::Success)
    }
}

/// What a caller does once its build has finished
#[async_trait]
pub trait BuildOutcomeHandler: Send + Sync {
    async fn on_outcome(&self, outcome: BuildOutcome) -> Result<(), PluginError>;
}

/// Drives the host build engine.
pub struct BuildPipeline {
    engine: Arc<dyn BuildEngine>,
    registry: Arc<Mutex<()>>,
}

impl BuildPipeline {
    pub fn new(engine: Arc<dyn BuildEngine>) -> Self {
        Self {
            engine,
            registry: Arc::new(Mutex::new(())),
        }
    }

    /// Run `target` of `build_file` (empty target runs the default).
    ///
    /// A build file this call had to register is unregistered again when the
    /// run ends; a registration that already existed is left alone.
    pub async fn run(&self, build_file: &Path, target: &str) -> BuildOutcome {
        let registration = {
            let _registry = self.registry.lock().unwrap_or_else(|e| e.into_inner());
            match self.engine.find_build_file(build_file) {
                Some(handle) => Registration {
                    engine: self.engine.clone(),
                    registry: self.registry.clone(),
                    handle,
                    registered_here: false,
                },
                None => match self.engine.register_build_file(build_file) {
                    Ok(handle) => Registration {
                        engine: self.engine.clone(),
                        registry: self.registry.clone(),
                        handle,
                        registered_here: true,
                    },
                    Err(e) => {
                        error!("Cannot register build file {}: {}", build_file.display(), e);
                        return BuildOutcome::FailedToRun;
                    }
                },
            }
        };

        let targets: Vec<String> = if target.is_empty() {
            Vec::new()
        } else {
            vec![target.to_string()]
        };

        let report = self.engine.run_target(&registration.handle, &targets).await;
        drop(registration);

        let outcome = BuildOutcome::from_report(report);
        match outcome {
            BuildOutcome::Success if report.error_count > 0 => warn!(
                "Build of {} succeeded with {} error lines",
                build_file.display(),
                report.error_count
            ),
            BuildOutcome::Success => info!("Build of {} succeeded", build_file.display()),
            BuildOutcome::FailedToRun => error!("Build of {} failed to run", build_file.display()),
            BuildOutcome::FailedWithErrors(count) => {
                error!("Build of {} failed with {} errors", build_file.display(), count)
            }
        }
        outcome
    }

    /// Run the build, then hand the outcome to `handler`. The registration is
    /// already released when the handler runs.
    pub async fn run_with(
        &self,
        build_file: &Path,
        target: &str,
        handler: &dyn BuildOutcomeHandler,
    ) -> Result<(), PluginError> {
        let outcome = self.run(build_file, target).await;
        handler.on_outcome(outcome).await
    }
}

/// Removes a registration the pipeline created, on every exit path
struct Registration {
    engine: Arc<dyn BuildEngine>,
    registry: Arc<Mutex<()>>,
    handle: BuildFileHandle,
    registered_here: bool,
}

impl Drop for Registration {
    fn drop(&mut self) {
        if self.registered_here {
            let _registry = self.registry.lock().unwrap_or_else(|e| e.into_inner());
            self.engine.unregister_build_file(&self.handle);
        }
    }
}
