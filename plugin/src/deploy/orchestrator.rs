//! Build-and-deploy orchestrator

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::accounts::load_task::{load_accounts, LOADING_TEXT};
use crate::app::state::PluginState;
use crate::build::pipeline::{BuildOutcome, BuildOutcomeHandler};
use crate::cloud::{DeployRequest, StepEmitter};
use crate::deploy::fsm::{OrchestratorEvent, OrchestratorFsm, OrchestratorState};
use crate::deploy::patch::RoleSettingsPatch;
use crate::deploy::stage::Stage;
use crate::errors::PluginError;
use crate::filesys::dir::Dir;
use crate::filesys::file::File;
use crate::models::account::AccountHandle;
use crate::models::project::Project;
use crate::progress::{ProgressReporter, ProgressScope, ProgressSlice};
use crate::storage::layout::{ModuleLayout, BUILD_FAILED_MARKER};

// Progress fraction reached at the end of each phase
const VALIDATED: f64 = 0.25;
const BUILT: f64 = 0.6;
const FINALIZED: f64 = 0.7;

/// One build-and-deploy operation on a module
pub struct OperationRequest {
    pub layout: ModuleLayout,
    pub stage: Stage,
    /// Settings to reset to auto after a successful build
    pub patch: RoleSettingsPatch,
    /// Accounts to load while validating a cloud deployment
    pub accounts: Vec<AccountHandle>,
}

impl OperationRequest {
    pub fn new(layout: ModuleLayout, stage: Stage) -> Self {
        Self {
            layout,
            stage,
            patch: RoleSettingsPatch::new(),
            accounts: Vec::new(),
        }
    }

    pub fn with_patch(mut self, patch: RoleSettingsPatch) -> Self {
        self.patch = patch;
        self
    }

    pub fn with_accounts(mut self, accounts: Vec<AccountHandle>) -> Self {
        self.accounts = accounts;
        self
    }
}

/// Drives one operation through validate, build, finalize and deploy
pub struct DeployOrchestrator {
    state: Arc<PluginState>,
    layout: ModuleLayout,
    stage: Stage,
    patch: Mutex<RoleSettingsPatch>,
    accounts: Mutex<Vec<AccountHandle>>,
    fsm: RwLock<OrchestratorFsm>,
}

impl DeployOrchestrator {
    pub fn new(state: Arc<PluginState>, request: OperationRequest) -> Self {
        Self {
            state,
            layout: request.layout,
            stage: request.stage,
            patch: Mutex::new(request.patch),
            accounts: Mutex::new(request.accounts),
            fsm: RwLock::new(OrchestratorFsm::new()),
        }
    }

    /// Get the current orchestrator state
    pub async fn state(&self) -> OrchestratorState {
        self.fsm.read().await.state()
    }

    /// States entered so far
    pub async fn history(&self) -> Vec<OrchestratorState> {
        self.fsm.read().await.history().to_vec()
    }

    /// Failure message once failed
    pub async fn error(&self) -> Option<String> {
        self.fsm.read().await.error().map(str::to_string)
    }

    /// Run the operation to completion.
    ///
    /// Every user-facing failure is shown through the error reporter exactly
    /// once before it is returned; cancellation is only logged.
    pub async fn run(&self) -> Result<(), PluginError> {
        let title = self.stage.title();
        let _lease = match self
            .state
            .active_operations
            .try_acquire(&self.layout.module_dir)
        {
            Ok(lease) => lease,
            Err(e) => {
                warn!("Rejected {} on {}: {}", self.stage.name(), self.layout.name(), e);
                self.state
                    .error_reporter
                    .display_error(title, "Another operation is running on this module", &e);
                return Err(e);
            }
        };

        info!("Starting {} of module {}", self.stage.name(), self.layout.name());
        let scope = ProgressScope::open(self.state.progress_host.as_ref(), title);
        let reporter = scope.reporter().clone();

        match self.execute(&reporter).await {
            Ok(()) => {
                reporter.set_fraction(1.0);
                info!("Finished {} of module {}", self.stage.name(), self.layout.name());
                Ok(())
            }
            Err(e) => {
                self.fail(&e).await;
                Err(e)
            }
        }
    }

    async fn execute(&self, reporter: &Arc<dyn ProgressReporter>) -> Result<(), PluginError> {
        self.transition(OrchestratorEvent::Start).await?;
        let project = self.validate(reporter).await?;
        let deploy_dir = self.layout.deploy_dir(&project.package_dir);

        // Last cancel point. A build that succeeds is always finalized.
        check_cancelled(reporter.as_ref())?;
        self.transition(OrchestratorEvent::Validated).await?;
        self.build(&project, reporter.as_ref()).await?;

        self.transition(OrchestratorEvent::BuildSucceeded).await?;
        self.finalize(&deploy_dir, reporter.as_ref()).await?;

        self.transition(OrchestratorEvent::Finalized).await?;
        self.deploy(&deploy_dir, reporter.as_ref()).await?;

        self.transition(OrchestratorEvent::Deployed).await?;
        Ok(())
    }

    async fn validate(&self, reporter: &Arc<dyn ProgressReporter>) -> Result<Project, PluginError> {
        reporter.set_text2("Validating...");
        let project = self
            .state
            .project_store
            .load(self.layout.project_file().path())
            .await?;

        if self.stage.requires_sdk(self.state.is_windows)
            && self.state.sdk_locator.sdk_location().is_none()
        {
            return Err(PluginError::ConfigError(
                "Cloud SDK is not installed".to_string(),
            ));
        }
        self.stage.validate_roles(&project)?;

        if let Stage::Deploy(_) = self.stage {
            let accounts = std::mem::take(&mut *self.accounts.lock().unwrap_or_else(|e| e.into_inner()));
            if !accounts.is_empty() {
                reporter.set_text2(LOADING_TEXT);
                let slice: Arc<dyn ProgressReporter> =
                    Arc::new(ProgressSlice::new(reporter.clone(), 0.0, VALIDATED));
                load_accounts(self.state.account_loader.as_ref(), accounts, slice).await?;
            }
        }

        reporter.set_fraction(VALIDATED);
        Ok(project)
    }

    /// Write the package settings of this stage and run the build. The role
    /// model is restored as it was on disk if the build does not succeed.
    async fn build(&self, project: &Project, reporter: &dyn ProgressReporter) -> Result<(), PluginError> {
        let project_file = self.layout.project_file();
        let mut prepared = project.clone();
        prepared.package_type = self.stage.package_type();
        if let Some(url) = &self.state.settings.portal_url {
            prepared.portal_url = Some(url.clone());
        }

        let snapshot = if prepared != *project {
            let snapshot = project_file.read_bytes().await?;
            self.state
                .project_store
                .save(project_file.path(), &prepared)
                .await?;
            debug!("Package type set to {:?}", prepared.package_type);
            Some(snapshot)
        } else {
            None
        };

        reporter.set_text2("Building package...");
        let build_file = self.layout.build_file();
        let completion = BuildCompletion {
            build_file: &build_file,
            project_file: &project_file,
            snapshot,
            reporter,
        };
        self.state
            .pipeline
            .run_with(&build_file, &self.state.settings.build.target, &completion)
            .await
    }

    async fn finalize(&self, deploy_dir: &Dir, reporter: &dyn ProgressReporter) -> Result<(), PluginError> {
        let patch = self.patch.lock().unwrap_or_else(|e| e.into_inner()).take();
        if !patch.is_empty() {
            reporter.set_text2("Updating role settings...");
            self.apply_patch(&patch)
                .await
                .map_err(|e| PluginError::PartialApply {
                    artifact: deploy_dir.path().to_path_buf(),
                    source: Box::new(e),
                })?;
        }
        reporter.set_fraction(FINALIZED);
        Ok(())
    }

    async fn apply_patch(&self, patch: &RoleSettingsPatch) -> Result<(), PluginError> {
        let path = self.layout.project_file();
        let mut project = self.state.project_store.load(path.path()).await?;
        patch.apply(&mut project);
        self.state.project_store.save(path.path(), &project).await
    }

    async fn deploy(&self, deploy_dir: &Dir, reporter: &dyn ProgressReporter) -> Result<(), PluginError> {
        match &self.stage {
            Stage::Package => {
                reporter.set_text2("Opening package...");
                if !deploy_dir.has_entries().await || deploy_dir.file(BUILD_FAILED_MARKER).exists().await {
                    return Err(PluginError::ConfigError(format!(
                        "Build failed, no package in {}",
                        deploy_dir.path().display()
                    )));
                }
                if let Err(e) = self.state.artifact_viewer.reveal(deploy_dir.path()) {
                    warn!("Cannot show package {}: {}", deploy_dir.path().display(), e);
                }
                Ok(())
            }
            Stage::RunInEmulator => {
                reporter.set_text2("Starting emulator...");
                self.state.cloud.deploy_to_emulator(deploy_dir.path()).await
            }
            Stage::Deploy(target) => {
                reporter.set_text2("Deploying package...");
                let emitter = StepEmitter::new(self.state.bus.clone(), target.service_name.clone());
                let request = DeployRequest {
                    target: target.clone(),
                    deployment_name: Uuid::new_v4().to_string(),
                    package_dir: deploy_dir.path().to_path_buf(),
                };

                let result = self.state.cloud.deploy(&request, &emitter).await;
                match &result {
                    Ok(()) if emitter.emitted() < 100.0 => emitter.complete("Deployed"),
                    Ok(()) => {}
                    Err(e) => emitter.complete(&format!("Deployment failed: {}", e)),
                }
                result
            }
        }
    }

    async fn transition(&self, event: OrchestratorEvent) -> Result<OrchestratorState, PluginError> {
        let mut fsm = self.fsm.write().await;
        let state = fsm.process(event)?;
        info!(
            module = %self.layout.name(),
            stage = self.stage.name(),
            "Orchestrator state: {:?}",
            state
        );
        Ok(state)
    }

    async fn fail(&self, err: &PluginError) {
        if let Err(e) = self.transition(OrchestratorEvent::Fail(err.to_string())).await {
            warn!("{}", e);
        }
        if err.is_user_facing() {
            self.state.error_reporter.display_error(
                self.stage.title(),
                &format!("Operation on module {} failed", self.layout.name()),
                err,
            );
        } else if let PluginError::BuildFailed(count) = err {
            warn!(
                "{} of module {} stopped, {} build errors",
                self.stage.name(),
                self.layout.name(),
                count
            );
        } else {
            info!("{} of module {} stopped: {}", self.stage.name(), self.layout.name(), err);
        }
    }
}

/// Completes the build phase: records progress on success, otherwise puts the
/// role model back and turns the outcome into an error
struct BuildCompletion<'a> {
    build_file: &'a Path,
    project_file: &'a File,
    snapshot: Option<Vec<u8>>,
    reporter: &'a dyn ProgressReporter,
}

#[async_trait]
impl BuildOutcomeHandler for BuildCompletion<'_> {
    async fn on_outcome(&self, outcome: BuildOutcome) -> Result<(), PluginError> {
        let err = match outcome {
            BuildOutcome::Success => {
                self.reporter.set_fraction(BUILT);
                return Ok(());
            }
            BuildOutcome::FailedToRun => PluginError::ConfigError(format!(
                "Build file {} is missing or corrupt",
                self.build_file.display()
            )),
            BuildOutcome::FailedWithErrors(count) => PluginError::BuildFailed(count),
        };

        if let Some(snapshot) = &self.snapshot {
            if let Err(e) = self.project_file.write_atomic(snapshot).await {
                error!(
                    "Failed to restore role model {}: {}",
                    self.project_file.path().display(),
                    e
                );
            }
        }
        Err(err)
    }
}

fn check_cancelled(reporter: &dyn ProgressReporter) -> Result<(), PluginError> {
    if reporter.is_cancelled() {
        return Err(PluginError::Cancelled);
    }
    Ok(())
}
