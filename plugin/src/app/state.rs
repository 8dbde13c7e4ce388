//! Plugin state: collaborators and shared registries

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;

use crate::accounts::load_task::{load_accounts, AccountLoader, LOADING_TEXT};
use crate::accounts::storage_task::{creating_text, StorageAccountTask};
use crate::build::engine::{BuildEngine, CommandBuildEngine};
use crate::build::pipeline::BuildPipeline;
use crate::cloud::CloudManagement;
use crate::deploy::lease::ActiveOperations;
use crate::deploy::orchestrator::{DeployOrchestrator, OperationRequest};
use crate::errors::PluginError;
use crate::events::bus::{DeploymentEventBus, EventBus};
use crate::filesys::file::File;
use crate::host::{ArtifactViewer, EnvSdkLocator, ErrorReporter, LogErrorReporter, SdkLocator};
use crate::logs::init_logging;
use crate::models::account::{AccountHandle, StorageAccountRequest};
use crate::progress::{ProgressHost, ProgressScope};
use crate::project::{JsonProjectStore, ProjectStore};
use crate::storage::settings::Settings;
use crate::workers::undeploy::{UndeployRequest, UndeploymentTask, UNDEPLOY_TITLE};

/// Collaborators the host must provide
pub struct HostServices {
    pub cloud: Arc<dyn CloudManagement>,
    pub account_loader: Arc<dyn AccountLoader>,
    pub progress_host: Arc<dyn ProgressHost>,
    pub artifact_viewer: Arc<dyn ArtifactViewer>,
}

/// Collaborators with a usable default
#[derive(Default)]
pub struct Overrides {
    pub bus: Option<Arc<dyn EventBus>>,
    pub build_engine: Option<Arc<dyn BuildEngine>>,
    pub project_store: Option<Arc<dyn ProjectStore>>,
    pub sdk_locator: Option<Arc<dyn SdkLocator>>,
    pub error_reporter: Option<Arc<dyn ErrorReporter>>,
    pub is_windows: Option<bool>,
}

/// Everything an operation needs, shared by every operation of the plugin
pub struct PluginState {
    pub settings: Settings,
    pub bus: Arc<dyn EventBus>,
    pub project_store: Arc<dyn ProjectStore>,
    pub cloud: Arc<dyn CloudManagement>,
    pub account_loader: Arc<dyn AccountLoader>,
    pub pipeline: BuildPipeline,
    pub sdk_locator: Arc<dyn SdkLocator>,
    pub progress_host: Arc<dyn ProgressHost>,
    pub error_reporter: Arc<dyn ErrorReporter>,
    pub artifact_viewer: Arc<dyn ArtifactViewer>,
    pub active_operations: Arc<ActiveOperations>,
    /// Host OS is Windows (emulator availability)
    pub is_windows: bool,
}

impl PluginState {
    /// Load settings, start logging and initialize plugin state. The guard
    /// keeps the log file writer alive.
    pub async fn bootstrap(
        settings_file: &File,
        services: HostServices,
        overrides: Overrides,
    ) -> Result<(Self, Option<WorkerGuard>), PluginError> {
        let settings = Settings::load(settings_file).await?;
        let guard = init_logging(settings.log_options())?;
        let state = Self::init(settings, services, overrides)?;
        Ok((state, guard))
    }

    /// Initialize plugin state
    pub fn init(
        settings: Settings,
        services: HostServices,
        overrides: Overrides,
    ) -> Result<Self, PluginError> {
        settings.validate()?;
        info!("Initializing deployment core...");

        let bus: Arc<dyn EventBus> = match overrides.bus {
            Some(bus) => bus,
            None => DeploymentEventBus::global(),
        };
        let build_engine = overrides
            .build_engine
            .unwrap_or_else(|| Arc::new(CommandBuildEngine::new(settings.build.program.clone())));

        Ok(Self {
            bus,
            project_store: overrides
                .project_store
                .unwrap_or_else(|| Arc::new(JsonProjectStore)),
            cloud: services.cloud,
            account_loader: services.account_loader,
            pipeline: BuildPipeline::new(build_engine),
            sdk_locator: overrides
                .sdk_locator
                .unwrap_or_else(|| Arc::new(EnvSdkLocator::default())),
            progress_host: services.progress_host,
            error_reporter: overrides
                .error_reporter
                .unwrap_or_else(|| Arc::new(LogErrorReporter)),
            artifact_viewer: services.artifact_viewer,
            active_operations: Arc::new(ActiveOperations::new()),
            is_windows: overrides.is_windows.unwrap_or(cfg!(windows)),
            settings,
        })
    }

    /// Run a build-and-deploy operation on its own background task
    pub fn start(self: &Arc<Self>, request: OperationRequest) -> JoinHandle<Result<(), PluginError>> {
        let orchestrator = DeployOrchestrator::new(self.clone(), request);
        tokio::spawn(async move { orchestrator.run().await })
    }

    /// Undeploy in the background. The returned handle may be dropped; the
    /// task finishes on its own.
    pub fn undeploy(&self, request: UndeployRequest) -> JoinHandle<()> {
        let reporter = self.progress_host.start(UNDEPLOY_TITLE);
        UndeploymentTask::new(self.bus.clone(), self.cloud.clone(), reporter).spawn(request)
    }

    /// Load account settings under their own progress scope, reporting
    /// failures to the user
    pub async fn load_accounts(&self, accounts: Vec<AccountHandle>) -> Result<(), PluginError> {
        let scope = ProgressScope::open(self.progress_host.as_ref(), LOADING_TEXT);
        let result = load_accounts(
            self.account_loader.as_ref(),
            accounts,
            scope.reporter().clone(),
        )
        .await;

        if let Err(e) = &result {
            self.report_failure("Failed to load account settings", e);
        }
        result
    }

    /// Create a storage account under its own progress scope, reporting
    /// failures to the user
    pub async fn create_storage_account(
        &self,
        request: StorageAccountRequest,
    ) -> Result<(), PluginError> {
        let scope = ProgressScope::open(self.progress_host.as_ref(), &creating_text(&request.name));
        let task = StorageAccountTask::new(request, scope.reporter().clone());
        let result = task.run(self.cloud.as_ref()).await;

        if let Err(e) = &result {
            self.report_failure("Failed to create storage account", e);
        }
        result
    }

    fn report_failure(&self, message: &str, e: &PluginError) {
        if e.is_user_facing() {
            self.error_reporter.display_error("Error", message, e);
        } else {
            error!("{}: {}", message, e);
        }
    }
}
