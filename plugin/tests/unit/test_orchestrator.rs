//! Orchestrator tests

mod support;

use std::path::PathBuf;
use std::sync::Arc;

use tempfile::TempDir;

use roledeploy::accounts::load_task::AccountLoader;
use roledeploy::app::state::{HostServices, Overrides, PluginState};
use roledeploy::build::engine::BuildState;
use roledeploy::cloud::{DeployTarget, DeploymentSlot};
use roledeploy::deploy::fsm::OrchestratorState;
use roledeploy::deploy::orchestrator::{DeployOrchestrator, OperationRequest};
use roledeploy::deploy::patch::RoleSettingsPatch;
use roledeploy::deploy::stage::Stage;
use roledeploy::errors::PluginError;
use roledeploy::events::activity_log::{ActivityLog, RUNNING_LABEL};
use roledeploy::events::bus::{DeploymentEventBus, EventBus};
use roledeploy::events::listener::channel_listener;
use roledeploy::filesys::file::File;
use roledeploy::logs::LogLevel;
use roledeploy::models::project::{PackageType, Project, AUTO};
use roledeploy::progress::{MemoryProgress, MemoryProgressHost, ProgressHost, ProgressReporter};
use roledeploy::storage::layout::{ModuleLayout, BUILD_FAILED_MARKER};
use roledeploy::storage::settings::Settings;

use support::{
    accounts, RecordingCloud, RecordingErrors, RecordingViewer, ScriptedEngine, ScriptedLoader,
    StaticSdk,
};

const ROLE_MODEL: &str = r#"{"package_type": "local", "package_dir": "./deploy",
  "roles": [{"name": "WebRole1",
    "components": [{"name": "shop.war", "cloud_url": "https://storage.example.com/shop.war"}],
    "cache": {"storage_account_name": "devstore", "storage_account_key": "secret"}}]}
"#;

const FULL_RUN: [OrchestratorState; 5] = [
    OrchestratorState::Validating,
    OrchestratorState::Building,
    OrchestratorState::Finalizing,
    OrchestratorState::Deploying,
    OrchestratorState::Done,
];

struct Harness {
    dir: TempDir,
    state: Arc<PluginState>,
    engine: Arc<ScriptedEngine>,
    cloud: Arc<RecordingCloud>,
    errors: Arc<RecordingErrors>,
    viewer: Arc<RecordingViewer>,
    progress: Arc<MemoryProgressHost>,
    bus: Arc<DeploymentEventBus>,
}

struct HarnessOptions {
    engine: ScriptedEngine,
    cloud: RecordingCloud,
    loader: Arc<dyn AccountLoader>,
    progress_host: Option<Arc<dyn ProgressHost>>,
    sdk: Option<PathBuf>,
    is_windows: bool,
}

impl Default for HarnessOptions {
    fn default() -> Self {
        Self {
            engine: ScriptedEngine::succeeding(),
            cloud: RecordingCloud::default(),
            loader: Arc::new(ScriptedLoader::default()),
            progress_host: None,
            sdk: Some(PathBuf::from("/opt/cloud-sdk")),
            is_windows: true,
        }
    }
}

impl Harness {
    fn new(options: HarnessOptions) -> Self {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("roles.json"), ROLE_MODEL).unwrap();
        std::fs::write(dir.path().join("package.xml"), "<project/>").unwrap();

        let engine = Arc::new(options.engine);
        let cloud = Arc::new(options.cloud);
        let errors = Arc::new(RecordingErrors::default());
        let viewer = Arc::new(RecordingViewer::default());
        let progress = Arc::new(MemoryProgressHost::new());
        let bus = Arc::new(DeploymentEventBus::new());

        let progress_host: Arc<dyn ProgressHost> = match options.progress_host {
            Some(host) => host,
            None => progress.clone(),
        };

        let state = PluginState::init(
            Settings::default(),
            HostServices {
                cloud: cloud.clone(),
                account_loader: options.loader,
                progress_host,
                artifact_viewer: viewer.clone(),
            },
            Overrides {
                bus: Some(bus.clone()),
                build_engine: Some(engine.clone()),
                project_store: None,
                sdk_locator: Some(Arc::new(StaticSdk(options.sdk))),
                error_reporter: Some(errors.clone()),
                is_windows: Some(options.is_windows),
            },
        )
        .unwrap();

        Self {
            dir,
            state: Arc::new(state),
            engine,
            cloud,
            errors,
            viewer,
            progress,
            bus,
        }
    }

    fn layout(&self) -> ModuleLayout {
        ModuleLayout::new(self.dir.path())
    }

    fn orchestrator(&self, request: OperationRequest) -> DeployOrchestrator {
        DeployOrchestrator::new(self.state.clone(), request)
    }

    fn role_model(&self) -> String {
        std::fs::read_to_string(self.dir.path().join("roles.json")).unwrap()
    }

    fn project(&self) -> Project {
        serde_json::from_str(&self.role_model()).unwrap()
    }

    fn deploy_dir(&self) -> PathBuf {
        self.dir.path().join("deploy")
    }

    fn write_package(&self) {
        std::fs::create_dir_all(self.deploy_dir()).unwrap();
        std::fs::write(self.deploy_dir().join("shop.cspkg"), b"package").unwrap();
    }

    fn single_progress(&self) -> Arc<MemoryProgress> {
        let started = self.progress.started();
        assert_eq!(started.len(), 1);
        started[0].1.clone()
    }
}

fn patch() -> RoleSettingsPatch {
    let mut patch = RoleSettingsPatch::new();
    patch.auto_component_url("WebRole1", "shop.war");
    patch.auto_cache("WebRole1");
    patch
}

fn target() -> DeployTarget {
    DeployTarget {
        subscription_id: "sub-0".to_string(),
        service_name: "shop".to_string(),
        slot: DeploymentSlot::Staging,
        overwrite: true,
    }
}

/// Hands out sinks the user has already cancelled
struct CancelledHost;

impl ProgressHost for CancelledHost {
    fn start(&self, _title: &str) -> Arc<dyn ProgressReporter> {
        let progress = Arc::new(MemoryProgress::new());
        progress.cancel();
        progress
    }
}

#[tokio::test]
async fn test_build_failed_to_run_leaves_role_model_untouched() {
    let h = Harness::new(HarnessOptions {
        engine: ScriptedEngine::refusing_registration(),
        ..Default::default()
    });
    let orchestrator =
        h.orchestrator(OperationRequest::new(h.layout(), Stage::Package).with_patch(patch()));

    let result = orchestrator.run().await;

    assert!(matches!(result, Err(PluginError::ConfigError(_))));
    assert_eq!(
        orchestrator.history().await,
        vec![
            OrchestratorState::Validating,
            OrchestratorState::Building,
            OrchestratorState::Failed,
        ]
    );
    assert_eq!(h.role_model(), ROLE_MODEL);
    assert_eq!(h.errors.shown().len(), 1);
    assert!(h.engine.runs.lock().unwrap().is_empty());

    let progress = h.single_progress().snapshot();
    assert!(progress.finished);
}

#[tokio::test]
async fn test_build_errors_fail_with_count() {
    let h = Harness::new(HarnessOptions {
        engine: ScriptedEngine::new(BuildState::Failed, 3),
        ..Default::default()
    });
    let orchestrator = h.orchestrator(OperationRequest::new(h.layout(), Stage::Package));

    let result = orchestrator.run().await;

    assert!(matches!(result, Err(PluginError::BuildFailed(3))));
    assert_eq!(orchestrator.state().await, OrchestratorState::Failed);
    assert!(orchestrator.error().await.unwrap().contains('3'));
    assert_eq!(h.role_model(), ROLE_MODEL);
    // Counted build errors are left to the build output
    assert!(h.errors.shown().is_empty());
    assert!(h.single_progress().snapshot().finished);
}

#[tokio::test]
async fn test_package_applies_patch_and_reveals_package() {
    let h = Harness::new(HarnessOptions::default());
    h.write_package();
    let orchestrator =
        h.orchestrator(OperationRequest::new(h.layout(), Stage::Package).with_patch(patch()));

    orchestrator.run().await.unwrap();

    assert_eq!(orchestrator.history().await, FULL_RUN.to_vec());
    let project = h.project();
    assert_eq!(project.package_type, PackageType::Cloud);
    let role = project.role("WebRole1").unwrap();
    assert_eq!(role.components[0].cloud_url.as_deref(), Some(AUTO));
    assert_eq!(role.cache.as_ref().unwrap().storage_account_name, AUTO);

    assert_eq!(*h.viewer.revealed.lock().unwrap(), vec![h.deploy_dir()]);
    assert!(h.errors.shown().is_empty());

    let progress = h.single_progress().snapshot();
    assert!(progress.finished);
    assert_eq!(progress.fraction, 1.0);
    assert!(!h.state.active_operations.is_active(h.dir.path()));
}

#[tokio::test]
async fn test_cancel_during_successful_build_still_finalizes() {
    let host = Arc::new(MemoryProgressHost::new());
    let h = Harness::new(HarnessOptions {
        engine: ScriptedEngine::succeeding().cancelling(host.clone()),
        progress_host: Some(host.clone()),
        ..Default::default()
    });
    h.write_package();
    let orchestrator =
        h.orchestrator(OperationRequest::new(h.layout(), Stage::Package).with_patch(patch()));

    orchestrator.run().await.unwrap();

    assert_eq!(orchestrator.history().await, FULL_RUN.to_vec());
    let project = h.project();
    assert_eq!(project.package_type, PackageType::Cloud);
    let role = project.role("WebRole1").unwrap();
    assert_eq!(role.components[0].cloud_url.as_deref(), Some(AUTO));
    assert_eq!(role.cache.as_ref().unwrap().storage_account_key, AUTO);
    assert!(h.errors.shown().is_empty());

    let started = host.started();
    assert_eq!(started.len(), 1);
    let progress = started[0].1.snapshot();
    assert!(progress.cancelled);
    assert!(progress.finished);
}

#[tokio::test]
async fn test_cancel_during_failed_build_restores_role_model() {
    let host = Arc::new(MemoryProgressHost::new());
    let h = Harness::new(HarnessOptions {
        engine: ScriptedEngine::new(BuildState::Failed, 2).cancelling(host.clone()),
        progress_host: Some(host.clone()),
        ..Default::default()
    });
    let orchestrator =
        h.orchestrator(OperationRequest::new(h.layout(), Stage::Package).with_patch(patch()));

    let result = orchestrator.run().await;

    assert!(matches!(result, Err(PluginError::BuildFailed(2))));
    assert_eq!(
        orchestrator.history().await,
        vec![
            OrchestratorState::Validating,
            OrchestratorState::Building,
            OrchestratorState::Failed
        ]
    );
    assert_eq!(h.role_model(), ROLE_MODEL);
}

#[tokio::test]
async fn test_package_with_failure_marker_fails() {
    let h = Harness::new(HarnessOptions::default());
    h.write_package();
    std::fs::write(h.deploy_dir().join(BUILD_FAILED_MARKER), "errors").unwrap();
    let orchestrator = h.orchestrator(OperationRequest::new(h.layout(), Stage::Package));

    let result = orchestrator.run().await;

    assert!(matches!(result, Err(PluginError::ConfigError(_))));
    let history = orchestrator.history().await;
    assert_eq!(
        &history[history.len() - 2..],
        &[OrchestratorState::Deploying, OrchestratorState::Failed]
    );
    assert!(h.viewer.revealed.lock().unwrap().is_empty());
    assert_eq!(h.errors.shown().len(), 1);
}

#[tokio::test]
async fn test_second_operation_on_module_rejected() {
    let h = Harness::new(HarnessOptions::default());
    let _lease = h.state.active_operations.try_acquire(h.dir.path()).unwrap();
    let orchestrator = h.orchestrator(OperationRequest::new(h.layout(), Stage::Package));

    let result = orchestrator.run().await;

    assert!(matches!(result, Err(PluginError::OperationInProgress(_))));
    assert!(orchestrator.history().await.is_empty());
    assert!(h.progress.started().is_empty());
    assert_eq!(h.errors.shown().len(), 1);
}

#[tokio::test]
async fn test_emulator_skips_sdk_check_off_windows() {
    let h = Harness::new(HarnessOptions {
        sdk: None,
        is_windows: false,
        ..Default::default()
    });

    let handle = h
        .state
        .start(OperationRequest::new(h.layout(), Stage::RunInEmulator));
    handle.await.unwrap().unwrap();

    assert_eq!(*h.cloud.emulated.lock().unwrap(), vec![h.deploy_dir()]);
    assert_eq!(h.role_model(), ROLE_MODEL);
}

#[tokio::test]
async fn test_missing_sdk_fails_validation() {
    let h = Harness::new(HarnessOptions {
        sdk: None,
        is_windows: true,
        ..Default::default()
    });
    let orchestrator = h.orchestrator(OperationRequest::new(h.layout(), Stage::RunInEmulator));

    let result = orchestrator.run().await;

    assert!(matches!(result, Err(PluginError::ConfigError(_))));
    assert_eq!(
        orchestrator.history().await,
        vec![OrchestratorState::Validating, OrchestratorState::Failed]
    );
    assert!(h.engine.runs.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_cancelled_before_build_is_not_reported() {
    let h = Harness::new(HarnessOptions {
        progress_host: Some(Arc::new(CancelledHost)),
        ..Default::default()
    });
    let orchestrator = h.orchestrator(OperationRequest::new(h.layout(), Stage::Package));

    let result = orchestrator.run().await;

    assert!(matches!(result, Err(PluginError::Cancelled)));
    assert_eq!(
        orchestrator.history().await,
        vec![OrchestratorState::Validating, OrchestratorState::Failed]
    );
    assert!(h.errors.shown().is_empty());
    assert_eq!(h.role_model(), ROLE_MODEL);
}

#[tokio::test]
async fn test_deploy_publishes_steps_to_hundred() {
    let h = Harness::new(HarnessOptions {
        cloud: RecordingCloud::with_steps(&[("Uploading", 40.0), ("Creating", 30.0)]),
        ..Default::default()
    });
    let (listener, mut rx) = channel_listener();
    h.bus.subscribe(listener);
    let (log, _handle) = ActivityLog::attach(h.bus.as_ref());

    let request = OperationRequest::new(h.layout(), Stage::Deploy(target()))
        .with_accounts(accounts(2));
    h.orchestrator(request).run().await.unwrap();

    let mut total = 0.0;
    let mut labels = Vec::new();
    while let Ok(step) = rx.try_recv() {
        assert_eq!(step.deployment_id(), "shop");
        total += step.completeness_delta();
        labels.push(step.label().to_string());
    }
    assert!((total - 100.0).abs() < 1e-9);
    assert_eq!(labels, vec!["Uploading", "Creating", "Deployed"]);

    let deployed = h.cloud.deployed.lock().unwrap();
    assert_eq!(deployed.len(), 1);
    assert_eq!(deployed[0].target, target());
    assert_eq!(deployed[0].package_dir, h.deploy_dir());
    assert!(!deployed[0].deployment_name.is_empty());

    let rows = log.rows();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].progress, 100.0);
}

#[tokio::test]
async fn test_running_step_publishes_site_link() {
    let h = Harness::new(HarnessOptions {
        cloud: RecordingCloud::with_steps(&[("Uploading", 50.0), (RUNNING_LABEL, 30.0)])
            .with_site_url("https://shop.example.net"),
        ..Default::default()
    });
    let (log, _handle) = ActivityLog::attach(h.bus.as_ref());

    h.orchestrator(OperationRequest::new(h.layout(), Stage::Deploy(target())))
        .run()
        .await
        .unwrap();

    let rows = log.rows();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].link.as_deref(), Some("https://shop.example.net"));
    assert_eq!(rows[0].progress, 100.0);
}

#[tokio::test]
async fn test_deploy_failure_reported_once() {
    let h = Harness::new(HarnessOptions {
        cloud: RecordingCloud::with_steps(&[("Uploading", 40.0)]).failing("quota exceeded"),
        ..Default::default()
    });
    let (listener, mut rx) = channel_listener();
    h.bus.subscribe(listener);
    let orchestrator = h.orchestrator(OperationRequest::new(h.layout(), Stage::Deploy(target())));

    let result = orchestrator.run().await;

    assert!(matches!(result, Err(PluginError::RemoteError(_))));
    assert_eq!(orchestrator.state().await, OrchestratorState::Failed);
    let shown = h.errors.shown();
    assert_eq!(shown.len(), 1);
    assert!(shown[0].contains("quota exceeded"));

    let mut last = None;
    while let Ok(step) = rx.try_recv() {
        last = Some(step);
    }
    assert!(last.unwrap().label().starts_with("Deployment failed"));
}

#[tokio::test]
async fn test_account_load_failure_stops_deploy() {
    let h = Harness::new(HarnessOptions {
        loader: Arc::new(ScriptedLoader::failing_at(1)),
        ..Default::default()
    });
    let request = OperationRequest::new(h.layout(), Stage::Deploy(target()))
        .with_accounts(accounts(1));
    let orchestrator = h.orchestrator(request);

    let result = orchestrator.run().await;

    assert!(matches!(result, Err(PluginError::RemoteError(_))));
    assert_eq!(
        orchestrator.history().await,
        vec![OrchestratorState::Validating, OrchestratorState::Failed]
    );
    assert!(h.cloud.deployed.lock().unwrap().is_empty());
    assert_eq!(h.errors.shown().len(), 1);
}

#[tokio::test]
async fn test_bootstrap_reads_settings_and_starts_file_logging() {
    let dir = tempfile::tempdir().unwrap();
    let log_dir = dir.path().join("logs");
    let settings_path = dir.path().join("settings.json");
    let settings = serde_json::json!({
        "log_level": "debug",
        "log_dir": log_dir,
        "build": { "target": "createPackage" },
        "portal_url": "https://portal.example.net"
    });
    std::fs::write(&settings_path, settings.to_string()).unwrap();

    let (state, guard) = PluginState::bootstrap(
        &File::new(&settings_path),
        HostServices {
            cloud: Arc::new(RecordingCloud::default()),
            account_loader: Arc::new(ScriptedLoader::default()),
            progress_host: Arc::new(MemoryProgressHost::new()),
            artifact_viewer: Arc::new(RecordingViewer::default()),
        },
        Overrides::default(),
    )
    .await
    .unwrap();

    assert!(guard.is_some());
    assert_eq!(state.settings.log_level, LogLevel::Debug);
    assert_eq!(state.settings.build.program, "ant");
    assert_eq!(state.settings.build.target, "createPackage");
    assert!(log_dir.is_dir());
}
