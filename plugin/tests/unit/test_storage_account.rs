//! Storage account creation tests

mod support;

use std::sync::Arc;

use tokio_test::{assert_err, assert_ok};

use roledeploy::accounts::storage_task::{creating_text, StorageAccountTask};
use roledeploy::app::state::{HostServices, Overrides, PluginState};
use roledeploy::errors::PluginError;
use roledeploy::events::bus::DeploymentEventBus;
use roledeploy::models::account::StorageAccountRequest;
use roledeploy::progress::{MemoryProgress, MemoryProgressHost};
use roledeploy::storage::settings::Settings;

use support::{RecordingCloud, RecordingErrors, RecordingViewer, ScriptedLoader};

fn request(subscription_id: &str, resource_group: Option<&str>) -> StorageAccountRequest {
    StorageAccountRequest {
        subscription_id: subscription_id.to_string(),
        name: "shopstore".to_string(),
        label: "Shop storage".to_string(),
        location: "West Europe".to_string(),
        resource_group: resource_group.map(str::to_string),
    }
}

#[tokio::test]
async fn test_creates_account() {
    let cloud = RecordingCloud::default();
    let progress = Arc::new(MemoryProgress::new());
    let task = StorageAccountTask::new(request("sub-0", Some("shop-rg")), progress.clone());

    assert_ok!(task.run(&cloud).await);

    let snapshot = progress.snapshot();
    assert_eq!(snapshot.text, "Creating storage account shopstore...");
    assert_eq!(snapshot.fraction, 1.0);
    assert!(!snapshot.cancelled);
    assert_eq!(
        *cloud.created.lock().unwrap(),
        vec![request("sub-0", Some("shop-rg"))]
    );
}

#[tokio::test]
async fn test_unknown_subscription_creates_nothing() {
    let cloud = RecordingCloud::default();
    let progress = Arc::new(MemoryProgress::new());
    let task = StorageAccountTask::new(request("sub-9", None), progress.clone());

    let err = assert_err!(task.run(&cloud).await);

    assert!(matches!(err, PluginError::ConfigError(_)));
    assert!(progress.snapshot().cancelled);
    assert_eq!(progress.snapshot().fraction, 0.0);
    assert!(cloud.created.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_unknown_resource_group_creates_nothing() {
    let cloud = RecordingCloud::default();
    let progress = Arc::new(MemoryProgress::new());
    let task = StorageAccountTask::new(request("sub-0", Some("blog-rg")), progress.clone());

    let err = assert_err!(task.run(&cloud).await);

    match err {
        PluginError::ConfigError(message) => assert!(message.contains("blog-rg")),
        other => panic!("unexpected error: {}", other),
    }
    assert!(cloud.created.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_remote_failure_cancels_progress() {
    let cloud = RecordingCloud::default().failing("name already taken");
    let progress = Arc::new(MemoryProgress::new());
    let task = StorageAccountTask::new(request("sub-0", None), progress.clone());

    let err = assert_err!(task.run(&cloud).await);

    assert!(matches!(err, PluginError::RemoteError(_)));
    let snapshot = progress.snapshot();
    assert!(snapshot.cancelled);
    assert_eq!(snapshot.fraction, 0.5);
}

#[tokio::test]
async fn test_only_first_error_is_kept() {
    let cloud = RecordingCloud::default();
    let progress = Arc::new(MemoryProgress::new());
    let task = StorageAccountTask::new(request("sub-0", None), progress.clone());

    assert!(task.on_rest_error(PluginError::RemoteError("first".to_string())));
    assert!(!task.on_rest_error(PluginError::RemoteError("second".to_string())));

    let err = assert_err!(task.run(&cloud).await);
    assert!(err.to_string().contains("first"));
    assert!(progress.snapshot().cancelled);
}

#[tokio::test]
async fn test_plugin_reports_creation_failure_once() {
    let progress = Arc::new(MemoryProgressHost::new());
    let errors = Arc::new(RecordingErrors::default());
    let state = PluginState::init(
        Settings::default(),
        HostServices {
            cloud: Arc::new(RecordingCloud::default().failing("quota exceeded")),
            account_loader: Arc::new(ScriptedLoader::default()),
            progress_host: progress.clone(),
            artifact_viewer: Arc::new(RecordingViewer::default()),
        },
        Overrides {
            bus: Some(Arc::new(DeploymentEventBus::new())),
            error_reporter: Some(errors.clone()),
            ..Default::default()
        },
    )
    .unwrap();

    let result = state.create_storage_account(request("sub-0", None)).await;

    assert!(matches!(result, Err(PluginError::RemoteError(_))));
    let shown = errors.shown();
    assert_eq!(shown.len(), 1);
    assert!(shown[0].contains("quota exceeded"));

    let started = progress.started();
    assert_eq!(started.len(), 1);
    assert_eq!(started[0].0, creating_text("shopstore"));
    let snapshot = started[0].1.snapshot();
    assert!(snapshot.cancelled);
    assert!(snapshot.finished);
}
