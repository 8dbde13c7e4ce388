//! Storage account creation

use std::sync::{Arc, Mutex};

use tracing::{debug, error, info, warn};

use crate::cloud::CloudManagement;
use crate::errors::PluginError;
use crate::models::account::StorageAccountRequest;
use crate::progress::ProgressReporter;

// Fraction reached once the subscription checks pass
const CHECKED: f64 = 0.5;

/// Progress text shown while `name` is created
pub fn creating_text(name: &str) -> String {
    format!("Creating storage account {}...", name)
}

/// Creates one storage account, keeping the first failure as its terminal
/// error.
pub struct StorageAccountTask {
    request: StorageAccountRequest,
    reporter: Arc<dyn ProgressReporter>,
    terminal_error: Mutex<Option<PluginError>>,
}

impl StorageAccountTask {
    pub fn new(request: StorageAccountRequest, reporter: Arc<dyn ProgressReporter>) -> Self {
        Self {
            request,
            reporter,
            terminal_error: Mutex::new(None),
        }
    }

    /// Record a failure. Only the first one is kept; returns whether this
    /// one was.
    pub fn on_rest_error(&self, error: PluginError) -> bool {
        let mut terminal = self.terminal_error.lock().unwrap_or_else(|e| e.into_inner());
        if terminal.is_some() {
            debug!("Ignoring further storage account error: {}", error);
            return false;
        }
        warn!("Creating storage account {} failed: {}", self.request.name, error);
        *terminal = Some(error);
        true
    }

    /// Run the creation. On a terminal error the progress scope is cancelled
    /// and the error returned.
    pub async fn run(&self, cloud: &dyn CloudManagement) -> Result<(), PluginError> {
        info!("Creating storage account {}", self.request.name);
        self.reporter.set_text(&creating_text(&self.request.name));

        if let Err(e) = self.create(cloud).await {
            self.on_rest_error(e);
        }

        let pending = self
            .terminal_error
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(e) = pending {
            error!("Storage account {} not created: {}", self.request.name, e);
            self.reporter.cancel();
            return Err(e);
        }

        self.reporter.set_fraction(1.0);
        Ok(())
    }

    async fn create(&self, cloud: &dyn CloudManagement) -> Result<(), PluginError> {
        let subscription_id = &self.request.subscription_id;
        let subscriptions = cloud.subscriptions().await?;
        if !subscriptions.iter().any(|s| &s.id == subscription_id) {
            return Err(PluginError::ConfigError(format!(
                "Subscription {} is not available",
                subscription_id
            )));
        }

        if let Some(group) = &self.request.resource_group {
            let groups = cloud.resource_groups(subscription_id).await?;
            if !groups.contains(group) {
                return Err(PluginError::ConfigError(format!(
                    "Resource group {} not found in subscription {}",
                    group, subscription_id
                )));
            }
        }
        self.reporter.set_fraction(CHECKED);

        cloud.create_storage_account(&self.request).await
    }
}
