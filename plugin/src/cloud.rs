//! Cloud management collaborator and step emission

use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::PluginError;
use crate::events::bus::EventBus;
use crate::models::account::{StorageAccountRequest, Subscription};
use crate::models::step::{CorrelationId, DeploymentStep};

/// Retry budget the management client applies beneath [`CloudManagement`].
/// Nothing above that interface retries again.
pub const MAX_RETRY_COUNT: u32 = 7;

/// Deployment slot of a hosted service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentSlot {
    Production,
    Staging,
}

impl fmt::Display for DeploymentSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeploymentSlot::Production => f.write_str("Production"),
            DeploymentSlot::Staging => f.write_str("Staging"),
        }
    }
}

/// Where a cloud deployment goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployTarget {
    pub subscription_id: String,
    pub service_name: String,
    pub slot: DeploymentSlot,
    /// Replace an existing deployment in the slot
    pub overwrite: bool,
}

/// A cloud deployment of a built package
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployRequest {
    pub target: DeployTarget,
    /// Name of the new deployment within the slot
    pub deployment_name: String,
    /// Folder holding the package produced by the build
    pub package_dir: PathBuf,
}

/// Cloud management client. Treated as a black-box RPC surface.
#[async_trait]
pub trait CloudManagement: Send + Sync {
    async fn create_storage_account(
        &self,
        request: &StorageAccountRequest,
    ) -> Result<(), PluginError>;

    async fn subscriptions(&self) -> Result<Vec<Subscription>, PluginError>;

    async fn resource_groups(&self, subscription_id: &str) -> Result<Vec<String>, PluginError>;

    /// Upload and start a package, reporting progress through `emitter`
    async fn deploy(&self, request: &DeployRequest, emitter: &StepEmitter)
        -> Result<(), PluginError>;

    /// Start the built package in the local emulator
    async fn deploy_to_emulator(&self, package_dir: &std::path::Path) -> Result<(), PluginError>;

    /// Remove a deployment from a slot, reporting progress through `emitter`
    async fn undeploy(
        &self,
        service_name: &str,
        deployment_name: &str,
        slot: DeploymentSlot,
        emitter: &StepEmitter,
    ) -> Result<(), PluginError>;
}

/// Publishes the steps of one deployment run on the bus.
///
/// Keeps the running total so the deltas of a run never exceed 100 and
/// [`StepEmitter::complete`] brings them to exactly 100.
pub struct StepEmitter {
    bus: Arc<dyn EventBus>,
    deployment_id: String,
    started_at: DateTime<Utc>,
    emitted: Mutex<f64>,
}

impl StepEmitter {
    pub fn new(bus: Arc<dyn EventBus>, deployment_id: impl Into<String>) -> Self {
        Self {
            bus,
            deployment_id: deployment_id.into(),
            started_at: Utc::now(),
            emitted: Mutex::new(0.0),
        }
    }

    pub fn correlation_id(&self) -> CorrelationId {
        CorrelationId::new(&self.deployment_id, self.started_at)
    }

    /// Sum of the deltas published so far
    pub fn emitted(&self) -> f64 {
        *self.emitted.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn emit(&self, label: &str, delta: f64) {
        self.publish(label, delta, None);
    }

    pub fn emit_with_url(&self, label: &str, delta: f64, url: &str) {
        self.publish(label, delta, Some(url));
    }

    /// Publish the final step, carrying whatever is left up to 100
    pub fn complete(&self, label: &str) {
        self.publish(label, 100.0, None);
    }

    fn publish(&self, label: &str, delta: f64, url: Option<&str>) {
        let step = {
            let mut emitted = self.emitted.lock().unwrap_or_else(|e| e.into_inner());
            let delta = delta.max(0.0).min(100.0 - *emitted);
            *emitted += delta;
            let step = DeploymentStep::new(&self.deployment_id, self.started_at, label, delta);
            match url {
                Some(url) => step.with_url(url),
                None => step,
            }
        };
        self.bus.publish(step);
    }
}
