//! Background undeployment

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::cloud::{CloudManagement, DeploymentSlot, StepEmitter};
use crate::events::bus::EventBus;
use crate::events::listener::{filtered, listener_fn};
use crate::progress::ProgressReporter;

/// Title of the undeploy progress scope
pub const UNDEPLOY_TITLE: &str = "Undeploying";

/// Deployment to remove
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UndeployRequest {
    pub service_name: String,
    pub deployment_name: String,
    pub slot: DeploymentSlot,
}

/// Removes a deployment and relays its progress steps to a reporter.
/// Not cancellable; failures are logged, never raised.
pub struct UndeploymentTask {
    bus: Arc<dyn EventBus>,
    cloud: Arc<dyn CloudManagement>,
    reporter: Arc<dyn ProgressReporter>,
}

impl UndeploymentTask {
    pub fn new(
        bus: Arc<dyn EventBus>,
        cloud: Arc<dyn CloudManagement>,
        reporter: Arc<dyn ProgressReporter>,
    ) -> Self {
        Self {
            bus,
            cloud,
            reporter,
        }
    }

    /// Run on its own tokio task
    pub fn spawn(self, request: UndeployRequest) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(request).await })
    }

    pub async fn run(self, request: UndeployRequest) {
        let purged = self.bus.remove_all_tracked();
        if purged > 0 {
            info!("Removed {} stale progress listeners", purged);
        }

        let emitter = StepEmitter::new(self.bus.clone(), request.deployment_name.clone());
        let reporter = self.reporter.clone();
        let relay = self.bus.subscribe_tracked(filtered(
            listener_fn(move |step| {
                let fraction = reporter.fraction() + step.completeness_delta() / 100.0;
                reporter.set_fraction(fraction.min(1.0));
                reporter.set_text(UNDEPLOY_TITLE);
                reporter.set_text2(step.label());
            }),
            emitter.correlation_id(),
        ));

        info!(
            "Undeploying {} from {} ({})",
            request.deployment_name, request.service_name, request.slot
        );
        match self
            .cloud
            .undeploy(
                &request.service_name,
                &request.deployment_name,
                request.slot,
                &emitter,
            )
            .await
        {
            Ok(()) => emitter.complete("Undeployed"),
            Err(e) => {
                error!(
                    "Undeploy of {} from {} failed: {}",
                    request.deployment_name, request.service_name, e
                );
                emitter.complete(&format!("Undeploy failed: {}", e));
            }
        }

        self.bus.unsubscribe(relay);
        self.reporter.finish();
    }
}
