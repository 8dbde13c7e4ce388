//! Activity log model
//!
//! Consumer of the event bus that folds deployment steps into one row per
//! deployment run. Rendering is the host's business; this only keeps the rows.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

use crate::errors::PluginError;
use crate::events::bus::{DeploymentStepListener, EventBus, ListenerHandle};
use crate::models::step::{CorrelationId, DeploymentStep};

/// Label a deployment publishes once the service answers
pub const RUNNING_LABEL: &str = "Running";

/// Row description shown once the deployment is reachable
pub const RUNNING_VISIBLE: &str = "Running - published";

/// One deployment run in the activity log
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityRow {
    pub correlation_id: CorrelationId,
    pub deployment_id: String,
    pub description: String,
    pub started_at: DateTime<Utc>,
    /// Accumulated progress, `0..=100`
    pub progress: f64,
    pub link: Option<String>,
}

#[derive(Default)]
struct Rows {
    order: Vec<CorrelationId>,
    by_id: HashMap<CorrelationId, ActivityRow>,
}

/// Table model fed by deployment steps
#[derive(Default)]
pub struct ActivityLog {
    rows: Mutex<Rows>,
}

impl ActivityLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a log and subscribe it to `bus`
    pub fn attach(bus: &dyn EventBus) -> (Arc<ActivityLog>, ListenerHandle) {
        let log = Arc::new(ActivityLog::new());
        let handle = bus.subscribe(log.clone());
        (log, handle)
    }

    /// Rows in the order their runs were first seen
    pub fn rows(&self) -> Vec<ActivityRow> {
        let rows = self.rows.lock().unwrap_or_else(|e| e.into_inner());
        rows.order
            .iter()
            .filter_map(|id| rows.by_id.get(id).cloned())
            .collect()
    }

    fn record(&self, step: &DeploymentStep) {
        let mut rows = self.rows.lock().unwrap_or_else(|e| e.into_inner());
        let id = step.correlation_id().clone();

        if let Some(row) = rows.by_id.get_mut(&id) {
            row.progress = (row.progress + step.completeness_delta()).min(100.0);
            if step.label().eq_ignore_ascii_case(RUNNING_LABEL) {
                row.description = RUNNING_VISIBLE.to_string();
                row.link = step.deployment_url().map(str::to_string);
            } else {
                row.description = step.label().to_string();
            }
            return;
        }

        let row = ActivityRow {
            correlation_id: id.clone(),
            deployment_id: step.deployment_id().to_string(),
            description: step.label().to_string(),
            started_at: step.started_at(),
            progress: step.completeness_delta(),
            link: step.deployment_url().map(str::to_string),
        };
        rows.order.push(id.clone());
        rows.by_id.insert(id, row);
    }
}

impl DeploymentStepListener for ActivityLog {
    fn on_deployment_step(&self, step: &DeploymentStep) -> Result<(), PluginError> {
        self.record(step);
        Ok(())
    }
}
