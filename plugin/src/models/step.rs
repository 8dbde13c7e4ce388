//! Deployment step events

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Key uniting every step of one logical deployment run
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Derive the id from the deployment identity and the run's start time,
    /// so repeated steps of the same run land on the same row.
    pub fn new(deployment_id: &str, started_at: DateTime<Utc>) -> Self {
        Self(format!("{}{}", deployment_id, started_at.timestamp_millis()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One progress step of a deployment, published on the event bus.
///
/// Immutable once built; listeners only ever see shared references.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentStep {
    correlation_id: CorrelationId,
    deployment_id: String,
    label: String,
    completeness_delta: f64,
    deployment_url: Option<String>,
    started_at: DateTime<Utc>,
    timestamp: DateTime<Utc>,
}

impl DeploymentStep {
    /// Create a step. `completeness_delta` is a percentage and is clamped to `0..=100`.
    pub fn new(
        deployment_id: impl Into<String>,
        started_at: DateTime<Utc>,
        label: impl Into<String>,
        completeness_delta: f64,
    ) -> Self {
        let deployment_id = deployment_id.into();
        let delta = if completeness_delta.is_nan() {
            0.0
        } else {
            completeness_delta.clamp(0.0, 100.0)
        };
        Self {
            correlation_id: CorrelationId::new(&deployment_id, started_at),
            deployment_id,
            label: label.into(),
            completeness_delta: delta,
            deployment_url: None,
            started_at,
            timestamp: Utc::now(),
        }
    }

    /// Attach the URL the deployment is reachable at
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.deployment_url = Some(url.into());
        self
    }

    pub fn correlation_id(&self) -> &CorrelationId {
        &self.correlation_id
    }

    pub fn deployment_id(&self) -> &str {
        &self.deployment_id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn completeness_delta(&self) -> f64 {
        self.completeness_delta
    }

    pub fn deployment_url(&self) -> Option<&str> {
        self.deployment_url.as_deref()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

impl fmt::Display for DeploymentStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:.0}%)", self.label, self.completeness_delta)
    }
}
