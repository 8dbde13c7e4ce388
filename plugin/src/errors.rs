//! Error types for the deployment core

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for build, deploy and account operations
#[derive(Error, Debug)]
pub enum PluginError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Build file missing or corrupt, SDK not found, role misconfigured.
    /// Always surfaced to the user before any side effect.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// The build ran and reported errors
    #[error("Build failed with {0} errors")]
    BuildFailed(u32),

    /// REST or network failure during account load, deploy or undeploy
    #[error("Remote error: {0}")]
    RemoteError(String),

    /// The build succeeded but deferred settings could not be written back
    #[error("Build succeeded but applying settings failed (artifact at {}): {source}", artifact.display())]
    PartialApply {
        artifact: PathBuf,
        #[source]
        source: Box<PluginError>,
    },

    #[error("Listener delivery failed: {0}")]
    ListenerDelivery(String),

    #[error("Operation already in progress for {0}")]
    OperationInProgress(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl PluginError {
    /// Whether this error should reach the user through the error reporter.
    /// Cancellation is the user's own action and is only logged. Build
    /// errors are already listed in the build tool's output.
    pub fn is_user_facing(&self) -> bool {
        !matches!(
            self,
            PluginError::Cancelled | PluginError::ListenerDelivery(_) | PluginError::BuildFailed(_)
        )
    }
}

impl From<anyhow::Error> for PluginError {
    fn from(err: anyhow::Error) -> Self {
        PluginError::Internal(err.to_string())
    }
}
