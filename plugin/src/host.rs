//! Host environment collaborators
//!
//! The IDE supplies these; the core only needs the narrow surface below.

use std::path::{Path, PathBuf};

use tracing::error;

use crate::errors::PluginError;

/// Single "display error and log" entry point for user-facing failures
pub trait ErrorReporter: Send + Sync {
    fn display_error(&self, title: &str, message: &str, error: &PluginError);
}

/// Error reporter for contexts with no UI: logs only
#[derive(Debug, Default, Clone, Copy)]
pub struct LogErrorReporter;

impl ErrorReporter for LogErrorReporter {
    fn display_error(&self, title: &str, message: &str, err: &PluginError) {
        error!("{}: {}: {}", title, message, err);
    }
}

/// Finds the cloud SDK installed on this machine
pub trait SdkLocator: Send + Sync {
    fn sdk_location(&self) -> Option<PathBuf>;
}

/// SDK locator reading a directory from an environment variable
#[derive(Debug, Clone)]
pub struct EnvSdkLocator {
    pub variable: String,
}

impl Default for EnvSdkLocator {
    fn default() -> Self {
        Self {
            variable: "AZURE_SDK_HOME".to_string(),
        }
    }
}

impl SdkLocator for EnvSdkLocator {
    fn sdk_location(&self) -> Option<PathBuf> {
        std::env::var_os(&self.variable)
            .map(PathBuf::from)
            .filter(|p| p.is_dir())
    }
}

/// Runs jobs on the host UI thread, in submission order
pub trait UiDispatcher: Send + Sync {
    fn dispatch(&self, job: Box<dyn FnOnce() + Send>);
}

/// Shows a finished package to the user (file manager, project view)
pub trait ArtifactViewer: Send + Sync {
    fn reveal(&self, artifact: &Path) -> Result<(), PluginError>;
}
