//! Build stages and their preconditions

use crate::cloud::DeployTarget;
use crate::errors::PluginError;
use crate::models::project::{PackageType, Project};

/// What happens after the build: which package is built and where it goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stage {
    /// Build a cloud package and show it
    Package,
    /// Build a local package and start it in the emulator
    RunInEmulator,
    /// Build a cloud package and deploy it
    Deploy(DeployTarget),
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Package => "package",
            Stage::RunInEmulator => "run-in-emulator",
            Stage::Deploy(_) => "deploy",
        }
    }

    /// Title of the progress scope and of error dialogs
    pub fn title(&self) -> &'static str {
        match self {
            Stage::Package => "Building Cloud Package",
            Stage::RunInEmulator => "Running in Emulator",
            Stage::Deploy(_) => "Deploying to Cloud",
        }
    }

    /// Package type the build must produce
    pub fn package_type(&self) -> PackageType {
        match self {
            Stage::RunInEmulator => PackageType::Local,
            Stage::Package | Stage::Deploy(_) => PackageType::Cloud,
        }
    }

    /// Whether the cloud SDK must be installed. The emulator only exists on
    /// Windows, so elsewhere an emulator run does not need it.
    pub fn requires_sdk(&self, is_windows: bool) -> bool {
        match self {
            Stage::RunInEmulator => is_windows,
            Stage::Package | Stage::Deploy(_) => true,
        }
    }

    /// Role checks specific to this stage. An emulator run needs every JDK
    /// and server available locally.
    pub fn validate_roles(&self, project: &Project) -> Result<(), PluginError> {
        if *self != Stage::RunInEmulator {
            return Ok(());
        }
        if let Some(role) = project.roles.iter().find(|r| r.lacks_local_jdk()) {
            return Err(PluginError::ConfigError(format!(
                "Role {} uses a cloud JDK but has no local JDK configured",
                role.name
            )));
        }
        if let Some(role) = project.roles.iter().find(|r| r.lacks_local_server()) {
            return Err(PluginError::ConfigError(format!(
                "Role {} uses a cloud server but has no local server configured",
                role.name
            )));
        }
        Ok(())
    }
}
