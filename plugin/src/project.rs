//! Role model persistence

use std::path::Path;

use async_trait::async_trait;
use tracing::debug;

use crate::errors::PluginError;
use crate::filesys::file::File;
use crate::models::project::Project;

/// Loads and saves the persisted role model of a module
#[async_trait]
pub trait ProjectStore: Send + Sync {
    async fn load(&self, path: &Path) -> Result<Project, PluginError>;

    async fn save(&self, path: &Path, project: &Project) -> Result<(), PluginError>;
}

/// Role model stored as pretty-printed JSON
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonProjectStore;

#[async_trait]
impl ProjectStore for JsonProjectStore {
    async fn load(&self, path: &Path) -> Result<Project, PluginError> {
        let file = File::new(path);
        if !file.exists().await {
            return Err(PluginError::ConfigError(format!(
                "Role model not found: {}",
                path.display()
            )));
        }
        file.read_json().await
    }

    async fn save(&self, path: &Path, project: &Project) -> Result<(), PluginError> {
        debug!("Saving role model to {}", path.display());
        File::new(path).write_json(project).await
    }
}
