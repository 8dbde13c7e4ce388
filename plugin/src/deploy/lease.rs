//! One active operation per module

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::errors::PluginError;

/// Modules with an operation currently running. Two operations on one
/// module would fight over the same role model file and approot.
#[derive(Debug, Default)]
pub struct ActiveOperations {
    active: Mutex<HashSet<PathBuf>>,
}

impl ActiveOperations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `module_dir`, failing if another operation holds it
    pub fn try_acquire(self: &Arc<Self>, module_dir: &Path) -> Result<OperationLease, PluginError> {
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        if !active.insert(module_dir.to_path_buf()) {
            return Err(PluginError::OperationInProgress(
                module_dir.display().to_string(),
            ));
        }
        debug!("Acquired operation lease for {}", module_dir.display());
        Ok(OperationLease {
            registry: self.clone(),
            module_dir: module_dir.to_path_buf(),
        })
    }

    pub fn is_active(&self, module_dir: &Path) -> bool {
        let active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        active.contains(module_dir)
    }
}

/// Held for the lifetime of an operation; releases the module on drop
#[derive(Debug)]
pub struct OperationLease {
    registry: Arc<ActiveOperations>,
    module_dir: PathBuf,
}

impl Drop for OperationLease {
    fn drop(&mut self) {
        let mut active = self.registry.active.lock().unwrap_or_else(|e| e.into_inner());
        active.remove(&self.module_dir);
        debug!("Released operation lease for {}", self.module_dir.display());
    }
}
