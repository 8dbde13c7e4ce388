//! Deferred "auto" settings

use std::collections::BTreeSet;

use tracing::{debug, warn};

use crate::models::project::{CacheSettings, Project, AUTO};

/// Settings to switch back to [`AUTO`] once a build has succeeded.
///
/// While editing, the user may have pointed component URLs or a role's cache
/// storage account at concrete values. Those must not end up in the package,
/// so they are only rewritten after the build, exactly once.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RoleSettingsPatch {
    component_urls: BTreeSet<(String, String)>,
    cache_roles: BTreeSet<String>,
}

impl RoleSettingsPatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset the cloud URL of `component` in `role` to auto
    pub fn auto_component_url(&mut self, role: impl Into<String>, component: impl Into<String>) {
        self.component_urls.insert((role.into(), component.into()));
    }

    /// Reset the cache storage account of `role` to auto
    pub fn auto_cache(&mut self, role: impl Into<String>) {
        self.cache_roles.insert(role.into());
    }

    pub fn is_empty(&self) -> bool {
        self.component_urls.is_empty() && self.cache_roles.is_empty()
    }

    /// Move the pending changes out, leaving this patch empty
    pub fn take(&mut self) -> RoleSettingsPatch {
        std::mem::take(self)
    }

    /// Write the substitutions into `project`. Returns how many settings changed.
    pub fn apply(&self, project: &mut Project) -> usize {
        let mut changed = 0;

        for (role_name, component_name) in &self.component_urls {
            let Some(role) = project.role_mut(role_name) else {
                warn!("Role {} no longer exists, skipping component URL", role_name);
                continue;
            };
            match role.components.iter_mut().find(|c| &c.name == component_name) {
                Some(component) => {
                    component.cloud_url = Some(AUTO.to_string());
                    changed += 1;
                }
                None => warn!(
                    "Component {} no longer exists in role {}",
                    component_name, role_name
                ),
            }
        }

        for role_name in &self.cache_roles {
            let Some(role) = project.role_mut(role_name) else {
                warn!("Role {} no longer exists, skipping cache settings", role_name);
                continue;
            };
            role.cache = Some(CacheSettings {
                storage_account_name: AUTO.to_string(),
                storage_account_key: AUTO.to_string(),
            });
            changed += 1;
        }

        debug!(changed, "Applied deferred role settings");
        changed
    }
}
