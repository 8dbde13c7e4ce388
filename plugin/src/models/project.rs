//! Role model of a cloud project
//!
//! Only the fields the build and deploy path reads or rewrites are modelled.
//! The storage format belongs to the [`ProjectStore`](crate::project::ProjectStore).

use serde::{Deserialize, Serialize};

/// Value written in place of a concrete setting that is resolved at deploy time
pub const AUTO: &str = "auto";

/// Which environment a package is built for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageType {
    /// Local compute emulator
    Local,
    /// Cloud deployment
    Cloud,
}

/// Cloud project: package settings plus its roles
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub package_type: PackageType,

    /// Package output folder, relative to the module
    #[serde(default = "default_package_dir")]
    pub package_dir: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub portal_url: Option<String>,

    #[serde(default)]
    pub roles: Vec<Role>,
}

fn default_package_dir() -> String {
    "./deploy".to_string()
}

impl Project {
    pub fn new(package_type: PackageType) -> Self {
        Self {
            package_type,
            package_dir: default_package_dir(),
            portal_url: None,
            roles: Vec::new(),
        }
    }

    pub fn role(&self, name: &str) -> Option<&Role> {
        self.roles.iter().find(|r| r.name == name)
    }

    pub fn role_mut(&mut self, name: &str) -> Option<&mut Role> {
        self.roles.iter_mut().find(|r| r.name == name)
    }
}

/// A deployable unit of the project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Role {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jdk: Option<DeployableSource>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<ServerSource>,

    #[serde(default)]
    pub components: Vec<Component>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache: Option<CacheSettings>,
}

impl Role {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            jdk: None,
            server: None,
            components: Vec::new(),
            cache: None,
        }
    }

    /// True when the JDK is only available from the cloud, so the role
    /// cannot start in the local emulator
    pub fn lacks_local_jdk(&self) -> bool {
        self.jdk.as_ref().is_some_and(DeployableSource::is_cloud_only)
    }

    /// Same check for the application server
    pub fn lacks_local_server(&self) -> bool {
        self.server
            .as_ref()
            .is_some_and(|s| s.source.is_cloud_only())
    }
}

/// Where a JDK or server comes from: a local path, a cloud download, or both
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployableSource {
    #[serde(default)]
    pub source_path: Option<String>,

    #[serde(default)]
    pub cloud_url: Option<String>,
}

impl DeployableSource {
    fn is_cloud_only(&self) -> bool {
        let local_empty = self.source_path.as_deref().is_some_and(str::is_empty);
        let cloud_set = self.cloud_url.as_deref().is_some_and(|u| !u.is_empty());
        local_empty && cloud_set
    }
}

/// Application server bundled with a role
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerSource {
    pub name: String,

    #[serde(flatten)]
    pub source: DeployableSource,
}

/// Application component copied into the role's approot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Component {
    pub name: String,

    /// Download URL used in the cloud, or [`AUTO`]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloud_url: Option<String>,
}

/// Distributed cache backing storage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheSettings {
    pub storage_account_name: String,
    pub storage_account_key: String,
}
