//! Settings file management

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::errors::PluginError;
use crate::filesys::file::File;
use crate::logs::{LogLevel, LogOptions};

/// Plugin settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Emit JSON log lines on stdout
    #[serde(default)]
    pub json_logs: bool,

    /// Directory for rolling log files
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// External build tool configuration
    #[serde(default)]
    pub build: BuildSettings,

    /// Management portal URL written into cloud packages.
    /// When absent the role model keeps its own value.
    #[serde(default)]
    pub portal_url: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            json_logs: false,
            log_dir: None,
            build: BuildSettings::default(),
            portal_url: None,
        }
    }
}

impl Settings {
    /// Read settings from a JSON file, falling back to defaults when it does not exist
    pub async fn load(file: &File) -> Result<Self, PluginError> {
        if !file.exists().await {
            return Ok(Self::default());
        }
        let settings: Settings = file.read_json().await?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject values the deploy path would trip over later
    pub fn validate(&self) -> Result<(), PluginError> {
        if self.build.program.trim().is_empty() {
            return Err(PluginError::ConfigError(
                "build.program must not be empty".to_string(),
            ));
        }
        if let Some(portal_url) = &self.portal_url {
            url::Url::parse(portal_url).map_err(|e| {
                PluginError::ConfigError(format!("Invalid portal URL '{}': {}", portal_url, e))
            })?;
        }
        Ok(())
    }

    pub fn log_options(&self) -> LogOptions {
        LogOptions {
            log_level: self.log_level.clone(),
            json_format: self.json_logs,
            log_dir: self.log_dir.clone(),
            ..Default::default()
        }
    }
}

/// Build tool settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildSettings {
    /// Build tool executable
    #[serde(default = "default_build_program")]
    pub program: String,

    /// Target to run; empty runs the build file's default target
    #[serde(default)]
    pub target: String,
}

fn default_build_program() -> String {
    "ant".to_string()
}

impl Default for BuildSettings {
    fn default() -> Self {
        Self {
            program: default_build_program(),
            target: String::new(),
        }
    }
}
