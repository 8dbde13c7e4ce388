//! On-disk layout of a cloud project module

use std::path::PathBuf;

use crate::filesys::dir::Dir;
use crate::filesys::file::File;

/// Role model file name inside a module
pub const PROJECT_FILE_NAME: &str = "roles.json";

/// Build file name inside a module
pub const BUILD_FILE_NAME: &str = "package.xml";

/// Marker the build tool leaves in the deploy folder when packaging failed
pub const BUILD_FAILED_MARKER: &str = "BuildFailed.txt";

/// Paths of one cloud project module
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModuleLayout {
    /// Module root directory
    pub module_dir: PathBuf,
}

impl ModuleLayout {
    /// Create a new module layout
    pub fn new(module_dir: impl Into<PathBuf>) -> Self {
        Self {
            module_dir: module_dir.into(),
        }
    }

    /// Module name, taken from the directory name
    pub fn name(&self) -> String {
        self.module_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.module_dir.display().to_string())
    }

    /// The persisted role model
    pub fn project_file(&self) -> File {
        File::new(self.module_dir.join(PROJECT_FILE_NAME))
    }

    /// The external build file driven by the build pipeline
    pub fn build_file(&self) -> PathBuf {
        self.module_dir.join(BUILD_FILE_NAME)
    }

    /// Folder the package lands in; `package_dir` comes from the role model
    /// and is relative to the module. One leading `.` naming the module
    /// itself is dropped; `..` is kept as written.
    pub fn deploy_dir(&self, package_dir: &str) -> Dir {
        let relative = match package_dir.strip_prefix('.') {
            Some(rest) if rest.is_empty() || rest.starts_with(['/', '\\']) => rest,
            _ => package_dir,
        };
        let relative = relative.trim_start_matches(['/', '\\']);
        Dir::new(self.module_dir.join(relative))
    }
}
