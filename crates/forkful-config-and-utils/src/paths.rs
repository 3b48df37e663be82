//! File system paths for forkful.

use crate::{CoreError, CoreResult};
use std::path::PathBuf;

/// Directory name under the platform config dir.
const APP_DIR_NAME: &str = "forkful";

/// Manages file system paths for the CLI.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Base directory (e.g. ~/.config/forkful)
    base_dir: PathBuf,
}

impl Paths {
    /// Create a new Paths instance rooted at the platform config directory.
    pub fn new() -> CoreResult<Self> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| CoreError::Path("Could not determine config directory".to_string()))?;

        Ok(Self {
            base_dir: config_dir.join(APP_DIR_NAME),
        })
    }

    /// Create a new Paths instance with a custom base directory.
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Get the config file path (<base>/config.json).
    pub fn config_file(&self) -> PathBuf {
        self.base_dir.join("config.json")
    }

    /// Get the logs directory (<base>/logs).
    pub fn logs_dir(&self) -> PathBuf {
        self.base_dir.join("logs")
    }

    /// Working directory for collaborator scripts (<base>/collaborators).
    pub fn collaborators_dir(&self) -> PathBuf {
        self.base_dir.join("collaborators")
    }

    /// Ensure all required directories exist.
    pub fn ensure_dirs(&self) -> CoreResult<()> {
        std::fs::create_dir_all(&self.base_dir)?;
        std::fs::create_dir_all(self.logs_dir())?;
        std::fs::create_dir_all(self.collaborators_dir())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_paths_layout() {
        let paths = Paths::with_base_dir(PathBuf::from("/tmp/forkful-test"));
        assert_eq!(
            paths.config_file(),
            PathBuf::from("/tmp/forkful-test/config.json")
        );
        assert_eq!(paths.logs_dir(), PathBuf::from("/tmp/forkful-test/logs"));
        assert_eq!(
            paths.collaborators_dir(),
            PathBuf::from("/tmp/forkful-test/collaborators")
        );
    }

    #[test]
    fn test_ensure_dirs_creates_tree() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().join("nested"));
        paths.ensure_dirs().unwrap();
        assert!(paths.logs_dir().is_dir());
        assert!(paths.collaborators_dir().is_dir());
    }
}
