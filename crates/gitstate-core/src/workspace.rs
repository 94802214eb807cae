//! On-disk layout of a gitstate workspace

use std::path::{Path, PathBuf};

use gitstate_config::WorkspaceConfiguration;

use crate::Result;

/// Directory holding configuration, state and lock artifacts
pub const STATE_DIR: &str = ".gitstate";
pub const CONFIG_FILE: &str = "config.toml";
pub const STATE_FILE: &str = "state.json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspacePaths {
    root: PathBuf,
}

impl WorkspacePaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn state_dir(&self) -> PathBuf {
        self.root.join(STATE_DIR)
    }

    pub fn config_file(&self) -> PathBuf {
        self.state_dir().join(CONFIG_FILE)
    }

    pub fn state_file(&self) -> PathBuf {
        self.state_dir().join(STATE_FILE)
    }

    /// Load `config.toml`, falling back to defaults when it does not exist.
    pub fn load_configuration(&self) -> Result<WorkspaceConfiguration> {
        let path = self.config_file();
        match WorkspaceConfiguration::load(&path) {
            Ok(config) => Ok(config),
            Err(gitstate_config::Error::ConfigNotFound { .. }) => {
                tracing::info!(path = %path.display(), "No workspace configuration, using defaults");
                Ok(WorkspaceConfiguration::from_pairs(Vec::<(String, String)>::new()))
            }
            Err(e) => Err(e.into()),
        }
    }
}
