//! Configuration: remote endpoints, ownership marker, local data paths.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use letterdesk_common::{Error, Result};

use crate::gdrive::{ApiConfig, DEFAULT_MARKER_KEY};

/// Settings for the Drive gateway and its HTTP client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(flatten)]
    pub api: ApiConfig,
    /// `appProperties` key marking documents created by this application.
    pub marker_key: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            marker_key: DEFAULT_MARKER_KEY.to_string(),
        }
    }
}

impl GatewayConfig {
    /// Defaults with environment overrides applied.
    pub fn from_env() -> Self {
        Self {
            api: ApiConfig::from_env(),
            ..Self::default()
        }
    }
}

/// Where local state lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPaths {
    root: PathBuf,
}

impl DataPaths {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// `LETTERDESK_HOME`, or `letterdesk` under the user config directory.
    pub fn from_env() -> Result<Self> {
        if let Some(home) = std::env::var_os("LETTERDESK_HOME") {
            return Ok(Self::new(PathBuf::from(home)));
        }

        dirs::config_dir()
            .map(|dir| Self::new(dir.join("letterdesk")))
            .ok_or_else(|| {
                Error::Config(
                    "Cannot determine the config directory; set LETTERDESK_HOME".to_string(),
                )
            })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn session_file(&self) -> PathBuf {
        self.root.join("session.json")
    }

    pub fn drafts_file(&self) -> PathBuf {
        self.root.join("drafts.json")
    }
}
