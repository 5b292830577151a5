//! # Deployment Configuration
//!
//! Loaded from `deploy.yaml` at the repository root. Every field has a
//! default, and a missing file means "all defaults".
//!
//! ## Example
//!
//! ```yaml
//! profiles_dir: PublishProfiles
//! cluster:
//!   endpoint: http://localhost:19080
//!   request_timeout: 5m
//! targets:
//!   - name: AdminApp
//!     project_dir: src/AdminApp
//!     action: CreateAndRegister
//!   - name: IngestionApp
//!     project_dir: src/IngestionApp
//!   - name: TenantApp
//!     project_dir: src/TenantApp
//! ```

mod cluster;
mod target;

pub use cluster::ClusterConfig;
pub use target::{default_targets, validate_targets, TargetConfig};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::domain::DeploymentTarget;
use crate::error::ConfigError;

/// Complete deployment configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployConfig {
    /// Directory, relative to the first target's project, holding publish profiles
    #[serde(default = "default_profiles_dir")]
    pub profiles_dir: String,

    /// Cluster gateway configuration
    #[serde(default)]
    pub cluster: ClusterConfig,

    /// Applications in deployment order; the first one is created
    #[serde(default = "default_targets")]
    pub targets: Vec<TargetConfig>,
}

fn default_profiles_dir() -> String {
    "PublishProfiles".to_string()
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            profiles_dir: default_profiles_dir(),
            cluster: ClusterConfig::default(),
            targets: default_targets(),
        }
    }
}

impl DeployConfig {
    /// Load configuration from `path`, falling back to defaults when absent
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

        validate_targets(&config.targets)
            .with_context(|| format!("Invalid targets in {}", path.display()))?;
        Ok(config)
    }

    /// Ordered deployment targets rooted at `repo_root`
    pub fn targets(&self, repo_root: &Path) -> Vec<DeploymentTarget> {
        self.targets
            .iter()
            .map(|target| target.to_target(repo_root))
            .collect()
    }

    /// Location of a named publish profile
    ///
    /// Profiles live with the first (creating) application. A `.xml`
    /// suffix is appended when the name does not already carry one.
    pub fn profile_path(&self, repo_root: &Path, profile: &str) -> Result<PathBuf> {
        let first = self.targets.first().ok_or(ConfigError::NoTargets)?;
        Ok(repo_root
            .join(&first.project_dir)
            .join(&self.profiles_dir)
            .join(profile_file_name(profile)))
    }
}

/// `Local.5Node` → `Local.5Node.xml`
pub fn profile_file_name(profile: &str) -> String {
    if profile.to_ascii_lowercase().ends_with(".xml") {
        profile.to_string()
    } else {
        format!("{}.xml", profile)
    }
}
