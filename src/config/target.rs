//! Deployment target list configuration.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use crate::domain::{DeploymentAction, DeploymentTarget};

/// One application entry in `deploy.yaml`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Application name (e.g., "AdminApp")
    pub name: String,

    /// Project directory relative to the repository root
    pub project_dir: String,

    /// Package output relative to the project directory
    /// Supports placeholder: {configuration}
    #[serde(default = "default_package_path")]
    pub package_path: String,

    /// CreateAndRegister or RegisterOnly
    #[serde(default = "default_action")]
    pub action: DeploymentAction,
}

fn default_package_path() -> String {
    "pkg/{configuration}".to_string()
}

fn default_action() -> DeploymentAction {
    DeploymentAction::RegisterOnly
}

impl TargetConfig {
    fn new(name: &str, action: DeploymentAction) -> Self {
        Self {
            name: name.to_string(),
            project_dir: format!("src/{}", name),
            package_path: default_package_path(),
            action,
        }
    }

    pub fn to_target(&self, repo_root: &Path) -> DeploymentTarget {
        DeploymentTarget::new(
            self.name.clone(),
            repo_root.join(&self.project_dir),
            self.package_path.clone(),
            self.action,
        )
    }
}

/// Admin application first, then ingestion, then tenant
pub fn default_targets() -> Vec<TargetConfig> {
    vec![
        TargetConfig::new("AdminApp", DeploymentAction::CreateAndRegister),
        TargetConfig::new("IngestionApp", DeploymentAction::RegisterOnly),
        TargetConfig::new("TenantApp", DeploymentAction::RegisterOnly),
    ]
}

/// Validate the ordered target list
pub fn validate_targets(targets: &[TargetConfig]) -> Result<()> {
    let Some(first) = targets.first() else {
        bail!("deploy.yaml declares no targets");
    };

    let mut seen = HashSet::new();
    for (index, target) in targets.iter().enumerate() {
        if target.name.trim().is_empty() {
            bail!("Target name cannot be empty (target index {})", index);
        }
        if target.package_path.trim().is_empty() {
            bail!(
                "package_path cannot be empty for target '{}' (index {})",
                target.name,
                index
            );
        }
        if !seen.insert(target.name.as_str()) {
            bail!("Duplicate target name '{}'", target.name);
        }
    }

    if first.action != DeploymentAction::CreateAndRegister {
        tracing::warn!(
            "First target '{}' is {}; only the first target receives application parameters",
            first.name,
            first.action.name()
        );
    }

    Ok(())
}
