//! Deployment planning
//!
//! Turns a resolved profile and the ordered target list into the
//! operations the executor runs. Pure: no I/O, output order equals
//! target order.

use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

use super::attribute::AttributeMap;
use super::profile::{PublishProfile, UpgradeDeployment, UpgradeMode};
use super::target::{DeploymentAction, DeploymentTarget, OverwriteBehavior};
use crate::error::{ConfigError, DeployError, ProfileError};

/// Run-wide inputs to planning
#[derive(Debug, Clone)]
pub struct PlanRequest {
    /// Build configuration name, e.g. `Debug`
    pub configuration: String,
    pub overwrite_behavior: OverwriteBehavior,
    pub skip_validation: bool,
    /// Caller-supplied application parameters for the creating target
    pub parameter_overrides: BTreeMap<String, String>,
}

impl PlanRequest {
    pub fn new(configuration: impl Into<String>) -> Self {
        Self {
            configuration: configuration.into(),
            overwrite_behavior: OverwriteBehavior::default(),
            skip_validation: false,
            parameter_overrides: BTreeMap::new(),
        }
    }
}

/// Rolling upgrade settings derived from an enabled `UpgradeDeployment`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpgradeSettings {
    pub mode: UpgradeMode,
    pub force_restart: bool,
    pub failure_action: Option<String>,
    pub replica_set_check_timeout_secs: Option<u64>,
    /// Everything declared under `UpgradeDeployment/Parameters`
    pub parameters: AttributeMap,
}

impl UpgradeSettings {
    fn from_profile(
        upgrade: &UpgradeDeployment,
        profile: &PublishProfile,
    ) -> Result<Self, ProfileError> {
        let parameters = &upgrade.parameters;
        let timeout = parameters.get("UpgradeReplicaSetCheckTimeoutSec");
        let replica_set_check_timeout_secs = match timeout {
            None => None,
            Some(value) => Some(value.to_string().parse::<u64>().map_err(|_| {
                ProfileError::malformed(
                    profile.document_path.display().to_string(),
                    format!("UpgradeReplicaSetCheckTimeoutSec is not a number: {}", value),
                )
            })?),
        };

        Ok(Self {
            mode: upgrade.mode.clone().unwrap_or(UpgradeMode::UnmonitoredAuto),
            force_restart: parameters.get_bool("ForceRestart").unwrap_or(false),
            failure_action: parameters.get_str("FailureAction").map(str::to_string),
            replica_set_check_timeout_secs,
            parameters: parameters.clone(),
        })
    }
}

/// One resolved unit of work
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeploymentOperation {
    pub target: String,
    pub package_path: PathBuf,
    /// `None` means an empty parameter set
    pub parameter_file: Option<PathBuf>,
    pub parameter_overrides: BTreeMap<String, String>,
    pub action: DeploymentAction,
    pub overwrite_behavior: OverwriteBehavior,
    pub skip_validation: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upgrade: Option<UpgradeSettings>,
}

/// Build the ordered operation list for a run
///
/// The first target alone receives the caller's overrides. When it is
/// created rather than only registered, it also receives the profile's
/// parameter file and any upgrade settings. Later targets are registered
/// with an empty parameter set.
pub fn build_plan(
    profile: &PublishProfile,
    targets: &[DeploymentTarget],
    request: &PlanRequest,
) -> Result<Vec<DeploymentOperation>, DeployError> {
    if targets.is_empty() {
        return Err(ConfigError::NoTargets.into());
    }

    let mut plan = Vec::with_capacity(targets.len());
    for (index, target) in targets.iter().enumerate() {
        let primary = index == 0;
        let creating = primary && target.action == DeploymentAction::CreateAndRegister;

        let parameter_file = if creating {
            let path = profile.resolved_parameter_file().ok_or_else(|| {
                ProfileError::MissingParameterFilePath {
                    path: profile.document_path.display().to_string(),
                    application: target.name.clone(),
                }
            })?;
            Some(path)
        } else {
            None
        };

        let upgrade = match profile.enabled_upgrade() {
            Some(upgrade) if creating => Some(UpgradeSettings::from_profile(upgrade, profile)?),
            _ => None,
        };

        plan.push(DeploymentOperation {
            target: target.name.clone(),
            package_path: target.resolve_package_path(&request.configuration),
            parameter_file,
            parameter_overrides: if primary {
                request.parameter_overrides.clone()
            } else {
                BTreeMap::new()
            },
            action: target.action,
            overwrite_behavior: request.overwrite_behavior,
            skip_validation: request.skip_validation,
            upgrade,
        });
    }

    Ok(plan)
}
