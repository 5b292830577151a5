//! Deployment targets and the overwrite policy applied to them

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// What to do with an application package
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeploymentAction {
    /// Register the application type and create an application instance
    CreateAndRegister,
    /// Register the application type only
    RegisterOnly,
}

impl DeploymentAction {
    pub fn name(&self) -> &'static str {
        match self {
            Self::CreateAndRegister => "Create and register",
            Self::RegisterOnly => "Register only",
        }
    }
}

/// One application to deploy, fixed for the whole run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentTarget {
    pub name: String,
    /// Project directory holding the package output and publish profiles
    pub project_dir: PathBuf,
    /// Package location relative to `project_dir`; `{configuration}` is substituted
    pub package_path: String,
    pub action: DeploymentAction,
}

impl DeploymentTarget {
    pub fn new(
        name: impl Into<String>,
        project_dir: impl Into<PathBuf>,
        package_path: impl Into<String>,
        action: DeploymentAction,
    ) -> Self {
        Self {
            name: name.into(),
            project_dir: project_dir.into(),
            package_path: package_path.into(),
            action,
        }
    }

    /// Package directory for a build configuration (e.g. `Debug`)
    pub fn resolve_package_path(&self, configuration: &str) -> PathBuf {
        self.project_dir
            .join(self.package_path.replace("{configuration}", configuration))
    }
}

/// Conflict policy when an application of the same name already exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum OverwriteBehavior {
    Never,
    Always,
    #[default]
    SameTypeAndVersion,
}

impl fmt::Display for OverwriteBehavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Never => "Never",
            Self::Always => "Always",
            Self::SameTypeAndVersion => "SameTypeAndVersion",
        };
        f.write_str(name)
    }
}

/// Application type name and version, as declared by a package manifest
/// or reported by the cluster for a running application
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ApplicationIdentity {
    pub type_name: String,
    pub type_version: String,
}

impl ApplicationIdentity {
    pub fn new(type_name: impl Into<String>, type_version: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            type_version: type_version.into(),
        }
    }

    /// Conventional application name: `fabric:/Admin` for type `AdminType`
    pub fn default_application_name(&self) -> String {
        let base = self
            .type_name
            .strip_suffix("Type")
            .filter(|base| !base.is_empty())
            .unwrap_or(&self.type_name);
        format!("fabric:/{}", base)
    }
}

impl fmt::Display for ApplicationIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.type_name, self.type_version)
    }
}

/// Outcome of applying the overwrite policy to a create request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OverwriteDecision {
    /// Nothing in the way
    Create,
    /// Remove the existing application, then create
    ReplaceExisting,
    /// Leave the existing application alone and fail
    Reject(String),
}

impl OverwriteBehavior {
    /// Decide how to treat `existing` when deploying `incoming`
    pub fn decide(
        self,
        existing: Option<&ApplicationIdentity>,
        incoming: &ApplicationIdentity,
    ) -> OverwriteDecision {
        let Some(existing) = existing else {
            return OverwriteDecision::Create;
        };

        match self {
            Self::Never => OverwriteDecision::Reject(format!(
                "an application of type {} already exists and overwrite behavior is Never",
                existing
            )),
            Self::Always => OverwriteDecision::ReplaceExisting,
            Self::SameTypeAndVersion if existing == incoming => OverwriteDecision::ReplaceExisting,
            Self::SameTypeAndVersion => OverwriteDecision::Reject(format!(
                "existing application is {} but the package is {}; \
                 SameTypeAndVersion only replaces an identical type and version",
                existing, incoming
            )),
        }
    }

    /// Whether re-registering an identical, already registered type is allowed
    pub fn allows_reregistration(self) -> bool {
        !matches!(self, Self::Never)
    }
}
