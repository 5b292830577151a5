//! Resolved publish profile model

use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

use super::attribute::AttributeMap;

/// Rolling upgrade mode declared by `UpgradeDeployment/@Mode`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpgradeMode {
    Monitored,
    UnmonitoredAuto,
    UnmonitoredManual,
    /// A mode name the cluster may understand but we do not model
    Other(String),
}

impl UpgradeMode {
    pub fn parse(name: &str) -> Self {
        match name {
            "Monitored" => Self::Monitored,
            "UnmonitoredAuto" => Self::UnmonitoredAuto,
            "UnmonitoredManual" => Self::UnmonitoredManual,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Monitored => "Monitored",
            Self::UnmonitoredAuto => "UnmonitoredAuto",
            Self::UnmonitoredManual => "UnmonitoredManual",
            Self::Other(name) => name,
        }
    }
}

impl fmt::Display for UpgradeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for UpgradeMode {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// `UpgradeDeployment` section of a profile
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UpgradeDeployment {
    /// Attributes of the `UpgradeDeployment` element itself (`Enabled`, `Mode`, ...)
    pub attributes: AttributeMap,
    pub mode: Option<UpgradeMode>,
    /// Nested `Parameters`, including the flag synthesized from `mode`
    pub parameters: AttributeMap,
}

impl UpgradeDeployment {
    /// `Enabled="true"` turns an existing-application deployment into an upgrade
    pub fn is_enabled(&self) -> bool {
        self.attributes.get_bool("Enabled").unwrap_or(false)
    }
}

/// Publish profile resolved from a profile document
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PublishProfile {
    pub document_path: PathBuf,
    pub cluster_connection_parameters: AttributeMap,
    pub upgrade_deployment: Option<UpgradeDeployment>,
    /// Relative to the directory holding the profile document
    pub application_parameter_file_path: Option<String>,
}

impl PublishProfile {
    /// Directory used to resolve relative paths declared in the profile
    pub fn base_dir(&self) -> &Path {
        self.document_path.parent().unwrap_or_else(|| Path::new("."))
    }

    /// Absolute-or-joined application parameter file path, if declared
    pub fn resolved_parameter_file(&self) -> Option<PathBuf> {
        self.application_parameter_file_path
            .as_deref()
            .map(|relative| self.base_dir().join(relative))
    }

    /// Upgrade section when it is present and enabled
    pub fn enabled_upgrade(&self) -> Option<&UpgradeDeployment> {
        self.upgrade_deployment
            .as_ref()
            .filter(|upgrade| upgrade.is_enabled())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::attribute::AttributeValue;

    fn profile(parameter_file: Option<&str>) -> PublishProfile {
        PublishProfile {
            document_path: PathBuf::from("apps/AdminApp/PublishProfiles/Local.5Node.xml"),
            cluster_connection_parameters: AttributeMap::new(),
            upgrade_deployment: None,
            application_parameter_file_path: parameter_file.map(str::to_string),
        }
    }

    #[test]
    fn test_upgrade_mode_names() {
        assert_eq!(UpgradeMode::parse("Monitored"), UpgradeMode::Monitored);
        assert_eq!(
            UpgradeMode::parse("UnmonitoredAuto").as_str(),
            "UnmonitoredAuto"
        );
        assert_eq!(
            UpgradeMode::parse("Canary"),
            UpgradeMode::Other("Canary".to_string())
        );
    }

    #[test]
    fn test_parameter_file_resolves_against_profile_dir() {
        let profile = profile(Some("../ApplicationParameters/Local.5Node.xml"));
        assert_eq!(
            profile.resolved_parameter_file(),
            Some(PathBuf::from(
                "apps/AdminApp/PublishProfiles/../ApplicationParameters/Local.5Node.xml"
            ))
        );
        assert_eq!(self::profile(None).resolved_parameter_file(), None);
    }

    #[test]
    fn test_enabled_upgrade_requires_flag() {
        let mut profile = profile(None);
        profile.upgrade_deployment = Some(UpgradeDeployment::default());
        assert!(profile.enabled_upgrade().is_none());

        let mut attributes = AttributeMap::new();
        attributes.insert("Enabled", AttributeValue::Bool(true));
        profile.upgrade_deployment = Some(UpgradeDeployment {
            attributes,
            ..Default::default()
        });
        assert!(profile.enabled_upgrade().is_some());
    }
}
