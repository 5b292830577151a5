//! Application package inspection
//!
//! Reads the identity an application package declares and checks the
//! package layout before anything is sent to the cluster.

use std::path::Path;
use tracing::debug;

use super::xml::{load_document, XmlElement};
use crate::domain::{ApplicationIdentity, ApplicationParameters};
use crate::error::{ClusterError, DeployError, ProfileError};

pub const APPLICATION_MANIFEST: &str = "ApplicationManifest.xml";
pub const SERVICE_MANIFEST: &str = "ServiceManifest.xml";

fn unreadable(path: &Path) -> ProfileError {
    ProfileError::malformed(path.display().to_string(), "file not found or unreadable")
}

fn load_manifest(package_path: &Path) -> Result<XmlElement, ProfileError> {
    let manifest_path = package_path.join(APPLICATION_MANIFEST);
    let root = load_document(&manifest_path, || unreadable(&manifest_path))?;
    if root.name != "ApplicationManifest" {
        return Err(ProfileError::malformed(
            manifest_path.display().to_string(),
            format!("expected root element ApplicationManifest, found {}", root.name),
        ));
    }
    Ok(root)
}

fn identity_of(
    root: &XmlElement,
    package_path: &Path,
) -> Result<ApplicationIdentity, ProfileError> {
    let required = |name: &str| {
        root.attribute(name).map(str::to_string).ok_or_else(|| {
            ProfileError::malformed(
                package_path.join(APPLICATION_MANIFEST).display().to_string(),
                format!("ApplicationManifest/@{} is missing", name),
            )
        })
    };
    Ok(ApplicationIdentity::new(
        required("ApplicationTypeName")?,
        required("ApplicationTypeVersion")?,
    ))
}

/// Read the application type name and version a package declares
pub fn read_identity(package_path: &Path) -> Result<ApplicationIdentity, DeployError> {
    let root = load_manifest(package_path)?;
    Ok(identity_of(&root, package_path)?)
}

/// Validate a package layout and return its identity
///
/// Every imported service manifest must exist under the package root in a
/// directory named after it, and declare the name and version the
/// application manifest references.
pub fn validate(package_path: &Path) -> Result<ApplicationIdentity, DeployError> {
    let root = load_manifest(package_path)?;
    let identity = identity_of(&root, package_path)?;
    let invalid = |message: String| {
        ClusterError::operation_failed("Validate package", identity.type_name.clone(), message)
    };

    for import in root.children_named("ServiceManifestImport") {
        let reference = import
            .child("ServiceManifestRef")
            .ok_or_else(|| {
                invalid("ServiceManifestImport without ServiceManifestRef".to_string())
            })?;
        let name = reference
            .attribute("ServiceManifestName")
            .ok_or_else(|| invalid("ServiceManifestRef without ServiceManifestName".to_string()))?;

        let service_manifest_path = package_path.join(name).join(SERVICE_MANIFEST);
        let service = load_document(&service_manifest_path, || unreadable(&service_manifest_path))
            .map_err(|e| invalid(e.to_string()))?;

        if service.attribute("Name") != Some(name) {
            return Err(invalid(format!(
                "{} declares Name {:?}, expected {}",
                service_manifest_path.display(),
                service.attribute("Name"),
                name
            ))
            .into());
        }
        if let Some(expected) = reference.attribute("ServiceManifestVersion") {
            if service.attribute("Version") != Some(expected) {
                return Err(invalid(format!(
                    "service manifest {} declares Version {:?}, expected {}",
                    name,
                    service.attribute("Version"),
                    expected
                ))
                .into());
            }
        }
        debug!("Validated service manifest {} in {}", name, identity);
    }

    Ok(identity)
}

/// Read an application parameter file
pub fn read_parameter_file(path: &Path) -> Result<ApplicationParameters, ProfileError> {
    let root = load_document(path, || unreadable(path))?;
    if root.name != "Application" {
        return Err(ProfileError::malformed(
            path.display().to_string(),
            format!("expected root element Application, found {}", root.name),
        ));
    }

    let mut parameters = ApplicationParameters {
        application_name: root.attribute("Name").map(str::to_string),
        ..ApplicationParameters::empty()
    };

    if let Some(list) = root.child("Parameters") {
        for parameter in list.children_named("Parameter") {
            let name = parameter.attribute("Name");
            let value = parameter.attribute("Value");
            let (Some(name), Some(value)) = (name, value) else {
                return Err(ProfileError::malformed(
                    path.display().to_string(),
                    "Parameter requires both Name and Value",
                ));
            };
            parameters
                .parameters
                .insert(name.to_string(), value.to_string());
        }
    }

    Ok(parameters)
}

#[cfg(test)]
pub(crate) mod fixtures {
    use std::fs;
    use std::path::Path;

    /// Write a minimal single-service package
    pub fn write_package(dir: &Path, type_name: &str, version: &str) {
        fs::create_dir_all(dir.join("Service1Pkg")).unwrap();
        fs::write(
            dir.join(super::APPLICATION_MANIFEST),
            format!(
                r#"<ApplicationManifest xmlns="http://schemas.microsoft.com/2011/01/fabric"
                     ApplicationTypeName="{type_name}" ApplicationTypeVersion="{version}">
                     <ServiceManifestImport>
                       <ServiceManifestRef ServiceManifestName="Service1Pkg"
                                           ServiceManifestVersion="1.0.0" />
                     </ServiceManifestImport>
                   </ApplicationManifest>"#
            ),
        )
        .unwrap();
        fs::write(
            dir.join("Service1Pkg").join(super::SERVICE_MANIFEST),
            r#"<ServiceManifest Name="Service1Pkg" Version="1.0.0" />"#,
        )
        .unwrap();
    }
}
