//! XML document access for publish profiles and package manifests
//!
//! Documents are small, so they are read whole into an element tree.
//! Names are compared by local name; namespace prefixes and `xmlns`
//! declarations are dropped.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::path::Path;
use tracing::{debug, warn};

use crate::domain::{AttributeMap, AttributeValue, PublishProfile, UpgradeDeployment, UpgradeMode};
use crate::error::ProfileError;

/// A parsed element: attributes in document order plus child elements
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlElement {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlElement>,
}

impl XmlElement {
    fn from_start(start: &BytesStart<'_>) -> Result<Self, String> {
        let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
        let mut attributes = Vec::new();
        for attribute in start.attributes() {
            let attribute = attribute.map_err(|e| e.to_string())?;
            if attribute.key.as_ref() == b"xmlns" || attribute.key.as_ref().starts_with(b"xmlns:") {
                continue;
            }
            let key = String::from_utf8_lossy(attribute.key.local_name().as_ref()).into_owned();
            let value = attribute.unescape_value().map_err(|e| e.to_string())?;
            attributes.push((key, value.into_owned()));
        }
        Ok(Self {
            name,
            attributes,
            children: Vec::new(),
        })
    }

    /// Parse a whole document and return its root element
    pub fn parse(content: &str) -> Result<Self, String> {
        let mut reader = Reader::from_str(content);
        reader.config_mut().trim_text(true);

        let mut stack: Vec<XmlElement> = Vec::new();
        loop {
            let completed = match reader.read_event().map_err(|e| e.to_string())? {
                Event::Start(start) => {
                    stack.push(Self::from_start(&start)?);
                    continue;
                }
                Event::Empty(start) => Self::from_start(&start)?,
                Event::End(_) => stack.pop().ok_or("unexpected closing tag")?,
                Event::Eof => return Err("document has no root element".to_string()),
                _ => continue,
            };

            match stack.last_mut() {
                Some(parent) => parent.children.push(completed),
                None => return Ok(completed),
            }
        }
    }

    /// First child with the given local name
    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|child| child.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlElement> {
        self.children.iter().filter(move |child| child.name == name)
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

/// Read and parse an XML document from disk
///
/// A missing or unreadable file is reported through `not_found`, so callers
/// choose the error that fits the document kind.
pub fn load_document(
    path: &Path,
    not_found: impl FnOnce() -> ProfileError,
) -> Result<XmlElement, ProfileError> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        debug!("Failed to read {}: {}", path.display(), e);
        not_found()
    })?;
    XmlElement::parse(&content)
        .map_err(|message| ProfileError::malformed(path.display().to_string(), message))
}

/// Flatten an element's attributes into a typed attribute map
///
/// `None` is accepted only when the caller treats the element as optional;
/// a required but absent element is a malformed document.
pub fn read_attributes(
    element: Option<&XmlElement>,
    required: bool,
    context: &str,
) -> Result<AttributeMap, ProfileError> {
    match element {
        Some(element) => Ok(element
            .attributes
            .iter()
            .map(|(key, value)| (key.clone(), AttributeValue::parse(value)))
            .collect()),
        None if required => Err(ProfileError::malformed(
            context,
            "required element is missing",
        )),
        None => Ok(AttributeMap::new()),
    }
}

/// Read a publish profile document
pub fn read_profile(path: &Path) -> Result<PublishProfile, ProfileError> {
    let profile_display = path.display().to_string();
    let root = load_document(path, || ProfileError::NotFound {
        path: profile_display.clone(),
    })?;

    if root.name != "PublishProfile" {
        return Err(ProfileError::malformed(
            profile_display,
            format!("expected root element PublishProfile, found {}", root.name),
        ));
    }

    let cluster_connection_parameters =
        read_attributes(root.child("ClusterConnectionParameters"), false, &profile_display)?;

    let upgrade_deployment = match root.child("UpgradeDeployment") {
        Some(element) => Some(read_upgrade_deployment(element, &profile_display)?),
        None => None,
    };

    let application_parameter_file_path = root
        .child("ApplicationParameterFile")
        .and_then(|element| element.attribute("Path"))
        .map(normalize_separators);

    debug!(
        "Loaded profile {} ({} connection parameters, upgrade: {})",
        profile_display,
        cluster_connection_parameters.len(),
        upgrade_deployment.is_some()
    );

    Ok(PublishProfile {
        document_path: path.to_path_buf(),
        cluster_connection_parameters,
        upgrade_deployment,
        application_parameter_file_path,
    })
}

fn read_upgrade_deployment(
    element: &XmlElement,
    context: &str,
) -> Result<UpgradeDeployment, ProfileError> {
    let attributes = read_attributes(Some(element), true, context)?;
    let mut parameters = read_attributes(element.child("Parameters"), false, context)?;

    let mode = element.attribute("Mode").map(UpgradeMode::parse);
    if let Some(mode) = &mode {
        let previous = parameters.insert(mode.as_str(), AttributeValue::Bool(true));
        if let Some(previous) = previous.filter(|value| *value != AttributeValue::Bool(true)) {
            warn!(
                "UpgradeDeployment/@Mode {} replaces explicit parameter value {:?} in {}",
                mode, previous, context
            );
        }
    }

    Ok(UpgradeDeployment {
        attributes,
        mode,
        parameters,
    })
}

/// Profiles authored on Windows use `\` separators
fn normalize_separators(path: &str) -> String {
    if std::path::MAIN_SEPARATOR == '\\' {
        path.to_string()
    } else {
        path.replace('\\', "/")
    }
}
