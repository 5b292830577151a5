//! Application parameter sets

use std::collections::BTreeMap;

/// Contents of an application parameter file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplicationParameters {
    /// `Application/@Name`, e.g. `fabric:/Admin`
    pub application_name: Option<String>,
    pub parameters: BTreeMap<String, String>,
}

impl ApplicationParameters {
    /// The empty parameter set used by register-only targets
    pub fn empty() -> Self {
        Self::default()
    }

    /// Apply caller overrides on top of the file's values
    pub fn merged_with(mut self, overrides: &BTreeMap<String, String>) -> Self {
        for (key, value) in overrides {
            self.parameters.insert(key.clone(), value.clone());
        }
        self
    }
}
