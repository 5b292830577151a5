//! Centralized error types for sfdeploy
//!
//! Uses thiserror for typed errors that can be matched on,
//! while still being compatible with anyhow for propagation.

use thiserror::Error;

/// Top-level error type for publish operations
#[derive(Error, Debug)]
pub enum DeployError {
    #[error("Profile error: {0}")]
    Profile(#[from] ProfileError),

    #[error("Cluster error: {0}")]
    Cluster(#[from] ClusterError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Publish profile and package document errors
#[derive(Error, Debug)]
pub enum ProfileError {
    #[error("Publish profile not found: {path}")]
    NotFound { path: String },

    #[error("Malformed document {path}: {message}")]
    MalformedDocument { path: String, message: String },

    #[error(
        "Publish profile {path} does not declare ApplicationParameterFile/@Path, \
         required by application {application}"
    )]
    MissingParameterFilePath { path: String, application: String },
}

impl ProfileError {
    pub fn malformed(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MalformedDocument {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Cluster management errors
#[derive(Error, Debug)]
pub enum ClusterError {
    #[error("Cluster unreachable at {endpoint}: {message}")]
    Unreachable { endpoint: String, message: String },

    #[error("{operation} failed for application {application}: {message}")]
    ManagementOperationFailed {
        operation: String,
        application: String,
        message: String,
    },
}

impl ClusterError {
    pub fn operation_failed(
        operation: impl Into<String>,
        application: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::ManagementOperationFailed {
            operation: operation.into(),
            application: application.into(),
            message: message.into(),
        }
    }
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration value for {field}: {value}")]
    InvalidValue { field: String, value: String },

    #[error("Failed to parse config {path}: {message}")]
    ParseError { path: String, message: String },

    #[error("No deployment targets configured")]
    NoTargets,
}
