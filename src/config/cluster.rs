//! Cluster client configuration for the HTTP management gateway.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Cluster gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Gateway used when an existing cluster connection is reused
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// HTTP gateway port assumed when a profile endpoint names the client port
    #[serde(default = "default_http_gateway_port")]
    pub http_gateway_port: u16,

    /// Per-request timeout (e.g., "30s", "5m")
    #[serde(default = "default_request_timeout")]
    pub request_timeout: String,

    /// Management API version sent with every request
    #[serde(default = "default_api_version")]
    pub api_version: String,
}

fn default_endpoint() -> String {
    "http://localhost:19080".to_string()
}

fn default_http_gateway_port() -> u16 {
    19080
}

fn default_request_timeout() -> String {
    "5m".to_string()
}

fn default_api_version() -> String {
    "6.0".to_string()
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            http_gateway_port: default_http_gateway_port(),
            request_timeout: default_request_timeout(),
            api_version: default_api_version(),
        }
    }
}

impl ClusterConfig {
    /// Parsed request timeout
    pub fn request_timeout(&self) -> Result<Duration> {
        humantime::parse_duration(&self.request_timeout)
            .with_context(|| format!("Invalid cluster.request_timeout: {}", self.request_timeout))
    }
}
