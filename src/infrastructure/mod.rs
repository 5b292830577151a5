//! Infrastructure layer - external I/O adapters
//!
//! This module contains all code that interacts with external systems:
//! - Profile, manifest and parameter documents (XML)
//! - Application packages on disk
//! - Cluster management gateway (REST)

pub mod cluster;
pub mod fabric;
pub mod package;
pub mod xml;

// Re-export commonly used types
pub use cluster::{ApplicationRequest, ClusterManagement};
pub use fabric::{FabricRestClient, FabricSettings, SECURITY_TOKEN_KEY};
