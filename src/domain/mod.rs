//! Domain layer - pure business logic
//!
//! This module contains business logic with no external I/O.
//! Types and functions here can be unit tested without mocking.

pub mod attribute;
pub mod parameters;
pub mod plan;
pub mod profile;
pub mod target;

// Re-export commonly used types
pub use attribute::{AttributeMap, AttributeValue};
pub use parameters::ApplicationParameters;
pub use plan::{build_plan, DeploymentOperation, PlanRequest, UpgradeSettings};
pub use profile::{PublishProfile, UpgradeDeployment, UpgradeMode};
pub use target::{
    ApplicationIdentity, DeploymentAction, DeploymentTarget, OverwriteBehavior, OverwriteDecision,
};
