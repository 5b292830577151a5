//! CLI definitions for sfdeploy
//!
//! This module contains all CLI argument parsing structures using clap.

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::domain::OverwriteBehavior;

#[derive(Parser)]
#[command(
    name = "sfdeploy",
    version,
    about = "Publish-profile driven deployment for Service Fabric applications",
    long_about = "Deploys a fixed, ordered set of application packages to a Service Fabric \
                  cluster.\nThe first application is registered and created; the rest are \
                  registered only."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Deploy every configured application in order
    Publish(PublishArgs),

    /// Print the resolved deployment plan as JSON without contacting the cluster
    Plan(PublishArgs),
}

#[derive(Args, Debug, Clone)]
pub struct PublishArgs {
    /// Build configuration used to locate packages
    #[arg(long, default_value = "Debug")]
    pub configuration: String,

    /// Publish profile name (file under the profiles directory)
    #[arg(long, default_value = "Local.5Node")]
    pub profile: String,

    /// Application parameter override for the created application (repeatable)
    #[arg(long = "parameter", value_name = "KEY=VALUE")]
    pub parameter: Vec<String>,

    /// What to do when an application with the same name already exists
    #[arg(long, value_enum, default_value_t = OverwriteArg::SameTypeAndVersion)]
    pub overwrite_behavior: OverwriteArg,

    /// Skip local package validation before deploying
    #[arg(long)]
    pub skip_package_validation: bool,

    /// Reuse the session's cluster connection instead of connecting from the profile
    #[arg(long)]
    pub use_existing_cluster_connection: bool,

    /// Security token merged into the connection parameters
    #[arg(long, env = "SF_SECURITY_TOKEN", hide_env_values = true)]
    pub security_token: Option<String>,

    /// Deployment configuration file, relative to the repository root
    #[arg(long, default_value = "deploy.yaml")]
    pub config: String,

    /// Repository root
    #[arg(long, default_value = ".")]
    pub repo_root: String,

    /// Gateway endpoint for a reused connection
    #[arg(long, env = "SF_CLUSTER_ENDPOINT")]
    pub cluster_endpoint: Option<String>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverwriteArg {
    Never,
    Always,
    SameTypeAndVersion,
}

impl From<OverwriteArg> for OverwriteBehavior {
    fn from(arg: OverwriteArg) -> Self {
        match arg {
            OverwriteArg::Never => OverwriteBehavior::Never,
            OverwriteArg::Always => OverwriteBehavior::Always,
            OverwriteArg::SameTypeAndVersion => OverwriteBehavior::SameTypeAndVersion,
        }
    }
}
