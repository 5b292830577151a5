//! Command implementations
//!
//! Each subcommand resolves the shared publish arguments into a loaded
//! configuration and run options, then hands off to the services layer.

pub mod plan;
pub mod publish;

use anyhow::Result;
use std::path::Path;
use tracing::debug;

use crate::cli::PublishArgs;
use crate::config::DeployConfig;
use crate::infrastructure::{FabricRestClient, FabricSettings};
use crate::services::publish_service::{parse_overrides, resolve_repo_root};
use crate::services::PublishOptions;

/// Load `deploy.yaml` and turn CLI arguments into run options
pub(crate) fn resolve(args: &PublishArgs) -> Result<(DeployConfig, PublishOptions)> {
    let repo_root = resolve_repo_root(&args.repo_root)?;
    let config_path = if Path::new(&args.config).is_absolute() {
        Path::new(&args.config).to_path_buf()
    } else {
        repo_root.join(&args.config)
    };
    debug!("Loading config from {}", config_path.display());
    let config = DeployConfig::load(&config_path)?;

    let mut options = PublishOptions::new(repo_root);
    options.configuration = args.configuration.clone();
    options.profile = args.profile.clone();
    options.parameter_overrides = parse_overrides(&args.parameter)?;
    options.overwrite_behavior = args.overwrite_behavior.into();
    options.skip_validation = args.skip_package_validation;
    options.use_existing_connection = args.use_existing_cluster_connection;
    options.security_token = args.security_token.clone();

    Ok((config, options))
}

/// REST gateway client from the cluster section, with an optional endpoint override
pub(crate) fn fabric_client(
    config: &DeployConfig,
    endpoint: Option<&str>,
) -> Result<FabricRestClient> {
    let settings = FabricSettings {
        default_endpoint: endpoint
            .map(str::to_string)
            .unwrap_or_else(|| config.cluster.endpoint.clone()),
        http_gateway_port: config.cluster.http_gateway_port,
        request_timeout: config.cluster.request_timeout()?,
        api_version: config.cluster.api_version.clone(),
    };
    Ok(FabricRestClient::new(settings))
}
