//! Dry run: print the resolved operation list without contacting the cluster

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::PathBuf;

use super::{fabric_client, resolve};
use crate::cli::PublishArgs;
use crate::domain::{DeploymentOperation, OverwriteBehavior};
use crate::services::PublishService;

#[derive(Debug, Serialize)]
struct PlanOutput<'a> {
    profile: PathBuf,
    configuration: &'a str,
    overwrite_behavior: OverwriteBehavior,
    reuse_connection: bool,
    operations: &'a [DeploymentOperation],
}

pub async fn execute(args: PublishArgs) -> Result<()> {
    let (config, options) = resolve(&args)?;
    let client = fabric_client(&config, args.cluster_endpoint.as_deref())?;
    let service = PublishService::new(client, config);

    let (profile, plan) = service.plan(&options)?;
    let output = PlanOutput {
        profile: profile.document_path,
        configuration: &options.configuration,
        overwrite_behavior: options.overwrite_behavior,
        reuse_connection: options.use_existing_connection,
        operations: &plan,
    };

    let json = serde_json::to_string_pretty(&output).context("Failed to serialize plan")?;
    println!("{}", json);
    Ok(())
}
