use anyhow::Result;
use tracing::info;

use super::{fabric_client, resolve};
use crate::cli::PublishArgs;
use crate::services::PublishService;

pub async fn execute(args: PublishArgs) -> Result<()> {
    let (config, options) = resolve(&args)?;
    let client = fabric_client(&config, args.cluster_endpoint.as_deref())?;

    let results = PublishService::new(client, config).publish(&options).await?;
    info!("🎉 Publish finished ({} operations)", results.len());
    Ok(())
}
