//! Cluster connection setup
//!
//! Connects once per run with the profile's connection parameters, or
//! hands back the session's existing connection without connecting.

use tracing::{info, warn};

use crate::domain::{AttributeValue, PublishProfile};
use crate::error::{ClusterError, DeployError, ProfileError};
use crate::infrastructure::{ClusterManagement, SECURITY_TOKEN_KEY};
use crate::ui;

pub struct ClusterConnector<'a, C: ClusterManagement> {
    cluster: &'a C,
}

impl<'a, C: ClusterManagement> ClusterConnector<'a, C> {
    pub fn new(cluster: &'a C) -> Self {
        Self { cluster }
    }

    /// Establish (or reuse) the cluster connection for a run
    ///
    /// A security token supplied out-of-band is merged into the profile's
    /// parameters under [`SECURITY_TOKEN_KEY`] before connecting. Connection
    /// failures are reported once and never retried.
    pub async fn connect(
        &self,
        profile: &PublishProfile,
        security_token: Option<&str>,
        use_existing_connection: bool,
    ) -> Result<C::Connection, DeployError> {
        if use_existing_connection {
            info!("🔗 Reusing existing cluster connection");
            return Ok(self.cluster.existing_connection()?);
        }

        if profile.cluster_connection_parameters.is_empty() {
            return Err(ProfileError::malformed(
                profile.document_path.display().to_string(),
                "ClusterConnectionParameters are required unless an existing connection is reused",
            )
            .into());
        }

        let mut parameters = profile.cluster_connection_parameters.clone();
        if let Some(token) = security_token {
            parameters.insert(SECURITY_TOKEN_KEY, AttributeValue::String(token.to_string()));
        }

        info!("🔗 Connecting to cluster");
        match self.cluster.connect(&parameters).await {
            Ok(connection) => Ok(connection),
            Err(err @ ClusterError::Unreachable { .. }) => {
                warn!("Cluster connection failed: {}", err);
                ui::print_warning(
                    "Could not reach the cluster. Check that it is running and that the \
                     publish profile's ClusterConnectionParameters are correct.",
                );
                Err(err.into())
            }
            Err(err) => Err(err.into()),
        }
    }
}
