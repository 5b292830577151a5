//! Cluster management over the HTTP gateway
//!
//! Talks to the cluster's REST management API (default port 19080).
//! Packages are copied into the image store file by file, provisioned as
//! an application type, then instantiated or upgraded.
//!
//! ## Connection parameters
//!
//! Read from the profile's `ClusterConnectionParameters` element:
//! - `ConnectionEndpoint` (`host:port`, or a full URL)
//! - `HttpGatewayPort` overrides the gateway port for `host:port` endpoints
//! - `X509Credential` / `AzureActiveDirectory` select https
//! - `ServerCaPem` / `ClientCertificatePem` PEM file paths for TLS
//! - `SecurityToken` bearer token

use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::cluster::{ApplicationRequest, ClusterManagement};
use crate::domain::{ApplicationIdentity, AttributeMap, OverwriteDecision, UpgradeSettings};
use crate::error::ClusterError;

/// Reserved connection parameter carrying an out-of-band security token
pub const SECURITY_TOKEN_KEY: &str = "SecurityToken";

/// Settings shared by every connection
#[derive(Debug, Clone)]
pub struct FabricSettings {
    /// Gateway used for a reused connection
    pub default_endpoint: String,
    pub http_gateway_port: u16,
    pub request_timeout: Duration,
    pub api_version: String,
}

/// Cluster management client over the REST gateway
pub struct FabricRestClient {
    settings: FabricSettings,
}

/// An established gateway connection
pub struct FabricConnection {
    endpoint: String,
    client: Client,
    api_version: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
struct ProvisionRequest<'a> {
    kind: &'static str,
    application_type_build_path: &'a str,
    #[serde(rename = "Async")]
    run_async: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
struct KeyValue {
    key: String,
    value: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
struct CreateApplicationBody<'a> {
    name: &'a str,
    type_name: &'a str,
    type_version: &'a str,
    parameter_list: Vec<KeyValue>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
struct UpgradeApplicationBody<'a> {
    name: &'a str,
    target_application_type_version: &'a str,
    parameters: Vec<KeyValue>,
    upgrade_kind: &'static str,
    rolling_upgrade_mode: &'a str,
    force_restart: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    upgrade_replica_set_check_timeout_in_seconds: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    monitoring_policy: Option<MonitoringPolicy<'a>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
struct MonitoringPolicy<'a> {
    failure_action: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ApplicationInfo {
    type_name: String,
    type_version: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PagedList {
    #[serde(default)]
    items: Vec<serde_json::Value>,
}

fn key_values(parameters: &BTreeMap<String, String>) -> Vec<KeyValue> {
    parameters
        .iter()
        .map(|(key, value)| KeyValue {
            key: key.clone(),
            value: value.clone(),
        })
        .collect()
}

/// `fabric:/Admin/Api` → `Admin~Api`
pub fn application_id(application_name: &str) -> String {
    application_name
        .strip_prefix("fabric:/")
        .unwrap_or(application_name)
        .replace('/', "~")
}

/// Gateway base URL for a profile's connection parameters
pub fn gateway_url(parameters: &AttributeMap, default_port: u16) -> Option<String> {
    let endpoint = parameters.get_str("ConnectionEndpoint")?.trim();
    if endpoint.contains("://") {
        return Some(endpoint.trim_end_matches('/').to_string());
    }

    let secure = parameters.get_bool("X509Credential").unwrap_or(false)
        || parameters.get_bool("AzureActiveDirectory").unwrap_or(false);
    let scheme = if secure { "https" } else { "http" };
    let host = endpoint.rsplit_once(':').map_or(endpoint, |(host, _)| host);
    let port = parameters
        .get("HttpGatewayPort")
        .and_then(|value| value.to_string().parse::<u16>().ok())
        .unwrap_or(default_port);

    Some(format!("{}://{}:{}", scheme, host, port))
}

impl FabricRestClient {
    pub fn new(settings: FabricSettings) -> Self {
        Self { settings }
    }

    fn build_client(
        &self,
        parameters: &AttributeMap,
        endpoint: &str,
    ) -> Result<Client, ClusterError> {
        let unreachable = |message: String| ClusterError::Unreachable {
            endpoint: endpoint.to_string(),
            message,
        };
        let read_pem = |key: &str| -> Result<Option<Vec<u8>>, ClusterError> {
            match parameters.get_str(key) {
                Some(path) => std::fs::read(path)
                    .map(Some)
                    .map_err(|e| unreachable(format!("Failed to read {} {}: {}", key, path, e))),
                None => Ok(None),
            }
        };

        let mut builder = Client::builder()
            .timeout(self.settings.request_timeout)
            .connect_timeout(Duration::from_secs(10));

        if let Some(pem) = read_pem("ServerCaPem")? {
            let certificate = reqwest::Certificate::from_pem(&pem)
                .map_err(|e| unreachable(format!("Invalid ServerCaPem: {}", e)))?;
            builder = builder.add_root_certificate(certificate);
        }
        if let Some(pem) = read_pem("ClientCertificatePem")? {
            let identity = reqwest::Identity::from_pem(&pem)
                .map_err(|e| unreachable(format!("Invalid ClientCertificatePem: {}", e)))?;
            builder = builder.identity(identity);
        }
        if let Some(token) = parameters.get_str(SECURITY_TOKEN_KEY) {
            let mut headers = reqwest::header::HeaderMap::new();
            let value = reqwest::header::HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| unreachable(format!("Invalid security token: {}", e)))?;
            headers.insert(reqwest::header::AUTHORIZATION, value);
            builder = builder.default_headers(headers);
        }

        builder
            .build()
            .map_err(|e| unreachable(format!("Failed to build HTTP client: {}", e)))
    }
}

impl FabricConnection {
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn url(&self, path: &str) -> String {
        let separator = if path.contains('?') { '&' } else { '?' };
        format!(
            "{}{}{}api-version={}",
            self.endpoint, path, separator, self.api_version
        )
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        operation: &str,
        application: &str,
    ) -> Result<Response, ClusterError> {
        request
            .send()
            .await
            .map_err(|e| ClusterError::operation_failed(operation, application, e.to_string()))
    }

    /// Turn a non-success response into the platform's error message
    async fn check(
        &self,
        response: Response,
        operation: &str,
        application: &str,
    ) -> Result<Response, ClusterError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(ClusterError::operation_failed(
            operation,
            application,
            format!("status {}: {}", status, body),
        ))
    }

    async fn get_application(
        &self,
        application_name: &str,
    ) -> Result<Option<ApplicationIdentity>, ClusterError> {
        let operation = "Get application";
        let url = self.url(&format!(
            "/Applications/{}",
            urlencoding::encode(&application_id(application_name))
        ));
        let response = self
            .send(self.client.get(&url), operation, application_name)
            .await?;

        if matches!(response.status(), StatusCode::NOT_FOUND | StatusCode::NO_CONTENT) {
            return Ok(None);
        }
        let response = self.check(response, operation, application_name).await?;
        let info: ApplicationInfo = response
            .json()
            .await
            .map_err(|e| {
                ClusterError::operation_failed(operation, application_name, e.to_string())
            })?;
        Ok(Some(ApplicationIdentity::new(info.type_name, info.type_version)))
    }

    async fn delete_application(&self, application_name: &str) -> Result<(), ClusterError> {
        let url = self.url(&format!(
            "/Applications/{}/$/Delete",
            urlencoding::encode(&application_id(application_name))
        ));
        let response = self
            .send(self.client.post(&url), "Remove application", application_name)
            .await?;
        self.check(response, "Remove application", application_name)
            .await?;
        Ok(())
    }

    async fn is_type_registered(
        &self,
        identity: &ApplicationIdentity,
    ) -> Result<bool, ClusterError> {
        let operation = "Get application type";
        let url = self.url(&format!(
            "/ApplicationTypes/{}?ApplicationTypeVersion={}",
            urlencoding::encode(&identity.type_name),
            urlencoding::encode(&identity.type_version)
        ));
        let response = self
            .send(self.client.get(&url), operation, &identity.type_name)
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        let response = self.check(response, operation, &identity.type_name).await?;
        let list: PagedList = response
            .json()
            .await
            .map_err(|e| {
                ClusterError::operation_failed(operation, &identity.type_name, e.to_string())
            })?;
        Ok(!list.items.is_empty())
    }

    /// Copy every package file into the image store under `store_path`
    async fn upload_package(
        &self,
        package_path: &Path,
        store_path: &str,
        application: &str,
    ) -> Result<(), ClusterError> {
        let operation = "Copy package";
        let failed =
            |message: String| ClusterError::operation_failed(operation, application, message);

        let mut uploaded = 0usize;
        for entry in WalkDir::new(package_path).sort_by_file_name() {
            let entry = entry.map_err(|e| failed(e.to_string()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(package_path)
                .map_err(|e| failed(e.to_string()))?;
            let segments: Vec<String> = relative
                .components()
                .map(|component| {
                    urlencoding::encode(&component.as_os_str().to_string_lossy()).into_owned()
                })
                .collect();

            let content = tokio::fs::read(entry.path())
                .await
                .map_err(|e| failed(format!("{}: {}", entry.path().display(), e)))?;
            let url = self.url(&format!(
                "/ImageStore/{}/{}",
                urlencoding::encode(store_path),
                segments.join("/")
            ));
            let response = self
                .send(self.client.put(&url).body(content), operation, application)
                .await?;
            self.check(response, operation, application).await?;
            uploaded += 1;
        }

        debug!("Copied {} files to image store path {}", uploaded, store_path);
        Ok(())
    }

    async fn remove_from_image_store(&self, store_path: &str) {
        let url = self.url(&format!("/ImageStore/{}", urlencoding::encode(store_path)));
        match self.client.delete(&url).send().await {
            Ok(response) if response.status().is_success() => {}
            Ok(response) => warn!(
                "⚠️  Could not clean image store path {} (status {})",
                store_path,
                response.status()
            ),
            Err(e) => warn!("⚠️  Could not clean image store path {}: {}", store_path, e),
        }
    }

    /// Copy and provision a package unless its type version is already registered
    ///
    /// Returns `false` when the type was already registered.
    async fn register(&self, request: &ApplicationRequest) -> Result<bool, ClusterError> {
        let identity = &request.identity;
        if self.is_type_registered(identity).await? {
            return Ok(false);
        }

        let store_path = format!("{}_{}", identity.type_name, identity.type_version);
        info!("📦 Copying {} to image store", request.package_path.display());
        if let Err(e) = self
            .upload_package(&request.package_path, &store_path, &identity.type_name)
            .await
        {
            self.remove_from_image_store(&store_path).await;
            return Err(e);
        }

        info!("📝 Registering application type {}", identity);
        let body = ProvisionRequest {
            kind: "ImageStorePath",
            application_type_build_path: &store_path,
            run_async: false,
        };
        let url = self.url("/ApplicationTypes/$/Provision");
        let response = self
            .send(
                self.client.post(&url).json(&body),
                "Register application type",
                &identity.type_name,
            )
            .await?;
        let result = self
            .check(response, "Register application type", &identity.type_name)
            .await;

        self.remove_from_image_store(&store_path).await;
        result.map(|_| true)
    }

    async fn create(&self, request: &ApplicationRequest) -> Result<(), ClusterError> {
        let body = CreateApplicationBody {
            name: &request.application_name,
            type_name: &request.identity.type_name,
            type_version: &request.identity.type_version,
            parameter_list: key_values(&request.parameters),
        };
        let url = self.url("/Applications/$/Create");
        let response = self
            .send(
                self.client.post(&url).json(&body),
                "Create application",
                &request.application_name,
            )
            .await?;
        self.check(response, "Create application", &request.application_name)
            .await?;
        Ok(())
    }
}

impl ClusterManagement for FabricRestClient {
    type Connection = FabricConnection;

    fn existing_connection(&self) -> Result<FabricConnection, ClusterError> {
        let endpoint = self.settings.default_endpoint.trim_end_matches('/').to_string();
        let client = self.build_client(&AttributeMap::new(), &endpoint)?;
        Ok(FabricConnection {
            endpoint,
            client,
            api_version: self.settings.api_version.clone(),
        })
    }

    async fn connect(&self, parameters: &AttributeMap) -> Result<FabricConnection, ClusterError> {
        let endpoint = gateway_url(parameters, self.settings.http_gateway_port).ok_or_else(|| {
            ClusterError::Unreachable {
                endpoint: "<unset>".to_string(),
                message: "ClusterConnectionParameters/@ConnectionEndpoint is not set".to_string(),
            }
        })?;

        for (key, _) in parameters.iter() {
            if !matches!(
                key.as_str(),
                "ConnectionEndpoint"
                    | "HttpGatewayPort"
                    | "X509Credential"
                    | "AzureActiveDirectory"
                    | "ServerCaPem"
                    | "ClientCertificatePem"
                    | SECURITY_TOKEN_KEY
            ) {
                debug!("Ignoring connection parameter {}", key);
            }
        }

        let connection = FabricConnection {
            client: self.build_client(parameters, &endpoint)?,
            endpoint,
            api_version: self.settings.api_version.clone(),
        };

        let url = connection.url("/$/GetClusterHealth");
        let unreachable = |message: String| ClusterError::Unreachable {
            endpoint: connection.endpoint.clone(),
            message,
        };
        let response = connection
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| unreachable(e.to_string()))?;
        if !response.status().is_success() {
            return Err(unreachable(format!(
                "health probe returned status {}",
                response.status()
            )));
        }

        debug!("Connected to {}", connection.endpoint());
        Ok(connection)
    }

    async fn create_application(
        &self,
        connection: &FabricConnection,
        request: &ApplicationRequest,
    ) -> Result<(), ClusterError> {
        let existing = connection.get_application(&request.application_name).await?;
        let decision = request
            .overwrite_behavior
            .decide(existing.as_ref(), &request.identity);

        if let OverwriteDecision::Reject(message) = decision {
            return Err(ClusterError::operation_failed(
                "Create application",
                &request.application_name,
                message,
            ));
        }

        connection.register(request).await?;

        if decision == OverwriteDecision::ReplaceExisting {
            info!("🗑️  Removing existing application {}", request.application_name);
            connection.delete_application(&request.application_name).await?;
        }

        info!("🚀 Creating application {}", request.application_name);
        connection.create(request).await
    }

    async fn register_application_type(
        &self,
        connection: &FabricConnection,
        request: &ApplicationRequest,
    ) -> Result<(), ClusterError> {
        let identity = &request.identity;
        if connection.is_type_registered(identity).await? {
            if !request.overwrite_behavior.allows_reregistration() {
                return Err(ClusterError::operation_failed(
                    "Register application type",
                    &identity.type_name,
                    format!(
                        "{} is already registered and overwrite behavior is Never",
                        identity
                    ),
                ));
            }
            info!("⏭️  Application type {} already registered", identity);
            return Ok(());
        }

        connection.register(request).await?;
        Ok(())
    }

    async fn upgrade_application(
        &self,
        connection: &FabricConnection,
        request: &ApplicationRequest,
        upgrade: &UpgradeSettings,
    ) -> Result<(), ClusterError> {
        if connection
            .get_application(&request.application_name)
            .await?
            .is_none()
        {
            info!(
                "Application {} does not exist yet, creating instead of upgrading",
                request.application_name
            );
            return self.create_application(connection, request).await;
        }

        connection.register(request).await?;

        info!(
            "🔄 Upgrading {} to {} ({})",
            request.application_name, request.identity.type_version, upgrade.mode
        );
        let body = UpgradeApplicationBody {
            name: &request.application_name,
            target_application_type_version: &request.identity.type_version,
            parameters: key_values(&request.parameters),
            upgrade_kind: "Rolling",
            rolling_upgrade_mode: upgrade.mode.as_str(),
            force_restart: upgrade.force_restart,
            upgrade_replica_set_check_timeout_in_seconds: upgrade.replica_set_check_timeout_secs,
            monitoring_policy: upgrade
                .failure_action
                .as_deref()
                .map(|failure_action| MonitoringPolicy { failure_action }),
        };
        let url = connection.url(&format!(
            "/Applications/{}/$/Upgrade",
            urlencoding::encode(&application_id(&request.application_name))
        ));
        let response = connection
            .send(
                connection.client.post(&url).json(&body),
                "Upgrade application",
                &request.application_name,
            )
            .await?;
        connection
            .check(response, "Upgrade application", &request.application_name)
            .await?;
        Ok(())
    }
}
