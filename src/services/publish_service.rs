//! Publish service - orchestrates a multi-application publish
//!
//! Reads the publish profile, builds the plan, connects to the cluster
//! once and runs every operation in order, stopping at the first failure.

use anyhow::{Context, Result};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use super::connector::ClusterConnector;
use super::executor::{DeploymentExecutor, ExecutionReporter};
use crate::config::DeployConfig;
use crate::domain::{
    build_plan, DeploymentOperation, OverwriteBehavior, PlanRequest, PublishProfile,
};
use crate::error::DeployError;
use crate::infrastructure::{xml, ClusterManagement};
use crate::observability::{EventMetadata, PublishTracker};
use crate::ui;

/// Run parameters for one publish
#[derive(Debug, Clone)]
pub struct PublishOptions {
    pub repo_root: PathBuf,
    /// Build configuration, e.g. `Debug`
    pub configuration: String,
    /// Profile name, with or without `.xml`
    pub profile: String,
    pub parameter_overrides: BTreeMap<String, String>,
    pub overwrite_behavior: OverwriteBehavior,
    pub skip_validation: bool,
    pub use_existing_connection: bool,
    pub security_token: Option<String>,
}

impl PublishOptions {
    pub fn new(repo_root: impl Into<PathBuf>) -> Self {
        Self {
            repo_root: repo_root.into(),
            configuration: "Debug".to_string(),
            profile: "Local.5Node".to_string(),
            parameter_overrides: BTreeMap::new(),
            overwrite_behavior: OverwriteBehavior::default(),
            skip_validation: false,
            use_existing_connection: false,
            security_token: None,
        }
    }

    fn plan_request(&self) -> PlanRequest {
        let mut request = PlanRequest::new(self.configuration.clone());
        request.overwrite_behavior = self.overwrite_behavior;
        request.skip_validation = self.skip_validation;
        request.parameter_overrides = self.parameter_overrides.clone();
        request
    }
}

/// Result of one executed operation
#[derive(Debug)]
pub struct OperationResult {
    pub target: String,
    pub action: &'static str,
    pub success: bool,
    pub duration: Duration,
    pub message: Option<String>,
}

/// Service for publishing the configured applications
pub struct PublishService<C: ClusterManagement> {
    cluster: C,
    config: DeployConfig,
}

impl<C: ClusterManagement> PublishService<C> {
    pub fn new(cluster: C, config: DeployConfig) -> Self {
        Self { cluster, config }
    }

    /// Resolve the profile and the ordered operation list
    pub fn plan(
        &self,
        options: &PublishOptions,
    ) -> Result<(PublishProfile, Vec<DeploymentOperation>)> {
        let profile_path = self.config.profile_path(&options.repo_root, &options.profile)?;
        info!("📄 Profile: {}", profile_path.display());

        let profile = xml::read_profile(&profile_path)?;
        let targets = self.config.targets(&options.repo_root);
        let plan = build_plan(&profile, &targets, &options.plan_request())?;
        Ok((profile, plan))
    }

    /// Execute a full publish
    pub async fn publish(&self, options: &PublishOptions) -> Result<Vec<OperationResult>> {
        let tracker = PublishTracker::new(EventMetadata::new(
            options.profile.clone(),
            options.configuration.clone(),
        ));

        let (profile, plan) = match self.plan(options) {
            Ok(resolved) => resolved,
            Err(e) => {
                tracker.emit_failed(None, format!("{:#}", e));
                return Err(e);
            }
        };

        self.print_header(options, &plan);
        tracker.emit_started(
            plan.iter().map(|op| op.target.clone()).collect(),
            options.overwrite_behavior.to_string(),
            options.use_existing_connection,
        );

        let connection = match ClusterConnector::new(&self.cluster)
            .connect(
                &profile,
                options.security_token.as_deref(),
                options.use_existing_connection,
            )
            .await
        {
            Ok(connection) => connection,
            Err(e) => {
                tracker.emit_failed(None, e.to_string());
                return Err(e).context("Failed to connect to cluster");
            }
        };

        let executor = DeploymentExecutor::new(&self.cluster, &connection);
        let mut reporter = ConsoleReporter::new(&tracker);
        let outcome = executor.run(&plan, &mut reporter).await;
        let (results, failed_target) = reporter.finish();

        match outcome {
            Ok(()) => {
                self.print_summary(&results, None);
                tracker.emit_completed(results.len());
                Ok(results)
            }
            Err(e) => match failed_target {
                Some(target) => {
                    self.print_summary(&results, Some(target.as_str()));
                    tracker.emit_failed(Some(target), e.to_string());
                    Err(e.into())
                }
                None => {
                    tracker.emit_failed(None, e.to_string());
                    Err(e).context("Package validation failed")
                }
            },
        }
    }

    fn print_header(&self, options: &PublishOptions, plan: &[DeploymentOperation]) {
        ui::print_header(&format!("Publish: {} ({})", options.profile, options.configuration));
        info!("Overwrite behavior: {}", options.overwrite_behavior);
        info!(
            "Package validation: {}",
            if options.skip_validation { "skipped" } else { "enabled" }
        );
        info!("Applications: {}", plan.len());
        println!();
    }

    fn print_summary(&self, results: &[OperationResult], failed_target: Option<&str>) {
        println!();
        println!(
            "{}",
            "════════════════════════════════════════════════════════════".bright_blue()
        );
        match failed_target {
            None => ui::print_success(&format!("Published {} applications", results.len())),
            Some(target) => ui::print_error(&format!("Publish failed at {}", target)),
        }
        println!();
        for result in results {
            ui::print_operation_line(
                result.success,
                &result.target,
                result.action,
                result.duration,
            );
            if let Some(message) = &result.message {
                println!("      {}", message);
            }
        }
        println!();
    }
}

/// Spinner, log lines and events for each executed operation
struct ConsoleReporter<'a> {
    tracker: &'a PublishTracker,
    spinner: Option<ProgressBar>,
    results: Vec<OperationResult>,
    failed_target: Option<String>,
}

impl<'a> ConsoleReporter<'a> {
    fn new(tracker: &'a PublishTracker) -> Self {
        Self {
            tracker,
            spinner: None,
            results: Vec::new(),
            failed_target: None,
        }
    }

    fn finish(mut self) -> (Vec<OperationResult>, Option<String>) {
        self.finish_spinner();
        (self.results, self.failed_target)
    }

    fn finish_spinner(&mut self) {
        if let Some(spinner) = self.spinner.take() {
            spinner.finish_and_clear();
        }
    }
}

impl ExecutionReporter for ConsoleReporter<'_> {
    fn started(&mut self, index: usize, total: usize, operation: &DeploymentOperation) {
        let action = operation.action.name();
        info!(
            "━━━ Step {}/{}: {} {} ━━━",
            index + 1,
            total,
            action,
            operation.target
        );
        self.spinner = Some(spinner(&format!("{} {}...", action, operation.target)));
    }

    fn succeeded(&mut self, operation: &DeploymentOperation, duration: Duration) {
        self.finish_spinner();
        let action = operation.action.name();
        info!(
            "{} {} completed in {:.1}s",
            "✅".green(),
            operation.target,
            duration.as_secs_f64()
        );
        self.tracker
            .emit_operation_completed(&operation.target, action, duration.as_secs_f64());
        self.results.push(OperationResult {
            target: operation.target.clone(),
            action,
            success: true,
            duration,
            message: None,
        });
    }

    fn failed(&mut self, operation: &DeploymentOperation, duration: Duration, error: &DeployError) {
        self.finish_spinner();
        let action = operation.action.name();
        let message = error.to_string();
        info!("{} {} failed: {}", "❌".red(), operation.target, message);
        self.tracker.emit_operation_failed(
            &operation.target,
            action,
            duration.as_secs_f64(),
            message.clone(),
        );
        self.results.push(OperationResult {
            target: operation.target.clone(),
            action,
            success: false,
            duration,
            message: Some(message),
        });
        self.failed_target = Some(operation.target.clone());
    }
}

fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Parse `KEY=VALUE` application parameter overrides
pub fn parse_overrides(pairs: &[String]) -> Result<BTreeMap<String, String>> {
    let mut overrides = BTreeMap::new();
    for pair in pairs {
        let (key, value) =
            pair.split_once('=')
                .ok_or_else(|| crate::error::ConfigError::InvalidValue {
                    field: "--parameter".to_string(),
                    value: pair.clone(),
                })?;
        if key.trim().is_empty() {
            return Err(crate::error::ConfigError::InvalidValue {
                field: "--parameter".to_string(),
                value: pair.clone(),
            }
            .into());
        }
        overrides.insert(key.trim().to_string(), value.to_string());
    }
    Ok(overrides)
}

/// Resolve a possibly relative repository root against the working directory
pub fn resolve_repo_root(repo_root: &str) -> Result<PathBuf> {
    let path = Path::new(repo_root);
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().context("Failed to read current directory")?;
    Ok(cwd.join(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ClusterError, DeployError, ProfileError};
    use crate::infrastructure::cluster::fake::FakeCluster;
    use crate::infrastructure::package::fixtures::write_package;
    use std::fs;

    /// Repository with three packages, a profile and a parameter file
    fn repository(profile_body: &str) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        for (project, type_name) in [
            ("AdminApp", "AdminType"),
            ("IngestionApp", "IngestionType"),
            ("TenantApp", "TenantType"),
        ] {
            write_package(
                &root.join("src").join(project).join("pkg").join("Debug"),
                type_name,
                "1.0.0",
            );
        }

        let admin = root.join("src").join("AdminApp");
        fs::create_dir_all(admin.join("PublishProfiles")).unwrap();
        fs::create_dir_all(admin.join("ApplicationParameters")).unwrap();
        fs::write(
            admin.join("PublishProfiles").join("Local.5Node.xml"),
            profile_body,
        )
        .unwrap();
        fs::write(
            admin.join("ApplicationParameters").join("Local.5Node.xml"),
            r#"<Application Name="fabric:/Admin">
                 <Parameters><Parameter Name="Admin_InstanceCount" Value="5" /></Parameters>
               </Application>"#,
        )
        .unwrap();
        dir
    }

    const LOCAL_PROFILE: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<PublishProfile xmlns="http://schemas.microsoft.com/2015/05/fabrictools">
  <ClusterConnectionParameters />
  <ApplicationParameterFile Path="..\ApplicationParameters\Local.5Node.xml" />
</PublishProfile>"#;

    fn options(root: &Path) -> PublishOptions {
        let mut options = PublishOptions::new(root);
        options.use_existing_connection = true;
        options
    }

    #[tokio::test]
    async fn test_end_to_end_three_calls_in_order_without_connect() {
        let repo = repository(LOCAL_PROFILE);
        let service = PublishService::new(FakeCluster::new(), DeployConfig::default());

        let results = service.publish(&options(repo.path())).await.unwrap();

        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| r.success));
        assert_eq!(
            service.cluster.calls(),
            vec![
                "create fabric:/Admin",
                "register IngestionType 1.0.0",
                "register TenantType 1.0.0",
            ]
        );
    }

    #[tokio::test]
    async fn test_second_failure_stops_the_run() {
        let repo = repository(LOCAL_PROFILE);
        let service = PublishService::new(
            FakeCluster::failing_on("IngestionApp"),
            DeployConfig::default(),
        );

        let err = service.publish(&options(repo.path())).await.unwrap_err();

        assert!(matches!(
            err.downcast_ref::<DeployError>(),
            Some(DeployError::Cluster(ClusterError::ManagementOperationFailed { .. }))
        ));
        assert_eq!(
            service.cluster.calls(),
            vec!["create fabric:/Admin", "register IngestionType 1.0.0"]
        );
    }

    #[tokio::test]
    async fn test_empty_connection_parameters_need_reuse() {
        let repo = repository(LOCAL_PROFILE);
        let service = PublishService::new(FakeCluster::new(), DeployConfig::default());
        let mut options = options(repo.path());
        options.use_existing_connection = false;

        let err = service.publish(&options).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DeployError>(),
            Some(DeployError::Profile(ProfileError::MalformedDocument { .. }))
        ));
        assert!(service.cluster.calls().is_empty());
    }

    #[tokio::test]
    async fn test_missing_profile_fails_before_cluster_calls() {
        let repo = repository(LOCAL_PROFILE);
        let service = PublishService::new(FakeCluster::new(), DeployConfig::default());
        let mut options = options(repo.path());
        options.profile = "Cloud".to_string();

        let err = service.publish(&options).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ProfileError>(),
            Some(ProfileError::NotFound { .. })
        ));
        assert!(service.cluster.calls().is_empty());
    }

    #[test]
    fn test_plan_applies_overrides_to_first_target() {
        let repo = repository(LOCAL_PROFILE);
        let service = PublishService::new(FakeCluster::new(), DeployConfig::default());
        let mut options = options(repo.path());
        options.parameter_overrides =
            parse_overrides(&["Admin_InstanceCount=1".to_string()]).unwrap();

        let (_, plan) = service.plan(&options).unwrap();
        assert_eq!(plan.len(), 3);
        assert_eq!(plan[0].parameter_overrides["Admin_InstanceCount"], "1");
        assert!(plan[1].parameter_overrides.is_empty());
        assert!(plan[0].parameter_file.as_ref().unwrap().exists());
    }

    #[test]
    fn test_parse_overrides() {
        let parsed =
            parse_overrides(&["A=1".to_string(), "B=x=y".to_string(), "C=".to_string()]).unwrap();
        assert_eq!(parsed["A"], "1");
        assert_eq!(parsed["B"], "x=y");
        assert_eq!(parsed["C"], "");

        assert!(parse_overrides(&["novalue".to_string()]).is_err());
        assert!(parse_overrides(&["=1".to_string()]).is_err());
    }
}
