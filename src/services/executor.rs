//! Deployment execution
//!
//! Runs planned operations one at a time against the cluster. Nothing is
//! retried: the first failure is returned as-is and later operations are
//! never started.

use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::domain::{ApplicationParameters, DeploymentAction, DeploymentOperation};
use crate::error::DeployError;
use crate::infrastructure::{package, ApplicationRequest, ClusterManagement};

/// Progress callbacks for [`DeploymentExecutor::run`]
pub trait ExecutionReporter {
    fn started(&mut self, index: usize, total: usize, operation: &DeploymentOperation);
    fn succeeded(&mut self, operation: &DeploymentOperation, duration: Duration);
    fn failed(&mut self, operation: &DeploymentOperation, duration: Duration, error: &DeployError);
}

pub struct DeploymentExecutor<'a, C: ClusterManagement> {
    cluster: &'a C,
    connection: &'a C::Connection,
}

impl<'a, C: ClusterManagement> DeploymentExecutor<'a, C> {
    pub fn new(cluster: &'a C, connection: &'a C::Connection) -> Self {
        Self {
            cluster,
            connection,
        }
    }

    /// Validate every package that has not opted out of validation
    ///
    /// Runs before the first operation so a broken package aborts the
    /// run while nothing has been created yet.
    pub fn validate_packages(&self, plan: &[DeploymentOperation]) -> Result<(), DeployError> {
        for operation in plan.iter().filter(|op| !op.skip_validation) {
            info!("🔍 Validating package {}", operation.package_path.display());
            let identity = package::validate(&operation.package_path)?;
            debug!("{} package is {}", operation.target, identity);
        }
        Ok(())
    }

    /// Resolve an operation into a cluster request
    pub fn prepare(
        &self,
        operation: &DeploymentOperation,
    ) -> Result<ApplicationRequest, DeployError> {
        let identity = package::read_identity(&operation.package_path)?;

        let parameters = match (&operation.action, &operation.parameter_file) {
            (DeploymentAction::CreateAndRegister, Some(path)) => read_parameters(path)?,
            _ => ApplicationParameters::empty(),
        }
        .merged_with(&operation.parameter_overrides);

        let application_name = parameters
            .application_name
            .clone()
            .unwrap_or_else(|| identity.default_application_name());

        Ok(ApplicationRequest {
            target: operation.target.clone(),
            package_path: operation.package_path.clone(),
            identity,
            application_name,
            parameters: match operation.action {
                DeploymentAction::CreateAndRegister => parameters.parameters,
                DeploymentAction::RegisterOnly => Default::default(),
            },
            overwrite_behavior: operation.overwrite_behavior,
        })
    }

    /// Execute a single operation
    pub async fn execute(&self, operation: &DeploymentOperation) -> Result<(), DeployError> {
        let request = self.prepare(operation)?;

        match (operation.action, &operation.upgrade) {
            (DeploymentAction::CreateAndRegister, Some(upgrade)) => {
                self.cluster
                    .upgrade_application(self.connection, &request, upgrade)
                    .await?
            }
            (DeploymentAction::CreateAndRegister, None) => {
                self.cluster
                    .create_application(self.connection, &request)
                    .await?
            }
            (DeploymentAction::RegisterOnly, _) => {
                self.cluster
                    .register_application_type(self.connection, &request)
                    .await?
            }
        }
        Ok(())
    }

    /// Validate, then execute the whole plan in order, stopping at the first failure
    pub async fn run(
        &self,
        plan: &[DeploymentOperation],
        reporter: &mut impl ExecutionReporter,
    ) -> Result<(), DeployError> {
        self.validate_packages(plan)?;
        for (index, operation) in plan.iter().enumerate() {
            reporter.started(index, plan.len(), operation);
            let start = Instant::now();
            match self.execute(operation).await {
                Ok(()) => reporter.succeeded(operation, start.elapsed()),
                Err(e) => {
                    reporter.failed(operation, start.elapsed(), &e);
                    return Err(e);
                }
            }
        }
        Ok(())
    }
}

fn read_parameters(path: &Path) -> Result<ApplicationParameters, DeployError> {
    Ok(package::read_parameter_file(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ApplicationIdentity, OverwriteBehavior};
    use crate::error::ClusterError;
    use crate::infrastructure::cluster::fake::{FakeCluster, FakeConnection};
    use crate::infrastructure::package::fixtures::write_package;
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    struct Workspace {
        _dir: tempfile::TempDir,
        root: PathBuf,
    }

    fn workspace() -> Workspace {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();
        write_package(&root.join("admin"), "AdminType", "1.0.0");
        write_package(&root.join("ingestion"), "IngestionType", "1.0.0");
        std::fs::write(
            root.join("params.xml"),
            r#"<Application Name="fabric:/Admin">
                 <Parameters><Parameter Name="InstanceCount" Value="3" /></Parameters>
               </Application>"#,
        )
        .unwrap();
        Workspace { _dir: dir, root }
    }

    fn create_op(ws: &Workspace, behavior: OverwriteBehavior) -> DeploymentOperation {
        let mut overrides = BTreeMap::new();
        overrides.insert("InstanceCount".to_string(), "1".to_string());
        DeploymentOperation {
            target: "AdminApp".to_string(),
            package_path: ws.root.join("admin"),
            parameter_file: Some(ws.root.join("params.xml")),
            parameter_overrides: overrides,
            action: DeploymentAction::CreateAndRegister,
            overwrite_behavior: behavior,
            skip_validation: false,
            upgrade: None,
        }
    }

    fn register_op(ws: &Workspace) -> DeploymentOperation {
        DeploymentOperation {
            target: "IngestionApp".to_string(),
            package_path: ws.root.join("ingestion"),
            parameter_file: None,
            parameter_overrides: BTreeMap::new(),
            action: DeploymentAction::RegisterOnly,
            overwrite_behavior: OverwriteBehavior::SameTypeAndVersion,
            skip_validation: false,
            upgrade: None,
        }
    }

    #[derive(Default)]
    struct CollectingReporter {
        started: Vec<String>,
        succeeded: Vec<String>,
        failed: Vec<String>,
    }

    impl ExecutionReporter for CollectingReporter {
        fn started(&mut self, index: usize, total: usize, operation: &DeploymentOperation) {
            self.started
                .push(format!("{}/{} {}", index + 1, total, operation.target));
        }

        fn succeeded(&mut self, operation: &DeploymentOperation, _duration: Duration) {
            self.succeeded.push(operation.target.clone());
        }

        fn failed(
            &mut self,
            operation: &DeploymentOperation,
            _duration: Duration,
            _error: &DeployError,
        ) {
            self.failed.push(operation.target.clone());
        }
    }

    fn connection() -> FakeConnection {
        FakeConnection {
            parameters: Default::default(),
            existing: true,
        }
    }

    #[test]
    fn test_prepare_merges_overrides_over_parameter_file() {
        let ws = workspace();
        let cluster = FakeCluster::new();
        let conn = connection();
        let executor = DeploymentExecutor::new(&cluster, &conn);

        let request = executor
            .prepare(&create_op(&ws, OverwriteBehavior::Never))
            .unwrap();
        assert_eq!(request.application_name, "fabric:/Admin");
        assert_eq!(request.identity, ApplicationIdentity::new("AdminType", "1.0.0"));
        assert_eq!(request.parameters["InstanceCount"], "1");
    }

    #[test]
    fn test_prepare_register_only_uses_empty_parameters() {
        let ws = workspace();
        let cluster = FakeCluster::new();
        let conn = connection();
        let executor = DeploymentExecutor::new(&cluster, &conn);

        let request = executor.prepare(&register_op(&ws)).unwrap();
        assert!(request.parameters.is_empty());
        assert_eq!(request.application_name, "fabric:/Ingestion");
    }

    #[tokio::test]
    async fn test_never_keeps_existing_application() {
        let ws = workspace();
        let existing = ApplicationIdentity::new("AdminType", "0.9.0");
        let cluster = FakeCluster::new().with_application("fabric:/Admin", existing.clone());
        let conn = connection();
        let executor = DeploymentExecutor::new(&cluster, &conn);

        let err = executor
            .execute(&create_op(&ws, OverwriteBehavior::Never))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DeployError::Cluster(ClusterError::ManagementOperationFailed { .. })
        ));
        assert_eq!(cluster.application("fabric:/Admin"), Some(existing));
    }

    #[tokio::test]
    async fn test_same_type_and_version_replaces_exact_match() {
        let ws = workspace();
        let identity = ApplicationIdentity::new("AdminType", "1.0.0");
        let cluster = FakeCluster::new().with_application("fabric:/Admin", identity.clone());
        let conn = connection();
        let executor = DeploymentExecutor::new(&cluster, &conn);

        executor
            .execute(&create_op(&ws, OverwriteBehavior::SameTypeAndVersion))
            .await
            .unwrap();
        assert_eq!(cluster.application("fabric:/Admin"), Some(identity));
    }

    #[tokio::test]
    async fn test_same_type_and_version_mismatch_fails_without_removal() {
        let ws = workspace();
        let older = ApplicationIdentity::new("AdminType", "0.9.0");
        let cluster = FakeCluster::new().with_application("fabric:/Admin", older.clone());
        let conn = connection();
        let executor = DeploymentExecutor::new(&cluster, &conn);

        let err = executor
            .execute(&create_op(&ws, OverwriteBehavior::SameTypeAndVersion))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DeployError::Cluster(ClusterError::ManagementOperationFailed { .. })
        ));
        assert_eq!(cluster.application("fabric:/Admin"), Some(older));
    }

    #[tokio::test]
    async fn test_always_replaces_any_existing() {
        let ws = workspace();
        let cluster = FakeCluster::new()
            .with_application("fabric:/Admin", ApplicationIdentity::new("LegacyType", "7.0.0"));
        let conn = connection();
        let executor = DeploymentExecutor::new(&cluster, &conn);

        executor
            .execute(&create_op(&ws, OverwriteBehavior::Always))
            .await
            .unwrap();
        assert_eq!(
            cluster.application("fabric:/Admin"),
            Some(ApplicationIdentity::new("AdminType", "1.0.0"))
        );
    }

    #[tokio::test]
    async fn test_validation_failure_aborts_before_any_call() {
        let ws = workspace();
        std::fs::remove_dir_all(ws.root.join("ingestion").join("Service1Pkg")).unwrap();
        let cluster = FakeCluster::new();
        let conn = connection();
        let executor = DeploymentExecutor::new(&cluster, &conn);

        let plan = vec![create_op(&ws, OverwriteBehavior::Always), register_op(&ws)];
        let mut reporter = CollectingReporter::default();
        let err = executor.run(&plan, &mut reporter).await.unwrap_err();
        assert!(matches!(
            err,
            DeployError::Cluster(ClusterError::ManagementOperationFailed { .. })
        ));
        assert!(cluster.calls().is_empty());
        assert!(reporter.started.is_empty());
    }

    #[tokio::test]
    async fn test_skip_validation_tolerates_incomplete_package() {
        let ws = workspace();
        std::fs::remove_dir_all(ws.root.join("ingestion").join("Service1Pkg")).unwrap();
        let cluster = FakeCluster::new();
        let conn = connection();
        let executor = DeploymentExecutor::new(&cluster, &conn);

        let mut register = register_op(&ws);
        register.skip_validation = true;
        executor
            .run(&[register], &mut CollectingReporter::default())
            .await
            .unwrap();
        assert!(cluster.is_registered(&ApplicationIdentity::new("IngestionType", "1.0.0")));
    }

    #[tokio::test]
    async fn test_run_stops_at_first_failure() {
        let ws = workspace();
        write_package(&ws.root.join("tenant"), "TenantType", "1.0.0");
        let cluster = FakeCluster::failing_on("IngestionApp");
        let conn = connection();
        let executor = DeploymentExecutor::new(&cluster, &conn);

        let mut tenant = register_op(&ws);
        tenant.target = "TenantApp".to_string();
        tenant.package_path = ws.root.join("tenant");
        let plan = vec![
            create_op(&ws, OverwriteBehavior::SameTypeAndVersion),
            register_op(&ws),
            tenant,
        ];

        let mut reporter = CollectingReporter::default();
        executor.run(&plan, &mut reporter).await.unwrap_err();

        assert_eq!(reporter.started, vec!["1/3 AdminApp", "2/3 IngestionApp"]);
        assert_eq!(reporter.succeeded, vec!["AdminApp"]);
        assert_eq!(reporter.failed, vec!["IngestionApp"]);
        assert_eq!(
            cluster.calls(),
            vec!["create fabric:/Admin", "register IngestionType 1.0.0"]
        );
    }

    #[tokio::test]
    async fn test_upgrade_settings_route_to_upgrade() {
        let ws = workspace();
        let cluster = FakeCluster::new();
        let conn = connection();
        let executor = DeploymentExecutor::new(&cluster, &conn);

        let mut operation = create_op(&ws, OverwriteBehavior::Never);
        operation.upgrade = Some(crate::domain::UpgradeSettings {
            mode: crate::domain::UpgradeMode::Monitored,
            force_restart: false,
            failure_action: None,
            replica_set_check_timeout_secs: None,
            parameters: Default::default(),
        });
        executor.execute(&operation).await.unwrap();
        assert_eq!(cluster.calls(), vec!["upgrade fabric:/Admin Monitored"]);
    }
}
