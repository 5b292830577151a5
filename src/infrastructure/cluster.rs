//! Cluster management interface
//!
//! The seam between deployment orchestration and a concrete cluster
//! client. Implementations own the overwrite policy: they look up the
//! existing application and apply [`OverwriteBehavior::decide`].

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::domain::{ApplicationIdentity, AttributeMap, OverwriteBehavior, UpgradeSettings};
use crate::error::ClusterError;

/// A resolved request to register (and optionally create) an application
#[derive(Debug, Clone, PartialEq)]
pub struct ApplicationRequest {
    /// Target name from the deployment config, for diagnostics
    pub target: String,
    pub package_path: PathBuf,
    pub identity: ApplicationIdentity,
    /// Instance name, e.g. `fabric:/Admin`
    pub application_name: String,
    pub parameters: BTreeMap<String, String>,
    pub overwrite_behavior: OverwriteBehavior,
}

/// Operations a cluster management endpoint offers
#[allow(async_fn_in_trait)]
pub trait ClusterManagement {
    type Connection;

    /// The connection already configured for this session, without connecting
    fn existing_connection(&self) -> Result<Self::Connection, ClusterError>;

    async fn connect(&self, parameters: &AttributeMap) -> Result<Self::Connection, ClusterError>;

    /// Register the package's type and create an application instance
    async fn create_application(
        &self,
        connection: &Self::Connection,
        request: &ApplicationRequest,
    ) -> Result<(), ClusterError>;

    /// Register the package's type only
    async fn register_application_type(
        &self,
        connection: &Self::Connection,
        request: &ApplicationRequest,
    ) -> Result<(), ClusterError>;

    /// Upgrade the application in place, creating it when it does not exist yet
    async fn upgrade_application(
        &self,
        connection: &Self::Connection,
        request: &ApplicationRequest,
        upgrade: &UpgradeSettings,
    ) -> Result<(), ClusterError>;
}

#[cfg(test)]
pub(crate) mod fake {
    //! In-memory cluster that records every management call

    use super::*;
    use crate::domain::OverwriteDecision;
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;

    #[derive(Default)]
    struct State {
        calls: Vec<String>,
        applications: HashMap<String, ApplicationIdentity>,
        registered: HashSet<ApplicationIdentity>,
    }

    #[derive(Default)]
    pub struct FakeCluster {
        state: Mutex<State>,
        /// Target whose management call is rejected
        pub fail_target: Option<String>,
        pub unreachable: bool,
    }

    #[derive(Debug, Clone, PartialEq)]
    pub struct FakeConnection {
        pub parameters: AttributeMap,
        pub existing: bool,
    }

    impl FakeCluster {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn failing_on(target: &str) -> Self {
            Self {
                fail_target: Some(target.to_string()),
                ..Self::default()
            }
        }

        pub fn unreachable() -> Self {
            Self {
                unreachable: true,
                ..Self::default()
            }
        }

        pub fn with_application(self, name: &str, identity: ApplicationIdentity) -> Self {
            {
                let mut state = self.state.lock().unwrap();
                state.registered.insert(identity.clone());
                state.applications.insert(name.to_string(), identity);
            }
            self
        }

        pub fn calls(&self) -> Vec<String> {
            self.state.lock().unwrap().calls.clone()
        }

        pub fn application(&self, name: &str) -> Option<ApplicationIdentity> {
            self.state.lock().unwrap().applications.get(name).cloned()
        }

        pub fn is_registered(&self, identity: &ApplicationIdentity) -> bool {
            self.state.lock().unwrap().registered.contains(identity)
        }

        fn record(
            &self,
            call: String,
            request: &ApplicationRequest,
            operation: &str,
        ) -> Result<(), ClusterError> {
            self.state.lock().unwrap().calls.push(call);
            if self.fail_target.as_deref() == Some(request.target.as_str()) {
                return Err(ClusterError::operation_failed(
                    operation,
                    request.application_name.clone(),
                    "rejected by cluster",
                ));
            }
            Ok(())
        }
    }

    impl ClusterManagement for FakeCluster {
        type Connection = FakeConnection;

        fn existing_connection(&self) -> Result<FakeConnection, ClusterError> {
            Ok(FakeConnection {
                parameters: AttributeMap::new(),
                existing: true,
            })
        }

        async fn connect(&self, parameters: &AttributeMap) -> Result<FakeConnection, ClusterError> {
            self.state.lock().unwrap().calls.push("connect".to_string());
            if self.unreachable {
                return Err(ClusterError::Unreachable {
                    endpoint: "fake".to_string(),
                    message: "connection refused".to_string(),
                });
            }
            Ok(FakeConnection {
                parameters: parameters.clone(),
                existing: false,
            })
        }

        async fn create_application(
            &self,
            _connection: &FakeConnection,
            request: &ApplicationRequest,
        ) -> Result<(), ClusterError> {
            self.record(
                format!("create {}", request.application_name),
                request,
                "Create application",
            )?;

            let mut state = self.state.lock().unwrap();
            let existing = state.applications.get(&request.application_name);
            match request.overwrite_behavior.decide(existing, &request.identity) {
                OverwriteDecision::Reject(message) => Err(ClusterError::operation_failed(
                    "Create application",
                    request.application_name.clone(),
                    message,
                )),
                OverwriteDecision::Create | OverwriteDecision::ReplaceExisting => {
                    state.registered.insert(request.identity.clone());
                    state
                        .applications
                        .insert(request.application_name.clone(), request.identity.clone());
                    Ok(())
                }
            }
        }

        async fn register_application_type(
            &self,
            _connection: &FakeConnection,
            request: &ApplicationRequest,
        ) -> Result<(), ClusterError> {
            self.record(
                format!("register {}", request.identity),
                request,
                "Register application type",
            )?;
            self.state
                .lock()
                .unwrap()
                .registered
                .insert(request.identity.clone());
            Ok(())
        }

        async fn upgrade_application(
            &self,
            _connection: &FakeConnection,
            request: &ApplicationRequest,
            upgrade: &UpgradeSettings,
        ) -> Result<(), ClusterError> {
            self.record(
                format!("upgrade {} {}", request.application_name, upgrade.mode),
                request,
                "Upgrade application",
            )?;
            let mut state = self.state.lock().unwrap();
            state.registered.insert(request.identity.clone());
            state
                .applications
                .insert(request.application_name.clone(), request.identity.clone());
            Ok(())
        }
    }
}
