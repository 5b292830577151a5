//! # Publish Observability
//!
//! Structured events for publish runs, written to stdout as JSON lines
//! prefixed with `SFDEPLOY_EVENT:` so log shippers can pick them out of
//! the human-readable output.
//!
//! ```text
//! SFDEPLOY_EVENT:{"event_type":"OperationCompleted","timestamp":"...","target":"AdminApp",...}
//! ```

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Event prefix for log collectors
const EVENT_PREFIX: &str = "SFDEPLOY_EVENT:";

/// Publish event types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type")]
pub enum PublishEvent {
    PublishStarted(PublishStartedEvent),
    OperationCompleted(OperationEvent),
    OperationFailed(OperationFailedEvent),
    PublishCompleted(PublishCompletedEvent),
    PublishFailed(PublishFailedEvent),
}

/// Common fields for all events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMetadata {
    /// Timestamp in RFC3339 format
    pub timestamp: String,
    /// Publish profile name
    pub profile: String,
    /// Build configuration (Debug, Release)
    pub configuration: String,
    /// Hostname of the machine running the publish
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
}

impl EventMetadata {
    pub fn new(profile: impl Into<String>, configuration: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            profile: profile.into(),
            configuration: configuration.into(),
            hostname: std::env::var("HOSTNAME").ok(),
        }
    }

    fn now(&self) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishStartedEvent {
    #[serde(flatten)]
    pub metadata: EventMetadata,
    /// Targets in execution order
    pub targets: Vec<String>,
    pub overwrite_behavior: String,
    pub reuse_connection: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationEvent {
    #[serde(flatten)]
    pub metadata: EventMetadata,
    pub target: String,
    pub action: String,
    pub duration_secs: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationFailedEvent {
    #[serde(flatten)]
    pub operation: OperationEvent,
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishCompletedEvent {
    #[serde(flatten)]
    pub metadata: EventMetadata,
    pub duration_secs: f64,
    pub operations: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishFailedEvent {
    #[serde(flatten)]
    pub metadata: EventMetadata,
    pub duration_secs: f64,
    /// Target whose operation failed, if the failure happened during execution
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_target: Option<String>,
    pub error: String,
}

/// Emits a structured event as JSON to stdout
pub fn emit_event(event: PublishEvent) {
    match serde_json::to_string(&event) {
        Ok(json) => {
            println!("{}{}", EVENT_PREFIX, json);
        }
        Err(e) => {
            tracing::error!("Failed to serialize event: {}", e);
        }
    }
}

/// Publish run tracker
pub struct PublishTracker {
    metadata: EventMetadata,
    start: Instant,
}

impl PublishTracker {
    pub fn new(metadata: EventMetadata) -> Self {
        Self {
            metadata,
            start: Instant::now(),
        }
    }

    pub fn emit_started(
        &self,
        targets: Vec<String>,
        overwrite_behavior: String,
        reuse_connection: bool,
    ) {
        emit_event(PublishEvent::PublishStarted(PublishStartedEvent {
            metadata: self.metadata.now(),
            targets,
            overwrite_behavior,
            reuse_connection,
        }));
    }

    fn operation(&self, target: &str, action: &str, duration_secs: f64) -> OperationEvent {
        OperationEvent {
            metadata: self.metadata.now(),
            target: target.to_string(),
            action: action.to_string(),
            duration_secs,
        }
    }

    pub fn emit_operation_completed(&self, target: &str, action: &str, duration_secs: f64) {
        emit_event(PublishEvent::OperationCompleted(
            self.operation(target, action, duration_secs),
        ));
    }

    pub fn emit_operation_failed(
        &self,
        target: &str,
        action: &str,
        duration_secs: f64,
        error: String,
    ) {
        emit_event(PublishEvent::OperationFailed(OperationFailedEvent {
            operation: self.operation(target, action, duration_secs),
            error,
        }));
    }

    pub fn emit_completed(self, operations: usize) {
        emit_event(PublishEvent::PublishCompleted(PublishCompletedEvent {
            metadata: self.metadata.now(),
            duration_secs: self.start.elapsed().as_secs_f64(),
            operations,
        }));
    }

    pub fn emit_failed(self, failed_target: Option<String>, error: String) {
        emit_event(PublishEvent::PublishFailed(PublishFailedEvent {
            metadata: self.metadata.now(),
            duration_secs: self.start.elapsed().as_secs_f64(),
            failed_target,
            error,
        }));
    }
}
