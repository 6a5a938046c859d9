//! Recovery events
//!
//! Every phase change and outcome is published as a [`RecoveryEvent`] on a
//! broadcast channel. Hosts either consume the channel directly
//! ([`RecoveryOrchestrator::subscribe`](crate::RecoveryOrchestrator::subscribe),
//! [`EventStream`]) or implement [`RecoveryEventHandler`] and hand it to
//! [`spawn_event_dispatcher`].
//!
//! # Usage Examples
//!
//! ```rust
//! use softphone_session_recovery::events::{EventPriority, RecoveryEvent};
//!
//! let event = RecoveryEvent::Failed { reason: "max_attempts_reached".to_string() };
//! assert_eq!(event.priority(), EventPriority::Critical);
//! assert_eq!(event.name(), "recovery:failed");
//! assert!(event.to_json().contains("\"type\":\"failed\""));
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, warn};

use crate::health::HealthStatus;
use crate::services::ServiceId;
use crate::state::RecoveryPhase;

/// Stream adapter over the recovery event channel
pub type EventStream = BroadcastStream<RecoveryEvent>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventPriority {
    /// Routine progress (phase changes)
    Low,
    /// Attempt lifecycle (started, service restored)
    Normal,
    /// Outcomes the UI should surface (completed, attempt failed)
    High,
    /// Outcomes that need the user or an operator
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RecoveryEvent {
    /// A recovery attempt was accepted
    Started {
        attempt: u32,
        reason: String,
        failed_services: Vec<ServiceId>,
    },
    PhaseChanged {
        phase: RecoveryPhase,
    },
    ServiceRestored {
        service: ServiceId,
    },
    Completed {
        health_status: HealthStatus,
        /// Finalized by the periodic health check rather than the run itself
        short_circuited: bool,
    },
    /// An attempt failed; `retry_in_ms` is set when a retry was scheduled
    Error {
        error: String,
        attempt: u32,
        retry_in_ms: Option<u64>,
    },
    /// Automatic recovery stopped; `force_recovery` or a fresh login is required
    Failed {
        reason: String,
    },
    /// Credentials are gone; the host must redirect to login
    AuthRequired {
        reason: String,
    },
}

impl RecoveryEvent {
    pub fn priority(&self) -> EventPriority {
        match self {
            RecoveryEvent::PhaseChanged { .. } => EventPriority::Low,
            RecoveryEvent::Started { .. } | RecoveryEvent::ServiceRestored { .. } => EventPriority::Normal,
            RecoveryEvent::Completed { .. } | RecoveryEvent::Error { .. } => EventPriority::High,
            RecoveryEvent::Failed { .. } | RecoveryEvent::AuthRequired { .. } => EventPriority::Critical,
        }
    }

    /// Stable event name for operator tooling
    pub fn name(&self) -> &'static str {
        match self {
            RecoveryEvent::Started { .. } => "recovery:started",
            RecoveryEvent::PhaseChanged { .. } => "recovery:phase",
            RecoveryEvent::ServiceRestored { .. } => "recovery:service_restored",
            RecoveryEvent::Completed { .. } => "recovery:completed",
            RecoveryEvent::Error { .. } => "recovery:error",
            RecoveryEvent::Failed { .. } => "recovery:failed",
            RecoveryEvent::AuthRequired { .. } => "recovery:auth_required",
        }
    }

    /// Whether this event ends a recovery attempt
    pub fn is_outcome(&self) -> bool {
        matches!(
            self,
            RecoveryEvent::Completed { .. }
                | RecoveryEvent::Error { .. }
                | RecoveryEvent::Failed { .. }
                | RecoveryEvent::AuthRequired { .. }
        )
    }

    pub fn to_json(&self) -> String {
        // Every field is a plain string, number or enum; serialization cannot fail
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Observer interface for recovery events
///
/// Only `on_auth_required` must be implemented: redirecting to login is
/// the one reaction a host cannot skip.
#[async_trait]
pub trait RecoveryEventHandler: Send + Sync {
    async fn on_auth_required(&self, reason: String);

    async fn on_started(&self, _attempt: u32, _reason: String, _failed_services: Vec<ServiceId>) {}

    async fn on_phase_changed(&self, _phase: RecoveryPhase) {}

    async fn on_service_restored(&self, _service: ServiceId) {}

    async fn on_completed(&self, _health_status: HealthStatus, _short_circuited: bool) {}

    async fn on_error(&self, _error: String, _attempt: u32, _retry_in_ms: Option<u64>) {}

    /// Automatic recovery gave up; present a manual retry affordance
    async fn on_failed(&self, _reason: String) {}

    /// Catch-all dispatch; override to see every event in one place
    async fn on_recovery_event(&self, event: RecoveryEvent) {
        match event {
            RecoveryEvent::Started { attempt, reason, failed_services } => {
                self.on_started(attempt, reason, failed_services).await
            }
            RecoveryEvent::PhaseChanged { phase } => self.on_phase_changed(phase).await,
            RecoveryEvent::ServiceRestored { service } => self.on_service_restored(service).await,
            RecoveryEvent::Completed { health_status, short_circuited } => {
                self.on_completed(health_status, short_circuited).await
            }
            RecoveryEvent::Error { error, attempt, retry_in_ms } => {
                self.on_error(error, attempt, retry_in_ms).await
            }
            RecoveryEvent::Failed { reason } => self.on_failed(reason).await,
            RecoveryEvent::AuthRequired { reason } => self.on_auth_required(reason).await,
        }
    }
}

/// Forward every event from `receiver` to `handler` until the channel closes
pub fn spawn_event_dispatcher(
    mut receiver: broadcast::Receiver<RecoveryEvent>,
    handler: Arc<dyn RecoveryEventHandler>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(event) => handler.on_recovery_event(event).await,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped = skipped, "Recovery event handler lagged, events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Recovery event channel closed, dispatcher exiting");
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingHandler {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl RecoveryEventHandler for RecordingHandler {
        async fn on_auth_required(&self, reason: String) {
            self.seen.lock().push(format!("auth:{}", reason));
        }

        async fn on_phase_changed(&self, phase: RecoveryPhase) {
            self.seen.lock().push(format!("phase:{}", phase));
        }

        async fn on_failed(&self, reason: String) {
            self.seen.lock().push(format!("failed:{}", reason));
        }
    }

    #[test]
    fn test_priorities() {
        assert_eq!(
            RecoveryEvent::PhaseChanged { phase: RecoveryPhase::Verifying }.priority(),
            EventPriority::Low
        );
        assert_eq!(
            RecoveryEvent::AuthRequired { reason: "missing auth token".to_string() }.priority(),
            EventPriority::Critical
        );
        assert!(EventPriority::Critical > EventPriority::High);
    }

    #[test]
    fn test_json_shape() {
        let event = RecoveryEvent::Started {
            attempt: 2,
            reason: "sip_registration_failed".to_string(),
            failed_services: vec![ServiceId::CallControl],
        };
        let value: serde_json::Value = serde_json::from_str(&event.to_json()).unwrap();
        assert_eq!(value["type"], "started");
        assert_eq!(value["attempt"], 2);
        assert_eq!(value["failed_services"][0], "call_control");
    }

    #[test]
    fn test_outcomes() {
        assert!(RecoveryEvent::Failed { reason: "x".to_string() }.is_outcome());
        assert!(!RecoveryEvent::ServiceRestored { service: ServiceId::Transport }.is_outcome());
    }

    #[tokio::test]
    async fn test_dispatcher_routes_and_exits_on_close() {
        let (tx, rx) = broadcast::channel(8);
        let handler = Arc::new(RecordingHandler::default());
        let task = spawn_event_dispatcher(rx, handler.clone());

        tx.send(RecoveryEvent::PhaseChanged { phase: RecoveryPhase::Validating }).unwrap();
        tx.send(RecoveryEvent::ServiceRestored { service: ServiceId::Transport }).unwrap();
        tx.send(RecoveryEvent::AuthRequired { reason: "missing auth token".to_string() }).unwrap();
        tx.send(RecoveryEvent::Failed { reason: "max_attempts_reached".to_string() }).unwrap();
        drop(tx);

        task.await.unwrap();
        assert_eq!(
            *handler.seen.lock(),
            vec![
                "phase:validating".to_string(),
                "auth:missing auth token".to_string(),
                "failed:max_attempts_reached".to_string(),
            ]
        );
    }
}
