//! System health aggregation
//!
//! The aggregator asks every registered service for its connectivity
//! predicate and folds the answers into one verdict. Two services get
//! special treatment:
//!
//! - a transport that is running its own reconnect backoff is reported as
//!   disconnected but does not make the system unhealthy, so recovery does
//!   not fight the transport's retry loop;
//! - monitoring is best-effort telemetry. Its outage is listed as an issue
//!   and never affects `is_healthy`.
//!
//! Services without a handle are not checked and report healthy.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::services::{ServiceHandles, ServiceId};

/// Per-service connectivity snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub auth: bool,
    pub transport: bool,
    pub call_control: bool,
    pub presence: bool,
    pub monitoring: bool,
}

impl Default for HealthStatus {
    fn default() -> Self {
        Self {
            auth: false,
            transport: false,
            call_control: false,
            presence: false,
            monitoring: false,
        }
    }
}

impl HealthStatus {
    pub fn service(&self, service: ServiceId) -> bool {
        match service {
            ServiceId::Transport => self.transport,
            ServiceId::Monitoring => self.monitoring,
            ServiceId::CallControl => self.call_control,
            ServiceId::Presence => self.presence,
        }
    }
}

/// Result of one health check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemHealth {
    pub is_healthy: bool,
    /// Human readable description of every problem found
    pub issues: Vec<String>,
    pub services: HealthStatus,
    /// Services found disconnected, critical or not
    pub unhealthy_services: Vec<ServiceId>,
}

/// Polls service predicates and publishes the latest [`HealthStatus`]
#[derive(Debug, Clone)]
pub struct HealthAggregator {
    handles: ServiceHandles,
    latest: Arc<RwLock<HealthStatus>>,
}

impl HealthAggregator {
    pub fn new(handles: ServiceHandles) -> Self {
        Self {
            handles,
            latest: Arc::new(RwLock::new(HealthStatus::default())),
        }
    }

    /// Latest published snapshot
    pub fn latest(&self) -> HealthStatus {
        *self.latest.read()
    }

    /// Run a full check and publish the resulting snapshot
    pub fn check_system_health(&self) -> SystemHealth {
        let mut issues = Vec::new();
        let mut unhealthy_services = Vec::new();
        let mut is_healthy = true;

        let store = &self.handles.session_store;
        let auth = store.auth_token().is_some() && store.user_data().is_some();
        if !auth {
            issues.push("Authentication missing".to_string());
            is_healthy = false;
        }

        let transport = match &self.handles.transport {
            Some(transport) => {
                let status = transport.status();
                let connected = transport.is_connected();
                if !connected {
                    unhealthy_services.push(ServiceId::Transport);
                    if status.reconnecting {
                        issues.push(format!(
                            "Transport reconnecting (attempt {})",
                            status.reconnect_attempts
                        ));
                    } else {
                        issues.push("Transport disconnected".to_string());
                        is_healthy = false;
                    }
                }
                connected
            }
            None => true,
        };

        let call_control = match &self.handles.call_control {
            Some(call_control) => {
                let connected = call_control.is_connected();
                let registered = call_control.is_registered();
                if !(connected && registered) {
                    unhealthy_services.push(ServiceId::CallControl);
                    issues.push(if connected {
                        "SIP not registered".to_string()
                    } else {
                        "SIP not connected".to_string()
                    });
                    is_healthy = false;
                }
                connected && registered
            }
            None => true,
        };

        let presence = match &self.handles.presence {
            Some(presence) => {
                let connected = presence.is_connected();
                if !connected {
                    unhealthy_services.push(ServiceId::Presence);
                    issues.push("Presence disconnected".to_string());
                    is_healthy = false;
                }
                connected
            }
            None => true,
        };

        let monitoring = match &self.handles.monitoring {
            Some(monitoring) => {
                let connected = monitoring.is_connected();
                if !connected {
                    unhealthy_services.push(ServiceId::Monitoring);
                    issues.push("Monitoring disconnected (non-critical)".to_string());
                }
                connected
            }
            None => true,
        };

        let services = HealthStatus {
            auth,
            transport,
            call_control,
            presence,
            monitoring,
        };
        *self.latest.write() = services;

        if is_healthy {
            trace!(issues = issues.len(), "System healthy");
        } else {
            debug!(issues = ?issues, "System unhealthy");
        }

        SystemHealth {
            is_healthy,
            issues,
            services,
            unhealthy_services,
        }
    }
}
