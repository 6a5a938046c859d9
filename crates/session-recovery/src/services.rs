//! Capability contracts for the services recovery coordinates
//!
//! Recovery does not own any connection. It is loaned one handle per
//! service role and drives them through these traits:
//!
//! - [`Transport`] - the persistent signaling channel (WebSocket). Everything
//!   else rides on it.
//! - [`CallControl`] - SIP user agent; healthy only when connected *and*
//!   registered.
//! - [`Monitoring`] - best-effort call-event feed sharing the transport's
//!   socket. Never session critical.
//! - [`Presence`] - agent availability and profile lookups against the
//!   call-distribution backend.
//!
//! Predicates are synchronous snapshots of connectivity; actions are async.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::error::RecoveryResult;
use crate::session::{CallControlConfig, SessionStore};

/// Identifier of a service recovery can restore
///
/// The declaration order is the restoration order: the transport first,
/// monitoring as soon as the transport is up, then SIP registration, then
/// presence which needs a registered user agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceId {
    Transport,
    Monitoring,
    CallControl,
    Presence,
}

impl ServiceId {
    /// Fixed restoration priority
    pub const RESTORE_ORDER: [ServiceId; 4] = [
        ServiceId::Transport,
        ServiceId::Monitoring,
        ServiceId::CallControl,
        ServiceId::Presence,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceId::Transport => "transport",
            ServiceId::Monitoring => "monitoring",
            ServiceId::CallControl => "call_control",
            ServiceId::Presence => "presence",
        }
    }

    /// Whether this service's health counts toward the system verdict
    pub fn is_critical(&self) -> bool {
        !matches!(self, ServiceId::Monitoring)
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connection lifecycle signals emitted by the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportSignal {
    Connected,
    Disconnected,
    Failed,
    /// The transport exhausted its own reconnection attempts
    MaxAttemptsReached,
}

/// Registration lifecycle signals emitted by call control
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallControlSignal {
    Registered,
    Unregistered,
    RegistrationFailed,
    Disconnected,
}

/// Self-reported transport status
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportStatus {
    pub connected: bool,
    /// The transport is running its own reconnect backoff
    pub reconnecting: bool,
    pub reconnect_attempts: u32,
}

#[async_trait]
pub trait Transport: Send + Sync {
    fn is_connected(&self) -> bool;

    fn status(&self) -> TransportStatus;

    /// Start connecting; completion is observed through `is_connected`
    async fn connect(&self) -> RecoveryResult<()>;

    fn subscribe(&self) -> broadcast::Receiver<TransportSignal>;
}

#[async_trait]
pub trait CallControl: Send + Sync {
    fn is_connected(&self) -> bool;

    fn is_registered(&self) -> bool;

    /// Tear down and rebuild the user agent with a fresh configuration
    async fn initialize(&self, config: CallControlConfig) -> RecoveryResult<()>;

    fn subscribe(&self) -> broadcast::Receiver<CallControlSignal>;
}

#[async_trait]
pub trait Monitoring: Send + Sync {
    fn is_connected(&self) -> bool;

    /// Re-attach to the transport's socket; never opens a socket of its own
    async fn connect(&self) -> RecoveryResult<()>;
}

/// Agent profile as served by the presence backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentProfile {
    pub agent_id: String,
    pub extension: String,
    pub name: Option<String>,
    pub status: Option<String>,
}

#[async_trait]
pub trait Presence: Send + Sync {
    fn is_connected(&self) -> bool;

    /// Connect the presence channel; services without one keep the default
    async fn connect(&self) -> RecoveryResult<()> {
        Ok(())
    }

    async fn agent_details_by_extension(&self, extension: &str) -> RecoveryResult<AgentProfile>;
}

/// Handles loaned to the orchestrator at initialization
///
/// Only the session store is mandatory; absent services are skipped by
/// both health checks and restoration.
#[derive(Clone)]
pub struct ServiceHandles {
    pub session_store: Arc<dyn SessionStore>,
    pub transport: Option<Arc<dyn Transport>>,
    pub call_control: Option<Arc<dyn CallControl>>,
    pub monitoring: Option<Arc<dyn Monitoring>>,
    pub presence: Option<Arc<dyn Presence>>,
}

impl ServiceHandles {
    pub fn new(session_store: Arc<dyn SessionStore>) -> Self {
        Self {
            session_store,
            transport: None,
            call_control: None,
            monitoring: None,
            presence: None,
        }
    }

    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn with_call_control(mut self, call_control: Arc<dyn CallControl>) -> Self {
        self.call_control = Some(call_control);
        self
    }

    pub fn with_monitoring(mut self, monitoring: Arc<dyn Monitoring>) -> Self {
        self.monitoring = Some(monitoring);
        self
    }

    pub fn with_presence(mut self, presence: Arc<dyn Presence>) -> Self {
        self.presence = Some(presence);
        self
    }

    pub fn has(&self, service: ServiceId) -> bool {
        match service {
            ServiceId::Transport => self.transport.is_some(),
            ServiceId::Monitoring => self.monitoring.is_some(),
            ServiceId::CallControl => self.call_control.is_some(),
            ServiceId::Presence => self.presence.is_some(),
        }
    }
}

impl fmt::Debug for ServiceHandles {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceHandles")
            .field("session_store", &"<session store>")
            .field("transport", &self.transport.is_some())
            .field("call_control", &self.call_control.is_some())
            .field("monitoring", &self.monitoring.is_some())
            .field("presence", &self.presence.is_some())
            .finish()
    }
}
