//! # Softphone Session Recovery
//!
//! Keeps a softphone usable across network blips, backend restarts and SIP
//! registration loss. The crate watches the services a softphone session is
//! built from:
//! - **Transport**: the persistent signaling channel (WebSocket)
//! - **Call control**: the SIP user agent and its registration
//! - **Presence**: agent availability against the call-distribution backend
//! - **Monitoring**: best-effort call-event telemetry
//!
//! When one of them fails it restores them in dependency order, verifies
//! the result, and tells the host what happened through events.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use softphone_session_recovery::{
//!     InMemorySessionStore, RecoveryConfig, RecoveryEvent, RecoveryOrchestrator, ServiceHandles,
//!     SessionContext,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(InMemorySessionStore::new());
//!     let context = SessionContext::new();
//!
//!     // Plug in the host's transport, SIP user agent and presence client here
//!     let handles = ServiceHandles::new(store);
//!
//!     let orchestrator = RecoveryOrchestrator::new(RecoveryConfig::default())?;
//!     orchestrator.initialize(handles, context)?;
//!
//!     let mut events = orchestrator.subscribe();
//!     while let Ok(event) = events.recv().await {
//!         if let RecoveryEvent::AuthRequired { reason } = event {
//!             println!("redirecting to login: {}", reason);
//!             break;
//!         }
//!     }
//!
//!     orchestrator.destroy();
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`FailureDetector`] turns service signals into recovery triggers
//! - [`HealthAggregator`] folds service predicates into one health verdict
//! - [`ServiceRestorer`] brings one service back and waits for it to settle
//! - [`RecoveryOrchestrator`] owns the state machine, retries and events
//!
//! Recovery is single-flight: concurrent triggers are dropped, never queued.
//! Missing credentials are never retried; they hand control back to the
//! login flow through [`RecoveryEvent::AuthRequired`].

pub mod config;
pub mod detector;
pub mod error;
pub mod events;
pub mod health;
pub mod logging;
pub mod orchestrator;
pub mod restorer;
pub mod services;
pub mod session;
pub mod state;

// Re-export main types
pub use config::RecoveryConfig;
pub use detector::{reasons, FailureDetector, RecoveryTrigger};
pub use error::{RecoveryError, RecoveryResult};
pub use events::{spawn_event_dispatcher, EventPriority, EventStream, RecoveryEvent, RecoveryEventHandler};
pub use health::{HealthAggregator, HealthStatus, SystemHealth};
pub use logging::{parse_log_level, setup_logging, LoggingConfig, RECOVERY_LOG_TARGET};
pub use orchestrator::RecoveryOrchestrator;
pub use restorer::{wait_for_condition, with_timeout, RestoreOutcome, ServiceRestorer};
pub use services::{
    AgentProfile, CallControl, CallControlSignal, Monitoring, Presence, ServiceHandles, ServiceId, Transport,
    TransportSignal, TransportStatus,
};
pub use session::{
    CallControlConfig, InMemorySessionStore, SessionContext, SessionStore, SipSettings, UserData, UserProfile,
};
pub use state::{RecoveryPhase, RecoveryStats, RecoveryStatus};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
