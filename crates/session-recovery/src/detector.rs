//! Failure detection
//!
//! The detector listens to the transport and call-control signal channels
//! and turns failure signals into recovery triggers. Recovery signals
//! (`Connected`, `Registered`) clear the service's unhealthy flag.
//!
//! A transport that drops while it reports its own `reconnecting` state is
//! only flagged: short hiccups belong to the transport's retry loop, and
//! recovery is reserved for failures a service cannot heal by itself.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::services::{CallControlSignal, ServiceHandles, ServiceId, Transport, TransportSignal};

/// Stable reasons attached to recovery triggers
pub mod reasons {
    pub const WEBSOCKET_DISCONNECTED: &str = "websocket_disconnected";
    pub const WEBSOCKET_FAILED: &str = "websocket_failed";
    pub const WEBSOCKET_MAX_ATTEMPTS: &str = "websocket_max_attempts";
    pub const SIP_REGISTRATION_FAILED: &str = "sip_registration_failed";
    pub const SIP_UNREGISTERED: &str = "sip_unregistered";
    pub const SIP_DISCONNECTED: &str = "sip_disconnected";
    pub const HEALTH_CHECK_FAILED: &str = "health_check_failed";
    pub const RETRY_AFTER_FAILURE: &str = "retry_after_failure";
    pub const FORCED: &str = "forced";
}

/// Entry points the detector drives on the orchestrator
pub trait RecoveryTrigger: Send + Sync + 'static {
    /// Request a recovery run; false when a guard rejected it
    fn trigger_recovery(&self, reason: &str) -> bool;

    fn mark_service_failed(&self, service: ServiceId);

    fn mark_service_restored(&self, service: ServiceId);
}

/// Owns the signal listener tasks for one orchestrator
pub struct FailureDetector {
    trigger: Arc<dyn RecoveryTrigger>,
    listeners: Mutex<Vec<JoinHandle<()>>>,
}

impl FailureDetector {
    /// Register listeners for every signalling service in `handles`
    pub fn start(handles: &ServiceHandles, trigger: Arc<dyn RecoveryTrigger>) -> Self {
        let mut listeners = Vec::new();

        if let Some(transport) = handles.transport.clone() {
            let rx = transport.subscribe();
            let trigger = trigger.clone();
            listeners.push(spawn_listener("transport", rx, move |signal| {
                on_transport_signal(signal, transport.as_ref(), trigger.as_ref())
            }));
        }

        if let Some(call_control) = handles.call_control.as_ref() {
            let rx = call_control.subscribe();
            let trigger = trigger.clone();
            listeners.push(spawn_listener("call_control", rx, move |signal| {
                on_call_control_signal(signal, trigger.as_ref())
            }));
        }

        debug!(listeners = listeners.len(), "Failure detector started");
        Self {
            trigger,
            listeners: Mutex::new(listeners),
        }
    }

    /// Manual trigger path for operator-forced retries
    pub fn request_recovery(&self, reason: &str) -> bool {
        info!(reason = reason, "Manual recovery requested");
        self.trigger.trigger_recovery(reason)
    }

    pub fn is_active(&self) -> bool {
        self.listeners.lock().iter().any(|listener| !listener.is_finished())
    }

    /// Remove every listener; safe to call repeatedly
    pub fn teardown(&self) {
        let listeners: Vec<_> = self.listeners.lock().drain(..).collect();
        if listeners.is_empty() {
            return;
        }
        for listener in &listeners {
            listener.abort();
        }
        debug!(listeners = listeners.len(), "Failure detector torn down");
    }
}

impl Drop for FailureDetector {
    fn drop(&mut self) {
        self.teardown();
    }
}

fn spawn_listener<S, F>(
    service: &'static str,
    mut rx: broadcast::Receiver<S>,
    mut on_signal: F,
) -> JoinHandle<()>
where
    S: Clone + Send + 'static,
    F: FnMut(S) + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(signal) => on_signal(signal),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(service = service, skipped = skipped, "Signal listener lagged");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!(service = service, "Signal channel closed, listener exiting");
                    break;
                }
            }
        }
    })
}

fn on_transport_signal(signal: TransportSignal, transport: &dyn Transport, trigger: &dyn RecoveryTrigger) {
    let reason = match signal {
        TransportSignal::Connected => {
            trigger.mark_service_restored(ServiceId::Transport);
            return;
        }
        TransportSignal::Disconnected => {
            if transport.status().reconnecting {
                trigger.mark_service_failed(ServiceId::Transport);
                debug!("Transport disconnected while self-reconnecting, leaving it to the transport");
                return;
            }
            reasons::WEBSOCKET_DISCONNECTED
        }
        TransportSignal::Failed => reasons::WEBSOCKET_FAILED,
        TransportSignal::MaxAttemptsReached => reasons::WEBSOCKET_MAX_ATTEMPTS,
    };

    warn!(signal = ?signal, "Transport failure detected");
    trigger.mark_service_failed(ServiceId::Transport);
    trigger.trigger_recovery(reason);
}

fn on_call_control_signal(signal: CallControlSignal, trigger: &dyn RecoveryTrigger) {
    let reason = match signal {
        CallControlSignal::Registered => {
            trigger.mark_service_restored(ServiceId::CallControl);
            return;
        }
        CallControlSignal::Unregistered => reasons::SIP_UNREGISTERED,
        CallControlSignal::RegistrationFailed => reasons::SIP_REGISTRATION_FAILED,
        CallControlSignal::Disconnected => reasons::SIP_DISCONNECTED,
    };

    warn!(signal = ?signal, "Call control failure detected");
    trigger.mark_service_failed(ServiceId::CallControl);
    trigger.trigger_recovery(reason);
}
