//! Per-service restoration protocol
//!
//! Each step first checks whether its service is already in the desired
//! state and returns immediately if so. Otherwise it issues the service's
//! action and blocks, with a timeout, until the service's predicate reports
//! success:
//!
//! | Service      | Action                                      | Awaited condition          |
//! |--------------|---------------------------------------------|----------------------------|
//! | Transport    | `connect()`                                 | connected                  |
//! | Monitoring   | `connect()` (re-attach to the transport)    | none, best effort          |
//! | CallControl  | `initialize(config)` with a fresh config    | connected and registered   |
//! | Presence     | `connect()`                                 | none                       |
//!
//! The action and the wait share one deadline per step, so a slow action
//! leaves only the remainder of the budget for the condition. All waits
//! observe a [`CancellationToken`] so reset and shutdown never leave a poll
//! loop behind.

use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::RecoveryConfig;
use crate::error::{RecoveryError, RecoveryResult};
use crate::services::{ServiceHandles, ServiceId};
use crate::session::CallControlConfig;

/// Poll `predicate` every `poll_interval` until it holds or `timeout` expires
///
/// The predicate is checked once immediately. On expiry the error names the
/// awaited `condition`; cancellation of `cancel` aborts the wait.
///
/// ```rust
/// use std::time::Duration;
/// use softphone_session_recovery::wait_for_condition;
/// use tokio_util::sync::CancellationToken;
///
/// # tokio_test::block_on(async {
/// let cancel = CancellationToken::new();
/// let result = wait_for_condition(
///     "link up",
///     || true,
///     Duration::from_secs(1),
///     Duration::from_millis(50),
///     &cancel,
/// )
/// .await;
/// assert!(result.is_ok());
/// # });
/// ```
pub async fn wait_for_condition<F>(
    condition: &str,
    predicate: F,
    timeout: Duration,
    poll_interval: Duration,
    cancel: &CancellationToken,
) -> RecoveryResult<()>
where
    F: FnMut() -> bool,
{
    poll_until(condition, predicate, Instant::now() + timeout, timeout, poll_interval, cancel).await
}

/// Poll against a fixed `deadline`; `budget` is the step timeout it was derived from
async fn poll_until<F>(
    condition: &str,
    mut predicate: F,
    deadline: Instant,
    budget: Duration,
    poll_interval: Duration,
    cancel: &CancellationToken,
) -> RecoveryResult<()>
where
    F: FnMut() -> bool,
{
    loop {
        if predicate() {
            return Ok(());
        }

        let now = Instant::now();
        if now >= deadline {
            warn!(condition = condition, timeout_ms = budget.as_millis() as u64, "Condition wait timed out");
            return Err(RecoveryError::ConditionTimeout {
                condition: condition.to_string(),
                timeout_ms: budget.as_millis() as u64,
            });
        }

        let nap = poll_interval.min(deadline - now);
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!(condition = condition, "Condition wait cancelled");
                return Err(RecoveryError::Cancelled {
                    operation: format!("wait for {}", condition),
                });
            }
            _ = sleep(nap) => {}
        }
    }
}

/// Run `future` with a time budget, mapping expiry to `OperationTimeout`
///
/// ```rust
/// use std::time::Duration;
/// use softphone_session_recovery::{with_timeout, RecoveryError};
///
/// # tokio_test::block_on(async {
/// let value = with_timeout("lookup", Duration::from_secs(1), async { Ok::<_, RecoveryError>(42) }).await;
/// assert_eq!(value, Ok(42));
/// # });
/// ```
pub async fn with_timeout<T, F>(
    operation_name: &str,
    timeout: Duration,
    future: F,
) -> RecoveryResult<T>
where
    F: Future<Output = RecoveryResult<T>>,
{
    match tokio::time::timeout(timeout, future).await {
        Ok(result) => result,
        Err(_) => {
            error!(
                operation = operation_name,
                timeout_ms = timeout.as_millis() as u64,
                "Operation timed out"
            );
            Err(RecoveryError::OperationTimeout {
                operation: operation_name.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            })
        }
    }
}

/// Outcome of a single restoration step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreOutcome {
    /// The service was down and has been brought back
    Restored,
    /// The service was already in the desired state
    AlreadyHealthy,
    /// No handle was registered for the service
    Skipped,
    /// A best-effort step failed and was ignored
    Degraded,
}

/// Executes the restoration protocol for one service at a time
#[derive(Debug, Clone)]
pub struct ServiceRestorer {
    handles: ServiceHandles,
    config: RecoveryConfig,
}

impl ServiceRestorer {
    pub fn new(handles: ServiceHandles, config: RecoveryConfig) -> Self {
        Self { handles, config }
    }

    /// Restore one service, raising if it cannot be brought back
    pub async fn restore(
        &self,
        service: ServiceId,
        cancel: &CancellationToken,
    ) -> RecoveryResult<RestoreOutcome> {
        if !self.handles.has(service) {
            debug!(service = %service, "No handle registered, skipping restoration");
            return Ok(RestoreOutcome::Skipped);
        }

        let outcome = match service {
            ServiceId::Transport => self.restore_transport(cancel).await?,
            ServiceId::Monitoring => self.restore_monitoring().await,
            ServiceId::CallControl => self.restore_call_control(cancel).await?,
            ServiceId::Presence => self.restore_presence().await?,
        };

        if outcome == RestoreOutcome::Restored {
            info!(service = %service, "Service restored");
        }
        Ok(outcome)
    }

    async fn restore_transport(&self, cancel: &CancellationToken) -> RecoveryResult<RestoreOutcome> {
        let Some(transport) = self.handles.transport.as_ref() else {
            return Ok(RestoreOutcome::Skipped);
        };
        if transport.is_connected() {
            return Ok(RestoreOutcome::AlreadyHealthy);
        }

        debug!("Reconnecting transport");
        let timeout = self.config.transport_timeout;
        let deadline = Instant::now() + timeout;
        with_timeout("transport connect", timeout, transport.connect()).await?;
        poll_until(
            "transport connected",
            || transport.is_connected(),
            deadline,
            timeout,
            self.config.condition_poll_interval,
            cancel,
        )
        .await?;
        Ok(RestoreOutcome::Restored)
    }

    /// Monitoring shares the transport's socket; a failure here is logged only
    async fn restore_monitoring(&self) -> RestoreOutcome {
        let Some(monitoring) = self.handles.monitoring.as_ref() else {
            return RestoreOutcome::Skipped;
        };
        if monitoring.is_connected() {
            return RestoreOutcome::AlreadyHealthy;
        }

        debug!("Re-attaching monitoring to transport");
        match with_timeout("monitoring connect", self.config.transport_timeout, monitoring.connect()).await {
            Ok(()) => RestoreOutcome::Restored,
            Err(e) => {
                warn!(error = %e, category = e.category(), "Monitoring restoration failed (non-critical)");
                RestoreOutcome::Degraded
            }
        }
    }

    async fn restore_call_control(&self, cancel: &CancellationToken) -> RecoveryResult<RestoreOutcome> {
        let Some(call_control) = self.handles.call_control.as_ref() else {
            return Ok(RestoreOutcome::Skipped);
        };
        if call_control.is_connected() && call_control.is_registered() {
            return Ok(RestoreOutcome::AlreadyHealthy);
        }

        let user_data = self
            .handles
            .session_store
            .user_data()
            .ok_or_else(|| RecoveryError::MissingSipConfiguration { field: "user".to_string() })?;
        let sip_config = CallControlConfig::from_user_data(&user_data)?;

        debug!(uri = %sip_config.uri, "Reinitializing call control");
        let timeout = self.config.call_control_timeout;
        let deadline = Instant::now() + timeout;
        with_timeout("call control initialize", timeout, call_control.initialize(sip_config)).await?;
        poll_until(
            "SIP connected and registered",
            || call_control.is_connected() && call_control.is_registered(),
            deadline,
            timeout,
            self.config.condition_poll_interval,
            cancel,
        )
        .await?;
        Ok(RestoreOutcome::Restored)
    }

    async fn restore_presence(&self) -> RecoveryResult<RestoreOutcome> {
        let Some(presence) = self.handles.presence.as_ref() else {
            return Ok(RestoreOutcome::Skipped);
        };
        if presence.is_connected() {
            return Ok(RestoreOutcome::AlreadyHealthy);
        }

        debug!("Reconnecting presence");
        with_timeout("presence connect", self.config.presence_timeout, presence.connect()).await?;
        Ok(RestoreOutcome::Restored)
    }
}
