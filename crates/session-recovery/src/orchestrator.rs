//! Recovery orchestrator
//!
//! The orchestrator owns the [`RecoveryState`] and is the single entry point
//! for starting a recovery run. Two producers feed it: the
//! [`FailureDetector`]'s signal listeners and the periodic health monitor.
//! Both go through the same guarded trigger, so at most one run executes at
//! a time and concurrent triggers are dropped rather than queued.
//!
//! A run executes four phases in order:
//!
//! 1. **Validate** - credentials, profile and call-control settings must be
//!    present. Anything missing is fatal: the session is cleared and
//!    [`RecoveryEvent::AuthRequired`] is published.
//! 2. **Restore** - services are restored one after another in
//!    [`ServiceId::RESTORE_ORDER`]; the first error aborts the run.
//! 3. **Verify** - a full health check must come back healthy.
//! 4. **Complete** - unhealthy flags and the attempt counter are cleared and
//!    the agent profile is refreshed on a best-effort basis.
//!
//! A failed run schedules one delayed retry using exponential backoff until
//! `max_attempts` is reached, after which only [`RecoveryOrchestrator::force_recovery`]
//! or a fresh login restarts recovery.
//!
//! Each run carries an id and a cancellation token. Only the active run may
//! finalize. The health monitor's early completion cancels the run's
//! in-flight restore but keeps the run active until `Completed` is published;
//! `reset()` and `destroy()` release the run outright. Either way a late
//! outcome from the superseded work is discarded instead of finalizing twice.
//!
//! # Usage Examples
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use softphone_session_recovery::{
//!     InMemorySessionStore, RecoveryConfig, RecoveryOrchestrator, ServiceHandles, SessionContext,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(InMemorySessionStore::new());
//! let context = SessionContext::new();
//!
//! let orchestrator = RecoveryOrchestrator::new(RecoveryConfig::default())?;
//! orchestrator.initialize(ServiceHandles::new(store), context.clone())?;
//!
//! let mut events = orchestrator.subscribe();
//! if orchestrator.trigger_recovery("operator_request", &context) {
//!     while let Ok(event) = events.recv().await {
//!         println!("{}", event.to_json());
//!         if event.is_outcome() {
//!             break;
//!         }
//!     }
//! }
//!
//! orchestrator.destroy();
//! # Ok(())
//! # }
//! ```

use std::sync::{Arc, Weak};

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{sleep, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

use crate::config::RecoveryConfig;
use crate::detector::{reasons, FailureDetector, RecoveryTrigger};
use crate::error::{RecoveryError, RecoveryResult};
use crate::events::{EventStream, RecoveryEvent};
use crate::health::{HealthAggregator, HealthStatus, SystemHealth};
use crate::restorer::{with_timeout, RestoreOutcome, ServiceRestorer};
use crate::services::{AgentProfile, ServiceHandles, ServiceId};
use crate::session::{CallControlConfig, SessionContext};
use crate::state::{ActiveRun, RecoveryPhase, RecoveryState, RecoveryStats, RecoveryStatus};

/// Where a trigger came from; decides which guards apply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TriggerSource {
    /// Failure signal, health monitor or host request
    Automatic,
    /// The scheduled backoff retry firing
    Retry,
    /// `force_recovery`
    Forced,
}

/// Everything `initialize` wires up, shared with running tasks
struct Components {
    handles: ServiceHandles,
    health: HealthAggregator,
    restorer: ServiceRestorer,
    context: SessionContext,
}

#[derive(Default)]
struct BackgroundTasks {
    detector: Option<FailureDetector>,
    health_monitor: Option<JoinHandle<()>>,
    retry: Option<JoinHandle<()>>,
}

struct OrchestratorInner {
    config: RecoveryConfig,
    state: Mutex<RecoveryState>,
    components: RwLock<Option<Arc<Components>>>,
    events: broadcast::Sender<RecoveryEvent>,
    tasks: Mutex<BackgroundTasks>,
    shutdown: CancellationToken,
}

/// Coordinates detection, restoration and verification of softphone services
///
/// Cheap to clone; clones drive the same orchestrator. Every method that
/// spawns work (`initialize`, `trigger_recovery`, `force_recovery`) must be
/// called from within a Tokio runtime.
#[derive(Clone)]
pub struct RecoveryOrchestrator {
    inner: Arc<OrchestratorInner>,
}

impl std::fmt::Debug for RecoveryOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("RecoveryOrchestrator")
            .field("phase", &state.phase)
            .field("attempt", &state.attempt)
            .field("is_recovering", &state.is_recovering)
            .field("initialized", &self.inner.components.read().is_some())
            .finish()
    }
}

impl RecoveryOrchestrator {
    pub fn new(config: RecoveryConfig) -> RecoveryResult<Self> {
        config.validate()?;
        let (events, _) = broadcast::channel(config.event_channel_capacity);

        Ok(Self {
            inner: Arc::new(OrchestratorInner {
                config,
                state: Mutex::new(RecoveryState::default()),
                components: RwLock::new(None),
                events,
                tasks: Mutex::new(BackgroundTasks::default()),
                shutdown: CancellationToken::new(),
            }),
        })
    }

    /// Wire the service handles, start failure detection and the health monitor
    pub fn initialize(&self, handles: ServiceHandles, context: SessionContext) -> RecoveryResult<()> {
        let inner = &self.inner;
        if inner.state.lock().destroyed {
            return Err(RecoveryError::internal("recovery orchestrator has been destroyed"));
        }

        {
            let mut components = inner.components.write();
            if components.is_some() {
                return Err(RecoveryError::invalid_config("service_handles", "already initialized"));
            }
            *components = Some(Arc::new(Components {
                health: HealthAggregator::new(handles.clone()),
                restorer: ServiceRestorer::new(handles.clone(), inner.config.clone()),
                handles: handles.clone(),
                context,
            }));
        }

        let trigger = Arc::new(OrchestratorTrigger {
            inner: Arc::downgrade(inner),
        });
        let detector = FailureDetector::start(&handles, trigger);
        let health_monitor = spawn_health_monitor(
            Arc::downgrade(inner),
            inner.config.health_check_interval,
            inner.shutdown.clone(),
        );

        let mut tasks = inner.tasks.lock();
        tasks.detector = Some(detector);
        tasks.health_monitor = Some(health_monitor);

        info!(
            handles = ?handles,
            max_attempts = inner.config.max_attempts,
            health_check_interval_ms = inner.config.health_check_interval.as_millis() as u64,
            "Recovery orchestrator initialized"
        );
        Ok(())
    }

    /// Start a recovery run unless a guard rejects it
    ///
    /// Returns false, without touching the attempt counter, when a login or
    /// logout is in progress, a run is already executing, a backoff retry is
    /// pending, or `max_attempts` has been reached.
    pub fn trigger_recovery(&self, reason: &str, context: &SessionContext) -> bool {
        self.inner.trigger(reason, context, TriggerSource::Automatic)
    }

    /// Reset the attempt counter, cancel any pending retry and trigger
    ///
    /// Still refused while a run is executing or authentication is in progress.
    pub fn force_recovery(&self, context: &SessionContext) -> bool {
        debug!("Forcing recovery");
        self.inner.trigger(reasons::FORCED, context, TriggerSource::Forced)
    }

    /// Run a health check now and publish the result
    pub fn check_system_health(&self) -> SystemHealth {
        match self.inner.components() {
            Some(components) => components.health.check_system_health(),
            None => SystemHealth {
                is_healthy: false,
                issues: vec![RecoveryError::NotInitialized.to_string()],
                services: HealthStatus::default(),
                unhealthy_services: Vec::new(),
            },
        }
    }

    pub fn status(&self) -> RecoveryStatus {
        let health_status = self
            .inner
            .components()
            .map(|components| components.health.latest())
            .unwrap_or_default();
        let state = self.inner.state.lock();

        RecoveryStatus {
            phase: state.phase,
            is_recovering: state.is_recovering,
            attempt: state.attempt,
            max_attempts: self.inner.config.max_attempts,
            retry_pending: state.retry_pending,
            last_recovery_timestamp: state.last_recovery_timestamp,
            failed_services: state.failed_services.iter().copied().collect(),
            health_status,
            agent_profile: state.agent_profile.clone(),
        }
    }

    pub fn stats(&self) -> RecoveryStats {
        self.inner.state.lock().stats.clone()
    }

    pub fn config(&self) -> &RecoveryConfig {
        &self.inner.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RecoveryEvent> {
        self.inner.events.subscribe()
    }

    pub fn event_stream(&self) -> EventStream {
        EventStream::new(self.inner.events.subscribe())
    }

    /// Flag a service as unhealthy
    pub fn mark_service_failed(&self, service: ServiceId) {
        self.inner.mark_service_failed(service);
    }

    /// Clear a service's unhealthy flag after confirmed restoration
    pub fn mark_service_restored(&self, service: ServiceId) {
        self.inner.mark_service_restored(service);
    }

    /// Return to `idle`, cancelling any in-flight run and pending retry
    ///
    /// Listeners and the health monitor keep running. Called on logout.
    pub fn reset(&self) {
        self.inner.reset();
    }

    /// Tear everything down; later triggers are refused. Idempotent.
    pub fn destroy(&self) {
        self.inner.destroy();
    }
}

impl OrchestratorInner {
    fn components(&self) -> Option<Arc<Components>> {
        self.components.read().clone()
    }

    fn emit(&self, event: RecoveryEvent) {
        trace!(event = event.name(), "Publishing recovery event");
        // No subscribers is not an error
        let _ = self.events.send(event);
    }

    fn mark_service_failed(&self, service: ServiceId) {
        if self.state.lock().failed_services.insert(service) {
            debug!(service = %service, "Service marked unhealthy");
        }
    }

    fn mark_service_restored(&self, service: ServiceId) {
        if self.state.lock().failed_services.remove(&service) {
            debug!(service = %service, "Service marked healthy");
        }
    }

    /// Cheap pre-check so the health monitor does not spam dropped triggers
    fn accepts_automatic_trigger(&self) -> bool {
        let state = self.state.lock();
        !state.destroyed
            && !state.is_recovering
            && !state.retry_pending
            && state.attempt < self.config.max_attempts
    }

    fn trigger(self: &Arc<Self>, reason: &str, context: &SessionContext, source: TriggerSource) -> bool {
        let Some(components) = self.components() else {
            debug!(reason = reason, "Recovery trigger ignored, orchestrator not initialized");
            return false;
        };

        let (run_id, cancel, attempt, failed_services) = {
            let mut state = self.state.lock();

            let rejection = if state.destroyed {
                Some("orchestrator destroyed")
            } else if context.auth_in_progress() {
                Some("authentication in progress")
            } else if state.is_recovering {
                Some("recovery already in progress")
            } else if source == TriggerSource::Forced {
                None
            } else if state.attempt >= self.config.max_attempts {
                Some("max attempts reached")
            } else if state.retry_pending && source == TriggerSource::Automatic {
                Some("retry already scheduled")
            } else {
                None
            };
            if let Some(rejection) = rejection {
                state.stats.dropped_triggers += 1;
                info!(
                    reason = reason,
                    rejection = rejection,
                    attempt = state.attempt,
                    "Recovery trigger dropped"
                );
                return false;
            }

            // A forced run starts a fresh attempt budget and supersedes any scheduled retry
            if source == TriggerSource::Forced {
                state.attempt = 0;
            }

            let run_id = Uuid::new_v4();
            let cancel = self.shutdown.child_token();
            state.attempt += 1;
            state.is_recovering = true;
            state.retry_pending = false;
            state.phase = RecoveryPhase::Validating;
            state.last_recovery_timestamp = Some(Utc::now());
            state.active_run = Some(ActiveRun {
                id: run_id,
                cancel: cancel.clone(),
            });
            state.stats.recoveries_started += 1;

            (run_id, cancel, state.attempt, state.failed_services.iter().copied().collect::<Vec<_>>())
        };

        if source == TriggerSource::Forced {
            self.abort_retry_task();
        }

        info!(
            reason = reason,
            attempt = attempt,
            max_attempts = self.config.max_attempts,
            source = ?source,
            failed_services = ?failed_services,
            "Recovery started"
        );
        self.emit(RecoveryEvent::Started {
            attempt,
            reason: reason.to_string(),
            failed_services,
        });
        self.emit(RecoveryEvent::PhaseChanged {
            phase: RecoveryPhase::Validating,
        });

        let inner = Arc::clone(self);
        tokio::spawn(async move {
            inner.run_recovery(run_id, cancel, components).await;
        });
        true
    }

    async fn run_recovery(self: Arc<Self>, run_id: Uuid, cancel: CancellationToken, components: Arc<Components>) {
        match self.execute_phases(run_id, &cancel, &components).await {
            Ok(health) => {
                self.complete_recovery(run_id, health.services, false, &components).await;
            }
            Err(e) => self.fail_recovery(run_id, e, &components),
        }
    }

    async fn execute_phases(
        &self,
        run_id: Uuid,
        cancel: &CancellationToken,
        components: &Components,
    ) -> RecoveryResult<SystemHealth> {
        self.validate_session(components)?;

        self.advance(run_id, RecoveryPhase::Reconnecting)?;
        let restore = self.restore_services(components, cancel);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(RecoveryError::Cancelled { operation: "restore phase".to_string() });
            }
            result = with_timeout("restore phase", self.config.restore_phase_timeout, restore) => result?,
        }

        self.advance(run_id, RecoveryPhase::Verifying)?;
        let health = components.health.check_system_health();
        if !health.is_healthy {
            return Err(RecoveryError::VerificationFailed { issues: health.issues });
        }
        Ok(health)
    }

    /// Phase 1: anything missing here needs a new login, not a retry
    fn validate_session(&self, components: &Components) -> RecoveryResult<()> {
        let store = &components.handles.session_store;

        if store.auth_token().is_none() {
            return Err(RecoveryError::auth_required("missing auth token"));
        }
        let user_data = store
            .user_data()
            .ok_or_else(|| RecoveryError::auth_required("missing user profile"))?;

        if components.handles.call_control.is_some() {
            CallControlConfig::from_user_data(&user_data).map_err(|e| {
                RecoveryError::auth_required(format!("incomplete call-control configuration ({})", e))
            })?;
        }

        debug!(user = %user_data.user.id, "Session validated");
        Ok(())
    }

    /// Phase 2: strictly sequential, later services depend on earlier ones
    async fn restore_services(&self, components: &Components, cancel: &CancellationToken) -> RecoveryResult<()> {
        for service in ServiceId::RESTORE_ORDER {
            if cancel.is_cancelled() {
                return Err(RecoveryError::Cancelled {
                    operation: format!("restore {}", service),
                });
            }

            let outcome = components.restorer.restore(service, cancel).await;
            // Superseded while the step ran; its result belongs to nobody
            if cancel.is_cancelled() {
                return Err(RecoveryError::Cancelled {
                    operation: format!("restore {}", service),
                });
            }
            match outcome {
                Ok(RestoreOutcome::Restored) | Ok(RestoreOutcome::AlreadyHealthy) => {
                    self.mark_service_restored(service);
                    self.emit(RecoveryEvent::ServiceRestored { service });
                }
                Ok(RestoreOutcome::Skipped) | Ok(RestoreOutcome::Degraded) => {}
                Err(e) => {
                    warn!(service = %service, error = %e, category = e.category(), "Service restoration failed");
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    /// Move the given run to `phase`; fails if the run has been superseded
    fn advance(&self, run_id: Uuid, phase: RecoveryPhase) -> RecoveryResult<()> {
        {
            let mut state = self.state.lock();
            if !state.is_active_run(run_id) || !state.phase.is_active() {
                return Err(RecoveryError::Cancelled {
                    operation: format!("enter {} phase", phase),
                });
            }
            if !state.phase.can_transition_to(phase) {
                return Err(RecoveryError::internal(format!(
                    "invalid phase transition {} -> {}",
                    state.phase, phase
                )));
            }
            state.phase = phase;
        }

        debug!(phase = %phase, "Recovery phase changed");
        self.emit(RecoveryEvent::PhaseChanged { phase });
        Ok(())
    }

    /// Phase 4, reached by the run itself or by the health short-circuit
    ///
    /// The run keeps ownership of the state until `Completed` is published, so
    /// triggers stay refused during the profile refresh and a reset or destroy
    /// in the meantime discards the completion.
    async fn complete_recovery(
        &self,
        run_id: Uuid,
        health_status: HealthStatus,
        short_circuited: bool,
        components: &Components,
    ) {
        {
            let mut state = self.state.lock();
            if !state.is_active_run(run_id) || !state.phase.can_transition_to(RecoveryPhase::Complete) {
                debug!(run_id = %run_id, "Discarding completion of superseded recovery run");
                return;
            }
            // Restore steps still running under a short-circuit stop here
            state.cancel_in_flight();
            state.phase = RecoveryPhase::Complete;
            state.failed_services.clear();
            state.attempt = 0;
        }
        self.emit(RecoveryEvent::PhaseChanged {
            phase: RecoveryPhase::Complete,
        });

        let profile = self.refresh_agent_profile(components).await;

        {
            let mut state = self.state.lock();
            if !state.is_active_run(run_id) {
                debug!(run_id = %run_id, "Recovery run released during profile refresh, dropping completion");
                return;
            }
            if profile.is_some() {
                state.agent_profile = profile;
            }
            state.release_run();
            state.stats.recoveries_completed += 1;
            state.stats.last_completed_at = Some(Utc::now());
            if short_circuited {
                state.stats.short_circuit_completions += 1;
            }
        }

        info!(short_circuited = short_circuited, "Recovery completed");
        self.emit(RecoveryEvent::Completed {
            health_status,
            short_circuited,
        });
    }

    async fn refresh_agent_profile(&self, components: &Components) -> Option<AgentProfile> {
        let presence = components.handles.presence.as_ref()?;
        let extension = components
            .handles
            .session_store
            .user_data()
            .and_then(|data| data.user.extension)?;

        let lookup = presence.agent_details_by_extension(&extension);
        match with_timeout("agent profile refresh", self.config.profile_refresh_timeout, lookup).await {
            Ok(profile) => {
                debug!(agent_id = %profile.agent_id, "Agent profile refreshed");
                Some(profile)
            }
            Err(e) => {
                warn!(extension = %extension, error = %e, "Agent profile refresh failed (non-fatal)");
                None
            }
        }
    }

    fn fail_recovery(self: &Arc<Self>, run_id: Uuid, err: RecoveryError, components: &Components) {
        let mut state = self.state.lock();
        // A run already finalizing in phase 4 cannot fail any more
        if !state.is_active_run(run_id) || !state.phase.is_active() {
            debug!(run_id = %run_id, error = %err, "Discarding failure of superseded recovery run");
            return;
        }

        state.release_run();
        state.phase = RecoveryPhase::Failed;
        state.stats.failed_attempts += 1;
        state.stats.last_error = Some(err.to_string());
        let attempt = state.attempt;

        if err.is_auth_failure() {
            state.stats.auth_failures += 1;
            state.attempt = 0;
            state.failed_services.clear();
            drop(state);

            error!(error = %err, "Recovery requires re-authentication, clearing session");
            components.handles.session_store.clear();
            self.emit(RecoveryEvent::PhaseChanged {
                phase: RecoveryPhase::Failed,
            });
            self.emit(RecoveryEvent::Error {
                error: err.to_string(),
                attempt,
                retry_in_ms: None,
            });
            let reason = match &err {
                RecoveryError::AuthenticationRequired { reason } => reason.clone(),
                other => other.to_string(),
            };
            self.emit(RecoveryEvent::AuthRequired { reason });
            return;
        }

        let exhausted = attempt >= self.config.max_attempts;
        if exhausted || !err.is_recoverable() {
            drop(state);

            let reason = if exhausted {
                "max_attempts_reached".to_string()
            } else {
                err.to_string()
            };
            error!(
                attempt = attempt,
                error = %err,
                category = err.category(),
                reason = %reason,
                "Recovery failed, automatic retries stopped"
            );
            self.emit(RecoveryEvent::PhaseChanged {
                phase: RecoveryPhase::Failed,
            });
            self.emit(RecoveryEvent::Error {
                error: err.to_string(),
                attempt,
                retry_in_ms: None,
            });
            self.emit(RecoveryEvent::Failed { reason });
            return;
        }

        let delay = self.config.retry_delay(attempt);
        state.retry_pending = true;
        drop(state);

        warn!(
            attempt = attempt,
            error = %err,
            category = err.category(),
            next_delay_ms = delay.as_millis() as u64,
            "Recovery attempt failed, will retry"
        );
        self.emit(RecoveryEvent::PhaseChanged {
            phase: RecoveryPhase::Failed,
        });
        self.emit(RecoveryEvent::Error {
            error: err.to_string(),
            attempt,
            retry_in_ms: Some(delay.as_millis() as u64),
        });
        self.schedule_retry(delay, components.context.clone());
    }

    fn schedule_retry(self: &Arc<Self>, delay: std::time::Duration, context: SessionContext) {
        let weak = Arc::downgrade(self);
        let shutdown = self.shutdown.clone();
        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = shutdown.cancelled() => return,
                _ = sleep(delay) => {}
            }
            let Some(inner) = weak.upgrade() else {
                return;
            };
            {
                let mut state = inner.state.lock();
                if !state.retry_pending {
                    return;
                }
                state.retry_pending = false;
            }
            debug!("Backoff elapsed, retrying recovery");
            inner.trigger(reasons::RETRY_AFTER_FAILURE, &context, TriggerSource::Retry);
        });

        if let Some(previous) = self.tasks.lock().retry.replace(handle) {
            previous.abort();
        }
    }

    fn abort_retry_task(&self) {
        if let Some(handle) = self.tasks.lock().retry.take() {
            handle.abort();
        }
    }

    fn cancel_pending_retry(&self) {
        self.abort_retry_task();
        self.state.lock().retry_pending = false;
    }

    async fn on_health_tick(self: &Arc<Self>) {
        let Some(components) = self.components() else {
            return;
        };
        let health = components.health.check_system_health();

        if health.is_healthy {
            let active_run = {
                let state = self.state.lock();
                state
                    .active_run
                    .as_ref()
                    .filter(|_| state.phase.is_active())
                    .map(|run| run.id)
            };
            if let Some(run_id) = active_run {
                info!(run_id = %run_id, "All services healthy mid-recovery, completing early");
                self.complete_recovery(run_id, health.services, true, &components).await;
            }
            return;
        }

        // An absent session is the login flow's business
        if !health.services.auth || !self.accepts_automatic_trigger() {
            return;
        }

        for service in &health.unhealthy_services {
            self.mark_service_failed(*service);
        }
        self.trigger(reasons::HEALTH_CHECK_FAILED, &components.context, TriggerSource::Automatic);
    }

    fn reset(&self) {
        self.cancel_pending_retry();
        {
            let mut state = self.state.lock();
            state.release_run();
            state.phase = RecoveryPhase::Idle;
            state.attempt = 0;
            state.retry_pending = false;
            state.failed_services.clear();
            state.agent_profile = None;
        }
        info!("Recovery state reset");
        self.emit(RecoveryEvent::PhaseChanged {
            phase: RecoveryPhase::Idle,
        });
    }

    fn destroy(&self) {
        {
            let mut state = self.state.lock();
            if state.destroyed {
                return;
            }
            state.destroyed = true;
            state.release_run();
            state.phase = RecoveryPhase::Idle;
            state.retry_pending = false;
        }

        let mut tasks = self.tasks.lock();
        if let Some(detector) = tasks.detector.take() {
            detector.teardown();
        }
        if let Some(handle) = tasks.health_monitor.take() {
            handle.abort();
        }
        if let Some(handle) = tasks.retry.take() {
            handle.abort();
        }
        drop(tasks);

        self.shutdown.cancel();
        info!("Recovery orchestrator destroyed");
    }
}

impl Drop for OrchestratorInner {
    fn drop(&mut self) {
        let tasks = self.tasks.get_mut();
        if let Some(handle) = tasks.health_monitor.take() {
            handle.abort();
        }
        if let Some(handle) = tasks.retry.take() {
            handle.abort();
        }
        self.shutdown.cancel();
    }
}

fn spawn_health_monitor(
    inner: Weak<OrchestratorInner>,
    interval: std::time::Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; checks start one interval in
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }
            let Some(inner) = inner.upgrade() else {
                break;
            };
            inner.on_health_tick().await;
        }
        debug!("Health monitor stopped");
    })
}

/// Detector-facing handle that does not keep the orchestrator alive
struct OrchestratorTrigger {
    inner: Weak<OrchestratorInner>,
}

impl RecoveryTrigger for OrchestratorTrigger {
    fn trigger_recovery(&self, reason: &str) -> bool {
        let Some(inner) = self.inner.upgrade() else {
            return false;
        };
        let Some(components) = inner.components() else {
            return false;
        };
        inner.trigger(reason, &components.context, TriggerSource::Automatic)
    }

    fn mark_service_failed(&self, service: ServiceId) {
        if let Some(inner) = self.inner.upgrade() {
            inner.mark_service_failed(service);
        }
    }

    fn mark_service_restored(&self, service: ServiceId) {
        if let Some(inner) = self.inner.upgrade() {
            inner.mark_service_restored(service);
        }
    }
}
