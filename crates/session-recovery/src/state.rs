//! Recovery state machine types
//!
//! ```text
//!   idle ──trigger──▶ validating ──▶ reconnecting ──▶ verifying ──▶ complete
//!    ▲                    │               │               │            │
//!    │                    └───────────────┴───────┬───────┘            │
//!    │                                            ▼                    │
//!    └──────────────── reset ─────────────────  failed ◀───────────────┘
//! ```
//!
//! `complete` and `failed` are resting phases: a new trigger starts over at
//! `validating`. The health short-circuit may jump straight to `complete`
//! from any active phase.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::health::HealthStatus;
use crate::services::{AgentProfile, ServiceId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryPhase {
    Idle,
    Validating,
    Reconnecting,
    Verifying,
    Complete,
    Failed,
}

impl RecoveryPhase {
    /// Phases during which a recovery run is executing
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            RecoveryPhase::Validating | RecoveryPhase::Reconnecting | RecoveryPhase::Verifying
        )
    }

    pub fn can_transition_to(&self, next: RecoveryPhase) -> bool {
        use RecoveryPhase::*;

        if next == Idle {
            return true;
        }
        match self {
            Idle | Complete | Failed => next == Validating,
            Validating => matches!(next, Reconnecting | Complete | Failed),
            Reconnecting => matches!(next, Verifying | Complete | Failed),
            Verifying => matches!(next, Complete | Failed),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RecoveryPhase::Idle => "idle",
            RecoveryPhase::Validating => "validating",
            RecoveryPhase::Reconnecting => "reconnecting",
            RecoveryPhase::Verifying => "verifying",
            RecoveryPhase::Complete => "complete",
            RecoveryPhase::Failed => "failed",
        }
    }
}

impl fmt::Display for RecoveryPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The run currently allowed to finalize
#[derive(Debug, Clone)]
pub(crate) struct ActiveRun {
    pub id: Uuid,
    pub cancel: CancellationToken,
}

/// Mutable recovery record, owned by the orchestrator
#[derive(Debug)]
pub(crate) struct RecoveryState {
    pub phase: RecoveryPhase,
    pub is_recovering: bool,
    pub attempt: u32,
    pub last_recovery_timestamp: Option<DateTime<Utc>>,
    pub failed_services: BTreeSet<ServiceId>,
    pub active_run: Option<ActiveRun>,
    /// A backoff retry is scheduled and not yet fired
    pub retry_pending: bool,
    pub agent_profile: Option<AgentProfile>,
    pub destroyed: bool,
    pub stats: RecoveryStats,
}

impl Default for RecoveryState {
    fn default() -> Self {
        Self {
            phase: RecoveryPhase::Idle,
            is_recovering: false,
            attempt: 0,
            last_recovery_timestamp: None,
            failed_services: BTreeSet::new(),
            active_run: None,
            retry_pending: false,
            agent_profile: None,
            destroyed: false,
            stats: RecoveryStats::default(),
        }
    }
}

impl RecoveryState {
    pub fn is_active_run(&self, run_id: Uuid) -> bool {
        self.active_run.as_ref().map(|run| run.id) == Some(run_id)
    }

    /// Stop the active run's in-flight work while it keeps ownership
    pub fn cancel_in_flight(&self) {
        if let Some(run) = self.active_run.as_ref() {
            run.cancel.cancel();
        }
    }

    /// Clear the active run, cancelling anything it still has in flight
    pub fn release_run(&mut self) {
        if let Some(run) = self.active_run.take() {
            run.cancel.cancel();
        }
        self.is_recovering = false;
    }
}

/// Counters for operator tooling
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryStats {
    pub recoveries_started: u64,
    pub recoveries_completed: u64,
    /// Completions reached through the health-check short-circuit
    pub short_circuit_completions: u64,
    pub failed_attempts: u64,
    pub auth_failures: u64,
    /// Triggers rejected by a guard
    pub dropped_triggers: u64,
    pub last_error: Option<String>,
    pub last_completed_at: Option<DateTime<Utc>>,
}

/// Read-only view of the recovery state for hosts and UIs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryStatus {
    pub phase: RecoveryPhase,
    pub is_recovering: bool,
    pub attempt: u32,
    pub max_attempts: u32,
    pub retry_pending: bool,
    pub last_recovery_timestamp: Option<DateTime<Utc>>,
    pub failed_services: Vec<ServiceId>,
    pub health_status: HealthStatus,
    pub agent_profile: Option<AgentProfile>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use RecoveryPhase::*;

    const ALL: [RecoveryPhase; 6] = [Idle, Validating, Reconnecting, Verifying, Complete, Failed];

    #[test]
    fn test_happy_path_transitions() {
        let path = [Idle, Validating, Reconnecting, Verifying, Complete, Idle];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_any_phase_can_reset_to_idle() {
        for phase in ALL {
            assert!(phase.can_transition_to(Idle));
        }
    }

    #[test]
    fn test_active_phases_can_fail_or_short_circuit() {
        for phase in [Validating, Reconnecting, Verifying] {
            assert!(phase.is_active());
            assert!(phase.can_transition_to(Failed));
            assert!(phase.can_transition_to(Complete));
        }
    }

    #[test]
    fn test_phases_cannot_be_skipped() {
        assert!(!Idle.can_transition_to(Reconnecting));
        assert!(!Validating.can_transition_to(Verifying));
        assert!(!Verifying.can_transition_to(Reconnecting));
        assert!(!Failed.can_transition_to(Complete));
        assert!(!Complete.can_transition_to(Failed));
    }

    #[test]
    fn test_release_run_cancels_token() {
        let token = CancellationToken::new();
        let mut state = RecoveryState::default();
        let id = Uuid::new_v4();
        state.active_run = Some(ActiveRun { id, cancel: token.clone() });
        state.is_recovering = true;
        assert!(state.is_active_run(id));

        state.cancel_in_flight();
        assert!(token.is_cancelled());
        assert!(state.is_recovering);
        assert!(state.is_active_run(id));

        state.release_run();
        assert!(!state.is_recovering);
        assert!(!state.is_active_run(id));
    }
}
