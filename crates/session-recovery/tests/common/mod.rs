//! In-memory service doubles shared by the integration tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::broadcast;

use softphone_session_recovery::{
    AgentProfile, CallControl, CallControlConfig, CallControlSignal, InMemorySessionStore, Monitoring, Presence,
    RecoveryConfig, RecoveryError, RecoveryEvent, RecoveryOrchestrator, RecoveryResult, ServiceHandles, ServiceId,
    SessionContext, SessionStore, SipSettings, Transport, TransportSignal, TransportStatus, UserData, UserProfile,
};

/// Ordered record of every restoration action the fakes saw
pub type CallLog = Arc<Mutex<Vec<String>>>;

pub fn user_data() -> UserData {
    UserData::new(UserProfile {
        id: "agent-17".to_string(),
        name: Some("Dana Front Desk".to_string()),
        extension: Some("1017".to_string()),
        sip: Some(SipSettings {
            server: Some("pbx.hotel.test".to_string()),
            username: Some("1017".to_string()),
            password: Some("s3cret".to_string()),
            display_name: Some("Front Desk".to_string()),
            ws_servers: vec!["wss://pbx.hotel.test:8089/ws".to_string()],
            ice_servers: vec!["stun:stun.hotel.test:3478".to_string()],
        }),
    })
}

/// Timings that keep paused-clock tests short; the health monitor stays quiet
pub fn test_config() -> RecoveryConfig {
    RecoveryConfig::default()
        .with_health_check_interval(Duration::from_secs(3600))
        .with_condition_poll_interval(Duration::from_millis(50))
        .with_transport_timeout(Duration::from_secs(2))
        .with_call_control_timeout(Duration::from_secs(3))
        .with_presence_timeout(Duration::from_secs(2))
        .with_restore_phase_timeout(Duration::from_secs(20))
}

pub struct FakeTransport {
    pub connected: AtomicBool,
    pub reconnecting: AtomicBool,
    /// Whether `connect()` actually brings the link up
    pub connect_works: AtomicBool,
    pub connect_calls: AtomicU32,
    signals: broadcast::Sender<TransportSignal>,
    log: CallLog,
}

impl FakeTransport {
    pub fn new(log: CallLog) -> Self {
        Self {
            connected: AtomicBool::new(true),
            reconnecting: AtomicBool::new(false),
            connect_works: AtomicBool::new(true),
            connect_calls: AtomicU32::new(0),
            signals: broadcast::channel(16).0,
            log,
        }
    }

    pub fn set_connected(&self, value: bool) {
        self.connected.store(value, Ordering::SeqCst);
    }

    pub fn emit(&self, signal: TransportSignal) {
        let _ = self.signals.send(signal);
    }
}

#[async_trait]
impl Transport for FakeTransport {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn status(&self) -> TransportStatus {
        TransportStatus {
            connected: self.is_connected(),
            reconnecting: self.reconnecting.load(Ordering::SeqCst),
            reconnect_attempts: self.connect_calls.load(Ordering::SeqCst),
        }
    }

    async fn connect(&self) -> RecoveryResult<()> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        self.log.lock().push("transport.connect".to_string());
        if self.connect_works.load(Ordering::SeqCst) {
            self.set_connected(true);
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<TransportSignal> {
        self.signals.subscribe()
    }
}

pub struct FakeCallControl {
    pub connected: AtomicBool,
    pub registered: AtomicBool,
    pub initialize_fails: AtomicBool,
    pub initialize_calls: AtomicU32,
    pub last_config: Mutex<Option<CallControlConfig>>,
    signals: broadcast::Sender<CallControlSignal>,
    log: CallLog,
}

impl FakeCallControl {
    pub fn new(log: CallLog) -> Self {
        Self {
            connected: AtomicBool::new(true),
            registered: AtomicBool::new(true),
            initialize_fails: AtomicBool::new(false),
            initialize_calls: AtomicU32::new(0),
            last_config: Mutex::new(None),
            signals: broadcast::channel(16).0,
            log,
        }
    }

    pub fn set_registered(&self, value: bool) {
        self.registered.store(value, Ordering::SeqCst);
    }

    pub fn emit(&self, signal: CallControlSignal) {
        let _ = self.signals.send(signal);
    }
}

#[async_trait]
impl CallControl for FakeCallControl {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn is_registered(&self) -> bool {
        self.registered.load(Ordering::SeqCst)
    }

    async fn initialize(&self, config: CallControlConfig) -> RecoveryResult<()> {
        self.initialize_calls.fetch_add(1, Ordering::SeqCst);
        self.log.lock().push("call_control.initialize".to_string());
        *self.last_config.lock() = Some(config);
        if self.initialize_fails.load(Ordering::SeqCst) {
            return Err(RecoveryError::service(ServiceId::CallControl, "registrar unreachable"));
        }
        self.connected.store(true, Ordering::SeqCst);
        self.registered.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<CallControlSignal> {
        self.signals.subscribe()
    }
}

pub struct FakeMonitoring {
    pub connected: AtomicBool,
    pub connect_fails: AtomicBool,
    log: CallLog,
}

impl FakeMonitoring {
    pub fn new(log: CallLog) -> Self {
        Self {
            connected: AtomicBool::new(true),
            connect_fails: AtomicBool::new(false),
            log,
        }
    }
}

#[async_trait]
impl Monitoring for FakeMonitoring {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn connect(&self) -> RecoveryResult<()> {
        self.log.lock().push("monitoring.connect".to_string());
        if self.connect_fails.load(Ordering::SeqCst) {
            return Err(RecoveryError::service(ServiceId::Monitoring, "feed offline"));
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }
}

pub struct FakePresence {
    pub connected: AtomicBool,
    /// Simulated latency of `connect()`
    pub connect_delay: Mutex<Duration>,
    pub lookup_fails: AtomicBool,
    /// Simulated latency of the agent directory
    pub lookup_delay: Mutex<Duration>,
    pub lookups: AtomicU32,
    log: CallLog,
}

impl FakePresence {
    pub fn new(log: CallLog) -> Self {
        Self {
            connected: AtomicBool::new(true),
            connect_delay: Mutex::new(Duration::ZERO),
            lookup_fails: AtomicBool::new(false),
            lookup_delay: Mutex::new(Duration::ZERO),
            lookups: AtomicU32::new(0),
            log,
        }
    }
}

#[async_trait]
impl Presence for FakePresence {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn connect(&self) -> RecoveryResult<()> {
        self.log.lock().push("presence.connect".to_string());
        let delay = *self.connect_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn agent_details_by_extension(&self, extension: &str) -> RecoveryResult<AgentProfile> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        let delay = *self.lookup_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.lookup_fails.load(Ordering::SeqCst) {
            return Err(RecoveryError::service(ServiceId::Presence, "agent directory unavailable"));
        }
        Ok(AgentProfile {
            agent_id: "agent-17".to_string(),
            extension: extension.to_string(),
            name: Some("Dana Front Desk".to_string()),
            status: Some("available".to_string()),
        })
    }
}

/// Session store whose SIP settings vanish after a number of profile reads
pub struct ScriptedSessionStore {
    inner: InMemorySessionStore,
    complete_reads: AtomicU32,
}

impl ScriptedSessionStore {
    pub fn new(complete_reads: u32) -> Self {
        Self {
            inner: InMemorySessionStore::with_session("token-abc", user_data()),
            complete_reads: AtomicU32::new(complete_reads),
        }
    }
}

impl SessionStore for ScriptedSessionStore {
    fn auth_token(&self) -> Option<String> {
        self.inner.auth_token()
    }

    fn user_data(&self) -> Option<UserData> {
        let mut data = self.inner.user_data()?;
        let remaining = self.complete_reads.load(Ordering::SeqCst);
        if remaining == 0 {
            if let Some(sip) = data.user.sip.as_mut() {
                sip.password = None;
            }
        } else {
            self.complete_reads.store(remaining - 1, Ordering::SeqCst);
        }
        Some(data)
    }

    fn clear(&self) {
        self.inner.clear()
    }
}

/// A fully connected softphone made of fakes
pub struct Softphone {
    pub store: Arc<InMemorySessionStore>,
    pub context: SessionContext,
    pub transport: Arc<FakeTransport>,
    pub call_control: Arc<FakeCallControl>,
    pub monitoring: Arc<FakeMonitoring>,
    pub presence: Arc<FakePresence>,
    pub log: CallLog,
}

impl Softphone {
    pub fn healthy() -> Self {
        let log: CallLog = Arc::new(Mutex::new(Vec::new()));
        Self {
            store: Arc::new(InMemorySessionStore::with_session("token-abc", user_data())),
            context: SessionContext::new(),
            transport: Arc::new(FakeTransport::new(log.clone())),
            call_control: Arc::new(FakeCallControl::new(log.clone())),
            monitoring: Arc::new(FakeMonitoring::new(log.clone())),
            presence: Arc::new(FakePresence::new(log.clone())),
            log,
        }
    }

    pub fn handles(&self) -> ServiceHandles {
        self.handles_with_store(self.store.clone())
    }

    pub fn handles_with_store(&self, store: Arc<dyn SessionStore>) -> ServiceHandles {
        ServiceHandles::new(store)
            .with_transport(self.transport.clone())
            .with_call_control(self.call_control.clone())
            .with_monitoring(self.monitoring.clone())
            .with_presence(self.presence.clone())
    }

    pub fn orchestrator(&self, config: RecoveryConfig) -> RecoveryOrchestrator {
        let orchestrator = RecoveryOrchestrator::new(config).unwrap();
        orchestrator.initialize(self.handles(), self.context.clone()).unwrap();
        orchestrator
    }

    pub fn actions(&self) -> Vec<String> {
        self.log.lock().clone()
    }
}

/// Receive events until `outcomes` attempt-ending events have been seen
pub async fn collect_outcomes(rx: &mut broadcast::Receiver<RecoveryEvent>, outcomes: usize) -> Vec<RecoveryEvent> {
    let mut events = Vec::new();
    let mut seen = 0;
    while seen < outcomes {
        let event = tokio::time::timeout(Duration::from_secs(600), rx.recv())
            .await
            .expect("timed out waiting for recovery events")
            .expect("event channel closed");
        if event.is_outcome() {
            seen += 1;
        }
        events.push(event);
    }
    events
}

pub fn phases(events: &[RecoveryEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|event| match event {
            RecoveryEvent::PhaseChanged { phase } => Some(phase.to_string()),
            _ => None,
        })
        .collect()
}
