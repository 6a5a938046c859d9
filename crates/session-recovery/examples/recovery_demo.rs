//! Recovery walkthrough with simulated services
//!
//! Run with `cargo run --example recovery_demo`. The demo brings up a
//! simulated softphone, then:
//! 1. drops the WebSocket transport,
//! 2. loses SIP registration twice while the registrar is down,
//! 3. logs the user out so the next recovery asks for a login.
//!
//! Every recovery event is printed as JSON.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio_stream::StreamExt;
use tracing::{info, Level};

use softphone_session_recovery::{
    setup_logging, AgentProfile, CallControl, CallControlConfig, CallControlSignal, InMemorySessionStore,
    LoggingConfig, Presence, RecoveryConfig, RecoveryError, RecoveryOrchestrator, RecoveryResult, ServiceHandles,
    ServiceId, SessionContext, SessionStore, SipSettings, Transport, TransportSignal, TransportStatus, UserData, UserProfile,
};

struct SimulatedTransport {
    connected: AtomicBool,
    signals: broadcast::Sender<TransportSignal>,
}

impl SimulatedTransport {
    fn drop_link(&self) {
        self.connected.store(false, Ordering::SeqCst);
        let _ = self.signals.send(TransportSignal::Disconnected);
    }
}

#[async_trait]
impl Transport for SimulatedTransport {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn status(&self) -> TransportStatus {
        TransportStatus {
            connected: self.is_connected(),
            ..Default::default()
        }
    }

    async fn connect(&self) -> RecoveryResult<()> {
        tokio::time::sleep(Duration::from_millis(300)).await;
        self.connected.store(true, Ordering::SeqCst);
        let _ = self.signals.send(TransportSignal::Connected);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<TransportSignal> {
        self.signals.subscribe()
    }
}

struct SimulatedUserAgent {
    registered: AtomicBool,
    /// Registrations to reject before the registrar comes back
    rejections_left: AtomicU32,
    signals: broadcast::Sender<CallControlSignal>,
}

impl SimulatedUserAgent {
    fn lose_registration(&self, rejections: u32) {
        self.rejections_left.store(rejections, Ordering::SeqCst);
        self.registered.store(false, Ordering::SeqCst);
        let _ = self.signals.send(CallControlSignal::Unregistered);
    }
}

#[async_trait]
impl CallControl for SimulatedUserAgent {
    fn is_connected(&self) -> bool {
        true
    }

    fn is_registered(&self) -> bool {
        self.registered.load(Ordering::SeqCst)
    }

    async fn initialize(&self, config: CallControlConfig) -> RecoveryResult<()> {
        info!(uri = %config.uri, "Simulated user agent registering");
        tokio::time::sleep(Duration::from_millis(200)).await;

        let left = self.rejections_left.load(Ordering::SeqCst);
        if left > 0 {
            self.rejections_left.store(left - 1, Ordering::SeqCst);
            return Err(RecoveryError::service(ServiceId::CallControl, "503 Service Unavailable"));
        }
        self.registered.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<CallControlSignal> {
        self.signals.subscribe()
    }
}

struct SimulatedPresence;

#[async_trait]
impl Presence for SimulatedPresence {
    fn is_connected(&self) -> bool {
        true
    }

    async fn agent_details_by_extension(&self, extension: &str) -> RecoveryResult<AgentProfile> {
        Ok(AgentProfile {
            agent_id: "agent-1001".to_string(),
            extension: extension.to_string(),
            name: Some("Front Desk".to_string()),
            status: Some("available".to_string()),
        })
    }
}

fn session() -> UserData {
    UserData::new(UserProfile {
        id: "1001".to_string(),
        name: Some("Front Desk".to_string()),
        extension: Some("1001".to_string()),
        sip: Some(SipSettings {
            server: Some("pbx.example.com".to_string()),
            username: Some("1001".to_string()),
            password: Some("changeme".to_string()),
            display_name: None,
            ws_servers: vec!["wss://pbx.example.com:8089/ws".to_string()],
            ice_servers: vec!["stun:stun.example.com:3478".to_string()],
        }),
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    setup_logging(LoggingConfig::new(Level::INFO, "recovery-demo").with_recovery_level(Level::DEBUG))?;

    let store = Arc::new(InMemorySessionStore::with_session("demo-token", session()));
    let context = SessionContext::new();
    let transport = Arc::new(SimulatedTransport {
        connected: AtomicBool::new(true),
        signals: broadcast::channel(16).0,
    });
    let user_agent = Arc::new(SimulatedUserAgent {
        registered: AtomicBool::new(true),
        rejections_left: AtomicU32::new(0),
        signals: broadcast::channel(16).0,
    });

    let handles = ServiceHandles::new(store.clone())
        .with_transport(transport.clone())
        .with_call_control(user_agent.clone())
        .with_presence(Arc::new(SimulatedPresence));

    let config = RecoveryConfig::aggressive().with_health_check_interval(Duration::from_secs(1));
    let orchestrator = RecoveryOrchestrator::new(config)?;
    orchestrator.initialize(handles, context.clone())?;

    let mut events = orchestrator.event_stream();
    let printer = tokio::spawn(async move {
        while let Some(event) = events.next().await {
            if let Ok(event) = event {
                println!("{:?} {}", event.priority(), event.to_json());
            }
        }
    });

    info!("Dropping the transport");
    transport.drop_link();
    tokio::time::sleep(Duration::from_secs(3)).await;

    info!("Losing SIP registration while the registrar rejects two attempts");
    user_agent.lose_registration(2);
    tokio::time::sleep(Duration::from_secs(5)).await;

    info!("Logging out, then losing registration again");
    store.clear();
    user_agent.lose_registration(0);
    tokio::time::sleep(Duration::from_secs(2)).await;

    let status = orchestrator.status();
    println!("final status: {}", serde_json::to_string_pretty(&status)?);
    println!("stats: {:?}", orchestrator.stats());

    orchestrator.destroy();
    printer.abort();
    Ok(())
}
