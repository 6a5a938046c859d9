//! Health aggregation against fake services

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use common::Softphone;
use softphone_session_recovery::{HealthAggregator, InMemorySessionStore, ServiceHandles, ServiceId};

#[test]
fn test_all_services_up_is_healthy() {
    let phone = Softphone::healthy();
    let health = HealthAggregator::new(phone.handles()).check_system_health();

    assert!(health.is_healthy);
    assert!(health.issues.is_empty());
    assert!(health.unhealthy_services.is_empty());
    assert!(health.services.auth && health.services.transport && health.services.call_control);
}

#[test]
fn test_monitoring_outage_does_not_affect_health() {
    let phone = Softphone::healthy();
    phone.monitoring.connected.store(false, Ordering::SeqCst);

    let health = HealthAggregator::new(phone.handles()).check_system_health();

    assert!(health.is_healthy);
    assert!(!health.services.monitoring);
    assert_eq!(health.issues, vec!["Monitoring disconnected (non-critical)".to_string()]);
    assert_eq!(health.unhealthy_services, vec![ServiceId::Monitoring]);
}

#[test]
fn test_transport_reconnecting_is_reported_but_not_counted() {
    let phone = Softphone::healthy();
    phone.transport.set_connected(false);
    phone.transport.reconnecting.store(true, Ordering::SeqCst);

    let health = HealthAggregator::new(phone.handles()).check_system_health();

    assert!(health.is_healthy);
    assert!(!health.services.transport);
    assert!(health.issues[0].starts_with("Transport reconnecting"));
}

#[test]
fn test_transport_down_is_unhealthy() {
    let phone = Softphone::healthy();
    phone.transport.set_connected(false);

    let health = HealthAggregator::new(phone.handles()).check_system_health();

    assert!(!health.is_healthy);
    assert_eq!(health.issues, vec!["Transport disconnected".to_string()]);
}

#[test]
fn test_call_control_needs_registration() {
    let phone = Softphone::healthy();
    phone.call_control.set_registered(false);

    let health = HealthAggregator::new(phone.handles()).check_system_health();

    assert!(!health.is_healthy);
    assert!(!health.services.call_control);
    assert_eq!(health.issues, vec!["SIP not registered".to_string()]);
}

#[test]
fn test_missing_token_is_unhealthy() {
    let phone = Softphone::healthy();
    phone.store.set_auth_token(None);

    let health = HealthAggregator::new(phone.handles()).check_system_health();

    assert!(!health.is_healthy);
    assert!(!health.services.auth);
    assert!(health.issues.contains(&"Authentication missing".to_string()));
}

#[test]
fn test_absent_services_are_not_checked() {
    let store = Arc::new(InMemorySessionStore::with_session("token", common::user_data()));
    let aggregator = HealthAggregator::new(ServiceHandles::new(store));

    let health = aggregator.check_system_health();

    assert!(health.is_healthy);
    assert!(health.services.presence && health.services.monitoring);
    assert_eq!(aggregator.latest(), health.services);
}
