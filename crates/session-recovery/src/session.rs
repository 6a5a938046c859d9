//! Persisted session data and the login/logout guard
//!
//! The session store is a read-only accessor for the credentials, user
//! profile and call-control settings the login flow persisted. Recovery
//! reads it during validation and when it re-derives the SIP configuration;
//! it only ever writes to it by clearing it when authentication is gone.
//!
//! [`SessionContext`] carries the "login or logout in progress" flags that
//! gate recovery triggers. Hosts keep one context, flip it around their
//! authentication flows, and pass it to the orchestrator.
//!
//! # Usage Examples
//!
//! ```rust
//! use softphone_session_recovery::session::{
//!     CallControlConfig, InMemorySessionStore, SessionStore, SipSettings, UserData, UserProfile,
//! };
//!
//! let store = InMemorySessionStore::new();
//! store.set_session(
//!     "token-123",
//!     UserData::new(UserProfile {
//!         id: "42".to_string(),
//!         name: Some("Alice".to_string()),
//!         extension: Some("1001".to_string()),
//!         sip: Some(SipSettings {
//!             server: Some("pbx.example.com".to_string()),
//!             username: Some("1001".to_string()),
//!             password: Some("secret".to_string()),
//!             ws_servers: vec!["wss://pbx.example.com:8089/ws".to_string()],
//!             ..Default::default()
//!         }),
//!     }),
//! );
//!
//! let user = store.user_data().unwrap();
//! let config = CallControlConfig::from_user_data(&user).unwrap();
//! assert_eq!(config.uri, "sip:1001@pbx.example.com");
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{RecoveryError, RecoveryResult};

/// Read-only accessor for the persisted session
pub trait SessionStore: Send + Sync {
    /// Bearer token issued at login, if any
    fn auth_token(&self) -> Option<String>;

    /// Persisted user profile, if any
    fn user_data(&self) -> Option<UserData>;

    /// Drop every persisted credential
    fn clear(&self);
}

/// Persisted user record, as stored by the login flow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserData {
    pub user: UserProfile,
}

impl UserData {
    pub fn new(user: UserProfile) -> Self {
        Self { user }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub name: Option<String>,
    /// Agent extension; also the key for the presence profile lookup
    pub extension: Option<String>,
    pub sip: Option<SipSettings>,
}

/// Call-control settings as persisted; every field may be missing
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SipSettings {
    pub server: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub display_name: Option<String>,
    #[serde(default)]
    pub ws_servers: Vec<String>,
    #[serde(default)]
    pub ice_servers: Vec<String>,
}

/// Complete configuration needed to (re)initialize call control
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallControlConfig {
    pub server: String,
    pub uri: String,
    pub username: String,
    pub password: String,
    pub display_name: Option<String>,
    pub ws_servers: Vec<String>,
    pub ice_servers: Vec<String>,
}

impl CallControlConfig {
    /// Derive the call-control configuration from the stored profile
    ///
    /// Raises [`RecoveryError::MissingSipConfiguration`] naming the first
    /// required field that is absent or empty. ICE servers are optional.
    pub fn from_user_data(data: &UserData) -> RecoveryResult<Self> {
        let sip = data
            .user
            .sip
            .as_ref()
            .ok_or_else(|| missing("sip"))?;

        let server = required(&sip.server, "sip.server")?;
        let username = required(&sip.username, "sip.username")?;
        let password = required(&sip.password, "sip.password")?;

        let ws_servers: Vec<String> = sip
            .ws_servers
            .iter()
            .filter(|s| !s.trim().is_empty())
            .cloned()
            .collect();
        if ws_servers.is_empty() {
            return Err(missing("sip.ws_servers"));
        }

        Ok(Self {
            uri: format!("sip:{}@{}", username, server),
            server,
            username,
            password,
            display_name: sip.display_name.clone().or_else(|| data.user.name.clone()),
            ws_servers,
            ice_servers: sip.ice_servers.clone(),
        })
    }
}

fn missing(field: &str) -> RecoveryError {
    RecoveryError::MissingSipConfiguration {
        field: field.to_string(),
    }
}

fn required(value: &Option<String>, field: &str) -> RecoveryResult<String> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v.clone()),
        _ => Err(missing(field)),
    }
}

/// Session store kept in process memory
///
/// Suitable for hosts that load the session from their own storage at
/// startup, and for tests.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    token: RwLock<Option<String>>,
    user: RwLock<Option<UserData>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(token: impl Into<String>, user: UserData) -> Self {
        let store = Self::new();
        store.set_session(token, user);
        store
    }

    pub fn set_session(&self, token: impl Into<String>, user: UserData) {
        *self.token.write() = Some(token.into());
        *self.user.write() = Some(user);
    }

    pub fn set_auth_token(&self, token: Option<String>) {
        *self.token.write() = token;
    }

    pub fn set_user_data(&self, user: Option<UserData>) {
        *self.user.write() = user;
    }
}

impl SessionStore for InMemorySessionStore {
    fn auth_token(&self) -> Option<String> {
        self.token.read().clone()
    }

    fn user_data(&self) -> Option<UserData> {
        self.user.read().clone()
    }

    fn clear(&self) {
        *self.token.write() = None;
        *self.user.write() = None;
    }
}

/// Authentication flow flags that gate recovery triggers
///
/// Cheap to clone; clones share the same flags.
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    inner: Arc<SessionFlags>,
}

#[derive(Debug, Default)]
struct SessionFlags {
    authenticating: AtomicBool,
    logging_out: AtomicBool,
}

impl SessionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_authenticating(&self, value: bool) {
        self.inner.authenticating.store(value, Ordering::SeqCst);
    }

    pub fn set_logging_out(&self, value: bool) {
        self.inner.logging_out.store(value, Ordering::SeqCst);
    }

    pub fn is_authenticating(&self) -> bool {
        self.inner.authenticating.load(Ordering::SeqCst)
    }

    pub fn is_logging_out(&self) -> bool {
        self.inner.logging_out.load(Ordering::SeqCst)
    }

    /// True while a login or logout is in progress
    pub fn auth_in_progress(&self) -> bool {
        self.is_authenticating() || self.is_logging_out()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(sip: Option<SipSettings>) -> UserData {
        UserData::new(UserProfile {
            id: "7".to_string(),
            name: Some("Agent Seven".to_string()),
            extension: Some("2007".to_string()),
            sip,
        })
    }

    fn complete_sip() -> SipSettings {
        SipSettings {
            server: Some("pbx.example.com".to_string()),
            username: Some("2007".to_string()),
            password: Some("hunter2".to_string()),
            display_name: None,
            ws_servers: vec!["wss://pbx.example.com/ws".to_string()],
            ice_servers: vec!["stun:stun.example.com:3478".to_string()],
        }
    }

    #[test]
    fn test_config_from_complete_profile() {
        let config = CallControlConfig::from_user_data(&profile(Some(complete_sip()))).unwrap();
        assert_eq!(config.server, "pbx.example.com");
        assert_eq!(config.uri, "sip:2007@pbx.example.com");
        assert_eq!(config.display_name.as_deref(), Some("Agent Seven"));
        assert_eq!(config.ice_servers.len(), 1);
    }

    #[test]
    fn test_config_reports_first_missing_field() {
        let err = CallControlConfig::from_user_data(&profile(None)).unwrap_err();
        assert_eq!(err, RecoveryError::MissingSipConfiguration { field: "sip".to_string() });

        let mut sip = complete_sip();
        sip.password = Some("   ".to_string());
        let err = CallControlConfig::from_user_data(&profile(Some(sip))).unwrap_err();
        assert_eq!(err, RecoveryError::MissingSipConfiguration { field: "sip.password".to_string() });

        let mut sip = complete_sip();
        sip.ws_servers = vec![String::new()];
        let err = CallControlConfig::from_user_data(&profile(Some(sip))).unwrap_err();
        assert_eq!(err, RecoveryError::MissingSipConfiguration { field: "sip.ws_servers".to_string() });
    }

    #[test]
    fn test_ice_servers_optional() {
        let mut sip = complete_sip();
        sip.ice_servers.clear();
        assert!(CallControlConfig::from_user_data(&profile(Some(sip))).is_ok());
    }

    #[test]
    fn test_in_memory_store_clear() {
        let store = InMemorySessionStore::with_session("tok", profile(Some(complete_sip())));
        assert_eq!(store.auth_token().as_deref(), Some("tok"));
        assert!(store.user_data().is_some());

        store.clear();
        assert!(store.auth_token().is_none());
        assert!(store.user_data().is_none());
    }

    #[test]
    fn test_session_context_shared_between_clones() {
        let ctx = SessionContext::new();
        let clone = ctx.clone();
        assert!(!ctx.auth_in_progress());

        clone.set_logging_out(true);
        assert!(ctx.is_logging_out());
        assert!(ctx.auth_in_progress());

        clone.set_logging_out(false);
        ctx.set_authenticating(true);
        assert!(clone.auth_in_progress());
    }

    #[test]
    fn test_user_data_deserializes_without_optional_lists() {
        let json = r#"{"user":{"id":"1","name":null,"extension":"100","sip":{"server":"s","username":"u","password":"p","display_name":null}}}"#;
        let data: UserData = serde_json::from_str(json).unwrap();
        let sip = data.user.sip.unwrap();
        assert!(sip.ws_servers.is_empty());
        assert!(sip.ice_servers.is_empty());
    }
}
