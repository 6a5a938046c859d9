//! Tracing subscriber setup for hosts and demos
//!
//! Library code only emits `tracing` events. Binaries that have no
//! subscriber of their own can install one here.

use std::str::FromStr;

use tracing::Level;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{fmt, EnvFilter};

use crate::error::{RecoveryError, RecoveryResult};

/// Target prefix shared by every event this crate emits
pub const RECOVERY_LOG_TARGET: &str = "softphone_session_recovery";

/// Subscriber settings for a softphone host
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Level for targets no other directive matches
    pub level: Level,
    /// Level for the recovery orchestrator's own targets, `level` when unset
    pub recovery_level: Option<Level>,
    /// Extra `target=level` directives, applied last
    pub directives: Vec<String>,
    /// Emit one JSON object per line instead of human readable text
    pub json: bool,
    /// Include file and line information
    pub file_info: bool,
    /// Log span enter/exit
    pub log_spans: bool,
    pub app_name: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: Level::INFO,
            recovery_level: None,
            directives: Vec::new(),
            json: false,
            file_info: false,
            log_spans: false,
            app_name: "softphone".to_string(),
        }
    }
}

impl LoggingConfig {
    pub fn new(level: Level, app_name: impl Into<String>) -> Self {
        LoggingConfig {
            level,
            app_name: app_name.into(),
            ..Default::default()
        }
    }

    /// Trace recovery runs more (or less) verbosely than the rest of the host
    pub fn with_recovery_level(mut self, level: Level) -> Self {
        self.recovery_level = Some(level);
        self
    }

    /// Add a filter directive such as `"softphone_session_recovery::restorer=trace"`
    pub fn with_directive(mut self, directive: impl Into<String>) -> Self {
        self.directives.push(directive.into());
        self
    }

    pub fn with_json(mut self) -> Self {
        self.json = true;
        self
    }

    pub fn with_file_info(mut self) -> Self {
        self.file_info = true;
        self
    }

    pub fn with_spans(mut self) -> Self {
        self.log_spans = true;
        self
    }

    /// Directives in the order they are applied, most general first
    pub fn filter_directives(&self) -> Vec<String> {
        let recovery_level = self.recovery_level.unwrap_or(self.level);
        let mut directives = vec![
            self.level.as_str().to_lowercase(),
            format!("{}={}", RECOVERY_LOG_TARGET, recovery_level.as_str().to_lowercase()),
        ];
        directives.extend(self.directives.iter().map(|d| d.trim().to_string()));
        directives
    }

    /// `RUST_LOG` overlaid with this config's directives
    pub fn build_filter(&self) -> RecoveryResult<EnvFilter> {
        let mut filter = EnvFilter::from_default_env();
        for raw in self.filter_directives() {
            let directive = Directive::from_str(&raw).map_err(|e| {
                RecoveryError::invalid_config("log_directive", format!("'{}': {}", raw, e))
            })?;
            filter = filter.add_directive(directive);
        }
        Ok(filter)
    }
}

/// Install a global subscriber; fails if one is already installed
///
/// `RUST_LOG` directives are honoured for targets the config does not name.
pub fn setup_logging(config: LoggingConfig) -> RecoveryResult<()> {
    let filter = config.build_filter()?;

    let span_events = if config.log_spans {
        FmtSpan::ACTIVE
    } else {
        FmtSpan::NONE
    };

    let mut subscriber = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_span_events(span_events);

    if config.file_info {
        subscriber = subscriber.with_file(true).with_line_number(true);
    }

    let installed = if config.json {
        subscriber.with_writer(std::io::stdout).json().try_init()
    } else {
        subscriber.try_init()
    };
    installed.map_err(|e| RecoveryError::internal(format!("failed to install tracing subscriber: {}", e)))?;

    tracing::info!(
        app = %config.app_name,
        version = env!("CARGO_PKG_VERSION"),
        directives = ?config.filter_directives(),
        "Logging initialized"
    );
    Ok(())
}

/// Parse a log level such as `"debug"` or `"WARN"`
pub fn parse_log_level(level: &str) -> RecoveryResult<Level> {
    Level::from_str(level.trim())
        .map_err(|_| RecoveryError::invalid_config("log_level", format!("unknown level '{}'", level)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_parse_log_level() {
        assert_eq!(parse_log_level("debug").unwrap(), Level::DEBUG);
        assert_eq!(parse_log_level(" WARN ").unwrap(), Level::WARN);

        let err = parse_log_level("loud").unwrap_err();
        assert!(matches!(err, RecoveryError::InvalidConfiguration { ref field, .. } if field == "log_level"));
    }

    #[test]
    fn test_builder() {
        let config = LoggingConfig::new(Level::DEBUG, "agent-desk").with_json().with_file_info();
        assert_eq!(config.level, Level::DEBUG);
        assert_eq!(config.app_name, "agent-desk");
        assert!(config.json);
        assert!(config.file_info);
        assert!(!config.log_spans);
        assert!(config.recovery_level.is_none());
        assert!(config.directives.is_empty());
    }

    #[test]
    fn test_recovery_target_follows_base_level_by_default() {
        let config = LoggingConfig::new(Level::WARN, "agent-desk");
        assert_eq!(
            config.filter_directives(),
            vec!["warn".to_string(), "softphone_session_recovery=warn".to_string()]
        );
    }

    #[test]
    fn test_recovery_level_and_extra_directives() {
        let config = LoggingConfig::new(Level::WARN, "agent-desk")
            .with_recovery_level(Level::DEBUG)
            .with_directive(" softphone_session_recovery::restorer=trace ");

        assert_eq!(
            config.filter_directives(),
            vec![
                "warn".to_string(),
                "softphone_session_recovery=debug".to_string(),
                "softphone_session_recovery::restorer=trace".to_string(),
            ]
        );
        assert!(config.build_filter().is_ok());
    }

    #[test]
    fn test_malformed_directive_is_rejected() {
        let config = LoggingConfig::default().with_directive("softphone_session_recovery=loud");

        let err = config.build_filter().unwrap_err();
        assert!(matches!(err, RecoveryError::InvalidConfiguration { ref field, .. } if field == "log_directive"));
    }

    #[test]
    #[serial]
    fn test_second_install_is_an_error() {
        // The first call may lose to another test's subscriber; the second never wins
        let _ = setup_logging(LoggingConfig::default());
        let err = setup_logging(LoggingConfig::default()).unwrap_err();
        assert!(matches!(err, RecoveryError::Internal { .. }));
    }
}
