//! Application configuration.

use crate::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use wctp_core::GatewaySettings;
use wctp_session::SessionConfig;
use wctp_telemetry::{LogFormat, LoggingConfig};
use wctp_ws::ConnectionConfig;

/// Relay endpoint configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayConfig {
    #[serde(default = "default_relay_host")]
    pub host: String,
    #[serde(default = "default_relay_port")]
    pub port: u16,
    /// Use `wss://` instead of `ws://`.
    #[serde(default)]
    pub tls: bool,
    /// Socket + upgrade timeout (ms). Default: 10,000.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Upgrade-to-handshake timeout (ms). Default: 10,000.
    #[serde(default = "default_handshake_timeout_ms")]
    pub handshake_timeout_ms: u64,
}

fn default_relay_host() -> String {
    "127.0.0.1".to_string()
}

fn default_relay_port() -> u16 {
    8888
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_handshake_timeout_ms() -> u64 {
    10_000
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: default_relay_host(),
            port: default_relay_port(),
            tls: false,
            connect_timeout_ms: default_connect_timeout_ms(),
            handshake_timeout_ms: default_handshake_timeout_ms(),
        }
    }
}

impl From<&RelayConfig> for ConnectionConfig {
    fn from(cfg: &RelayConfig) -> Self {
        Self {
            host: cfg.host.clone(),
            port: cfg.port,
            tls: cfg.tls,
            connect_timeout_ms: cfg.connect_timeout_ms,
            handshake_timeout_ms: cfg.handshake_timeout_ms,
        }
    }
}

/// Login session timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionTimingConfig {
    /// Per-step report timeout (ms). Default: 10,000.
    #[serde(default = "default_step_timeout_ms")]
    pub step_timeout_ms: u64,
    /// Account query period once ready (ms). Default: 500.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_step_timeout_ms() -> u64 {
    10_000
}

fn default_poll_interval_ms() -> u64 {
    500
}

impl Default for SessionTimingConfig {
    fn default() -> Self {
        Self {
            step_timeout_ms: default_step_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl From<SessionTimingConfig> for SessionConfig {
    fn from(cfg: SessionTimingConfig) -> Self {
        SessionConfig::from_millis(cfg.step_timeout_ms, cfg.poll_interval_ms)
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Filter directives. `RUST_LOG` applies when unset.
    #[serde(default)]
    pub log_filter: Option<String>,
    /// Force JSON output regardless of `RUST_ENV`.
    #[serde(default)]
    pub json: bool,
}

impl TelemetryConfig {
    pub fn logging(&self) -> LoggingConfig {
        let format = if self.json {
            LogFormat::Json
        } else {
            LogFormat::from_env()
        };
        LoggingConfig {
            filter: self.log_filter.clone(),
            format,
        }
    }
}

/// Main application configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub relay: RelayConfig,
    /// Non-secret login settings. The password comes from the environment.
    pub gateway: GatewaySettings,
    #[serde(default)]
    pub session: SessionTimingConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl AppConfig {
    /// Load from a specific file.
    pub fn from_file(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read config {}: {e}", path.display()))
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate TOML text.
    pub fn from_toml(content: &str) -> AppResult<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the session cannot run with.
    pub fn validate(&self) -> AppResult<()> {
        self.gateway
            .validate()
            .map_err(|e| AppError::Config(e.to_string()))?;
        if self.relay.host.is_empty() {
            return Err(AppError::Config("relay.host is empty".to_string()));
        }
        if self.session.step_timeout_ms == 0 {
            return Err(AppError::Config(
                "session.step_timeout_ms must be positive".to_string(),
            ));
        }
        if self.session.poll_interval_ms == 0 {
            return Err(AppError::Config(
                "session.poll_interval_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn connection(&self) -> ConnectionConfig {
        ConnectionConfig::from(&self.relay)
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig::from(self.session)
    }
}
