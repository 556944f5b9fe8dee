//! Credentials and gateway settings supplied at login time.

use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

/// Exchange front address the relay connects to on the client's behalf.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrontAddress {
    pub addr: String,
    pub port: u16,
}

impl FrontAddress {
    pub fn new(addr: impl Into<String>, port: u16) -> Self {
        Self {
            addr: addr.into(),
            port,
        }
    }
}

impl std::fmt::Display for FrontAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.addr, self.port)
    }
}

/// Non-secret settings for one login attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewaySettings {
    /// Trading endpoint handed to the relay in `TradeConnect`.
    pub trade_url: String,
    /// Market-data endpoint handed to the relay in `MarketDataConnect`.
    pub market_data_url: String,
    pub broker_id: String,
    pub user_id: String,
    /// Defaults to `user_id` when not set.
    #[serde(default)]
    pub investor_id: Option<String>,
    pub app_id: String,
    pub auth_code: String,
    pub trade_front: FrontAddress,
    pub market_data_front: FrontAddress,
}

impl GatewaySettings {
    pub fn investor_id(&self) -> &str {
        self.investor_id.as_deref().unwrap_or(&self.user_id)
    }

    /// Check that every required field is present.
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("trade_url", &self.trade_url),
            ("market_data_url", &self.market_data_url),
            ("broker_id", &self.broker_id),
            ("user_id", &self.user_id),
            ("app_id", &self.app_id),
            ("trade_front.addr", &self.trade_front.addr),
            ("market_data_front.addr", &self.market_data_front.addr),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(CoreError::InvalidConfig(format!("{name} must not be empty")));
            }
        }
        if self.trade_front.port == 0 || self.market_data_front.port == 0 {
            return Err(CoreError::InvalidConfig(
                "front port must be nonzero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Broker/user identity plus password.
///
/// The password is wiped from memory when the value is dropped and never
/// appears in `Debug` output.
#[derive(Clone)]
pub struct Credentials {
    broker_id: String,
    user_id: String,
    password: Zeroizing<String>,
}

impl Credentials {
    pub fn new(
        broker_id: impl Into<String>,
        user_id: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            broker_id: broker_id.into(),
            user_id: user_id.into(),
            password: Zeroizing::new(password.into()),
        }
    }

    pub fn broker_id(&self) -> &str {
        &self.broker_id
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("broker_id", &self.broker_id)
            .field("user_id", &self.user_id)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Everything the "begin login" command carries.
#[derive(Debug, Clone)]
pub struct LoginRequest {
    pub settings: GatewaySettings,
    pub credentials: Credentials,
}

impl LoginRequest {
    /// Build a request; identity is taken from the settings.
    pub fn new(settings: GatewaySettings, password: impl Into<String>) -> Self {
        let credentials = Credentials::new(
            settings.broker_id.clone(),
            settings.user_id.clone(),
            password,
        );
        Self {
            settings,
            credentials,
        }
    }
}
