//! Read models filled from trade-channel reports.

use crate::error::Result;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Last successfully queried trading account figures.
///
/// Field names follow the exchange's `TradingAccount` record. Instances
/// are immutable once built; a new poll response produces a new snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AccountSnapshot {
    #[serde(rename = "BrokerID", default)]
    pub broker_id: String,
    #[serde(rename = "AccountID", default)]
    pub account_id: String,
    #[serde(default)]
    pub pre_balance: Decimal,
    #[serde(default)]
    pub balance: Decimal,
    #[serde(default)]
    pub available: Decimal,
    #[serde(default)]
    pub curr_margin: Decimal,
    #[serde(default)]
    pub frozen_margin: Decimal,
    #[serde(default)]
    pub frozen_commission: Decimal,
    #[serde(default)]
    pub commission: Decimal,
    #[serde(default)]
    pub close_profit: Decimal,
    #[serde(default)]
    pub position_profit: Decimal,
    #[serde(default)]
    pub withdraw_quota: Decimal,
    #[serde(default)]
    pub deposit: Decimal,
    #[serde(default)]
    pub withdraw: Decimal,
    #[serde(default)]
    pub trading_day: String,
    /// Local receive time.
    #[serde(skip, default = "Utc::now")]
    pub received_at: DateTime<Utc>,
}

impl AccountSnapshot {
    /// Parse a `trading_account` report body.
    pub fn from_body(body: &serde_json::Value) -> Result<Self> {
        let mut snapshot: Self = serde_json::from_value(body.clone())?;
        snapshot.received_at = Utc::now();
        Ok(snapshot)
    }

    /// Balance minus margin in use.
    pub fn equity_free(&self) -> Decimal {
        self.balance - self.curr_margin
    }
}

/// Trade login response recorded at bootstrap step 6.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TradeLoginSnapshot {
    #[serde(default)]
    pub trading_day: Option<String>,
    #[serde(default)]
    pub login_time: Option<String>,
    #[serde(rename = "BrokerID", default)]
    pub broker_id: Option<String>,
    #[serde(rename = "UserID", default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub system_name: Option<String>,
    #[serde(rename = "FrontID", default)]
    pub front_id: Option<i32>,
    #[serde(rename = "SessionID", default)]
    pub session_id: Option<i64>,
    #[serde(default)]
    pub max_order_ref: Option<String>,
}

impl TradeLoginSnapshot {
    /// Parse a trade `login` report body; missing or odd bodies yield an empty snapshot.
    pub fn from_body(body: Option<&serde_json::Value>) -> Self {
        body.and_then(|b| serde_json::from_value(b.clone()).ok())
            .unwrap_or_default()
    }
}
