//! Configuration types for the subscription service and watcher.

use crate::record::{ChatId, UserId, SUBSCRIPTION_PERIOD_SECS};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// The paid channel and who administers it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Channel whose membership is gated.
    pub channel_id: ChatId,

    /// Recipient of refund requests.
    pub admin_id: UserId,

    /// Price of one subscription period, in `currency` units.
    #[serde(default = "default_price")]
    pub price: u64,

    /// Currency code payments are expected in.
    #[serde(default = "default_currency")]
    pub currency: String,

    /// Default duration of an admin grant, in seconds.
    #[serde(default = "default_grant_secs")]
    pub grant_secs: i64,
}

fn default_price() -> u64 {
    100
}

fn default_currency() -> String {
    "XTR".to_string()
}

fn default_grant_secs() -> i64 {
    SUBSCRIPTION_PERIOD_SECS
}

impl ChannelConfig {
    /// Create a configuration with the default price.
    pub fn new(channel_id: ChatId, admin_id: UserId) -> Self {
        Self {
            channel_id,
            admin_id,
            price: default_price(),
            currency: default_currency(),
            grant_secs: default_grant_secs(),
        }
    }

    /// Set the price per period.
    pub fn with_price(mut self, price: u64, currency: impl Into<String>) -> Self {
        self.price = price;
        self.currency = currency.into();
        self
    }

    /// Set the default admin grant duration.
    pub fn with_grant_secs(mut self, secs: i64) -> Self {
        self.grant_secs = secs;
        self
    }
}

/// Pacing of the background watcher.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatcherConfig {
    /// Pause between two sweeps, in seconds.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Pause after each record that touched the platform, in milliseconds.
    #[serde(default = "default_pace_ms")]
    pub pace_ms: u64,
}

fn default_interval_secs() -> u64 {
    60
}

fn default_pace_ms() -> u64 {
    50
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            pace_ms: default_pace_ms(),
        }
    }
}

impl WatcherConfig {
    /// Set the sweep interval.
    pub fn with_interval_secs(mut self, secs: u64) -> Self {
        self.interval_secs = secs;
        self
    }

    /// Set the per-record pause.
    pub fn with_pace_ms(mut self, ms: u64) -> Self {
        self.pace_ms = ms;
        self
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn pace(&self) -> Duration {
        Duration::from_millis(self.pace_ms)
    }
}

/// Connection settings for the Telegram Bot API.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Bot token issued by BotFather.
    pub token: String,

    /// API base URL.
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_api_url() -> String {
    "https://api.telegram.org".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

impl TelegramConfig {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            api_url: default_api_url(),
            timeout_secs: default_timeout_secs(),
        }
    }

    /// Point the client at another server (tests, local Bot API servers).
    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

// Never print the token.
impl std::fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("token", &"<redacted>")
            .field("api_url", &self.api_url)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}
