use serde::{Deserialize, Serialize};
use std::fmt;

/// Length of one paid subscription period (30 days).
pub const SUBSCRIPTION_PERIOD_SECS: i64 = 30 * 24 * 3600;

/// How long before expiry the "expiring soon" notice goes out (24 hours).
pub const EXPIRY_WARNING_WINDOW_SECS: i64 = 24 * 3600;

/// Lifetime of an issued invite link (24 hours).
pub const INVITE_LINK_TTL_SECS: i64 = 24 * 3600;

/// Number of joins an issued invite link allows.
pub const INVITE_MEMBER_LIMIT: u32 = 1;

/// Platform user identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for UserId {
    fn from(id: i64) -> Self {
        UserId(id)
    }
}

/// Platform chat identifier (channel, group or private chat)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatId(pub i64);

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<UserId> for ChatId {
    /// A user's private chat shares the user's id.
    fn from(user: UserId) -> Self {
        ChatId(user.0)
    }
}

/// One user's subscription state
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubscriptionRecord {
    pub user_id: UserId,
    /// Epoch seconds; the subscription is valid while `now < expire_at`
    pub expire_at: i64,
    /// Charge identifier of the last payment that produced or extended the record
    pub payment_ref: Option<String>,
    /// Set once the 24h notice went out for the current `expire_at`
    pub notified_expiring: bool,
}

impl SubscriptionRecord {
    /// Create a new record
    pub fn new(user_id: UserId, expire_at: i64) -> Self {
        Self {
            user_id,
            expire_at,
            payment_ref: None,
            notified_expiring: false,
        }
    }

    /// Set payment reference
    pub fn with_payment_ref(mut self, payment_ref: impl Into<String>) -> Self {
        self.payment_ref = Some(payment_ref.into());
        self
    }

    /// Set notification flag
    pub fn with_notified(mut self, notified: bool) -> Self {
        self.notified_expiring = notified;
        self
    }

    /// Check if subscription has expired at `now`
    pub fn is_expired(&self, now: i64) -> bool {
        self.expire_at <= now
    }

    /// Seconds left until expiry, zero once expired
    pub fn remaining_secs(&self, now: i64) -> i64 {
        (self.expire_at - now).max(0)
    }

    /// Check if expiry falls inside `(now, now + window]`
    pub fn expires_within(&self, now: i64, window_secs: i64) -> bool {
        let remaining = self.expire_at - now;
        remaining > 0 && remaining <= window_secs
    }
}

/// Expiry after renewing a subscription that currently expires at `current_expire`.
///
/// An expired (or absent) subscription restarts from `now`; an active one is
/// extended from its old expiry, never shortened.
pub fn renewed_expiry(current_expire: Option<i64>, now: i64, period_secs: i64) -> i64 {
    current_expire.unwrap_or(now).max(now).saturating_add(period_secs)
}
