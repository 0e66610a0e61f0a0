//! Chat-platform capabilities consumed by the reconciler.

use crate::errors::PlatformError;
use crate::record::{ChatId, UserId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

pub type Result<T> = std::result::Result<T, PlatformError>;

/// A user's membership status in a chat
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberStatus {
    Creator,
    Administrator,
    Member,
    Restricted,
    Left,
    Kicked,
}

impl MemberStatus {
    /// Whether the user can currently see the channel
    pub fn is_member(&self) -> bool {
        matches!(
            self,
            Self::Creator | Self::Administrator | Self::Member | Self::Restricted
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Creator => "creator",
            Self::Administrator => "administrator",
            Self::Member => "member",
            Self::Restricted => "restricted",
            Self::Left => "left",
            Self::Kicked => "kicked",
        }
    }
}

impl fmt::Display for MemberStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MemberStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "creator" => Ok(Self::Creator),
            "administrator" => Ok(Self::Administrator),
            "member" => Ok(Self::Member),
            "restricted" => Ok(Self::Restricted),
            "left" => Ok(Self::Left),
            "kicked" => Ok(Self::Kicked),
            other => Err(format!("unknown member status: {}", other)),
        }
    }
}

/// An invite link issued for one user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InviteLink {
    pub url: String,
    pub member_limit: u32,
    /// Epoch seconds after which the link stops working
    pub expire_at: i64,
}

/// Operations the subscription engine needs from the chat platform
///
/// Implementations perform one network call per method and report failures
/// as [`PlatformError`]; retries and error policy live in the reconciler.
#[async_trait]
pub trait ChannelPlatform: Send + Sync {
    async fn member_status(&self, channel: ChatId, user: UserId) -> Result<MemberStatus>;

    async fn ban_member(&self, channel: ChatId, user: UserId) -> Result<()>;

    /// Lift a ban so the user may rejoin through a new invite. Unbanning a
    /// user who is not banned succeeds.
    async fn unban_member(&self, channel: ChatId, user: UserId) -> Result<()>;

    async fn create_invite_link(
        &self,
        channel: ChatId,
        member_limit: u32,
        expire_at: i64,
    ) -> Result<InviteLink>;

    async fn send_message(&self, chat: ChatId, text: &str) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_membership_classification() {
        assert!(MemberStatus::Restricted.is_member());
        assert!(MemberStatus::Creator.is_member());
        assert!(!MemberStatus::Left.is_member());
        assert!(!MemberStatus::Kicked.is_member());
    }

    #[test]
    fn test_status_parse_roundtrip() {
        for status in [
            MemberStatus::Creator,
            MemberStatus::Administrator,
            MemberStatus::Member,
            MemberStatus::Restricted,
            MemberStatus::Left,
            MemberStatus::Kicked,
        ] {
            assert_eq!(status.as_str().parse::<MemberStatus>(), Ok(status));
        }
        assert!("banned".parse::<MemberStatus>().is_err());
    }
}
