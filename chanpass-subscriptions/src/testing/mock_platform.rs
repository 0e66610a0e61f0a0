//! In-memory chat platform.

use crate::errors::PlatformError;
use crate::platform::{ChannelPlatform, InviteLink, MemberStatus, Result};
use crate::record::{ChatId, UserId};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Platform method, used to inject failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlatformMethod {
    MemberStatus,
    Ban,
    Unban,
    CreateInviteLink,
    SendMessage,
}

/// One recorded call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformCall {
    MemberStatus {
        user: UserId,
    },
    Ban {
        user: UserId,
    },
    Unban {
        user: UserId,
    },
    CreateInviteLink {
        member_limit: u32,
        expire_at: i64,
    },
    SendMessage {
        chat: ChatId,
        text: String,
    },
}

#[derive(Default)]
struct MockState {
    statuses: HashMap<UserId, MemberStatus>,
    calls: Vec<PlatformCall>,
    failing: HashSet<PlatformMethod>,
    failing_users: HashSet<UserId>,
}

/// In-memory implementation of [`ChannelPlatform`].
///
/// Users without a configured status are reported as unknown
/// ([`PlatformError::NotFound`]) unless a default status is set. Banning
/// moves a user to `kicked`, unbanning a kicked user moves them to `left`.
#[derive(Clone, Default)]
pub struct MockPlatform {
    state: Arc<Mutex<MockState>>,
    default_status: Option<MemberStatus>,
    links_issued: Arc<AtomicU64>,
}

impl MockPlatform {
    /// Create a new mock platform with no members.
    pub fn new() -> Self {
        Self::default()
    }

    /// Report `status` for users that were never configured.
    pub fn with_default_status(mut self, status: MemberStatus) -> Self {
        self.default_status = Some(status);
        self
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Set a user's membership status.
    pub fn set_status(&self, user: UserId, status: MemberStatus) {
        self.state().statuses.insert(user, status);
    }

    /// Current status of a user, if known.
    pub fn status_of(&self, user: UserId) -> Option<MemberStatus> {
        self.state()
            .statuses
            .get(&user)
            .copied()
            .or(self.default_status)
    }

    /// Make every call to `method` fail with a transport error.
    pub fn fail_method(&self, method: PlatformMethod) {
        self.state().failing.insert(method);
    }

    /// Make every call that concerns `user` fail with a transport error.
    pub fn fail_user(&self, user: UserId) {
        self.state().failing_users.insert(user);
    }

    /// Remove all injected failures.
    pub fn heal(&self) {
        let mut state = self.state();
        state.failing.clear();
        state.failing_users.clear();
    }

    /// All calls so far, in order.
    pub fn calls(&self) -> Vec<PlatformCall> {
        self.state().calls.clone()
    }

    /// Forget recorded calls.
    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    /// Texts sent to `chat`, in order.
    pub fn messages_to(&self, chat: ChatId) -> Vec<String> {
        self.state()
            .calls
            .iter()
            .filter_map(|call| match call {
                PlatformCall::SendMessage { chat: c, text } if *c == chat => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    /// Number of ban calls for `user`.
    pub fn bans_of(&self, user: UserId) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|call| matches!(call, PlatformCall::Ban { user: u } if *u == user))
            .count()
    }

    /// Number of invite links created.
    pub fn links_issued(&self) -> u64 {
        self.links_issued.load(Ordering::SeqCst)
    }

    fn record(
        &self,
        call: PlatformCall,
        method: PlatformMethod,
        user: Option<UserId>,
    ) -> Result<std::sync::MutexGuard<'_, MockState>> {
        tracing::debug!("mock platform call: {:?}", call);
        let mut state = self.state();
        state.calls.push(call);
        let user_fails = user.is_some_and(|u| state.failing_users.contains(&u));
        if state.failing.contains(&method) || user_fails {
            return Err(PlatformError::Transport(format!(
                "injected failure for {:?}",
                method
            )));
        }
        Ok(state)
    }
}

#[async_trait]
impl ChannelPlatform for MockPlatform {
    async fn member_status(&self, _channel: ChatId, user: UserId) -> Result<MemberStatus> {
        let state = self.record(
            PlatformCall::MemberStatus { user },
            PlatformMethod::MemberStatus,
            Some(user),
        )?;
        state
            .statuses
            .get(&user)
            .copied()
            .or(self.default_status)
            .ok_or_else(|| PlatformError::NotFound(format!("user {} not found", user)))
    }

    async fn ban_member(&self, _channel: ChatId, user: UserId) -> Result<()> {
        let mut state = self.record(PlatformCall::Ban { user }, PlatformMethod::Ban, Some(user))?;
        state.statuses.insert(user, MemberStatus::Kicked);
        Ok(())
    }

    async fn unban_member(&self, _channel: ChatId, user: UserId) -> Result<()> {
        let mut state =
            self.record(PlatformCall::Unban { user }, PlatformMethod::Unban, Some(user))?;
        if state.statuses.get(&user) == Some(&MemberStatus::Kicked) {
            state.statuses.insert(user, MemberStatus::Left);
        }
        Ok(())
    }

    async fn create_invite_link(
        &self,
        _channel: ChatId,
        member_limit: u32,
        expire_at: i64,
    ) -> Result<InviteLink> {
        let _state = self.record(
            PlatformCall::CreateInviteLink {
                member_limit,
                expire_at,
            },
            PlatformMethod::CreateInviteLink,
            None,
        )?;
        let n = self.links_issued.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(InviteLink {
            url: format!("https://t.me/+mock{}", n),
            member_limit,
            expire_at,
        })
    }

    async fn send_message(&self, chat: ChatId, text: &str) -> Result<()> {
        let _state = self.record(
            PlatformCall::SendMessage {
                chat,
                text: text.to_string(),
            },
            PlatformMethod::SendMessage,
            Some(UserId(chat.0)),
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHANNEL: ChatId = ChatId(-100);

    #[tokio::test]
    async fn test_ban_unban_moves_to_left() {
        let platform = MockPlatform::new();
        let user = UserId(1);
        platform.set_status(user, MemberStatus::Member);

        platform.ban_member(CHANNEL, user).await.unwrap();
        assert_eq!(platform.status_of(user), Some(MemberStatus::Kicked));
        platform.unban_member(CHANNEL, user).await.unwrap();
        assert_eq!(platform.status_of(user), Some(MemberStatus::Left));
        assert_eq!(platform.bans_of(user), 1);
    }

    #[tokio::test]
    async fn test_unknown_user_is_not_found() {
        let platform = MockPlatform::new();
        let err = platform.member_status(CHANNEL, UserId(9)).await.unwrap_err();
        assert!(matches!(err, PlatformError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_injected_failures_are_recorded() {
        let platform = MockPlatform::new();
        platform.fail_method(PlatformMethod::SendMessage);

        assert!(platform.send_message(ChatId(1), "hi").await.is_err());
        assert_eq!(platform.messages_to(ChatId(1)), vec!["hi".to_string()]);

        platform.heal();
        assert!(platform.send_message(ChatId(1), "again").await.is_ok());
    }
}
