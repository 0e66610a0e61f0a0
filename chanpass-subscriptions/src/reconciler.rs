//! Membership reconciler.
//!
//! Carries out a lifecycle [`Decision`] for one user: platform actions run
//! first, each in isolation, then the record write is persisted through the
//! store's atomic update. Platform failures are logged and reported, never
//! propagated; storage failures are returned to the caller.

use crate::clock::Clock;
use crate::config::ChannelConfig;
use crate::errors::{PlatformError, StorageError};
use crate::lifecycle::{decide, Action, Decision, Event, Outcome, RecordWrite};
use crate::notices::Notice;
use crate::platform::{ChannelPlatform, InviteLink, MemberStatus};
use crate::record::{ChatId, SubscriptionRecord, UserId, INVITE_LINK_TTL_SECS, INVITE_MEMBER_LIMIT};
use crate::storage::SubscriptionStore;
use std::sync::Arc;

/// How one platform action went
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionReport {
    pub action: Action,
    pub result: Result<(), PlatformError>,
}

impl ActionReport {
    pub fn succeeded(&self) -> bool {
        self.result.is_ok()
    }
}

/// Result of reconciling one event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciled {
    pub outcome: Outcome,
    pub reports: Vec<ActionReport>,
    /// The row as stored after the write
    pub record: Option<SubscriptionRecord>,
    /// Invite link delivered while admitting the user, if any
    pub invite: Option<InviteLink>,
    /// Whether the user was actually banned out of the channel
    pub removed: bool,
}

impl Reconciled {
    /// Whether any platform call was made
    pub fn touched_platform(&self) -> bool {
        !self.reports.is_empty()
    }

    /// Number of actions that failed
    pub fn failures(&self) -> usize {
        self.reports.iter().filter(|r| !r.succeeded()).count()
    }
}

/// What admitting a user amounted to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// A fresh single-use link was delivered
    LinkSent(InviteLink),
    /// The user was already in the channel
    AlreadyMember,
}

/// Drives platform side effects and persistence for lifecycle decisions
#[derive(Clone)]
pub struct MembershipReconciler {
    store: Arc<dyn SubscriptionStore>,
    platform: Arc<dyn ChannelPlatform>,
    config: ChannelConfig,
    clock: Arc<dyn Clock>,
}

impl MembershipReconciler {
    pub fn new(
        store: Arc<dyn SubscriptionStore>,
        platform: Arc<dyn ChannelPlatform>,
        config: ChannelConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            platform,
            config,
            clock,
        }
    }

    pub fn store(&self) -> &Arc<dyn SubscriptionStore> {
        &self.store
    }

    pub fn platform(&self) -> &Arc<dyn ChannelPlatform> {
        &self.platform
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    pub fn now(&self) -> i64 {
        self.clock.now()
    }

    /// Decide and carry out `event` for `user_id`.
    #[tracing::instrument(skip(self, event), fields(event = event.kind()))]
    pub async fn apply(&self, user_id: UserId, event: Event) -> Result<Reconciled, StorageError> {
        let now = self.clock.now();
        let current = self.store.get(user_id).await?;
        let decision = decide(current.as_ref(), now, &event);

        if decision.is_noop() {
            tracing::debug!("No change for user {}: {:?}", user_id, decision.outcome);
            return Ok(Reconciled {
                outcome: decision.outcome,
                reports: Vec::new(),
                record: current,
                invite: None,
                removed: false,
            });
        }

        tracing::info!(
            "User {}: {} -> {:?}",
            user_id,
            event.kind(),
            decision.outcome
        );
        self.execute(user_id, current, now, decision).await
    }

    async fn execute(
        &self,
        user_id: UserId,
        current: Option<SubscriptionRecord>,
        now: i64,
        decision: Decision,
    ) -> Result<Reconciled, StorageError> {
        let Decision {
            actions,
            write,
            outcome,
        } = decision;

        let mut reports = Vec::with_capacity(actions.len());
        let mut invite = None;
        let mut removed = false;
        for action in actions {
            let result = match &action {
                Action::EnsureAdmitted => match self.admit(user_id, now).await {
                    Ok(Admission::LinkSent(link)) => {
                        invite = Some(link);
                        Ok(())
                    }
                    Ok(Admission::AlreadyMember) => Ok(()),
                    Err(e) => Err(e),
                },
                Action::EvictFromChannel => self.evict(user_id).await.map(|()| removed = true),
                Action::EvictIfMember => match self.evict_if_member(user_id).await {
                    Ok(banned) => {
                        removed |= banned;
                        Ok(())
                    }
                    Err(e) => Err(e),
                },
                Action::SendExpiryWarning { expire_at } => {
                    let notice = Notice::ExpiringSoon {
                        expire_at: *expire_at,
                    };
                    self.notify(ChatId::from(user_id), &notice).await
                }
                Action::NotifyAdminOfRefund {
                    context_id,
                    payment_ref,
                } => {
                    let notice = Notice::RefundRequest {
                        user_id,
                        context_id: *context_id,
                        payment_ref,
                    };
                    self.notify(ChatId::from(self.config.admin_id), &notice)
                        .await
                }
                Action::NotifyNoSubscription { reason } => {
                    self.notify(ChatId::from(user_id), &Notice::NoSubscription(*reason))
                        .await
                }
            };

            if let Err(e) = &result {
                tracing::warn!(
                    "Platform action {} failed for user {} ({}): {}",
                    action.kind(),
                    user_id,
                    e.kind(),
                    e
                );
            }
            reports.push(ActionReport { action, result });
        }

        let write = if Self::prerequisite_failed(&write, &reports) {
            tracing::warn!(
                "Expiry warning not delivered to user {}, will retry on next sweep",
                user_id
            );
            RecordWrite::Keep
        } else {
            write
        };

        let record = if write.is_keep() {
            current
        } else {
            self.store
                .update(
                    user_id,
                    Box::new(move |latest| write.apply(user_id, latest, now)),
                )
                .await?
        };

        Ok(Reconciled {
            outcome,
            reports,
            record,
            invite,
            removed,
        })
    }

    // The notified flag is only set once the warning actually went out.
    fn prerequisite_failed(write: &RecordWrite, reports: &[ActionReport]) -> bool {
        matches!(write, RecordWrite::MarkNotified { .. })
            && reports.iter().any(|r| {
                matches!(r.action, Action::SendExpiryWarning { .. }) && !r.succeeded()
            })
    }

    /// Make sure the user can get into the channel.
    ///
    /// Members get an "access extended" notice; everyone else gets a fresh
    /// single-use invite link.
    pub async fn admit(&self, user_id: UserId, now: i64) -> Result<Admission, PlatformError> {
        let admission = self.invite_unless_member(user_id, now).await?;
        if admission == Admission::AlreadyMember {
            self.notify(ChatId::from(user_id), &Notice::AccessExtended)
                .await?;
        }
        Ok(admission)
    }

    /// Deliver an invite link unless the user is already in the channel.
    ///
    /// A banned user is unbanned first. A failed status lookup falls back to
    /// issuing a link.
    pub async fn invite_unless_member(
        &self,
        user_id: UserId,
        now: i64,
    ) -> Result<Admission, PlatformError> {
        match self
            .platform
            .member_status(self.config.channel_id, user_id)
            .await
        {
            Ok(status) if status.is_member() => Ok(Admission::AlreadyMember),
            Ok(MemberStatus::Kicked) => {
                self.platform
                    .unban_member(self.config.channel_id, user_id)
                    .await?;
                self.send_invite(user_id, now).await.map(Admission::LinkSent)
            }
            Ok(_) | Err(PlatformError::NotFound(_)) => {
                self.send_invite(user_id, now).await.map(Admission::LinkSent)
            }
            Err(e) => {
                tracing::warn!(
                    "Status lookup for user {} failed, issuing link anyway: {}",
                    user_id,
                    e
                );
                self.send_invite(user_id, now).await.map(Admission::LinkSent)
            }
        }
    }

    /// Create a single-use link and deliver it to the user.
    pub async fn send_invite(&self, user_id: UserId, now: i64) -> Result<InviteLink, PlatformError> {
        let link = self
            .platform
            .create_invite_link(
                self.config.channel_id,
                INVITE_MEMBER_LIMIT,
                now + INVITE_LINK_TTL_SECS,
            )
            .await?;
        self.notify(ChatId::from(user_id), &Notice::Invite(&link))
            .await?;
        tracing::debug!("Invite link delivered to user {}", user_id);
        Ok(link)
    }

    /// Current membership of a user; an unknown user counts as absent.
    pub async fn membership(&self, user_id: UserId) -> Result<Option<MemberStatus>, PlatformError> {
        match self
            .platform
            .member_status(self.config.channel_id, user_id)
            .await
        {
            Ok(status) => Ok(Some(status)),
            Err(PlatformError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    // Ban then unban: removes the user without blocking a later rejoin.
    async fn evict(&self, user_id: UserId) -> Result<(), PlatformError> {
        self.platform
            .ban_member(self.config.channel_id, user_id)
            .await?;
        self.platform
            .unban_member(self.config.channel_id, user_id)
            .await
    }

    /// Evict the user if still in the channel; returns whether a ban was made.
    async fn evict_if_member(&self, user_id: UserId) -> Result<bool, PlatformError> {
        match self.membership(user_id).await {
            Ok(Some(status)) if status.is_member() => {
                if let Err(e) = self
                    .notify(ChatId::from(user_id), &Notice::SubscriptionEnded)
                    .await
                {
                    tracing::warn!("Could not tell user {} the subscription ended: {}", user_id, e);
                }
                self.evict(user_id).await.map(|()| true)
            }
            Ok(_) => {
                tracing::debug!("User {} not in channel, nothing to evict", user_id);
                Ok(false)
            }
            Err(e) => {
                tracing::warn!(
                    "Status lookup for user {} failed, evicting without notice: {}",
                    user_id,
                    e
                );
                self.evict(user_id).await.map(|()| true)
            }
        }
    }

    async fn notify(&self, chat: ChatId, notice: &Notice<'_>) -> Result<(), PlatformError> {
        self.platform.send_message(chat, &notice.render()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::record::SUBSCRIPTION_PERIOD_SECS;
    use crate::storage::MemorySubscriptionStore;
    use crate::testing::{MockPlatform, PlatformCall, PlatformMethod};

    const NOW: i64 = 1_700_000_000;
    const CHANNEL: ChatId = ChatId(-1001);
    const ADMIN: UserId = UserId(1);
    const USER: UserId = UserId(42);

    fn setup(records: Vec<SubscriptionRecord>) -> (MembershipReconciler, MockPlatform, MemorySubscriptionStore) {
        let store = MemorySubscriptionStore::with_records(records);
        let platform = MockPlatform::new();
        let reconciler = MembershipReconciler::new(
            Arc::new(store.clone()),
            Arc::new(platform.clone()),
            ChannelConfig::new(CHANNEL, ADMIN),
            Arc::new(ManualClock::new(NOW)),
        );
        (reconciler, platform, store)
    }

    #[tokio::test]
    async fn test_payment_issues_invite_for_outsider() {
        let (reconciler, platform, store) = setup(vec![]);

        let result = reconciler.apply(USER, Event::payment("ch_1")).await.unwrap();

        assert_eq!(
            result.outcome,
            Outcome::Admitted {
                expire_at: NOW + SUBSCRIPTION_PERIOD_SECS
            }
        );
        let link = result.invite.unwrap();
        assert_eq!(link.member_limit, 1);
        assert_eq!(link.expire_at, NOW + INVITE_LINK_TTL_SECS);
        assert!(platform.messages_to(ChatId::from(USER))[0].contains(&link.url));
        assert!(store.get(USER).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_payment_for_member_sends_extension_notice() {
        let (reconciler, platform, _store) = setup(vec![]);
        platform.set_status(USER, MemberStatus::Member);

        let result = reconciler.apply(USER, Event::payment("ch_1")).await.unwrap();

        assert!(result.invite.is_none());
        assert_eq!(platform.links_issued(), 0);
        assert!(platform.messages_to(ChatId::from(USER))[0].contains("Access extended"));
    }

    #[tokio::test]
    async fn test_failed_status_lookup_still_issues_link() {
        let (reconciler, platform, _store) = setup(vec![]);
        platform.fail_method(PlatformMethod::MemberStatus);

        let result = reconciler.apply(USER, Event::payment("ch_1")).await.unwrap();

        assert!(result.invite.is_some());
        assert_eq!(result.failures(), 0);
    }

    #[tokio::test]
    async fn test_kicked_user_is_unbanned_before_invite() {
        let (reconciler, platform, _store) = setup(vec![]);
        platform.set_status(USER, MemberStatus::Kicked);

        reconciler.apply(USER, Event::payment("ch_1")).await.unwrap();

        assert!(platform.calls().contains(&PlatformCall::Unban { user: USER }));
        assert_eq!(platform.links_issued(), 1);
    }

    #[tokio::test]
    async fn test_platform_failure_does_not_block_persistence() {
        let (reconciler, platform, store) =
            setup(vec![SubscriptionRecord::new(USER, NOW + 3600)]);
        platform.fail_method(PlatformMethod::Ban);

        let result = reconciler.apply(USER, Event::CancelRequested).await.unwrap();

        assert_eq!(result.outcome, Outcome::Cancelled);
        assert_eq!(result.failures(), 1);
        assert!(store.get(USER).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_undelivered_warning_is_retried() {
        let (reconciler, platform, store) =
            setup(vec![SubscriptionRecord::new(USER, NOW + 3600)]);
        platform.fail_method(PlatformMethod::SendMessage);

        reconciler.apply(USER, Event::ExpirySweepTick).await.unwrap();
        assert!(!store.get(USER).await.unwrap().unwrap().notified_expiring);

        platform.heal();
        let result = reconciler.apply(USER, Event::ExpirySweepTick).await.unwrap();
        assert_eq!(result.outcome, Outcome::Warned);
        assert!(store.get(USER).await.unwrap().unwrap().notified_expiring);
    }

    #[tokio::test]
    async fn test_expired_non_member_is_not_notified() {
        let (reconciler, platform, store) = setup(vec![SubscriptionRecord::new(USER, NOW - 1)]);
        platform.set_status(USER, MemberStatus::Left);

        let result = reconciler.apply(USER, Event::ExpirySweepTick).await.unwrap();

        assert_eq!(result.outcome, Outcome::Evicted);
        assert!(!result.removed);
        assert_eq!(platform.bans_of(USER), 0);
        assert!(platform.messages_to(ChatId::from(USER)).is_empty());
        assert!(store.get(USER).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_member_is_removed() {
        let (reconciler, platform, _store) = setup(vec![SubscriptionRecord::new(USER, NOW - 1)]);
        platform.set_status(USER, MemberStatus::Member);

        let result = reconciler.apply(USER, Event::ExpirySweepTick).await.unwrap();

        assert!(result.removed);
        assert_eq!(platform.bans_of(USER), 1);
    }

    #[tokio::test]
    async fn test_refund_reaches_admin() {
        let (reconciler, platform, _store) = setup(vec![
            SubscriptionRecord::new(USER, NOW + 3600).with_payment_ref("ch_9")
        ]);

        let result = reconciler
            .apply(
                USER,
                Event::RefundRequested {
                    context_id: ChatId(42),
                },
            )
            .await
            .unwrap();

        assert_eq!(result.outcome, Outcome::RefundRequested);
        let admin_messages = platform.messages_to(ChatId::from(ADMIN));
        assert_eq!(admin_messages.len(), 1);
        assert!(admin_messages[0].contains("ch_9"));
        assert_eq!(platform.bans_of(USER), 1);
    }
}
