//! Subscription lifecycle engine.
//!
//! [`decide`] is a pure function of `(current record, now, event)`. It never
//! touches the platform or the store; it returns the platform [`Action`]s to
//! run and the [`RecordWrite`] to persist afterwards. The reconciler
//! executes both.
//!
//! # Transitions
//!
//! | Event | Record state | Actions | Write |
//! |---|---|---|---|
//! | `Grant` / `PaymentReceived` | any | `EnsureAdmitted` | `Renew` |
//! | `PaymentReceived` | same charge already stored | none | `Keep` |
//! | `CancelRequested` | present | `EvictFromChannel` | `Delete` |
//! | `RefundRequested` | present, paid | `EvictFromChannel`, `NotifyAdminOfRefund` | `Delete` |
//! | `CancelRequested` / `RefundRequested` | absent | none | `Keep` |
//! | `ExpirySweepTick` | expired | `EvictIfMember` | `DeleteIfExpired` |
//! | `ExpirySweepTick` | expires within 24h, not notified | `SendExpiryWarning` | `MarkNotified` |
//! | `MembershipJoinObserved` | absent or expired | `EvictFromChannel`, `NotifyNoSubscription` | `Keep` / `DeleteIfExpired` |
//!
//! Writes are re-applied against the *latest* stored row inside the store's
//! atomic update, see [`RecordWrite::apply`].

use crate::record::{
    renewed_expiry, ChatId, SubscriptionRecord, UserId, EXPIRY_WARNING_WINDOW_SECS,
    SUBSCRIPTION_PERIOD_SECS,
};
use serde::{Deserialize, Serialize};

/// Something that happened to one user's subscription
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Administrative grant without a payment
    Grant { duration_secs: i64 },
    /// A payment for one subscription period succeeded
    PaymentReceived { charge_ref: String },
    /// The user asked to cancel
    CancelRequested,
    /// The user asked for a refund from chat `context_id`
    RefundRequested { context_id: ChatId },
    /// Periodic check by the watcher
    ExpirySweepTick,
    /// The user (re)joined the channel
    MembershipJoinObserved,
}

impl Event {
    /// Payment event for the standard 30-day period
    pub fn payment(charge_ref: impl Into<String>) -> Self {
        Event::PaymentReceived {
            charge_ref: charge_ref.into(),
        }
    }

    /// Grant of the standard 30-day period
    pub fn standard_grant() -> Self {
        Event::Grant {
            duration_secs: SUBSCRIPTION_PERIOD_SECS,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Event::Grant { .. } => "grant",
            Event::PaymentReceived { .. } => "payment_received",
            Event::CancelRequested => "cancel_requested",
            Event::RefundRequested { .. } => "refund_requested",
            Event::ExpirySweepTick => "expiry_sweep_tick",
            Event::MembershipJoinObserved => "membership_join_observed",
        }
    }
}

/// Why a user is being told they have no access
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialReason {
    NoRecord,
    Expired,
}

/// Platform side effect required by a decision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    /// Issue an invite link unless the user is already in the channel
    EnsureAdmitted,
    /// Ban then unban, unconditionally
    EvictFromChannel,
    /// Ban then unban, only if the user is currently a member
    EvictIfMember,
    /// Tell the user the subscription ends soon
    SendExpiryWarning { expire_at: i64 },
    /// Tell the admin a refund must be processed by hand
    NotifyAdminOfRefund {
        context_id: ChatId,
        payment_ref: String,
    },
    /// Tell the user they have no access
    NotifyNoSubscription { reason: DenialReason },
}

impl Action {
    pub fn kind(&self) -> &'static str {
        match self {
            Action::EnsureAdmitted => "ensure_admitted",
            Action::EvictFromChannel => "evict_from_channel",
            Action::EvictIfMember => "evict_if_member",
            Action::SendExpiryWarning { .. } => "send_expiry_warning",
            Action::NotifyAdminOfRefund { .. } => "notify_admin_of_refund",
            Action::NotifyNoSubscription { .. } => "notify_no_subscription",
        }
    }
}

/// Persistence step of a decision, applied after the platform actions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RecordWrite {
    /// Leave the row as it is
    Keep,
    /// Extend by `period_secs` from `max(now, expire_at)`; `charge_ref` of
    /// `None` keeps the stored payment reference
    Renew {
        period_secs: i64,
        charge_ref: Option<String>,
    },
    /// Set the notification flag if the row still expires at `expire_at`
    MarkNotified { expire_at: i64 },
    /// Remove the row
    Delete,
    /// Remove the row if it is still expired
    DeleteIfExpired,
}

impl RecordWrite {
    pub fn is_keep(&self) -> bool {
        matches!(self, RecordWrite::Keep)
    }

    /// Apply this write to the latest stored row.
    ///
    /// Called inside the store's atomic update, so a renewal or cancellation
    /// that landed after the decision was made is respected: a renewed row
    /// is never deleted by an expiry write and never flagged for a warning
    /// that was sent about its previous expiry.
    pub fn apply(
        &self,
        user_id: UserId,
        latest: Option<SubscriptionRecord>,
        now: i64,
    ) -> Option<SubscriptionRecord> {
        match self {
            RecordWrite::Keep => latest,
            RecordWrite::Renew {
                period_secs,
                charge_ref,
            } => {
                if let (Some(charge), Some(record)) = (charge_ref, &latest) {
                    if record.payment_ref.as_deref() == Some(charge.as_str()) {
                        return latest;
                    }
                }
                let expire_at =
                    renewed_expiry(latest.as_ref().map(|r| r.expire_at), now, *period_secs);
                let payment_ref = charge_ref
                    .clone()
                    .or_else(|| latest.and_then(|r| r.payment_ref));
                Some(SubscriptionRecord {
                    user_id,
                    expire_at,
                    payment_ref,
                    notified_expiring: false,
                })
            }
            RecordWrite::MarkNotified { expire_at } => latest.map(|mut record| {
                if record.expire_at == *expire_at {
                    record.notified_expiring = true;
                }
                record
            }),
            RecordWrite::Delete => None,
            RecordWrite::DeleteIfExpired => latest.filter(|record| !record.is_expired(now)),
        }
    }
}

/// Result reported to whoever triggered the event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Outcome {
    /// Subscription is (now) valid until `expire_at`
    Admitted { expire_at: i64 },
    /// The same charge was already applied
    DuplicatePayment,
    Cancelled,
    RefundRequested,
    /// Cancel or refund without a subscription
    NothingToCancel,
    /// Refund asked for a subscription that was never paid for
    NoPaymentOnRecord,
    Evicted,
    Warned,
    /// Joined without a valid subscription
    Denied,
    NoChange,
}

/// Everything the reconciler needs to carry out one event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub actions: Vec<Action>,
    pub write: RecordWrite,
    pub outcome: Outcome,
}

impl Decision {
    fn no_change() -> Self {
        Self {
            actions: Vec::new(),
            write: RecordWrite::Keep,
            outcome: Outcome::NoChange,
        }
    }

    fn without_effects(outcome: Outcome) -> Self {
        Self {
            actions: Vec::new(),
            write: RecordWrite::Keep,
            outcome,
        }
    }

    /// True when nothing needs to happen on the platform or in the store
    pub fn is_noop(&self) -> bool {
        self.actions.is_empty() && self.write.is_keep()
    }
}

/// Decide what `event` means for a user whose stored record is `current`.
pub fn decide(current: Option<&SubscriptionRecord>, now: i64, event: &Event) -> Decision {
    match event {
        Event::Grant { duration_secs } => renew(current, now, *duration_secs, None),
        Event::PaymentReceived { charge_ref } => {
            if current.is_some_and(|r| r.payment_ref.as_deref() == Some(charge_ref.as_str())) {
                return Decision::without_effects(Outcome::DuplicatePayment);
            }
            renew(current, now, SUBSCRIPTION_PERIOD_SECS, Some(charge_ref.clone()))
        }
        Event::CancelRequested => match current {
            None => Decision::without_effects(Outcome::NothingToCancel),
            Some(_) => Decision {
                actions: vec![Action::EvictFromChannel],
                write: RecordWrite::Delete,
                outcome: Outcome::Cancelled,
            },
        },
        Event::RefundRequested { context_id } => match current {
            None => Decision::without_effects(Outcome::NothingToCancel),
            Some(SubscriptionRecord {
                payment_ref: None, ..
            }) => Decision::without_effects(Outcome::NoPaymentOnRecord),
            Some(SubscriptionRecord {
                payment_ref: Some(payment_ref),
                ..
            }) => Decision {
                actions: vec![
                    Action::NotifyAdminOfRefund {
                        context_id: *context_id,
                        payment_ref: payment_ref.clone(),
                    },
                    Action::EvictFromChannel,
                ],
                write: RecordWrite::Delete,
                outcome: Outcome::RefundRequested,
            },
        },
        Event::ExpirySweepTick => match current {
            None => Decision::no_change(),
            Some(record) if record.is_expired(now) => Decision {
                actions: vec![Action::EvictIfMember],
                write: RecordWrite::DeleteIfExpired,
                outcome: Outcome::Evicted,
            },
            Some(record)
                if !record.notified_expiring
                    && record.expires_within(now, EXPIRY_WARNING_WINDOW_SECS) =>
            {
                Decision {
                    actions: vec![Action::SendExpiryWarning {
                        expire_at: record.expire_at,
                    }],
                    write: RecordWrite::MarkNotified {
                        expire_at: record.expire_at,
                    },
                    outcome: Outcome::Warned,
                }
            }
            Some(_) => Decision::no_change(),
        },
        Event::MembershipJoinObserved => match current {
            None => Decision {
                actions: vec![
                    Action::EvictFromChannel,
                    Action::NotifyNoSubscription {
                        reason: DenialReason::NoRecord,
                    },
                ],
                write: RecordWrite::Keep,
                outcome: Outcome::Denied,
            },
            Some(record) if record.is_expired(now) => Decision {
                actions: vec![
                    Action::EvictFromChannel,
                    Action::NotifyNoSubscription {
                        reason: DenialReason::Expired,
                    },
                ],
                write: RecordWrite::DeleteIfExpired,
                outcome: Outcome::Denied,
            },
            Some(_) => Decision::no_change(),
        },
    }
}

fn renew(
    current: Option<&SubscriptionRecord>,
    now: i64,
    period_secs: i64,
    charge_ref: Option<String>,
) -> Decision {
    let expire_at = renewed_expiry(current.map(|r| r.expire_at), now, period_secs);
    Decision {
        actions: vec![Action::EnsureAdmitted],
        write: RecordWrite::Renew {
            period_secs,
            charge_ref,
        },
        outcome: Outcome::Admitted { expire_at },
    }
}
