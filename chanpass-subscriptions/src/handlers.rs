//! Entry points for everything that happens to a subscription.
//!
//! Each [`SubscriptionService`] method maps one external trigger (payment
//! callback, user button, membership update, admin command) onto the
//! lifecycle engine and the reconciler. Platform failures are absorbed by
//! the reconciler; storage failures come back as [`SubscriptionError`].

use crate::errors::SubscriptionError;
use crate::lifecycle::Event;
use crate::platform::{InviteLink, MemberStatus};
use crate::reconciler::{Admission, MembershipReconciler, Reconciled};
use crate::record::{ChatId, SubscriptionRecord, UserId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub type Result<T> = std::result::Result<T, SubscriptionError>;

/// A successful payment reported by the payment provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentEvent {
    pub user_id: UserId,
    pub amount: u64,
    pub currency: String,
    /// Provider charge identifier, unique per payment
    pub charge_ref: String,
}

impl PaymentEvent {
    pub fn new(
        user_id: UserId,
        amount: u64,
        currency: impl Into<String>,
        charge_ref: impl Into<String>,
    ) -> Self {
        Self {
            user_id,
            amount,
            currency: currency.into(),
            charge_ref: charge_ref.into(),
        }
    }
}

/// What a user sees when asking for their status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active { expire_at: i64, remaining_secs: i64 },
    Expired { expire_at: i64 },
    None,
}

impl SubscriptionStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, SubscriptionStatus::Active { .. })
    }
}

/// Answer to an invite-link request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InviteOutcome {
    Sent(InviteLink),
    AlreadyMember,
    NoActiveSubscription,
}

/// Whether a user should be offered a purchase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Eligibility {
    /// No active subscription: offer the first period
    Subscribe,
    /// Active subscription: offer an extension
    Extend,
    /// In the channel without a subscription (staff, owner)
    AlreadyMember,
}

/// Subscription event handlers
#[derive(Clone)]
pub struct SubscriptionService {
    reconciler: Arc<MembershipReconciler>,
}

impl SubscriptionService {
    pub fn new(reconciler: Arc<MembershipReconciler>) -> Self {
        Self { reconciler }
    }

    pub fn reconciler(&self) -> &Arc<MembershipReconciler> {
        &self.reconciler
    }

    /// Grant access without a payment.
    #[tracing::instrument(skip(self))]
    pub async fn grant(&self, user_id: UserId, duration_secs: i64) -> Result<Reconciled> {
        if duration_secs <= 0 {
            return Err(SubscriptionError::InvalidArgument(format!(
                "grant duration must be positive, got {}s",
                duration_secs
            )));
        }
        Ok(self
            .reconciler
            .apply(user_id, Event::Grant { duration_secs })
            .await?)
    }

    /// Record a successful payment and admit the payer.
    #[tracing::instrument(skip(self, payment), fields(user_id = %payment.user_id))]
    pub async fn payment_received(&self, payment: &PaymentEvent) -> Result<Reconciled> {
        if payment.charge_ref.trim().is_empty() {
            return Err(SubscriptionError::InvalidArgument(
                "payment without charge reference".to_string(),
            ));
        }

        let config = self.reconciler.config();
        if payment.amount != config.price || payment.currency != config.currency {
            // The money is already taken, so the payment is honoured anyway.
            tracing::warn!(
                "Payment {} from user {} was {} {}, expected {} {}",
                payment.charge_ref,
                payment.user_id,
                payment.amount,
                payment.currency,
                config.price,
                config.currency
            );
        }

        Ok(self
            .reconciler
            .apply(payment.user_id, Event::payment(payment.charge_ref.clone()))
            .await?)
    }

    /// User asked to cancel.
    #[tracing::instrument(skip(self))]
    pub async fn cancel(&self, user_id: UserId) -> Result<Reconciled> {
        Ok(self
            .reconciler
            .apply(user_id, Event::CancelRequested)
            .await?)
    }

    /// User asked for a refund from chat `context_id`.
    #[tracing::instrument(skip(self))]
    pub async fn refund(&self, user_id: UserId, context_id: ChatId) -> Result<Reconciled> {
        Ok(self
            .reconciler
            .apply(user_id, Event::RefundRequested { context_id })
            .await?)
    }

    /// A membership update arrived for the channel.
    ///
    /// Only joins are acted on; returns `None` for any other status.
    #[tracing::instrument(skip(self))]
    pub async fn member_joined(
        &self,
        user_id: UserId,
        status: MemberStatus,
    ) -> Result<Option<Reconciled>> {
        if !matches!(status, MemberStatus::Member | MemberStatus::Restricted) {
            tracing::debug!("Ignoring membership update for user {}: {}", user_id, status);
            return Ok(None);
        }
        let result = self
            .reconciler
            .apply(user_id, Event::MembershipJoinObserved)
            .await?;
        Ok(Some(result))
    }

    pub async fn status(&self, user_id: UserId) -> Result<SubscriptionStatus> {
        let now = self.reconciler.now();
        let status = match self.reconciler.store().get(user_id).await? {
            None => SubscriptionStatus::None,
            Some(record) if record.is_expired(now) => SubscriptionStatus::Expired {
                expire_at: record.expire_at,
            },
            Some(record) => SubscriptionStatus::Active {
                expire_at: record.expire_at,
                remaining_secs: record.remaining_secs(now),
            },
        };
        Ok(status)
    }

    /// Send a fresh invite link to a subscriber who is not in the channel.
    ///
    /// Link creation or delivery failures are returned as
    /// [`SubscriptionError::Platform`] since there is nothing to fall back on.
    #[tracing::instrument(skip(self))]
    pub async fn invite_link(&self, user_id: UserId) -> Result<InviteOutcome> {
        if !self.status(user_id).await?.is_active() {
            return Ok(InviteOutcome::NoActiveSubscription);
        }
        let now = self.reconciler.now();
        match self.reconciler.invite_unless_member(user_id, now).await? {
            Admission::LinkSent(link) => Ok(InviteOutcome::Sent(link)),
            Admission::AlreadyMember => Ok(InviteOutcome::AlreadyMember),
        }
    }

    /// Decide which purchase to offer a user.
    pub async fn purchase_eligibility(&self, user_id: UserId) -> Result<Eligibility> {
        if self.status(user_id).await?.is_active() {
            return Ok(Eligibility::Extend);
        }
        match self.reconciler.membership(user_id).await {
            Ok(Some(status)) if status.is_member() => Ok(Eligibility::AlreadyMember),
            Ok(_) => Ok(Eligibility::Subscribe),
            Err(e) => {
                tracing::warn!("Status lookup for user {} failed: {}", user_id, e);
                Ok(Eligibility::Subscribe)
            }
        }
    }

    /// Every stored record, ordered by user id.
    pub async fn list_records(&self) -> Result<Vec<SubscriptionRecord>> {
        Ok(self.reconciler.store().list_all().await?)
    }
}
