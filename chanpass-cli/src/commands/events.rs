//! Event injection: feed payment, cancel, refund, join and invite triggers
//! through the same handlers the bot uses.

use anyhow::Result;
use chanpass_subscriptions::{ChatId, InviteOutcome, MemberStatus, PaymentEvent, UserId};

use super::{print_reconciled, Context};
use crate::ui;

#[tracing::instrument(skip(ctx))]
pub async fn pay(
    ctx: &Context,
    user_id: UserId,
    charge_ref: String,
    amount: Option<u64>,
    currency: Option<String>,
) -> Result<()> {
    ui::header("Payment Received");

    let channel = &ctx.settings.channel;
    let payment = PaymentEvent::new(
        user_id,
        amount.unwrap_or(channel.price),
        currency.unwrap_or_else(|| channel.currency.clone()),
        charge_ref,
    );
    tracing::debug!("Injecting payment {:?}", payment);

    let result = ctx.service.payment_received(&payment).await?;
    print_reconciled(&result);
    ctx.show_simulated_calls();
    ui::success("Payment processed");
    Ok(())
}

#[tracing::instrument(skip(ctx))]
pub async fn cancel(ctx: &Context, user_id: UserId) -> Result<()> {
    ui::header("Cancel Subscription");

    let result = ctx.service.cancel(user_id).await?;
    print_reconciled(&result);
    ctx.show_simulated_calls();
    Ok(())
}

#[tracing::instrument(skip(ctx))]
pub async fn refund(ctx: &Context, user_id: UserId, context_id: Option<ChatId>) -> Result<()> {
    ui::header("Refund Request");

    // Requests normally come from the user's private chat
    let context_id = context_id.unwrap_or_else(|| ChatId::from(user_id));
    let result = ctx.service.refund(user_id, context_id).await?;
    print_reconciled(&result);
    ctx.show_simulated_calls();
    Ok(())
}

#[tracing::instrument(skip(ctx))]
pub async fn join(ctx: &Context, user_id: UserId, status: MemberStatus) -> Result<()> {
    ui::header("Membership Update");

    match ctx.service.member_joined(user_id, status).await? {
        Some(result) => print_reconciled(&result),
        None => ui::info(&format!("Status '{}' is not a join, nothing to do", status)),
    }
    ctx.show_simulated_calls();
    Ok(())
}

#[tracing::instrument(skip(ctx))]
pub async fn invite(ctx: &Context, user_id: UserId) -> Result<()> {
    ui::header("Invite Link");

    match ctx.service.invite_link(user_id).await? {
        InviteOutcome::Sent(link) => {
            ui::key_value("Link", &link.url);
            ui::success(&format!("Invite link sent to {}", user_id));
        }
        InviteOutcome::AlreadyMember => ui::info("User is already in the channel"),
        InviteOutcome::NoActiveSubscription => ui::warning("User has no active subscription"),
    }
    ctx.show_simulated_calls();
    Ok(())
}
