//! Admin commands: grant access, list records, inspect a user

use anyhow::Result;
use chanpass_subscriptions::notices::{format_remaining, format_timestamp};
use chanpass_subscriptions::{Eligibility, SubscriptionStatus, UserId};

use super::{print_reconciled, print_record, Context};
use crate::config::days_to_secs;
use crate::ui;

#[tracing::instrument(skip(ctx))]
pub async fn grant(ctx: &Context, user_id: UserId, days: Option<i64>) -> Result<()> {
    ui::header("Grant Access");

    let duration_secs = match days {
        Some(days) => days_to_secs(days)?,
        None => ctx.settings.channel.grant_secs,
    };
    let result = ctx.service.grant(user_id, duration_secs).await?;
    tracing::info!("Granted {}s to user {}", duration_secs, user_id);

    print_reconciled(&result);
    ctx.show_simulated_calls();
    ui::success(&format!("Access granted to {}", user_id));
    Ok(())
}

#[tracing::instrument(skip(ctx))]
pub async fn list(ctx: &Context, json: bool) -> Result<()> {
    let records = ctx.service.list_records().await?;

    if json {
        ui::json(&serde_json::to_value(&records)?);
        return Ok(());
    }

    ui::header("Subscriptions");
    if records.is_empty() {
        ui::info("No subscriptions stored");
        return Ok(());
    }

    for (i, record) in records.iter().enumerate() {
        if i > 0 {
            ui::separator();
        }
        print_record(record);
    }
    ui::info(&format!("{} record(s)", records.len()));
    Ok(())
}

#[tracing::instrument(skip(ctx))]
pub async fn status(ctx: &Context, user_id: UserId) -> Result<()> {
    ui::header(&format!("Subscription of {}", user_id));

    match ctx.service.status(user_id).await? {
        SubscriptionStatus::Active {
            expire_at,
            remaining_secs,
        } => {
            ui::key_value("Status", "active");
            ui::key_value("Expires", &format_timestamp(expire_at));
            ui::key_value("Remaining", &format_remaining(remaining_secs));
        }
        SubscriptionStatus::Expired { expire_at } => {
            ui::key_value("Status", "expired");
            ui::key_value("Expired", &format_timestamp(expire_at));
        }
        SubscriptionStatus::None => ui::key_value("Status", "none"),
    }

    let offer = match ctx.service.purchase_eligibility(user_id).await? {
        Eligibility::Subscribe => "subscribe",
        Eligibility::Extend => "extend",
        Eligibility::AlreadyMember => "none (already in the channel)",
    };
    ui::key_value("Purchase offer", offer);
    Ok(())
}
