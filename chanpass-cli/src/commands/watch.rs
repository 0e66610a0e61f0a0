//! Watcher commands: run the background loop, or sweep once

use anyhow::Result;
use chanpass_subscriptions::{SubscriptionWatcher, WatcherConfig};
use tokio::sync::watch;

use super::Context;
use crate::ui;

#[tracing::instrument(skip(ctx))]
pub async fn run(ctx: &Context, config: WatcherConfig) -> Result<()> {
    ui::header("Chanpass Watcher");
    ui::key_value("Channel", &ctx.settings.channel.channel_id.to_string());
    ui::key_value("Database", &ctx.settings.database.display().to_string());
    ui::key_value("Interval", &format!("{}s", config.interval_secs));
    ui::key_value("Pace", &format!("{}ms", config.pace_ms));
    ui::info("Press Ctrl-C to stop");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = SubscriptionWatcher::new(ctx.reconciler.clone(), config).spawn(shutdown_rx);

    tokio::signal::ctrl_c().await?;
    ui::info("Shutting down, finishing current record...");
    shutdown_tx.send(true)?;
    handle.await?;

    ctx.show_simulated_calls();
    ui::success("Watcher stopped");
    Ok(())
}

#[tracing::instrument(skip(ctx))]
pub async fn sweep(ctx: &Context) -> Result<()> {
    ui::header("Expiry Sweep");

    let watcher = SubscriptionWatcher::new(ctx.reconciler.clone(), ctx.settings.watcher.clone());
    let report = watcher.sweep_once().await?;

    ui::key_value("Examined", &report.examined.to_string());
    ui::key_value("Evicted", &report.evicted.to_string());
    ui::key_value("Warned", &report.warned.to_string());
    if report.failed > 0 {
        ui::warning(&format!("{} record(s) had failures, see logs", report.failed));
    }

    ctx.show_simulated_calls();
    ui::success("Sweep complete");
    Ok(())
}
