//! Command implementations

pub mod admin;
pub mod events;
pub mod watch;

use anyhow::{anyhow, Context as _, Result};
use chanpass_subscriptions::notices::{format_remaining, format_timestamp};
use chanpass_subscriptions::testing::{MockPlatform, PlatformCall};
use chanpass_subscriptions::{
    ChannelPlatform, MembershipReconciler, MemorySubscriptionStore, Reconciled,
    SqliteSubscriptionStore, SubscriptionRecord, SubscriptionService, SubscriptionStore,
    SystemClock, TelegramPlatform,
};
use std::sync::Arc;

use crate::config::Settings;
use crate::ui;

/// Everything a command needs, wired from the resolved settings
pub struct Context {
    pub settings: Settings,
    pub reconciler: Arc<MembershipReconciler>,
    pub service: SubscriptionService,
    /// Set in dry-run mode; records the platform calls that were simulated.
    /// Store writes in that mode go to an in-memory copy of the database.
    pub dry_run: Option<MockPlatform>,
}

impl Context {
    pub fn build(settings: Settings, dry_run: bool) -> Result<Self> {
        let (store, platform, mock): (
            Arc<dyn SubscriptionStore>,
            Arc<dyn ChannelPlatform>,
            Option<MockPlatform>,
        ) = if dry_run {
            // Work on an in-memory copy so nothing is written back
            tracing::info!("Dry run: platform calls are simulated, database is read-only");
            let records = SqliteSubscriptionStore::snapshot(&settings.database)
                .with_context(|| format!("Failed to read {}", settings.database.display()))?;
            tracing::debug!("Loaded {} record(s) into the dry-run store", records.len());
            let mock = MockPlatform::new();
            (
                Arc::new(MemorySubscriptionStore::with_records(records)),
                Arc::new(mock.clone()),
                Some(mock),
            )
        } else {
            let telegram = settings.telegram.clone().ok_or_else(|| {
                anyhow!("Bot token missing: pass --token, set BOT_TOKEN, or use --dry-run")
            })?;
            tracing::debug!("Opening database {}", settings.database.display());
            let store = SqliteSubscriptionStore::open(&settings.database)
                .with_context(|| format!("Failed to open {}", settings.database.display()))?;
            (
                Arc::new(store),
                Arc::new(TelegramPlatform::new(telegram)?),
                None,
            )
        };

        let reconciler = Arc::new(MembershipReconciler::new(
            store,
            platform,
            settings.channel.clone(),
            Arc::new(SystemClock),
        ));

        Ok(Self {
            service: SubscriptionService::new(reconciler.clone()),
            reconciler,
            settings,
            dry_run: mock,
        })
    }

    /// In dry-run mode, list the platform calls that would have been made.
    pub fn show_simulated_calls(&self) {
        let Some(mock) = &self.dry_run else {
            return;
        };
        let calls = mock.calls();
        if calls.is_empty() {
            return;
        }
        ui::header("Simulated platform calls");
        for call in calls {
            let line = match call {
                PlatformCall::MemberStatus { user } => format!("getChatMember user={}", user),
                PlatformCall::Ban { user } => format!("banChatMember user={}", user),
                PlatformCall::Unban { user } => format!("unbanChatMember user={}", user),
                PlatformCall::CreateInviteLink {
                    member_limit,
                    expire_at,
                } => format!(
                    "createChatInviteLink member_limit={} expire_date={}",
                    member_limit, expire_at
                ),
                PlatformCall::SendMessage { chat, text } => {
                    format!("sendMessage chat={} text={:?}", chat, text)
                }
            };
            println!("  {}", line);
        }
    }
}

/// Print the outcome of one reconciled event
pub fn print_reconciled(result: &Reconciled) {
    ui::key_value("Outcome", &format!("{:?}", result.outcome));
    for report in &result.reports {
        match &report.result {
            Ok(()) => ui::key_value(report.action.kind(), "ok"),
            Err(e) => ui::warning(&format!("{} failed: {}", report.action.kind(), e)),
        }
    }
    if let Some(link) = &result.invite {
        ui::key_value("Invite link", &link.url);
    }
    match &result.record {
        Some(record) => print_record(record),
        None => ui::key_value("Record", "none"),
    }
}

/// Print one stored record
pub fn print_record(record: &SubscriptionRecord) {
    let now = chrono::Utc::now().timestamp();
    ui::key_value("User", &record.user_id.to_string());
    ui::key_value("Expires", &format_timestamp(record.expire_at));
    if record.is_expired(now) {
        ui::key_value("Remaining", "expired");
    } else {
        ui::key_value("Remaining", &format_remaining(record.remaining_secs(now)));
    }
    ui::key_value(
        "Payment",
        record.payment_ref.as_deref().unwrap_or("(granted)"),
    );
    ui::key_value(
        "Warned",
        if record.notified_expiring { "yes" } else { "no" },
    );
}
