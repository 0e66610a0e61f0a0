//! # Chanpass Subscriptions
//!
//! Paid, time-limited access to a private channel.
//!
//! ## Model
//!
//! - One [`SubscriptionRecord`] per user: expiry, last payment reference and
//!   whether the "expires soon" notice went out.
//! - [`lifecycle::decide`] turns `(record, now, event)` into platform actions
//!   plus a guarded record write. It is pure and does no I/O.
//! - [`MembershipReconciler`] runs the actions against a [`ChannelPlatform`]
//!   (ban + unban to evict, single-use invite links to admit) and then
//!   persists the write through [`SubscriptionStore::update`].
//! - [`SubscriptionWatcher`] sweeps all records on an interval, evicting
//!   expired users and warning those about to expire.
//! - [`SubscriptionService`] is the entry point for payments, cancellations,
//!   refunds, joins and the user/admin queries.
//!
//! ## Consistency
//!
//! Decisions are made from a snapshot, but writes are re-applied to the
//! latest row inside the store's atomic update. A payment racing with an
//! expiry sweep therefore never loses the renewal, and the same charge is
//! never applied twice.
//!
//! ## Features
//!
//! - `telegram`: [`TelegramPlatform`], a Bot API client over `reqwest`.

pub mod clock;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod lifecycle;
pub mod notices;
pub mod platform;
pub mod reconciler;
pub mod record;
pub mod sqlite;
pub mod storage;
pub mod testing;
pub mod watcher;

#[cfg(feature = "telegram")]
pub mod telegram;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ChannelConfig, TelegramConfig, WatcherConfig};
pub use errors::{PlatformError, PlatformErrorKind, StorageError, SubscriptionError};
pub use handlers::{Eligibility, InviteOutcome, PaymentEvent, SubscriptionService, SubscriptionStatus};
pub use lifecycle::{decide, Action, Decision, DenialReason, Event, Outcome, RecordWrite};
pub use platform::{ChannelPlatform, InviteLink, MemberStatus};
pub use reconciler::{ActionReport, Admission, MembershipReconciler, Reconciled};
pub use record::{
    ChatId, SubscriptionRecord, UserId, EXPIRY_WARNING_WINDOW_SECS, INVITE_LINK_TTL_SECS,
    INVITE_MEMBER_LIMIT, SUBSCRIPTION_PERIOD_SECS,
};
pub use sqlite::SqliteSubscriptionStore;
pub use storage::{MemorySubscriptionStore, RecordUpdate, SubscriptionStore};
pub use watcher::{SubscriptionWatcher, SweepReport};

#[cfg(feature = "telegram")]
pub use telegram::TelegramPlatform;

pub type Result<T> = std::result::Result<T, SubscriptionError>;
