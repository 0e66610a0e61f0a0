//! Testing utilities for chanpass.
//!
//! [`MockPlatform`] implements [`crate::platform::ChannelPlatform`] in
//! memory: it tracks member statuses, records every call, and can be told to
//! fail specific methods. The CLI also uses it for `--dry-run`.
//!
//! # Usage
//!
//! ```rust
//! use chanpass_subscriptions::testing::{MockPlatform, PlatformCall};
//! use chanpass_subscriptions::{MemberStatus, UserId};
//!
//! let platform = MockPlatform::new();
//! platform.set_status(UserId(7), MemberStatus::Member);
//! assert!(platform.calls().is_empty());
//! ```

pub mod mock_platform;

pub use mock_platform::{MockPlatform, PlatformCall, PlatformMethod};
