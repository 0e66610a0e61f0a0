//! User- and admin-facing message texts.

use crate::lifecycle::DenialReason;
use crate::platform::InviteLink;
use crate::record::{ChatId, UserId};

const DATE_FORMAT: &str = "%d-%m-%Y %H:%M:%S UTC";

/// A message the reconciler or a handler sends
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice<'a> {
    ExpiringSoon { expire_at: i64 },
    SubscriptionEnded,
    NoSubscription(DenialReason),
    Invite(&'a InviteLink),
    AccessExtended,
    RefundRequest {
        user_id: UserId,
        context_id: ChatId,
        payment_ref: &'a str,
    },
}

impl Notice<'_> {
    pub fn render(&self) -> String {
        match self {
            Notice::ExpiringSoon { expire_at } => format!(
                "⏰ Your subscription expires in less than 24 hours ({}). Extend it to keep access to the channel.",
                format_timestamp(*expire_at)
            ),
            Notice::SubscriptionEnded => {
                "⏰ Your subscription has ended. You have been removed from the channel.".to_string()
            }
            Notice::NoSubscription(DenialReason::NoRecord) => {
                "❌ You do not have an active subscription, access to the channel is closed."
                    .to_string()
            }
            Notice::NoSubscription(DenialReason::Expired) => {
                "⏰ Your subscription has expired, access to the channel is closed.".to_string()
            }
            Notice::Invite(link) => format!(
                "Here is your personal link to join the channel (single use, valid until {}):\n{}",
                format_timestamp(link.expire_at),
                link.url
            ),
            Notice::AccessExtended => "You are already in the channel. Access extended!".to_string(),
            Notice::RefundRequest {
                user_id,
                context_id,
                payment_ref,
            } => format!(
                "Refund request:\nUser ID: {}\nChat ID: {}\nPayment ID: {}\nPlease process the refund manually.",
                user_id, context_id, payment_ref
            ),
        }
    }
}

/// Format epoch seconds for display
pub fn format_timestamp(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format(DATE_FORMAT).to_string())
        .unwrap_or_else(|| ts.to_string())
}

/// Format a duration in seconds as "Nd Nh Nm"
pub fn format_remaining(secs: i64) -> String {
    let secs = secs.max(0);
    let days = secs / 86_400;
    let hours = (secs % 86_400) / 3600;
    let minutes = (secs % 3600) / 60;
    format!("{}d {}h {}m", days, hours, minutes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refund_notice_mentions_ids() {
        let text = Notice::RefundRequest {
            user_id: UserId(42),
            context_id: ChatId(43),
            payment_ref: "charge_x",
        }
        .render();

        assert!(text.contains("User ID: 42"));
        assert!(text.contains("Chat ID: 43"));
        assert!(text.contains("charge_x"));
    }

    #[test]
    fn test_invite_notice_contains_url() {
        let link = InviteLink {
            url: "https://t.me/+abc".to_string(),
            member_limit: 1,
            expire_at: 0,
        };
        let text = Notice::Invite(&link).render();
        assert!(text.contains("https://t.me/+abc"));
        assert!(text.contains("01-01-1970 00:00:00 UTC"));
    }

    #[test]
    fn test_expiry_warning_shows_expiry() {
        let text = Notice::ExpiringSoon {
            expire_at: 1_700_000_000,
        }
        .render();
        assert!(text.contains("less than 24 hours"));
        assert!(text.contains("14-11-2023 22:13:20 UTC"));
    }

    #[test]
    fn test_format_remaining() {
        assert_eq!(format_remaining(3 * 86_400 + 4 * 3600 + 5 * 60 + 9), "3d 4h 5m");
        assert_eq!(format_remaining(-5), "0d 0h 0m");
    }
}
