//! Telegram Bot API implementation of [`ChannelPlatform`].
//!
//! Every method is a single `POST {api_url}/bot{token}/{method}` with a JSON
//! body. The Bot API wraps results as `{"ok": true, "result": ...}` and
//! failures as `{"ok": false, "error_code": .., "description": ..}`; both
//! shapes are mapped onto [`PlatformError`].
//!
//! # Feature Flags
//!
//! Requires the `telegram` feature:
//!
//! ```toml
//! [dependencies]
//! chanpass-subscriptions = { version = "0.2", features = ["telegram"] }
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use chanpass_subscriptions::{TelegramConfig, TelegramPlatform};
//!
//! let platform = TelegramPlatform::new(TelegramConfig::new(std::env::var("BOT_TOKEN")?))?;
//! platform.send_message(ChatId(5161127199), "hello").await?;
//! ```

use crate::config::TelegramConfig;
use crate::errors::PlatformError;
use crate::platform::{ChannelPlatform, InviteLink, MemberStatus, Result};
use crate::record::{ChatId, UserId};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

/// Seconds to back off when a 429 carries no `retry_after`.
const DEFAULT_RETRY_AFTER_SECS: u64 = 5;

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    error_code: Option<i64>,
    description: Option<String>,
    parameters: Option<ResponseParameters>,
}

#[derive(Debug, Deserialize)]
struct ResponseParameters {
    retry_after: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ChatMember {
    status: String,
}

#[derive(Debug, Deserialize)]
struct ChatInviteLink {
    invite_link: String,
    member_limit: Option<u32>,
    expire_date: Option<i64>,
}

/// Bot API client.
pub struct TelegramPlatform {
    config: TelegramConfig,
    client: reqwest::Client,
}

impl TelegramPlatform {
    pub fn new(config: TelegramConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PlatformError::Transport(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    pub fn config(&self) -> &TelegramConfig {
        &self.config
    }

    fn url(&self, method: &str) -> String {
        format!(
            "{}/bot{}/{}",
            self.config.api_url.trim_end_matches('/'),
            self.config.token,
            method
        )
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &'static str,
        params: serde_json::Value,
    ) -> Result<T> {
        tracing::debug!("Telegram {}", method);

        let response = self
            .client
            .post(self.url(method))
            .json(&params)
            .send()
            .await
            .map_err(|e| self.map_reqwest_error(method, e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| self.map_reqwest_error(method, e))?;

        let body: ApiResponse<T> = match serde_json::from_str(&text) {
            Ok(body) => body,
            Err(_) if !status.is_success() => {
                return Err(Self::map_status_error(status.as_u16(), &text))
            }
            Err(e) => {
                return Err(PlatformError::Decode(format!(
                    "Failed to parse {} response: {}",
                    method, e
                )))
            }
        };

        if body.ok {
            return body
                .result
                .ok_or_else(|| PlatformError::Decode(format!("{} returned no result", method)));
        }

        Err(Self::map_api_error(
            body.error_code.unwrap_or_else(|| i64::from(status.as_u16())),
            body.description.unwrap_or_default(),
            body.parameters.and_then(|p| p.retry_after),
        ))
    }

    /// Map a Bot API error answer to PlatformError.
    fn map_api_error(code: i64, description: String, retry_after: Option<u64>) -> PlatformError {
        if code == 429 || retry_after.is_some() {
            return PlatformError::RateLimited {
                retry_after_secs: retry_after.unwrap_or(DEFAULT_RETRY_AFTER_SECS),
            };
        }

        let lower = description.to_lowercase();
        if lower.contains("user not found")
            || lower.contains("member not found")
            || lower.contains("participant_id_invalid")
        {
            return PlatformError::NotFound(description);
        }

        PlatformError::Api { code, description }
    }

    /// Map HTTP status codes of non-JSON answers to PlatformError.
    fn map_status_error(status: u16, error_text: &str) -> PlatformError {
        match status {
            429 => PlatformError::RateLimited {
                retry_after_secs: DEFAULT_RETRY_AFTER_SECS,
            },
            404 => PlatformError::Api {
                code: 404,
                description: "Not Found (check the bot token)".to_string(),
            },
            500..=599 => PlatformError::Transport(format!(
                "Telegram server error ({}): {}",
                status, error_text
            )),
            _ => PlatformError::Api {
                code: i64::from(status),
                description: error_text.to_string(),
            },
        }
    }

    /// Map reqwest errors to PlatformError. The URL holds the token, so it
    /// is stripped from the message.
    fn map_reqwest_error(&self, method: &str, e: reqwest::Error) -> PlatformError {
        if e.is_timeout() {
            PlatformError::Timeout {
                operation: method.to_string(),
                timeout_ms: self.config.timeout_secs * 1000,
            }
        } else {
            PlatformError::Transport(format!(
                "Telegram {} request failed: {}",
                method,
                e.without_url()
            ))
        }
    }
}

#[async_trait]
impl ChannelPlatform for TelegramPlatform {
    async fn member_status(&self, channel: ChatId, user: UserId) -> Result<MemberStatus> {
        let member: ChatMember = self
            .call(
                "getChatMember",
                json!({ "chat_id": channel.0, "user_id": user.0 }),
            )
            .await?;
        member.status.parse().map_err(PlatformError::Decode)
    }

    async fn ban_member(&self, channel: ChatId, user: UserId) -> Result<()> {
        let _: bool = self
            .call(
                "banChatMember",
                json!({ "chat_id": channel.0, "user_id": user.0 }),
            )
            .await?;
        Ok(())
    }

    async fn unban_member(&self, channel: ChatId, user: UserId) -> Result<()> {
        let _: bool = self
            .call(
                "unbanChatMember",
                json!({ "chat_id": channel.0, "user_id": user.0, "only_if_banned": true }),
            )
            .await?;
        Ok(())
    }

    async fn create_invite_link(
        &self,
        channel: ChatId,
        member_limit: u32,
        expire_at: i64,
    ) -> Result<InviteLink> {
        let link: ChatInviteLink = self
            .call(
                "createChatInviteLink",
                json!({
                    "chat_id": channel.0,
                    "member_limit": member_limit,
                    "expire_date": expire_at,
                }),
            )
            .await?;
        Ok(InviteLink {
            url: link.invite_link,
            member_limit: link.member_limit.unwrap_or(member_limit),
            expire_at: link.expire_date.unwrap_or(expire_at),
        })
    }

    async fn send_message(&self, chat: ChatId, text: &str) -> Result<()> {
        let _: serde_json::Value = self
            .call("sendMessage", json!({ "chat_id": chat.0, "text": text }))
            .await?;
        Ok(())
    }
}
