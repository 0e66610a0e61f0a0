//! Settings resolution: command-line flags and environment first, then the
//! optional TOML file, then built-in defaults.
//!
//! ```toml
//! database = "/var/lib/chanpass/subscriptions.db"
//!
//! [channel]
//! channel_id = -1002842558712
//! admin_id = 5161127199
//! price = 100
//! currency = "XTR"
//!
//! [telegram]
//! api_url = "https://api.telegram.org"
//! timeout_secs = 30
//!
//! [watcher]
//! interval_secs = 60
//! pace_ms = 50
//! ```

use anyhow::{anyhow, Context, Result};
use chanpass_subscriptions::{ChannelConfig, ChatId, TelegramConfig, UserId, WatcherConfig};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Contents of the `--config` file. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub database: Option<PathBuf>,
    pub channel: ChannelSection,
    pub telegram: TelegramSection,
    pub watcher: WatcherConfig,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChannelSection {
    pub channel_id: Option<i64>,
    pub admin_id: Option<i64>,
    pub price: Option<u64>,
    pub currency: Option<String>,
    pub grant_days: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TelegramSection {
    pub token: Option<String>,
    pub api_url: Option<String>,
    pub timeout_secs: Option<u64>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("Invalid config file {}", path.display()))
    }
}

/// Values given on the command line (or through their env fallbacks)
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub database: Option<PathBuf>,
    pub token: Option<String>,
    pub channel_id: Option<i64>,
    pub admin_id: Option<i64>,
}

/// Fully resolved settings
#[derive(Debug, Clone)]
pub struct Settings {
    pub database: PathBuf,
    pub channel: ChannelConfig,
    /// Absent when no token was configured
    pub telegram: Option<TelegramConfig>,
    pub watcher: WatcherConfig,
}

impl Settings {
    pub fn resolve(overrides: Overrides, file: FileConfig) -> Result<Self> {
        let channel_id = overrides
            .channel_id
            .or(file.channel.channel_id)
            .ok_or_else(|| anyhow!("Channel id missing: pass --channel-id or set CHANNEL_ID"))?;
        let admin_id = overrides
            .admin_id
            .or(file.channel.admin_id)
            .ok_or_else(|| anyhow!("Admin id missing: pass --admin-id or set ADMIN_ID"))?;

        let mut channel = ChannelConfig::new(ChatId(channel_id), UserId(admin_id));
        if let Some(price) = file.channel.price {
            channel.price = price;
        }
        if let Some(currency) = file.channel.currency {
            channel.currency = currency;
        }
        if let Some(days) = file.channel.grant_days {
            channel = channel.with_grant_secs(
                days_to_secs(days).context("grant_days in the config file")?,
            );
        }

        let telegram = overrides.token.or(file.telegram.token).map(|token| {
            let mut config = TelegramConfig::new(token);
            if let Some(url) = file.telegram.api_url {
                config = config.with_api_url(url);
            }
            if let Some(secs) = file.telegram.timeout_secs {
                config = config.with_timeout_secs(secs);
            }
            config
        });

        let database = match overrides.database.or(file.database) {
            Some(path) => path,
            None => default_database()?,
        };

        Ok(Self {
            database,
            channel,
            telegram,
            watcher: file.watcher,
        })
    }
}

/// Convert a day count from user input to seconds.
pub fn days_to_secs(days: i64) -> Result<i64> {
    days.checked_mul(86_400)
        .ok_or_else(|| anyhow!("{} days is out of range", days))
}

fn default_database() -> Result<PathBuf> {
    let dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("chanpass");
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create data directory {}", dir.display()))?;
    Ok(dir.join("subscriptions.db"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_file() {
        let file: FileConfig = toml::from_str(
            r#"
            database = "/tmp/file.db"

            [channel]
            channel_id = -100
            admin_id = 1
            price = 250

            [telegram]
            token = "from-file"
            api_url = "http://localhost:8081"
            "#,
        )
        .unwrap();

        let overrides = Overrides {
            database: Some(PathBuf::from("/tmp/flag.db")),
            token: Some("from-flag".to_string()),
            channel_id: Some(-200),
            admin_id: None,
        };
        let settings = Settings::resolve(overrides, file).unwrap();

        assert_eq!(settings.database, PathBuf::from("/tmp/flag.db"));
        assert_eq!(settings.channel.channel_id, ChatId(-200));
        assert_eq!(settings.channel.admin_id, UserId(1));
        assert_eq!(settings.channel.price, 250);
        assert_eq!(settings.channel.currency, "XTR");

        let telegram = settings.telegram.unwrap();
        assert_eq!(telegram.token, "from-flag");
        assert_eq!(telegram.api_url, "http://localhost:8081");
    }

    #[test]
    fn test_missing_channel_is_an_error() {
        let err = Settings::resolve(
            Overrides {
                database: Some(PathBuf::from("x.db")),
                ..Default::default()
            },
            FileConfig::default(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("CHANNEL_ID"));
    }

    #[test]
    fn test_days_to_secs_rejects_overflow() {
        assert_eq!(days_to_secs(30).unwrap(), 2_592_000);
        assert!(days_to_secs(200_000_000_000_000).is_err());
        assert!(days_to_secs(i64::MIN).is_err());
    }

    #[test]
    fn test_huge_grant_days_in_file_is_an_error() {
        let file: FileConfig = toml::from_str(
            "[channel]\nchannel_id = -100\nadmin_id = 1\ngrant_days = 200000000000000\n",
        )
        .unwrap();
        let err = Settings::resolve(
            Overrides {
                database: Some(PathBuf::from("x.db")),
                ..Default::default()
            },
            file,
        )
        .unwrap_err();
        assert!(format!("{:#}", err).contains("out of range"));
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        assert!(toml::from_str::<FileConfig>("[channel]\nchanel_id = 1\n").is_err());
    }

    #[test]
    fn test_watcher_section_defaults() {
        let file: FileConfig = toml::from_str("[watcher]\ninterval_secs = 5\n").unwrap();
        assert_eq!(file.watcher.interval_secs, 5);
        assert_eq!(file.watcher.pace_ms, 50);
    }
}
