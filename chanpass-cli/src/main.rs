//! Chanpass CLI
//!
//! Operator interface for a paid private channel: runs the expiry watcher
//! and injects subscription events for testing and manual administration.

use anyhow::Result;
use chanpass_subscriptions::{ChatId, MemberStatus, UserId};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod ui;

use config::{FileConfig, Overrides, Settings};

#[derive(Parser)]
#[command(name = "chanpass")]
#[command(about = "Chanpass - paid subscriptions for a private channel", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// SQLite database file
    #[arg(long, global = true, env = "CHANPASS_DB")]
    db: Option<PathBuf>,

    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Telegram bot token
    #[arg(long, global = true, env = "BOT_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Id of the paid channel
    #[arg(long, global = true, env = "CHANNEL_ID", allow_negative_numbers = true)]
    channel_id: Option<i64>,

    /// Id of the admin who receives refund requests
    #[arg(long, global = true, env = "ADMIN_ID")]
    admin_id: Option<i64>,

    /// Simulate platform calls instead of talking to Telegram
    #[arg(long, global = true)]
    dry_run: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the expiry watcher until Ctrl-C
    Run {
        /// Seconds between sweeps
        #[arg(long)]
        interval_secs: Option<u64>,

        /// Milliseconds to pause after each record that hit the platform
        #[arg(long)]
        pace_ms: Option<u64>,
    },

    /// Run a single expiry sweep and exit
    Sweep,

    /// Grant access without a payment
    Grant {
        /// User id
        user_id: i64,

        /// Length of the grant in days (defaults to one subscription period)
        #[arg(short, long)]
        days: Option<i64>,
    },

    /// List all stored subscriptions
    List {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show a user's subscription and purchase offer
    Status {
        /// User id
        user_id: i64,
    },

    /// Record a successful payment
    Pay {
        /// User id
        user_id: i64,

        /// Provider charge identifier
        charge_ref: String,

        /// Amount paid (defaults to the configured price)
        #[arg(short, long)]
        amount: Option<u64>,

        /// Currency (defaults to the configured currency)
        #[arg(short, long)]
        currency: Option<String>,
    },

    /// Cancel a user's subscription
    Cancel {
        /// User id
        user_id: i64,
    },

    /// Request a refund for a user's last payment
    Refund {
        /// User id
        user_id: i64,

        /// Chat the request came from (defaults to the user's private chat)
        #[arg(long, allow_negative_numbers = true)]
        chat_id: Option<i64>,
    },

    /// Report a membership change in the channel
    Join {
        /// User id
        user_id: i64,

        /// New status (member, restricted, left, kicked, ...)
        #[arg(long, default_value = "member")]
        status: MemberStatus,
    },

    /// Send a fresh invite link to a subscriber
    Invite {
        /// User id
        user_id: i64,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing; RUST_LOG takes precedence
    let default_filter = if cli.verbose {
        "chanpass_cli=debug,chanpass_subscriptions=debug"
    } else {
        "chanpass_cli=info,chanpass_subscriptions=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = dispatch(cli).await {
        tracing::error!("Command failed: {:#}", e);
        ui::error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

async fn dispatch(cli: Cli) -> Result<()> {
    let file = match &cli.config {
        Some(path) => FileConfig::load(path)?,
        None => FileConfig::default(),
    };
    let overrides = Overrides {
        database: cli.db,
        token: cli.token,
        channel_id: cli.channel_id,
        admin_id: cli.admin_id,
    };
    let settings = Settings::resolve(overrides, file)?;
    let ctx = commands::Context::build(settings, cli.dry_run)?;

    match cli.command {
        Commands::Run {
            interval_secs,
            pace_ms,
        } => {
            let mut config = ctx.settings.watcher.clone();
            if let Some(secs) = interval_secs {
                config = config.with_interval_secs(secs);
            }
            if let Some(ms) = pace_ms {
                config = config.with_pace_ms(ms);
            }
            commands::watch::run(&ctx, config).await?;
        }
        Commands::Sweep => {
            commands::watch::sweep(&ctx).await?;
        }
        Commands::Grant { user_id, days } => {
            commands::admin::grant(&ctx, UserId(user_id), days).await?;
        }
        Commands::List { json } => {
            commands::admin::list(&ctx, json).await?;
        }
        Commands::Status { user_id } => {
            commands::admin::status(&ctx, UserId(user_id)).await?;
        }
        Commands::Pay {
            user_id,
            charge_ref,
            amount,
            currency,
        } => {
            commands::events::pay(&ctx, UserId(user_id), charge_ref, amount, currency).await?;
        }
        Commands::Cancel { user_id } => {
            commands::events::cancel(&ctx, UserId(user_id)).await?;
        }
        Commands::Refund { user_id, chat_id } => {
            commands::events::refund(&ctx, UserId(user_id), chat_id.map(ChatId)).await?;
        }
        Commands::Join { user_id, status } => {
            commands::events::join(&ctx, UserId(user_id), status).await?;
        }
        Commands::Invite { user_id } => {
            commands::events::invite(&ctx, UserId(user_id)).await?;
        }
    }

    Ok(())
}
