mod api;
mod commands;

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use relay_forward_core::config::{load_settings, validate_settings};
use relay_forward_core::{
    APP_NAME, BotApiTransport, BotApiTransportConfig, CooldownThrottle, CorrelationStore, Error,
    InMemoryCorrelationStore, Result, SqliteCorrelationStore, init_logging,
};
use tracing::{error, info};

use crate::api::BotClient;
use crate::commands::BotContext;

const POLL_TIMEOUT_SECS: u64 = 30;
const POLL_RETRY_DELAY: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(name = "relayforward")]
#[command(about = "Telegram relay bot that preserves forward provenance", long_about = None)]
struct Cli {
    /// Directory holding config.toml; defaults to the working directory.
    #[arg(long)]
    config_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("relayforward: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config_dir = cli.config_dir.unwrap_or_else(|| PathBuf::from("."));
    let settings = load_settings(&config_dir)?;
    validate_settings(&settings)?;

    let bot_token =
        std::env::var(&settings.telegram.bot_token_env).map_err(|_| Error::InvalidConfig {
            message: format!(
                "bot token missing: set the {} environment variable",
                settings.telegram.bot_token_env
            ),
        })?;

    init_logging(Some(&bot_token));
    info!(
        event = "bot.start",
        app = APP_NAME,
        correlation_backend = %settings.correlation.backend,
        "bot.start"
    );

    let store: Box<dyn CorrelationStore> = match settings.correlation.backend.trim() {
        "sqlite" => Box::new(
            SqliteCorrelationStore::connect(
                Path::new(&settings.correlation.db_path),
                Duration::from_secs(settings.correlation.ttl_secs),
            )
            .await?,
        ),
        _ => Box::new(InMemoryCorrelationStore::with_ttl(Duration::from_secs(
            settings.correlation.ttl_secs,
        ))),
    };

    let ctx = BotContext {
        client: BotClient::new(&settings.telegram.api_base, &bot_token),
        transport: BotApiTransport::new(BotApiTransportConfig {
            bot_token: bot_token.clone(),
            api_base: settings.telegram.api_base.clone(),
            gateway_base: settings.telegram.gateway_base.clone(),
        }),
        store,
        cooldown: CooldownThrottle::with_policy(
            settings.cooldown.max_uses,
            Duration::from_secs(settings.cooldown.window_secs),
        ),
    };

    // One logical worker: updates are handled to completion, in order.
    // Remote calls inside a handler are the only suspension points.
    let mut offset = 0i64;
    loop {
        let updates = match ctx.client.get_updates(offset, POLL_TIMEOUT_SECS).await {
            Ok(updates) => updates,
            Err(e) => {
                error!(event = "poll.failed", error = %e, "poll.failed");
                tokio::time::sleep(POLL_RETRY_DELAY).await;
                continue;
            }
        };

        for update in updates {
            offset = offset.max(update.update_id + 1);
            let Some(message) = update.message else {
                continue;
            };
            commands::handle_update(&ctx, &message).await;
        }
    }
}
