mod config;
mod relay;
mod telegram_log;

use teloxide::types::ChatId;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::prelude::*;

use config::Config;
use relay::telegram::{build_bot, prepare_bot};
use relay::{
    Backoff, Dispatcher, HttpProvider, SessionStore, TelegramClient, TelegramPoller,
};

#[tokio::main]
async fn main() {
    // A missing .env is fine, the process environment may carry everything
    dotenvy::dotenv().ok();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(1);
        }
    };

    let bot = match build_bot(
        &config.telegram_bot_token,
        config.connect_timeout,
        config.read_timeout,
    ) {
        Ok(bot) => bot,
        Err(e) => {
            eprintln!("Failed to build Telegram client: {e}");
            std::process::exit(1);
        }
    };

    // Setup logging
    if let Err(e) = std::fs::create_dir_all(&config.log_dir) {
        eprintln!("Failed to create log directory {}: {e}", config.log_dir.display());
        std::process::exit(1);
    }
    let file_appender = tracing_appender::rolling::daily(&config.log_dir, "mailrelay.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    let registry = tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        );

    if let Some(log_chat_id) = config.log_chat_id {
        let tg_layer = telegram_log::TelegramLogLayer::new(bot.clone(), ChatId(log_chat_id));
        registry.with(tg_layer).init();
    } else {
        registry.init();
    }

    info!(
        "🚀 Bot starting… Provider={} chat_model={} transcribe_model={}",
        config.provider.kind, config.provider.chat_model, config.provider.transcribe_model
    );
    info!(
        "Defaults: lang={}, tone={}",
        config.defaults.language, config.defaults.tone
    );

    let bot_username = prepare_bot(&bot).await;

    let provider = match HttpProvider::new(config.provider) {
        Ok(provider) => provider,
        Err(e) => {
            error!("Failed to build provider client: {e}");
            std::process::exit(1);
        }
    };
    let mut dispatcher = Dispatcher::new(
        provider,
        TelegramClient::new(bot.clone()),
        SessionStore::new(config.defaults),
        config.audio_tmp_dir,
    );

    let mut poller = TelegramPoller::new(bot, bot_username, config.poll_timeout_secs);
    if let Err(e) = poller.skip_pending().await {
        warn!("Could not skip pending updates: {e}");
    }

    let shutdown = CancellationToken::new();
    let ctrlc = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown requested");
                ctrlc.cancel();
            }
            Err(e) => warn!("Failed to listen for Ctrl-C: {e}"),
        }
    });

    relay::poll::run(
        &mut poller,
        &mut dispatcher,
        Backoff::new(config.poll_retry, config.poll_retry_max),
        shutdown,
    )
    .await;

    info!("Bot stopped");
}
