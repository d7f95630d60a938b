//! # barqing
//!
//! Watches Barq chats of every logged-in Telegram user and forwards new
//! messages to them.
//!
//! Usage:
//!   barqing -t <bot-token>                  # store at ~/.barqing/barqing.db
//!   barqing -t <bot-token> -s ./barqing.db  # custom store
//!   barqing -c ./config.toml -vv            # config file, debug logging

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use barqing_channels::TelegramChannel;
use barqing_core::BarqingConfig;
use barqing_providers::BarqClient;
use barqing_scheduler::{Bot, RetryPolicy, SessionDb, SessionRegistry, delivery_queue};
use clap::Parser;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "barqing",
    version,
    about = "📬 barqing: Barq message notifications on Telegram"
)]
struct Cli {
    /// Telegram bot token
    #[arg(short, long, env = "BARQING_BOT_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Session database file
    #[arg(short, long, value_name = "FILE")]
    store: Option<String>,

    /// Config file (default: ~/.barqing/config.toml)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Barq GraphQL endpoint
    #[arg(long, value_name = "URL")]
    api_url: Option<String>,

    /// More logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = format!("barqing={level},barqing_core={level},barqing_providers={level},barqing_channels={level},barqing_scheduler={level}");
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();
}

fn load_config(cli: &Cli) -> Result<BarqingConfig> {
    let mut config = match &cli.config {
        Some(path) => BarqingConfig::load_from(path)?,
        None => BarqingConfig::load()?,
    };
    if let Some(token) = &cli.token {
        config.telegram.bot_token = token.clone();
    }
    if let Some(store) = &cli.store {
        config.store.path = store.clone();
    }
    if let Some(url) = &cli.api_url {
        config.barq.api_url = url.clone();
    }
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = load_config(&cli)?;
    let store_path = config.store.resolved_path();

    let store = Arc::new(
        SessionDb::open(&store_path)
            .with_context(|| format!("opening session store {}", store_path.display()))?,
    );
    let api = Arc::new(BarqClient::new(&config.barq)?);

    let mut telegram = TelegramChannel::new(config.telegram.clone());
    telegram
        .connect()
        .await
        .context("Telegram rejected the bot token")?;

    let (queue, deliveries) = delivery_queue();
    let registry = Arc::new(
        SessionRegistry::load(api, store, queue, RetryPolicy::from_config(&config.refresher)).await?,
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut incoming = telegram.start_polling(shutdown_rx.clone());

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Cannot listen for Ctrl-C: {e}");
            return;
        }
        tracing::info!("🛑 Shutting down...");
        shutdown_tx.send(true).ok();
    });

    println!("📬 barqing v{}", env!("CARGO_PKG_VERSION"));
    println!("   🗄️  Store:   {}", store_path.display());
    println!("   🌐 Barq:    {}", config.barq.api_url);
    println!();

    let bot = Bot::new(
        Arc::new(telegram),
        registry,
        deliveries,
        config.store.flush_interval(),
        shutdown_rx,
    );
    bot.run(&mut incoming).await?;
    incoming.finish().await;
    Ok(())
}
