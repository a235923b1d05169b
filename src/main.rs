use apiary::{Matcher, Runtime};
use apiary_client::HttpPlatform;
use apiary_core::config;
use apiary_core::traits::{Platform, Storage};
use apiary_storage::{MemoryStorage, SqliteStorage};
use clap::{Parser, Subcommand};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "apiary", version, about = "Apiary — room-per-bot runtime")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config file.
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the runtime.
    Start,
    /// Check platform reachability and configuration.
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load(&cli.config)?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new(cfg.runtime.log_level.clone())
            }),
        )
        .init();

    match cli.command {
        Commands::Start => {
            if cfg.platform.token.is_empty() {
                anyhow::bail!(
                    "platform token is empty. Set it in {} under [platform].",
                    cli.config
                );
            }

            let platform: Arc<dyn Platform> = Arc::new(HttpPlatform::new(&cfg.platform));
            let storage = build_storage(&cfg).await?;

            let mut runtime = Runtime::new(cfg, platform, storage).await?;

            // Liveness probe available in every room.
            runtime.hears(Matcher::phrase("ping"), |bot, _trigger| async move {
                let _ = bot.say("pong").await;
            });

            Arc::new(runtime).run().await?;
        }
        Commands::Status => {
            println!("Apiary — Status Check\n");
            println!("Config: {}", cli.config);
            println!("Platform: {}", cfg.platform.base_url);
            println!("Transport: {:?}", cfg.transport.mode);
            println!("Storage: {}", cfg.storage.backend);
            println!();

            if cfg.platform.token.is_empty() {
                println!("  identity: token not configured");
                return Ok(());
            }

            let platform = HttpPlatform::new(&cfg.platform);
            match platform.me().await {
                Ok(me) => println!(
                    "  identity: {} <{}>",
                    me.display_name,
                    me.email().unwrap_or("?")
                ),
                Err(e) => println!("  identity: unreachable ({e})"),
            }
        }
    }

    Ok(())
}

/// Build the configured persistence backend.
async fn build_storage(cfg: &config::Config) -> anyhow::Result<Arc<dyn Storage>> {
    match cfg.storage.backend.as_str() {
        "memory" => Ok(Arc::new(MemoryStorage::new())),
        "sqlite" => Ok(Arc::new(SqliteStorage::new(&cfg.storage).await?)),
        other => anyhow::bail!("unsupported storage backend: {other}"),
    }
}
