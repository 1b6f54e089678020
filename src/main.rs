use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use execbot::callbacks::HttpCallbacks;
use execbot::config::{init_logging, EntryOrderType, Settings};
use execbot::TradingBot;
use std::sync::Arc;

/// Signal-to-order execution bot
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Settings file (TOML). Missing file means defaults plus environment.
    #[arg(short, long, global = true, default_value = "execbot.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the period-aligned control loop until Ctrl+C
    Run {
        /// Override bot.entry_order_type (limit or market)
        #[arg(long)]
        entry_order_type: Option<String>,
    },

    /// Print the effective settings and exit
    ShowConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut settings = Settings::load(&cli.config)
        .with_context(|| format!("Failed to load settings from {}", cli.config))?;

    match cli.command {
        Commands::ShowConfig => {
            println!("{}", serde_json::to_string_pretty(&settings)?);
            Ok(())
        }
        Commands::Run { entry_order_type } => {
            if let Some(order_type) = entry_order_type {
                settings.bot.entry_order_type = parse_entry_order_type(&order_type)?;
            }
            run(settings).await
        }
    }
}

fn parse_entry_order_type(value: &str) -> Result<EntryOrderType> {
    match value.to_lowercase().as_str() {
        "limit" => Ok(EntryOrderType::Limit),
        "market" => Ok(EntryOrderType::Market),
        other => anyhow::bail!("Unknown entry order type '{}' (expected limit or market)", other),
    }
}

async fn run(settings: Settings) -> Result<()> {
    init_logging(&settings.bot.log_level);

    tracing::info!("🚀 ExecBot starting");
    tracing::info!("\n📊 Configuration:");
    tracing::info!("  Gateway: {}", settings.gateway.base_url);
    tracing::info!("  Entry order type: {:?}", settings.bot.entry_order_type);
    tracing::info!("  Loop interval: {}s", settings.bot.loop_interval_sec);
    tracing::info!("  OHLCV bars per pass: {}", settings.bot.ohlcv_limit);

    let callbacks = Arc::new(HttpCallbacks::new(&settings.gateway)?);
    let bot = Arc::new(TradingBot::new(callbacks, settings.bot.clone())?);

    let mut loop_task = {
        let bot = bot.clone();
        tokio::spawn(async move {
            bot.run().await;
        })
    };

    tracing::info!("\nPress Ctrl+C to stop...\n");

    // Wait for Ctrl+C or loop failure
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("\n⚠️  Received Ctrl+C, finishing current cycle...");
            bot.stop();
        }
        result = &mut loop_task => {
            tracing::error!("Control loop exited: {:?}", result);
            return Ok(());
        }
    }

    if let Err(e) = loop_task.await {
        tracing::error!("Control loop exited abnormally: {:?}", e);
    }

    tracing::info!("👋 ExecBot stopped");
    Ok(())
}
