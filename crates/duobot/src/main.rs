//! duobot: main binary
//!
//! Runs the Telegram assistant bot and the ledger bot side by side.
//!
//! Usage:
//!   duobot            - Start every bot with a configured token
//!   duobot --help     - Show help
//!   duobot --version  - Show version

use std::sync::Arc;

use duobot_core::{Clock, Config, LlmClient, SessionFacade, SessionStore, SessionSweeper, SystemClock};
use duobot_telegram::{AssistantBot, LedgerBot};
use tracing_subscriber::EnvFilter;

/// Run mode
#[derive(Debug, PartialEq, Eq)]
enum RunMode {
    /// Run the bots
    Server,
    /// Show help
    Help,
    /// Show version
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    match parse_args(std::env::args().skip(1)) {
        RunMode::Help => {
            print_help();
            return Ok(());
        }
        RunMode::Version => {
            println!("duobot {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        RunMode::Server => {}
    }

    // Load .env file
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::load().map_err(|e| anyhow::anyhow!("Config error: {}", e))?;

    tracing::info!("Starting duobot...");
    run_server(config).await
}

/// Parse command line arguments
fn parse_args(args: impl IntoIterator<Item = String>) -> RunMode {
    for arg in args {
        match arg.as_str() {
            "--help" | "-h" => return RunMode::Help,
            "--version" | "-v" => return RunMode::Version,
            _ => {}
        }
    }

    RunMode::Server
}

/// Print help message
fn print_help() {
    println!("duobot - Telegram assistant and ledger bots");
    println!();
    println!("Usage:");
    println!("  duobot           Start every bot with a configured token");
    println!("  duobot --help    Show this help message");
    println!("  duobot --version Show version");
    println!();
    println!("Configuration is read from duobot.toml when present, then from");
    println!("environment variables (a .env file is loaded first).");
    println!();
    println!("Environment Variables:");
    println!("  ASSISTANT_BOT_TOKEN          Assistant bot token (optional)");
    println!("  LEDGER_BOT_TOKEN             Ledger bot token (optional)");
    println!("  ALLOWED_USER_IDS             Comma-separated user ids (default: everyone)");
    println!("  LLM_API_KEY                  API key (required for the assistant bot)");
    println!("  LLM_MODEL                    Model name (default: claude-sonnet-4-20250514)");
    println!("  LLM_PROVIDER                 Provider: claude or openai (default: claude)");
    println!("  LLM_BASE_URL                 Custom API endpoint");
    println!("  SESSION_WINDOW_SIZE          Turns remembered per user (default: 20)");
    println!("  SESSION_IDLE_TIMEOUT_SECS    Forget idle conversations after (default: 3600)");
    println!("  SESSION_SWEEP_INTERVAL_SECS  Idle check interval (default: 300)");
    println!("  COMPLETION_TIMEOUT_SECS      LLM request timeout (default: 60)");
    println!("  LEDGER_DB_PATH               SQLite ledger file (default: data/ledger.db)");
}

/// Start the configured bots and wait for Ctrl+C
async fn run_server(config: Config) -> anyhow::Result<()> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());
    let allowed_user_ids = config.telegram.allowed_user_ids.clone();

    if allowed_user_ids.is_empty() {
        tracing::warn!("ALLOWED_USER_IDS is empty; the bots answer everyone");
    }

    // Track running services for graceful shutdown
    let mut service_handles = Vec::new();
    let mut sweeper_handle = None;

    // Start the assistant bot if its token is configured
    if let Some(token) = config.telegram.assistant_token.as_deref() {
        let store = Arc::new(SessionStore::from_config(&config.session, Arc::clone(&clock)));

        let sweeper = Arc::new(SessionSweeper::from_config(Arc::clone(&store), &config.session));
        sweeper_handle = Some(sweeper.start());

        let client = LlmClient::new(&config)
            .map_err(|e| anyhow::anyhow!("Failed to create LLM client: {}", e))?;
        let facade = Arc::new(SessionFacade::from_config(store, Arc::new(client), &config.session));

        let bot = AssistantBot::new(Some(token), facade, allowed_user_ids.clone())
            .map_err(|e| anyhow::anyhow!("Failed to create assistant bot: {}", e))?;

        service_handles.push(tokio::spawn(async move {
            if let Err(e) = bot.start().await {
                tracing::error!("Assistant bot error: {}", e);
            }
        }));
        tracing::info!("Assistant bot started (model: {})", config.llm.model);
    } else {
        tracing::info!("Assistant bot disabled (no token configured)");
    }

    // Start the ledger bot if its token is configured
    if let Some(token) = config.telegram.ledger_token.as_deref() {
        let bot = LedgerBot::from_config(Some(token), &config.ledger, Arc::clone(&clock), allowed_user_ids)
            .map_err(|e| anyhow::anyhow!("Failed to create ledger bot: {}", e))?;

        service_handles.push(tokio::spawn(async move {
            if let Err(e) = bot.start().await {
                tracing::error!("Ledger bot error: {}", e);
            }
        }));
        tracing::info!("Ledger bot started (database: {})", config.ledger.db_path);
    } else {
        tracing::info!("Ledger bot disabled (no token configured)");
    }

    if service_handles.is_empty() {
        anyhow::bail!("No bot token configured; set ASSISTANT_BOT_TOKEN and/or LEDGER_BOT_TOKEN");
    }

    tracing::info!("duobot initialized successfully");
    tracing::info!("Press Ctrl+C to exit");

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down...");

    if let Some(handle) = sweeper_handle {
        handle.stop().await;
    }

    // Abort all services
    for handle in service_handles {
        handle.abort();
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
