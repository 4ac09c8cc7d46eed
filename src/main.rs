use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use opsplan_bot::bot::OpsPlanBot;
use opsplan_bot::config::BotConfig;
use opsplan_bot::session::InMemorySessionStore;
use opsplan_bot::transport::{CliTransport, TelegramTransport, Transport};
use opsplan_bot::{logging, roster};

#[derive(Parser, Debug)]
#[command(
    name = "opsplan-bot",
    about = "Chat wizard that builds and posts the shift ops plan",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the bot (default)
    Run,
    /// Keep master-list people who appear in a roster export
    MatchRoster {
        /// Roster export with a DisplayName column
        #[arg(long)]
        roster: PathBuf,
        /// Master people list
        #[arg(long, default_value = "Data/people.csv")]
        people: PathBuf,
        /// Where to write the on-shift people source
        #[arg(long, default_value = "Data/people_on_shift.csv")]
        out: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // A missing .env is fine; the environment may already be set.
    let _ = dotenvy::dotenv();
    let config = BotConfig::from_env().context("invalid configuration")?;

    let _log_guard = logging::init(config.log_dir.as_deref()).context("failed to set up logging")?;
    for warning in &config.warnings {
        warning.log();
    }

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(config).await,
        Command::MatchRoster { roster, people, out } => {
            let written = roster::match_roster(&roster, &people, &out)
                .with_context(|| format!("failed to match roster {}", roster.display()))?;
            eprintln!("Wrote {written} on-shift people to {}", out.display());
            Ok(())
        }
    }
}

async fn run(config: BotConfig) -> Result<()> {
    eprintln!("🛴 Ops plan bot v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Trigger: {}", config.wizard.trigger);
    eprintln!("   Edit: {} <new text>", config.wizard.edit_trigger);
    eprintln!("   People: {}", config.wizard.people_path.display());
    eprintln!("   Places: {}", config.wizard.places_path.display());

    let transport: Arc<dyn Transport> = match config.telegram {
        Some(telegram) => {
            let transport = TelegramTransport::new(telegram.bot_token, telegram.allowed_users);
            transport
                .health_check()
                .await
                .context("Telegram bot token was rejected")?;
            eprintln!("   Transport: telegram");
            Arc::new(transport)
        }
        None => {
            let user = std::env::var("USER").unwrap_or_else(|_| "local-user".to_string());
            eprintln!("   Transport: cli (set TELEGRAM_BOT_TOKEN for Telegram)");
            eprintln!("   Type {} to start.\n", config.wizard.trigger);
            Arc::new(CliTransport::new(user))
        }
    };

    let bot = OpsPlanBot::new(
        config.wizard,
        transport,
        Box::new(InMemorySessionStore::new()),
    );
    bot.run().await?;
    Ok(())
}
