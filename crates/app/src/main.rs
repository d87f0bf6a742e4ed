use std::sync::Arc;

use chrono::Utc;
use clap::Parser;
use engine::BudgetEngine;
use executor::HttpTransferExecutor;
use migration::{Migrator, MigratorTrait};
use settings::Database;
use teloxide::types::UserId;

mod settings;

#[derive(Debug, Parser)]
#[command(name = "yield_guardian")]
#[command(about = "Spend DeFi yield without ever touching the principal")]
struct Cli {
    /// Settings file (TOML).
    #[arg(long, env = "YIELD_GUARDIAN_CONFIG")]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cli = Cli::parse();
    let settings = settings::Settings::new(cli.config.as_deref())?;

    tracing_subscriber::fmt()
        .with_env_filter(format!(
            "yield_guardian={level},engine={level},executor={level},telegram_bot={level}",
            level = settings.app.level
        ))
        .init();

    let engine_config = settings.guardian.engine_config()?;
    let db = parse_database(&settings.database).await?;

    let mut executor = HttpTransferExecutor::builder()
        .url(&settings.executor.url)
        .credentials(&settings.executor.username, &settings.executor.password);
    if let Some(token) = &settings.executor.token {
        executor = executor.token(token);
    }
    if let Some(explorer_url) = &settings.executor.explorer_url {
        executor = executor.explorer_url(explorer_url);
    }
    let executor = executor.build()?;

    let engine = BudgetEngine::builder()
        .database(db)
        .config(engine_config)
        .executor(Arc::new(executor))
        .build()
        .await?;
    let engine = Arc::new(engine);

    let Some(telegram) = settings.telegram else {
        let snapshot = engine.snapshot(Utc::now()).await;
        tracing::info!(
            mode = %snapshot.mode,
            accrued = %snapshot.accrued_yield_usd,
            withdrawn = %snapshot.cumulative_withdrawn_usd,
            available = %snapshot.max_available(),
            "no telegram settings, nothing else to run"
        );
        return Ok(());
    };

    tracing::info!("Found telegram settings...");
    let mut bot = telegram_bot::Bot::builder()
        .token(&telegram.token)
        .allowed_users(telegram.allowed_users.into_iter().map(UserId).collect())
        .engine(engine);
    if let Some(timezone) = &telegram.timezone {
        bot = bot.timezone(timezone);
    }
    bot.build()?.run().await;

    Ok(())
}

async fn parse_database(
    config: &settings::Database,
) -> Result<sea_orm::DatabaseConnection, Box<dyn std::error::Error + Send + Sync>> {
    let url = match config {
        Database::Memory => String::from("sqlite::memory:"),
        Database::Sqlite(path) => format!("sqlite:{}?mode=rwc", path),
    };

    let database = sea_orm::Database::connect(url).await?;
    Migrator::up(&database, None).await?;
    Ok(database)
}
