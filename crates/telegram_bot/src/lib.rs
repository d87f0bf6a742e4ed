//! Telegram bot.
//!
//! The bot is the user-facing surface of the [`BudgetEngine`]: it shows the
//! budget, answers spend questions and asks for confirmation before any
//! transfer goes out.

use std::sync::Arc;

use chrono_tz::Tz;
use engine::BudgetEngine;
use teloxide::prelude::*;

mod commands;
mod handlers;
mod parsing;
mod state;
mod ui;

#[derive(Clone)]
pub struct ConfigParameters {
    allowed_users: Vec<UserId>,
    engine: Arc<BudgetEngine>,
    timezone: Tz,
    pending: state::PendingTransfers,
}

pub struct Bot {
    token: String,
    allowed_users: Vec<UserId>,
    engine: Arc<BudgetEngine>,
    timezone: Tz,
}

impl Bot {
    pub fn builder() -> BotBuilder {
        BotBuilder::default()
    }

    pub async fn run(&self) {
        tracing::info!("Starting telegram bot...");

        let bot = teloxide::Bot::new(&self.token);
        let parameters = ConfigParameters {
            allowed_users: self.allowed_users.clone(),
            engine: Arc::clone(&self.engine),
            timezone: self.timezone,
            pending: state::PendingTransfers::default(),
        };

        Dispatcher::builder(bot, handlers::schema())
            .dependencies(dptree::deps![parameters])
            .default_handler(|upd| async move {
                tracing::warn!("Unhandled update: {:?}", upd);
            })
            .error_handler(LoggingErrorHandler::with_custom_text(
                "An error has occurred in the dispatcher",
            ))
            .enable_ctrlc_handler()
            .build()
            .dispatch()
            .await;
    }
}

#[derive(Default)]
pub struct BotBuilder {
    token: String,
    allowed_users: Vec<UserId>,
    engine: Option<Arc<BudgetEngine>>,
    timezone: Option<String>,
}

impl BotBuilder {
    pub fn token(mut self, token: &str) -> BotBuilder {
        self.token = token.to_string();
        self
    }

    /// Telegram users allowed to talk to the bot. Everyone else is ignored.
    pub fn allowed_users(mut self, allowed_users: Vec<UserId>) -> BotBuilder {
        self.allowed_users = allowed_users;
        self
    }

    pub fn engine(mut self, engine: Arc<BudgetEngine>) -> BotBuilder {
        self.engine = Some(engine);
        self
    }

    /// IANA zone used to show times, e.g. `Europe/Rome`. Defaults to UTC.
    pub fn timezone(mut self, timezone: &str) -> BotBuilder {
        self.timezone = Some(timezone.to_string());
        self
    }

    pub fn build(self) -> Result<Bot, String> {
        tracing::info!("Initializing telegram bot...");
        if self.token.trim().is_empty() {
            return Err("telegram token must not be empty".to_string());
        }
        if self.allowed_users.is_empty() {
            return Err("at least one allowed telegram user is required".to_string());
        }
        let engine = self
            .engine
            .ok_or_else(|| "missing budget engine".to_string())?;
        let timezone = match self.timezone.as_deref() {
            None => Tz::UTC,
            Some(name) => name
                .parse::<Tz>()
                .map_err(|err| format!("invalid timezone \"{name}\": {err}"))?,
        };

        Ok(Bot {
            token: self.token,
            allowed_users: self.allowed_users,
            engine,
            timezone,
        })
    }
}
