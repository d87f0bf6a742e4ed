//! Read-only views of the budget: /status, /budget, /yield, /topup and /spend

use chrono::Utc;
use teloxide::{RequestError, dispatching::UpdateHandler, dptree::case, prelude::*};

use crate::{ConfigParameters, commands::Command, parsing::parse_amount, ui};

use super::user_message_for_engine_error;

/// Build the schema for the budget commands
pub(super) fn schema() -> UpdateHandler<RequestError> {
    dptree::entry()
        .branch(case![Command::Status].endpoint(handle_status))
        .branch(case![Command::Budget].endpoint(handle_budget))
        .branch(case![Command::Yield].endpoint(handle_yield))
        .branch(case![Command::Topup].endpoint(handle_topup))
        .branch(case![Command::Spend(amount)].endpoint(handle_spend))
}

async fn handle_status(bot: Bot, cfg: ConfigParameters, msg: Message) -> ResponseResult<()> {
    let snapshot = cfg.engine.snapshot(Utc::now()).await;
    bot.send_message(
        msg.chat.id,
        ui::render_status(cfg.engine.yield_sources(), &snapshot),
    )
    .await?;
    Ok(())
}

async fn handle_budget(bot: Bot, cfg: ConfigParameters, msg: Message) -> ResponseResult<()> {
    let snapshot = cfg.engine.snapshot(Utc::now()).await;
    bot.send_message(msg.chat.id, ui::render_budget(&snapshot, cfg.timezone))
        .await?;
    Ok(())
}

async fn handle_yield(bot: Bot, cfg: ConfigParameters, msg: Message) -> ResponseResult<()> {
    bot.send_message(
        msg.chat.id,
        ui::render_yield(cfg.engine.yield_sources(), Utc::now(), cfg.timezone),
    )
    .await?;
    Ok(())
}

async fn handle_topup(bot: Bot, cfg: ConfigParameters, msg: Message) -> ResponseResult<()> {
    let snapshot = cfg.engine.snapshot(Utc::now()).await;
    bot.send_message(msg.chat.id, ui::render_topup(&snapshot, cfg.timezone))
        .await?;
    Ok(())
}

async fn handle_spend(
    bot: Bot,
    cfg: ConfigParameters,
    msg: Message,
    amount: String,
) -> ResponseResult<()> {
    let amount = match parse_amount(&amount) {
        Ok(amount) => amount,
        Err(err) => {
            bot.send_message(msg.chat.id, format!("{err}. Usage: /spend 12.50"))
                .await?;
            return Ok(());
        }
    };

    let text = match cfg.engine.evaluate_spend(amount, Utc::now()).await {
        Ok(decision) => ui::render_decision(&decision, cfg.timezone),
        Err(err) => {
            tracing::error!("spend evaluation failed: {err}");
            user_message_for_engine_error(&err)
        }
    };
    bot.send_message(msg.chat.id, text).await?;
    Ok(())
}
