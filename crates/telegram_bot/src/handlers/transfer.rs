//! /transfer and its confirmation buttons.
//!
//! A transfer is only executed after the user confirms it. The engine checks
//! the budget again at that point, so a prompt that went stale is denied
//! rather than overspent.

use chrono::Utc;
use engine::TransferOutcome;
use teloxide::{
    RequestError,
    dispatching::UpdateHandler,
    dptree::case,
    prelude::*,
    types::{ChatId, MessageId},
};
use uuid::Uuid;

use crate::{
    ConfigParameters,
    commands::Command,
    parsing::parse_amount,
    state::{ConfirmError, PendingTransfer},
    ui,
};

use super::user_message_for_engine_error;

/// Build the schema for the /transfer command
pub(super) fn schema() -> UpdateHandler<RequestError> {
    case![Command::Transfer(amount)].endpoint(handle_transfer)
}

async fn handle_transfer(
    bot: Bot,
    cfg: ConfigParameters,
    msg: Message,
    amount: String,
) -> ResponseResult<()> {
    let Some(user_id) = msg.from.as_ref().map(|user| user.id) else {
        bot.send_message(msg.chat.id, "Unable to identify the user.")
            .await?;
        return Ok(());
    };

    let amount = match parse_amount(&amount) {
        Ok(amount) => amount,
        Err(err) => {
            bot.send_message(msg.chat.id, format!("{err}. Usage: /transfer 12.50"))
                .await?;
            return Ok(());
        }
    };

    let now = Utc::now();
    let decision = match cfg.engine.evaluate_spend(amount, now).await {
        Ok(decision) => decision,
        Err(err) => {
            tracing::error!("transfer evaluation failed: {err}");
            bot.send_message(msg.chat.id, user_message_for_engine_error(&err))
                .await?;
            return Ok(());
        }
    };
    if !decision.is_approved() {
        bot.send_message(msg.chat.id, ui::render_decision(&decision, cfg.timezone))
            .await?;
        return Ok(());
    }

    let nonce = cfg
        .pending
        .insert(PendingTransfer {
            user_id,
            amount,
            created_at: now,
        })
        .await;
    let (text, kb) =
        ui::render_transfer_prompt(&decision, &cfg.engine.config().destination, nonce);
    bot.send_message(msg.chat.id, text).reply_markup(kb).await?;
    Ok(())
}

pub(super) async fn confirm(
    bot: &Bot,
    cfg: &ConfigParameters,
    chat_id: ChatId,
    message_id: MessageId,
    user_id: UserId,
    nonce: Uuid,
) -> ResponseResult<()> {
    let now = Utc::now();
    let pending = match cfg.pending.take(nonce, user_id, now).await {
        Ok(pending) => pending,
        Err(ConfirmError::WrongUser) => {
            // The prompt stays for its owner.
            bot.send_message(chat_id, ConfirmError::WrongUser.to_string())
                .await?;
            return Ok(());
        }
        Err(err) => {
            bot.edit_message_text(chat_id, message_id, err.to_string())
                .await?;
            return Ok(());
        }
    };

    bot.edit_message_text(
        chat_id,
        message_id,
        format!("⏳ Sending {}...", pending.amount),
    )
    .await?;

    let text = match cfg.engine.execute_transfer(pending.amount, now).await {
        Ok(TransferOutcome::Completed { record, decision }) => {
            ui::render_transfer_done(&record, &decision)
        }
        Ok(TransferOutcome::Denied(decision)) => ui::render_decision(&decision, cfg.timezone),
        Err(err) => {
            tracing::error!(amount = %pending.amount, "transfer failed: {err}");
            user_message_for_engine_error(&err)
        }
    };
    bot.edit_message_text(chat_id, message_id, text).await?;
    Ok(())
}

pub(super) async fn cancel(
    bot: &Bot,
    cfg: &ConfigParameters,
    chat_id: ChatId,
    message_id: MessageId,
    user_id: UserId,
    nonce: Uuid,
) -> ResponseResult<()> {
    let text = match cfg.pending.take(nonce, user_id, Utc::now()).await {
        Err(ConfirmError::WrongUser) => return Ok(()),
        Ok(pending) => format!("Transfer of {} cancelled.", pending.amount),
        Err(_) => "Transfer cancelled.".to_string(),
    };
    bot.edit_message_text(chat_id, message_id, text).await?;
    Ok(())
}
