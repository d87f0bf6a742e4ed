//! Handler for /mode and the mode picker buttons

use chrono::Utc;
use engine::SpendingMode;
use teloxide::{
    RequestError,
    dispatching::UpdateHandler,
    dptree::case,
    prelude::*,
    types::{ChatId, MessageId},
};

use crate::{ConfigParameters, commands::Command, parsing::parse_mode, ui};

use super::user_message_for_engine_error;

/// Build the schema for the /mode command
pub(super) fn schema() -> UpdateHandler<RequestError> {
    case![Command::Mode(mode)].endpoint(handle_mode)
}

async fn handle_mode(
    bot: Bot,
    cfg: ConfigParameters,
    msg: Message,
    mode: String,
) -> ResponseResult<()> {
    match parse_mode(&mode) {
        Ok(Some(mode)) => apply(&bot, &cfg, msg.chat.id, None, mode).await,
        Ok(None) => {
            let (text, kb) = ui::render_mode_picker(cfg.engine.mode().await);
            bot.send_message(msg.chat.id, text).reply_markup(kb).await?;
            Ok(())
        }
        Err(err) => {
            bot.send_message(msg.chat.id, err.to_string()).await?;
            Ok(())
        }
    }
}

/// Switch mode and report the new budget, editing the picker when the change
/// came from one of its buttons.
pub(super) async fn apply(
    bot: &Bot,
    cfg: &ConfigParameters,
    chat_id: ChatId,
    picker: Option<MessageId>,
    mode: SpendingMode,
) -> ResponseResult<()> {
    let now = Utc::now();
    let text = match cfg.engine.set_mode(mode, now).await {
        Ok(_) => {
            let snapshot = cfg.engine.snapshot(now).await;
            ui::render_mode_changed(mode, &snapshot)
        }
        Err(err) => {
            tracing::error!(%mode, "mode change failed: {err}");
            user_message_for_engine_error(&err)
        }
    };

    match picker {
        Some(message_id) => {
            bot.edit_message_text(chat_id, message_id, text).await?;
        }
        None => {
            bot.send_message(chat_id, text).await?;
        }
    }
    Ok(())
}
