//! Handler for /start and /help

use teloxide::{RequestError, dispatching::UpdateHandler, dptree::case, prelude::*};

use crate::{commands::Command, ui};

/// Build the schema for the /start and /help commands
pub(super) fn schema() -> UpdateHandler<RequestError> {
    dptree::entry()
        .branch(case![Command::Start].endpoint(handle_start))
        .branch(case![Command::Help].endpoint(handle_help))
}

async fn handle_start(bot: Bot, msg: Message) -> ResponseResult<()> {
    bot.send_message(msg.chat.id, ui::render_welcome()).await?;
    Ok(())
}

async fn handle_help(bot: Bot, msg: Message) -> ResponseResult<()> {
    bot.send_message(msg.chat.id, ui::render_help()).await?;
    Ok(())
}
