//! Update routing.
//!
//! Every update from a user outside the allow list is dropped before any
//! handler runs.

use engine::{EngineError, SpendingMode};
use teloxide::{
    RequestError,
    dispatching::{HandlerExt, UpdateHandler},
    prelude::*,
};
use uuid::Uuid;

use crate::{ConfigParameters, commands::Command};

mod budget;
mod exports;
mod mode;
mod start;
mod transfer;

/// What an inline button asks for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum CallbackAction {
    ConfirmTransfer(Uuid),
    CancelTransfer(Uuid),
    SetMode(SpendingMode),
}

impl CallbackAction {
    fn parse(data: &str) -> Option<Self> {
        if let Some(nonce) = data.strip_prefix("transfer:confirm:") {
            return Uuid::parse_str(nonce).ok().map(Self::ConfirmTransfer);
        }
        if let Some(nonce) = data.strip_prefix("transfer:cancel:") {
            return Uuid::parse_str(nonce).ok().map(Self::CancelTransfer);
        }
        if let Some(code) = data.strip_prefix("mode:set:") {
            return code.parse().ok().map(Self::SetMode);
        }
        None
    }
}

/// Build the whole handler tree.
pub(crate) fn schema() -> UpdateHandler<RequestError> {
    let commands = Update::filter_message()
        .filter(|cfg: ConfigParameters, msg: Message| {
            msg.from
                .as_ref()
                .is_some_and(|user| cfg.allowed_users.contains(&user.id))
        })
        .filter_command::<Command>()
        .branch(start::schema())
        .branch(budget::schema())
        .branch(transfer::schema())
        .branch(mode::schema())
        .branch(exports::schema());

    let callbacks = Update::filter_callback_query()
        .filter(|cfg: ConfigParameters, q: CallbackQuery| cfg.allowed_users.contains(&q.from.id))
        .filter_map(|q: CallbackQuery| q.data.as_deref().and_then(CallbackAction::parse))
        .endpoint(handle_callback);

    dptree::entry().branch(commands).branch(callbacks)
}

async fn handle_callback(
    bot: Bot,
    q: CallbackQuery,
    cfg: ConfigParameters,
    action: CallbackAction,
) -> ResponseResult<()> {
    let _ = bot.answer_callback_query(q.id.clone()).await;

    let Some(message) = q.message.as_ref() else {
        return Ok(());
    };
    let chat_id = message.chat().id;
    let message_id = message.id();

    match action {
        CallbackAction::ConfirmTransfer(nonce) => {
            transfer::confirm(&bot, &cfg, chat_id, message_id, q.from.id, nonce).await
        }
        CallbackAction::CancelTransfer(nonce) => {
            transfer::cancel(&bot, &cfg, chat_id, message_id, q.from.id, nonce).await
        }
        CallbackAction::SetMode(mode) => mode::apply(&bot, &cfg, chat_id, Some(message_id), mode).await,
    }
}

/// Text shown to the user for an engine failure.
pub(crate) fn user_message_for_engine_error(err: &EngineError) -> String {
    match err {
        EngineError::TransferFailed(reason) => {
            format!("⚠️ The transfer did not go through: {reason}\nNothing was spent.")
        }
        EngineError::LedgerNotPersisted { tx_reference, .. } => format!(
            "⚠️ Transfer {tx_reference} was sent but could not be saved. The budget shown may be out of date until it is fixed."
        ),
        EngineError::LimitExceeded {
            requested,
            remaining,
        } => format!("❌ {requested} is above the card allowance left ({remaining})."),
        EngineError::InvalidAmount(reason) => format!("Invalid amount: {reason}"),
        EngineError::InvalidMode(mode) => format!("Unknown mode \"{mode}\"."),
        _ => "Something went wrong, please try again later.".to_string(),
    }
}
