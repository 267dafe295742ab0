//! Telegram update handlers.
//!
//! Each handler converts a teloxide update into the transport-neutral
//! `IncomingUpdate` and hands it to the core command router. Failures to
//! reply are logged; the dispatcher never sees an error.

use std::sync::Arc;

use teloxide::{
    prelude::*,
    types::{CallbackQuery, Chat, Message},
};

use passlink_core::{
    domain::{ChatId, ChatKind, UserId},
    messaging::types::{self as port, IncomingUpdate},
};

use crate::router::AppState;

pub(crate) fn chat_kind(chat: &Chat) -> ChatKind {
    if chat.is_private() {
        ChatKind::Private
    } else if chat.is_supergroup() {
        ChatKind::Supergroup
    } else if chat.is_group() {
        ChatKind::Group
    } else {
        ChatKind::Channel
    }
}

fn user_id(user: &teloxide::types::User) -> UserId {
    UserId(user.id.0 as i64)
}

pub(crate) fn message_update(msg: &Message) -> Option<IncomingUpdate> {
    let text = msg.text()?.to_string();
    let chat_id = ChatId(msg.chat.id.0);
    let chat_kind = chat_kind(&msg.chat);
    let user_id = msg.from().map(user_id);

    if text.starts_with('/') {
        return Some(IncomingUpdate::Command(port::Command {
            chat_id,
            chat_kind,
            user_id,
            text,
        }));
    }

    Some(IncomingUpdate::Text(port::TextMessage {
        chat_id,
        chat_kind,
        user_id,
        text,
    }))
}

pub(crate) fn callback_update(q: &CallbackQuery) -> Option<IncomingUpdate> {
    let msg = q.message.as_ref()?;
    Some(IncomingUpdate::Callback(port::CallbackQuery {
        callback_id: q.id.clone(),
        chat_id: ChatId(msg.chat.id.0),
        chat_kind: chat_kind(&msg.chat),
        user_id: user_id(&q.from),
        data: q.data.clone().unwrap_or_default(),
    }))
}

pub async fn handle_message(msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(update) = message_update(&msg) else {
        tracing::debug!(chat = msg.chat.id.0, "ignoring non-text message");
        return Ok(());
    };

    if let Err(e) = state.router.handle(update).await {
        tracing::error!(chat = msg.chat.id.0, error = %e, "failed to handle message");
    }
    Ok(())
}

pub async fn handle_callback(
    bot: Bot,
    q: CallbackQuery,
    state: Arc<AppState>,
) -> ResponseResult<()> {
    let Some(update) = callback_update(&q) else {
        // Inline-mode callbacks carry no chat; just stop the spinner.
        let _ = bot.answer_callback_query(q.id).await;
        return Ok(());
    };

    if let Err(e) = state.router.handle(update).await {
        tracing::error!(callback = %q.id, error = %e, "failed to handle callback");
    }
    Ok(())
}
