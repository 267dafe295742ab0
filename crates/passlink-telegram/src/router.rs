use std::sync::Arc;

use teloxide::{dispatching::Dispatcher, dptree, prelude::*};

use passlink_core::{
    config::Config,
    conversation::{ConversationMachine, ConversationStore},
    dispatch::{CommandRouter, RouterSettings},
    membership::MembershipGate,
    messaging::port::MessagingPort,
    store::RecordStore,
};

use crate::handlers;
use crate::{TelegramMembership, TelegramMessenger};

/// Shared dispatcher dependency.
pub struct AppState {
    pub router: CommandRouter,
}

pub async fn run_polling(
    cfg: Arc<Config>,
    records: Arc<dyn RecordStore>,
    conversations: Arc<dyn ConversationStore>,
) -> anyhow::Result<()> {
    let bot = Bot::new(cfg.telegram_bot_token.clone());

    let me = bot.get_me().await?;
    let bot_username = me.username().to_string();
    tracing::info!(bot = %bot_username, "passlink started");
    tracing::info!(
        channel = ?cfg.allowed_channel,
        admin = cfg.admin_user_id.0,
        persistent_conversations = cfg.persist_conversations,
        "gate configured"
    );

    let messenger: Arc<dyn MessagingPort> = Arc::new(TelegramMessenger::new(bot.clone()));
    let gate = MembershipGate::new(
        Arc::new(TelegramMembership::new(bot.clone())),
        cfg.allowed_channel.clone(),
        cfg.membership_timeout,
    );
    let machine = ConversationMachine::new(conversations, records.clone());

    let state = Arc::new(AppState {
        router: CommandRouter::new(
            RouterSettings::from_config(&cfg, bot_username),
            gate,
            machine,
            records,
            messenger,
        ),
    });

    let handler = dptree::entry()
        .branch(Update::filter_callback_query().endpoint(handlers::handle_callback))
        .branch(Update::filter_message().endpoint(handlers::handle_message));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}
