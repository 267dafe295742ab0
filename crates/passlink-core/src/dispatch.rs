//! Command router: turns incoming updates into gate checks, conversation
//! turns and replies.

use std::sync::Arc;

use futures::StreamExt;

use crate::{
    config::Config,
    conversation::{ConversationMachine, Flow, Outcome, Prompt},
    domain::{ChatId, UserId},
    errors::{StoreError, TurnError},
    formatting::{escape_html, escape_html_chunks, pack_lines},
    membership::MembershipGate,
    messaging::{
        port::MessagingPort,
        types::{CallbackQuery, Command, IncomingUpdate, InlineButton, InlineKeyboard, TextMessage},
    },
    store::RecordStore,
    Result,
};

const PRIVATE_ONLY: &str = "This bot can only be used in private messages.";
const PM_REDIRECT: &str = "Send this in PM, please!";
const WELCOME: &str = "Welcome! Please choose below:";
const JOIN_REQUIRED: &str =
    "You must join our channel to use this bot. Please click the button below to join:";
const JOIN_REQUIRED_NO_LINK: &str = "You must join our channel to use this bot.";
const HELP: &str = "This bot provides the following functionalities:\n\
1. <b>Download</b>: get a link by entering its passkey (requires validation).\n\
2. <b>Upload</b>: store a link behind a passkey (requires validation).\n\
3. <b>Help</b>: show this message.";

const PROMPT_LINK: &str = "Please send the link you want to upload.";
const PROMPT_UPLOAD_PASSKEY: &str = "Please send the passkey for the link.";
const PROMPT_DOWNLOAD_PASSKEY: &str = "Please enter the passkey to download the link.";
const SAVED: &str = "Link and passkey have been saved to the database.";

const NOT_AUTHORIZED: &str = "You are not authorized to use this command.";
const SAVE_FAILED: &str = "Failed to save link and passkey. Please try again.";
const READ_FAILED: &str = "Could not reach the database. Please try again.";
const INVALID_PASSKEY: &str = "Invalid passkey. Please try again.";
const UNEXPECTED: &str = "An unexpected error occurred. Please try again.";

const LIST_HEADER: &str = "<b>Entries in the database:</b>";
const LIST_EMPTY: &str = "No entries in the database.";
const LIST_FAILED: &str = "Error retrieving entries from the database.";

/// Slash-commands the bot understands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BotCommand {
    Start,
    ListEntries,
}

impl BotCommand {
    /// `None` for anything that is not one of ours; such text is routed as a
    /// plain message.
    pub fn parse(text: &str) -> Option<Self> {
        let (name, _args) = parse_command(text)?;
        match name.as_str() {
            "start" => Some(BotCommand::Start),
            "db" => Some(BotCommand::ListEntries),
            _ => None,
        }
    }
}

fn parse_command(text: &str) -> Option<(String, String)> {
    // Telegram may send `/cmd@botname arg1 ...`
    let text = text.trim();
    if !text.starts_with('/') {
        return None;
    }
    let mut parts = text.splitn(2, char::is_whitespace);
    let first = parts.next().unwrap_or("").trim();
    let rest = parts.next().unwrap_or("").trim().to_string();

    let cmd = first
        .trim_start_matches('/')
        .split('@')
        .next()
        .unwrap_or("")
        .to_lowercase();

    if cmd.is_empty() {
        return None;
    }
    Some((cmd, rest))
}

/// Main menu buttons and their callback tokens.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MenuAction {
    Download,
    Upload,
    Help,
}

impl MenuAction {
    pub fn token(self) -> &'static str {
        match self {
            MenuAction::Download => "download",
            MenuAction::Upload => "upload",
            MenuAction::Help => "help",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            MenuAction::Download => "Download",
            MenuAction::Upload => "Upload",
            MenuAction::Help => "Help",
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        [MenuAction::Download, MenuAction::Upload, MenuAction::Help]
            .into_iter()
            .find(|a| a.token() == token)
    }

    fn button(self) -> InlineButton {
        InlineButton::callback(self.label(), self.token())
    }
}

fn main_menu() -> InlineKeyboard {
    InlineKeyboard::new(vec![
        vec![MenuAction::Download.button(), MenuAction::Upload.button()],
        vec![MenuAction::Help.button()],
    ])
}

#[derive(Clone, Debug)]
pub struct RouterSettings {
    pub admin_user_id: UserId,
    pub join_channel_url: Option<String>,
    /// Used to build the `t.me/<bot>?start=private` redirect.
    pub bot_username: String,
    pub safe_message_len: usize,
}

impl RouterSettings {
    pub fn from_config(cfg: &Config, bot_username: impl Into<String>) -> Self {
        Self {
            admin_user_id: cfg.admin_user_id,
            join_channel_url: cfg.join_channel_url.clone(),
            bot_username: bot_username.into(),
            safe_message_len: cfg.telegram_safe_limit,
        }
    }
}

pub struct CommandRouter {
    settings: RouterSettings,
    gate: MembershipGate,
    machine: ConversationMachine,
    records: Arc<dyn RecordStore>,
    messenger: Arc<dyn MessagingPort>,
}

impl CommandRouter {
    pub fn new(
        settings: RouterSettings,
        gate: MembershipGate,
        machine: ConversationMachine,
        records: Arc<dyn RecordStore>,
        messenger: Arc<dyn MessagingPort>,
    ) -> Self {
        Self {
            settings,
            gate,
            machine,
            records,
            messenger,
        }
    }

    pub fn machine(&self) -> &ConversationMachine {
        &self.machine
    }

    pub async fn handle(&self, update: IncomingUpdate) -> Result<()> {
        match update {
            IncomingUpdate::Command(cmd) => self.on_command(cmd).await,
            IncomingUpdate::Text(msg) => self.on_text(msg).await,
            IncomingUpdate::Callback(q) => self.on_callback(q).await,
        }
    }

    pub async fn on_command(&self, cmd: Command) -> Result<()> {
        match BotCommand::parse(&cmd.text) {
            Some(BotCommand::Start) => self.start(cmd).await,
            Some(BotCommand::ListEntries) => self.list_entries(cmd).await,
            None => {
                self.on_text(TextMessage {
                    chat_id: cmd.chat_id,
                    chat_kind: cmd.chat_kind,
                    user_id: cmd.user_id,
                    text: cmd.text,
                })
                .await
            }
        }
    }

    pub async fn on_callback(&self, q: CallbackQuery) -> Result<()> {
        // Always answer so the client stops its spinner.
        if let Err(e) = self.messenger.answer_callback_query(&q.callback_id, None).await {
            tracing::warn!(error = %e, "failed to answer callback query");
        }

        if !q.chat_kind.is_private() {
            return self.send(q.chat_id, PRIVATE_ONLY).await;
        }

        let Some(action) = MenuAction::from_token(&q.data) else {
            tracing::debug!(chat = q.chat_id.0, "ignoring unknown callback token");
            return Ok(());
        };

        let flow = match action {
            MenuAction::Help => return self.send(q.chat_id, HELP).await,
            MenuAction::Download => Flow::Download,
            MenuAction::Upload => Flow::Upload,
        };

        // Menus outlive membership; check again before entering a flow.
        if !self.gate.is_member(q.user_id).await {
            return self.send_join_prompt(q.chat_id).await;
        }

        let result = self.machine.select(q.chat_id, flow).await;
        self.reply(q.chat_id, result).await
    }

    pub async fn on_text(&self, msg: TextMessage) -> Result<()> {
        if !msg.chat_kind.is_private() {
            return self.send(msg.chat_id, PRIVATE_ONLY).await;
        }

        let result = self.machine.on_text(msg.chat_id, &msg.text).await;
        self.reply(msg.chat_id, result).await
    }

    async fn start(&self, cmd: Command) -> Result<()> {
        if !cmd.chat_kind.is_private() {
            let url = format!(
                "https://t.me/{}?start=private",
                self.settings.bot_username.trim_start_matches('@')
            );
            self.messenger
                .send_inline_keyboard(
                    cmd.chat_id,
                    PM_REDIRECT,
                    InlineKeyboard::single(InlineButton::url("Start", url)),
                )
                .await?;
            return Ok(());
        }

        let is_member = match cmd.user_id {
            Some(user) => self.gate.is_member(user).await,
            None => false,
        };
        if !is_member {
            return self.send_join_prompt(cmd.chat_id).await;
        }

        self.messenger
            .send_inline_keyboard(cmd.chat_id, WELCOME, main_menu())
            .await?;
        Ok(())
    }

    async fn list_entries(&self, cmd: Command) -> Result<()> {
        if !cmd.chat_kind.is_private() {
            return self.send(cmd.chat_id, PRIVATE_ONLY).await;
        }
        if cmd.user_id != Some(self.settings.admin_user_id) {
            tracing::warn!(chat = cmd.chat_id.0, user = ?cmd.user_id.map(|u| u.0), "refused entry listing");
            return self
                .reply(cmd.chat_id, Err(TurnError::AuthorizationDenied))
                .await;
        }

        let limit = self
            .settings
            .safe_message_len
            .min(self.messenger.capabilities().max_message_len)
            .max(64);

        let mut records = self.records.list_all();
        let mut pending = vec![LIST_HEADER.to_string()];
        let mut pending_len = LIST_HEADER.len();
        let mut count = 0usize;

        while let Some(item) = records.next().await {
            let record = match item {
                Ok(record) => record,
                Err(e) => {
                    tracing::error!(error = %e, listed = count, "entry listing failed");
                    return self.send(cmd.chat_id, LIST_FAILED).await;
                }
            };
            count += 1;

            // Escaped piece by piece so an over-long entry is never cut inside
            // an entity.
            let line = format!("Link: {}, Passkey: {}", record.link, record.passkey);
            for piece in escape_html_chunks(&line, limit) {
                if pending_len + piece.len() + 1 > limit {
                    self.send_chunks(cmd.chat_id, std::mem::take(&mut pending), limit)
                        .await?;
                    pending_len = 0;
                }
                pending_len += piece.len() + 1;
                pending.push(piece);
            }
        }

        if count == 0 {
            return self.send(cmd.chat_id, LIST_EMPTY).await;
        }
        tracing::info!(chat = cmd.chat_id.0, entries = count, "listed entries");
        self.send_chunks(cmd.chat_id, pending, limit).await
    }

    async fn send_join_prompt(&self, chat_id: ChatId) -> Result<()> {
        match &self.settings.join_channel_url {
            Some(url) => {
                self.messenger
                    .send_inline_keyboard(
                        chat_id,
                        JOIN_REQUIRED,
                        InlineKeyboard::single(InlineButton::url("Join Channel", url.clone())),
                    )
                    .await?;
                Ok(())
            }
            None => self.send(chat_id, JOIN_REQUIRED_NO_LINK).await,
        }
    }

    async fn reply(&self, chat_id: ChatId, result: std::result::Result<Outcome, TurnError>) -> Result<()> {
        let text = match result {
            Ok(Outcome::Ignored) => return Ok(()),
            Ok(Outcome::Prompted(Prompt::Link)) => PROMPT_LINK.to_string(),
            Ok(Outcome::Prompted(Prompt::UploadPasskey)) => PROMPT_UPLOAD_PASSKEY.to_string(),
            Ok(Outcome::Prompted(Prompt::DownloadPasskey)) => PROMPT_DOWNLOAD_PASSKEY.to_string(),
            Ok(Outcome::Saved(_)) => SAVED.to_string(),
            Ok(Outcome::Found(record)) => {
                format!("Here is your download link: {}", escape_html(&record.link))
            }
            Err(err) => error_text(&err).to_string(),
        };
        self.send(chat_id, &text).await
    }

    async fn send_chunks(&self, chat_id: ChatId, lines: Vec<String>, limit: usize) -> Result<()> {
        for chunk in pack_lines(lines, limit) {
            self.send(chat_id, &chunk).await?;
        }
        Ok(())
    }

    async fn send(&self, chat_id: ChatId, html: &str) -> Result<()> {
        self.messenger.send_html(chat_id, html).await?;
        Ok(())
    }
}

fn error_text(err: &TurnError) -> &'static str {
    match err {
        TurnError::AuthorizationDenied => NOT_AUTHORIZED,
        TurnError::Store(StoreError::WriteFailed(_)) => SAVE_FAILED,
        TurnError::Store(StoreError::ReadFailed(_)) => READ_FAILED,
        TurnError::Store(StoreError::Corrupt(_)) => UNEXPECTED,
        TurnError::NotFound => INVALID_PASSKEY,
        TurnError::MalformedState(_) => UNEXPECTED,
    }
}
