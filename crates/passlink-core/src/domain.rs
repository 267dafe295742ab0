/// Telegram user id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct UserId(pub i64);

/// Telegram chat id (numeric). One private chat per user with the bot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChatId(pub i64);

/// Telegram message id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageId(pub i32);

/// A stable reference to a Telegram message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageRef {
    pub chat_id: ChatId,
    pub message_id: MessageId,
}

/// Row id assigned by the record backend on insert.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RecordId(pub i64);

/// Where an event came from. Only `Private` chats are served.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChatKind {
    Private,
    Group,
    Supergroup,
    Channel,
}

impl ChatKind {
    pub fn is_private(self) -> bool {
        matches!(self, ChatKind::Private)
    }
}

/// The channel whose membership gates the bot.
///
/// Telegram accepts either a numeric chat id or a public `@username`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChannelRef {
    Id(i64),
    Username(String),
}

impl ChannelRef {
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        if let Ok(id) = raw.parse::<i64>() {
            return Some(ChannelRef::Id(id));
        }
        let name = raw.strip_prefix('@').unwrap_or(raw);
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return None;
        }
        Some(ChannelRef::Username(format!("@{name}")))
    }

    /// Public `t.me` link, only known for username channels.
    pub fn public_url(&self) -> Option<String> {
        match self {
            ChannelRef::Id(_) => None,
            ChannelRef::Username(name) => Some(format!("https://t.me/{}", name.trim_start_matches('@'))),
        }
    }
}

/// A stored link and the passkey that unlocks it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LinkRecord {
    pub link: String,
    pub passkey: String,
}

impl LinkRecord {
    pub fn new(link: impl Into<String>, passkey: impl Into<String>) -> Self {
        Self {
            link: link.into(),
            passkey: passkey.into(),
        }
    }
}
