use std::{env, fs, path::Path, time::Duration};

use crate::{
    domain::{ChannelRef, UserId},
    errors::Error,
    Result,
};

/// Typed configuration, read from the environment (and `.env` if present).
#[derive(Clone, Debug)]
pub struct Config {
    // Core
    pub telegram_bot_token: String,
    pub allowed_channel: ChannelRef,
    pub admin_user_id: UserId,
    pub join_channel_url: Option<String>,

    // Storage
    pub database_url: String,
    pub persist_conversations: bool,

    // Runtime constants
    pub membership_timeout: Duration,

    // Telegram limits
    pub telegram_message_limit: usize,
    pub telegram_safe_limit: usize,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup (the process env in
    /// production, a map in tests).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).and_then(non_empty);

        // Required
        let telegram_bot_token = get("BOT_TOKEN")
            .or_else(|| get("TELEGRAM_BOT_TOKEN"))
            .ok_or_else(|| {
                Error::Config("BOT_TOKEN environment variable is required".to_string())
            })?;

        let raw_channel = get("ALLOWED_CHANNEL_ID").ok_or_else(|| {
            Error::Config("ALLOWED_CHANNEL_ID environment variable is required".to_string())
        })?;
        let allowed_channel = ChannelRef::parse(&raw_channel).ok_or_else(|| {
            Error::Config(format!(
                "ALLOWED_CHANNEL_ID must be a numeric chat id or @username, got {raw_channel:?}"
            ))
        })?;

        let raw_admin = get("ALLOWED_USER_ID").ok_or_else(|| {
            Error::Config("ALLOWED_USER_ID environment variable is required".to_string())
        })?;
        let admin_user_id = raw_admin
            .trim()
            .parse::<i64>()
            .map(UserId)
            .map_err(|_| {
                Error::Config(format!(
                    "ALLOWED_USER_ID must be a numeric user id, got {raw_admin:?}"
                ))
            })?;

        // Join button falls back to the channel's public link.
        let join_channel_url = get("JOIN_CHANNEL_URL").or_else(|| allowed_channel.public_url());

        // Storage
        let database_url = get("DATABASE_URL").unwrap_or_else(|| "sqlite://passlink.db".to_string());
        let persist_conversations = get("PERSIST_CONVERSATIONS")
            .map(|s| parse_bool(&s))
            .unwrap_or(false);

        let membership_timeout = Duration::from_millis(
            get("MEMBERSHIP_TIMEOUT_MS")
                .and_then(|s| s.trim().parse::<u64>().ok())
                .unwrap_or(5_000),
        );

        // Telegram message limits
        let telegram_message_limit = get("TELEGRAM_MESSAGE_LIMIT")
            .and_then(|s| s.trim().parse::<usize>().ok())
            .unwrap_or(4096);
        let telegram_safe_limit = get("TELEGRAM_SAFE_LIMIT")
            .and_then(|s| s.trim().parse::<usize>().ok())
            .unwrap_or(4000)
            .min(telegram_message_limit);

        Ok(Self {
            telegram_bot_token,
            allowed_channel,
            admin_user_id,
            join_channel_url,
            database_url,
            persist_conversations,
            membership_timeout,
            telegram_message_limit,
            telegram_safe_limit,
        })
    }
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        env::set_var(key, unquote(v.trim()));
    }
}

fn unquote(val: &str) -> &str {
    if val.len() >= 2
        && ((val.starts_with('"') && val.ends_with('"'))
            || (val.starts_with('\'') && val.ends_with('\'')))
    {
        return &val[1..val.len() - 1];
    }
    val
}

fn parse_bool(s: &str) -> bool {
    matches!(
        s.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
