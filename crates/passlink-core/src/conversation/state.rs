use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::{
    domain::ChatId,
    errors::{StoreResult, TurnError},
};

/// Which input a chat is expected to send next.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Phase {
    Idle,
    AwaitingLink,
    AwaitingPasskeyForUpload,
    AwaitingPasskeyForDownload,
}

impl Phase {
    pub const ALL: [Phase; 4] = [
        Phase::Idle,
        Phase::AwaitingLink,
        Phase::AwaitingPasskeyForUpload,
        Phase::AwaitingPasskeyForDownload,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::AwaitingLink => "awaiting_link",
            Phase::AwaitingPasskeyForUpload => "awaiting_upload_passkey",
            Phase::AwaitingPasskeyForDownload => "awaiting_download_passkey",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Phase::ALL.into_iter().find(|p| p.as_str() == raw)
    }
}

/// In-memory conversation state. The pending link only exists while waiting
/// for the upload passkey.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum ConversationState {
    #[default]
    Idle,
    AwaitingLink,
    AwaitingPasskeyForUpload {
        pending_link: String,
    },
    AwaitingPasskeyForDownload,
}

impl ConversationState {
    pub fn phase(&self) -> Phase {
        match self {
            ConversationState::Idle => Phase::Idle,
            ConversationState::AwaitingLink => Phase::AwaitingLink,
            ConversationState::AwaitingPasskeyForUpload { .. } => Phase::AwaitingPasskeyForUpload,
            ConversationState::AwaitingPasskeyForDownload => Phase::AwaitingPasskeyForDownload,
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, ConversationState::Idle)
    }
}

/// Flat form kept by a `ConversationStore`.
///
/// Backends can hold combinations the enum cannot express (a pending link
/// without the upload phase, or the reverse); converting those back yields
/// `TurnError::MalformedState`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StateRecord {
    pub phase: Phase,
    pub pending_link: Option<String>,
}

impl From<&ConversationState> for StateRecord {
    fn from(state: &ConversationState) -> Self {
        let pending_link = match state {
            ConversationState::AwaitingPasskeyForUpload { pending_link } => {
                Some(pending_link.clone())
            }
            _ => None,
        };
        Self {
            phase: state.phase(),
            pending_link,
        }
    }
}

impl TryFrom<StateRecord> for ConversationState {
    type Error = TurnError;

    fn try_from(record: StateRecord) -> Result<Self, Self::Error> {
        match (record.phase, record.pending_link) {
            (Phase::Idle, None) => Ok(ConversationState::Idle),
            (Phase::AwaitingLink, None) => Ok(ConversationState::AwaitingLink),
            (Phase::AwaitingPasskeyForUpload, Some(pending_link)) => {
                Ok(ConversationState::AwaitingPasskeyForUpload { pending_link })
            }
            (Phase::AwaitingPasskeyForDownload, None) => {
                Ok(ConversationState::AwaitingPasskeyForDownload)
            }
            (Phase::AwaitingPasskeyForUpload, None) => Err(TurnError::MalformedState(
                "upload passkey expected but no pending link".to_string(),
            )),
            (phase, Some(_)) => Err(TurnError::MalformedState(format!(
                "pending link present in phase {}",
                phase.as_str()
            ))),
        }
    }
}

/// Storage for conversation state, keyed by chat. A missing entry means idle.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn load(&self, chat_id: ChatId) -> StoreResult<Option<StateRecord>>;
    async fn save(&self, chat_id: ChatId, record: &StateRecord) -> StoreResult<()>;
    async fn clear(&self, chat_id: ChatId) -> StoreResult<()>;
}

/// Conversation state that lives for the process lifetime.
#[derive(Default)]
pub struct MemoryConversationStore {
    states: Mutex<HashMap<ChatId, StateRecord>>,
}

impl MemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationStore for MemoryConversationStore {
    async fn load(&self, chat_id: ChatId) -> StoreResult<Option<StateRecord>> {
        Ok(self.states.lock().await.get(&chat_id).cloned())
    }

    async fn save(&self, chat_id: ChatId, record: &StateRecord) -> StoreResult<()> {
        self.states.lock().await.insert(chat_id, record.clone());
        Ok(())
    }

    async fn clear(&self, chat_id: ChatId) -> StoreResult<()> {
        self.states.lock().await.remove(&chat_id);
        Ok(())
    }
}
