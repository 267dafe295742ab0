use std::{
    collections::HashMap,
    sync::{Arc, Mutex as SyncMutex, PoisonError},
};

use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{
    transition, ConversationState, ConversationStore, Effect, Flow, Input, Phase, Prompt,
    StateRecord, Step,
};
use crate::{
    domain::{ChatId, LinkRecord, RecordId},
    errors::{StoreError, TurnError},
    store::RecordStore,
};

/// One async mutex per chat. Events for the same chat run one at a time;
/// different chats never wait on each other.
///
/// An entry lives only while some task holds or waits for it, so the map
/// stays as large as the set of busy chats.
#[derive(Default)]
pub struct ChatLocks {
    inner: SyncMutex<HashMap<ChatId, Arc<Mutex<()>>>>,
}

/// Exclusive turn on one chat. Dropping it releases the chat.
pub struct ChatTurn<'a> {
    locks: &'a ChatLocks,
    chat_id: ChatId,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for ChatTurn<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.locks.release(self.chat_id);
    }
}

impl ChatLocks {
    pub async fn lock_chat(&self, chat_id: ChatId) -> ChatTurn<'_> {
        let lock = {
            let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            map.entry(chat_id)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        ChatTurn {
            locks: self,
            chat_id,
            guard: Some(lock.lock_owned().await),
        }
    }

    /// Number of chats with a live lock entry.
    pub fn tracked(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn release(&self, chat_id: ChatId) {
        let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        // Waiters clone the Arc under this map lock, so a count of one means
        // nobody else is holding or queued on it.
        if map.get(&chat_id).is_some_and(|l| Arc::strong_count(l) == 1) {
            map.remove(&chat_id);
        }
    }
}

/// Successful result of a conversation turn.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Input arrived while idle; nothing happened.
    Ignored,
    Prompted(Prompt),
    Saved(RecordId),
    Found(LinkRecord),
}

pub struct ConversationMachine {
    states: Arc<dyn ConversationStore>,
    records: Arc<dyn RecordStore>,
    locks: ChatLocks,
}

impl ConversationMachine {
    pub fn new(states: Arc<dyn ConversationStore>, records: Arc<dyn RecordStore>) -> Self {
        Self {
            states,
            records,
            locks: ChatLocks::default(),
        }
    }

    /// Enter the upload or download flow.
    pub async fn select(&self, chat_id: ChatId, flow: Flow) -> Result<Outcome, TurnError> {
        let _turn = self.locks.lock_chat(chat_id).await;
        let current = self.current_or_reset(chat_id).await?;
        let step = transition(&current, Input::Select(flow));
        self.apply(chat_id, &current, step).await
    }

    /// Feed a free-text message into the chat's conversation.
    pub async fn on_text(&self, chat_id: ChatId, text: &str) -> Result<Outcome, TurnError> {
        let _turn = self.locks.lock_chat(chat_id).await;
        let current = self.current_or_reset(chat_id).await?;
        let step = transition(&current, Input::Text(text.to_string()));
        self.apply(chat_id, &current, step).await
    }

    /// Current phase of a chat, for routing decisions and diagnostics.
    pub async fn phase(&self, chat_id: ChatId) -> Result<Phase, TurnError> {
        let _turn = self.locks.lock_chat(chat_id).await;
        self.current(chat_id).await.map(|s| s.phase())
    }

    pub fn locks(&self) -> &ChatLocks {
        &self.locks
    }

    async fn current(&self, chat_id: ChatId) -> Result<ConversationState, TurnError> {
        let record = match self.states.load(chat_id).await {
            Ok(record) => record,
            Err(StoreError::Corrupt(detail)) => return Err(TurnError::MalformedState(detail)),
            Err(err) => return Err(err.into()),
        };
        match record {
            Some(record) => ConversationState::try_from(record),
            None => Ok(ConversationState::Idle),
        }
    }

    /// Load the chat's state. A malformed state is cleared before the error
    /// is returned, so the next event starts from idle.
    async fn current_or_reset(&self, chat_id: ChatId) -> Result<ConversationState, TurnError> {
        match self.current(chat_id).await {
            Err(err @ TurnError::MalformedState(_)) => {
                tracing::error!(chat = chat_id.0, error = %err, "conversation state invariant violated; resetting to idle");
                self.settle(chat_id, &ConversationState::Idle).await;
                Err(err)
            }
            other => other,
        }
    }

    async fn apply(
        &self,
        chat_id: ChatId,
        current: &ConversationState,
        step: Step,
    ) -> Result<Outcome, TurnError> {
        let Step { next, effect } = step;
        tracing::debug!(
            chat = chat_id.0,
            from = current.phase().as_str(),
            to = next.phase().as_str(),
            "conversation turn"
        );

        match effect {
            Effect::Ignore => Ok(Outcome::Ignored),
            Effect::Prompt(prompt) => {
                self.commit(chat_id, &next).await?;
                Ok(Outcome::Prompted(prompt))
            }
            Effect::Save(record) => {
                let result = self.records.insert(record).await;
                self.settle(chat_id, &next).await;
                match result {
                    Ok(id) => {
                        tracing::info!(chat = chat_id.0, record = id.0, "link stored");
                        Ok(Outcome::Saved(id))
                    }
                    Err(err) => {
                        tracing::error!(chat = chat_id.0, error = %err, "failed to store link");
                        Err(err.into())
                    }
                }
            }
            Effect::Lookup { passkey } => {
                let result = self.records.find_by_passkey(&passkey).await;
                self.settle(chat_id, &next).await;
                match result {
                    Ok(Some(record)) => Ok(Outcome::Found(record)),
                    Ok(None) => Err(TurnError::NotFound),
                    Err(err) => {
                        tracing::error!(chat = chat_id.0, error = %err, "passkey lookup failed");
                        Err(err.into())
                    }
                }
            }
        }
    }

    async fn commit(&self, chat_id: ChatId, next: &ConversationState) -> Result<(), TurnError> {
        if next.is_idle() {
            self.states.clear(chat_id).await?;
        } else {
            self.states.save(chat_id, &StateRecord::from(next)).await?;
        }
        Ok(())
    }

    /// Commit after a terminal effect. The effect's result wins over a
    /// failure to record the reset, which is only logged.
    async fn settle(&self, chat_id: ChatId, next: &ConversationState) {
        if let Err(err) = self.commit(chat_id, next).await {
            tracing::error!(chat = chat_id.0, error = %err, "failed to reset conversation state");
        }
    }
}
