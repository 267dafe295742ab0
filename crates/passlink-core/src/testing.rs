//! Test doubles shared by the unit tests in this crate.

use std::{
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use tokio::sync::Mutex;

use crate::{
    domain::{ChannelRef, ChatId, LinkRecord, MessageId, MessageRef, RecordId, UserId},
    errors::{Error, StoreError, StoreResult},
    membership::{MemberStatus, MembershipOracle},
    messaging::{
        port::MessagingPort,
        types::{InlineKeyboard, MessagingCapabilities},
    },
    store::{MemoryRecordStore, RecordStore},
    Result,
};

/// Backend that is always down.
pub struct FailingRecordStore;

#[async_trait]
impl RecordStore for FailingRecordStore {
    async fn insert(&self, _record: LinkRecord) -> StoreResult<RecordId> {
        Err(StoreError::WriteFailed("connection refused".to_string()))
    }

    async fn find_by_passkey(&self, _passkey: &str) -> StoreResult<Option<LinkRecord>> {
        Err(StoreError::ReadFailed("connection refused".to_string()))
    }

    fn list_all(&self) -> BoxStream<'_, StoreResult<LinkRecord>> {
        stream::once(async { Err(StoreError::ReadFailed("connection refused".to_string())) })
            .boxed()
    }
}

/// Memory store that sleeps before every operation.
pub struct SlowRecordStore {
    inner: MemoryRecordStore,
    delay: Duration,
}

impl SlowRecordStore {
    pub fn new(delay: Duration) -> Self {
        Self {
            inner: MemoryRecordStore::new(),
            delay,
        }
    }

    pub async fn inserted(&self) -> usize {
        self.inner.len().await
    }
}

#[async_trait]
impl RecordStore for SlowRecordStore {
    async fn insert(&self, record: LinkRecord) -> StoreResult<RecordId> {
        tokio::time::sleep(self.delay).await;
        self.inner.insert(record).await
    }

    async fn find_by_passkey(&self, passkey: &str) -> StoreResult<Option<LinkRecord>> {
        tokio::time::sleep(self.delay).await;
        self.inner.find_by_passkey(passkey).await
    }

    fn list_all(&self) -> BoxStream<'_, StoreResult<LinkRecord>> {
        self.inner.list_all()
    }
}

/// Memory store that counts every access.
#[derive(Default)]
pub struct CountingRecordStore {
    inner: MemoryRecordStore,
    calls: AtomicUsize,
}

impl CountingRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecordStore for CountingRecordStore {
    async fn insert(&self, record: LinkRecord) -> StoreResult<RecordId> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.insert(record).await
    }

    async fn find_by_passkey(&self, passkey: &str) -> StoreResult<Option<LinkRecord>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.find_by_passkey(passkey).await
    }

    fn list_all(&self) -> BoxStream<'_, StoreResult<LinkRecord>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.list_all()
    }
}

/// Oracle with a fixed answer, or a fixed failure when `None`.
pub struct StaticOracle(pub Option<MemberStatus>);

#[async_trait]
impl MembershipOracle for StaticOracle {
    async fn query(&self, _channel: &ChannelRef, _user: UserId) -> Result<MemberStatus> {
        self.0
            .ok_or_else(|| Error::External("telegram error: Bad Request: user not found".into()))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Sent {
    Html {
        chat_id: ChatId,
        html: String,
    },
    Keyboard {
        chat_id: ChatId,
        html: String,
        keyboard: InlineKeyboard,
    },
    CallbackAnswer {
        callback_id: String,
    },
}

/// Messenger that records everything it is asked to send.
pub struct RecordingMessenger {
    sent: Mutex<Vec<Sent>>,
    max_message_len: usize,
}

impl RecordingMessenger {
    pub fn new() -> Self {
        Self::with_limit(4096)
    }

    pub fn with_limit(max_message_len: usize) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            max_message_len,
        }
    }

    pub async fn sent(&self) -> Vec<Sent> {
        self.sent.lock().await.clone()
    }

    /// Text of every chat message, in order, ignoring callback answers.
    pub async fn texts(&self) -> Vec<String> {
        self.sent
            .lock()
            .await
            .iter()
            .filter_map(|s| match s {
                Sent::Html { html, .. } | Sent::Keyboard { html, .. } => Some(html.clone()),
                Sent::CallbackAnswer { .. } => None,
            })
            .collect()
    }

    async fn push(&self, chat_id: ChatId, sent: Sent) -> MessageRef {
        let mut log = self.sent.lock().await;
        log.push(sent);
        MessageRef {
            chat_id,
            message_id: MessageId(log.len() as i32),
        }
    }
}

#[async_trait]
impl MessagingPort for RecordingMessenger {
    fn capabilities(&self) -> MessagingCapabilities {
        MessagingCapabilities {
            max_message_len: self.max_message_len,
        }
    }

    async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<MessageRef> {
        let sent = Sent::Html {
            chat_id,
            html: html.to_string(),
        };
        Ok(self.push(chat_id, sent).await)
    }

    async fn send_inline_keyboard(
        &self,
        chat_id: ChatId,
        html: &str,
        keyboard: InlineKeyboard,
    ) -> Result<MessageRef> {
        let sent = Sent::Keyboard {
            chat_id,
            html: html.to_string(),
            keyboard,
        };
        Ok(self.push(chat_id, sent).await)
    }

    async fn answer_callback_query(&self, callback_id: &str, _text: Option<&str>) -> Result<()> {
        let sent = Sent::CallbackAnswer {
            callback_id: callback_id.to_string(),
        };
        self.push(ChatId(0), sent).await;
        Ok(())
    }
}
