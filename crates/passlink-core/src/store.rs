//! Record store port and the in-memory adapter.

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use tokio::sync::Mutex;

use crate::{
    domain::{LinkRecord, RecordId},
    errors::{StoreError, StoreResult},
};

/// Durable passkey → link mapping.
///
/// Inserts are unconditional: several records may share a passkey, and
/// lookups must then return the earliest inserted one.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn insert(&self, record: LinkRecord) -> StoreResult<RecordId>;

    /// `Ok(None)` when no record carries `passkey`.
    async fn find_by_passkey(&self, passkey: &str) -> StoreResult<Option<LinkRecord>>;

    /// Every record in insertion order. Each call starts a fresh scan.
    fn list_all(&self) -> BoxStream<'_, StoreResult<LinkRecord>>;
}

/// Process-local record store, used in tests and as a scratch backend.
#[derive(Default)]
pub struct MemoryRecordStore {
    records: Mutex<Vec<LinkRecord>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn insert(&self, record: LinkRecord) -> StoreResult<RecordId> {
        let mut records = self.records.lock().await;
        records.push(record);
        let id = i64::try_from(records.len())
            .map_err(|_| StoreError::WriteFailed("record id overflow".to_string()))?;
        Ok(RecordId(id))
    }

    async fn find_by_passkey(&self, passkey: &str) -> StoreResult<Option<LinkRecord>> {
        let records = self.records.lock().await;
        Ok(records.iter().find(|r| r.passkey == passkey).cloned())
    }

    fn list_all(&self) -> BoxStream<'_, StoreResult<LinkRecord>> {
        stream::once(async move { self.records.lock().await.clone() })
            .flat_map(|records| stream::iter(records.into_iter().map(Ok)))
            .boxed()
    }
}
