//! SQLite adapters for the passlink record and conversation stores.

use std::{path::Path, str::FromStr};

use async_trait::async_trait;
use chrono::Utc;
use futures::stream::{BoxStream, StreamExt};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Pool, Row, Sqlite,
};

use passlink_core::{
    conversation::{ConversationStore, Phase, StateRecord},
    domain::{ChatId, LinkRecord, RecordId},
    errors::{Error, StoreError, StoreResult},
    store::RecordStore,
};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS links (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    link       TEXT NOT NULL,
    passkey    TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS links_passkey_idx ON links (passkey, id);

CREATE TABLE IF NOT EXISTS conversations (
    chat_id      INTEGER PRIMARY KEY,
    phase        TEXT NOT NULL,
    pending_link TEXT,
    updated_at   TEXT NOT NULL
);
"#;

/// Shared connection pool with the schema applied.
#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

impl Storage {
    pub async fn connect(database_url: &str) -> passlink_core::Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| Error::Config(format!("invalid DATABASE_URL {database_url:?}: {e}")))?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| Error::External(format!("sqlite connect failed: {e}")))?;

        let storage = Self { pool };
        storage.ensure_schema().await?;
        tracing::info!(url = database_url, "sqlite storage ready");
        Ok(storage)
    }

    /// Private in-memory database. A single connection keeps every query on
    /// the same database.
    pub async fn in_memory() -> passlink_core::Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| Error::Config(format!("sqlite options: {e}")))?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| Error::External(format!("sqlite connect failed: {e}")))?;

        let storage = Self { pool };
        storage.ensure_schema().await?;
        Ok(storage)
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub fn records(&self) -> SqliteRecordStore {
        SqliteRecordStore {
            pool: self.pool.clone(),
        }
    }

    pub fn conversations(&self) -> SqliteConversationStore {
        SqliteConversationStore {
            pool: self.pool.clone(),
        }
    }

    async fn ensure_schema(&self) -> passlink_core::Result<()> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::External(format!("failed to apply sqlite schema: {e}")))?;
        Ok(())
    }
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> passlink_core::Result<()> {
    let Some(path) = database_url
        .strip_prefix("sqlite://")
        .or_else(|| database_url.strip_prefix("sqlite:"))
    else {
        return Ok(());
    };
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() || path.starts_with(":memory:") {
        return Ok(());
    }
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

fn write_failed(e: sqlx::Error) -> StoreError {
    StoreError::WriteFailed(e.to_string())
}

fn read_failed(e: sqlx::Error) -> StoreError {
    StoreError::ReadFailed(e.to_string())
}

fn row_to_record(row: SqliteRow) -> StoreResult<LinkRecord> {
    Ok(LinkRecord {
        link: row.try_get("link").map_err(read_failed)?,
        passkey: row.try_get("passkey").map_err(read_failed)?,
    })
}

/// The `links` table. Inserts never check for an existing passkey.
#[derive(Clone)]
pub struct SqliteRecordStore {
    pool: Pool<Sqlite>,
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn insert(&self, record: LinkRecord) -> StoreResult<RecordId> {
        let result = sqlx::query("INSERT INTO links (link, passkey, created_at) VALUES (?1, ?2, ?3)")
            .bind(&record.link)
            .bind(&record.passkey)
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await
            .map_err(write_failed)?;
        Ok(RecordId(result.last_insert_rowid()))
    }

    async fn find_by_passkey(&self, passkey: &str) -> StoreResult<Option<LinkRecord>> {
        let row = sqlx::query("SELECT link, passkey FROM links WHERE passkey = ?1 ORDER BY id ASC LIMIT 1")
            .bind(passkey)
            .fetch_optional(&self.pool)
            .await
            .map_err(read_failed)?;
        row.map(row_to_record).transpose()
    }

    fn list_all(&self) -> BoxStream<'_, StoreResult<LinkRecord>> {
        sqlx::query("SELECT link, passkey FROM links ORDER BY id ASC")
            .fetch(&self.pool)
            .map(|row| row.map_err(read_failed).and_then(row_to_record))
            .boxed()
    }
}

/// The `conversations` table; idle chats have no row.
#[derive(Clone)]
pub struct SqliteConversationStore {
    pool: Pool<Sqlite>,
}

#[async_trait]
impl ConversationStore for SqliteConversationStore {
    async fn load(&self, chat_id: ChatId) -> StoreResult<Option<StateRecord>> {
        let row = sqlx::query("SELECT phase, pending_link FROM conversations WHERE chat_id = ?1")
            .bind(chat_id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(read_failed)?;
        let Some(row) = row else {
            return Ok(None);
        };

        let raw_phase: String = row.try_get("phase").map_err(read_failed)?;
        let pending_link: Option<String> = row.try_get("pending_link").map_err(read_failed)?;
        let phase = Phase::parse(&raw_phase).ok_or_else(|| {
            StoreError::Corrupt(format!("unknown conversation phase {raw_phase:?}"))
        })?;
        Ok(Some(StateRecord {
            phase,
            pending_link,
        }))
    }

    async fn save(&self, chat_id: ChatId, record: &StateRecord) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO conversations (chat_id, phase, pending_link, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(chat_id) DO UPDATE SET
                phase = excluded.phase,
                pending_link = excluded.pending_link,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(chat_id.0)
        .bind(record.phase.as_str())
        .bind(record.pending_link.as_deref())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(write_failed)?;
        Ok(())
    }

    async fn clear(&self, chat_id: ChatId) -> StoreResult<()> {
        sqlx::query("DELETE FROM conversations WHERE chat_id = ?1")
            .bind(chat_id.0)
            .execute(&self.pool)
            .await
            .map_err(write_failed)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use futures::TryStreamExt;
    use passlink_core::{
        conversation::{ConversationMachine, Flow, Outcome, Prompt},
        errors::TurnError,
    };

    use super::*;

    #[tokio::test]
    async fn insert_and_find() {
        let storage = Storage::in_memory().await.unwrap();
        let records = storage.records();

        let id = records.insert(LinkRecord::new("https://a", "pk")).await.unwrap();
        assert!(id.0 > 0);
        assert_eq!(
            records.find_by_passkey("pk").await.unwrap(),
            Some(LinkRecord::new("https://a", "pk"))
        );
        assert_eq!(records.find_by_passkey("PK").await.unwrap(), None);
    }

    #[tokio::test]
    async fn duplicate_passkey_returns_earliest() {
        let storage = Storage::in_memory().await.unwrap();
        let records = storage.records();

        let first = records.insert(LinkRecord::new("L1", "dup")).await.unwrap();
        let second = records.insert(LinkRecord::new("L2", "dup")).await.unwrap();
        assert!(second.0 > first.0);

        for _ in 0..3 {
            let found = records.find_by_passkey("dup").await.unwrap().unwrap();
            assert_eq!(found.link, "L1");
        }
    }

    #[tokio::test]
    async fn list_all_streams_in_insert_order() {
        let storage = Storage::in_memory().await.unwrap();
        let records = storage.records();
        assert!(records
            .list_all()
            .try_collect::<Vec<_>>()
            .await
            .unwrap()
            .is_empty());

        for i in 0..5 {
            records
                .insert(LinkRecord::new(format!("link{i}"), format!("key{i}")))
                .await
                .unwrap();
        }

        let listed: Vec<LinkRecord> = records.list_all().try_collect().await.unwrap();
        let again: Vec<LinkRecord> = records.list_all().try_collect().await.unwrap();
        assert_eq!(listed, again);
        assert_eq!(
            listed.iter().map(|r| r.link.as_str()).collect::<Vec<_>>(),
            vec!["link0", "link1", "link2", "link3", "link4"]
        );
    }

    #[tokio::test]
    async fn conversation_rows_round_trip() {
        let storage = Storage::in_memory().await.unwrap();
        let states = storage.conversations();
        let chat = ChatId(11);

        assert_eq!(states.load(chat).await.unwrap(), None);

        let record = StateRecord {
            phase: Phase::AwaitingPasskeyForUpload,
            pending_link: Some("https://a".to_string()),
        };
        states.save(chat, &record).await.unwrap();
        assert_eq!(states.load(chat).await.unwrap(), Some(record));

        let record = StateRecord {
            phase: Phase::AwaitingPasskeyForDownload,
            pending_link: None,
        };
        states.save(chat, &record).await.unwrap();
        assert_eq!(states.load(chat).await.unwrap(), Some(record));

        states.clear(chat).await.unwrap();
        assert_eq!(states.load(chat).await.unwrap(), None);
    }

    #[tokio::test]
    async fn unknown_phase_is_cleared_and_the_chat_recovers() {
        let storage = Storage::in_memory().await.unwrap();
        sqlx::query("INSERT INTO conversations (chat_id, phase, updated_at) VALUES (5, 'none', 'x')")
            .execute(storage.pool())
            .await
            .unwrap();
        let chat = ChatId(5);

        let err = storage.conversations().load(chat).await.unwrap_err();
        assert!(matches!(err, StoreError::Corrupt(_)));

        let machine = ConversationMachine::new(
            Arc::new(storage.conversations()),
            Arc::new(storage.records()),
        );
        let err = machine.on_text(chat, "pk").await.unwrap_err();
        assert!(matches!(err, TurnError::MalformedState(_)));
        assert_eq!(storage.conversations().load(chat).await.unwrap(), None);

        assert_eq!(
            machine.select(chat, Flow::Upload).await.unwrap(),
            Outcome::Prompted(Prompt::Link)
        );
        assert_eq!(
            storage.conversations().load(chat).await.unwrap().map(|r| r.phase),
            Some(Phase::AwaitingLink)
        );
    }

    #[tokio::test]
    async fn unknown_phase_on_selection_is_reported_then_cleared() {
        let storage = Storage::in_memory().await.unwrap();
        sqlx::query("INSERT INTO conversations (chat_id, phase, updated_at) VALUES (6, 'none', 'x')")
            .execute(storage.pool())
            .await
            .unwrap();
        let chat = ChatId(6);
        let machine = ConversationMachine::new(
            Arc::new(storage.conversations()),
            Arc::new(storage.records()),
        );

        let err = machine.select(chat, Flow::Download).await.unwrap_err();
        assert!(matches!(err, TurnError::MalformedState(_)));
        assert_eq!(storage.conversations().load(chat).await.unwrap(), None);
        assert!(machine.select(chat, Flow::Download).await.is_ok());
    }

    #[tokio::test]
    async fn flow_survives_a_restart_of_the_machine() {
        let storage = Storage::in_memory().await.unwrap();
        let chat = ChatId(3);

        let machine = ConversationMachine::new(
            Arc::new(storage.conversations()),
            Arc::new(storage.records()),
        );
        machine.select(chat, Flow::Upload).await.unwrap();
        machine.on_text(chat, "https://kept").await.unwrap();
        drop(machine);

        let machine = ConversationMachine::new(
            Arc::new(storage.conversations()),
            Arc::new(storage.records()),
        );
        assert!(matches!(
            machine.on_text(chat, "pk").await.unwrap(),
            Outcome::Saved(_)
        ));
        assert_eq!(
            storage.records().find_by_passkey("pk").await.unwrap(),
            Some(LinkRecord::new("https://kept", "pk"))
        );
    }

    #[tokio::test]
    async fn inconsistent_row_is_malformed_and_cleared() {
        let storage = Storage::in_memory().await.unwrap();
        sqlx::query(
            "INSERT INTO conversations (chat_id, phase, pending_link, updated_at) VALUES (9, 'awaiting_upload_passkey', NULL, 'x')",
        )
        .execute(storage.pool())
        .await
        .unwrap();

        let machine = ConversationMachine::new(
            Arc::new(storage.conversations()),
            Arc::new(storage.records()),
        );
        let err = machine.on_text(ChatId(9), "pk").await.unwrap_err();
        assert!(matches!(err, TurnError::MalformedState(_)));
        assert_eq!(storage.conversations().load(ChatId(9)).await.unwrap(), None);
    }

    #[test]
    fn parent_dir_only_for_file_urls() {
        assert!(ensure_sqlite_parent_dir_exists("sqlite::memory:").is_ok());
        let dir = std::env::temp_dir().join(format!("passlink-db-{}", std::process::id()));
        let url = format!("sqlite://{}/nested/links.db?mode=rwc", dir.display());
        ensure_sqlite_parent_dir_exists(&url).unwrap();
        assert!(dir.join("nested").is_dir());
        let _ = std::fs::remove_dir_all(&dir);
    }
}
