use std::sync::Arc;

use passlink_core::{
    config::Config,
    conversation::{ConversationStore, MemoryConversationStore},
    store::RecordStore,
};
use passlink_store::Storage;

#[tokio::main]
async fn main() -> Result<(), passlink_core::Error> {
    passlink_core::logging::init("passlink")?;

    let cfg = Arc::new(Config::load()?);

    let storage = Storage::connect(&cfg.database_url).await?;
    let records: Arc<dyn RecordStore> = Arc::new(storage.records());
    let conversations: Arc<dyn ConversationStore> = if cfg.persist_conversations {
        Arc::new(storage.conversations())
    } else {
        Arc::new(MemoryConversationStore::new())
    };

    passlink_telegram::router::run_polling(cfg, records, conversations)
        .await
        .map_err(|e| passlink_core::Error::External(format!("telegram bot failed: {e}")))?;

    tracing::info!("passlink stopped");
    Ok(())
}
