//! Persisted conversation log: Sled for durability, DashMap hot cache in front.
//!
//! The format is opaque to the dialogue core beyond "ordered sequence of
//! `{speaker, text}` records": histories are JSON-serialized per conversation
//! id and reloaded verbatim. Losing the log loses memory, never correctness.

use crate::shared::TurnRecord;
use dashmap::DashMap;
use sled::Db;
use std::path::Path;
use std::sync::Arc;

const DEFAULT_LOG_PATH: &str = "./data/kopi_conversations";
const HISTORY_PREFIX: &str = "conversations/";

#[derive(Debug, thiserror::Error)]
pub enum LogError {
    #[error("conversation log storage error: {0}")]
    Storage(#[from] sled::Error),
    #[error("conversation history is not valid JSON: {0}")]
    Serde(#[from] serde_json::Error),
}

fn history_key(conversation_id: &str) -> String {
    format!("{}{}", HISTORY_PREFIX, conversation_id)
}

/// Durable, cache-fronted store of per-conversation turn history.
pub struct ConversationLog {
    db: Db,
    /// Hot cache: conversation key -> serialized history. Checked before Sled.
    cache: Arc<DashMap<String, Vec<u8>>>,
}

impl ConversationLog {
    /// Opens or creates the log at `./data/kopi_conversations`.
    pub fn new() -> Result<Self, LogError> {
        Self::open_path(DEFAULT_LOG_PATH)
    }

    /// Opens or creates the log at the given path.
    pub fn open_path<P: AsRef<Path>>(path: P) -> Result<Self, LogError> {
        let db = sled::open(path)?;
        Ok(Self {
            db,
            cache: Arc::new(DashMap::new()),
        })
    }

    /// Persists the full ordered history for a conversation. Writes to both
    /// the hot cache and Sled.
    pub fn save_history(
        &self,
        conversation_id: &str,
        history: &[TurnRecord],
    ) -> Result<(), LogError> {
        let key = history_key(conversation_id);
        let bytes = serde_json::to_vec(history)?;
        self.db.insert(key.as_bytes(), bytes.as_slice())?;
        self.cache.insert(key, bytes);
        Ok(())
    }

    /// Loads the ordered history for a conversation, if any was recorded.
    /// Checks the hot cache first, then Sled.
    pub fn load_history(&self, conversation_id: &str) -> Result<Option<Vec<TurnRecord>>, LogError> {
        let key = history_key(conversation_id);
        if let Some(bytes) = self.cache.get(&key) {
            return Ok(Some(serde_json::from_slice(&bytes)?));
        }
        let Some(bytes) = self.db.get(key.as_bytes())? else {
            return Ok(None);
        };
        let history: Vec<TurnRecord> = serde_json::from_slice(&bytes)?;
        self.cache.insert(key, bytes.to_vec());
        Ok(Some(history))
    }
}
