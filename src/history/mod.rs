mod memory;
mod redis;

pub use self::memory::MemoryKvStore;
pub use self::redis::RedisKvStore;

use async_trait::async_trait;
use chrono::Utc;
use log::{ error, info };
use std::error::Error as StdError;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::cli::Args;
use crate::models::chat::ChatSession;
use crate::models::relay::SaveSessionRequest;

pub const DEFAULT_SESSION_TITLE: &str = "New chat";
const MAX_KEY_SEGMENT_LEN: usize = 128;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid session id: {0:?}")]
    InvalidSessionId(String),
    #[error("invalid owner id: {0:?}")]
    InvalidOwnerId(String),
    #[error("corrupt session record at {key}: {reason}")]
    Corrupt { key: String, reason: String },
    #[error("session store unavailable: {0}")]
    Unavailable(String),
}

impl From<::redis::RedisError> for StoreError {
    fn from(err: ::redis::RedisError) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}

/// A string map that can enumerate keys by prefix. Writes are atomic per key.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn put(&self, key: &str, value: String) -> Result<(), StoreError>;

    /// Deleting an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// All entries whose key starts with `prefix`, in the backend's scan order.
    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, String)>, StoreError>;
}

pub fn create_kv_store(args: &Args) -> Result<Arc<dyn KvStore>, Box<dyn StdError + Send + Sync>> {
    match args.store_type.to_lowercase().as_str() {
        "redis" => {
            let store = RedisKvStore::new(&args.store_host, args.store_redis_scan_count)?;
            Ok(Arc::new(store))
        }
        "memory" => Ok(Arc::new(MemoryKvStore::new())),
        _ =>
            Err(
                Box::new(
                    std::io::Error::new(
                        std::io::ErrorKind::InvalidInput,
                        format!("Unsupported session store type: {}", args.store_type)
                    )
                )
            ),
    }
}

pub fn initialize_session_store(args: &Args) -> Result<SessionStore, Box<dyn StdError + Send + Sync>> {
    if args.store_type.eq_ignore_ascii_case("memory") {
        info!("Chat sessions will be kept in process memory and lost on restart");
    } else {
        info!("Chat sessions will be stored in: {} at {}", args.store_type, args.store_host);
    }
    let kv = create_kv_store(args)?;
    Ok(SessionStore::new(kv, args.store_key_prefix.clone()))
}

/// Owner and session ids are embedded in store keys, so they must be opaque
/// tokens that can never contain the key separator.
pub fn is_valid_key_segment(segment: &str) -> bool {
    !segment.is_empty() &&
        segment.len() <= MAX_KEY_SEGMENT_LEN &&
        segment.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Chat sessions for many owners on top of one [`KvStore`], laid out as
/// `{prefix}{owner_id}:{session_id}`.
#[derive(Clone)]
pub struct SessionStore {
    kv: Arc<dyn KvStore>,
    key_prefix: String,
}

impl SessionStore {
    pub fn new(kv: Arc<dyn KvStore>, key_prefix: impl Into<String>) -> Self {
        Self { kv, key_prefix: key_prefix.into() }
    }

    fn owner_prefix(&self, owner_id: &str) -> Result<String, StoreError> {
        if !is_valid_key_segment(owner_id) {
            return Err(StoreError::InvalidOwnerId(owner_id.to_string()));
        }
        Ok(format!("{}{}:", self.key_prefix, owner_id))
    }

    fn session_key(&self, owner_id: &str, session_id: &str) -> Result<String, StoreError> {
        if !is_valid_key_segment(session_id) {
            return Err(StoreError::InvalidSessionId(session_id.to_string()));
        }
        Ok(format!("{}{}", self.owner_prefix(owner_id)?, session_id))
    }

    /// Newest first. Sessions with equal timestamps keep scan order.
    pub async fn list(&self, owner_id: &str) -> Result<Vec<ChatSession>, StoreError> {
        let prefix = self.owner_prefix(owner_id)?;
        let entries = self.kv.scan_prefix(&prefix).await?;

        let mut sessions = Vec::with_capacity(entries.len());
        for (key, raw) in entries {
            match serde_json::from_str::<ChatSession>(&raw) {
                Ok(session) => sessions.push(session),
                Err(e) => error!("Skipping unreadable session record {}: {}", key, e),
            }
        }
        sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(sessions)
    }

    pub async fn get(
        &self,
        owner_id: &str,
        session_id: &str
    ) -> Result<Option<ChatSession>, StoreError> {
        let key = self.session_key(owner_id, session_id)?;
        match self.kv.get(&key).await? {
            Some(raw) =>
                serde_json
                    ::from_str(&raw)
                    .map(Some)
                    .map_err(|e| StoreError::Corrupt { key, reason: e.to_string() }),
            None => Ok(None),
        }
    }

    /// Full overwrite of whatever is stored under the same id. `owner_id` and
    /// `updated_at` are always assigned here.
    pub async fn save(
        &self,
        owner_id: &str,
        request: SaveSessionRequest
    ) -> Result<ChatSession, StoreError> {
        let id = request.id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let key = self.session_key(owner_id, &id)?;

        let session = ChatSession {
            id,
            owner_id: owner_id.to_string(),
            title: request.title.unwrap_or_else(|| DEFAULT_SESSION_TITLE.to_string()),
            messages: request.messages.unwrap_or_default(),
            updated_at: Utc::now(),
        };

        let raw = serde_json
            ::to_string(&session)
            .map_err(|e| StoreError::Corrupt { key: key.clone(), reason: e.to_string() })?;
        self.kv.put(&key, raw).await?;
        Ok(session)
    }

    pub async fn delete(&self, owner_id: &str, session_id: &str) -> Result<(), StoreError> {
        let key = self.session_key(owner_id, session_id)?;
        self.kv.delete(&key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::chat::{ Message, Role };

    fn store() -> SessionStore {
        SessionStore::new(Arc::new(MemoryKvStore::new()), "chat:")
    }

    fn request(id: Option<&str>, title: &str, messages: Vec<Message>) -> SaveSessionRequest {
        SaveSessionRequest {
            id: id.map(str::to_string),
            title: Some(title.to_string()),
            messages: Some(messages),
        }
    }

    #[test]
    fn key_segments_must_be_opaque_tokens() {
        assert!(is_valid_key_segment("3f2b1c0e-aaaa-4bbb-8ccc-123456789abc"));
        assert!(is_valid_key_segment("session_1"));
        assert!(!is_valid_key_segment(""));
        assert!(!is_valid_key_segment("u1:other"));
        assert!(!is_valid_key_segment("a*"));
        assert!(!is_valid_key_segment(&"x".repeat(MAX_KEY_SEGMENT_LEN + 1)));
    }

    #[tokio::test]
    async fn save_then_list_round_trips_messages() {
        let store = store();
        let messages = vec![Message::new(Role::User, "hi")];

        let saved = store.save("u1", request(None, "t", messages.clone())).await.unwrap();
        assert_eq!(saved.owner_id, "u1");
        assert!(!saved.id.is_empty());

        let listed = store.list("u1").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].title, "t");
        assert_eq!(listed[0].messages, messages);

        let fetched = store.get("u1", &saved.id).await.unwrap().unwrap();
        assert_eq!(fetched, saved);
    }

    #[tokio::test]
    async fn saving_an_existing_id_overwrites() {
        let store = store();
        let first = store
            .save("u1", request(None, "t", vec![Message::new(Role::User, "hi")])).await
            .unwrap();

        let second = store
            .save(
                "u1",
                request(
                    Some(&first.id),
                    "renamed",
                    vec![Message::new(Role::User, "hi"), Message::new(Role::Assistant, "hello")]
                )
            ).await
            .unwrap();

        let listed = store.list("u1").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, first.id);
        assert_eq!(listed[0].title, "renamed");
        assert_eq!(listed[0].messages.len(), 2);
        assert!(second.updated_at >= first.updated_at);
    }

    #[tokio::test]
    async fn defaults_apply_when_fields_are_missing() {
        let saved = store().save("u1", SaveSessionRequest::default()).await.unwrap();
        assert_eq!(saved.title, DEFAULT_SESSION_TITLE);
        assert!(saved.messages.is_empty());
    }

    #[tokio::test]
    async fn owners_are_isolated_even_with_shared_id_prefixes() {
        let store = store();
        store.save("u1", request(Some("a"), "mine", vec![])).await.unwrap();
        store.save("u10", request(Some("a"), "theirs", vec![])).await.unwrap();

        let mine = store.list("u1").await.unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].title, "mine");
        assert!(store.list("u2").await.unwrap().is_empty());
        assert!(store.get("u2", "a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_is_newest_first() {
        let store = store();
        store.save("u1", request(Some("old"), "old", vec![])).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        store.save("u1", request(Some("new"), "new", vec![])).await.unwrap();

        let ids: Vec<String> = store
            .list("u1").await
            .unwrap()
            .into_iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(ids, vec!["new".to_string(), "old".to_string()]);
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let store = store();
        store.save("u1", request(Some("s1"), "t", vec![])).await.unwrap();

        store.delete("u1", "s1").await.unwrap();
        store.delete("u1", "s1").await.unwrap();
        store.delete("u1", "never-existed").await.unwrap();
        assert!(store.list("u1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn invalid_session_id_is_rejected_before_storage() {
        let store = store();
        let err = store.save("u1", request(Some("u2:x"), "t", vec![])).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidSessionId(_)));

        let err = store.delete("u1", "").await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidSessionId(_)));
    }

    #[tokio::test]
    async fn unreadable_records_are_skipped_in_list() {
        let kv = Arc::new(MemoryKvStore::new());
        let store = SessionStore::new(kv.clone(), "chat:");
        store.save("u1", request(Some("ok"), "t", vec![])).await.unwrap();
        kv.put("chat:u1:broken", "{not json".into()).await.unwrap();

        let listed = store.list("u1").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, "ok");

        let err = store.get("u1", "broken").await.unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
    }
}
