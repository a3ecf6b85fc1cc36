// Copyright 2026 The Cortex Relay Authors
// SPDX-License-Identifier: Apache-2.0

// Session store
//
// Responsibilities:
// - Define the SessionStore seam used by routes and transcripts
// - In-memory store for development and tests
// - PostgREST store (Supabase-compatible) reached through HttpSender
//
// Persistence is best-effort: callers log failures and carry on.

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::{HeaderMap, HeaderValue, Method};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::config::PostgrestSettings;
use crate::provider::{HttpError, HttpRequest, HttpSender};

const STORE_TIMEOUT_MS: u64 = 10_000;

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One message of a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRecord {
    pub session_id: String,
    pub role: Role,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

impl ChatRecord {
    pub fn now(session_id: impl Into<String>, role: Role, message: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            role,
            message: message.into(),
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: String,
    pub mode: String,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("store request failed: {0}")]
    Transport(String),

    #[error("store returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("store response could not be decoded: {0}")]
    Decode(String),
}

impl From<HttpError> for StoreError {
    fn from(e: HttpError) -> Self {
        StoreError::Transport(e.to_string())
    }
}

// ---------------------------------------------------------------------------
// Trait: SessionStore (dependency injection point)
// ---------------------------------------------------------------------------

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create_session(&self, session: SessionRecord) -> Result<(), StoreError>;

    async fn save_message(&self, record: ChatRecord) -> Result<(), StoreError>;

    /// Messages of one session, oldest first.
    async fn messages(&self, session_id: &str) -> Result<Vec<ChatRecord>, StoreError>;

    /// All sessions, newest first.
    async fn sessions(&self) -> Result<Vec<SessionRecord>, StoreError>;

    /// Cheap connectivity probe.
    async fn ping(&self) -> Result<(), StoreError>;
}

/// A session's exchange, written once the assistant reply is complete.
#[derive(Clone)]
pub struct Transcript {
    store: Arc<dyn SessionStore>,
    session_id: String,
}

impl Transcript {
    pub fn new(store: Arc<dyn SessionStore>, session_id: impl Into<String>) -> Self {
        Self {
            store,
            session_id: session_id.into(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Save the user message followed by the assistant reply.
    pub async fn save_exchange(&self, user_message: &str, reply: &str) -> Result<(), StoreError> {
        self.store
            .save_message(ChatRecord::now(&self.session_id, Role::User, user_message))
            .await?;
        self.store
            .save_message(ChatRecord::now(&self.session_id, Role::Assistant, reply))
            .await
    }
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryStore {
    sessions: DashMap<String, SessionRecord>,
    messages: DashMap<String, Vec<ChatRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn create_session(&self, session: SessionRecord) -> Result<(), StoreError> {
        self.sessions.insert(session.id.clone(), session);
        Ok(())
    }

    async fn save_message(&self, record: ChatRecord) -> Result<(), StoreError> {
        self.messages
            .entry(record.session_id.clone())
            .or_default()
            .push(record);
        Ok(())
    }

    async fn messages(&self, session_id: &str) -> Result<Vec<ChatRecord>, StoreError> {
        let mut records = self
            .messages
            .get(session_id)
            .map(|r| r.value().clone())
            .unwrap_or_default();
        // Stable: equal timestamps keep insertion order.
        records.sort_by_key(|r| r.created_at);
        Ok(records)
    }

    async fn sessions(&self) -> Result<Vec<SessionRecord>, StoreError> {
        let mut sessions: Vec<SessionRecord> =
            self.sessions.iter().map(|s| s.value().clone()).collect();
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(sessions)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// PostgREST store
// ---------------------------------------------------------------------------

pub struct PostgrestStore {
    http: Arc<dyn HttpSender>,
    settings: PostgrestSettings,
}

impl PostgrestStore {
    pub fn new(http: Arc<dyn HttpSender>, settings: PostgrestSettings) -> Self {
        Self { http, settings }
    }

    fn table_url(&self, table: &str, query: &[(&str, &str)]) -> Result<String, StoreError> {
        let base = format!(
            "{}/rest/v1/{}",
            self.settings.url.trim_end_matches('/'),
            table
        );
        let mut url = reqwest::Url::parse(&base)
            .map_err(|e| StoreError::Transport(format!("invalid store url \"{base}\": {e}")))?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url.to_string())
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("content-type", HeaderValue::from_static("application/json"));
        headers.insert("prefer", HeaderValue::from_static("return=minimal"));
        if let Ok(v) = HeaderValue::from_str(&self.settings.api_key) {
            headers.insert("apikey", v);
        }
        if let Ok(v) = HeaderValue::from_str(&format!("Bearer {}", self.settings.api_key)) {
            headers.insert("authorization", v);
        }
        headers
    }

    async fn send(&self, method: Method, url: String, body: Bytes) -> Result<Bytes, StoreError> {
        let response = self
            .http
            .send(HttpRequest {
                method,
                url,
                headers: self.headers(),
                body,
                timeout_ms: Some(STORE_TIMEOUT_MS),
                stream: false,
            })
            .await?;

        let status = response.status;
        let body = response.body.collect().await?;
        if !status.is_success() {
            return Err(StoreError::Status {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }
        Ok(body)
    }

    async fn insert<T: Serialize + Sync>(&self, table: &str, row: &T) -> Result<(), StoreError> {
        let body = serde_json::to_vec(&[row]).map_err(|e| StoreError::Decode(e.to_string()))?;
        let url = self.table_url(table, &[])?;
        self.send(Method::POST, url, Bytes::from(body)).await?;
        Ok(())
    }

    async fn select<T: for<'de> Deserialize<'de> + Send>(
        &self,
        table: &str,
        query: &[(&str, &str)],
    ) -> Result<Vec<T>, StoreError> {
        let url = self.table_url(table, query)?;
        let body = self.send(Method::GET, url, Bytes::new()).await?;
        serde_json::from_slice(&body).map_err(|e| StoreError::Decode(e.to_string()))
    }
}

#[async_trait]
impl SessionStore for PostgrestStore {
    async fn create_session(&self, session: SessionRecord) -> Result<(), StoreError> {
        self.insert(&self.settings.sessions_table, &session).await
    }

    async fn save_message(&self, record: ChatRecord) -> Result<(), StoreError> {
        self.insert(&self.settings.messages_table, &record).await
    }

    async fn messages(&self, session_id: &str) -> Result<Vec<ChatRecord>, StoreError> {
        let filter = format!("eq.{session_id}");
        self.select(
            &self.settings.messages_table,
            &[
                ("select", "*"),
                ("session_id", filter.as_str()),
                ("order", "created_at.asc"),
            ],
        )
        .await
    }

    async fn sessions(&self) -> Result<Vec<SessionRecord>, StoreError> {
        self.select(
            &self.settings.sessions_table,
            &[("select", "*"), ("order", "created_at.desc")],
        )
        .await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let _: Vec<serde_json::Value> = self
            .select(&self.settings.sessions_table, &[("select", "id"), ("limit", "1")])
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{HttpBody, HttpResponse};
    use axum::http::StatusCode;
    use std::sync::Mutex;

    fn session(id: &str, at: i64) -> SessionRecord {
        SessionRecord {
            id: id.into(),
            mode: "example".into(),
            created_at: DateTime::from_timestamp(at, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn memory_store_keeps_messages_per_session_in_order() {
        let store = MemoryStore::new();
        store.save_message(ChatRecord::now("a", Role::User, "q1")).await.unwrap();
        store.save_message(ChatRecord::now("b", Role::User, "other")).await.unwrap();
        store.save_message(ChatRecord::now("a", Role::Assistant, "r1")).await.unwrap();

        let a = store.messages("a").await.unwrap();
        assert_eq!(a.len(), 2);
        assert_eq!(a[0].message, "q1");
        assert_eq!(a[1].role, Role::Assistant);
        assert!(store.messages("missing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn memory_store_lists_newest_session_first() {
        let store = MemoryStore::new();
        store.create_session(session("old", 100)).await.unwrap();
        store.create_session(session("new", 200)).await.unwrap();
        let ids: Vec<String> = store.sessions().await.unwrap().into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec!["new", "old"]);
    }

    #[tokio::test]
    async fn transcript_saves_user_then_assistant() {
        let store = Arc::new(MemoryStore::new());
        let transcript = Transcript::new(store.clone(), "s1");
        transcript.save_exchange("hello", "<!--TOPIC_START-->x<!--TOPIC_END-->").await.unwrap();

        let records = store.messages("s1").await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].role, Role::User);
        assert_eq!(records[1].role, Role::Assistant);
        assert!(records[1].message.contains("TOPIC"));
    }

    #[test]
    fn role_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Role::Assistant).unwrap(), "\"assistant\"");
    }

    // -- PostgREST --

    struct RecordingSender {
        status: StatusCode,
        body: &'static str,
        requests: Mutex<Vec<HttpRequest>>,
    }

    #[async_trait]
    impl HttpSender for RecordingSender {
        async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
            self.requests.lock().unwrap().push(request);
            Ok(HttpResponse {
                status: self.status,
                headers: HeaderMap::new(),
                body: HttpBody::Full(Bytes::from_static(self.body.as_bytes())),
            })
        }
    }

    fn postgrest(status: StatusCode, body: &'static str) -> (Arc<RecordingSender>, PostgrestStore) {
        let sender = Arc::new(RecordingSender {
            status,
            body,
            requests: Mutex::new(Vec::new()),
        });
        let store = PostgrestStore::new(
            sender.clone(),
            PostgrestSettings {
                url: "https://db.test/".into(),
                api_key: "anon".into(),
                messages_table: "chat_history".into(),
                sessions_table: "chat_sessions".into(),
            },
        );
        (sender, store)
    }

    #[tokio::test]
    async fn postgrest_insert_posts_array_with_auth_headers() {
        let (sender, store) = postgrest(StatusCode::CREATED, "");
        store
            .save_message(ChatRecord::now("s1", Role::User, "hi"))
            .await
            .unwrap();

        let requests = sender.requests.lock().unwrap();
        let req = &requests[0];
        assert_eq!(req.method, Method::POST);
        assert_eq!(req.url, "https://db.test/rest/v1/chat_history");
        assert_eq!(req.headers.get("apikey").unwrap(), "anon");
        assert_eq!(req.headers.get("authorization").unwrap(), "Bearer anon");
        let rows: serde_json::Value = serde_json::from_slice(&req.body).unwrap();
        assert_eq!(rows[0]["session_id"], "s1");
        assert_eq!(rows[0]["role"], "user");
    }

    #[tokio::test]
    async fn postgrest_messages_filters_and_orders() {
        let (sender, store) = postgrest(
            StatusCode::OK,
            r#"[{"session_id":"s 1","role":"assistant","message":"m","created_at":"2026-01-01T00:00:00Z"}]"#,
        );
        let records = store.messages("s 1").await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].role, Role::Assistant);

        let url = sender.requests.lock().unwrap()[0].url.clone();
        assert!(url.starts_with("https://db.test/rest/v1/chat_history?"));
        assert!(url.contains("session_id=eq.s+1"));
        assert!(url.contains("order=created_at.asc"));
    }

    #[tokio::test]
    async fn postgrest_error_status_is_surfaced() {
        let (_, store) = postgrest(StatusCode::UNAUTHORIZED, r#"{"message":"JWT expired"}"#);
        match store.ping().await {
            Err(StoreError::Status { status, body }) => {
                assert_eq!(status, 401);
                assert!(body.contains("JWT expired"));
            }
            other => panic!("expected status error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn postgrest_bad_json_is_decode_error() {
        let (_, store) = postgrest(StatusCode::OK, "not json");
        assert!(matches!(store.sessions().await, Err(StoreError::Decode(_))));
    }
}
