//! Remote note API.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use crate::auth::{parse_api_error, SessionManager};
use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::models::{Note, ServerNote};

/// Failure of a single remote call, classified for the reconciler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// 401/403: the session is no longer accepted
    #[error("Request rejected by server (HTTP {0})")]
    Unauthorized(u16),
    /// 404: the target note is gone
    #[error("Note not found on server: {0}")]
    NotFound(String),
    /// Network error, timeout or any other non-2xx response
    #[error("Transient API failure: {0}")]
    Transient(String),
    /// No valid session to authenticate with
    #[error("No active session")]
    NoSession,
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Server-side boolean flags with a dedicated toggle endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteFlag {
    Pin,
    Favorite,
    Archive,
}

impl RemoteFlag {
    pub const ALL: [Self; 3] = [Self::Pin, Self::Favorite, Self::Archive];

    pub const fn path(self) -> &'static str {
        match self {
            Self::Pin => "pin",
            Self::Favorite => "favorite",
            Self::Archive => "archive",
        }
    }

    pub const fn local_value(self, note: &Note) -> bool {
        match self {
            Self::Pin => note.pinned,
            Self::Favorite => note.favorite,
            Self::Archive => note.archived,
        }
    }

    pub const fn remote_value(self, note: &ServerNote) -> bool {
        match self {
            Self::Pin => note.pinned,
            Self::Favorite => note.favorite,
            Self::Archive => note.archived,
        }
    }
}

/// Remote note operations used by the reconciler.
#[async_trait]
pub trait NotesApi: Send + Sync {
    async fn list_notes(&self) -> ApiResult<Vec<ServerNote>>;

    async fn create_note(&self, note: &Note) -> ApiResult<ServerNote>;

    async fn update_note(&self, server_id: &str, note: &Note) -> ApiResult<ServerNote>;

    async fn delete_note(&self, server_id: &str) -> ApiResult<()>;

    /// Flip one server-side flag and return the resulting record.
    async fn toggle_flag(&self, server_id: &str, flag: RemoteFlag) -> ApiResult<ServerNote>;
}

/// `NotesApi` over HTTP with a bearer token from the session.
#[derive(Clone)]
pub struct HttpNotesApi {
    notes_url: String,
    client: Client,
    session: SessionManager,
}

impl HttpNotesApi {
    pub fn new(config: &ClientConfig, session: SessionManager) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|error| Error::Config(format!("failed to build HTTP client: {error}")))?;
        Ok(Self {
            notes_url: format!("{}/notes", config.api_url()),
            client,
            session,
        })
    }

    fn note_url(&self, server_id: &str) -> String {
        format!("{}/{}", self.notes_url, urlencoding::encode(server_id))
    }

    async fn send(&self, request: RequestBuilder) -> ApiResult<Response> {
        let token = self.session.token().ok_or(ApiError::NoSession)?;
        let response = request
            .bearer_auth(token)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|error| ApiError::Transient(error.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(classify_status(status, &body))
    }

    async fn send_for_record(&self, request: RequestBuilder) -> ApiResult<ServerNote> {
        let record = self
            .send(request)
            .await?
            .json::<NoteRecord>()
            .await
            .map_err(|error| ApiError::Transient(format!("invalid note payload: {error}")))?;
        Ok(record.into())
    }
}

#[async_trait]
impl NotesApi for HttpNotesApi {
    async fn list_notes(&self) -> ApiResult<Vec<ServerNote>> {
        let records = self
            .send(self.client.get(&self.notes_url))
            .await?
            .json::<Vec<NoteRecord>>()
            .await
            .map_err(|error| ApiError::Transient(format!("invalid note list payload: {error}")))?;
        Ok(records.into_iter().map(Into::into).collect())
    }

    async fn create_note(&self, note: &Note) -> ApiResult<ServerNote> {
        let body = NoteBody::from(note);
        self.send_for_record(self.client.post(&self.notes_url).json(&body))
            .await
    }

    async fn update_note(&self, server_id: &str, note: &Note) -> ApiResult<ServerNote> {
        let body = NoteBody::from(note);
        self.send_for_record(self.client.put(self.note_url(server_id)).json(&body))
            .await
    }

    async fn delete_note(&self, server_id: &str) -> ApiResult<()> {
        self.send(self.client.delete(self.note_url(server_id)))
            .await
            .map(drop)
    }

    async fn toggle_flag(&self, server_id: &str, flag: RemoteFlag) -> ApiResult<ServerNote> {
        let url = format!("{}/{}", self.note_url(server_id), flag.path());
        self.send_for_record(self.client.put(url)).await
    }
}

fn classify_status(status: StatusCode, body: &str) -> ApiError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ApiError::Unauthorized(status.as_u16()),
        StatusCode::NOT_FOUND => ApiError::NotFound(parse_api_error(status, body)),
        _ => ApiError::Transient(parse_api_error(status, body)),
    }
}

// ---------------------------------------------------------------------------
// Wire format
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
#[allow(clippy::struct_excessive_bools)]
struct NoteBody<'a> {
    title: &'a str,
    content: &'a str,
    tags: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    reminder: Option<String>,
    pinned: bool,
    favorite: bool,
    archived: bool,
}

impl<'a> From<&'a Note> for NoteBody<'a> {
    fn from(note: &'a Note) -> Self {
        Self {
            title: &note.title,
            content: &note.content,
            tags: &note.tags,
            reminder: note.reminder_at.and_then(format_local_datetime),
            pinned: note.pinned,
            favorite: note.favorite,
            archived: note.archived,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(clippy::struct_excessive_bools)]
struct NoteRecord {
    id: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tags: Option<Vec<String>>,
    #[serde(default, deserialize_with = "deserialize_local_datetime")]
    reminder: Option<i64>,
    #[serde(default)]
    pinned: bool,
    #[serde(default)]
    favorite: bool,
    #[serde(default)]
    archived: bool,
    #[serde(default, deserialize_with = "deserialize_local_datetime")]
    created_at: Option<i64>,
    #[serde(default, deserialize_with = "deserialize_local_datetime")]
    updated_at: Option<i64>,
}

impl From<NoteRecord> for ServerNote {
    fn from(record: NoteRecord) -> Self {
        Self {
            server_id: record.id,
            title: record.title.unwrap_or_default(),
            content: record.content.unwrap_or_default(),
            tags: record.tags.unwrap_or_default(),
            reminder_at: record.reminder,
            pinned: record.pinned,
            favorite: record.favorite,
            archived: record.archived,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

/// Parse an ISO date-time into Unix ms.
///
/// Offset-less values are UTC; seconds and fractions are optional and a bare
/// date means midnight.
pub fn parse_local_datetime(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if let Ok(with_offset) = DateTime::parse_from_rfc3339(raw) {
        return Some(with_offset.timestamp_millis());
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
        .map(|naive| naive.and_utc().timestamp_millis())
}

/// Render Unix ms as an offset-less UTC date-time.
pub fn format_local_datetime(millis: i64) -> Option<String> {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .map(|value| value.naive_utc().format("%Y-%m-%dT%H:%M:%S").to_string())
}

fn deserialize_local_datetime<'de, D>(deserializer: D) -> std::result::Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(raw) = Option::<String>::deserialize(deserializer)? else {
        return Ok(None);
    };
    parse_local_datetime(&raw)
        .map(Some)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid date-time '{raw}'")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NoteDraft;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_spring_local_datetimes() {
        assert_eq!(
            parse_local_datetime("2024-05-01T10:15:30"),
            Some(1_714_558_530_000)
        );
        assert_eq!(
            parse_local_datetime("2024-05-01T10:15:30.250"),
            Some(1_714_558_530_250)
        );
        assert_eq!(parse_local_datetime("2024-05-01T10:15"), Some(1_714_558_500_000));
        assert_eq!(
            parse_local_datetime("2024-05-01T12:15:30+02:00"),
            Some(1_714_558_530_000)
        );
        assert_eq!(parse_local_datetime("2024-05-01"), Some(1_714_521_600_000));
        assert_eq!(parse_local_datetime("yesterday"), None);
    }

    #[test]
    fn formats_reminder_without_offset() {
        assert_eq!(
            format_local_datetime(1_714_558_530_000).as_deref(),
            Some("2024-05-01T10:15:30")
        );
    }

    #[test]
    fn record_maps_to_server_note() {
        let record: NoteRecord = serde_json::from_str(
            r#"{
                "id": "665f1c",
                "userId": "u1",
                "title": "Groceries",
                "content": "milk",
                "tags": ["home"],
                "reminder": "2024-05-01T10:15",
                "pinned": true,
                "favorite": false,
                "archived": false,
                "createdAt": "2024-04-30T08:00:00",
                "updatedAt": null,
                "deletedAt": null
            }"#,
        )
        .unwrap();
        let note = ServerNote::from(record);
        assert_eq!(note.server_id, "665f1c");
        assert_eq!(note.tags, vec!["home".to_string()]);
        assert_eq!(note.reminder_at, Some(1_714_558_500_000));
        assert!(note.pinned);
        assert_eq!(note.updated_at, None);
    }

    #[test]
    fn record_with_bad_datetime_is_rejected() {
        let result = serde_json::from_str::<NoteRecord>(r#"{"id": "1", "reminder": "soon"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn body_uses_camel_case_and_skips_lock() {
        let mut note = Note::from_draft(
            NoteDraft::new("Title", "Body")
                .with_tags(["a"])
                .with_reminder(1_714_558_530_000),
            1,
        );
        note.locked = true;
        let body = serde_json::to_value(NoteBody::from(&note)).unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "title": "Title",
                "content": "Body",
                "tags": ["a"],
                "reminder": "2024-05-01T10:15:30",
                "pinned": false,
                "favorite": false,
                "archived": false,
            })
        );
    }

    #[test]
    fn statuses_are_classified() {
        assert_eq!(
            classify_status(StatusCode::FORBIDDEN, ""),
            ApiError::Unauthorized(403)
        );
        assert!(matches!(
            classify_status(StatusCode::NOT_FOUND, r#"{"error":"Note not found"}"#),
            ApiError::NotFound(message) if message == "Note not found (404)"
        ));
        assert!(matches!(
            classify_status(StatusCode::SERVICE_UNAVAILABLE, ""),
            ApiError::Transient(_)
        ));
    }

    #[test]
    fn server_ids_are_escaped_in_paths() {
        let api = HttpNotesApi::new(&ClientConfig::default(), SessionManager::new()).unwrap();
        assert_eq!(
            api.note_url("a/b c"),
            "http://localhost:8080/api/notes/a%2Fb%20c"
        );
    }

    #[tokio::test]
    async fn calls_without_session_are_refused_locally() {
        let api = HttpNotesApi::new(&ClientConfig::default(), SessionManager::new()).unwrap();
        assert_eq!(api.list_notes().await, Err(ApiError::NoSession));
    }
}
