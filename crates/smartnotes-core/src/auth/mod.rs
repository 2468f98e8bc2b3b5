//! Auth client and session lifecycle.

mod session;

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::normalize_api_base_url;

pub use session::{ExpiryReason, Session, SessionManager, SessionUser};

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid auth configuration: {0}")]
    InvalidConfiguration(String),
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Failed to parse JSON payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Auth API error: {0}")]
    Api(String),
    #[error("Invalid session token: {0}")]
    InvalidToken(String),
    #[error("Session token has already expired")]
    Expired,
    #[error("Secure storage error: {0}")]
    SecureStorage(String),
}

pub type AuthResult<T> = Result<T, AuthError>;

/// Durable storage for the signed-in session.
pub trait SessionPersistence: Send + Sync {
    fn load_session(&self) -> AuthResult<Option<Session>>;
    fn save_session(&self, session: &Session) -> AuthResult<()>;
    fn clear_session(&self) -> AuthResult<()>;
}

/// Account created by [`AuthClient::register`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredUser {
    pub id: Option<String>,
    pub username: String,
    pub email: String,
}

/// Client for the `/api/auth` endpoints.
#[derive(Clone)]
pub struct AuthClient {
    auth_url: String,
    client: Client,
}

impl AuthClient {
    pub fn new(api_base_url: &str, timeout: Duration) -> AuthResult<Self> {
        let base = normalize_api_base_url(api_base_url)
            .map_err(|error| AuthError::InvalidConfiguration(error.to_string()))?;
        Ok(Self {
            auth_url: format!("{base}/api/auth"),
            client: Client::builder().timeout(timeout).build()?,
        })
    }

    /// Exchange credentials for a session token.
    pub async fn login(&self, email: &str, password: &str) -> AuthResult<Session> {
        validate_credentials(email, password)?;

        let payload = serde_json::json!({
            "email": email.trim(),
            "password": password,
        });
        let response = self
            .client
            .post(format!("{}/login", self.auth_url))
            .json(&payload)
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Api(parse_api_error(status, &body)));
        }

        let login = response.json::<LoginResponse>().await?;
        let session = Session::from_token(login.token)?.with_user(SessionUser {
            id: login.user_id,
            email: login.email,
            username: login.username,
        });
        tracing::info!("Signed in (session valid until {})", session.expires_at);
        Ok(session)
    }

    /// Create an account. Registration does not sign in.
    pub async fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> AuthResult<RegisteredUser> {
        if username.trim().is_empty() {
            return Err(AuthError::Api("Username is required".to_string()));
        }
        validate_credentials(email, password)?;

        let payload = serde_json::json!({
            "username": username.trim(),
            "email": email.trim(),
            "password": password,
        });
        let response = self
            .client
            .post(format!("{}/register", self.auth_url))
            .json(&payload)
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Api(parse_api_error(status, &body)));
        }
        Ok(response.json::<RegisteredUser>().await?)
    }
}

fn validate_credentials(email: &str, password: &str) -> AuthResult<()> {
    if email.trim().is_empty() {
        return Err(AuthError::Api("Email is required".to_string()));
    }
    if password.trim().is_empty() {
        return Err(AuthError::Api("Password is required".to_string()));
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
    token: String,
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
    message: Option<String>,
}

/// Render a non-2xx response as `"<message> (<status>)"`.
pub(crate) fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return format!("{} ({})", message.trim(), status.as_u16());
        }
    }

    let trimmed = crate::util::compact_text(body);
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", trimmed, status.as_u16())
    }
}
