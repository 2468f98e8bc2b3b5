use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use super::{AuthError, AuthResult, SessionPersistence};
use crate::util::unix_timestamp_now;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    pub id: Option<String>,
    pub email: Option<String>,
    pub username: Option<String>,
}

/// Bearer token plus its decoded expiry.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    /// `exp` claim of the token (Unix seconds)
    pub expires_at: i64,
    #[serde(default)]
    pub user: SessionUser,
}

#[derive(Debug, Deserialize)]
struct TokenClaims {
    exp: Option<i64>,
    sub: Option<String>,
}

impl Session {
    /// Decode the expiry from a JWT without contacting the server.
    ///
    /// The signature is not checked; the server remains the authority and
    /// rejects forged tokens with 401/403.
    pub fn from_token(token: impl Into<String>) -> AuthResult<Self> {
        let token = token.into().trim().to_string();
        if token.is_empty() {
            return Err(AuthError::InvalidToken("token must not be empty".to_string()));
        }

        let mut validation = Validation::default();
        validation.insecure_disable_signature_validation();
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims = HashSet::new();

        let claims = decode::<TokenClaims>(&token, &DecodingKey::from_secret(&[]), &validation)
            .map_err(|error| AuthError::InvalidToken(error.to_string()))?
            .claims;
        let expires_at = claims
            .exp
            .ok_or_else(|| AuthError::InvalidToken("token has no exp claim".to_string()))?;

        Ok(Self {
            token,
            expires_at,
            user: SessionUser {
                id: claims.sub,
                ..SessionUser::default()
            },
        })
    }

    /// Attach account details, keeping the token subject when no id is given.
    #[must_use]
    pub fn with_user(mut self, user: SessionUser) -> Self {
        let subject = self.user.id.take();
        self.user = user;
        if self.user.id.is_none() {
            self.user.id = subject;
        }
        self
    }

    pub const fn is_expired_at(&self, now: i64) -> bool {
        self.expires_at <= now
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(unix_timestamp_now())
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Session")
            .field("token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .field("user", &self.user)
            .finish()
    }
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryReason {
    /// The token's `exp` passed
    Expired,
    /// The server answered with this status (401/403)
    Rejected(u16),
    SignedOut,
}

impl fmt::Display for ExpiryReason {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Expired => formatter.write_str("token expired"),
            Self::Rejected(status) => write!(formatter, "rejected by server (HTTP {status})"),
            Self::SignedOut => formatter.write_str("signed out"),
        }
    }
}

type ExpiryCallback = Arc<dyn Fn(ExpiryReason) + Send + Sync>;

#[derive(Default)]
struct SessionSlot {
    session: Option<Session>,
    callbacks: Vec<ExpiryCallback>,
}

/// Owner of the current session.
///
/// Expiry is terminal: once the session ends every `on_expire` callback runs
/// exactly once and sync stays halted until the next `sign_in`.
#[derive(Clone)]
pub struct SessionManager {
    slot: Arc<Mutex<SessionSlot>>,
    valid: watch::Sender<bool>,
    persistence: Option<Arc<dyn SessionPersistence>>,
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionManager {
    pub fn new() -> Self {
        let (valid, _) = watch::channel(false);
        Self {
            slot: Arc::new(Mutex::new(SessionSlot::default())),
            valid,
            persistence: None,
        }
    }

    /// Manager that saves sign-ins and clears storage when the session ends.
    pub fn with_persistence(persistence: Arc<dyn SessionPersistence>) -> Self {
        Self {
            persistence: Some(persistence),
            ..Self::new()
        }
    }

    /// Load a previously persisted session. Returns whether it is usable.
    pub fn restore(&self) -> AuthResult<bool> {
        let Some(persistence) = &self.persistence else {
            return Ok(false);
        };
        let Some(session) = persistence.load_session()? else {
            return Ok(false);
        };
        if session.is_expired() {
            tracing::info!("Stored session has expired; sign in again to sync");
            persistence.clear_session()?;
            return Ok(false);
        }

        self.lock().session = Some(session);
        self.valid.send_replace(true);
        Ok(true)
    }

    /// Install a fresh session.
    pub fn sign_in(&self, session: Session) -> AuthResult<()> {
        if session.is_expired() {
            return Err(AuthError::Expired);
        }
        if let Some(persistence) = &self.persistence {
            persistence.save_session(&session)?;
        }
        self.lock().session = Some(session);
        self.valid.send_replace(true);
        Ok(())
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid_at(unix_timestamp_now())
    }

    /// Validity at `now` (Unix seconds); an expired session is ended here.
    pub fn is_valid_at(&self, now: i64) -> bool {
        let expired = match &self.lock().session {
            None => return false,
            Some(session) => session.is_expired_at(now),
        };
        if expired {
            self.invalidate(ExpiryReason::Expired);
            return false;
        }
        true
    }

    /// Bearer token of a valid session.
    pub fn token(&self) -> Option<String> {
        if !self.is_valid() {
            return None;
        }
        self.lock()
            .session
            .as_ref()
            .map(|session| session.token.clone())
    }

    pub fn current(&self) -> Option<Session> {
        self.lock().session.clone()
    }

    /// Register a callback run whenever a session ends.
    pub fn on_expire(&self, callback: impl Fn(ExpiryReason) + Send + Sync + 'static) {
        self.lock().callbacks.push(Arc::new(callback));
    }

    /// End the current session. Returns `false` when there was none.
    pub fn invalidate(&self, reason: ExpiryReason) -> bool {
        let callbacks = {
            let mut slot = self.lock();
            if slot.session.take().is_none() {
                return false;
            }
            slot.callbacks.clone()
        };
        self.valid.send_replace(false);

        tracing::warn!("Session ended: {}", reason);
        if let Some(persistence) = &self.persistence {
            if let Err(error) = persistence.clear_session() {
                tracing::warn!("Failed to clear stored session: {}", error);
            }
        }
        for callback in callbacks {
            callback(reason);
        }
        true
    }

    /// Validity transitions.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.valid.subscribe()
    }

    /// End the session when its token expires. Runs until the manager is dropped.
    pub async fn watch_expiry(&self) {
        let mut changes = self.subscribe();
        loop {
            let Some(expires_at) = self.current().map(|session| session.expires_at) else {
                if changes.changed().await.is_err() {
                    return;
                }
                continue;
            };

            let remaining = expires_at.saturating_sub(unix_timestamp_now()).max(1);
            let wait = Duration::from_secs(u64::try_from(remaining).unwrap_or(1));
            tokio::select! {
                () = tokio::time::sleep(wait) => {
                    self.is_valid();
                }
                changed = changes.changed() => {
                    if changed.is_err() {
                        return;
                    }
                }
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SessionSlot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
