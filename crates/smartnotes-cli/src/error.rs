use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] smartnotes_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Note title cannot be empty")]
    EmptyTitle,
    #[error("Note ID cannot be empty")]
    EmptyNoteId,
    #[error("Note not found for id/prefix: {0}")]
    NoteNotFound(String),
    #[error("{0}")]
    AmbiguousNoteId(String),
    #[error("Could not understand date/time '{0}' (try 2026-03-01T09:30)")]
    InvalidDateTime(String),
    #[error("Editor command failed: {0}")]
    EditorFailed(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Authentication error: {0}")]
    Auth(String),
    #[error("Not signed in. Run `smartnotes auth login` to enable sync.")]
    NotSignedIn,
}

impl From<smartnotes_core::AuthError> for CliError {
    fn from(error: smartnotes_core::AuthError) -> Self {
        Self::Auth(error.to_string())
    }
}
