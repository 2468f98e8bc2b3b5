use std::env;
use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use smartnotes_core::store::NoteStore;
use smartnotes_core::sync::{format_local_datetime, parse_local_datetime};
use smartnotes_core::{ClientConfig, Note, NoteFilter, NotesService, SyncState};

use crate::auth::session_manager;
use crate::error::CliError;

const DB_PATH_ENV: &str = "SMARTNOTES_DB_PATH";
const SHORT_ID_LEN: usize = 13;

#[derive(Debug, Serialize)]
pub struct NoteListItem {
    pub id: String,
    pub server_id: Option<String>,
    pub title: String,
    pub preview: String,
    pub tags: Vec<String>,
    pub reminder_at: Option<String>,
    pub pinned: bool,
    pub favorite: bool,
    pub archived: bool,
    pub locked: bool,
    pub sync_state: String,
    pub updated_at: i64,
    pub relative_time: String,
}

pub fn resolve_db_path(cli_db_path: Option<PathBuf>) -> Result<PathBuf, CliError> {
    if let Some(path) = cli_db_path.or_else(|| env::var_os(DB_PATH_ENV).map(PathBuf::from)) {
        return Ok(path);
    }
    default_db_path()
}

pub fn default_db_path() -> Result<PathBuf, CliError> {
    dirs::data_dir()
        .map(|dir| dir.join("smartnotes").join("notes.db"))
        .ok_or_else(|| CliError::Config("Failed to resolve CLI data directory".to_string()))
}

/// Hydrate the local cache and attach the stored session, if any.
pub fn open_service(config: &ClientConfig, db_path: &Path) -> Result<NotesService, CliError> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let session = session_manager(config);
    Ok(NotesService::open_http(config.clone(), db_path, session)?)
}

pub fn normalize_note_identifier(id: &str) -> Result<String, CliError> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        Err(CliError::EmptyNoteId)
    } else {
        Ok(trimmed.to_string())
    }
}

/// Find a note by local id, server id or a unique prefix of either.
///
/// Conflicted notes are included so they can be resolved by id.
pub fn resolve_note(store: &NoteStore, query: &str) -> Result<Note, CliError> {
    let query = normalize_note_identifier(query)?;
    if let Ok(note) = store.get(&query) {
        return Ok(note);
    }

    let matches = store
        .list(&NoteFilter::all())
        .into_iter()
        .chain(store.conflicts())
        .filter(|note| {
            note.local_id.as_str().starts_with(&query)
                || note
                    .server_id
                    .as_deref()
                    .is_some_and(|server_id| server_id.starts_with(&query))
        })
        .fold(Vec::<Note>::new(), |mut unique, note| {
            if !unique.iter().any(|seen| seen.local_id == note.local_id) {
                unique.push(note);
            }
            unique
        });

    match matches.len() {
        0 => Err(CliError::NoteNotFound(query)),
        1 => matches
            .into_iter()
            .next()
            .ok_or(CliError::NoteNotFound(query)),
        _ => {
            let options = matches
                .iter()
                .take(3)
                .map(short_id)
                .collect::<Vec<_>>()
                .join(", ");
            Err(CliError::AmbiguousNoteId(format!(
                "ID prefix '{query}' is ambiguous; matches: {options}"
            )))
        }
    }
}

pub fn short_id(note: &Note) -> String {
    note.local_id
        .as_str()
        .chars()
        .take(SHORT_ID_LEN)
        .collect::<String>()
}

pub fn parse_reminder(raw: &str) -> Result<i64, CliError> {
    parse_local_datetime(raw).ok_or_else(|| CliError::InvalidDateTime(raw.trim().to_string()))
}

pub fn parse_day(raw: &str) -> Result<NaiveDate, CliError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| CliError::InvalidDateTime(raw.trim().to_string()))
}

pub fn format_timestamp(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.format("%Y-%m-%d %H:%M UTC").to_string(),
    )
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;
    let month = 30 * day;
    let year = 365 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else if diff < month {
        format!("{}w ago", diff / week)
    } else if diff < year {
        format!("{}mo ago", diff / month)
    } else {
        format!("{}y ago", diff / year)
    }
}

/// First line of the body, collapsed and truncated. Locked notes show nothing.
pub fn note_preview(note: &Note, max_chars: usize) -> String {
    if note.locked {
        return "[locked]".to_string();
    }
    let first_line = note.content.lines().next().unwrap_or("").trim();
    truncate(&first_line.split_whitespace().collect::<Vec<_>>().join(" "), max_chars)
}

pub fn truncate(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        value.to_string()
    } else {
        let take_len = max_chars.saturating_sub(3);
        let mut truncated = value.chars().take(take_len).collect::<String>();
        truncated.push_str("...");
        truncated
    }
}

pub fn render_tags(note: &Note) -> String {
    note.tags
        .iter()
        .map(|tag| format!("#{tag}"))
        .collect::<Vec<String>>()
        .join(" ")
}

fn flag_markers(note: &Note) -> String {
    [
        (note.pinned, 'P'),
        (note.favorite, '*'),
        (note.archived, 'A'),
        (note.locked, 'L'),
    ]
    .iter()
    .map(|(set, marker)| if *set { *marker } else { ' ' })
    .collect()
}

const fn sync_marker(state: SyncState) -> &'static str {
    match state {
        SyncState::Clean => "",
        SyncState::PendingCreate | SyncState::PendingUpdate | SyncState::PendingDelete => {
            "(pending)"
        }
        SyncState::Conflict => "(conflict)",
    }
}

pub fn format_note_lines(notes: &[Note]) -> Vec<String> {
    let now_ms = Utc::now().timestamp_millis();
    notes
        .iter()
        .map(|note| {
            let title = truncate(&note.title, 40);
            let relative_time = format_relative_time(note.updated_at, now_ms);
            let mut line = format!(
                "{:<13}  {}  {title:<40}  {relative_time:<10}",
                short_id(note),
                flag_markers(note)
            );
            let tags = render_tags(note);
            if !tags.is_empty() {
                line.push_str("  ");
                line.push_str(&tags);
            }
            let marker = sync_marker(note.sync_state);
            if !marker.is_empty() {
                line.push_str("  ");
                line.push_str(marker);
            }
            line.trim_end().to_string()
        })
        .collect()
}

pub fn note_to_list_item(note: &Note) -> NoteListItem {
    let now_ms = Utc::now().timestamp_millis();
    NoteListItem {
        id: note.local_id.as_str(),
        server_id: note.server_id.clone(),
        title: note.title.clone(),
        preview: note_preview(note, 80),
        tags: note.tags.clone(),
        reminder_at: note.reminder_at.and_then(format_local_datetime),
        pinned: note.pinned,
        favorite: note.favorite,
        archived: note.archived,
        locked: note.locked,
        sync_state: note.sync_state.label().to_string(),
        updated_at: note.updated_at,
        relative_time: format_relative_time(note.updated_at, now_ms),
    }
}

pub fn normalize_content(content: &str) -> Option<String> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

pub fn read_piped_stdin() -> Result<Option<String>, CliError> {
    let stdin = io::stdin();
    if stdin.is_terminal() {
        return Ok(None);
    }

    let mut buffer = String::new();
    stdin.lock().read_to_string(&mut buffer)?;
    Ok(normalize_content(&buffer))
}

/// Open `$VISUAL`/`$EDITOR` on `initial_content` and return the saved text.
pub fn capture_editor_input_with_initial(
    initial_content: &str,
) -> Result<Option<String>, CliError> {
    let editor = preferred_editor();
    let temp_file = create_temp_note_file_path();
    std::fs::write(&temp_file, initial_content)?;

    let launch_result = launch_editor(&editor, &temp_file);
    let note_content = std::fs::read_to_string(&temp_file)?;
    let _ = std::fs::remove_file(&temp_file);

    launch_result?;
    Ok(normalize_content(&note_content))
}

pub fn launch_editor(editor: &str, file_path: &Path) -> Result<(), CliError> {
    match Command::new(editor).arg(file_path).status() {
        Ok(status) => {
            if status.success() {
                Ok(())
            } else {
                Err(CliError::EditorFailed(format!(
                    "`{editor}` exited with status {status}"
                )))
            }
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            let mut parts = editor.split_whitespace();
            let Some(program) = parts.next() else {
                return Err(CliError::EditorFailed("empty EDITOR command".into()));
            };

            let mut command = Command::new(program);
            command.args(parts).arg(file_path);

            let status = command.status()?;
            if status.success() {
                Ok(())
            } else {
                Err(CliError::EditorFailed(format!(
                    "`{editor}` exited with status {status}"
                )))
            }
        }
        Err(err) => Err(CliError::Io(err)),
    }
}

pub fn preferred_editor() -> String {
    env::var("VISUAL")
        .or_else(|_| env::var("EDITOR"))
        .unwrap_or_else(|_| default_editor().to_string())
}

pub const fn default_editor() -> &'static str {
    if cfg!(windows) {
        "notepad"
    } else {
        "vi"
    }
}

pub fn create_temp_note_file_path() -> PathBuf {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_nanos());
    env::temp_dir().join(format!("smartnotes-note-{}-{now}.md", std::process::id()))
}
