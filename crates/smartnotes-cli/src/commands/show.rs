use std::path::Path;

use smartnotes_core::sync::format_local_datetime;
use smartnotes_core::{ClientConfig, Note};

use crate::commands::common::{format_timestamp, open_service, render_tags, resolve_note};
use crate::error::CliError;

pub fn run_show(id: &str, as_json: bool, config: &ClientConfig, db_path: &Path) -> Result<(), CliError> {
    let service = open_service(config, db_path)?;
    let note = service.store().with(|store| resolve_note(store, id))?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&note)?);
    } else {
        for line in render_note(&note) {
            println!("{line}");
        }
    }
    Ok(())
}

pub fn render_note(note: &Note) -> Vec<String> {
    let mut lines = vec![format!("# {}", note.title)];
    lines.push(format!("id:       {}", note.local_id));
    if let Some(server_id) = &note.server_id {
        lines.push(format!("server:   {server_id}"));
    }
    lines.push(format!("state:    {}", note.sync_state));
    let tags = render_tags(note);
    if !tags.is_empty() {
        lines.push(format!("tags:     {tags}"));
    }
    if let Some(reminder) = note.reminder_at.and_then(format_local_datetime) {
        lines.push(format!("reminder: {reminder}"));
    }

    let flags = [
        (note.pinned, "pinned"),
        (note.favorite, "favorite"),
        (note.archived, "archived"),
        (note.locked, "locked"),
    ]
    .iter()
    .filter(|(set, _)| *set)
    .map(|(_, label)| *label)
    .collect::<Vec<_>>();
    if !flags.is_empty() {
        lines.push(format!("flags:    {}", flags.join(", ")));
    }
    lines.push(format!("updated:  {}", format_timestamp(note.updated_at)));

    if note.locked {
        lines.push(String::new());
        lines.push("[content hidden; run `smartnotes toggle lock <id>` to unlock]".to_string());
    } else if !note.content.is_empty() {
        lines.push(String::new());
        lines.extend(note.content.lines().map(str::to_string));
    }
    lines
}
