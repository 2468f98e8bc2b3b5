use std::path::Path;

use smartnotes_core::{ClientConfig, NoteFilter};

use crate::cli::ListArgs;
use crate::commands::common::{
    format_note_lines, note_to_list_item, open_service, parse_day, NoteListItem,
};
use crate::error::CliError;

pub fn build_filter(args: &ListArgs) -> Result<NoteFilter, CliError> {
    Ok(NoteFilter {
        include_archived: args.archived,
        archived_only: args.archived_only,
        pinned_only: args.pinned,
        favorite_only: args.favorites,
        tag: args.tag.clone(),
        search: args.search.clone(),
        created_on: args.created_on.as_deref().map(parse_day).transpose()?,
    })
}

pub fn run_list(args: &ListArgs, config: &ClientConfig, db_path: &Path) -> Result<(), CliError> {
    let filter = build_filter(args)?;
    let service = open_service(config, db_path)?;
    let mut notes = service.store().with(|store| store.list(&filter));
    notes.truncate(args.limit);

    if args.json {
        let json_items = notes
            .iter()
            .map(note_to_list_item)
            .collect::<Vec<NoteListItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
    } else if notes.is_empty() {
        println!("No notes.");
    } else {
        for line in format_note_lines(&notes) {
            println!("{line}");
        }
    }

    Ok(())
}
