use std::path::Path;

use smartnotes_core::{ClientConfig, NotePatch};

use crate::cli::EditArgs;
use crate::commands::common::{
    capture_editor_input_with_initial, open_service, parse_reminder, resolve_note,
};
use crate::error::CliError;

pub fn build_patch(args: &EditArgs) -> Result<NotePatch, CliError> {
    let reminder_at = if args.clear_reminder {
        Some(None)
    } else {
        args.remind
            .as_deref()
            .map(parse_reminder)
            .transpose()?
            .map(Some)
    };
    Ok(NotePatch {
        title: args.title.clone(),
        content: args.content.clone(),
        tags: args.tags.clone(),
        reminder_at,
        ..NotePatch::default()
    })
}

pub fn run_edit(args: &EditArgs, config: &ClientConfig, db_path: &Path) -> Result<(), CliError> {
    let service = open_service(config, db_path)?;
    let note = service.store().with(|store| resolve_note(store, &args.id))?;

    let patch = if args.has_fields() {
        build_patch(args)?
    } else {
        let edited = capture_editor_input_with_initial(&note.content)?.unwrap_or_default();
        if edited == note.content {
            println!("{}", note.local_id);
            return Ok(());
        }
        NotePatch {
            content: Some(edited),
            ..NotePatch::default()
        }
    };

    let id = note.local_id.as_str();
    let updated = service.store().with(|store| store.update(&id, patch))?;
    println!("{}", updated.local_id);
    Ok(())
}
