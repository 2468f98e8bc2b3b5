use std::path::Path;

use smartnotes_core::{ClientConfig, NoteDraft};

use crate::cli::AddArgs;
use crate::commands::common::{normalize_content, open_service, parse_reminder, read_piped_stdin};
use crate::error::CliError;

pub fn run_add(args: AddArgs, config: &ClientConfig, db_path: &Path) -> Result<(), CliError> {
    let title = normalize_content(&args.title.join(" ")).ok_or(CliError::EmptyTitle)?;
    let content = match args.content {
        Some(content) => content,
        None => read_piped_stdin()?.unwrap_or_default(),
    };

    let mut draft = NoteDraft::new(title, content).with_tags(args.tags);
    if let Some(raw) = args.remind.as_deref() {
        draft = draft.with_reminder(parse_reminder(raw)?);
    }
    draft.pinned = args.pin;
    draft.favorite = args.favorite;

    let service = open_service(config, db_path)?;
    let note = service.store().with(|store| store.create(draft))?;

    println!("{}", note.local_id);
    Ok(())
}
