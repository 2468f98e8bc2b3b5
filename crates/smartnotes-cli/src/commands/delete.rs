use std::path::Path;

use smartnotes_core::{ClientConfig, DeleteAck};

use crate::commands::common::{open_service, resolve_note};
use crate::error::CliError;

pub fn run_delete(id: &str, config: &ClientConfig, db_path: &Path) -> Result<(), CliError> {
    let service = open_service(config, db_path)?;
    let note = service.store().with(|store| resolve_note(store, id))?;

    let local_id = note.local_id.as_str();
    match service.store().with(|store| store.delete(&local_id))? {
        DeleteAck::Removed => println!("{local_id}"),
        DeleteAck::Queued => println!("{local_id} (server delete pending)"),
    }
    Ok(())
}
