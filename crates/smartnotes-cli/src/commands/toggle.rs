use std::path::Path;

use smartnotes_core::{ClientConfig, ToggleField};

use crate::cli::FlagArg;
use crate::commands::common::{open_service, resolve_note};
use crate::error::CliError;

pub fn run_toggle(
    flag: FlagArg,
    id: &str,
    config: &ClientConfig,
    db_path: &Path,
) -> Result<(), CliError> {
    let field = ToggleField::from(flag);
    let service = open_service(config, db_path)?;
    let note = service.store().with(|store| resolve_note(store, id))?;

    let local_id = note.local_id.as_str();
    let updated = service.store().with(|store| store.toggle(&local_id, field))?;
    let state = if field.value(&updated) { "on" } else { "off" };
    println!("{local_id} {field}={state}");
    Ok(())
}
