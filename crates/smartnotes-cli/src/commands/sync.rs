use std::path::Path;

use smartnotes_core::sync::{ItemReport, RefreshStatus};
use smartnotes_core::{
    ClientConfig, ConflictResolution, ItemOutcome, ReconcileReport, SkipReason, SyncStatus,
};

use crate::commands::common::{
    format_note_lines, note_to_list_item, open_service, resolve_note, NoteListItem,
};
use crate::error::CliError;

pub async fn run_sync(config: &ClientConfig, db_path: &Path) -> Result<(), CliError> {
    let service = open_service(config, db_path)?;
    if !service.session().is_valid() {
        return Err(CliError::NotSignedIn);
    }

    let probe = service.http_probe()?;
    if !service.probe_once(probe.as_ref()).await {
        let pending = service.store().with(|store| store.pending_count());
        println!("Server unreachable; {pending} change(s) stay queued");
        return Ok(());
    }

    let report = service.sync_now().await;
    if report.skipped == Some(SkipReason::NoSession) {
        return Err(CliError::NotSignedIn);
    }
    for line in summarize_report(&report) {
        println!("{line}");
    }
    Ok(())
}

pub fn summarize_report(report: &ReconcileReport) -> Vec<String> {
    let mut lines = Vec::new();
    if let Some(reason) = report.skipped {
        lines.push(match reason {
            SkipReason::Offline => "Offline; nothing sent".to_string(),
            SkipReason::NoSession => "Not signed in; nothing sent".to_string(),
        });
        return lines;
    }

    lines.push(format!(
        "Pushed {} change(s): {} applied, {} retrying, {} conflict(s)",
        report.items.len(),
        report.count(ItemOutcome::Applied),
        report.count(ItemOutcome::Retrying),
        report.count(ItemOutcome::Conflict)
    ));
    lines.extend(
        report
            .items
            .iter()
            .filter(|item| item.outcome == ItemOutcome::Conflict)
            .map(describe_conflict),
    );
    lines.push(match &report.refresh {
        RefreshStatus::Merged(summary) if summary.is_empty() => {
            "Refreshed from server: up to date".to_string()
        }
        RefreshStatus::Merged(summary) => format!(
            "Refreshed from server: {} new, {} updated, {} removed",
            summary.inserted, summary.updated, summary.removed
        ),
        RefreshStatus::Failed(error) => format!("Refresh failed: {error}"),
        RefreshStatus::Skipped => "Refresh skipped".to_string(),
    });
    lines.push(format!("Status: {}", SyncStatus::from_report(report)));
    lines
}

fn describe_conflict(item: &ItemReport) -> String {
    format!(
        "  conflict: {} no longer exists on the server; see `smartnotes conflicts`",
        item.local_id
    )
}

pub fn run_conflicts(as_json: bool, config: &ClientConfig, db_path: &Path) -> Result<(), CliError> {
    let service = open_service(config, db_path)?;
    let conflicts = service.store().with(|store| store.conflicts());

    if as_json {
        let json_items = conflicts
            .iter()
            .map(note_to_list_item)
            .collect::<Vec<NoteListItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
        return Ok(());
    }

    if conflicts.is_empty() {
        println!("No sync conflicts.");
        return Ok(());
    }

    for line in format_note_lines(&conflicts) {
        println!("{line}");
    }
    println!();
    println!("Resolve with `smartnotes resolve <id> --resubmit` or `--discard`.");
    Ok(())
}

pub fn run_resolve(
    id: &str,
    resubmit: bool,
    config: &ClientConfig,
    db_path: &Path,
) -> Result<(), CliError> {
    let resolution = if resubmit {
        ConflictResolution::Resubmit
    } else {
        ConflictResolution::Discard
    };
    let service = open_service(config, db_path)?;
    let note = service.store().with(|store| resolve_note(store, id))?;

    let local_id = note.local_id.as_str();
    match service
        .store()
        .with(|store| store.resolve_conflict(&local_id, resolution))?
    {
        Some(_) => println!("{local_id} queued for resubmission"),
        None => println!("{local_id} discarded"),
    }
    Ok(())
}
