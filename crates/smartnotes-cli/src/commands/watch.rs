use std::path::Path;
use std::sync::Arc;

use smartnotes_core::{ClientConfig, NotificationSink, ReminderNotice};

use crate::commands::common::{format_timestamp, open_service};
use crate::error::CliError;

/// Prints reminders to the terminal.
struct TerminalSink;

impl NotificationSink for TerminalSink {
    fn deliver(&self, notice: &ReminderNotice) -> Result<(), String> {
        println!(
            "Reminder: {} (due {})",
            notice.title,
            format_timestamp(notice.due_at)
        );
        if let Some(body) = &notice.body {
            println!("  {body}");
        }
        Ok(())
    }
}

pub async fn run_watch(config: &ClientConfig, db_path: &Path) -> Result<(), CliError> {
    let service = open_service(config, db_path)?;
    if !service.session().is_valid() {
        println!("Not signed in; reminders only. Run `smartnotes auth login` to sync.");
    }
    service.session().on_expire(|reason| {
        eprintln!("Session ended ({reason}); sync paused. Run `smartnotes auth login`.");
    });

    let probe = service.http_probe()?;
    service.probe_once(probe.as_ref()).await;
    let mut status = service.worker().status();
    let tasks = service.spawn_background(Some(Arc::new(TerminalSink)), Some(probe))?;
    println!(
        "Watching {} ({} background tasks). Press Ctrl-C to stop.",
        config.api_base_url,
        tasks.len()
    );

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal?;
                break;
            }
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *status.borrow_and_update();
                tracing::info!("Sync status: {}", current);
            }
        }
    }

    tasks.shutdown();
    let pending = service.store().with(|store| store.pending_count());
    if pending > 0 {
        println!("Stopped with {pending} change(s) still queued.");
    }
    Ok(())
}
