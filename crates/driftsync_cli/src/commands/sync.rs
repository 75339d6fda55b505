//! Sync commands.

use super::replica::{sync_config, Replicas};
use driftsync_engine::{CancelToken, RetryConfig, SyncReport, SyncScheduler};
use driftsync_protocol::Task;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Runs one cycle, retrying transient failures up to `max_attempts` times.
pub fn sync(replicas: &Replicas, max_attempts: u32) -> Result<(), Box<dyn std::error::Error>> {
    let config = sync_config().with_retry(RetryConfig::new(max_attempts.max(1)));
    let coordinator = replicas.coordinator(config)?;

    let report = coordinator.sync_with_retry(&CancelToken::new())?;
    print_report("Sync", &report);
    Ok(())
}

/// Resets the cursor and runs a full cycle. Local edits are kept.
pub fn resync(replicas: &Replicas) -> Result<(), Box<dyn std::error::Error>> {
    let coordinator = replicas.coordinator(sync_config())?;
    let report = coordinator.resync(&CancelToken::new())?;
    print_report("Resync", &report);
    Ok(())
}

/// Syncs every `interval_secs` until Ctrl-C.
pub fn watch(replicas: &Replicas, interval_secs: u64) -> Result<(), Box<dyn std::error::Error>> {
    let interval = Duration::from_secs(interval_secs.max(1));
    let coordinator = Arc::new(replicas.coordinator(sync_config().with_sync_interval(interval))?);

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        let scheduler =
            SyncScheduler::spawn_configured(Arc::clone(&coordinator), CancelToken::new());
        println!("Watching, syncing every {}s. Press Ctrl-C to stop.", interval.as_secs());

        let interrupted = tokio::signal::ctrl_c().await;
        scheduler.stop().await;
        interrupted
    })?;

    let stats = coordinator.stats();
    info!(
        cycles = stats.cycles_completed,
        failed = stats.cycles_failed,
        "watch stopped"
    );
    println!("✓ Stopped after {} cycles", stats.cycles_completed);
    println!("  Failed cycles: {}", stats.cycles_failed);
    println!("  Records pulled: {}", stats.records_pulled);
    println!("  Records pushed: {}", stats.records_pushed);
    println!("  Conflicts: {}", stats.conflicts);
    Ok(())
}

/// Lists the server replica.
pub fn server_list(replicas: &Replicas, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let server = replicas.open_server()?;
    let tasks: Vec<Task> = server.reconciler().list()?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&tasks)?),
        _ if tasks.is_empty() => println!("(no tasks)"),
        _ => {
            for task in &tasks {
                let deleted = if task.deleted_at.is_some() {
                    " [deleted]"
                } else {
                    ""
                };
                println!(
                    "{}  {}{deleted}  (updated_at {}, by {})",
                    task.id,
                    task.title.as_deref().unwrap_or(""),
                    task.updated_at,
                    task.updated_by.as_deref().unwrap_or("-")
                );
            }
        }
    }
    Ok(())
}

fn print_report(label: &str, report: &SyncReport) {
    if report.is_complete() {
        println!("✓ {label} complete");
    } else {
        println!("! {label} incomplete, unsent edits stay pending");
    }
    println!("  Cursor: {} -> {}", report.previous_cursor, report.new_cursor);
    println!(
        "  Pulled: {} ({} new, {} updated)",
        report.pulled, report.inserted, report.overwritten
    );
    println!("  Pushed: {} ({} acknowledged)", report.pushed, report.acknowledged);

    for conflict in &report.conflicts {
        println!(
            "  Conflict: {} kept local {} over remote {}",
            conflict.id, conflict.local_updated_at, conflict.remote_updated_at
        );
    }
    for failure in &report.push_failures {
        println!("  Rejected: {} ({})", failure.id, failure.reason);
    }
    if let Some(error) = &report.push_error {
        println!("  Push error: {error}");
    }
    println!("  Duration: {:?}", report.duration);
}
