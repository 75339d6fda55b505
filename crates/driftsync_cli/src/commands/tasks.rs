//! Local task commands.
//!
//! These only touch the client replica. Edits are marked `modified` and go
//! out on the next `sync`.

use super::replica::Replicas;
use driftsync_protocol::{Clock, SyncRecord, SystemClock, Task, Timestamp};
use driftsync_store::{LocalRecord, RecordFilter, RecordStore};
use serde::Serialize;
use tracing::info;

/// Creates both replicas and prints the device identity.
pub fn init(replicas: &Replicas) -> Result<(), Box<dyn std::error::Error>> {
    let client = replicas.create_client()?;
    let server = replicas.open_server()?;

    println!("✓ Replicas ready");
    println!("  Client: {:?}", replicas.client_dir());
    println!("  Server: {:?}", replicas.server_dir());
    println!("  Device: {}", client.device_id());
    println!("  Server records: {}", server.reconciler().list()?.len());
    Ok(())
}

/// Creates a task.
pub fn add(
    replicas: &Replicas,
    title: String,
    description: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let client = replicas.open_client()?;
    let task = Task {
        id: Task::generate_id(),
        title: Some(title),
        description,
        created_at: SystemClock.now(),
        ..Task::default()
    };

    let created = client.editor().create(task)?;
    info!(id = %created.id(), "task created");
    println!("✓ Created {}", created.id());
    Ok(())
}

/// Changes the title and/or description of a task.
pub fn edit(
    replicas: &Replicas,
    id: &str,
    title: Option<String>,
    description: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let client = replicas.open_client()?;
    let updated = client.editor().update(id, |task| {
        if let Some(title) = title {
            task.title = Some(title);
        }
        if let Some(description) = description {
            task.description = Some(description);
        }
    })?;
    println!("✓ Updated {} (updated_at {})", updated.id(), updated.updated_at());
    Ok(())
}

/// Soft-deletes a task.
pub fn delete(replicas: &Replicas, id: &str) -> Result<(), Box<dyn std::error::Error>> {
    let client = replicas.open_client()?;
    let deleted = client.editor().soft_delete(id)?;
    println!("✓ Deleted {}", deleted.id());
    Ok(())
}

/// Lists the client replica.
pub fn list(replicas: &Replicas, all: bool, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let client = replicas.open_client()?;
    let records = if all {
        client.table().select(&RecordFilter::all())?
    } else {
        client.editor().list_visible()?
    };

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&records)?),
        _ => print_local(&records),
    }
    Ok(())
}

/// Client status summary.
#[derive(Debug, Serialize)]
struct Status {
    device_id: String,
    cursor: Timestamp,
    records: usize,
    tombstones: usize,
    pending: usize,
}

/// Shows device id, cursor and pending edits.
pub fn status(replicas: &Replicas, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let client = replicas.open_client()?;
    let records = client.table().select(&RecordFilter::all())?;
    let status = Status {
        device_id: client.device_id().to_string(),
        cursor: client.cursor()?,
        records: records.len(),
        tombstones: records.iter().filter(|r| r.is_deleted()).count(),
        pending: records.iter().filter(|r| r.is_modified()).count(),
    };

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!("Device:     {}", status.device_id);
    println!("Cursor:     {}", status.cursor);
    println!("Records:    {} ({} deleted)", status.records, status.tombstones);
    println!("Pending:    {}", status.pending);
    Ok(())
}

fn print_local(records: &[LocalRecord<Task>]) {
    if records.is_empty() {
        println!("(no tasks)");
        return;
    }
    for local in records {
        let marker = if local.is_modified() { "*" } else { " " };
        let deleted = if local.is_deleted() { " [deleted]" } else { "" };
        println!(
            "{marker} {}  {}{deleted}",
            local.id(),
            local.record.title.as_deref().unwrap_or("")
        );
        if let Some(description) = &local.record.description {
            println!("      {description}");
        }
    }
}
