//! File watcher: translate filesystem notifications into index mutations
//! and broker events.
//!
//! The vault root is watched recursively. Events for a single path are
//! applied in arrival order; renames only report the old path, so each
//! rename schedules a debounced reconciliation pass that picks up whatever
//! the rename produced elsewhere in the tree.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use notify::event::{CreateKind, EventKind, ModifyKind, RenameMode};
use notify::{RecommendedWatcher, RecursiveMode, Watcher as _};
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

use crate::broker::{Broker, NoteEventKind};
use crate::index::Index;
use crate::service::index_bytes;
use crate::vault::{checksum, Vault};

/// Delay before a rename-triggered reconciliation pass runs; further
/// renames inside the window coalesce into one pass.
const RECONCILE_DEBOUNCE: Duration = Duration::from_millis(200);

/// Delay before retrying a read that raced an external editor's own
/// atomic rename.
const READ_RETRY_DELAY: Duration = Duration::from_millis(50);

/// Run the watcher until `shutdown` flips to true. A pending debounced
/// reconciliation is drained before returning.
pub async fn run(
    vault: Arc<Vault>,
    index: Arc<Index>,
    broker: Broker,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let (tx, mut rx) = mpsc::unbounded_channel();

    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<notify::Event>| {
            let _ = tx.send(res);
        },
        notify::Config::default(),
    )?;
    watcher.watch(vault.root(), RecursiveMode::Recursive)?;

    tracing::info!(root = %vault.root().display(), "watcher: started");

    let mut reconcile_at: Option<Instant> = None;

    loop {
        let deadline = reconcile_at.unwrap_or_else(|| Instant::now() + Duration::from_secs(3600));
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            _ = tokio::time::sleep_until(deadline), if reconcile_at.is_some() => {
                reconcile_at = None;
                reconcile_pass(&vault, &index, &broker).await;
            }
            event = rx.recv() => {
                match event {
                    Some(Ok(ev)) => {
                        if handle_event(&vault, &index, &broker, &ev).await {
                            reconcile_at = Some(Instant::now() + RECONCILE_DEBOUNCE);
                        }
                    }
                    Some(Err(e)) => {
                        tracing::error!(error = %e, "watcher: backend error");
                    }
                    None => break,
                }
            }
        }
    }

    if reconcile_at.is_some() {
        reconcile_pass(&vault, &index, &broker).await;
    }
    drop(watcher);
    tracing::info!("watcher: stopped");
    Ok(())
}

/// Apply one filesystem event. Returns true when a debounced reconciliation
/// pass should be scheduled.
async fn handle_event(
    vault: &Vault,
    index: &Index,
    broker: &Broker,
    event: &notify::Event,
) -> bool {
    let mut want_reconcile = false;

    for abs in &event.paths {
        // New directories join the recursive watch automatically, but files
        // already inside them may predate the watch; walk and index them.
        if matches!(event.kind, EventKind::Create(CreateKind::Folder))
            || (matches!(event.kind, EventKind::Create(_)) && abs.is_dir())
        {
            index_new_dir(vault, index, broker, abs).await;
            continue;
        }

        if abs.extension().and_then(|e| e.to_str()) != Some("md") {
            continue;
        }
        let Some(rel) = relative(vault, abs) else {
            continue;
        };

        match event.kind {
            EventKind::Create(_) => {
                upsert_path(vault, index, broker, &rel, NoteEventKind::Created).await;
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
                remove_path(index, broker, &rel).await;
                want_reconcile = true;
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
                upsert_path(vault, index, broker, &rel, NoteEventKind::Created).await;
            }
            EventKind::Modify(ModifyKind::Name(_)) => {
                // Old-path-only or ambiguous rename notification: resolve by
                // looking at the filesystem, then reconcile for the rest.
                if vault.exists(&rel).unwrap_or(false) {
                    upsert_path(vault, index, broker, &rel, NoteEventKind::Created).await;
                } else {
                    remove_path(index, broker, &rel).await;
                }
                want_reconcile = true;
            }
            EventKind::Modify(_) => {
                upsert_path(vault, index, broker, &rel, NoteEventKind::Updated).await;
            }
            EventKind::Remove(_) => {
                remove_path(index, broker, &rel).await;
            }
            _ => {}
        }
    }

    want_reconcile
}

/// Read, index, and publish a created/updated note. Reads race external
/// editors' own temp-and-rename writes, so one failed read is retried after
/// a short delay.
async fn upsert_path(
    vault: &Vault,
    index: &Index,
    broker: &Broker,
    rel: &str,
    kind: NoteEventKind,
) {
    let data = match vault.read(rel) {
        Ok(d) => d,
        Err(_) => {
            tokio::time::sleep(READ_RETRY_DELAY).await;
            match vault.read(rel) {
                Ok(d) => d,
                Err(e) => {
                    tracing::warn!(path = %rel, error = %e, "watcher: read failed");
                    return;
                }
            }
        }
    };

    let mtime = vault.mtime(rel).unwrap_or(0);
    match index_bytes(index, rel, &data, mtime).await {
        Ok(()) => {
            tracing::debug!(path = %rel, kind = kind.as_str(), "watcher: indexed");
            broker.publish_note_event(kind, rel);
        }
        Err(e) => {
            tracing::warn!(path = %rel, error = %e, "watcher: index failed");
        }
    }
}

async fn remove_path(index: &Index, broker: &Broker, rel: &str) {
    match index.delete_note(rel).await {
        Ok(()) => {
            tracing::debug!(path = %rel, "watcher: deleted");
            broker.publish_note_event(NoteEventKind::Deleted, rel);
        }
        Err(e) => {
            tracing::warn!(path = %rel, error = %e, "watcher: delete failed");
        }
    }
}

/// Index any notes already present under a directory that just appeared.
async fn index_new_dir(vault: &Vault, index: &Index, broker: &Broker, dir: &Path) {
    let Some(rel_dir) = relative(vault, dir) else {
        return;
    };
    let metas = match vault.list(&rel_dir) {
        Ok(m) => m,
        Err(e) => {
            tracing::warn!(path = %rel_dir, error = %e, "watcher: new dir walk failed");
            return;
        }
    };
    for meta in metas {
        if index
            .get_checksum(&meta.path)
            .await
            .ok()
            .flatten()
            .is_some()
        {
            continue;
        }
        upsert_path(vault, index, broker, &meta.path, NoteEventKind::Created).await;
    }
}

/// Rename-storm cleanup: one bounded sweep comparing the vault and index,
/// publishing events for whatever it changes.
async fn reconcile_pass(vault: &Vault, index: &Index, broker: &Broker) {
    let indexed = match index.all_checksums().await {
        Ok(m) => m,
        Err(e) => {
            tracing::warn!(error = %e, "reconcile: all checksums failed");
            return;
        }
    };
    let disk = match vault.list("") {
        Ok(d) => d,
        Err(e) => {
            tracing::warn!(error = %e, "reconcile: list failed");
            return;
        }
    };

    let on_disk: std::collections::HashSet<&str> =
        disk.iter().map(|m| m.path.as_str()).collect();

    for path in indexed.keys() {
        if !on_disk.contains(path.as_str()) {
            if index.delete_note(path).await.is_ok() {
                tracing::debug!(path = %path, "reconcile: removed stale");
                broker.publish_note_event(NoteEventKind::Deleted, path);
            }
        }
    }

    for meta in &disk {
        let data = match vault.read(&meta.path) {
            Ok(d) => d,
            Err(_) => continue,
        };
        let cs = checksum(&data);
        if indexed.get(&meta.path) == Some(&cs) {
            continue;
        }
        if index_bytes(index, &meta.path, &data, meta.mtime).await.is_ok() {
            tracing::debug!(path = %meta.path, "reconcile: indexed");
            broker.publish_note_event(NoteEventKind::Created, &meta.path);
        }
    }
}

fn relative(vault: &Vault, abs: &Path) -> Option<String> {
    let rel = abs.strip_prefix(vault.root()).ok()?;
    let s = rel.to_string_lossy();
    if s.is_empty() {
        return None;
    }
    // Ignore our own atomic-write temp files.
    if rel
        .file_name()
        .map_or(false, |n| n.to_string_lossy().starts_with('.'))
    {
        return None;
    }
    Some(if std::path::MAIN_SEPARATOR == '/' {
        s.into_owned()
    } else {
        s.replace(std::path::MAIN_SEPARATOR, "/")
    })
}
