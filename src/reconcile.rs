//! Startup reconciliation: make the index match the vault
//!
//! Runs once before the server accepts requests and again (debounced) after
//! rename storms observed by the watcher. Uses mtime+size as a cheap change
//! proxy so unchanged files are never re-read; only files whose stat data
//! diverges are re-hashed.

use std::collections::HashSet;

use crate::index::{Index, IndexedMeta};
use crate::service::{index_bytes, ServiceError};
use crate::vault::{checksum, FileMeta, Vault};

/// Outcome counters for one reconciliation sweep.
#[derive(Debug, Default, Clone, Copy)]
pub struct SyncStats {
    /// Files parsed and upserted.
    pub indexed: usize,
    /// Stale index rows removed.
    pub removed: usize,
    /// Files skipped via the mtime+size fast path.
    pub unchanged: usize,
}

/// What a sweep decided about one on-disk file.
enum FileState {
    Unchanged,
    /// Content identical but stat data moved (e.g. a touch); refresh the
    /// stored observation so the next sweep fast-paths.
    Touched,
    Changed(Vec<u8>),
}

/// Bring the index up to date with the vault.
///
/// Per-file read and parse errors are logged and skipped; only the two batch
/// queries can fail the sweep as a whole.
pub async fn sync(vault: &Vault, index: &Index) -> Result<SyncStats, ServiceError> {
    let disk = vault.list("").map_err(ServiceError::from)?;
    let indexed = index.all_meta().await.map_err(ServiceError::from)?;

    let mut stats = SyncStats::default();
    let mut seen: HashSet<&str> = HashSet::with_capacity(disk.len());

    for meta in &disk {
        seen.insert(meta.path.as_str());
        match classify(vault, meta, indexed.get(&meta.path)) {
            Ok(FileState::Unchanged) => stats.unchanged += 1,
            Ok(FileState::Touched) => {
                stats.unchanged += 1;
                if let Err(e) = index.touch_meta(&meta.path, meta.mtime, meta.size).await {
                    tracing::warn!(path = %meta.path, error = %e, "sync: meta refresh failed");
                }
            }
            Ok(FileState::Changed(data)) => {
                match index_bytes(index, &meta.path, &data, meta.mtime).await {
                    Ok(()) => {
                        stats.indexed += 1;
                        tracing::debug!(path = %meta.path, "sync: indexed");
                    }
                    Err(e) => {
                        tracing::warn!(path = %meta.path, error = %e, "sync: index failed");
                    }
                }
            }
            Err(e) => {
                tracing::warn!(path = %meta.path, error = %e, "sync: read failed");
            }
        }
    }

    for path in indexed.keys() {
        if seen.contains(path.as_str()) {
            continue;
        }
        match index.delete_note(path).await {
            Ok(()) => {
                stats.removed += 1;
                tracing::debug!(path = %path, "sync: removed stale");
            }
            Err(e) => {
                tracing::warn!(path = %path, error = %e, "sync: delete failed");
            }
        }
    }

    tracing::info!(
        indexed = stats.indexed,
        removed = stats.removed,
        unchanged = stats.unchanged,
        "sync complete"
    );

    Ok(stats)
}

/// Decide whether a file needs re-indexing. Stat data matching the prior
/// observation short-circuits; otherwise the file is read and its checksum
/// compared.
fn classify(
    vault: &Vault,
    meta: &FileMeta,
    row: Option<&IndexedMeta>,
) -> Result<FileState, crate::vault::VaultError> {
    if let Some(row) = row {
        if row.updated_at == meta.mtime && row.size == meta.size {
            return Ok(FileState::Unchanged);
        }
        let data = vault.read(&meta.path)?;
        if checksum(&data) == row.checksum {
            return Ok(FileState::Touched);
        }
        return Ok(FileState::Changed(data));
    }
    Ok(FileState::Changed(vault.read(&meta.path)?))
}
