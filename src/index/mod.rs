//! SQLite-backed note index (sqlx, WAL mode, optional FTS5)
//!
//! The index is a derived cache over the vault: one row per note, one row
//! per outgoing link edge, and a full-text table when the SQLite build has
//! FTS5. Deleting the database file and restarting is a supported recovery
//! path; the reconciler rebuilds an equivalent state.
//!
//! ## Module Structure
//!
//! - `notes` - note row upsert/delete transactions and lookups
//! - `search` - full-text search (FTS5 or LIKE fallback)
//! - `graph` - graph nodes/edges and backlink queries
//! - `stats` - aggregate counts

mod graph;
mod notes;
mod search;
mod stats;

use std::path::Path;

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use thiserror::Error;

pub use graph::{GraphEdge, GraphNode};
pub use notes::{IndexedMeta, NoteRow};
pub use search::SearchHit;
pub use stats::IndexStats;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("schema error: {0}")]
    Schema(String),
}

/// Thread-safe SQLite index with connection pooling.
///
/// WAL mode allows concurrent readers; SQLite itself serializes writers and
/// the 5 s busy timeout bounds how long a blocked writer waits.
pub struct Index {
    pool: SqlitePool,
    fts: bool,
}

impl Index {
    /// Open (or create) the index database and apply the schema.
    pub async fn open(path: &Path) -> Result<Self, IndexError> {
        // Forward slashes for URL compatibility on Windows.
        let path_str = path.to_string_lossy().replace('\\', "/");
        let db_url = format!("sqlite://{}?mode=rwc", path_str);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .after_connect(|conn, _meta| {
                Box::pin(async move {
                    sqlx::query("PRAGMA foreign_keys = ON")
                        .execute(&mut *conn)
                        .await?;
                    // WAL: concurrent reads, single writer.
                    sqlx::query("PRAGMA journal_mode = WAL")
                        .execute(&mut *conn)
                        .await?;
                    sqlx::query("PRAGMA busy_timeout = 5000")
                        .execute(&mut *conn)
                        .await?;
                    // NORMAL sync is safe under WAL.
                    sqlx::query("PRAGMA synchronous = NORMAL")
                        .execute(&mut *conn)
                        .await?;
                    Ok(())
                })
            })
            .connect(&db_url)
            .await?;

        let schema = include_str!("schema.sql");
        for statement in schema.split(';') {
            let stmt: String = statement
                .lines()
                .filter(|line| {
                    let trimmed = line.trim();
                    !trimmed.is_empty() && !trimmed.starts_with("--")
                })
                .collect::<Vec<_>>()
                .join("\n");
            let stmt = stmt.trim();
            if stmt.is_empty() {
                continue;
            }
            sqlx::query(stmt).execute(&pool).await?;
        }

        // Probe for FTS5. When the build lacks it, search falls back to
        // LIKE matching over the notes table.
        let fts = match sqlx::query(
            "CREATE VIRTUAL TABLE IF NOT EXISTS files_fts USING fts5(
                path UNINDEXED,
                title,
                body,
                tags,
                tokenize = 'unicode61 remove_diacritics 2'
            )",
        )
        .execute(&pool)
        .await
        {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(error = %e, "FTS5 unavailable, using LIKE fallback for search");
                false
            }
        };

        tracing::info!(path = %path.display(), fts, "Index opened");

        Ok(Self { pool, fts })
    }

    /// Whether full-text search is backed by FTS5.
    pub fn fts_enabled(&self) -> bool {
        self.fts
    }

    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Checkpoint the WAL and close the pool.
    pub async fn close(&self) {
        if let Err(e) = sqlx::query("PRAGMA wal_checkpoint(TRUNCATE)")
            .execute(&self.pool)
            .await
        {
            tracing::debug!(error = %e, "WAL checkpoint on close failed");
        }
        self.pool.close().await;
    }
}
