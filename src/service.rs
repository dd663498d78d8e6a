//! NoteService: coordinates vault and index for note operations
//!
//! The vault is authoritative; the index is updated best-effort after each
//! write (file first, index second). The watcher and reconciler close any
//! gap this ordering leaves.

use std::io::ErrorKind;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::index::{GraphEdge, GraphNode, Index, IndexError, NoteRow, SearchHit};
use crate::parser;
use crate::vault::{checksum, Vault, VaultError};

/// Error taxonomy surfaced at the transport boundary. Kinds are matched by
/// variant, never by message text.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("not found")]
    NotFound,
    #[error("already exists")]
    AlreadyExists,
    #[error("checksum mismatch")]
    Conflict,
    #[error("invalid request: {0}")]
    Invalid(String),
    #[error("path escapes vault root")]
    PermissionDenied,
    #[error("temporarily unavailable: {0}")]
    Transient(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<VaultError> for ServiceError {
    fn from(e: VaultError) -> Self {
        match e {
            VaultError::NotFound(_) => ServiceError::NotFound,
            VaultError::PathEscape(_) => ServiceError::PermissionDenied,
            VaultError::DestinationExists(_) => ServiceError::AlreadyExists,
            VaultError::Io(io) => match io.kind() {
                ErrorKind::NotFound => ServiceError::NotFound,
                ErrorKind::StorageFull | ErrorKind::Interrupted | ErrorKind::WouldBlock => {
                    ServiceError::Transient(io.to_string())
                }
                _ => ServiceError::Internal(io.to_string()),
            },
        }
    }
}

impl From<IndexError> for ServiceError {
    fn from(e: IndexError) -> Self {
        match &e {
            IndexError::Database(sqlx::Error::Database(db))
                if db.message().contains("locked") || db.message().contains("busy") =>
            {
                ServiceError::Transient(e.to_string())
            }
            _ => ServiceError::Internal(e.to_string()),
        }
    }
}

/// Full representation of a note as served to clients.
#[derive(Debug, Clone, Serialize)]
pub struct NoteDetail {
    pub path: String,
    pub title: String,
    pub content: String,
    pub checksum: String,
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frontmatter: Option<Map<String, Value>>,
    pub backlinks: Vec<String>,
    pub updated_at: DateTime<Utc>,
}

/// Lightweight item in a list response.
#[derive(Debug, Clone, Serialize)]
pub struct NoteListItem {
    pub path: String,
    pub title: String,
    pub checksum: String,
    pub tags: Vec<String>,
    pub updated_at: DateTime<Utc>,
}

impl From<NoteRow> for NoteListItem {
    fn from(r: NoteRow) -> Self {
        NoteListItem {
            path: r.path,
            title: r.title,
            checksum: r.checksum,
            tags: r.tags,
            updated_at: from_unix(r.updated_at),
        }
    }
}

fn from_unix(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}

/// Coordinates vault writes with index updates.
pub struct NoteService {
    vault: Arc<Vault>,
    index: Arc<Index>,
}

impl NoteService {
    pub fn new(vault: Arc<Vault>, index: Arc<Index>) -> Self {
        Self { vault, index }
    }

    pub fn vault(&self) -> &Vault {
        &self.vault
    }

    pub fn index(&self) -> &Index {
        &self.index
    }

    /// Read a note from the vault and enrich it with backlinks.
    pub async fn get_note(&self, path: &str) -> Result<NoteDetail, ServiceError> {
        let data = self.vault.read(path)?;
        let mtime = self.vault.mtime(path).unwrap_or(0);
        self.build_detail(path, &data, mtime).await
    }

    /// Create a new note: fails if the path is already taken, otherwise
    /// atomic write then index upsert.
    pub async fn create_note(&self, path: &str, content: &[u8]) -> Result<NoteDetail, ServiceError> {
        if path.is_empty() {
            return Err(ServiceError::Invalid("path is required".into()));
        }
        if self.vault.exists(path)? {
            return Err(ServiceError::AlreadyExists);
        }
        self.vault.write(path, content)?;
        self.index_file(path, content).await?;
        let mtime = self.vault.mtime(path).unwrap_or(0);
        self.build_detail(path, content, mtime).await
    }

    /// Replace a note's content, optionally guarded by the caller's last
    /// observed checksum. An empty `if_match` skips the guard.
    pub async fn update_note(
        &self,
        path: &str,
        content: &[u8],
        if_match: Option<&str>,
    ) -> Result<NoteDetail, ServiceError> {
        let existing = self.vault.read(path)?;
        if let Some(expected) = if_match.filter(|m| !m.is_empty()) {
            if expected != checksum(&existing) {
                return Err(ServiceError::Conflict);
            }
        }
        self.vault.write(path, content)?;
        self.index_file(path, content).await?;
        let mtime = self.vault.mtime(path).unwrap_or(0);
        self.build_detail(path, content, mtime).await
    }

    /// Delete from the vault, then from the index. The two deletes are not
    /// transactional; the watcher and reconciler restore consistency if the
    /// index delete fails.
    pub async fn delete_note(&self, path: &str) -> Result<(), ServiceError> {
        self.vault.delete(path)?;
        self.index.delete_note(path).await?;
        Ok(())
    }

    /// Paginated listing with optional tag filter.
    pub async fn list_notes(
        &self,
        limit: i64,
        offset: i64,
        tag: Option<&str>,
        sort: &str,
    ) -> Result<(Vec<NoteListItem>, i64), ServiceError> {
        let (rows, total) = self.index.list_notes(limit, offset, tag, sort).await?;
        Ok((rows.into_iter().map(NoteListItem::from).collect(), total))
    }

    /// Full-text search across the index.
    pub async fn search(&self, query: &str, limit: i64) -> Result<Vec<SearchHit>, ServiceError> {
        Ok(self.index.search(query, limit).await?)
    }

    /// Graph of all notes and link edges.
    pub async fn graph(&self) -> Result<(Vec<GraphNode>, Vec<GraphEdge>), ServiceError> {
        Ok(self.index.graph().await?)
    }

    /// Paths of notes linking to `target`.
    pub async fn backlinks(&self, target: &str) -> Result<Vec<String>, ServiceError> {
        Ok(self.index.backlinks(target).await?)
    }

    /// Parse raw bytes and upsert the result into the index. Shared by the
    /// write path, the watcher, and the reconciler.
    pub async fn index_file(&self, path: &str, data: &[u8]) -> Result<(), ServiceError> {
        let mtime = self.vault.mtime(path).unwrap_or_else(|_| Utc::now().timestamp());
        index_bytes(&self.index, path, data, mtime).await?;
        Ok(())
    }

    async fn build_detail(
        &self,
        path: &str,
        data: &[u8],
        mtime: i64,
    ) -> Result<NoteDetail, ServiceError> {
        let parsed = parser::parse(data);
        let backlinks = self.index.backlinks(path).await?;
        Ok(NoteDetail {
            path: path.to_string(),
            title: parsed.title,
            content: String::from_utf8_lossy(data).into_owned(),
            checksum: checksum(data),
            tags: parsed.tags,
            frontmatter: parsed.frontmatter,
            backlinks,
            updated_at: from_unix(mtime),
        })
    }
}

/// Parse `data` and upsert it under `path` with the given observed mtime.
pub async fn index_bytes(
    index: &Index,
    path: &str,
    data: &[u8],
    mtime: i64,
) -> Result<(), IndexError> {
    let parsed = parser::parse(data);
    let row = NoteRow {
        path: path.to_string(),
        title: parsed.title,
        checksum: checksum(data),
        tags: parsed.tags,
        updated_at: mtime,
        size: data.len() as i64,
    };
    index.upsert_note(&row, &parsed.body, &parsed.links).await
}
