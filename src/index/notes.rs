//! Note row transactions and lookups

use std::collections::HashMap;

use sqlx::Row;

use super::{Index, IndexError};

/// A row in the `notes` table.
#[derive(Debug, Clone)]
pub struct NoteRow {
    pub path: String,
    pub title: String,
    pub checksum: String,
    pub tags: Vec<String>,
    /// File mtime observed when the row was written, unix seconds.
    pub updated_at: i64,
    /// Raw file size observed when the row was written.
    pub size: i64,
}

/// Per-row freshness metadata used by the reconciler's change proxy.
#[derive(Debug, Clone)]
pub struct IndexedMeta {
    pub checksum: String,
    pub updated_at: i64,
    pub size: i64,
}

impl Index {
    /// Insert or replace a note, its FTS entry, and its outgoing links in one
    /// transaction. Any statement error aborts the whole transaction.
    pub async fn upsert_note(
        &self,
        row: &NoteRow,
        body: &str,
        links: &[String],
    ) -> Result<(), IndexError> {
        let tags_json = serde_json::to_string(&row.tags).unwrap_or_else(|_| "[]".into());

        let mut tx = self.pool().begin().await?;

        sqlx::query(
            "INSERT INTO notes (path, title, checksum, tags, body, updated_at, size)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(path) DO UPDATE SET
                 title      = excluded.title,
                 checksum   = excluded.checksum,
                 tags       = excluded.tags,
                 body       = excluded.body,
                 updated_at = excluded.updated_at,
                 size       = excluded.size",
        )
        .bind(&row.path)
        .bind(&row.title)
        .bind(&row.checksum)
        .bind(&tags_json)
        .bind(body)
        .bind(row.updated_at)
        .bind(row.size)
        .execute(&mut *tx)
        .await?;

        if self.fts_enabled() {
            sqlx::query("DELETE FROM files_fts WHERE path = ?1")
                .bind(&row.path)
                .execute(&mut *tx)
                .await?;
            sqlx::query("INSERT INTO files_fts (path, title, body, tags) VALUES (?1, ?2, ?3, ?4)")
                .bind(&row.path)
                .bind(&row.title)
                .bind(body)
                .bind(row.tags.join(" "))
                .execute(&mut *tx)
                .await?;
        }

        sqlx::query("DELETE FROM links WHERE source = ?1")
            .bind(&row.path)
            .execute(&mut *tx)
            .await?;
        for target in links {
            sqlx::query(
                "INSERT OR IGNORE INTO links (source, target, kind) VALUES (?1, ?2, 'inline')",
            )
            .bind(&row.path)
            .bind(target)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Remove a note, its FTS entry, and its outgoing links. Idempotent:
    /// deleting an unindexed path succeeds.
    pub async fn delete_note(&self, path: &str) -> Result<(), IndexError> {
        let mut tx = self.pool().begin().await?;

        if self.fts_enabled() {
            sqlx::query("DELETE FROM files_fts WHERE path = ?1")
                .bind(path)
                .execute(&mut *tx)
                .await?;
        }
        sqlx::query("DELETE FROM links WHERE source = ?1")
            .bind(path)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM notes WHERE path = ?1")
            .bind(path)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Refresh only the stored stat observation for a path whose content is
    /// unchanged, so later reconciliation sweeps can fast-path it.
    pub async fn touch_meta(&self, path: &str, mtime: i64, size: i64) -> Result<(), IndexError> {
        sqlx::query("UPDATE notes SET updated_at = ?2, size = ?3 WHERE path = ?1")
            .bind(path)
            .bind(mtime)
            .bind(size)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Stored checksum for a note, `None` when the path is not indexed.
    pub async fn get_checksum(&self, path: &str) -> Result<Option<String>, IndexError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT checksum FROM notes WHERE path = ?1")
                .bind(path)
                .fetch_optional(self.pool())
                .await?;
        Ok(row.map(|(cs,)| cs))
    }

    /// Full note row, `None` when absent (absence is not an error).
    pub async fn get_note(&self, path: &str) -> Result<Option<NoteRow>, IndexError> {
        let row = sqlx::query(
            "SELECT path, title, checksum, tags, updated_at, size FROM notes WHERE path = ?1",
        )
        .bind(path)
        .fetch_optional(self.pool())
        .await?;

        Ok(row.map(|r| row_from_sql(&r)))
    }

    /// Every indexed path mapped to its checksum, in one query.
    pub async fn all_checksums(&self) -> Result<HashMap<String, String>, IndexError> {
        let rows: Vec<(String, String)> = sqlx::query_as("SELECT path, checksum FROM notes")
            .fetch_all(self.pool())
            .await?;
        Ok(rows.into_iter().collect())
    }

    /// Every indexed path with its freshness metadata, in one query. Used by
    /// the reconciler so the sweep costs O(1) index queries.
    pub async fn all_meta(&self) -> Result<HashMap<String, IndexedMeta>, IndexError> {
        let rows: Vec<(String, String, i64, i64)> =
            sqlx::query_as("SELECT path, checksum, updated_at, size FROM notes")
                .fetch_all(self.pool())
                .await?;
        Ok(rows
            .into_iter()
            .map(|(path, checksum, updated_at, size)| {
                (
                    path,
                    IndexedMeta {
                        checksum,
                        updated_at,
                        size,
                    },
                )
            })
            .collect())
    }

    /// Paginated note listing with optional tag filter.
    ///
    /// `sort` is one of `updated_at` (default, newest first), `title`, `path`.
    /// The tag filter is array membership over the stored JSON tags, not a
    /// substring match on the serialized form.
    pub async fn list_notes(
        &self,
        limit: i64,
        offset: i64,
        tag: Option<&str>,
        sort: &str,
    ) -> Result<(Vec<NoteRow>, i64), IndexError> {
        let limit = if limit <= 0 { 50 } else { limit };
        let offset = offset.max(0);
        let order = match sort {
            "title" => "title ASC",
            "path" => "path ASC",
            _ => "updated_at DESC",
        };

        let filter = match tag {
            Some(_) => {
                " WHERE EXISTS (SELECT 1 FROM json_each(notes.tags) WHERE json_each.value = ?1)"
            }
            None => "",
        };

        let list_sql = format!(
            "SELECT path, title, checksum, tags, updated_at, size FROM notes{filter} \
             ORDER BY {order} LIMIT ?{} OFFSET ?{}",
            if tag.is_some() { 2 } else { 1 },
            if tag.is_some() { 3 } else { 2 },
        );
        let count_sql = format!("SELECT COUNT(*) FROM notes{filter}");

        let mut list_query = sqlx::query(&list_sql);
        let mut count_query = sqlx::query_as::<_, (i64,)>(&count_sql);
        if let Some(t) = tag {
            list_query = list_query.bind(t);
            count_query = count_query.bind(t);
        }
        let rows = list_query
            .bind(limit)
            .bind(offset)
            .fetch_all(self.pool())
            .await?;
        let (total,) = count_query.fetch_one(self.pool()).await?;

        Ok((rows.iter().map(row_from_sql).collect(), total))
    }
}

fn row_from_sql(r: &sqlx::sqlite::SqliteRow) -> NoteRow {
    let tags_json: String = r.get("tags");
    NoteRow {
        path: r.get("path"),
        title: r.get("title"),
        checksum: r.get("checksum"),
        tags: serde_json::from_str(&tags_json).unwrap_or_default(),
        updated_at: r.get("updated_at"),
        size: r.get("size"),
    }
}
