//! Full-text search: FTS5 when available, LIKE fallback otherwise

use sqlx::Row;

use super::{Index, IndexError};

/// One search hit.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SearchHit {
    pub path: String,
    pub title: String,
    pub snippet: String,
}

impl Index {
    /// Search titles, bodies, and tags.
    ///
    /// With FTS5 the query uses the engine's match grammar and snippets come
    /// back with `<b>…</b>` highlights over a ~64 token window. The fallback
    /// is a case-insensitive substring match whose snippet is the first 200
    /// bytes of the body.
    pub async fn search(&self, query: &str, limit: i64) -> Result<Vec<SearchHit>, IndexError> {
        let limit = if limit <= 0 { 20 } else { limit };
        if self.fts_enabled() {
            self.search_fts(query, limit).await
        } else {
            self.search_like(query, limit).await
        }
    }

    async fn search_fts(&self, query: &str, limit: i64) -> Result<Vec<SearchHit>, IndexError> {
        let rows = sqlx::query(
            "SELECT path,
                    title,
                    snippet(files_fts, 2, '<b>', '</b>', '...', 64)
             FROM files_fts
             WHERE files_fts MATCH ?1
             ORDER BY rank
             LIMIT ?2",
        )
        .bind(query)
        .bind(limit)
        .fetch_all(self.pool())
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| SearchHit {
                path: r.get(0),
                title: r.get(1),
                snippet: r.get(2),
            })
            .collect())
    }

    async fn search_like(&self, query: &str, limit: i64) -> Result<Vec<SearchHit>, IndexError> {
        let like = format!("%{}%", query);
        let rows = sqlx::query(
            "SELECT path, title, substr(body, 1, 200)
             FROM notes
             WHERE title LIKE ?1 OR body LIKE ?1 OR tags LIKE ?1
             LIMIT ?2",
        )
        .bind(&like)
        .bind(limit)
        .fetch_all(self.pool())
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| SearchHit {
                path: r.get(0),
                title: r.get(1),
                snippet: r.get(2),
            })
            .collect())
    }
}
