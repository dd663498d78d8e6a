//! Index statistics

use sqlx::Row;

use super::{Index, IndexError};

/// Aggregate counts over the index.
#[derive(Debug, Clone, serde::Serialize)]
pub struct IndexStats {
    pub notes: i64,
    pub links: i64,
    /// Link targets with no matching note row.
    pub unresolved_links: i64,
    pub tags: i64,
    pub fts_enabled: bool,
}

impl Index {
    /// Count notes, link edges, unresolved targets, and distinct tags.
    pub async fn stats(&self) -> Result<IndexStats, IndexError> {
        let (notes,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM notes")
            .fetch_one(self.pool())
            .await?;
        let (links,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM links")
            .fetch_one(self.pool())
            .await?;
        let (unresolved_links,): (i64,) = sqlx::query_as(
            "SELECT COUNT(DISTINCT target) FROM links
             WHERE target NOT IN (SELECT path FROM notes)",
        )
        .fetch_one(self.pool())
        .await?;
        let tags = sqlx::query("SELECT COUNT(DISTINCT value) FROM notes, json_each(notes.tags)")
            .fetch_one(self.pool())
            .await?
            .get::<i64, _>(0);

        Ok(IndexStats {
            notes,
            links,
            unresolved_links,
            tags,
            fts_enabled: self.fts_enabled(),
        })
    }
}
