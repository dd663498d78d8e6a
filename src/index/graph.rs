//! Link graph and backlink queries

use sqlx::Row;

use super::{Index, IndexError};

/// A node in the knowledge graph. Unresolved link targets appear as nodes
/// with an empty title.
#[derive(Debug, Clone, serde::Serialize)]
pub struct GraphNode {
    pub id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub title: String,
}

/// A directed edge between two notes.
#[derive(Debug, Clone, serde::Serialize)]
pub struct GraphEdge {
    pub source: String,
    pub target: String,
    pub kind: String,
}

impl Index {
    /// The full graph: every indexed note plus every link target (resolved
    /// or not) as nodes, and every stored link as an edge.
    pub async fn graph(&self) -> Result<(Vec<GraphNode>, Vec<GraphEdge>), IndexError> {
        let mut nodes: Vec<GraphNode> = sqlx::query("SELECT path, title FROM notes ORDER BY path")
            .fetch_all(self.pool())
            .await?
            .into_iter()
            .map(|r| GraphNode {
                id: r.get(0),
                title: r.get(1),
            })
            .collect();

        let unresolved: Vec<(String,)> = sqlx::query_as(
            "SELECT DISTINCT target FROM links
             WHERE target NOT IN (SELECT path FROM notes)
             ORDER BY target",
        )
        .fetch_all(self.pool())
        .await?;
        nodes.extend(unresolved.into_iter().map(|(id,)| GraphNode {
            id,
            title: String::new(),
        }));

        let edges = sqlx::query("SELECT source, target, kind FROM links ORDER BY source, target")
            .fetch_all(self.pool())
            .await?
            .into_iter()
            .map(|r| GraphEdge {
                source: r.get(0),
                target: r.get(1),
                kind: r.get(2),
            })
            .collect();

        Ok((nodes, edges))
    }

    /// All note paths whose outgoing links point at `target`. The target is
    /// matched against the raw stored form (wikilink token or full path).
    pub async fn backlinks(&self, target: &str) -> Result<Vec<String>, IndexError> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT source FROM links WHERE target = ?1 ORDER BY source")
                .bind(target)
                .fetch_all(self.pool())
                .await?;
        Ok(rows.into_iter().map(|(s,)| s).collect())
    }
}
