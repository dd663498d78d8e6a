//! Index integration tests: schema, transactions, queries

mod common;

use common::{test_row, TestIndex};

#[tokio::test]
async fn test_upsert_and_get() {
    let idx = TestIndex::new().await;

    let row = test_row("hello.md", "Hello World", &["go", "test"]);
    idx.upsert_note(&row, "This is a hello world note.", &["other.md".into()])
        .await
        .unwrap();

    let fetched = idx.get_note("hello.md").await.unwrap().expect("row");
    assert_eq!(fetched.title, "Hello World");
    assert_eq!(fetched.tags, vec!["go", "test"]);
    assert_eq!(fetched.checksum, row.checksum);

    assert!(idx.get_note("missing.md").await.unwrap().is_none());
    assert!(idx.get_checksum("missing.md").await.unwrap().is_none());
}

#[tokio::test]
async fn test_upsert_replaces_links() {
    let idx = TestIndex::new().await;

    let row = test_row("a.md", "A", &[]);
    idx.upsert_note(&row, "body", &["x".into(), "y".into()])
        .await
        .unwrap();
    idx.upsert_note(&row, "body", &["y".into()]).await.unwrap();

    assert!(idx.backlinks("x").await.unwrap().is_empty());
    assert_eq!(idx.backlinks("y").await.unwrap(), vec!["a.md"]);
}

#[tokio::test]
async fn test_duplicate_links_ignored() {
    let idx = TestIndex::new().await;
    let row = test_row("a.md", "A", &[]);
    idx.upsert_note(&row, "body", &["t".into(), "t".into()])
        .await
        .unwrap();
    assert_eq!(idx.backlinks("t").await.unwrap(), vec!["a.md"]);
}

#[tokio::test]
async fn test_search_fts() {
    let idx = TestIndex::new().await;
    assert!(idx.fts_enabled(), "bundled SQLite should have FTS5");

    let row = test_row("hello.md", "Hello World", &["kb"]);
    idx.upsert_note(&row, "a note about reconciliation engines", &[])
        .await
        .unwrap();

    let hits = idx.search("reconciliation", 10).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].path, "hello.md");
    assert!(hits[0].snippet.contains("<b>reconciliation</b>"));

    // Title terms match too.
    let hits = idx.search("World", 10).await.unwrap();
    assert_eq!(hits.len(), 1);
}

#[tokio::test]
async fn test_search_unicode_case_folding() {
    let idx = TestIndex::new().await;
    let row = test_row("ru.md", "Заметка", &[]);
    idx.upsert_note(&row, "текст про Кенас и руны", &[])
        .await
        .unwrap();

    // Lowercase query must match the capitalized body token.
    let hits = idx.search("кенас", 10).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].path, "ru.md");
}

#[tokio::test]
async fn test_search_diacritics_stripped() {
    let idx = TestIndex::new().await;
    let row = test_row("fr.md", "Café", &[]);
    idx.upsert_note(&row, "un café très fort", &[]).await.unwrap();

    let hits = idx.search("cafe", 10).await.unwrap();
    assert_eq!(hits.len(), 1);
}

#[tokio::test]
async fn test_delete_is_idempotent() {
    let idx = TestIndex::new().await;
    let row = test_row("a.md", "A", &[]);
    idx.upsert_note(&row, "body", &["b".into()]).await.unwrap();

    idx.delete_note("a.md").await.unwrap();
    assert!(idx.get_note("a.md").await.unwrap().is_none());
    assert!(idx.backlinks("b").await.unwrap().is_empty());
    assert!(idx.search("body", 10).await.unwrap().is_empty());

    // Second delete of the same path succeeds.
    idx.delete_note("a.md").await.unwrap();
}

#[tokio::test]
async fn test_tag_filter_is_membership_not_substring() {
    let idx = TestIndex::new().await;
    idx.upsert_note(&test_row("a.md", "A", &["rust"]), "a", &[])
        .await
        .unwrap();
    idx.upsert_note(&test_row("b.md", "B", &["rustacean"]), "b", &[])
        .await
        .unwrap();

    let (rows, total) = idx.list_notes(50, 0, Some("rust"), "path").await.unwrap();
    assert_eq!(total, 1);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].path, "a.md");

    // A tag that is only a substring of a stored tag matches nothing.
    let (rows, total) = idx.list_notes(50, 0, Some("rusta"), "path").await.unwrap();
    assert_eq!(total, 0);
    assert!(rows.is_empty());
}

#[tokio::test]
async fn test_list_sort_orders() {
    let idx = TestIndex::new().await;
    let mut old = test_row("b.md", "Beta", &[]);
    old.updated_at = 100;
    let mut new = test_row("a.md", "Alpha", &[]);
    new.updated_at = 200;
    idx.upsert_note(&old, "", &[]).await.unwrap();
    idx.upsert_note(&new, "", &[]).await.unwrap();

    let (rows, _) = idx.list_notes(50, 0, None, "").await.unwrap();
    assert_eq!(rows[0].path, "a.md", "default is newest first");

    let (rows, _) = idx.list_notes(50, 0, None, "title").await.unwrap();
    assert_eq!(rows[0].title, "Alpha");

    let (rows, _) = idx.list_notes(50, 0, None, "path").await.unwrap();
    assert_eq!(rows[0].path, "a.md");
}

#[tokio::test]
async fn test_list_pagination() {
    let idx = TestIndex::new().await;
    for i in 0..5 {
        idx.upsert_note(&test_row(&format!("n{i}.md"), "N", &[]), "", &[])
            .await
            .unwrap();
    }

    let (rows, total) = idx.list_notes(2, 0, None, "path").await.unwrap();
    assert_eq!(total, 5);
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].path, "n0.md");

    let (rows, _) = idx.list_notes(2, 4, None, "path").await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].path, "n4.md");
}

#[tokio::test]
async fn test_graph_includes_unresolved_targets() {
    let idx = TestIndex::new().await;
    idx.upsert_note(&test_row("a.md", "A", &[]), "", &["b.md".into(), "ghost".into()])
        .await
        .unwrap();
    idx.upsert_note(&test_row("b.md", "B", &[]), "", &[])
        .await
        .unwrap();

    let (nodes, edges) = idx.graph().await.unwrap();
    let ids: Vec<_> = nodes.iter().map(|n| n.id.as_str()).collect();
    assert_eq!(ids, vec!["a.md", "b.md", "ghost"]);

    let ghost = nodes.iter().find(|n| n.id == "ghost").unwrap();
    assert!(ghost.title.is_empty());

    assert_eq!(edges.len(), 2);
    assert!(edges.iter().all(|e| e.source == "a.md" && e.kind == "inline"));
}

#[tokio::test]
async fn test_all_checksums_and_meta() {
    let idx = TestIndex::new().await;
    idx.upsert_note(&test_row("a.md", "A", &[]), "", &[])
        .await
        .unwrap();
    idx.upsert_note(&test_row("b.md", "B", &[]), "", &[])
        .await
        .unwrap();

    let checksums = idx.all_checksums().await.unwrap();
    assert_eq!(checksums.len(), 2);
    assert!(checksums.contains_key("a.md"));

    let meta = idx.all_meta().await.unwrap();
    assert_eq!(meta.len(), 2);
    assert_eq!(meta["a.md"].checksum, checksums["a.md"]);
    assert_eq!(meta["a.md"].updated_at, 1_700_000_000);
}

#[tokio::test]
async fn test_stats_counts() {
    let idx = TestIndex::new().await;
    idx.upsert_note(
        &test_row("a.md", "A", &["x", "y"]),
        "",
        &["b.md".into(), "ghost".into()],
    )
    .await
    .unwrap();
    idx.upsert_note(&test_row("b.md", "B", &["x"]), "", &[])
        .await
        .unwrap();

    let stats = idx.stats().await.unwrap();
    assert_eq!(stats.notes, 2);
    assert_eq!(stats.links, 2);
    assert_eq!(stats.unresolved_links, 1);
    assert_eq!(stats.tags, 2);
    assert!(stats.fts_enabled);
}

#[tokio::test]
async fn test_reopen_preserves_rows() {
    let dir = tempfile::TempDir::new().unwrap();
    let db = dir.path().join("index.db");

    {
        let idx = kenaz::Index::open(&db).await.unwrap();
        idx.upsert_note(&test_row("a.md", "A", &[]), "persist me", &[])
            .await
            .unwrap();
        idx.close().await;
    }

    let idx = kenaz::Index::open(&db).await.unwrap();
    assert!(idx.get_note("a.md").await.unwrap().is_some());
    let hits = idx.search("persist", 10).await.unwrap();
    assert_eq!(hits.len(), 1);
}
