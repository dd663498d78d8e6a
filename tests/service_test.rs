//! NoteService integration tests: CRUD, optimistic concurrency, backlinks

mod common;

use common::TestService;
use kenaz::{checksum, ServiceError};

#[tokio::test]
async fn test_create_and_get_roundtrip() {
    let t = TestService::new().await;

    let created = t
        .service
        .create_note("hello.md", b"# Hello\nworld")
        .await
        .unwrap();
    assert_eq!(created.title, "Hello");
    assert!(created.tags.is_empty());

    let note = t.service.get_note("hello.md").await.unwrap();
    assert_eq!(note.content, "# Hello\nworld");
    assert_eq!(note.checksum, checksum(b"# Hello\nworld"));
    assert_eq!(note.title, "Hello");

    // Search sees it through the index.
    let hits = t.service.search("world", 10).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].path, "hello.md");
}

#[tokio::test]
async fn test_create_existing_fails() {
    let t = TestService::new().await;
    t.service.create_note("a.md", b"one").await.unwrap();
    let err = t.service.create_note("a.md", b"two").await.unwrap_err();
    assert!(matches!(err, ServiceError::AlreadyExists));
    // Original content untouched.
    assert_eq!(t.service.get_note("a.md").await.unwrap().content, "one");
}

#[tokio::test]
async fn test_get_missing_is_not_found() {
    let t = TestService::new().await;
    assert!(matches!(
        t.service.get_note("nope.md").await.unwrap_err(),
        ServiceError::NotFound
    ));
}

#[tokio::test]
async fn test_update_optimistic_conflict() {
    let t = TestService::new().await;

    let v1 = t.service.create_note("lock.md", b"v1").await.unwrap();
    let c = v1.checksum.clone();

    // Matching checksum succeeds.
    let v2 = t
        .service
        .update_note("lock.md", b"v2", Some(&c))
        .await
        .unwrap();
    assert_ne!(v2.checksum, c);

    // Stale checksum conflicts; disk keeps v2.
    let err = t
        .service
        .update_note("lock.md", b"v3", Some(&c))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Conflict));
    assert_eq!(t.service.get_note("lock.md").await.unwrap().content, "v2");

    // Empty if-match skips the guard.
    let v3 = t.service.update_note("lock.md", b"v3", Some("")).await.unwrap();
    assert_eq!(v3.content, "v3");
}

#[tokio::test]
async fn test_update_same_content_is_idempotent() {
    let t = TestService::new().await;
    t.service.create_note("a.md", b"same").await.unwrap();
    let first = t.service.update_note("a.md", b"same", None).await.unwrap();
    let second = t
        .service
        .update_note("a.md", b"same", Some(&first.checksum))
        .await
        .unwrap();
    assert_eq!(first.checksum, second.checksum);
}

#[tokio::test]
async fn test_update_missing_is_not_found() {
    let t = TestService::new().await;
    assert!(matches!(
        t.service.update_note("nope.md", b"x", None).await.unwrap_err(),
        ServiceError::NotFound
    ));
}

#[tokio::test]
async fn test_delete_twice_second_not_found() {
    let t = TestService::new().await;
    t.service.create_note("a.md", b"x").await.unwrap();
    t.service.delete_note("a.md").await.unwrap();
    assert!(matches!(
        t.service.delete_note("a.md").await.unwrap_err(),
        ServiceError::NotFound
    ));
}

#[tokio::test]
async fn test_backlinks_follow_wikilinks() {
    let t = TestService::new().await;
    t.service
        .create_note("a.md", b"links to [[b]]")
        .await
        .unwrap();

    assert_eq!(t.service.backlinks("b").await.unwrap(), vec!["a.md"]);

    t.service.delete_note("a.md").await.unwrap();
    assert!(t.service.backlinks("b").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_traversal_rejected_at_service_level() {
    let t = TestService::new().await;
    for bad in ["../x.md", "/etc/passwd", "a/../../x.md", "./sub/../../x.md"] {
        assert!(
            matches!(
                t.service.create_note(bad, b"x").await.unwrap_err(),
                ServiceError::PermissionDenied
            ),
            "create({bad}) should be rejected"
        );
        assert!(matches!(
            t.service.get_note(bad).await.unwrap_err(),
            ServiceError::PermissionDenied
        ));
        assert!(matches!(
            t.service.delete_note(bad).await.unwrap_err(),
            ServiceError::PermissionDenied
        ));
    }
}

#[tokio::test]
async fn test_frontmatter_surfaces_in_detail() {
    let t = TestService::new().await;
    let note = t
        .service
        .create_note(
            "fm.md",
            b"---\ntitle: Typed\ntags: [x, y]\n---\nbody #z",
        )
        .await
        .unwrap();
    assert_eq!(note.title, "Typed");
    assert_eq!(note.tags, vec!["x", "y", "z"]);
    let fm = note.frontmatter.expect("frontmatter");
    assert_eq!(fm["title"], "Typed");
}

#[tokio::test]
async fn test_list_reflects_index() {
    let t = TestService::new().await;
    t.service.create_note("a.md", b"#alpha a").await.unwrap();
    t.service.create_note("b.md", b"#beta b").await.unwrap();

    let (notes, total) = t.service.list_notes(50, 0, None, "path").await.unwrap();
    assert_eq!(total, 2);
    assert_eq!(notes[0].path, "a.md");

    let (notes, total) = t
        .service
        .list_notes(50, 0, Some("beta"), "path")
        .await
        .unwrap();
    assert_eq!(total, 1);
    assert_eq!(notes[0].path, "b.md");
}
