//! Watcher integration tests: external edits, deletes, renames
//!
//! These drive a real notify watcher over a temp vault, so assertions poll
//! with generous deadlines instead of assuming delivery latency.

mod common;

use std::time::Duration;

use common::TestService;
use kenaz::broker::Broker;
use kenaz::{reconcile, watch};
use tokio::sync::watch as watch_channel;

const DEADLINE: Duration = Duration::from_secs(5);
const POLL: Duration = Duration::from_millis(50);

struct WatchFixture {
    t: TestService,
    broker: Broker,
    shutdown: watch_channel::Sender<bool>,
    handle: tokio::task::JoinHandle<anyhow::Result<()>>,
}

impl WatchFixture {
    async fn new() -> Self {
        let t = TestService::new().await;
        let broker = Broker::new(Duration::from_secs(60));
        let (shutdown, rx) = watch_channel::channel(false);
        let handle = tokio::spawn(watch::run(
            t.vault.clone(),
            t.index.clone(),
            broker.clone(),
            rx,
        ));
        // Give the watcher a moment to register its watches.
        tokio::time::sleep(Duration::from_millis(200)).await;
        Self {
            t,
            broker,
            shutdown,
            handle,
        }
    }

    async fn stop(self) {
        let _ = self.shutdown.send(true);
        let _ = self.handle.await;
    }

    /// Poll until the stored checksum for `path` satisfies `pred`.
    async fn wait_checksum<F>(&self, path: &str, pred: F) -> bool
    where
        F: Fn(Option<&str>) -> bool,
    {
        let deadline = tokio::time::Instant::now() + DEADLINE;
        loop {
            let cs = self.t.index.get_checksum(path).await.unwrap();
            if pred(cs.as_deref()) {
                return true;
            }
            if tokio::time::Instant::now() > deadline {
                return false;
            }
            tokio::time::sleep(POLL).await;
        }
    }
}

/// Collect event names seen by a subscription until it goes quiet.
async fn drain_events(sub: &mut kenaz::broker::Subscription) -> Vec<String> {
    let mut out = Vec::new();
    while let Ok(Some(frame)) = tokio::time::timeout(Duration::from_millis(500), sub.recv()).await
    {
        let text = String::from_utf8_lossy(&frame).into_owned();
        out.push(text);
    }
    out
}

#[tokio::test]
async fn test_external_create_is_indexed_and_published() {
    let f = WatchFixture::new().await;
    let mut sub = f.broker.subscribe().await;

    std::fs::write(f.t.vault.root().join("x.md"), b"# X\nbody").unwrap();

    assert!(
        f.wait_checksum("x.md", |cs| cs.is_some()).await,
        "x.md never showed up in the index"
    );

    let events = drain_events(&mut sub).await;
    assert!(
        events.iter().any(|e| e.contains("note.created") && e.contains("x.md")),
        "no note.created for x.md in {events:?}"
    );

    f.stop().await;
}

#[tokio::test]
async fn test_external_edit_updates_checksum() {
    let f = WatchFixture::new().await;

    f.t.vault.write("notes/x.md", b"before").unwrap();
    assert!(f.wait_checksum("notes/x.md", |cs| cs.is_some()).await);

    let mut sub = f.broker.subscribe().await;
    let old = f.t.index.get_checksum("notes/x.md").await.unwrap().unwrap();

    // Append like an external editor would.
    let path = f.t.vault.root().join("notes/x.md");
    let mut content = std::fs::read(&path).unwrap();
    content.extend_from_slice(b"\nafter");
    std::fs::write(&path, &content).unwrap();

    assert!(
        f.wait_checksum("notes/x.md", |cs| cs.is_some() && cs != Some(old.as_str()))
            .await,
        "checksum never changed after external edit"
    );

    let events = drain_events(&mut sub).await;
    assert!(
        events.iter().any(|e| e.contains("note.updated") || e.contains("note.created")),
        "no update event in {events:?}"
    );

    f.stop().await;
}

#[tokio::test]
async fn test_external_delete_removes_row() {
    let f = WatchFixture::new().await;

    f.t.vault.write("gone.md", b"bye").unwrap();
    assert!(f.wait_checksum("gone.md", |cs| cs.is_some()).await);

    let mut sub = f.broker.subscribe().await;
    std::fs::remove_file(f.t.vault.root().join("gone.md")).unwrap();

    assert!(
        f.wait_checksum("gone.md", |cs| cs.is_none()).await,
        "row for gone.md never removed"
    );
    let events = drain_events(&mut sub).await;
    assert!(events.iter().any(|e| e.contains("note.deleted")));

    f.stop().await;
}

#[tokio::test]
async fn test_rename_reconciles_both_paths() {
    let f = WatchFixture::new().await;

    f.t.vault.write("old.md", b"# Renamed").unwrap();
    assert!(f.wait_checksum("old.md", |cs| cs.is_some()).await);

    let mut sub = f.broker.subscribe().await;
    std::fs::rename(
        f.t.vault.root().join("old.md"),
        f.t.vault.root().join("new.md"),
    )
    .unwrap();

    assert!(
        f.wait_checksum("new.md", |cs| cs.is_some()).await,
        "new.md never indexed after rename"
    );
    assert!(
        f.wait_checksum("old.md", |cs| cs.is_none()).await,
        "old.md still indexed after rename"
    );

    let events = drain_events(&mut sub).await;
    assert!(
        events.iter().any(|e| e.contains("note.deleted") && e.contains("old.md")),
        "no deletion for old.md in {events:?}"
    );
    assert!(
        events.iter().any(|e| e.contains("note.created") && e.contains("new.md")),
        "no creation for new.md in {events:?}"
    );

    f.stop().await;
}

#[tokio::test]
async fn test_new_directory_contents_indexed() {
    let f = WatchFixture::new().await;

    let sub_dir = f.t.vault.root().join("fresh");
    std::fs::create_dir(&sub_dir).unwrap();
    std::fs::write(sub_dir.join("inside.md"), b"# Inside").unwrap();

    assert!(
        f.wait_checksum("fresh/inside.md", |cs| cs.is_some()).await,
        "file in new directory never indexed"
    );

    f.stop().await;
}

#[tokio::test]
async fn test_non_markdown_ignored() {
    let f = WatchFixture::new().await;

    std::fs::write(f.t.vault.root().join("ignore.txt"), b"nope").unwrap();
    f.t.vault.write("real.md", b"yes").unwrap();
    assert!(f.wait_checksum("real.md", |cs| cs.is_some()).await);

    assert!(f
        .t
        .index
        .get_checksum("ignore.txt")
        .await
        .unwrap()
        .is_none());

    f.stop().await;
}

#[tokio::test]
async fn test_watcher_consistent_with_startup_sync() {
    // Files created while no watcher runs are picked up by the sweep; files
    // created afterwards by the watcher. Both end in the same state.
    let t = TestService::new().await;
    t.vault.write("before.md", b"pre-existing").unwrap();
    reconcile::sync(&t.vault, &t.index).await.unwrap();

    let broker = Broker::new(Duration::from_secs(60));
    let (shutdown, rx) = watch_channel::channel(false);
    let handle = tokio::spawn(watch::run(
        t.vault.clone(),
        t.index.clone(),
        broker.clone(),
        rx,
    ));
    tokio::time::sleep(Duration::from_millis(200)).await;

    t.vault.write("after.md", b"live").unwrap();

    let deadline = tokio::time::Instant::now() + DEADLINE;
    loop {
        let checksums = t.index.all_checksums().await.unwrap();
        if checksums.len() == 2 {
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "index never saw both notes: {checksums:?}"
        );
        tokio::time::sleep(POLL).await;
    }

    let _ = shutdown.send(true);
    let _ = handle.await;
}
