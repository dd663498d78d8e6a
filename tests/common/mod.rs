//! Common test fixtures and helpers
//!
//! Usage in test files:
//! ```ignore
//! mod common;
//! use common::TestService;
//! ```

use std::sync::Arc;

use tempfile::TempDir;

use kenaz::index::Index;
use kenaz::service::NoteService;
use kenaz::vault::Vault;

/// Vault + index + service rooted in a temp directory that lives as long as
/// the fixture.
pub struct TestService {
    pub vault: Arc<Vault>,
    pub index: Arc<Index>,
    pub service: NoteService,
    /// Temp directory (kept alive to prevent cleanup)
    pub dir: TempDir,
}

impl TestService {
    pub async fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let vault_dir = dir.path().join("vault");
        std::fs::create_dir_all(&vault_dir).expect("Failed to create vault dir");

        let vault = Arc::new(Vault::open(&vault_dir).expect("Failed to open vault"));
        let index = Arc::new(
            Index::open(&dir.path().join("index.db"))
                .await
                .expect("Failed to open index"),
        );
        let service = NoteService::new(Arc::clone(&vault), Arc::clone(&index));

        Self {
            vault,
            index,
            service,
            dir,
        }
    }
}

/// An index alone, for store-level tests.
pub struct TestIndex {
    pub index: Index,
    _dir: TempDir,
}

impl TestIndex {
    pub async fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let index = Index::open(&dir.path().join("index.db"))
            .await
            .expect("Failed to open index");
        Self { index, _dir: dir }
    }
}

impl std::ops::Deref for TestIndex {
    type Target = Index;

    fn deref(&self) -> &Self::Target {
        &self.index
    }
}

/// Build a note row with sensible defaults for index tests.
pub fn test_row(path: &str, title: &str, tags: &[&str]) -> kenaz::index::NoteRow {
    kenaz::index::NoteRow {
        path: path.to_string(),
        title: title.to_string(),
        checksum: kenaz::checksum(path.as_bytes()),
        tags: tags.iter().map(|t| t.to_string()).collect(),
        updated_at: 1_700_000_000,
        size: 0,
    }
}
