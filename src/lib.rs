//! # kenaz - local-first Markdown knowledge base
//!
//! A vault of UTF-8 Markdown files is the authoritative store; kenaz keeps a
//! SQLite index (note metadata, link edges, full-text search) consistent
//! with it and streams live change events to SSE subscribers and LLM tool
//! callers.
//!
//! ## Architecture
//!
//! - [`parser`] - pure extraction of frontmatter, wikilinks, tags, titles
//! - [`vault`] - traversal-safe, atomic file I/O under the vault root
//! - [`index`] - SQLite-backed cache with transactional upserts and search
//! - [`service`] - note CRUD with optimistic checksum concurrency
//! - [`reconcile`] - startup sweep making the index match the vault
//! - [`watch`] - filesystem watcher for external edits and renames
//! - [`broker`] - single-task pub/sub fanning events out to subscribers
//! - [`api`] - axum REST + SSE transport
//! - [`mcp`] - JSON-RPC tool server over stdio
//!
//! The index is disposable: deleting the database file and restarting
//! rebuilds an equivalent state from the vault.

pub mod api;
pub mod broker;
pub mod config;
pub mod index;
pub mod mcp;
pub mod parser;
pub mod reconcile;
pub mod server;
pub mod service;
pub mod vault;
pub mod watch;

pub use broker::{Broker, NoteEventKind};
pub use config::Config;
pub use index::Index;
pub use parser::{parse, Parsed};
pub use service::{NoteDetail, NoteListItem, NoteService, ServiceError};
pub use vault::{checksum, Vault, VaultError};
