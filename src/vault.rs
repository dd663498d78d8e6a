//! Vault storage: traversal-safe, atomic file I/O rooted at a directory.
//!
//! The vault directory is the source of truth for all note content. Every
//! operation takes vault-relative, forward-slash paths and refuses anything
//! that would resolve outside the root, including through symlinks.

use std::fs;
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use std::time::UNIX_EPOCH;

use sha2::{Digest, Sha256};
use thiserror::Error;
use walkdir::WalkDir;

/// Prefix for in-flight atomic-write temp files. These are invisible to
/// `list` and cleaned up on any failed write.
pub const TMP_PREFIX: &str = ".kenaz-tmp-";

/// Subdirectory for uploaded attachments; shares the vault path rules.
pub const ATTACHMENTS_DIR: &str = "attachments";

#[derive(Error, Debug)]
pub enum VaultError {
    #[error("path escapes vault root: {0}")]
    PathEscape(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("destination already exists: {0}")]
    DestinationExists(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Hex-encoded SHA-256 digest of note content. The basis for optimistic
/// concurrency and index freshness checks.
pub fn checksum(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Lightweight metadata for a vault file, from a stat-only walk.
#[derive(Debug, Clone)]
pub struct FileMeta {
    /// Vault-relative path with forward slashes.
    pub path: String,
    /// Modification time, unix seconds.
    pub mtime: i64,
    /// File size in bytes.
    pub size: i64,
}

/// File-system vault rooted at a directory.
pub struct Vault {
    root: PathBuf,
}

impl Vault {
    /// Open a vault at an existing directory. The root is canonicalized so
    /// later symlink-escape checks have a fixed prefix to compare against.
    pub fn open(root: impl AsRef<Path>) -> Result<Self, VaultError> {
        let root = root.as_ref();
        let meta = fs::metadata(root)
            .map_err(|_| VaultError::NotFound(root.display().to_string()))?;
        if !meta.is_dir() {
            return Err(VaultError::PathEscape(format!(
                "vault root is not a directory: {}",
                root.display()
            )));
        }
        let root = fs::canonicalize(root)?;
        Ok(Self { root })
    }

    /// Absolute path of the vault root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a relative path against the root, rejecting absolute inputs,
    /// `..` escapes, and symlink targets outside the root.
    fn safe_path(&self, rel: &str) -> Result<PathBuf, VaultError> {
        if rel.is_empty() {
            return Ok(self.root.clone());
        }

        let candidate = Path::new(rel);
        if candidate.is_absolute() {
            return Err(VaultError::PathEscape(rel.to_string()));
        }

        // Lexically normalize: track depth so `a/../../x` is caught even
        // though the prefix `a/..` alone stays inside the root.
        let mut depth: i32 = 0;
        let mut cleaned = PathBuf::new();
        for comp in candidate.components() {
            match comp {
                Component::Normal(part) => {
                    depth += 1;
                    cleaned.push(part);
                }
                Component::CurDir => {}
                Component::ParentDir => {
                    depth -= 1;
                    if depth < 0 {
                        return Err(VaultError::PathEscape(rel.to_string()));
                    }
                    cleaned.pop();
                }
                Component::RootDir | Component::Prefix(_) => {
                    return Err(VaultError::PathEscape(rel.to_string()));
                }
            }
        }

        let joined = self.root.join(&cleaned);

        // Symlink check: canonicalize the nearest existing ancestor and make
        // sure it still lies under the root.
        let mut probe = joined.as_path();
        loop {
            match fs::canonicalize(probe) {
                Ok(resolved) => {
                    if !resolved.starts_with(&self.root) {
                        return Err(VaultError::PathEscape(rel.to_string()));
                    }
                    break;
                }
                Err(_) => match probe.parent() {
                    Some(parent) if parent.starts_with(&self.root) => probe = parent,
                    _ => break,
                },
            }
        }

        Ok(joined)
    }

    /// Walk `dir` (`""` = whole vault) and return metadata for every `.md`
    /// file beneath it. Hidden files and atomic-write temp files are skipped.
    pub fn list(&self, dir: &str) -> Result<Vec<FileMeta>, VaultError> {
        let base = self.safe_path(dir)?;
        let mut out = Vec::new();

        for entry in WalkDir::new(&base).follow_links(false) {
            let entry = match entry {
                Ok(e) => e,
                Err(err) => {
                    // Report a missing listing root; skip races mid-walk.
                    if out.is_empty() && err.path() == Some(base.as_path()) {
                        return Err(VaultError::NotFound(dir.to_string()));
                    }
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy();
            if name.starts_with('.') || !name.ends_with(".md") {
                continue;
            }
            let meta = match entry.metadata() {
                Ok(m) => m,
                Err(_) => continue,
            };
            let rel = match entry.path().strip_prefix(&self.root) {
                Ok(r) => r,
                Err(_) => continue,
            };
            out.push(FileMeta {
                path: to_slash(rel),
                mtime: system_mtime(&meta),
                size: meta.len() as i64,
            });
        }

        Ok(out)
    }

    /// Read the raw bytes of a vault file.
    pub fn read(&self, path: &str) -> Result<Vec<u8>, VaultError> {
        let abs = self.safe_path(path)?;
        fs::read(&abs).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => VaultError::NotFound(path.to_string()),
            _ => VaultError::Io(e),
        })
    }

    /// Whether a vault file exists.
    pub fn exists(&self, path: &str) -> Result<bool, VaultError> {
        let abs = self.safe_path(path)?;
        Ok(abs.try_exists()?)
    }

    /// Modification time of a vault file, unix seconds.
    pub fn mtime(&self, path: &str) -> Result<i64, VaultError> {
        let abs = self.safe_path(path)?;
        let meta = fs::metadata(&abs).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => VaultError::NotFound(path.to_string()),
            _ => VaultError::Io(e),
        })?;
        Ok(system_mtime(&meta))
    }

    /// Atomically write content: temp file in the target directory, fsync,
    /// rename over the target. A reader only ever observes the old bytes or
    /// the complete new bytes.
    pub fn write(&self, path: &str, content: &[u8]) -> Result<(), VaultError> {
        let abs = self.safe_path(path)?;
        let dir = abs.parent().unwrap_or(&self.root);
        mkdir_all(dir)?;

        let mut tmp = tempfile::Builder::new()
            .prefix(TMP_PREFIX)
            .tempfile_in(dir)?;
        tmp.write_all(content)?;
        tmp.as_file().sync_all()?;
        // persist() is the rename; on failure the temp file is removed by
        // the returned error's drop.
        tmp.persist(&abs).map_err(|e| VaultError::Io(e.error))?;
        Ok(())
    }

    /// Remove a file from the vault.
    pub fn delete(&self, path: &str) -> Result<(), VaultError> {
        let abs = self.safe_path(path)?;
        fs::remove_file(&abs).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => VaultError::NotFound(path.to_string()),
            _ => VaultError::Io(e),
        })
    }

    /// Rename a file within the vault. The destination must not exist.
    pub fn rename(&self, old: &str, new: &str) -> Result<(), VaultError> {
        let abs_old = self.safe_path(old)?;
        let abs_new = self.safe_path(new)?;
        if !abs_old.try_exists()? {
            return Err(VaultError::NotFound(old.to_string()));
        }
        if abs_new.try_exists()? {
            return Err(VaultError::DestinationExists(new.to_string()));
        }
        if let Some(parent) = abs_new.parent() {
            mkdir_all(parent)?;
        }
        fs::rename(&abs_old, &abs_new)?;
        Ok(())
    }
}

/// Create a directory chain with an explicit 0o755 mode rather than whatever
/// the process umask leaves. Vault directories must never be world-writable.
#[cfg(unix)]
fn mkdir_all(dir: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    fs::DirBuilder::new().recursive(true).mode(0o755).create(dir)
}

#[cfg(not(unix))]
fn mkdir_all(dir: &Path) -> std::io::Result<()> {
    fs::create_dir_all(dir)
}

fn system_mtime(meta: &fs::Metadata) -> i64 {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn to_slash(path: &Path) -> String {
    let s = path.to_string_lossy();
    if std::path::MAIN_SEPARATOR == '/' {
        s.into_owned()
    } else {
        s.replace(std::path::MAIN_SEPARATOR, "/")
    }
}
