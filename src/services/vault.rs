use crate::error::{AppResult, DomainError};
use crate::models::FileEntry;
use crate::proto::validate_filename;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

/// Per-client namespace directories under a configured root. The namespace
/// is flat: filenames are single path segments, validated before any
/// filesystem call.
pub struct Vault {
    root: PathBuf,
    /// Held by LIST and DELETE so a listing never observes a half-removed
    /// file. GET and PUT intentionally do not take it.
    dir_lock: Mutex<()>,
}

impl Vault {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            dir_lock: Mutex::new(()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn ensure_root(&self) -> AppResult<()> {
        tokio::fs::create_dir_all(&self.root).await?;
        Ok(())
    }

    fn client_dir(&self, identity: &str) -> PathBuf {
        self.root.join(identity)
    }

    /// Create the identity's namespace directory. `Ok(true)` when created,
    /// `Ok(false)` when it already existed.
    pub async fn create_client_dir(&self, identity: &str) -> AppResult<bool> {
        match tokio::fs::create_dir(self.client_dir(identity)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Resolve a wire filename to a path inside the client's namespace.
    pub fn resolve(&self, identity: &str, name: &str) -> AppResult<PathBuf> {
        validate_filename(name)?;
        Ok(self.client_dir(identity).join(name))
    }

    /// Size of a stored file; `FileNotFound` when absent or not a regular
    /// file.
    pub async fn stat(&self, identity: &str, name: &str) -> AppResult<u64> {
        let path = self.resolve(identity, name)?;
        match tokio::fs::metadata(&path).await {
            Ok(md) if md.is_file() => Ok(md.len()),
            Ok(_) => Err(DomainError::FileNotFound(name.to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(DomainError::FileNotFound(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Enumerate regular files in the client's namespace, in directory
    /// order (not stable across calls).
    pub async fn list(&self, identity: &str) -> AppResult<Vec<FileEntry>> {
        let _guard = self.dir_lock.lock().await;

        let mut entries = Vec::new();
        let mut dir = tokio::fs::read_dir(self.client_dir(identity)).await?;
        while let Some(entry) = dir.next_entry().await? {
            let md = entry.metadata().await?;
            if !md.is_file() {
                continue;
            }
            // names arrived through the codec, so they are valid UTF-8
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            entries.push(FileEntry { name, size: md.len() });
        }
        Ok(entries)
    }

    /// Remove a stored file, returning the freed size so the caller can
    /// release it from the quota ledger.
    pub async fn remove(&self, identity: &str, name: &str) -> AppResult<u64> {
        let path = self.resolve(identity, name)?;
        let _guard = self.dir_lock.lock().await;

        let size = match tokio::fs::metadata(&path).await {
            Ok(md) if md.is_file() => md.len(),
            Ok(_) => return Err(DomainError::FileNotFound(name.to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(DomainError::FileNotFound(name.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(size),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(DomainError::FileNotFound(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}
