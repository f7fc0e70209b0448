//! On-disk persistence for the session blob.
//!
//! The blob is stored base64-encoded in a single file, written via a
//! temporary sibling and an atomic rename. On Unix the file is created with
//! mode 0600; the blob is account-equivalent credential material.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use courier_core::SessionBlob;

use crate::error::{SessionError, SessionResult};

/// File-backed store for one session blob.
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    /// A store persisting to `path`.
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// The file this store reads and writes.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the persisted blob, if one exists.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Store`] on IO failure and
    /// [`SessionError::CorruptBlob`] when the file is not valid base64. A
    /// missing file is not an error.
    pub fn load(&self) -> SessionResult<Option<SessionBlob>> {
        let encoded = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(SessionError::Store {
                    action: "read",
                    path: self.path.display().to_string(),
                    source: e,
                });
            },
        };

        let blob = SessionBlob::from_base64(&encoded)
            .map_err(|e| SessionError::CorruptBlob(e.to_string()))?;
        debug!(path = %self.path.display(), "loaded persisted session");
        Ok(Some(blob))
    }

    /// Persist `blob`, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Store`] on IO failure.
    pub fn save(&self, blob: &SessionBlob) -> SessionResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| SessionError::Store {
                action: "create directory for",
                path: parent.display().to_string(),
                source: e,
            })?;
        }

        let tmp = self.path.with_extension("tmp");
        write_private(&tmp, blob.to_base64().as_bytes()).map_err(|e| SessionError::Store {
            action: "write",
            path: tmp.display().to_string(),
            source: e,
        })?;

        std::fs::rename(&tmp, &self.path).map_err(|e| SessionError::Store {
            action: "rename",
            path: self.path.display().to_string(),
            source: e,
        })?;

        debug!(path = %self.path.display(), "persisted session blob");
        Ok(())
    }

    /// Remove the persisted blob. Missing file is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Store`] on IO failure other than the file
    /// being absent.
    pub fn clear(&self) -> SessionResult<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "failed to remove session file");
                Err(SessionError::Store {
                    action: "remove",
                    path: self.path.display().to_string(),
                    source: e,
                })
            },
        }
    }
}

#[cfg(unix)]
fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    use std::io::Write as _;
    use std::os::unix::fs::OpenOptionsExt as _;

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(contents)?;
    file.sync_all()
}

#[cfg(not(unix))]
fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    std::fs::write(path, contents)
}
