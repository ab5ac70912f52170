//! Persistent credential storage.

use std::{
    fs,
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
    sync::Mutex,
};

use mockall::automock;
use tempfile::NamedTempFile;
use thiserror::Error;

use crate::tokens::StoredSession;

/// Errors raised by a [`CredentialStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    /// The session file could not be read, written or removed.
    #[error("failed to access session file {path}")]
    Io {
        /// Session file path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The session file does not hold a valid session.
    #[error("session file {path} is not valid")]
    Format {
        /// Session file path.
        path: PathBuf,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// A thread panicked while holding the in-memory session.
    #[error("in-memory session store is poisoned")]
    Poisoned,

    /// The blocking store task panicked or was cancelled.
    #[error("session store task failed")]
    Task(#[from] tokio::task::JoinError),
}

/// Where the signed-in session lives between runs.
#[automock]
pub trait CredentialStore: Send + Sync {
    /// Read the stored session, if there is one.
    fn load(&self) -> Result<Option<StoredSession>, StoreError>;

    /// Replace the stored session.
    fn save(&self, session: &StoredSession) -> Result<(), StoreError>;

    /// Remove the stored session. Succeeds when nothing is stored.
    fn clear(&self) -> Result<(), StoreError>;
}

/// Stores the session as a JSON file, readable only by the owner on Unix.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    /// Store the session at `path`. Nothing is touched until the first save.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Session file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> Result<Option<StoredSession>, StoreError> {
        let contents = match fs::read(&self.path) {
            Ok(contents) => contents,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(None),
            Err(error) => return Err(self.io_error(error)),
        };

        serde_json::from_slice(&contents)
            .map(Some)
            .map_err(|source| StoreError::Format {
                path: self.path.clone(),
                source,
            })
    }

    fn save(&self, session: &StoredSession) -> Result<(), StoreError> {
        let contents =
            serde_json::to_vec_pretty(session).map_err(|source| StoreError::Format {
                path: self.path.clone(),
                source,
            })?;

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        fs::create_dir_all(dir).map_err(|error| self.io_error(error))?;

        // Written beside the target and renamed over it, so readers only ever
        // see a complete file. The temporary file is created owner-only.
        let mut file = NamedTempFile::new_in(dir).map_err(|error| self.io_error(error))?;

        file.write_all(&contents)
            .and_then(|()| file.as_file().sync_all())
            .map_err(|error| self.io_error(error))?;

        file.persist(&self.path)
            .map_err(|error| self.io_error(error.error))?;

        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(()),
            Err(error) => Err(self.io_error(error)),
        }
    }
}

/// Keeps the session in memory only.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    session: Mutex<Option<StoredSession>>,
}

impl MemoryCredentialStore {
    /// Start with `session` already stored.
    #[must_use]
    pub fn new(session: Option<StoredSession>) -> Self {
        Self {
            session: Mutex::new(session),
        }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self) -> Result<Option<StoredSession>, StoreError> {
        self.session
            .lock()
            .map(|session| session.clone())
            .map_err(|_poisoned| StoreError::Poisoned)
    }

    fn save(&self, session: &StoredSession) -> Result<(), StoreError> {
        let mut stored = self
            .session
            .lock()
            .map_err(|_poisoned| StoreError::Poisoned)?;

        *stored = Some(session.clone());

        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        let mut stored = self
            .session
            .lock()
            .map_err(|_poisoned| StoreError::Poisoned)?;

        *stored = None;

        Ok(())
    }
}
