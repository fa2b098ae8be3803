//! File-backed state store.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::debug;

use crate::error::StateError;
use crate::store::traits::StateStore;

/// Stores the state as a single file on disk.
pub struct FileStateStore {
    path: PathBuf,
}

impl FileStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn read_all(&self) -> Result<Option<Vec<u8>>, StateError> {
        match fs::read(&self.path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "State file absent");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn write_all(&self, contents: &[u8]) -> Result<(), StateError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        fs::write(&self.path, contents).await?;
        debug!(path = %self.path.display(), bytes = contents.len(), "State file written");
        Ok(())
    }
}
