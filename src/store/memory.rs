//! In-memory state store, used when persistence is not wanted and in tests.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::StateError;
use crate::store::traits::StateStore;

/// Keeps the state contents in memory and counts writes.
#[derive(Clone, Default)]
pub struct MemoryStateStore {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    contents: Option<Vec<u8>>,
    writes: usize,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with existing contents, as if a previous run had persisted them.
    pub fn with_contents(contents: impl Into<Vec<u8>>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                contents: Some(contents.into()),
                writes: 0,
            })),
        }
    }

    pub async fn contents(&self) -> Option<Vec<u8>> {
        self.inner.lock().await.contents.clone()
    }

    /// Number of `write_all` calls so far.
    pub async fn write_count(&self) -> usize {
        self.inner.lock().await.writes
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn read_all(&self) -> Result<Option<Vec<u8>>, StateError> {
        Ok(self.inner.lock().await.contents.clone())
    }

    async fn write_all(&self, contents: &[u8]) -> Result<(), StateError> {
        let mut inner = self.inner.lock().await;
        inner.contents = Some(contents.to_vec());
        inner.writes += 1;
        Ok(())
    }
}
