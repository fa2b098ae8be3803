//! `StateStore` trait: raw read/write access to the single state sink.

use async_trait::async_trait;

use crate::error::StateError;

/// Whole-content storage for the persisted runtime state.
///
/// Implementations never merge or append: `write_all` replaces whatever
/// was there before.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Read the full contents. `None` means nothing has been persisted yet.
    async fn read_all(&self) -> Result<Option<Vec<u8>>, StateError>;

    /// Overwrite the full contents.
    async fn write_all(&self, contents: &[u8]) -> Result<(), StateError>;
}
