//! Persistence layer: the runtime state and the sink it is saved to.

pub mod file;
pub mod memory;
pub mod state;
pub mod traits;

pub use file::FileStateStore;
pub use memory::MemoryStateStore;
pub use state::{RuntimeState, StateField};
pub use traits::StateStore;
