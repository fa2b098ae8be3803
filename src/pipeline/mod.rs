//! Conversation pipeline.
//!
//! Every unread conversation flows through:
//! 1. `ConversationClassifier::classify()`: pure decision, no I/O
//! 2. `ConversationProcessor::execute()`: replies, publishing, read marks
//!
//! Runtime toggles are only changed through `ConversationProcessor::apply_command()`.

pub mod classifier;
pub mod processor;
pub mod replies;
pub mod types;

pub use classifier::ConversationClassifier;
pub use processor::{ConversationProcessor, PAGE_LIMIT};
