//! Channel abstraction for the remote service the relay talks to.

pub mod bluesky;
pub mod bluesky_types;
pub mod gateway;
pub mod jwt;

pub use bluesky::BlueskyClient;
pub use gateway::{AuthGateway, MessagingGateway, PublishGateway, verify_session};
