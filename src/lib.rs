//! Menfess relay. Republishes prefixed direct messages as public posts.

pub mod channels;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod store;
pub mod text;
pub mod worker;
