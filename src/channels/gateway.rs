//! Collaborator boundaries: the inbox, the public feed, and the session.
//!
//! The pipeline only talks to these traits. `BlueskyClient` implements
//! all three; tests use recording stubs.

use async_trait::async_trait;

use crate::error::{ConfigError, Error, GatewayError};
use crate::pipeline::types::{Conversation, Post};

/// Direct-message inbox operations.
#[async_trait]
pub trait MessagingGateway: Send + Sync {
    /// Up to `limit` conversations, most recent activity first.
    async fn list_conversations(&self, limit: u32) -> Result<Vec<Conversation>, GatewayError>;

    async fn send_reply(&self, convo_id: &str, text: &str) -> Result<(), GatewayError>;

    async fn mark_read(&self, convo_id: &str) -> Result<(), GatewayError>;

    /// The conversation with `other_did`, created if it does not exist yet.
    async fn get_or_create_conversation(&self, other_did: &str) -> Result<Conversation, GatewayError>;
}

/// Public post publishing.
#[async_trait]
pub trait PublishGateway: Send + Sync {
    async fn publish(&self, post: &Post) -> Result<(), GatewayError>;
}

/// Facts about the signed-in session.
#[async_trait]
pub trait AuthGateway: Send + Sync {
    /// DID of the signed-in account.
    async fn session_did(&self) -> String;

    /// Whether the session may read and send direct messages.
    async fn has_chat_access(&self) -> Result<bool, GatewayError>;
}

/// Check the session is usable by the relay and return the bot's DID.
///
/// Fails when the bot is signed in as the owner or cannot access DMs.
pub async fn verify_session(auth: &dyn AuthGateway, owner_did: &str) -> Result<String, Error> {
    if !auth.has_chat_access().await? {
        return Err(ConfigError::NoChatAccess.into());
    }

    let did = auth.session_did().await;
    if did == owner_did {
        return Err(ConfigError::OwnerIsSelf { did }.into());
    }
    Ok(did)
}
