//! Wire types for the Bluesky XRPC endpoints the relay uses.
//!
//! Only the fields the relay reads are modelled; everything else in the
//! responses is ignored. Conversions into the pipeline's domain types live
//! here too.

use serde::{Deserialize, Serialize};

use crate::pipeline::types::{Conversation, Facet, LastMessage, Member, Message, RelationshipView};

// ── Session ─────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct CreateSessionInput<'a> {
    pub identifier: &'a str,
    pub password: &'a str,
}

/// Output of `createSession` and `refreshSession`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionOutput {
    pub did: String,
    pub handle: String,
    pub access_jwt: String,
    pub refresh_jwt: String,
}

/// Body of a failed XRPC call.
#[derive(Debug, Default, Deserialize)]
pub struct XrpcErrorBody {
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub message: String,
}

// ── Chat ────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ListConvosOutput {
    pub convos: Vec<ConvoView>,
}

#[derive(Debug, Deserialize)]
pub struct ConvoOutput {
    pub convo: ConvoView,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvoView {
    pub id: String,
    pub members: Vec<ProfileViewBasic>,
    #[serde(default)]
    pub last_message: Option<MessageUnion>,
    #[serde(default)]
    pub unread_count: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileViewBasic {
    pub did: String,
    #[serde(default)]
    pub handle: String,
    #[serde(default)]
    pub viewer: Option<ViewerState>,
}

/// Relationship metadata as the viewer (the bot) sees it.
///
/// `following`, `followed_by` and `blocking` are record URIs when set.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewerState {
    #[serde(default)]
    pub blocked_by: Option<bool>,
    #[serde(default)]
    pub blocking: Option<String>,
    #[serde(default)]
    pub following: Option<String>,
    #[serde(default)]
    pub followed_by: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "$type")]
pub enum MessageUnion {
    #[serde(rename = "chat.bsky.convo.defs#messageView")]
    Message(MessageView),
    #[serde(rename = "chat.bsky.convo.defs#deletedMessageView")]
    Deleted(DeletedMessageView),
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
pub struct MessageView {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub facets: Option<Vec<Facet>>,
    pub sender: MessageSender,
}

#[derive(Debug, Deserialize)]
pub struct DeletedMessageView {
    pub sender: MessageSender,
}

#[derive(Debug, Deserialize)]
pub struct MessageSender {
    pub did: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageInput<'a> {
    pub convo_id: &'a str,
    pub message: MessageInput<'a>,
}

#[derive(Debug, Serialize)]
pub struct MessageInput<'a> {
    pub text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateReadInput<'a> {
    pub convo_id: &'a str,
}

// ── Repo ────────────────────────────────────────────────────────────

pub const POST_COLLECTION: &str = "app.bsky.feed.post";

#[derive(Debug, Serialize)]
pub struct CreateRecordInput<'a> {
    pub repo: &'a str,
    pub collection: &'a str,
    pub record: PostRecord<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostRecord<'a> {
    #[serde(rename = "$type")]
    pub record_type: &'a str,
    pub text: &'a str,
    #[serde(skip_serializing_if = "no_facets")]
    pub facets: &'a [Facet],
    pub created_at: String,
}

fn no_facets(facets: &&[Facet]) -> bool {
    facets.is_empty()
}

#[derive(Debug, Deserialize)]
pub struct CreateRecordOutput {
    pub uri: String,
}

// ── Conversions ─────────────────────────────────────────────────────

impl From<ViewerState> for RelationshipView {
    fn from(viewer: ViewerState) -> Self {
        Self {
            followed_by: viewer.followed_by.is_some(),
            following: viewer.following.is_some(),
            blocking: viewer.blocking.is_some(),
            blocked_by: viewer.blocked_by.unwrap_or(false),
        }
    }
}

impl From<ProfileViewBasic> for Member {
    fn from(profile: ProfileViewBasic) -> Self {
        Self {
            did: profile.did,
            handle: profile.handle,
            relationship: profile.viewer.map(Into::into).unwrap_or_default(),
        }
    }
}

impl From<MessageUnion> for LastMessage {
    fn from(message: MessageUnion) -> Self {
        match message {
            MessageUnion::Message(view) => LastMessage::Live(Message {
                id: view.id,
                sender_did: view.sender.did,
                text: view.text,
                facets: view.facets.unwrap_or_default(),
            }),
            MessageUnion::Deleted(view) => LastMessage::Deleted {
                sender_did: view.sender.did,
            },
            MessageUnion::Unknown => LastMessage::Deleted {
                sender_did: String::new(),
            },
        }
    }
}

impl From<ConvoView> for Conversation {
    fn from(view: ConvoView) -> Self {
        Self {
            id: view.id,
            members: view.members.into_iter().map(Into::into).collect(),
            unread_count: view.unread_count,
            last_message: view.last_message.map(Into::into),
        }
    }
}
