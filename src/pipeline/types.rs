//! Shared types for the conversation pipeline.

use serde::{Deserialize, Serialize};

use crate::store::StateField;

// ── Conversation snapshot ───────────────────────────────────────────

/// A two-party DM thread as seen in one poll cycle.
///
/// Fetched fresh every cycle. The remote service owns the unread state.
#[derive(Debug, Clone, PartialEq)]
pub struct Conversation {
    pub id: String,
    /// Both participants, the bot included.
    pub members: Vec<Member>,
    pub unread_count: u32,
    pub last_message: Option<LastMessage>,
}

impl Conversation {
    /// The participant that is not the bot.
    pub fn other_member(&self, self_did: &str) -> Option<&Member> {
        self.members.iter().find(|m| m.did != self_did)
    }
}

/// A conversation participant and how the bot relates to them.
#[derive(Debug, Clone, PartialEq)]
pub struct Member {
    pub did: String,
    pub handle: String,
    pub relationship: RelationshipView,
}

/// Follow/block state between the bot and the other participant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelationshipView {
    /// The other participant follows the bot.
    pub followed_by: bool,
    /// The bot follows the other participant.
    pub following: bool,
    /// The bot blocks the other participant.
    pub blocking: bool,
    /// The other participant blocks the bot.
    pub blocked_by: bool,
}

/// The most recent message in a conversation.
#[derive(Debug, Clone, PartialEq)]
pub enum LastMessage {
    Live(Message),
    /// Deleted (or otherwise textless) message. Only the sender is known.
    Deleted { sender_did: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub id: String,
    pub sender_did: String,
    pub text: String,
    pub facets: Vec<Facet>,
}

// ── Rich text ───────────────────────────────────────────────────────

/// Decoration span (mention, link, tag) over a range of the text.
///
/// Offsets are UTF-8 byte offsets into the text, matching the network's
/// rich text format. `features` is passed through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Facet {
    pub index: ByteSlice,
    pub features: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ByteSlice {
    pub byte_start: usize,
    pub byte_end: usize,
}

impl Facet {
    /// Rebase onto text with the first `removed` bytes cut off.
    ///
    /// Returns `None` when the span starts inside the removed part.
    pub fn rebased(&self, removed: usize) -> Option<Facet> {
        if self.index.byte_start < removed || self.index.byte_end < self.index.byte_start {
            return None;
        }
        Some(Facet {
            index: ByteSlice {
                byte_start: self.index.byte_start - removed,
                byte_end: self.index.byte_end - removed,
            },
            features: self.features.clone(),
        })
    }
}

// ── Classification result ───────────────────────────────────────────

/// Why candidate content was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Either side blocks the other. Handled silently.
    Blocked,
    /// The sender does not follow the bot.
    NotFollowingBot,
    /// The bot has not followed the sender back.
    NoFollowback,
    /// Longer than the maximum length.
    TooLong,
    /// Nothing left after the prefix.
    Empty,
}

impl RejectReason {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Blocked => "blocked",
            Self::NotFollowingBot => "not_following_bot",
            Self::NoFollowback => "no_followback",
            Self::TooLong => "too_long",
            Self::Empty => "empty",
        }
    }
}

/// Content approved for publishing.
#[derive(Debug, Clone, PartialEq)]
pub struct Post {
    pub text: String,
    pub facets: Vec<Facet>,
}

/// What to do with one conversation.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Already handled, nothing to act on, or our own message. No side effects.
    Skip,
    /// Not content and not a command. No side effects.
    Ignore,
    /// Owner command flipping one toggle.
    Toggle(StateField),
    Reject(RejectReason),
    Accept(Post),
}

impl Action {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Skip => "skip",
            Self::Ignore => "ignore",
            Self::Toggle(_) => "toggle",
            Self::Reject(reason) => reason.label(),
            Self::Accept(_) => "accept",
        }
    }

    /// Whether executing this action touches the conversation.
    pub fn has_side_effects(&self) -> bool {
        !matches!(self, Self::Skip | Self::Ignore)
    }
}

/// Outcome counts for one poll cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleSummary {
    /// Conversations returned by the inbox.
    pub seen: usize,
    /// Conversations whose action had side effects.
    pub acted: usize,
    /// Conversations whose action failed part-way.
    pub failed: usize,
    /// Posts published.
    pub published: usize,
}
