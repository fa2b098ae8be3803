//! Per-conversation decision logic.
//!
//! Decision order, first match wins:
//! 1. Skip: nothing unread, no message, deleted message, or sent by the bot
//! 2. Owner toggle commands (exact text match)
//! 3. Ignore: relay switched off, or text lacks `prefix + " "`
//! 4. Content checks: block → follow → follow-back → length → emptiness
//! 5. Accept with the prefix stripped

use std::sync::Arc;

use tracing::debug;

use crate::config::RelayConfig;
use crate::pipeline::types::{Action, Conversation, LastMessage, Post, RejectReason, RelationshipView};
use crate::store::{RuntimeState, StateField};
use crate::text::count_graphemes;

/// Classifies conversation snapshots into actions. Pure: no I/O.
pub struct ConversationClassifier {
    self_did: String,
    config: Arc<RelayConfig>,
}

impl ConversationClassifier {
    pub fn new(self_did: impl Into<String>, config: Arc<RelayConfig>) -> Self {
        Self {
            self_did: self_did.into(),
            config,
        }
    }

    pub fn self_did(&self) -> &str {
        &self.self_did
    }

    /// Decide what to do with one conversation.
    pub fn classify(
        &self,
        conversation: &Conversation,
        relationship: &RelationshipView,
        state: &RuntimeState,
    ) -> Action {
        // Our own replies mark a conversation as handled; acting on them
        // would loop forever.
        let message = match &conversation.last_message {
            _ if conversation.unread_count == 0 => return Action::Skip,
            None | Some(LastMessage::Deleted { .. }) => return Action::Skip,
            Some(LastMessage::Live(message)) if message.sender_did == self.self_did => {
                return Action::Skip;
            }
            Some(LastMessage::Live(message)) => message,
        };

        if message.sender_did == self.config.owner_did {
            if let Some(field) = self.match_command(&message.text) {
                return Action::Toggle(field);
            }
        }

        if !state.watch_enabled {
            return Action::Ignore;
        }
        let Some(body) = self.strip_prefix(&message.text) else {
            return Action::Ignore;
        };

        if relationship.blocking || relationship.blocked_by {
            return Action::Reject(RejectReason::Blocked);
        }
        if !relationship.followed_by {
            return Action::Reject(RejectReason::NotFollowingBot);
        }
        if state.require_followback && !relationship.following {
            return Action::Reject(RejectReason::NoFollowback);
        }

        let length = count_graphemes(&message.text);
        if length > self.config.max_length {
            debug!(
                convo_id = %conversation.id,
                length,
                max = self.config.max_length,
                "Content too long"
            );
            return Action::Reject(RejectReason::TooLong);
        }
        if body.trim().is_empty() {
            return Action::Reject(RejectReason::Empty);
        }

        let removed = message.text.len() - body.len();
        Action::Accept(Post {
            text: body.to_string(),
            facets: message
                .facets
                .iter()
                .filter_map(|facet| facet.rebased(removed))
                .collect(),
        })
    }

    fn match_command(&self, text: &str) -> Option<StateField> {
        if text == self.config.toggle_watch_command {
            Some(StateField::Watch)
        } else if text == self.config.toggle_followback_command {
            Some(StateField::RequireFollowback)
        } else {
            None
        }
    }

    /// Text after `prefix` and exactly one space, if the text has both.
    fn strip_prefix<'t>(&self, text: &'t str) -> Option<&'t str> {
        text.strip_prefix(self.config.prefix.as_str())?
            .strip_prefix(' ')
    }
}
