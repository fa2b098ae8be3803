//! Conversation processor. Drives one poll cycle over the inbox.
//!
//! Flow per cycle:
//! 1. List up to `PAGE_LIMIT` conversations (newest activity first)
//! 2. Walk them oldest first
//! 3. Classify each, then execute the action's side effects in order
//!
//! The processor owns the runtime state outright. The only way to change it
//! is `apply_command`, which persists before anything else happens, so a
//! reply is never sent for a toggle that did not stick.
//!
//! Toggles and publishes are applied at most once per message. After one
//! succeeds, the confirmation reply is best effort and the conversation is
//! still marked read. If the read mark itself fails, the message id is
//! remembered and the next cycle only retries the read mark.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::channels::gateway::{MessagingGateway, PublishGateway};
use crate::config::RelayConfig;
use crate::error::{Error, StateError};
use crate::pipeline::classifier::ConversationClassifier;
use crate::pipeline::replies;
use crate::pipeline::types::{Action, Conversation, CycleSummary, LastMessage};
use crate::store::{RuntimeState, StateField, StateStore};
use crate::worker::IntervalTask;

/// Maximum conversations fetched per cycle.
pub const PAGE_LIMIT: u32 = 100;

pub struct ConversationProcessor {
    classifier: ConversationClassifier,
    config: Arc<RelayConfig>,
    messaging: Arc<dyn MessagingGateway>,
    publisher: Arc<dyn PublishGateway>,
    store: Arc<dyn StateStore>,
    state: RuntimeState,
    /// Messages whose side effects were applied but which are still unread.
    awaiting_read: HashSet<String>,
}

impl ConversationProcessor {
    pub fn new(
        self_did: impl Into<String>,
        config: Arc<RelayConfig>,
        messaging: Arc<dyn MessagingGateway>,
        publisher: Arc<dyn PublishGateway>,
        store: Arc<dyn StateStore>,
        state: RuntimeState,
    ) -> Self {
        Self {
            classifier: ConversationClassifier::new(self_did, Arc::clone(&config)),
            config,
            messaging,
            publisher,
            store,
            state,
            awaiting_read: HashSet::new(),
        }
    }

    pub fn state(&self) -> &RuntimeState {
        &self.state
    }

    /// Run one poll cycle.
    ///
    /// Failing to list conversations aborts the cycle. A failure while acting
    /// on one conversation is logged and the rest are still processed.
    pub async fn run_cycle(&mut self) -> Result<CycleSummary, Error> {
        let conversations = self.messaging.list_conversations(PAGE_LIMIT).await?;

        let mut summary = CycleSummary {
            seen: conversations.len(),
            ..CycleSummary::default()
        };

        for conversation in conversations.iter().rev() {
            let Some(other) = conversation.other_member(self.classifier.self_did()) else {
                debug!(convo_id = %conversation.id, "No other participant, skipping");
                continue;
            };

            let action = self
                .classifier
                .classify(conversation, &other.relationship, &self.state);
            if !action.has_side_effects() {
                continue;
            }

            summary.acted += 1;

            let message_id = match &conversation.last_message {
                Some(LastMessage::Live(message)) => Some(message.id.as_str()),
                _ => None,
            };
            if let Some(id) = message_id.filter(|id| self.awaiting_read.contains(*id)) {
                debug!(convo_id = %conversation.id, message_id = id, "Already handled, retrying read mark");
                match self.messaging.mark_read(&conversation.id).await {
                    Ok(()) => {
                        self.awaiting_read.remove(id);
                    }
                    Err(e) => {
                        warn!(convo_id = %conversation.id, error = %e, "Failed to mark conversation read");
                        summary.failed += 1;
                    }
                }
                continue;
            }

            info!(
                convo_id = %conversation.id,
                sender = %other.did,
                action = action.label(),
                "Handling conversation"
            );

            match self.execute(conversation, message_id, action).await {
                Ok(published) => {
                    if published {
                        summary.published += 1;
                    }
                }
                Err(e) => {
                    warn!(convo_id = %conversation.id, error = %e, "Failed to handle conversation");
                    summary.failed += 1;
                }
            }
        }

        Ok(summary)
    }

    /// Carry out an action's side effects. Returns whether a post was published.
    async fn execute(
        &mut self,
        conversation: &Conversation,
        message_id: Option<&str>,
        action: Action,
    ) -> Result<bool, Error> {
        let convo_id = conversation.id.as_str();

        let published = match action {
            Action::Skip | Action::Ignore => return Ok(false),
            Action::Toggle(field) => {
                let enabled = self.apply_command(field).await?;
                self.confirm(convo_id, replies::for_toggle(field, enabled)).await;
                false
            }
            Action::Reject(reason) => {
                if let Some(text) = replies::for_rejection(reason) {
                    self.messaging.send_reply(convo_id, text).await?;
                }
                return self.mark_read(convo_id).await.map(|()| false);
            }
            Action::Accept(post) => {
                self.publisher.publish(&post).await?;
                self.confirm(convo_id, replies::SENT).await;
                true
            }
        };

        // The side effect has happened; never let it run again for this message.
        if let Err(e) = self.mark_read(convo_id).await {
            if let Some(id) = message_id {
                self.awaiting_read.insert(id.to_string());
            }
            return Err(e);
        }
        Ok(published)
    }

    /// Send a confirmation for a side effect that already happened.
    async fn confirm(&self, convo_id: &str, text: &str) {
        if let Err(e) = self.messaging.send_reply(convo_id, text).await {
            warn!(convo_id, error = %e, "Failed to send confirmation");
        }
    }

    async fn mark_read(&self, convo_id: &str) -> Result<(), Error> {
        self.messaging.mark_read(convo_id).await?;
        Ok(())
    }

    /// Flip one toggle and persist the full state. Returns the new value.
    ///
    /// If persisting fails the in-memory state is left untouched.
    pub async fn apply_command(&mut self, field: StateField) -> Result<bool, StateError> {
        let mut next = self.state;
        let enabled = next.toggle(field);
        next.save(self.store.as_ref()).await?;
        self.state = next;

        info!(field = %field, enabled, "Runtime state updated");
        Ok(enabled)
    }

    /// Send the owner a one-shot summary of the current toggles.
    pub async fn report_status(&self) -> Result<(), Error> {
        let conversation = self
            .messaging
            .get_or_create_conversation(&self.config.owner_did)
            .await?;
        self.messaging
            .send_reply(&conversation.id, &replies::launch_report(&self.state))
            .await?;
        info!(convo_id = %conversation.id, "Sent launch report to owner");
        Ok(())
    }
}

#[async_trait]
impl IntervalTask for ConversationProcessor {
    type Error = Error;

    async fn run(&mut self) -> Result<(), Error> {
        let summary = self.run_cycle().await?;
        debug!(
            seen = summary.seen,
            acted = summary.acted,
            failed = summary.failed,
            published = summary.published,
            "Poll cycle complete"
        );
        Ok(())
    }
}
