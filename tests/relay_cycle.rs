//! Integration tests for the poll cycle.
//!
//! Each test drives a `ConversationProcessor` against a recording stub
//! inbox and an in-memory state store, then checks the exact sequence of
//! side effects.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use menfess_relay::channels::{MessagingGateway, PublishGateway};
use menfess_relay::config::RelayConfig;
use menfess_relay::error::{Error, GatewayError, StateError};
use menfess_relay::pipeline::replies;
use menfess_relay::pipeline::types::{
    ByteSlice, Conversation, Facet, LastMessage, Member, Message, Post, RelationshipView,
};
use menfess_relay::pipeline::{ConversationProcessor, PAGE_LIMIT};
use menfess_relay::store::{MemoryStateStore, RuntimeState, StateField, StateStore};
use menfess_relay::worker::spawn_interval;

const BOT: &str = "did:plc:bot";
const OWNER: &str = "did:plc:owner";
const ALICE: &str = "did:plc:alice";
const BOB: &str = "did:plc:bob";

// ── Stubs ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Event {
    List(u32),
    Reply { convo: String, text: String },
    MarkRead(String),
    Publish(Post),
    GetOrCreate(String),
}

/// Records every gateway call. Conversations are served from `inbox`.
#[derive(Default)]
struct StubInbox {
    inbox: Mutex<Vec<Conversation>>,
    events: Mutex<Vec<Event>>,
    fail_list: bool,
    fail_reply_for: HashSet<String>,
    /// Conversations whose next read mark fails; each fails only once.
    fail_mark_read_once: Mutex<HashSet<String>>,
}

impl StubInbox {
    fn with(conversations: Vec<Conversation>) -> Arc<Self> {
        Arc::new(Self {
            inbox: Mutex::new(conversations),
            ..Self::default()
        })
    }

    fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    /// Events other than the initial list call.
    fn effects(&self) -> Vec<Event> {
        self.events()
            .into_iter()
            .filter(|e| !matches!(e, Event::List(_)))
            .collect()
    }

    fn count(&self, pred: impl Fn(&Event) -> bool) -> usize {
        self.events().iter().filter(|e| pred(e)).count()
    }

    fn record(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }
}

#[async_trait]
impl MessagingGateway for StubInbox {
    async fn list_conversations(&self, limit: u32) -> Result<Vec<Conversation>, GatewayError> {
        self.record(Event::List(limit));
        if self.fail_list {
            return Err(GatewayError::Request {
                method: "chat.bsky.convo.listConvos".into(),
                reason: "connection reset".into(),
            });
        }
        Ok(self.inbox.lock().unwrap().clone())
    }

    async fn send_reply(&self, convo_id: &str, text: &str) -> Result<(), GatewayError> {
        if self.fail_reply_for.contains(convo_id) {
            return Err(GatewayError::Status {
                method: "chat.bsky.convo.sendMessage".into(),
                status: 500,
                error: "InternalServerError".into(),
                message: String::new(),
            });
        }
        self.record(Event::Reply {
            convo: convo_id.into(),
            text: text.into(),
        });
        Ok(())
    }

    async fn mark_read(&self, convo_id: &str) -> Result<(), GatewayError> {
        if self.fail_mark_read_once.lock().unwrap().remove(convo_id) {
            return Err(GatewayError::Request {
                method: "chat.bsky.convo.updateRead".into(),
                reason: "timed out".into(),
            });
        }
        self.record(Event::MarkRead(convo_id.into()));
        // The service clears the unread count once read.
        for convo in self.inbox.lock().unwrap().iter_mut() {
            if convo.id == convo_id {
                convo.unread_count = 0;
            }
        }
        Ok(())
    }

    async fn get_or_create_conversation(&self, other_did: &str) -> Result<Conversation, GatewayError> {
        self.record(Event::GetOrCreate(other_did.into()));
        Ok(Conversation {
            id: format!("convo-with-{other_did}"),
            members: vec![member(BOT, RelationshipView::default()), member(other_did, friend())],
            unread_count: 0,
            last_message: None,
        })
    }
}

#[async_trait]
impl PublishGateway for StubInbox {
    async fn publish(&self, post: &Post) -> Result<(), GatewayError> {
        self.record(Event::Publish(post.clone()));
        Ok(())
    }
}

/// A sink that refuses every write.
struct BrokenStore;

#[async_trait]
impl StateStore for BrokenStore {
    async fn read_all(&self) -> Result<Option<Vec<u8>>, StateError> {
        Ok(None)
    }

    async fn write_all(&self, _contents: &[u8]) -> Result<(), StateError> {
        Err(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only filesystem").into())
    }
}

// ── Fixtures ────────────────────────────────────────────────────────

fn config() -> Arc<RelayConfig> {
    Arc::new(RelayConfig {
        owner_did: OWNER.into(),
        prefix: "!mf".into(),
        max_length: 300,
        toggle_watch_command: "!menfess".into(),
        toggle_followback_command: "!followback".into(),
        report_at_launch: false,
        poll_delay: Duration::from_millis(5_000),
        state_file: PathBuf::from("state.json"),
        log_dir: None,
    })
}

fn friend() -> RelationshipView {
    RelationshipView {
        followed_by: true,
        following: true,
        blocking: false,
        blocked_by: false,
    }
}

fn member(did: &str, relationship: RelationshipView) -> Member {
    Member {
        did: did.into(),
        handle: format!("{}.test", did.trim_start_matches("did:plc:")),
        relationship,
    }
}

fn convo(id: &str, sender: &str, text: &str, relationship: RelationshipView) -> Conversation {
    Conversation {
        id: id.into(),
        members: vec![member(BOT, RelationshipView::default()), member(sender, relationship)],
        unread_count: 1,
        last_message: Some(LastMessage::Live(Message {
            id: format!("{id}-msg"),
            sender_did: sender.into(),
            text: text.into(),
            facets: vec![],
        })),
    }
}

fn processor(inbox: &Arc<StubInbox>, store: Arc<dyn StateStore>, state: RuntimeState) -> ConversationProcessor {
    ConversationProcessor::new(BOT, config(), inbox.clone(), inbox.clone(), store, state)
}

fn reply(convo: &str, text: &str) -> Event {
    Event::Reply {
        convo: convo.into(),
        text: text.into(),
    }
}

fn mark_read(convo: &str) -> Event {
    Event::MarkRead(convo.into())
}

// ── Commands ────────────────────────────────────────────────────────

#[tokio::test]
async fn owner_toggles_watch_off() {
    let inbox = StubInbox::with(vec![convo("c1", OWNER, "!menfess", friend())]);
    let store = MemoryStateStore::new();
    let mut processor = processor(&inbox, Arc::new(store.clone()), RuntimeState::default());

    let summary = processor.run_cycle().await.unwrap();

    assert!(!processor.state().watch_enabled);
    assert!(processor.state().require_followback);
    assert_eq!(store.write_count().await, 1);
    let persisted = RuntimeState::load(&store).await.unwrap();
    assert_eq!(persisted, *processor.state());

    assert_eq!(inbox.effects(), vec![reply("c1", replies::WATCH_OFF), mark_read("c1")]);
    assert_eq!(summary.acted, 1);
    assert_eq!(summary.failed, 0);
}

#[tokio::test]
async fn toggling_twice_restores_state_with_two_writes() {
    let store = MemoryStateStore::new();
    let inbox = StubInbox::with(vec![convo("c1", OWNER, "!menfess", friend())]);
    let mut processor = processor(&inbox, Arc::new(store.clone()), RuntimeState::default());

    processor.run_cycle().await.unwrap();
    // A new unread toggle from the owner arrives.
    inbox.inbox.lock().unwrap()[0].unread_count = 1;
    processor.run_cycle().await.unwrap();

    assert_eq!(*processor.state(), RuntimeState::default());
    assert_eq!(store.write_count().await, 2);
    assert_eq!(RuntimeState::load(&store).await.unwrap(), RuntimeState::default());
    assert_eq!(
        inbox.effects(),
        vec![
            reply("c1", replies::WATCH_OFF),
            mark_read("c1"),
            reply("c1", replies::WATCH_ON),
            mark_read("c1"),
        ]
    );
}

#[tokio::test]
async fn owner_toggles_followback_requirement() {
    let inbox = StubInbox::with(vec![convo("c1", OWNER, "!followback", friend())]);
    let store = MemoryStateStore::new();
    let mut processor = processor(&inbox, Arc::new(store.clone()), RuntimeState::default());

    processor.run_cycle().await.unwrap();

    assert!(!processor.state().require_followback);
    assert!(processor.state().watch_enabled);
    assert_eq!(inbox.effects(), vec![reply("c1", replies::FOLLOWBACK_OFF), mark_read("c1")]);
}

#[tokio::test]
async fn failed_persist_sends_no_reply_and_keeps_state() {
    let inbox = StubInbox::with(vec![convo("c1", OWNER, "!menfess", friend())]);
    let mut processor = processor(&inbox, Arc::new(BrokenStore), RuntimeState::default());

    let summary = processor.run_cycle().await.unwrap();

    assert_eq!(*processor.state(), RuntimeState::default());
    assert!(inbox.effects().is_empty());
    assert_eq!(summary.failed, 1);
}

#[tokio::test]
async fn toggle_applies_once_when_confirmation_fails() {
    let inbox = Arc::new(StubInbox {
        inbox: Mutex::new(vec![convo("c1", OWNER, "!menfess", friend())]),
        fail_reply_for: HashSet::from(["c1".to_string()]),
        ..StubInbox::default()
    });
    let store = MemoryStateStore::new();
    let mut processor = processor(&inbox, Arc::new(store.clone()), RuntimeState::default());

    let first = processor.run_cycle().await.unwrap();
    let second = processor.run_cycle().await.unwrap();

    assert!(!processor.state().watch_enabled);
    assert_eq!(store.write_count().await, 1);
    assert!(!RuntimeState::load(&store).await.unwrap().watch_enabled);
    assert_eq!(inbox.effects(), vec![mark_read("c1")]);
    assert_eq!((first.acted, first.failed), (1, 0));
    assert_eq!(second.acted, 0);
}

#[tokio::test]
async fn toggle_applies_once_when_mark_read_fails() {
    let inbox = Arc::new(StubInbox {
        inbox: Mutex::new(vec![convo("c1", OWNER, "!menfess", friend())]),
        fail_mark_read_once: Mutex::new(HashSet::from(["c1".to_string()])),
        ..StubInbox::default()
    });
    let store = MemoryStateStore::new();
    let mut processor = processor(&inbox, Arc::new(store.clone()), RuntimeState::default());

    let first = processor.run_cycle().await.unwrap();
    assert_eq!(first.failed, 1);
    assert!(!processor.state().watch_enabled);

    // Still unread, so the command is seen again but not re-applied.
    let second = processor.run_cycle().await.unwrap();
    assert_eq!((second.acted, second.failed), (1, 0));

    let third = processor.run_cycle().await.unwrap();
    assert_eq!(third.acted, 0);

    assert!(!processor.state().watch_enabled);
    assert_eq!(store.write_count().await, 1);
    assert!(!RuntimeState::load(&store).await.unwrap().watch_enabled);
    assert_eq!(inbox.effects(), vec![reply("c1", replies::WATCH_OFF), mark_read("c1")]);
}

#[tokio::test]
async fn apply_command_reports_persist_error() {
    let inbox = StubInbox::with(vec![]);
    let mut processor = processor(&inbox, Arc::new(BrokenStore), RuntimeState::default());

    let err = processor.apply_command(StateField::Watch).await.unwrap_err();
    assert!(matches!(err, StateError::Io(_)));
    assert!(processor.state().watch_enabled);
}

// ── Content ─────────────────────────────────────────────────────────

#[tokio::test]
async fn missing_followback_is_rejected() {
    let rel = RelationshipView {
        following: false,
        ..friend()
    };
    let inbox = StubInbox::with(vec![convo("c1", ALICE, "!mf hello world", rel)]);
    let mut processor = processor(&inbox, Arc::new(MemoryStateStore::new()), RuntimeState::default());

    processor.run_cycle().await.unwrap();

    assert_eq!(inbox.count(|e| matches!(e, Event::Publish(_))), 0);
    assert_eq!(
        inbox.effects(),
        vec![reply("c1", replies::NEED_FOLLOWBACK), mark_read("c1")]
    );
}

#[tokio::test]
async fn not_following_bot_is_rejected() {
    let rel = RelationshipView {
        followed_by: false,
        ..friend()
    };
    let inbox = StubInbox::with(vec![convo("c1", ALICE, "!mf hello world", rel)]);
    let mut processor = processor(&inbox, Arc::new(MemoryStateStore::new()), RuntimeState::default());

    processor.run_cycle().await.unwrap();

    assert_eq!(inbox.effects(), vec![reply("c1", replies::NEED_FOLLOW), mark_read("c1")]);
}

#[tokio::test]
async fn blocked_sender_is_only_marked_read() {
    let rel = RelationshipView {
        blocked_by: true,
        ..friend()
    };
    let inbox = StubInbox::with(vec![convo("c1", ALICE, "!mf hello world", rel)]);
    let mut processor = processor(&inbox, Arc::new(MemoryStateStore::new()), RuntimeState::default());

    processor.run_cycle().await.unwrap();

    assert_eq!(inbox.effects(), vec![mark_read("c1")]);
}

#[tokio::test]
async fn too_long_and_empty_are_rejected() {
    let long = format!("!mf {}", "x".repeat(300));
    let inbox = StubInbox::with(vec![
        convo("empty", BOB, "!mf   ", friend()),
        convo("long", ALICE, &long, friend()),
    ]);
    let mut processor = processor(&inbox, Arc::new(MemoryStateStore::new()), RuntimeState::default());

    processor.run_cycle().await.unwrap();

    assert_eq!(
        inbox.effects(),
        vec![
            reply("long", replies::TOO_LONG),
            mark_read("long"),
            reply("empty", replies::EMPTY),
            mark_read("empty"),
        ]
    );
}

#[tokio::test]
async fn valid_content_is_published_once() {
    let mut c = convo("c1", ALICE, "!mf hello @bob", friend());
    if let Some(LastMessage::Live(message)) = &mut c.last_message {
        message.facets = vec![Facet {
            index: ByteSlice {
                byte_start: 10,
                byte_end: 14,
            },
            features: vec![serde_json::json!({
                "$type": "app.bsky.richtext.facet#mention",
                "did": BOB
            })],
        }];
    }
    let inbox = StubInbox::with(vec![c]);
    let mut processor = processor(&inbox, Arc::new(MemoryStateStore::new()), RuntimeState::default());

    let summary = processor.run_cycle().await.unwrap();

    let published: Vec<Post> = inbox
        .events()
        .into_iter()
        .filter_map(|e| match e {
            Event::Publish(post) => Some(post),
            _ => None,
        })
        .collect();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].text, "hello @bob");
    assert_eq!(published[0].facets[0].index.byte_start, 6);
    assert_eq!(published[0].facets[0].index.byte_end, 10);

    let effects = inbox.effects();
    assert_eq!(effects[1..], [reply("c1", replies::SENT), mark_read("c1")]);
    assert_eq!(summary.published, 1);
}

#[tokio::test]
async fn bare_prefix_is_ignored_without_side_effects() {
    let inbox = StubInbox::with(vec![convo("c1", ALICE, "!mf", friend())]);
    let mut processor = processor(&inbox, Arc::new(MemoryStateStore::new()), RuntimeState::default());

    let summary = processor.run_cycle().await.unwrap();

    assert!(inbox.effects().is_empty());
    assert_eq!(summary.acted, 0);
    assert_eq!(summary.seen, 1);
}

#[tokio::test]
async fn watch_disabled_leaves_content_unread() {
    let inbox = StubInbox::with(vec![convo("c1", ALICE, "!mf hello", friend())]);
    let state = RuntimeState {
        watch_enabled: false,
        require_followback: true,
    };
    let mut processor = processor(&inbox, Arc::new(MemoryStateStore::new()), state);

    processor.run_cycle().await.unwrap();

    assert!(inbox.effects().is_empty());
}

// ── Cycle behavior ──────────────────────────────────────────────────

#[tokio::test]
async fn conversations_are_handled_oldest_first() {
    // The inbox lists newest activity first.
    let inbox = StubInbox::with(vec![
        convo("newest", ALICE, "!mf third", friend()),
        convo("middle", BOB, "!mf second", friend()),
        convo("oldest", OWNER, "!menfess", friend()),
    ]);
    let mut processor = processor(&inbox, Arc::new(MemoryStateStore::new()), RuntimeState::default());

    processor.run_cycle().await.unwrap();

    // The owner's older "off" command wins over both newer submissions.
    assert_eq!(inbox.events()[0], Event::List(PAGE_LIMIT));
    assert_eq!(inbox.effects(), vec![reply("oldest", replies::WATCH_OFF), mark_read("oldest")]);
}

#[tokio::test]
async fn mark_reads_match_non_skipped_conversations() {
    let mut read = convo("read", ALICE, "!mf already handled", friend());
    read.unread_count = 0;
    let mut own = convo("own", ALICE, "x", friend());
    own.last_message = Some(LastMessage::Live(Message {
        id: "m".into(),
        sender_did: BOT.into(),
        text: replies::SENT.into(),
        facets: vec![],
    }));
    let mut deleted = convo("deleted", BOB, "x", friend());
    deleted.last_message = Some(LastMessage::Deleted {
        sender_did: BOB.into(),
    });
    let blocked = convo(
        "blocked",
        BOB,
        "!mf hi",
        RelationshipView {
            blocking: true,
            ..friend()
        },
    );

    let inbox = StubInbox::with(vec![
        read,
        own,
        deleted,
        blocked,
        convo("ok", ALICE, "!mf hi", friend()),
        convo("cmd", OWNER, "!followback", friend()),
        convo("chatter", BOB, "hello there", friend()),
    ]);
    let mut processor = processor(&inbox, Arc::new(MemoryStateStore::new()), RuntimeState::default());

    let summary = processor.run_cycle().await.unwrap();

    let mark_reads = inbox.count(|e| matches!(e, Event::MarkRead(_)));
    assert_eq!(summary.seen, 7);
    assert_eq!(summary.acted, 3);
    assert_eq!(mark_reads, summary.acted);
}

#[tokio::test]
async fn second_cycle_skips_handled_conversations() {
    let inbox = StubInbox::with(vec![convo("c1", ALICE, "!mf hello", friend())]);
    let mut processor = processor(&inbox, Arc::new(MemoryStateStore::new()), RuntimeState::default());

    processor.run_cycle().await.unwrap();
    let after_first = inbox.effects().len();
    let summary = processor.run_cycle().await.unwrap();

    assert_eq!(inbox.effects().len(), after_first);
    assert_eq!(summary.acted, 0);
}

#[tokio::test]
async fn list_failure_aborts_cycle() {
    let inbox = Arc::new(StubInbox {
        fail_list: true,
        ..StubInbox::default()
    });
    let mut processor = processor(&inbox, Arc::new(MemoryStateStore::new()), RuntimeState::default());

    let err = processor.run_cycle().await.unwrap_err();

    assert!(matches!(err, Error::Gateway(GatewayError::Request { .. })));
    assert!(inbox.effects().is_empty());
}

#[tokio::test]
async fn one_failing_conversation_does_not_abort_the_rest() {
    let stranger = RelationshipView {
        followed_by: false,
        ..friend()
    };
    let inbox = Arc::new(StubInbox {
        inbox: Mutex::new(vec![
            convo("fine", BOB, "!mf second", friend()),
            convo("broken", ALICE, "!mf first", stranger),
        ]),
        fail_reply_for: HashSet::from(["broken".to_string()]),
        ..StubInbox::default()
    });
    let mut processor = processor(&inbox, Arc::new(MemoryStateStore::new()), RuntimeState::default());

    let summary = processor.run_cycle().await.unwrap();

    assert_eq!(summary.acted, 2);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.published, 1);
    // The rejection reply failed, so "broken" stays unread for a retry.
    assert_eq!(inbox.count(|e| matches!(e, Event::Publish(_))), 1);
    assert_eq!(inbox.count(|e| *e == mark_read("broken")), 0);
    assert_eq!(inbox.count(|e| *e == mark_read("fine")), 1);
}

#[tokio::test]
async fn accepted_post_publishes_once_when_confirmation_fails() {
    let inbox = Arc::new(StubInbox {
        inbox: Mutex::new(vec![convo("c1", ALICE, "!mf hello", friend())]),
        fail_reply_for: HashSet::from(["c1".to_string()]),
        ..StubInbox::default()
    });
    let mut processor = processor(&inbox, Arc::new(MemoryStateStore::new()), RuntimeState::default());

    let first = processor.run_cycle().await.unwrap();
    processor.run_cycle().await.unwrap();

    assert_eq!((first.published, first.failed), (1, 0));
    assert_eq!(inbox.count(|e| matches!(e, Event::Publish(_))), 1);
    assert_eq!(inbox.count(|e| *e == mark_read("c1")), 1);
}

#[tokio::test]
async fn accepted_post_publishes_once_when_mark_read_fails() {
    let inbox = Arc::new(StubInbox {
        inbox: Mutex::new(vec![convo("c1", ALICE, "!mf hello", friend())]),
        fail_mark_read_once: Mutex::new(HashSet::from(["c1".to_string()])),
        ..StubInbox::default()
    });
    let mut processor = processor(&inbox, Arc::new(MemoryStateStore::new()), RuntimeState::default());

    let first = processor.run_cycle().await.unwrap();
    let second = processor.run_cycle().await.unwrap();

    assert_eq!(first.failed, 1);
    assert_eq!((second.acted, second.failed, second.published), (1, 0, 0));
    assert_eq!(inbox.count(|e| matches!(e, Event::Publish(_))), 1);
    assert_eq!(inbox.count(|e| *e == reply("c1", replies::SENT)), 1);
    assert_eq!(inbox.count(|e| *e == mark_read("c1")), 1);
}

// ── Launch report ───────────────────────────────────────────────────

#[tokio::test]
async fn launch_report_goes_to_owner() {
    let inbox = StubInbox::with(vec![]);
    let state = RuntimeState {
        watch_enabled: true,
        require_followback: false,
    };
    let processor = processor(&inbox, Arc::new(MemoryStateStore::new()), state);

    processor.report_status().await.unwrap();

    let convo_id = format!("convo-with-{OWNER}");
    assert_eq!(
        inbox.events(),
        vec![
            Event::GetOrCreate(OWNER.into()),
            reply(&convo_id, &replies::launch_report(&state)),
        ]
    );
}

// ── Scheduler integration ───────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn scheduler_drives_cycles_and_returns_processor() {
    let inbox = StubInbox::with(vec![convo("c1", OWNER, "!menfess", friend())]);
    let store = MemoryStateStore::new();
    let processor = processor(&inbox, Arc::new(store.clone()), RuntimeState::default());

    let errors = Arc::new(Mutex::new(0usize));
    let error_count = Arc::clone(&errors);
    let handle = spawn_interval(Duration::from_millis(5_000), processor, move |_e: Error| {
        *error_count.lock().unwrap() += 1;
    });

    tokio::time::sleep(Duration::from_millis(12_000)).await;
    let processor = handle.shutdown().await.unwrap();

    // Cycles at 0s, 5s and 10s; only the first had anything to do.
    assert_eq!(inbox.count(|e| matches!(e, Event::List(_))), 3);
    assert!(!processor.state().watch_enabled);
    assert_eq!(store.write_count().await, 1);
    assert_eq!(*errors.lock().unwrap(), 0);
}

#[tokio::test(start_paused = true)]
async fn scheduler_keeps_running_after_failed_cycles() {
    let inbox = Arc::new(StubInbox {
        fail_list: true,
        ..StubInbox::default()
    });
    let processor = processor(&inbox, Arc::new(MemoryStateStore::new()), RuntimeState::default());

    let errors = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&errors);
    let handle = spawn_interval(Duration::from_millis(1_000), processor, move |e: Error| {
        sink.lock().unwrap().push(e.to_string());
    });

    tokio::time::sleep(Duration::from_millis(2_500)).await;
    handle.shutdown().await.unwrap();

    let errors = errors.lock().unwrap();
    assert_eq!(errors.len(), 3);
    assert!(errors[0].contains("connection reset"));
}
