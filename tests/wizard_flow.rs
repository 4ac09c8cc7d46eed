//! End-to-end wizard tests.
//!
//! Each test drives an `OpsPlanBot` with hand-built events and a transport
//! that records everything the bot sends. No network, no stdin.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rand::SeedableRng;
use rand::rngs::StdRng;

use opsplan_bot::bot::{BotEvent, OpsPlanBot};
use opsplan_bot::config::WizardConfig;
use opsplan_bot::error::TransportError;
use opsplan_bot::render::NO_COMMENT;
use opsplan_bot::session::InMemorySessionStore;
use opsplan_bot::transport::{
    EventStream, InboundEvent, IncomingMessage, MenuSelection, MessageRef, Transport,
};
use opsplan_bot::wizard::{Menu, Step, WizardState};

/// Maximum time any test waits on a timer before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(5);

const LEAD: &str = "lead-1";
const CHANNEL: &str = "ops";

#[derive(Debug, Clone, PartialEq)]
enum Sent {
    Message {
        channel_id: String,
        text: String,
    },
    Menu {
        message: MessageRef,
        owner_id: String,
        text: String,
        menu: Menu,
    },
    Update {
        message: MessageRef,
        text: String,
        menu: Option<Menu>,
    },
}

/// Transport that remembers every outbound call. It can be told to fail the
/// next menu post or update.
#[derive(Default)]
struct RecordingTransport {
    sent: Mutex<Vec<Sent>>,
    next_id: AtomicU64,
    fail_next_menu: AtomicBool,
    fail_next_update: AtomicBool,
}

impl RecordingTransport {
    fn fail_next_menu(&self) {
        self.fail_next_menu.store(true, Ordering::SeqCst);
    }

    fn fail_next_update(&self) {
        self.fail_next_update.store(true, Ordering::SeqCst);
    }

    fn outage(&self) -> TransportError {
        TransportError::UpdateFailed {
            name: "recording".into(),
            reason: "gateway unavailable".into(),
        }
    }

    fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    fn count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    fn last(&self) -> Sent {
        self.sent.lock().unwrap().last().cloned().expect("nothing sent")
    }

    /// The menu currently showing, from the latest menu post or update.
    fn current_menu(&self) -> Option<Menu> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find_map(|s| match s {
                Sent::Menu { menu, .. } => Some(Some(menu.clone())),
                Sent::Update { menu, .. } => Some(menu.clone()),
                Sent::Message { .. } => None,
            })
            .flatten()
    }

    fn messages(&self) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Message { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }

    fn record(&self, sent: Sent) {
        self.sent.lock().unwrap().push(sent);
    }

    fn next_ref(&self, channel_id: &str) -> MessageRef {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        MessageRef::new(channel_id, format!("m{id}"))
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    fn name(&self) -> &str {
        "recording"
    }

    async fn start(&self) -> Result<EventStream, TransportError> {
        Ok(Box::pin(futures::stream::empty()))
    }

    async fn send_message(
        &self,
        channel_id: &str,
        text: &str,
    ) -> Result<MessageRef, TransportError> {
        self.record(Sent::Message {
            channel_id: channel_id.to_string(),
            text: text.to_string(),
        });
        Ok(self.next_ref(channel_id))
    }

    async fn send_menu(
        &self,
        channel_id: &str,
        owner_id: &str,
        text: &str,
        menu: &Menu,
    ) -> Result<MessageRef, TransportError> {
        if self.fail_next_menu.swap(false, Ordering::SeqCst) {
            return Err(self.outage());
        }
        let message = self.next_ref(channel_id);
        self.record(Sent::Menu {
            message: message.clone(),
            owner_id: owner_id.to_string(),
            text: text.to_string(),
            menu: menu.clone(),
        });
        Ok(message)
    }

    async fn update_message(
        &self,
        message: &MessageRef,
        text: &str,
        menu: Option<&Menu>,
    ) -> Result<(), TransportError> {
        if self.fail_next_update.swap(false, Ordering::SeqCst) {
            return Err(self.outage());
        }
        self.record(Sent::Update {
            message: message.clone(),
            text: text.to_string(),
            menu: menu.cloned(),
        });
        Ok(())
    }

    async fn health_check(&self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

// ── Fixtures ────────────────────────────────────────────────────────

struct Harness {
    bot: OpsPlanBot,
    transport: Arc<RecordingTransport>,
    _data: tempfile::TempDir,
}

fn write_sources(dir: &Path) {
    std::fs::write(
        dir.join("people.csv"),
        "label,value,phone,username\n\
         Alice,u-alice,12345678,@alice\n\
         Bob,u-bob,87654321,\n\
         Carol,u-carol,,@carol\n",
    )
    .unwrap();
    std::fs::write(dir.join("places.csv"), "label\nNorth\nSouth\nHarbour\n").unwrap();
}

fn harness_with(configure: impl FnOnce(&mut WizardConfig)) -> Harness {
    let data = tempfile::tempdir().unwrap();
    write_sources(data.path());

    let mut config = WizardConfig {
        people_path: data.path().join("people.csv"),
        places_path: data.path().join("places.csv"),
        container_codes: vec!["1602".to_string()],
        ..WizardConfig::default()
    };
    configure(&mut config);

    let transport = Arc::new(RecordingTransport::default());
    let bot = OpsPlanBot::new(
        config,
        transport.clone(),
        Box::new(InMemorySessionStore::new()),
    )
    .with_rng(StdRng::seed_from_u64(42));

    Harness {
        bot,
        transport,
        _data: data,
    }
}

fn harness() -> Harness {
    harness_with(|_| {})
}

fn say(user: &str, channel: &str, body: &str) -> BotEvent {
    InboundEvent::Message(IncomingMessage::new(channel, user, body).with_user_name("Dana")).into()
}

fn trigger(user: &str) -> BotEvent {
    say(user, CHANNEL, "!opsplan")
}

fn select(user: &str, message: &MessageRef, widget_id: &str, values: &[&str]) -> BotEvent {
    InboundEvent::Selection(MenuSelection {
        channel_id: message.channel_id.clone(),
        user_id: user.to_string(),
        user_handle: None,
        message: message.clone(),
        widget_id: widget_id.to_string(),
        values: values.iter().map(|v| v.to_string()).collect(),
    })
    .into()
}

impl Harness {
    fn step(&self, user: &str) -> Option<Step> {
        self.bot.sessions().get(user).map(|s| s.state.step())
    }

    fn menu_ref(&self, user: &str) -> MessageRef {
        self.bot
            .sessions()
            .get(user)
            .and_then(|s| s.menu_message.clone())
            .expect("no menu posted")
    }

    /// Trigger and answer every menu, leaving the wizard on the comment step.
    async fn walk_to_comment(&mut self, user: &str) -> MessageRef {
        self.bot.handle_event(trigger(user)).await;
        let menu = self.menu_ref(user);
        let answers: [(&str, &[&str]); 6] = [
            ("opsplan:people", &["u-alice", "u-bob"]),
            ("opsplan:place:0", &["North"]),
            ("opsplan:place:1", &["South"]),
            ("opsplan:workload", &["30"]),
            ("opsplan:goal", &["90"]),
            ("opsplan:days_inactive", &["2"]),
        ];
        for (widget, values) in answers {
            self.bot.handle_event(select(user, &menu, widget, values)).await;
        }
        assert_eq!(self.step(user), Some(Step::Comment));
        menu
    }
}

// ── Scenarios ───────────────────────────────────────────────────────

#[tokio::test]
async fn full_run_posts_summary_and_deletes_session() {
    let mut h = harness();

    h.bot.handle_event(trigger(LEAD)).await;
    let Sent::Menu {
        message,
        owner_id,
        menu,
        ..
    } = h.transport.last()
    else {
        panic!("trigger should post a menu");
    };
    assert_eq!(message.channel_id, CHANNEL);
    assert_eq!(owner_id, LEAD);
    assert_eq!(menu.widget_id, "opsplan:people");
    assert_eq!(menu.choices.len(), 3);
    assert_eq!(h.step(LEAD), Some(Step::People));

    h.bot
        .handle_event(select(LEAD, &message, "opsplan:people", &["u-alice", "u-bob"]))
        .await;
    let Sent::Update { text, menu, .. } = h.transport.last() else {
        panic!("selection should update the menu");
    };
    assert!(text.starts_with("You selected: Alice, Bob"));
    assert_eq!(menu.unwrap().widget_id, "opsplan:place:0");

    h.bot
        .handle_event(select(LEAD, &message, "opsplan:place:0", &["North"]))
        .await;
    assert_eq!(
        h.transport.current_menu().unwrap().placeholder,
        "Where should Bob drive?"
    );
    h.bot
        .handle_event(select(LEAD, &message, "opsplan:place:1", &["South"]))
        .await;
    assert_eq!(h.step(LEAD), Some(Step::WorkloadPercentage));

    for (widget, value) in [
        ("opsplan:workload", "30"),
        ("opsplan:goal", "90"),
        ("opsplan:days_inactive", "2"),
    ] {
        h.bot.handle_event(select(LEAD, &message, widget, &[value])).await;
    }
    let Sent::Update { text, menu, .. } = h.transport.last() else {
        panic!("last answer should update the menu");
    };
    assert!(menu.is_none());
    assert!(text.contains("Please enter your comment below"));

    h.bot.handle_event(say(LEAD, CHANNEL, "all clear")).await;

    assert!(h.bot.sessions().get(LEAD).is_none());
    let Sent::Message { channel_id, text: summary } = h.transport.last() else {
        panic!("completion should post the summary");
    };
    assert_eq!(channel_id, CHANNEL);
    assert!(summary.contains("Shift lead: Dana"));
    assert!(summary.contains("- Availability: 90%"));
    assert!(summary.contains("- Alice (@alice) "));
    assert!(summary.lines().any(|l| l.starts_with("- Bob ") && l.ends_with(" South")));
    assert!(summary.contains("🔄 30% inactive for 2 days."));
    assert!(summary.contains("40% in clusters."));
    assert!(summary.contains("45% on inactives."));
    assert!(summary.contains("- Code 1: 1602"));
    assert!(summary.contains("• Alice: 12345678"));
    assert!(summary.contains("• Bob: 87654321"));
    assert!(summary.contains("*Comment*:\nall clear"));
}

#[tokio::test]
async fn second_trigger_replaces_first_session() {
    let mut h = harness();

    h.bot.handle_event(trigger(LEAD)).await;
    let first_menu = h.menu_ref(LEAD);
    let first_id = h.bot.sessions().get(LEAD).unwrap().id;
    h.bot
        .handle_event(select(LEAD, &first_menu, "opsplan:people", &["u-alice"]))
        .await;
    assert_eq!(h.step(LEAD), Some(Step::Place(0)));

    h.bot.handle_event(trigger(LEAD)).await;
    let closed = h.transport.sent().into_iter().any(|s| {
        matches!(s, Sent::Update { ref message, menu: None, ref text }
            if *message == first_menu && text.contains("replaced"))
    });
    assert!(closed, "the abandoned menu should be closed");
    let session = h.bot.sessions().get(LEAD).unwrap();
    assert_ne!(session.id, first_id);
    assert_eq!(session.state, WizardState::AwaitingPeople);
    assert!(session.state.people().is_empty());
    assert!(session.state.assignments().is_empty());
    assert_eq!(h.bot.sessions().len(), 1);

    // Taps on the abandoned menu go nowhere.
    let before = h.transport.count();
    h.bot
        .handle_event(select(LEAD, &first_menu, "opsplan:place:0", &["North"]))
        .await;
    assert_eq!(h.transport.count(), before);
    assert_eq!(h.step(LEAD), Some(Step::People));
}

#[tokio::test]
async fn empty_people_selection_reissues_menu_with_notice() {
    let mut h = harness();
    h.bot.handle_event(trigger(LEAD)).await;
    let menu = h.menu_ref(LEAD);

    h.bot
        .handle_event(select(LEAD, &menu, "opsplan:people", &[]))
        .await;

    assert_eq!(h.step(LEAD), Some(Step::People));
    let shown = h.transport.current_menu().unwrap();
    assert_eq!(shown.widget_id, "opsplan:people");
    assert!(shown.notice.is_some());
}

#[tokio::test]
async fn unknown_place_reissues_same_driver_menu() {
    let mut h = harness();
    h.bot.handle_event(trigger(LEAD)).await;
    let menu = h.menu_ref(LEAD);
    h.bot
        .handle_event(select(LEAD, &menu, "opsplan:people", &["u-carol"]))
        .await;

    h.bot
        .handle_event(select(LEAD, &menu, "opsplan:place:0", &["Atlantis"]))
        .await;

    assert_eq!(h.step(LEAD), Some(Step::Place(0)));
    let shown = h.transport.current_menu().unwrap();
    assert_eq!(shown.widget_id, "opsplan:place:0");
    assert!(shown.notice.is_some());
}

#[tokio::test]
async fn missing_places_file_sends_notice_and_creates_no_session() {
    let mut h = harness_with(|c| c.places_path = c.places_path.with_file_name("gone.csv"));

    h.bot.handle_event(trigger(LEAD)).await;

    assert!(h.bot.sessions().get(LEAD).is_none());
    let Sent::Message { channel_id, text } = h.transport.last() else {
        panic!("expected a failure notice");
    };
    assert_eq!(channel_id, CHANNEL);
    assert!(!text.contains("gone.csv"));
    assert!(text.contains("try again later"));
}

#[tokio::test]
async fn selection_without_session_gets_gentle_notice() {
    let mut h = harness();
    let stale = MessageRef::new(CHANNEL, "m99");

    h.bot
        .handle_event(select(LEAD, &stale, "opsplan:workload", &["30"]))
        .await;

    assert!(h.bot.sessions().is_empty());
    let notices = h.transport.messages();
    assert_eq!(notices.len(), 1);
    assert!(notices[0].contains("no longer active"));
}

#[tokio::test]
async fn selection_for_another_step_is_ignored() {
    let mut h = harness();
    h.bot.handle_event(trigger(LEAD)).await;
    let menu = h.menu_ref(LEAD);
    let before = h.transport.count();

    h.bot
        .handle_event(select(LEAD, &menu, "opsplan:workload", &["30"]))
        .await;

    assert_eq!(h.transport.count(), before);
    assert_eq!(h.step(LEAD), Some(Step::People));
}

#[tokio::test]
async fn users_have_independent_sessions() {
    let mut h = harness();
    h.bot.handle_event(trigger("lead-a")).await;
    h.bot.handle_event(trigger("lead-b")).await;
    let menu_a = h.menu_ref("lead-a");

    h.bot
        .handle_event(select("lead-a", &menu_a, "opsplan:people", &["u-bob"]))
        .await;

    assert_eq!(h.step("lead-a"), Some(Step::Place(0)));
    assert_eq!(h.step("lead-b"), Some(Step::People));

    // lead-b cannot answer lead-a's menu.
    h.bot
        .handle_event(select("lead-b", &menu_a, "opsplan:place:0", &["North"]))
        .await;
    assert_eq!(h.step("lead-a"), Some(Step::Place(0)));
}

#[tokio::test]
async fn bot_messages_never_trigger() {
    let mut h = harness();
    let event = InboundEvent::Message(IncomingMessage::new(CHANNEL, "bot-1", "!opsplan").from_bot(true));

    h.bot.handle_event(event.into()).await;

    assert!(h.bot.sessions().is_empty());
    assert!(h.transport.sent().is_empty());
}

#[tokio::test]
async fn comment_must_come_from_the_wizard_channel() {
    let mut h = harness();
    h.walk_to_comment(LEAD).await;
    let before = h.transport.count();

    h.bot.handle_event(say(LEAD, "elsewhere", "hello")).await;

    assert_eq!(h.transport.count(), before);
    assert_eq!(h.step(LEAD), Some(Step::Comment));
}

#[tokio::test]
async fn comment_window_timeout_completes_with_placeholder() {
    let mut h = harness_with(|c| c.comment_timeout = Duration::from_millis(20));
    h.walk_to_comment(LEAD).await;
    let session_id = h.bot.sessions().get(LEAD).unwrap().id;

    let event = tokio::time::timeout(TEST_TIMEOUT, h.bot.next_internal_event())
        .await
        .expect("comment window never closed")
        .unwrap();
    assert_eq!(
        event,
        BotEvent::CommentWindowClosed {
            user_id: LEAD.to_string(),
            session_id,
        }
    );
    h.bot.handle_event(event).await;

    assert!(h.bot.sessions().get(LEAD).is_none());
    let Sent::Message { text: summary, .. } = h.transport.last() else {
        panic!("timeout should post the summary");
    };
    assert!(summary.contains(NO_COMMENT));
}

#[tokio::test]
async fn stale_comment_window_does_nothing() {
    let mut h = harness();
    h.walk_to_comment(LEAD).await;
    let old_id = h.bot.sessions().get(LEAD).unwrap().id;
    h.bot.handle_event(say(LEAD, CHANNEL, "done")).await;

    // A fresh run reaches the comment step before the old timer fires.
    h.walk_to_comment(LEAD).await;
    let before = h.transport.count();
    h.bot
        .handle_event(BotEvent::CommentWindowClosed {
            user_id: LEAD.to_string(),
            session_id: old_id,
        })
        .await;

    assert_eq!(h.transport.count(), before);
    assert_eq!(h.step(LEAD), Some(Step::Comment));
}

#[tokio::test]
async fn idle_sessions_are_swept_and_users_told() {
    let mut h = harness();
    h.bot.handle_event(trigger(LEAD)).await;
    let menu = h.menu_ref(LEAD);

    h.bot
        .handle_event(BotEvent::SweepIdle {
            at: Utc::now() + chrono::Duration::minutes(5),
        })
        .await;
    assert!(h.bot.sessions().get(LEAD).is_some());

    h.bot
        .handle_event(BotEvent::SweepIdle {
            at: Utc::now() + chrono::Duration::minutes(16),
        })
        .await;
    assert!(h.bot.sessions().get(LEAD).is_none());
    let Sent::Update { message, text, menu: shown } = h.transport.last() else {
        panic!("expiry should update the menu message");
    };
    assert_eq!(message, menu);
    assert!(shown.is_none());
    assert!(text.contains("discarded"));
}

#[tokio::test]
async fn failed_menu_update_leaves_step_answerable() {
    let mut h = harness_with(|c| c.comment_timeout = Duration::from_millis(20));
    h.bot.handle_event(trigger(LEAD)).await;
    let menu = h.menu_ref(LEAD);
    for (widget, values) in [
        ("opsplan:people", &["u-alice"][..]),
        ("opsplan:place:0", &["North"][..]),
        ("opsplan:workload", &["30"][..]),
        ("opsplan:goal", &["90"][..]),
    ] {
        h.bot.handle_event(select(LEAD, &menu, widget, values)).await;
    }
    assert_eq!(h.step(LEAD), Some(Step::DaysInactive));

    h.transport.fail_next_update();
    h.bot
        .handle_event(select(LEAD, &menu, "opsplan:days_inactive", &["2"]))
        .await;

    assert_eq!(h.step(LEAD), Some(Step::DaysInactive));
    let Sent::Message { text, .. } = h.transport.last() else {
        panic!("the failure should be reported");
    };
    assert!(text.contains("try again later"));

    // Answering the menu still on screen goes through and arms the timer.
    h.bot
        .handle_event(select(LEAD, &menu, "opsplan:days_inactive", &["2"]))
        .await;
    assert_eq!(h.step(LEAD), Some(Step::Comment));
    let event = tokio::time::timeout(TEST_TIMEOUT, h.bot.next_internal_event())
        .await
        .expect("comment window was never armed")
        .unwrap();
    assert!(matches!(event, BotEvent::CommentWindowClosed { .. }));
}

#[tokio::test]
async fn failed_trigger_still_discards_previous_plan() {
    let mut h = harness();
    h.bot.handle_event(trigger(LEAD)).await;
    let first_menu = h.menu_ref(LEAD);

    h.transport.fail_next_menu();
    h.bot.handle_event(trigger(LEAD)).await;

    assert!(h.bot.sessions().get(LEAD).is_none());
    let Sent::Message { text, .. } = h.transport.last() else {
        panic!("the failure should be reported");
    };
    assert!(text.contains("try again later"));

    h.bot
        .handle_event(select(LEAD, &first_menu, "opsplan:people", &["u-alice"]))
        .await;
    assert!(h.transport.messages().last().unwrap().contains("no longer active"));
}

#[tokio::test]
async fn edit_command_rewrites_last_plan() {
    let mut h = harness();
    h.walk_to_comment(LEAD).await;
    h.bot.handle_event(say(LEAD, CHANNEL, "all clear")).await;
    let plan = h.bot.last_plan(LEAD).cloned().expect("plan was posted");

    h.bot
        .handle_event(say(LEAD, CHANNEL, "!editplan Harbour is closed today"))
        .await;

    let sent = h.transport.sent();
    let edit = &sent[sent.len() - 2];
    assert_eq!(
        *edit,
        Sent::Update {
            message: plan,
            text: "Harbour is closed today".into(),
            menu: None,
        }
    );
    assert_eq!(h.transport.messages().last().unwrap(), "Plan updated.");
}

#[tokio::test]
async fn edit_command_needs_content() {
    let mut h = harness();

    h.bot.handle_event(say(LEAD, CHANNEL, "!editplan")).await;

    let notices = h.transport.messages();
    assert_eq!(notices.len(), 1);
    assert!(notices[0].contains("Usage: !editplan"));
}

#[tokio::test]
async fn edit_command_without_plan_in_channel() {
    let mut h = harness();
    h.bot.handle_event(say(LEAD, CHANNEL, "!editplan nothing yet")).await;
    assert!(h.transport.messages()[0].contains("can't find a plan"));

    h.walk_to_comment(LEAD).await;
    h.bot.handle_event(say(LEAD, CHANNEL, "ok")).await;
    let before = h.transport.count();

    h.bot
        .handle_event(say(LEAD, "elsewhere", "!editplan wrong room"))
        .await;

    let sent = h.transport.sent();
    assert_eq!(sent.len(), before + 1);
    assert!(!sent.iter().any(|s| matches!(s, Sent::Update { text, .. } if text == "wrong room")));
    assert!(h.transport.messages().last().unwrap().contains("can't find a plan"));
}
