//! Session store — in-progress wizards keyed by user id.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::options::MenuOption;
use crate::transport::MessageRef;
use crate::wizard::{StepOptions, WizardState};

/// One user's wizard in flight.
#[derive(Debug, Clone)]
pub struct Session {
    /// Distinguishes this run from earlier ones by the same user.
    pub id: Uuid,
    pub user_id: String,
    /// Channel the trigger came from; the comment must arrive here too.
    pub channel_id: String,
    /// Display name of whoever triggered the wizard.
    pub author_name: String,
    pub state: WizardState,
    /// People source loaded at trigger time.
    pub people_options: Arc<Vec<MenuOption>>,
    /// Place source, loaded once and reused for every per-driver menu.
    pub place_options: Arc<Vec<MenuOption>>,
    /// The message carrying the menu the wizard currently accepts.
    pub menu_message: Option<MessageRef>,
    pub last_activity: DateTime<Utc>,
}

impl Session {
    pub fn new(
        user_id: impl Into<String>,
        channel_id: impl Into<String>,
        author_name: impl Into<String>,
        people_options: Arc<Vec<MenuOption>>,
        place_options: Arc<Vec<MenuOption>>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            channel_id: channel_id.into(),
            author_name: author_name.into(),
            state: WizardState::default(),
            people_options,
            place_options,
            menu_message: None,
            last_activity: now,
        }
    }

    pub fn options(&self) -> StepOptions<'_> {
        StepOptions {
            people: &self.people_options,
            places: &self.place_options,
        }
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_activity = now;
    }

    pub fn is_idle(&self, now: DateTime<Utc>, max_idle: Duration) -> bool {
        now - self.last_activity >= max_idle
    }
}

/// Storage for active sessions.
///
/// Handlers only ever touch the session of the user whose event they are
/// handling, so implementations need no cross-user coordination.
pub trait SessionStore: Send {
    fn get(&self, user_id: &str) -> Option<&Session>;

    fn get_mut(&mut self, user_id: &str) -> Option<&mut Session>;

    /// Store a fresh session, returning any session it replaced.
    fn create(&mut self, session: Session) -> Option<Session>;

    fn delete(&mut self, user_id: &str) -> Option<Session>;

    /// Remove and return every session idle for at least `max_idle`.
    fn evict_idle(&mut self, now: DateTime<Utc>, max_idle: Duration) -> Vec<Session>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Process-local session store. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: HashMap<String, Session>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for InMemorySessionStore {
    fn get(&self, user_id: &str) -> Option<&Session> {
        self.sessions.get(user_id)
    }

    fn get_mut(&mut self, user_id: &str) -> Option<&mut Session> {
        self.sessions.get_mut(user_id)
    }

    fn create(&mut self, session: Session) -> Option<Session> {
        let replaced = self.sessions.insert(session.user_id.clone(), session);
        if let Some(ref old) = replaced {
            tracing::info!(
                user_id = %old.user_id,
                session_id = %old.id,
                step = %old.state.step(),
                "Discarding unfinished ops plan"
            );
        }
        replaced
    }

    fn delete(&mut self, user_id: &str) -> Option<Session> {
        self.sessions.remove(user_id)
    }

    fn evict_idle(&mut self, now: DateTime<Utc>, max_idle: Duration) -> Vec<Session> {
        let idle: Vec<String> = self
            .sessions
            .values()
            .filter(|s| s.is_idle(now, max_idle))
            .map(|s| s.user_id.clone())
            .collect();

        let evicted: Vec<Session> = idle
            .iter()
            .filter_map(|user_id| self.sessions.remove(user_id))
            .collect();

        if !evicted.is_empty() {
            tracing::info!(count = evicted.len(), "Evicted idle ops plans");
        }
        evicted
    }

    fn len(&self) -> usize {
        self.sessions.len()
    }
}
