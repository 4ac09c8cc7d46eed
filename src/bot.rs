//! Ops-plan bot. Routes transport events into the wizard.
//!
//! Events are handled one at a time. Each handler runs to completion before
//! the next event is taken, so sessions need no locking. Timers (the comment
//! window and the idle sweep) feed back into the same loop as [`BotEvent`]s.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Local, Utc};
use futures::StreamExt;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::config::WizardConfig;
use crate::error::{Error, Result, WizardError};
use crate::options;
use crate::render::{self, RenderContext};
use crate::session::{Session, SessionStore};
use crate::transport::{InboundEvent, IncomingMessage, MenuSelection, MessageRef, Transport};
use crate::wizard::{
    IgnoreReason, Outcome, Transition, WizardEvent, WizardState, advance, confirmation_for,
    menu_for, prompt_for,
};

/// Everything the bot loop reacts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BotEvent {
    /// Something a user did on the transport.
    Inbound(InboundEvent),
    /// The comment window armed for this session ran out.
    CommentWindowClosed { user_id: String, session_id: Uuid },
    /// Time to drop sessions nobody has touched in a while.
    SweepIdle { at: DateTime<Utc> },
}

impl From<InboundEvent> for BotEvent {
    fn from(event: InboundEvent) -> Self {
        Self::Inbound(event)
    }
}

/// Does this message start a new ops plan?
///
/// Only the first word counts. A `!name` trigger also answers to the
/// Telegram-style `/name` and `/name@botname` commands.
pub fn is_trigger(text: &str, trigger: &str) -> bool {
    let Some(first) = text.split_whitespace().next() else {
        return false;
    };
    if first.eq_ignore_ascii_case(trigger) {
        return true;
    }
    let Some(name) = trigger.strip_prefix('!') else {
        return false;
    };
    let Some(command) = first.strip_prefix('/') else {
        return false;
    };
    let command = command.split_once('@').map_or(command, |(c, _)| c);
    command.eq_ignore_ascii_case(name)
}

/// Everything after the command word, trimmed. Inner newlines are kept.
fn command_argument(text: &str) -> &str {
    text.trim_start()
        .split_once(char::is_whitespace)
        .map_or("", |(_, rest)| rest.trim())
}

pub struct OpsPlanBot {
    config: WizardConfig,
    transport: Arc<dyn Transport>,
    store: Box<dyn SessionStore>,
    rng: StdRng,
    /// The last summary posted for each user, for the edit command.
    last_plans: HashMap<String, MessageRef>,
    internal_tx: mpsc::UnboundedSender<BotEvent>,
    internal_rx: mpsc::UnboundedReceiver<BotEvent>,
}

impl OpsPlanBot {
    pub fn new(
        config: WizardConfig,
        transport: Arc<dyn Transport>,
        store: Box<dyn SessionStore>,
    ) -> Self {
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        Self {
            config,
            transport,
            store,
            rng: StdRng::from_entropy(),
            last_plans: HashMap::new(),
            internal_tx,
            internal_rx,
        }
    }

    /// Replace the verb picker's randomness, e.g. with a seeded generator.
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    pub fn sessions(&self) -> &dyn SessionStore {
        self.store.as_ref()
    }

    /// Where the user's last summary was posted, if the bot posted one.
    pub fn last_plan(&self, user_id: &str) -> Option<&MessageRef> {
        self.last_plans.get(user_id)
    }

    /// Wait for the next timer-driven event.
    pub async fn next_internal_event(&mut self) -> Option<BotEvent> {
        self.internal_rx.recv().await
    }

    /// Start the transport and handle events until its stream ends.
    pub async fn run(mut self) -> Result<()> {
        let mut inbound = self.transport.start().await?;
        tracing::info!(
            transport = self.transport.name(),
            trigger = %self.config.trigger,
            "Ops plan bot ready"
        );

        let period = self.config.sweep_interval;
        let mut sweep = tokio::time::interval_at(tokio::time::Instant::now() + period, period);

        loop {
            let event = tokio::select! {
                next = inbound.next() => match next {
                    Some(event) => BotEvent::Inbound(event),
                    None => break,
                },
                Some(internal) = self.internal_rx.recv() => internal,
                _ = sweep.tick() => BotEvent::SweepIdle { at: Utc::now() },
            };
            self.handle_event(event).await;
        }

        tracing::info!("Transport stream ended, shutting down");
        self.transport.shutdown().await?;
        Ok(())
    }

    /// Handle one event. Errors stop here: they are logged and the user
    /// gets a short notice.
    pub async fn handle_event(&mut self, event: BotEvent) {
        let reply_to = self.reply_channel(&event);

        let Err(err) = self.dispatch(event).await else {
            return;
        };

        match &err {
            Error::Wizard(e) => tracing::warn!(error = %e, "Ops plan event rejected"),
            other => tracing::error!(error = %other, "Ops plan event failed"),
        }

        if let Some(channel_id) = reply_to {
            if let Err(e) = self
                .transport
                .send_message(&channel_id, err.user_notice())
                .await
            {
                tracing::warn!(error = %e, channel_id = %channel_id, "Failed to send error notice");
            }
        }
    }

    fn reply_channel(&self, event: &BotEvent) -> Option<String> {
        match event {
            BotEvent::Inbound(inbound) => Some(inbound.channel_id().to_string()),
            BotEvent::CommentWindowClosed { user_id, .. } => {
                self.store.get(user_id).map(|s| s.channel_id.clone())
            }
            BotEvent::SweepIdle { .. } => None,
        }
    }

    async fn dispatch(&mut self, event: BotEvent) -> Result<()> {
        match event {
            BotEvent::Inbound(InboundEvent::Message(message)) => self.on_message(message).await,
            BotEvent::Inbound(InboundEvent::Selection(selection)) => {
                self.on_selection(selection).await
            }
            BotEvent::CommentWindowClosed {
                user_id,
                session_id,
            } => self.on_comment_window_closed(&user_id, session_id).await,
            BotEvent::SweepIdle { at } => {
                self.sweep_idle(at).await;
                Ok(())
            }
        }
    }

    async fn on_message(&mut self, message: IncomingMessage) -> Result<()> {
        if message.from_bot {
            return Ok(());
        }

        if is_trigger(&message.text, &self.config.trigger) {
            return self.start(message).await;
        }
        if is_trigger(&message.text, &self.config.edit_trigger) {
            return self.edit_plan(message).await;
        }

        let awaiting_comment = self.store.get(&message.user_id).is_some_and(|s| {
            s.channel_id == message.channel_id
                && matches!(s.state, WizardState::AwaitingComment { .. })
        });
        if !awaiting_comment {
            return Ok(());
        }
        self.apply(&message.user_id, WizardEvent::Comment(message.text))
            .await
    }

    /// Load both option sources and open a fresh wizard for the author.
    ///
    /// Whatever the author had in flight is abandoned first, even if this
    /// trigger then fails.
    async fn start(&mut self, message: IncomingMessage) -> Result<()> {
        if let Some(old) = self.store.delete(&message.user_id) {
            self.retire(old).await;
        }

        let (people, places) = tokio::try_join!(
            options::load_required_async(&self.config.people_path),
            options::load_required_async(&self.config.places_path),
        )?;

        let mut session = Session::new(
            message.user_id,
            message.channel_id,
            message.user_name,
            Arc::new(people),
            Arc::new(places),
            Utc::now(),
        );

        let options = session.options();
        let prompt = prompt_for(&session.state, &options);
        let posted = match menu_for(&session.state, &options) {
            Some(menu) => {
                self.transport
                    .send_menu(&session.channel_id, &session.user_id, &prompt, &menu)
                    .await?
            }
            None => self.transport.send_message(&session.channel_id, &prompt).await?,
        };
        session.menu_message = Some(posted);

        tracing::info!(
            user_id = %session.user_id,
            channel_id = %session.channel_id,
            session_id = %session.id,
            people = session.people_options.len(),
            places = session.place_options.len(),
            "Ops plan started"
        );
        self.store.create(session);
        Ok(())
    }

    /// Close an abandoned wizard's menu so it stops taking taps.
    async fn retire(&self, old: Session) {
        tracing::info!(
            user_id = %old.user_id,
            session_id = %old.id,
            step = %old.state.step(),
            "Dropped previous ops plan"
        );
        let Some(posted) = &old.menu_message else {
            return;
        };
        let notice = "This ops plan was replaced by a newer one.";
        if let Err(e) = self.transport.update_message(posted, notice, None).await {
            tracing::warn!(error = %e, user_id = %old.user_id, "Failed to close abandoned menu");
        }
    }

    /// Replace the text of the author's last posted plan in this channel.
    async fn edit_plan(&mut self, message: IncomingMessage) -> Result<()> {
        let new_text = command_argument(&message.text);
        if new_text.is_empty() {
            let usage = format!(
                "You must provide new content to update the plan. Usage: {} <new content>",
                self.config.edit_trigger
            );
            self.transport
                .send_message(&message.channel_id, &usage)
                .await?;
            return Ok(());
        }

        let posted = self
            .last_plans
            .get(&message.user_id)
            .filter(|p| p.channel_id == message.channel_id)
            .cloned();
        let Some(posted) = posted else {
            let notice = format!(
                "I can't find a plan to edit. Did you use {} here?",
                self.config.trigger
            );
            self.transport
                .send_message(&message.channel_id, &notice)
                .await?;
            return Ok(());
        };

        self.transport
            .update_message(&posted, new_text, None)
            .await?;
        tracing::info!(
            user_id = %message.user_id,
            message_id = %posted.message_id,
            "Ops plan edited"
        );
        self.transport
            .send_message(&message.channel_id, "Plan updated.")
            .await?;
        Ok(())
    }

    async fn on_selection(&mut self, selection: MenuSelection) -> Result<()> {
        let Some(session) = self.store.get(&selection.user_id) else {
            return Err(WizardError::SessionMissing {
                user_id: selection.user_id,
            }
            .into());
        };

        if session.menu_message.as_ref() != Some(&selection.message) {
            tracing::debug!(
                user_id = %selection.user_id,
                widget_id = %selection.widget_id,
                "Ignoring selection from an old menu"
            );
            return Ok(());
        }

        let event = WizardEvent::Selection {
            widget_id: selection.widget_id,
            values: selection.values,
        };
        self.apply(&selection.user_id, event).await
    }

    async fn on_comment_window_closed(&mut self, user_id: &str, session_id: Uuid) -> Result<()> {
        let current = self.store.get(user_id).is_some_and(|s| s.id == session_id);
        if !current {
            tracing::debug!(user_id, %session_id, "Comment window closed for a finished plan");
            return Ok(());
        }
        tracing::info!(user_id, %session_id, "Comment window closed without a comment");
        self.apply(user_id, WizardEvent::CommentWindowClosed).await
    }

    /// Run one wizard event against the user's session and show the result.
    async fn apply(&mut self, user_id: &str, event: WizardEvent) -> Result<()> {
        let Some(session) = self.store.get_mut(user_id) else {
            return Err(WizardError::SessionMissing {
                user_id: user_id.to_string(),
            }
            .into());
        };

        let answered = session.state.step();
        let previous = session.state.clone();
        let state = std::mem::take(&mut session.state);
        let Transition { state, outcome } = advance(state, &event, &session.options());
        session.state = state;

        match outcome {
            Outcome::Ignored(reason) => {
                log_ignored(user_id, &reason);
                Ok(())
            }
            Outcome::Rejected(err) => {
                tracing::info!(user_id, step = %answered, error = %err, "Selection rejected");
                session.touch(Utc::now());

                let options = session.options();
                let prompt = prompt_for(&session.state, &options);
                let menu = menu_for(&session.state, &options).map(|m| m.with_notice(err.user_notice()));
                if let Some(posted) = &session.menu_message {
                    self.transport
                        .update_message(posted, &prompt, menu.as_ref())
                        .await?;
                }
                Ok(())
            }
            Outcome::Advanced => {
                session.touch(Utc::now());
                tracing::info!(user_id, from = %answered, to = %session.state.step(), "Wizard advanced");

                if session.state.is_terminal() {
                    return self.finish(user_id).await;
                }

                let options = session.options();
                let prompt = prompt_for(&session.state, &options);
                let text = match confirmation_for(answered, &session.state, &options) {
                    Some(confirmation) => format!("{confirmation}\n\n{prompt}"),
                    None => prompt,
                };
                let menu = menu_for(&session.state, &options);
                if let Some(posted) = &session.menu_message {
                    if let Err(e) = self
                        .transport
                        .update_message(posted, &text, menu.as_ref())
                        .await
                    {
                        // The old menu is still showing; step back so it can
                        // be answered again.
                        session.state = previous;
                        return Err(e.into());
                    }
                }

                if matches!(session.state, WizardState::AwaitingComment { .. }) {
                    let session_id = session.id;
                    self.arm_comment_window(user_id, session_id);
                }
                Ok(())
            }
        }
    }

    /// Render and post the summary, then drop the session.
    async fn finish(&mut self, user_id: &str) -> Result<()> {
        let Some(session) = self.store.delete(user_id) else {
            return Err(WizardError::SessionMissing {
                user_id: user_id.to_string(),
            }
            .into());
        };

        let ctx = RenderContext {
            generated_at: Local::now().naive_local(),
            container_codes: &self.config.container_codes,
        };
        let Some(summary) = render::render(&session, &ctx, &mut self.rng) else {
            tracing::warn!(user_id, step = %session.state.step(), "Finished plan did not render");
            return Ok(());
        };

        let posted = self
            .transport
            .send_message(&session.channel_id, &summary)
            .await?;
        self.last_plans.insert(session.user_id.clone(), posted);
        tracing::info!(
            user_id,
            channel_id = %session.channel_id,
            session_id = %session.id,
            "Ops plan posted"
        );
        Ok(())
    }

    fn arm_comment_window(&self, user_id: &str, session_id: Uuid) {
        let tx = self.internal_tx.clone();
        let timeout = self.config.comment_timeout;
        let user_id = user_id.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            // The bot may already be gone; nothing to do then.
            let _ = tx.send(BotEvent::CommentWindowClosed {
                user_id,
                session_id,
            });
        });
    }

    /// Drop idle sessions and tell their owners.
    async fn sweep_idle(&mut self, at: DateTime<Utc>) {
        let max_idle = chrono::Duration::from_std(self.config.session_idle_timeout)
            .unwrap_or(chrono::Duration::MAX);

        for session in self.store.evict_idle(at, max_idle) {
            tracing::info!(
                user_id = %session.user_id,
                session_id = %session.id,
                step = %session.state.step(),
                "Ops plan expired"
            );
            let notice = format!(
                "Your ops plan was discarded after {} minutes without activity. Send {} to start again.",
                self.config.session_idle_timeout.as_secs() / 60,
                self.config.trigger
            );
            let sent = match &session.menu_message {
                Some(posted) => self.transport.update_message(posted, &notice, None).await,
                None => self
                    .transport
                    .send_message(&session.channel_id, &notice)
                    .await
                    .map(|_| ()),
            };
            if let Err(e) = sent {
                tracing::warn!(error = %e, user_id = %session.user_id, "Failed to send expiry notice");
            }
        }
    }
}

fn log_ignored(user_id: &str, reason: &IgnoreReason) {
    match reason {
        IgnoreReason::WidgetMismatch { expected, received } => tracing::debug!(
            user_id,
            expected = expected.as_deref().unwrap_or("none"),
            received = %received,
            "Ignoring selection for another step"
        ),
        IgnoreReason::NotAwaitingComment => {
            tracing::debug!(user_id, "Ignoring text outside the comment step")
        }
        IgnoreReason::Finished => tracing::debug!(user_id, "Ignoring event for a finished plan"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trigger_matches_first_word() {
        assert!(is_trigger("!opsplan", "!opsplan"));
        assert!(is_trigger("  !OpsPlan please", "!opsplan"));
        assert!(!is_trigger("run !opsplan", "!opsplan"));
        assert!(!is_trigger("!opsplans", "!opsplan"));
        assert!(!is_trigger("", "!opsplan"));
    }

    #[test]
    fn slash_commands_count_for_bang_triggers() {
        assert!(is_trigger("/opsplan", "!opsplan"));
        assert!(is_trigger("/opsplan@ops_bot", "!opsplan"));
        assert!(!is_trigger("/other", "!opsplan"));
    }

    #[test]
    fn slash_alias_needs_a_bang_trigger() {
        assert!(is_trigger("plan", "plan"));
        assert!(!is_trigger("/plan", "plan"));
    }

    #[test]
    fn command_argument_keeps_body() {
        assert_eq!(command_argument("!editplan  new text "), "new text");
        assert_eq!(command_argument("!editplan\nline 1\nline 2"), "line 1\nline 2");
        assert_eq!(command_argument("!editplan"), "");
        assert_eq!(command_argument("  !editplan   "), "");
    }

    #[test]
    fn inbound_events_convert() {
        let msg = IncomingMessage::new("c", "u", "hi");
        let event: BotEvent = InboundEvent::Message(msg.clone()).into();
        assert_eq!(event, BotEvent::Inbound(InboundEvent::Message(msg)));
    }
}
