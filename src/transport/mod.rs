//! Transport abstraction: the chat gateway the wizard talks through.
//!
//! A transport delivers inbound messages and menu selections as a stream,
//! and carries outbound messages, menus, and message updates back to users.

pub mod cli;
pub mod telegram;

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::error::TransportError;
use crate::wizard::Menu;

pub use cli::CliTransport;
pub use telegram::TelegramTransport;

/// Identifies a message the bot posted, so it can be updated later.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageRef {
    pub channel_id: String,
    pub message_id: String,
}

impl MessageRef {
    pub fn new(channel_id: impl Into<String>, message_id: impl Into<String>) -> Self {
        Self {
            channel_id: channel_id.into(),
            message_id: message_id.into(),
        }
    }
}

/// A text message seen by the bot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    pub channel_id: String,
    pub user_id: String,
    /// Display name used as the shift lead in the summary.
    pub user_name: String,
    /// Platform username, when the platform has one.
    pub user_handle: Option<String>,
    pub text: String,
    /// Sent by a bot account (including this one).
    pub from_bot: bool,
}

impl IncomingMessage {
    pub fn new(
        channel_id: impl Into<String>,
        user_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        let user_id = user_id.into();
        Self {
            channel_id: channel_id.into(),
            user_name: user_id.clone(),
            user_id,
            user_handle: None,
            text: text.into(),
            from_bot: false,
        }
    }

    pub fn with_user_name(mut self, name: impl Into<String>) -> Self {
        self.user_name = name.into();
        self
    }

    pub fn with_user_handle(mut self, handle: impl Into<String>) -> Self {
        self.user_handle = Some(handle.into());
        self
    }

    pub fn from_bot(mut self, from_bot: bool) -> Self {
        self.from_bot = from_bot;
        self
    }
}

/// Values a user submitted in a menu widget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuSelection {
    pub channel_id: String,
    pub user_id: String,
    /// Platform username of whoever tapped, when the platform has one.
    pub user_handle: Option<String>,
    /// The message the menu was attached to.
    pub message: MessageRef,
    pub widget_id: String,
    pub values: Vec<String>,
}

/// Everything a transport can deliver to the bot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    Message(IncomingMessage),
    Selection(MenuSelection),
}

impl InboundEvent {
    pub fn user_id(&self) -> &str {
        match self {
            Self::Message(m) => &m.user_id,
            Self::Selection(s) => &s.user_id,
        }
    }

    pub fn user_handle(&self) -> Option<&str> {
        match self {
            Self::Message(m) => m.user_handle.as_deref(),
            Self::Selection(s) => s.user_handle.as_deref(),
        }
    }

    pub fn channel_id(&self) -> &str {
        match self {
            Self::Message(m) => &m.channel_id,
            Self::Selection(s) => &s.channel_id,
        }
    }
}

/// Stream of inbound events from a transport.
pub type EventStream = Pin<Box<dyn Stream<Item = InboundEvent> + Send>>;

/// A chat gateway.
#[async_trait]
pub trait Transport: Send + Sync {
    fn name(&self) -> &str;

    /// Begin delivering inbound events.
    async fn start(&self) -> Result<EventStream, TransportError>;

    /// Post a plain message.
    async fn send_message(&self, channel_id: &str, text: &str)
    -> Result<MessageRef, TransportError>;

    /// Post a message with a menu attached. Only `owner_id` may answer it.
    async fn send_menu(
        &self,
        channel_id: &str,
        owner_id: &str,
        text: &str,
        menu: &Menu,
    ) -> Result<MessageRef, TransportError>;

    /// Replace a posted message's text and menu. `None` removes the menu.
    async fn update_message(
        &self,
        message: &MessageRef,
        text: &str,
        menu: Option<&Menu>,
    ) -> Result<(), TransportError>;

    async fn health_check(&self) -> Result<(), TransportError>;

    async fn shutdown(&self) -> Result<(), TransportError>;
}

/// Text of a menu message: the rejection notice (if any) on top, then the
/// prompt, then the menu's hint line.
pub(crate) fn menu_text(text: &str, menu: &Menu) -> String {
    let body = format!("{text}\n\n{}", menu_hint(menu));
    match &menu.notice {
        Some(notice) => format!("⚠️ {notice}\n{body}"),
        None => body,
    }
}

/// The placeholder, plus how many entries to pick on multi-select menus.
pub(crate) fn menu_hint(menu: &Menu) -> String {
    if menu.is_multi_select() {
        format!(
            "{} (pick {} to {})",
            menu.placeholder, menu.min_values, menu.max_values
        )
    } else {
        menu.placeholder.clone()
    }
}
