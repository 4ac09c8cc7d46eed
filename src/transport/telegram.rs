//! Telegram transport — long-polls the Bot API for messages and menu taps.
//!
//! Menus are inline keyboards. Single-select menus submit on the first tap;
//! multi-select menus toggle entries in place and submit on "Done".

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};
use tokio::sync::Mutex;

use super::{
    EventStream, InboundEvent, IncomingMessage, MenuSelection, MessageRef, Transport, menu_text,
};
use crate::error::TransportError;
use crate::wizard::Menu;

/// Maximum message length for Telegram's sendMessage API.
const TELEGRAM_MAX_MESSAGE_LENGTH: usize = 4096;

const DONE_CALLBACK: &str = "done";
const NAME: &str = "telegram";

/// A menu the bot posted, plus the entries toggled on so far.
#[derive(Debug, Clone)]
struct PostedMenu {
    menu: Menu,
    /// Telegram user id allowed to answer. Anyone may when `None`.
    owner_id: Option<String>,
    selected: BTreeSet<usize>,
}

/// What a tap did to a posted menu.
#[derive(Debug, PartialEq, Eq)]
enum TapOutcome {
    /// The menu was answered with these values.
    Submit(Vec<String>),
    /// A multi-select entry flipped; the keyboard needs redrawing.
    Toggled,
    /// Someone other than the owner tapped.
    NotOwner,
    /// The tap pointed at no entry.
    Ignored,
}

impl PostedMenu {
    fn new(menu: Menu, owner_id: Option<String>) -> Self {
        Self {
            menu,
            owner_id,
            selected: BTreeSet::new(),
        }
    }

    fn tap(&mut self, user_id: &str, callback: &Callback) -> TapOutcome {
        if self.owner_id.as_deref().is_some_and(|owner| owner != user_id) {
            return TapOutcome::NotOwner;
        }
        match *callback {
            Callback::Done => TapOutcome::Submit(
                self.selected
                    .iter()
                    .filter_map(|i| self.menu.choices.get(*i))
                    .map(|c| c.value.clone())
                    .collect(),
            ),
            Callback::Choice(index) => {
                let Some(choice) = self.menu.choices.get(index) else {
                    return TapOutcome::Ignored;
                };
                if !self.menu.is_multi_select() {
                    return TapOutcome::Submit(vec![choice.value.clone()]);
                }
                if !self.selected.remove(&index) {
                    self.selected.insert(index);
                }
                TapOutcome::Toggled
            }
        }
    }
}

type MenuRegistry = Arc<Mutex<HashMap<MessageRef, PostedMenu>>>;

/// Thin Bot API client shared by the transport and its poll task.
#[derive(Clone)]
struct BotApi {
    token: Arc<SecretString>,
    client: reqwest::Client,
}

impl BotApi {
    fn url(&self, method: &str) -> String {
        format!(
            "https://api.telegram.org/bot{}/{method}",
            self.token.expose_secret()
        )
    }

    async fn post(&self, method: &str, body: &Value) -> Result<reqwest::Response, TransportError> {
        self.client
            .post(self.url(method))
            .json(body)
            .send()
            .await
            .map_err(|e| TransportError::Http(e.without_url().to_string()))
    }

    /// Call a method and return its `result`, failing on non-2xx.
    async fn call(&self, method: &str, body: &Value) -> Result<Value, TransportError> {
        let resp = self.post(method, body).await?;
        let status = resp.status();
        if !status.is_success() {
            let err = resp.text().await.unwrap_or_default();
            return Err(TransportError::Http(format!("{method} returned {status}: {err}")));
        }
        let data: Value = resp
            .json()
            .await
            .map_err(|e| TransportError::Http(e.without_url().to_string()))?;
        Ok(data.get("result").cloned().unwrap_or(Value::Null))
    }

    async fn answer_callback(&self, callback_id: &str) {
        let body = json!({ "callback_query_id": callback_id });
        if let Err(e) = self.call("answerCallbackQuery", &body).await {
            tracing::debug!(error = %e, "answerCallbackQuery failed");
        }
    }
}

/// Telegram transport — connects to the Bot API via long-polling.
pub struct TelegramTransport {
    api: BotApi,
    allowed_users: Vec<String>,
    menus: MenuRegistry,
}

impl TelegramTransport {
    pub fn new(bot_token: SecretString, allowed_users: Vec<String>) -> Self {
        Self {
            api: BotApi {
                token: Arc::new(bot_token),
                client: reqwest::Client::new(),
            },
            allowed_users,
            menus: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Check if a username or id is in the allowed list.
    pub fn is_user_allowed(&self, username: &str) -> bool {
        check_user_allowed(&self.allowed_users, [username])
    }

    /// Send one chunk (≤4096 chars), Markdown first with plain-text fallback.
    async fn send_message_chunk(&self, chat_id: &str, text: &str) -> Result<Value, TransportError> {
        let markdown_body = json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": "Markdown"
        });

        match self.api.call("sendMessage", &markdown_body).await {
            Ok(result) => return Ok(result),
            Err(e) => tracing::warn!(
                error = %e,
                "Telegram sendMessage with Markdown failed; retrying without parse_mode"
            ),
        }

        let plain_body = json!({
            "chat_id": chat_id,
            "text": text,
        });
        self.api
            .call("sendMessage", &plain_body)
            .await
            .map_err(|e| TransportError::SendFailed {
                name: NAME.into(),
                reason: e.to_string(),
            })
    }
}

// ── Transport trait implementation ──────────────────────────────────

#[async_trait]
impl Transport for TelegramTransport {
    fn name(&self) -> &str {
        NAME
    }

    async fn start(&self) -> Result<EventStream, TransportError> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let api = self.api.clone();
        let allowed_users = self.allowed_users.clone();
        let menus = Arc::clone(&self.menus);

        tokio::spawn(async move {
            let mut offset: i64 = 0;

            tracing::info!("Telegram transport listening for updates...");

            loop {
                let body = json!({
                    "offset": offset,
                    "timeout": 30,
                    "allowed_updates": ["message", "callback_query"]
                });

                let updates = match api.call("getUpdates", &body).await {
                    Ok(result) => result,
                    Err(e) => {
                        tracing::warn!("Telegram poll error: {e}");
                        tokio::time::sleep(Duration::from_secs(5)).await;
                        continue;
                    }
                };

                let Some(updates) = updates.as_array() else {
                    continue;
                };

                for update in updates {
                    // Advance offset past this update
                    if let Some(uid) = update.get("update_id").and_then(Value::as_i64) {
                        offset = uid + 1;
                    }

                    let event = if let Some(message) = update.get("message") {
                        parse_message(message)
                    } else if let Some(callback) = update.get("callback_query") {
                        handle_callback(&api, &menus, callback).await
                    } else {
                        None
                    };

                    let Some(event) = event else {
                        continue;
                    };

                    if !check_user_allowed(&allowed_users, event_identities(&event)) {
                        tracing::warn!(
                            user_id = %event.user_id(),
                            "Telegram: ignoring event from unauthorized user"
                        );
                        continue;
                    }

                    if tx.send(event).is_err() {
                        tracing::info!("Telegram listener channel closed");
                        return;
                    }
                }
            }
        });

        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        });

        Ok(Box::pin(stream))
    }

    async fn send_message(
        &self,
        channel_id: &str,
        text: &str,
    ) -> Result<MessageRef, TransportError> {
        let mut last = None;
        for chunk in split_message(text, TELEGRAM_MAX_MESSAGE_LENGTH) {
            last = Some(self.send_message_chunk(channel_id, &chunk).await?);
        }
        message_ref(channel_id, last.as_ref())
    }

    async fn send_menu(
        &self,
        channel_id: &str,
        owner_id: &str,
        text: &str,
        menu: &Menu,
    ) -> Result<MessageRef, TransportError> {
        let body = json!({
            "chat_id": channel_id,
            "text": menu_text(text, menu),
            "reply_markup": keyboard(menu, &BTreeSet::new()),
        });
        let result = self
            .api
            .call("sendMessage", &body)
            .await
            .map_err(|e| TransportError::SendFailed {
                name: NAME.into(),
                reason: e.to_string(),
            })?;
        let message = message_ref(channel_id, Some(&result))?;

        self.menus.lock().await.insert(
            message.clone(),
            PostedMenu::new(menu.clone(), Some(owner_id.to_string())),
        );
        Ok(message)
    }

    async fn update_message(
        &self,
        message: &MessageRef,
        text: &str,
        menu: Option<&Menu>,
    ) -> Result<(), TransportError> {
        let message_id: i64 = message
            .message_id
            .parse()
            .map_err(|_| TransportError::InvalidMessage(message.message_id.clone()))?;

        let text = match menu {
            Some(menu) => menu_text(text, menu),
            None => text.to_string(),
        };
        let mut body = json!({
            "chat_id": message.channel_id,
            "message_id": message_id,
            "text": text,
        });
        if let Some(menu) = menu {
            body["reply_markup"] = keyboard(menu, &BTreeSet::new());
        }

        self.api
            .call("editMessageText", &body)
            .await
            .map_err(|e| TransportError::UpdateFailed {
                name: NAME.into(),
                reason: e.to_string(),
            })?;

        let mut menus = self.menus.lock().await;
        let previous = menus.remove(message);
        if let Some(menu) = menu {
            let owner_id = previous.and_then(|p| p.owner_id);
            menus.insert(message.clone(), PostedMenu::new(menu.clone(), owner_id));
        }
        Ok(())
    }

    async fn health_check(&self) -> Result<(), TransportError> {
        self.api
            .call("getMe", &json!({}))
            .await
            .map(|_| ())
            .map_err(|e| TransportError::StartupFailed {
                name: NAME.into(),
                reason: e.to_string(),
            })
    }

    async fn shutdown(&self) -> Result<(), TransportError> {
        tracing::info!("Telegram transport shutting down");
        Ok(())
    }
}

// ── Update parsing ──────────────────────────────────────────────────

fn parse_message(message: &Value) -> Option<InboundEvent> {
    let text = message.get("text").and_then(Value::as_str)?;
    let from = message.get("from")?;
    let user_id = from.get("id").and_then(Value::as_i64)?.to_string();
    let chat_id = message
        .get("chat")
        .and_then(|c| c.get("id"))
        .and_then(Value::as_i64)?
        .to_string();

    let username = from.get("username").and_then(Value::as_str);
    let display = from
        .get("first_name")
        .and_then(Value::as_str)
        .or(username)
        .unwrap_or(&user_id)
        .to_string();
    let is_bot = from.get("is_bot").and_then(Value::as_bool).unwrap_or(false);

    let mut incoming = IncomingMessage::new(chat_id, user_id, text)
        .with_user_name(display)
        .from_bot(is_bot);
    if let Some(username) = username {
        incoming = incoming.with_user_handle(username);
    }
    Some(InboundEvent::Message(incoming))
}

/// A parsed `callback_query`: who tapped what, on which message.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Tap {
    user_id: String,
    user_handle: Option<String>,
    message: MessageRef,
    callback: Callback,
}

impl Tap {
    fn into_selection(self, widget_id: String, values: Vec<String>) -> InboundEvent {
        InboundEvent::Selection(MenuSelection {
            channel_id: self.message.channel_id.clone(),
            user_id: self.user_id,
            user_handle: self.user_handle,
            message: self.message,
            widget_id,
            values,
        })
    }
}

fn parse_tap(callback: &Value) -> Option<Tap> {
    let from = callback.get("from")?;
    let user_id = from.get("id").and_then(Value::as_i64)?.to_string();
    let user_handle = from
        .get("username")
        .and_then(Value::as_str)
        .map(str::to_string);
    let message = callback.get("message")?;
    let chat_id = message
        .get("chat")
        .and_then(|c| c.get("id"))
        .and_then(Value::as_i64)?;
    let message_id = message.get("message_id").and_then(Value::as_i64)?;
    let callback = parse_callback(callback.get("data").and_then(Value::as_str)?)?;

    Some(Tap {
        user_id,
        user_handle,
        message: MessageRef::new(chat_id.to_string(), message_id.to_string()),
        callback,
    })
}

/// Turn a keyboard tap into a selection, or toggle a multi-select entry.
async fn handle_callback(api: &BotApi, menus: &MenuRegistry, callback: &Value) -> Option<InboundEvent> {
    let callback_id = callback.get("id").and_then(Value::as_str)?;
    api.answer_callback(callback_id).await;
    let tap = parse_tap(callback)?;

    let mut registry = menus.lock().await;
    let Some(posted) = registry.get_mut(&tap.message) else {
        // Menu from before a restart; let the bot report the stale session.
        return Some(tap.into_selection(String::new(), Vec::new()));
    };

    match posted.tap(&tap.user_id, &tap.callback) {
        TapOutcome::Submit(values) => {
            let widget_id = posted.menu.widget_id.clone();
            Some(tap.into_selection(widget_id, values))
        }
        TapOutcome::Toggled => {
            let markup = keyboard(&posted.menu, &posted.selected);
            drop(registry);

            let message_id: i64 = tap.message.message_id.parse().ok()?;
            let body = json!({
                "chat_id": tap.message.channel_id,
                "message_id": message_id,
                "reply_markup": markup,
            });
            if let Err(e) = api.call("editMessageReplyMarkup", &body).await {
                tracing::warn!(error = %e, "Failed to refresh multi-select keyboard");
            }
            None
        }
        TapOutcome::NotOwner => {
            tracing::debug!(
                user_id = %tap.user_id,
                message_id = %tap.message.message_id,
                "Ignoring tap on another user's menu"
            );
            None
        }
        TapOutcome::Ignored => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Callback {
    Choice(usize),
    Done,
}

fn parse_callback(data: &str) -> Option<Callback> {
    if data == DONE_CALLBACK {
        return Some(Callback::Done);
    }
    data.strip_prefix("c:")?.parse().ok().map(Callback::Choice)
}

/// Identities checked against the allowlist: numeric id plus username.
fn event_identities(event: &InboundEvent) -> Vec<&str> {
    let mut ids = vec![event.user_id()];
    ids.extend(event.user_handle());
    ids
}

// ── Helpers ─────────────────────────────────────────────────────────

/// Inline keyboard for a menu, one choice per row.
fn keyboard(menu: &Menu, selected: &BTreeSet<usize>) -> Value {
    let mut rows: Vec<Value> = menu
        .choices
        .iter()
        .enumerate()
        .map(|(i, choice)| {
            let label = if selected.contains(&i) {
                format!("☑️ {}", choice.label)
            } else {
                choice.label.clone()
            };
            json!([{ "text": label, "callback_data": format!("c:{i}") }])
        })
        .collect();

    if menu.is_multi_select() {
        rows.push(json!([{ "text": "✅ Done", "callback_data": DONE_CALLBACK }]));
    }
    json!({ "inline_keyboard": rows })
}

fn message_ref(channel_id: &str, result: Option<&Value>) -> Result<MessageRef, TransportError> {
    let message_id = result
        .and_then(|r| r.get("message_id"))
        .and_then(Value::as_i64)
        .ok_or_else(|| TransportError::SendFailed {
            name: NAME.into(),
            reason: "response carried no message_id".into(),
        })?;
    Ok(MessageRef::new(channel_id, message_id.to_string()))
}

/// Check if any identity in the iterator matches the allowed users list.
fn check_user_allowed<'a>(
    allowed_users: &[String],
    identities: impl IntoIterator<Item = &'a str>,
) -> bool {
    let ids: Vec<&str> = identities.into_iter().collect();
    allowed_users
        .iter()
        .any(|u| u == "*" || ids.contains(&u.as_str()))
}

/// Split a message into chunks that fit Telegram's character limit.
/// Tries to split on newlines, then spaces, then hard-cuts on a char boundary.
fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        if remaining.len() <= max_len {
            chunks.push(remaining.to_string());
            break;
        }

        let mut limit = max_len;
        while !remaining.is_char_boundary(limit) {
            limit -= 1;
        }

        let chunk = &remaining[..limit];
        let split_at = chunk
            .rfind('\n')
            .or_else(|| chunk.rfind(' '))
            .unwrap_or(limit);

        // Don't split at position 0 (infinite loop guard)
        let split_at = if split_at == 0 { limit } else { split_at };

        chunks.push(remaining[..split_at].to_string());
        remaining = remaining[split_at..].trim_start();
    }

    chunks
}

// ── Tests ───────────────────────────────────────────────────────────
