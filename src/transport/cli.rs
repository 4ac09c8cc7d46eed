//! CLI transport — stdin/stdout REPL for local runs.
//!
//! Menus print as numbered lists. While a menu is showing, a line such as
//! `1,3` picks entries by number and `none` submits an empty pick.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use futures::stream;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::Mutex;

use super::{
    EventStream, InboundEvent, IncomingMessage, MenuSelection, MessageRef, Transport, menu_text,
};
use crate::error::TransportError;
use crate::wizard::Menu;

const CHANNEL_ID: &str = "cli";
const USER_ID: &str = "local-user";

type ActiveMenu = Arc<Mutex<Option<(MessageRef, Menu)>>>;

/// Reads stdin and writes to stdout as a single local user.
pub struct CliTransport {
    user_name: String,
    active_menu: ActiveMenu,
    next_message_id: AtomicU64,
}

impl CliTransport {
    pub fn new(user_name: impl Into<String>) -> Self {
        Self {
            user_name: user_name.into(),
            active_menu: Arc::new(Mutex::new(None)),
            next_message_id: AtomicU64::new(1),
        }
    }

    fn next_ref(&self, channel_id: &str) -> MessageRef {
        let id = self.next_message_id.fetch_add(1, Ordering::Relaxed);
        MessageRef::new(channel_id, id.to_string())
    }

    async fn show_menu(&self, message: &MessageRef, text: &str, menu: &Menu) {
        println!("\n{}", menu_text(text, menu));
        for (i, choice) in menu.choices.iter().enumerate() {
            println!("  {}. {}", i + 1, choice.label);
        }
        if menu.is_multi_select() {
            eprintln!("(numbers separated by commas, or `none`)");
        } else {
            eprintln!("(one number)");
        }
        eprint!("> ");
        *self.active_menu.lock().await = Some((message.clone(), menu.clone()));
    }
}

impl Default for CliTransport {
    fn default() -> Self {
        Self::new(USER_ID)
    }
}

#[async_trait]
impl Transport for CliTransport {
    fn name(&self) -> &str {
        "cli"
    }

    async fn start(&self) -> Result<EventStream, TransportError> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let active_menu = Arc::clone(&self.active_menu);
        let user_name = self.user_name.clone();

        tokio::spawn(async move {
            let stdin = tokio::io::stdin();
            let reader = BufReader::new(stdin);
            let mut lines = reader.lines();

            eprint!("> ");

            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let line = line.trim().to_string();
                        if line.is_empty() {
                            eprint!("> ");
                            continue;
                        }
                        let menu = active_menu.lock().await.clone();
                        let event = to_event(&line, menu.as_ref(), &user_name);
                        if tx.send(event).is_err() {
                            break;
                        }
                    }
                    Ok(None) => break, // EOF
                    Err(e) => {
                        tracing::error!("Error reading stdin: {}", e);
                        break;
                    }
                }
            }
        });

        let stream = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        });

        Ok(Box::pin(stream))
    }

    async fn send_message(
        &self,
        channel_id: &str,
        text: &str,
    ) -> Result<MessageRef, TransportError> {
        println!("\n{text}\n");
        eprint!("> ");
        Ok(self.next_ref(channel_id))
    }

    async fn send_menu(
        &self,
        channel_id: &str,
        _owner_id: &str,
        text: &str,
        menu: &Menu,
    ) -> Result<MessageRef, TransportError> {
        let message = self.next_ref(channel_id);
        self.show_menu(&message, text, menu).await;
        Ok(message)
    }

    async fn update_message(
        &self,
        message: &MessageRef,
        text: &str,
        menu: Option<&Menu>,
    ) -> Result<(), TransportError> {
        match menu {
            Some(menu) => self.show_menu(message, text, menu).await,
            None => {
                *self.active_menu.lock().await = None;
                println!("\n{text}\n");
                eprint!("> ");
            }
        }
        Ok(())
    }

    async fn health_check(&self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

/// Interpret one input line against the menu currently showing, if any.
fn to_event(line: &str, menu: Option<&(MessageRef, Menu)>, user_name: &str) -> InboundEvent {
    if let Some((message, menu)) = menu {
        if let Some(values) = parse_picks(line, menu) {
            return InboundEvent::Selection(MenuSelection {
                channel_id: CHANNEL_ID.to_string(),
                user_id: USER_ID.to_string(),
                user_handle: None,
                message: message.clone(),
                widget_id: menu.widget_id.clone(),
                values,
            });
        }
    }
    InboundEvent::Message(IncomingMessage::new(CHANNEL_ID, USER_ID, line).with_user_name(user_name))
}

/// Parse `1,3` style picks into menu values. `None` if the line is not a pick.
///
/// Numbers outside the menu are passed through as-is so the wizard rejects them.
fn parse_picks(line: &str, menu: &Menu) -> Option<Vec<String>> {
    if line.eq_ignore_ascii_case("none") {
        return Some(Vec::new());
    }

    let tokens: Vec<&str> = line
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|t| !t.is_empty())
        .collect();
    if tokens.is_empty() || !tokens.iter().all(|t| t.chars().all(|c| c.is_ascii_digit())) {
        return None;
    }

    Some(
        tokens
            .into_iter()
            .map(|t| {
                t.parse::<usize>()
                    .ok()
                    .and_then(|n| n.checked_sub(1))
                    .and_then(|i| menu.choices.get(i))
                    .map(|c| c.value.clone())
                    .unwrap_or_else(|| t.to_string())
            })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wizard::MenuChoice;

    fn menu() -> Menu {
        Menu {
            widget_id: "opsplan:workload".into(),
            placeholder: "Select workload".into(),
            choices: ["30", "35", "40"]
                .iter()
                .map(|v| MenuChoice {
                    label: format!("{v}%"),
                    value: v.to_string(),
                })
                .collect(),
            min_values: 1,
            max_values: 1,
            notice: None,
        }
    }

    #[test]
    fn picks_map_to_values() {
        assert_eq!(parse_picks("2", &menu()), Some(vec!["35".to_string()]));
        assert_eq!(
            parse_picks("1, 3", &menu()),
            Some(vec!["30".to_string(), "40".to_string()])
        );
    }

    #[test]
    fn none_is_an_empty_pick() {
        assert_eq!(parse_picks("None", &menu()), Some(Vec::new()));
    }

    #[test]
    fn out_of_range_picks_pass_through() {
        assert_eq!(parse_picks("9", &menu()), Some(vec!["9".to_string()]));
        assert_eq!(parse_picks("0", &menu()), Some(vec!["0".to_string()]));
    }

    #[test]
    fn text_is_not_a_pick() {
        assert_eq!(parse_picks("!opsplan", &menu()), None);
        assert_eq!(parse_picks("all good today", &menu()), None);
    }

    #[test]
    fn lines_without_menu_are_messages() {
        let event = to_event("2", None, "Dana");
        let InboundEvent::Message(msg) = event else {
            panic!("expected message");
        };
        assert_eq!(msg.text, "2");
        assert_eq!(msg.user_name, "Dana");
        assert_eq!(msg.channel_id, "cli");
    }

    #[test]
    fn lines_with_menu_are_selections() {
        let active = (MessageRef::new("cli", "4"), menu());
        let InboundEvent::Selection(sel) = to_event("1", Some(&active), "Dana") else {
            panic!("expected selection");
        };
        assert_eq!(sel.widget_id, "opsplan:workload");
        assert_eq!(sel.message, MessageRef::new("cli", "4"));
        assert_eq!(sel.values, vec!["30".to_string()]);
    }

    #[tokio::test]
    async fn update_without_menu_clears_active_menu() {
        let cli = CliTransport::default();
        let msg = cli.send_menu("cli", USER_ID, "Pick", &menu()).await.unwrap();
        assert!(cli.active_menu.lock().await.is_some());

        cli.update_message(&msg, "Done", None).await.unwrap();
        assert!(cli.active_menu.lock().await.is_none());
    }

    #[tokio::test]
    async fn message_refs_are_unique() {
        let cli = CliTransport::default();
        let a = cli.send_message("cli", "a").await.unwrap();
        let b = cli.send_message("cli", "b").await.unwrap();
        assert_ne!(a, b);
    }
}
