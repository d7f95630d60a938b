//! Core data model: per-user sessions, dedup records, notifications and commands.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Telegram chat id a user's notifications go to.
pub type Destination = i64;

/// Last message we have seen in one remote conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatState {
    pub conversation_id: String,
    pub last_seen_message_id: String,
}

impl ChatState {
    pub fn new(conversation_id: &str, last_seen_message_id: &str) -> Self {
        Self {
            conversation_id: conversation_id.to_string(),
            last_seen_message_id: last_seen_message_id.to_string(),
        }
    }
}

/// Everything barqing keeps about one logged-in user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSession {
    #[serde(default)]
    pub conversations: HashMap<String, ChatState>,
    /// Bearer token for the remote chat API.
    pub credential: String,
    /// When false the refresher skips its diff cycle.
    pub active: bool,
    pub notify_destination: Destination,
    /// Remote profile id of the user themselves. Set once, lazily.
    #[serde(default)]
    pub resolved_self_id: Option<String>,
}

impl UserSession {
    /// Fresh session as created by a login command.
    pub fn new(credential: &str, notify_destination: Destination) -> Self {
        Self {
            conversations: HashMap::new(),
            credential: credential.to_string(),
            active: true,
            notify_destination,
            resolved_self_id: None,
        }
    }

    /// Key the session is persisted under.
    pub fn store_key(&self) -> String {
        self.notify_destination.to_string()
    }
}

/// One conversation as reported by the remote chat API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversation {
    pub id: String,
    /// `None` for conversations without any message yet.
    pub latest: Option<LatestMessage>,
}

/// The newest message of a conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LatestMessage {
    pub id: String,
    pub author_id: String,
    pub author_name: String,
    pub content: String,
}

/// What a notification is about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationKind {
    NewMessage { sender: String, content: String },
}

/// A queued notification for one destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub destination: Destination,
    pub kind: NotificationKind,
}

impl Notification {
    pub fn new_message(destination: Destination, sender: &str, content: &str) -> Self {
        Self {
            destination,
            kind: NotificationKind::NewMessage {
                sender: sender.to_string(),
                content: content.to_string(),
            },
        }
    }

    /// Plain-text body sent to the destination.
    pub fn render(&self) -> String {
        match &self.kind {
            NotificationKind::NewMessage { sender, content } => format!("{sender}:\n\n{content}"),
        }
    }
}

/// A text message received from a user on the command channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    /// Chat the message came from; replies and notifications go back here.
    pub destination: Destination,
    pub text: Option<String>,
}

/// A command registered with the channel for discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub command: String,
    pub description: String,
}

/// Commands a user can send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Stop,
    Login(String),
}

impl Command {
    /// The command list advertised to users.
    pub fn specs() -> Vec<CommandSpec> {
        [
            ("start", "start the bot and start receiving new messages"),
            ("stop", "stop receiving new messages"),
            ("login", "set up your credentials with the bot"),
        ]
        .into_iter()
        .map(|(command, description)| CommandSpec {
            command: command.into(),
            description: description.into(),
        })
        .collect()
    }

    /// Parse a chat message. Anything that is not exactly one of the
    /// known commands yields `None`.
    pub fn parse(text: &str) -> Option<Self> {
        let mut args = text.split_whitespace();
        let head = args.next()?.strip_prefix('/')?;
        // "/start@barqing_bot" is how Telegram addresses a bot in groups
        let name = head.split('@').next().unwrap_or(head);
        let rest: Vec<&str> = args.collect();

        match (name, rest.as_slice()) {
            ("start", _) => Some(Command::Start),
            ("stop", _) => Some(Command::Stop),
            ("login", [credential]) => Some(Command::Login(credential.to_string())),
            _ => None,
        }
    }
}
