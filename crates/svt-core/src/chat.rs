//! Chat assistant message types and the persisted log shape.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Messages kept when the log is persisted. Older ones only live in memory.
pub const PERSISTED_MESSAGE_LIMIT: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Sender {
  User,
  Bot,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
  #[default]
  Text,
  Error,
  /// Informational messages (e.g. the welcome text) that do not count as
  /// unread.
  System,
}

/// One turn in the assistant conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
  pub id:        String,
  pub content:   String,
  pub sender:    Sender,
  pub timestamp: DateTime<Utc>,
  #[serde(rename = "type", default)]
  pub kind:      MessageKind,
}

impl ChatMessage {
  pub fn new(content: impl Into<String>, sender: Sender, kind: MessageKind) -> Self {
    Self {
      id: format!("{sender}-{}", Uuid::new_v4()),
      content: content.into(),
      sender,
      timestamp: Utc::now(),
      kind,
    }
  }

  /// Whether receiving this message bumps the unread counter.
  pub fn counts_as_unread(&self) -> bool {
    self.sender == Sender::Bot && self.kind != MessageKind::System
  }
}

/// The part of the chat state that survives a reload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedChat {
  pub messages:        Vec<ChatMessage>,
  #[serde(default)]
  pub conversation_id: Option<String>,
}

impl PersistedChat {
  /// Snapshot a log, keeping only the most recent
  /// [`PERSISTED_MESSAGE_LIMIT`] messages in their original order.
  pub fn from_log(messages: &[ChatMessage], conversation_id: Option<&str>) -> Self {
    let start = messages.len().saturating_sub(PERSISTED_MESSAGE_LIMIT);
    Self {
      messages:        messages[start..].to_vec(),
      conversation_id: conversation_id.map(str::to_string),
    }
  }
}

/// A canned prompt offered by `GET /chatbot/quick-actions`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuickAction {
  pub action:        String,
  pub description:   String,
  #[serde(default)]
  pub example_query: String,
  #[serde(default)]
  pub icon:          String,
}
