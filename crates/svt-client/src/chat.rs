//! The chat assistant: its message log and the bot that writes to it.
//!
//! [`ChatSession`] is the log. It is persisted under its own storage key,
//! independently of the signed-in session, and only the last
//! [`PERSISTED_MESSAGE_LIMIT`](svt_core::chat::PERSISTED_MESSAGE_LIMIT) messages
//! survive a reload.
//!
//! [`Assistant`] talks to `/chatbot/*` through the gateway and records both
//! sides of the conversation in the log.

use std::{
  sync::{Arc, Mutex, MutexGuard, PoisonError},
  time::Duration,
};

use serde_json::Value;
use svt_core::{
  chat::{ChatMessage, MessageKind, PersistedChat, QuickAction, Sender},
  model::{ChatReply, ChatRequest, QuickActions},
  query_key::keys,
  storage::{CHAT_STORAGE_KEY, Storage, WELCOME_SHOWN_KEY},
};
use tracing::{debug, warn};

use crate::{
  cache::QueryCache,
  error::{ApiError, ChatError},
  gateway::{ApiRequest, Gateway},
};

const SESSION_EXPIRED_MESSAGE: &str =
  "Tu sesión ha expirado. Por favor, inicia sesión nuevamente.";
const NOT_ALLOWED_MESSAGE: &str = "No tienes permiso para usar el asistente.";
const CONNECTION_ERROR_MESSAGE: &str =
  "Error de conexión. Verifica que el servidor esté funcionando.";

// ─── Chat log ────────────────────────────────────────────────────────────────

/// A point-in-time copy of the chat state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatState {
  pub messages:        Vec<ChatMessage>,
  pub conversation_id: Option<String>,
  pub unread:          usize,
  pub loading:         bool,
  pub connected:       bool,
  pub initialized:     bool,
  pub quick_actions:   Vec<QuickAction>,
}

pub struct ChatSession<S> {
  storage: Arc<S>,
  state:   Mutex<ChatState>,
}

impl<S: Storage> ChatSession<S> {
  pub fn new(storage: Arc<S>) -> Self { Self { storage, state: Mutex::new(ChatState::default()) } }

  fn state(&self) -> MutexGuard<'_, ChatState> {
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Rehydrate the log from storage. A corrupt record is logged and
  /// ignored.
  pub async fn load(&self) -> Result<(), ChatError> {
    let Some(raw) = self
      .storage
      .get_item(CHAT_STORAGE_KEY)
      .await
      .map_err(ChatError::storage)?
    else {
      return Ok(());
    };

    match serde_json::from_str::<PersistedChat>(&raw) {
      Ok(persisted) => {
        let mut state = self.state();
        state.messages = persisted.messages;
        state.conversation_id = persisted.conversation_id;
      }
      Err(e) => warn!(error = %e, "ignoring unreadable chat history"),
    }
    Ok(())
  }

  async fn persist(&self) -> Result<(), ChatError> {
    let persisted = {
      let state = self.state();
      PersistedChat::from_log(&state.messages, state.conversation_id.as_deref())
    };
    let raw = serde_json::to_string(&persisted)?;
    self
      .storage
      .set_item(CHAT_STORAGE_KEY, &raw)
      .await
      .map_err(ChatError::storage)
  }

  /// Append a user message and mark the log as waiting for a reply.
  /// Blank input is ignored.
  pub async fn send(&self, content: &str) -> Result<Option<ChatMessage>, ChatError> {
    if content.trim().is_empty() {
      return Ok(None);
    }
    let message = ChatMessage::new(content, Sender::User, MessageKind::Text);
    {
      let mut state = self.state();
      state.messages.push(message.clone());
      state.loading = true;
    }
    self.persist().await?;
    Ok(Some(message))
  }

  /// Append a bot message. Everything but `system` messages counts as
  /// unread.
  pub async fn receive(&self, content: &str, kind: MessageKind) -> Result<ChatMessage, ChatError> {
    let message = ChatMessage::new(content, Sender::Bot, kind);
    {
      let mut state = self.state();
      if message.counts_as_unread() {
        state.unread += 1;
      }
      state.messages.push(message.clone());
      state.loading = false;
    }
    self.persist().await?;
    Ok(message)
  }

  pub fn mark_read(&self) { self.state().unread = 0; }

  /// Empty the log and forget the conversation.
  pub async fn clear(&self) -> Result<(), ChatError> {
    {
      let mut state = self.state();
      state.messages.clear();
      state.conversation_id = None;
      state.unread = 0;
      state.loading = false;
      state.initialized = false;
    }
    debug!("chat cleared");
    self.persist().await
  }

  pub async fn set_conversation_id(&self, id: impl Into<String>) -> Result<(), ChatError> {
    self.state().conversation_id = Some(id.into());
    self.persist().await
  }

  pub fn snapshot(&self) -> ChatState { self.state().clone() }

  pub fn messages(&self) -> Vec<ChatMessage> { self.state().messages.clone() }

  pub fn unread(&self) -> usize { self.state().unread }

  pub fn is_loading(&self) -> bool { self.state().loading }

  pub fn conversation_id(&self) -> Option<String> { self.state().conversation_id.clone() }

  fn set_connected(&self, connected: bool) { self.state().connected = connected; }

  fn set_loading(&self, loading: bool) { self.state().loading = loading; }
}

// ─── Assistant ───────────────────────────────────────────────────────────────

/// Quick actions change with deployments, not with use.
const QUICK_ACTIONS_STALE_TIME: Duration = Duration::from_secs(10 * 60);

pub struct Assistant<S> {
  gateway: Arc<Gateway<S>>,
  chat:    Arc<ChatSession<S>>,
  storage: Arc<S>,
  cache:   QueryCache,
}

impl<S: Storage + 'static> Assistant<S> {
  pub fn new(
    gateway: Arc<Gateway<S>>,
    chat: Arc<ChatSession<S>>,
    storage: Arc<S>,
    cache: QueryCache,
  ) -> Self {
    Self { gateway, chat, storage, cache }
  }

  pub fn chat(&self) -> &ChatSession<S> { &self.chat }

  /// Show the welcome message once per installation, then load the quick
  /// actions. Does nothing after the first call until the log is cleared.
  pub async fn initialize(&self) -> Result<(), ChatError> {
    if self.chat.state().initialized {
      return Ok(());
    }

    let shown = self
      .storage
      .get_item(WELCOME_SHOWN_KEY)
      .await
      .map_err(ChatError::storage)?;
    if shown.is_none() {
      let name = self
        .gateway
        .session()
        .identity()
        .map(|identity| identity.display_name().to_string())
        .unwrap_or_else(|| "Usuario".to_string());
      self
        .chat
        .receive(&welcome_message(&name), MessageKind::System)
        .await?;
      self
        .storage
        .set_item(WELCOME_SHOWN_KEY, "true")
        .await
        .map_err(ChatError::storage)?;
    }

    if let Err(e) = self.fetch_quick_actions().await {
      warn!(error = %e, "could not load quick actions");
    }
    self.chat.state().initialized = true;
    Ok(())
  }

  /// Send `content` and record the reply. Failures are recorded in the log
  /// as error messages; `Ok(false)` means the message did not get an
  /// answer.
  pub async fn send_message(&self, content: &str) -> Result<bool, ChatError> {
    if self.chat.send(content).await?.is_none() {
      return Ok(false);
    }

    let body = ChatRequest {
      message:         content.to_string(),
      conversation_id: self.chat.conversation_id(),
    };
    let reply = match ApiRequest::post("/chatbot/chat").json(&body) {
      Ok(request) => self.gateway.json::<ChatReply>(request).await,
      Err(e) => Err(e),
    };

    match reply {
      Ok(reply) => {
        self.chat.receive(&reply.response, MessageKind::Text).await?;
        self.chat.set_conversation_id(reply.conversation_id).await?;
        self.chat.set_connected(true);
        Ok(true)
      }
      Err(e) => {
        warn!(error = %e, "chat request failed");
        let text = match e {
          ApiError::AuthExpired => SESSION_EXPIRED_MESSAGE,
          ApiError::PermissionDenied { .. } => NOT_ALLOWED_MESSAGE,
          _ => CONNECTION_ERROR_MESSAGE,
        };
        self.chat.receive(text, MessageKind::Error).await?;
        self.chat.set_connected(false);
        self.chat.set_loading(false);
        Ok(false)
      }
    }
  }

  /// Load the quick actions through the cache, so re-initialising the chat
  /// does not refetch them.
  pub async fn fetch_quick_actions(&self) -> Result<Vec<QuickAction>, ApiError> {
    let gateway = self.gateway.clone();
    let options = self.cache.defaults().with_stale_time(QUICK_ACTIONS_STALE_TIME);
    let fetched = self
      .cache
      .fetch_as(keys::chatbot::quick_actions(), options, move || {
        let gateway = gateway.clone();
        async move {
          gateway
            .json::<QuickActions>(ApiRequest::get("/chatbot/quick-actions"))
            .await
        }
      })
      .await;
    match fetched {
      Ok(actions) => {
        let mut state = self.chat.state();
        state.quick_actions = actions.quick_actions.clone();
        state.connected = true;
        Ok(actions.quick_actions)
      }
      Err(e) => {
        self.chat.set_connected(false);
        Err(e)
      }
    }
  }

  pub async fn analytics(&self) -> Result<Value, ApiError> {
    self.gateway.json(ApiRequest::get("/chatbot/analytics")).await
  }
}

fn welcome_message(name: &str) -> String {
  format!(
    "¡Hola {name}!\n\n\
     Soy tu asistente inteligente para el Sistema SVT.\n\n\
     Puedo ayudarte con:\n\
     - Consultas de productos y stock\n\
     - Estadísticas del inventario\n\
     - Información de proveedores\n\
     - Análisis y reportes\n\n\
     ¿Qué necesitas saber?"
  )
}

#[cfg(test)]
mod tests {
  use svt_core::chat::PERSISTED_MESSAGE_LIMIT;
  use svt_store_sqlite::SqliteStore;

  use super::*;

  async fn session() -> (Arc<SqliteStore>, ChatSession<SqliteStore>) {
    let storage = Arc::new(SqliteStore::open_in_memory().await.unwrap());
    (storage.clone(), ChatSession::new(storage))
  }

  #[tokio::test]
  async fn blank_messages_are_ignored() {
    let (_, chat) = session().await;
    assert!(chat.send("   ").await.unwrap().is_none());
    assert!(chat.messages().is_empty());
    assert!(!chat.is_loading());
  }

  #[tokio::test]
  async fn send_marks_loading_and_receive_clears_it() {
    let (_, chat) = session().await;
    let sent = chat.send("¿stock de tornillos?").await.unwrap().unwrap();
    assert!(sent.id.starts_with("user-"));
    assert!(chat.is_loading());

    chat.receive("Hay 40 unidades", MessageKind::Text).await.unwrap();
    assert!(!chat.is_loading());
    assert_eq!(chat.messages().len(), 2);
  }

  #[tokio::test]
  async fn system_messages_do_not_count_as_unread() {
    let (_, chat) = session().await;
    chat.receive("bienvenido", MessageKind::System).await.unwrap();
    chat.receive("respuesta", MessageKind::Text).await.unwrap();
    chat.receive("falló", MessageKind::Error).await.unwrap();
    assert_eq!(chat.unread(), 2);

    chat.mark_read();
    assert_eq!(chat.unread(), 0);
  }

  #[tokio::test]
  async fn clear_resets_log_and_conversation() {
    let (storage, chat) = session().await;
    chat.send("hola").await.unwrap();
    chat.set_conversation_id("conv-1").await.unwrap();
    chat.clear().await.unwrap();

    assert!(chat.messages().is_empty());
    assert_eq!(chat.conversation_id(), None);

    let reloaded = ChatSession::new(storage);
    reloaded.load().await.unwrap();
    assert!(reloaded.messages().is_empty());
  }

  #[tokio::test]
  async fn reload_restores_last_fifty_in_order() {
    let (storage, chat) = session().await;
    for i in 0..60 {
      chat.send(&format!("mensaje {i}")).await.unwrap();
    }
    chat.set_conversation_id("conv-9").await.unwrap();
    assert_eq!(chat.messages().len(), 60);

    let reloaded = ChatSession::new(storage);
    reloaded.load().await.unwrap();
    let messages = reloaded.messages();
    assert_eq!(messages.len(), PERSISTED_MESSAGE_LIMIT);
    assert_eq!(messages.first().unwrap().content, "mensaje 10");
    assert_eq!(messages.last().unwrap().content, "mensaje 59");
    assert_eq!(reloaded.conversation_id().as_deref(), Some("conv-9"));
  }

  #[tokio::test]
  async fn corrupt_history_is_ignored() {
    let (storage, chat) = session().await;
    storage.set_item(CHAT_STORAGE_KEY, "{not json").await.unwrap();
    chat.load().await.unwrap();
    assert!(chat.messages().is_empty());
  }
}
