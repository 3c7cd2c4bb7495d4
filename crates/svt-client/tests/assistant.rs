mod common;

use common::{ADMIN, MockBackend, USUARIO};
use svt_core::{
  chat::{MessageKind, QuickAction, Sender},
  query_key::keys,
  storage::{Storage, WELCOME_SHOWN_KEY},
};
use svt_store_sqlite::SqliteStore;

#[tokio::test]
async fn reply_and_conversation_are_recorded() {
  let backend = MockBackend::spawn().await;
  let client = backend.client().await;
  client.session.login(USUARIO.0, USUARIO.1).await.unwrap();
  let assistant = client.assistant();

  assert!(assistant.send_message("¿Cuánto stock hay?").await.unwrap());
  let messages = client.chat.messages();
  assert_eq!(messages.len(), 2);
  assert_eq!(messages[0].sender, Sender::User);
  assert_eq!(messages[1].content, "Recibí: ¿Cuánto stock hay?");
  assert_eq!(client.chat.conversation_id().as_deref(), Some("conv-1"));
  assert_eq!(client.chat.unread(), 1);
  assert!(!client.chat.is_loading());

  assistant.send_message("gracias").await.unwrap();
  assert_eq!(client.chat.messages().len(), 4);
  assert_eq!(client.chat.conversation_id().as_deref(), Some("conv-1"));
}

#[tokio::test]
async fn blank_messages_are_not_sent() {
  let backend = MockBackend::spawn().await;
  let client = backend.client().await;
  client.session.login(USUARIO.0, USUARIO.1).await.unwrap();

  assert!(!client.assistant().send_message("   ").await.unwrap());
  assert!(client.chat.messages().is_empty());
  assert_eq!(backend.state.count("POST", "/chatbot/chat"), 0);
}

#[tokio::test]
async fn welcome_is_shown_once() {
  let backend = MockBackend::spawn().await;
  let client = backend.client().await;
  client.session.login(ADMIN.0, ADMIN.1).await.unwrap();
  let assistant = client.assistant();

  assistant.initialize().await.unwrap();
  let state = client.chat.snapshot();
  assert!(state.initialized);
  assert!(state.connected);
  assert_eq!(state.quick_actions.len(), 2);
  assert_eq!(state.messages.len(), 1);
  assert_eq!(state.messages[0].kind, MessageKind::System);
  assert!(state.messages[0].content.starts_with("¡Hola admin!"));
  assert_eq!(state.unread, 0);
  assert_eq!(
    client.storage.get_item(WELCOME_SHOWN_KEY).await.unwrap().as_deref(),
    Some("true")
  );

  client.chat.clear().await.unwrap();
  assistant.initialize().await.unwrap();
  assert!(client.chat.messages().is_empty());
}

#[tokio::test]
async fn expired_session_is_reported_in_the_log() {
  let backend = MockBackend::spawn().await;
  let client = backend.client().await;
  client.session.login(USUARIO.0, USUARIO.1).await.unwrap();
  backend.state.set(&backend.state.reject_token, true);

  assert!(!client.assistant().send_message("hola").await.unwrap());
  let last = client.chat.messages().pop().unwrap();
  assert_eq!(last.kind, MessageKind::Error);
  assert!(last.content.contains("sesión ha expirado"));
  assert!(!client.chat.is_loading());
  assert!(!client.chat.snapshot().connected);
  assert_eq!(client.session.identity(), None);
  assert_eq!(client.navigator.current(), "/login");
}

#[tokio::test]
async fn signed_out_chat_is_refused_locally() {
  let backend = MockBackend::spawn().await;
  let client = backend.client().await;

  assert!(!client.assistant().send_message("hola").await.unwrap());
  let last = client.chat.messages().pop().unwrap();
  assert_eq!(last.kind, MessageKind::Error);
  assert!(last.content.contains("permiso"));
  assert!(backend.state.hits().is_empty());
}

#[tokio::test]
async fn reload_keeps_the_last_fifty_messages() {
  let backend = MockBackend::spawn().await;
  let store = SqliteStore::open_in_memory().await.unwrap();

  let client = backend.client_with(store.clone()).await;
  for i in 0..60 {
    client.chat.send(&format!("m{i}")).await.unwrap();
  }
  client.chat.set_conversation_id("conv-9").await.unwrap();
  assert_eq!(client.chat.messages().len(), 60);

  let reloaded = backend.client_with(store).await;
  let messages = reloaded.chat.messages();
  assert_eq!(messages.len(), 50);
  assert_eq!(messages[0].content, "m10");
  assert_eq!(messages[49].content, "m59");
  assert_eq!(reloaded.chat.conversation_id().as_deref(), Some("conv-9"));
}

#[tokio::test]
async fn chat_log_survives_logout() {
  let backend = MockBackend::spawn().await;
  let client = backend.client().await;
  client.session.login(USUARIO.0, USUARIO.1).await.unwrap();
  client.assistant().send_message("hola").await.unwrap();

  client.session.logout().await;
  assert_eq!(client.chat.messages().len(), 2);
}

#[tokio::test]
async fn quick_actions_come_from_the_cache() {
  let backend = MockBackend::spawn().await;
  let client = backend.client().await;
  client.session.login(USUARIO.0, USUARIO.1).await.unwrap();
  let assistant = client.assistant();

  let first = assistant.fetch_quick_actions().await.unwrap();
  assert_eq!(first[0].action, "stock_bajo");
  let cached: Vec<QuickAction> = client
    .cache
    .get_as::<serde_json::Value>(&keys::chatbot::quick_actions())
    .map(|body| serde_json::from_value(body["quick_actions"].clone()).unwrap())
    .unwrap();
  assert_eq!(cached, first);

  let again = client.assistant().fetch_quick_actions().await.unwrap();
  assert_eq!(again, first);
  assert_eq!(backend.state.count("GET", "/chatbot/quick-actions"), 1);
  assert_eq!(client.chat.snapshot().quick_actions, first);
}
