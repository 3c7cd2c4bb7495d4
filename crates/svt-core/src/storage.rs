//! The `Storage` trait: what the client persists across restarts.
//!
//! Two namespaces mirror what a browser offers: string items (local storage)
//! and cookies with an optional lifetime. Backends (e.g. `svt-store-sqlite`)
//! implement the trait; the client crates depend only on this abstraction.

use std::future::Future;

use chrono::Duration;

/// Local-storage key holding the bearer token.
pub const TOKEN_KEY: &str = "token";
/// Local-storage key holding the token type (`bearer`).
pub const TOKEN_TYPE_KEY: &str = "token_type";
/// Cookie carrying a copy of the token for the route guard.
pub const TOKEN_COOKIE: &str = "token";
/// Local-storage key holding the persisted chat log.
pub const CHAT_STORAGE_KEY: &str = "svt-chat-storage";
/// Local-storage flag set once the assistant's welcome message was shown.
pub const WELCOME_SHOWN_KEY: &str = "svt-welcome-shown";

/// Persistent key-value storage with a cookie jar.
///
/// All methods return `Send` futures so the trait can be used from tasks on a
/// multi-threaded runtime.
pub trait Storage: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Items ─────────────────────────────────────────────────────────────

  fn get_item<'a>(
    &'a self,
    key: &'a str,
  ) -> impl Future<Output = Result<Option<String>, Self::Error>> + Send + 'a;

  /// Insert or overwrite an item.
  fn set_item<'a>(
    &'a self,
    key: &'a str,
    value: &'a str,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Remove an item. Removing a missing key is not an error.
  fn remove_item<'a>(
    &'a self,
    key: &'a str,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  // ── Cookies ───────────────────────────────────────────────────────────

  /// Read a cookie. Expired cookies read as `None`.
  fn get_cookie<'a>(
    &'a self,
    name: &'a str,
  ) -> impl Future<Output = Result<Option<String>, Self::Error>> + Send + 'a;

  /// Set a cookie; `max_age: None` makes it live until removed.
  fn set_cookie<'a>(
    &'a self,
    name: &'a str,
    value: &'a str,
    max_age: Option<Duration>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  fn remove_cookie<'a>(
    &'a self,
    name: &'a str,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;
}
