//! Tests for `SqliteStore` against an in-memory database.

use chrono::Duration;
use svt_core::storage::{Storage, TOKEN_COOKIE, TOKEN_KEY};

use crate::SqliteStore;

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

// ─── Items ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn missing_item_is_none() {
  let s = store().await;
  assert_eq!(s.get_item(TOKEN_KEY).await.unwrap(), None);
}

#[tokio::test]
async fn set_item_overwrites() {
  let s = store().await;
  s.set_item(TOKEN_KEY, "first").await.unwrap();
  s.set_item(TOKEN_KEY, "second").await.unwrap();
  assert_eq!(s.get_item(TOKEN_KEY).await.unwrap().as_deref(), Some("second"));
}

#[tokio::test]
async fn remove_item_is_idempotent() {
  let s = store().await;
  s.set_item("k", "v").await.unwrap();
  s.remove_item("k").await.unwrap();
  s.remove_item("k").await.unwrap();
  assert_eq!(s.get_item("k").await.unwrap(), None);
}

// ─── Cookies ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn cookie_and_item_namespaces_are_separate() {
  let s = store().await;
  s.set_item(TOKEN_KEY, "item").await.unwrap();
  s.set_cookie(TOKEN_COOKIE, "cookie", None).await.unwrap();

  s.remove_item(TOKEN_KEY).await.unwrap();
  assert_eq!(s.get_cookie(TOKEN_COOKIE).await.unwrap().as_deref(), Some("cookie"));
}

#[tokio::test]
async fn live_cookie_is_returned() {
  let s = store().await;
  s.set_cookie(TOKEN_COOKIE, "abc", Some(Duration::days(7))).await.unwrap();
  assert_eq!(s.get_cookie(TOKEN_COOKIE).await.unwrap().as_deref(), Some("abc"));
}

#[tokio::test]
async fn expired_cookie_reads_as_none() {
  let s = store().await;
  s.set_cookie(TOKEN_COOKIE, "abc", Some(Duration::seconds(-1))).await.unwrap();
  assert_eq!(s.get_cookie(TOKEN_COOKIE).await.unwrap(), None);
}

#[tokio::test]
async fn remove_cookie_clears_it() {
  let s = store().await;
  s.set_cookie(TOKEN_COOKIE, "abc", None).await.unwrap();
  s.remove_cookie(TOKEN_COOKIE).await.unwrap();
  assert_eq!(s.get_cookie(TOKEN_COOKIE).await.unwrap(), None);
}

#[tokio::test]
async fn file_store_persists_across_reopen() {
  let dir = std::env::temp_dir().join(format!("svt-store-{}", std::process::id()));
  let path = dir.join("nested").join("state.db");

  {
    let s = SqliteStore::open(&path).await.unwrap();
    s.set_item(TOKEN_KEY, "persisted").await.unwrap();
  }

  let s = SqliteStore::open(&path).await.unwrap();
  assert_eq!(s.get_item(TOKEN_KEY).await.unwrap().as_deref(), Some("persisted"));

  let _ = std::fs::remove_dir_all(dir);
}
