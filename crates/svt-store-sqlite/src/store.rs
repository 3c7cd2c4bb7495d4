//! [`SqliteStore`], the SQLite implementation of [`Storage`].

use std::path::Path;

use chrono::{Duration, Utc};
use rusqlite::OptionalExtension as _;
use svt_core::storage::Storage;

use crate::{
  encode::{decode_dt, encode_dt},
  schema::SCHEMA,
  Result,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// Client state backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path`, creating parent directories, and
  /// run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
      tokio::fs::create_dir_all(parent).await?;
    }
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, for tests and throwaway sessions.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn delete_cookie(&self, name: String) -> Result<()> {
    self
      .conn
      .call(move |conn| {
        conn.execute("DELETE FROM cookies WHERE name = ?1", rusqlite::params![name])?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

// ─── Storage impl ────────────────────────────────────────────────────────────

impl Storage for SqliteStore {
  type Error = crate::Error;

  // ── Items ─────────────────────────────────────────────────────────────

  async fn get_item<'a>(&'a self, key: &'a str) -> Result<Option<String>> {
    let key = key.to_owned();
    let value = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT value FROM items WHERE key = ?1",
              rusqlite::params![key],
              |row| row.get::<_, String>(0),
            )
            .optional()?,
        )
      })
      .await?;
    Ok(value)
  }

  async fn set_item<'a>(&'a self, key: &'a str, value: &'a str) -> Result<()> {
    let key = key.to_owned();
    let value = value.to_owned();
    let at = encode_dt(Utc::now());

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO items (key, value, updated_at) VALUES (?1, ?2, ?3)
           ON CONFLICT(key) DO UPDATE SET value = excluded.value,
                                          updated_at = excluded.updated_at",
          rusqlite::params![key, value, at],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn remove_item<'a>(&'a self, key: &'a str) -> Result<()> {
    let key = key.to_owned();
    self
      .conn
      .call(move |conn| {
        conn.execute("DELETE FROM items WHERE key = ?1", rusqlite::params![key])?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  // ── Cookies ───────────────────────────────────────────────────────────

  async fn get_cookie<'a>(&'a self, name: &'a str) -> Result<Option<String>> {
    let owned = name.to_owned();
    let row: Option<(String, Option<String>)> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT value, expires_at FROM cookies WHERE name = ?1",
              rusqlite::params![owned],
              |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?,
        )
      })
      .await?;

    let Some((value, expires_at)) = row else {
      return Ok(None);
    };

    if let Some(expires_at) = expires_at {
      if decode_dt(&expires_at)? <= Utc::now() {
        tracing::debug!(cookie = name, "dropping expired cookie");
        self.delete_cookie(name.to_owned()).await?;
        return Ok(None);
      }
    }

    Ok(Some(value))
  }

  async fn set_cookie<'a>(
    &'a self,
    name: &'a str,
    value: &'a str,
    max_age: Option<Duration>,
  ) -> Result<()> {
    let name = name.to_owned();
    let value = value.to_owned();
    let expires_at = max_age.map(|age| encode_dt(Utc::now() + age));

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO cookies (name, value, expires_at) VALUES (?1, ?2, ?3)
           ON CONFLICT(name) DO UPDATE SET value = excluded.value,
                                           expires_at = excluded.expires_at",
          rusqlite::params![name, value, expires_at],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn remove_cookie<'a>(&'a self, name: &'a str) -> Result<()> {
    self.delete_cookie(name.to_owned()).await
  }
}
