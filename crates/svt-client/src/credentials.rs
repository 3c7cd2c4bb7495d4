//! Bearer credential persistence.
//!
//! The token lives in three places: an in-memory copy read on every request,
//! the `token` / `token_type` storage items, and a `token` cookie that the
//! route guard reads. [`CredentialStore`] is the only code that touches them,
//! so they are always written and cleared together.

use std::sync::{Arc, PoisonError, RwLock};

use chrono::Duration;
use svt_core::{
  identity::Credential,
  storage::{Storage, TOKEN_COOKIE, TOKEN_KEY, TOKEN_TYPE_KEY},
};
use tracing::debug;

/// Lifetime of the token cookie.
pub const COOKIE_MAX_AGE_DAYS: i64 = 7;

const DEFAULT_TOKEN_TYPE: &str = "bearer";

pub struct CredentialStore<S> {
  storage: Arc<S>,
  current: RwLock<Option<Credential>>,
}

impl<S: Storage> CredentialStore<S> {
  pub fn new(storage: Arc<S>) -> Self { Self { storage, current: RwLock::new(None) } }

  /// The in-memory credential, unless it has expired.
  pub fn get(&self) -> Option<Credential> {
    self
      .current
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .clone()
      .filter(|c| !c.is_expired())
  }

  /// Read the persisted credential into memory. The storage item wins; the
  /// cookie is only consulted when the item is missing.
  pub async fn load(&self) -> Result<Option<Credential>, S::Error> {
    let token = match self.storage.get_item(TOKEN_KEY).await? {
      Some(token) => Some(token),
      None => self.storage.get_cookie(TOKEN_COOKIE).await?,
    };
    let Some(token) = token else {
      return Ok(None);
    };

    let token_type = self
      .storage
      .get_item(TOKEN_TYPE_KEY)
      .await?
      .unwrap_or_else(|| DEFAULT_TOKEN_TYPE.to_string());

    let credential = Credential::new(token, token_type);
    *self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(credential.clone());
    Ok(Some(credential))
  }

  /// Keep `credential` in memory and persist both copies.
  pub async fn set(&self, credential: Credential) -> Result<(), S::Error> {
    *self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(credential.clone());

    self.storage.set_item(TOKEN_KEY, &credential.token).await?;
    self
      .storage
      .set_item(TOKEN_TYPE_KEY, &credential.token_type)
      .await?;
    self
      .storage
      .set_cookie(
        TOKEN_COOKIE,
        &credential.token,
        Some(Duration::days(COOKIE_MAX_AGE_DAYS)),
      )
      .await?;
    debug!("credential persisted");
    Ok(())
  }

  /// Drop the in-memory copy only.
  pub fn forget(&self) -> Option<Credential> {
    self.current.write().unwrap_or_else(PoisonError::into_inner).take()
  }

  /// Drop the in-memory copy and both persisted copies. Every removal is
  /// attempted; the first failure is returned.
  pub async fn clear(&self) -> Result<(), S::Error> {
    self.forget();

    let item = self.storage.remove_item(TOKEN_KEY).await;
    let kind = self.storage.remove_item(TOKEN_TYPE_KEY).await;
    let cookie = self.storage.remove_cookie(TOKEN_COOKIE).await;
    debug!("credential cleared");
    item.and(kind).and(cookie)
  }
}
