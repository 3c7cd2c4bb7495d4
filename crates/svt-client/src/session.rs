//! The signed-in session: credential, identity and the auth state machine.
//!
//! [`Session`] owns the only copies of the current [`Credential`] and
//! [`Identity`]. Everything that ends a session (logout, a 401, a failed
//! restore) goes through here so teardown always happens in the same order:
//! in-memory state, then the query cache, then persisted storage, and only
//! then navigation to the login screen.

use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use serde::Serialize;
use svt_core::{
  endpoint::Method,
  identity::{Credential, Identity},
  model::{AuthToken, RegisterRequest},
  permission::{CapabilitySet, evaluate},
  query_key::keys,
  route::LOGIN_ROUTE,
  storage::Storage,
  validation::{ValidationErrors, detail_message},
};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::{
  cache::QueryCache,
  credentials::CredentialStore,
  error::{ApiError, AuthError},
  navigator::Navigator,
  transport::Transport,
};

const LOGIN_PATH: &str = "/auth/login";
const REGISTER_PATH: &str = "/auth/register";
const ME_PATH: &str = "/users/me";

/// The two states of the response interceptor's state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AuthPhase {
  Authenticated,
  Unauthenticated,
}

#[derive(Serialize)]
struct LoginForm<'a> {
  username:   &'a str,
  password:   &'a str,
  grant_type: &'static str,
}

pub struct Session<S> {
  transport:   Transport,
  credentials: CredentialStore<S>,
  identity:    watch::Sender<Option<Identity>>,
  phase:       Mutex<AuthPhase>,
  cache:       QueryCache,
  navigator:   Arc<Navigator>,
}

impl<S: Storage> Session<S> {
  pub fn new(
    transport: Transport,
    storage: Arc<S>,
    cache: QueryCache,
    navigator: Arc<Navigator>,
  ) -> Self {
    let (identity, _) = watch::channel(None);
    Self {
      transport,
      credentials: CredentialStore::new(storage),
      identity,
      phase: Mutex::new(AuthPhase::Unauthenticated),
      cache,
      navigator,
    }
  }

  // ── State ─────────────────────────────────────────────────────────────

  pub fn identity(&self) -> Option<Identity> { self.identity.borrow().clone() }

  pub fn credential(&self) -> Option<Credential> { self.credentials.get() }

  pub fn capabilities(&self) -> CapabilitySet { evaluate(self.identity.borrow().as_ref()) }

  pub fn phase(&self) -> AuthPhase { *self.phase.lock().unwrap_or_else(PoisonError::into_inner) }

  pub fn is_authenticated(&self) -> bool {
    self.phase() == AuthPhase::Authenticated && self.credential().is_some()
  }

  /// Watch logins and logouts. The value is the current identity.
  pub fn subscribe(&self) -> watch::Receiver<Option<Identity>> { self.identity.subscribe() }

  /// Move to `to`. Returns `false` if the machine was already there.
  fn transition(&self, to: AuthPhase) -> bool {
    let mut phase = self.phase.lock().unwrap_or_else(PoisonError::into_inner);
    if *phase == to {
      return false;
    }
    *phase = to;
    true
  }

  fn establish(&self, identity: Identity) {
    self.identity.send_replace(Some(identity));
    self.transition(AuthPhase::Authenticated);
  }

  // ── Login / register ──────────────────────────────────────────────────

  /// Exchange email and password for a token, then resolve who we are.
  pub async fn login(&self, email: &str, password: &str) -> Result<Identity, AuthError> {
    let form = LoginForm { username: email, password, grant_type: "password" };
    let response = self
      .transport
      .request(Method::Post, LOGIN_PATH)
      .form(&form)
      .send()
      .await
      .map_err(ApiError::from)?;

    let status = response.status();
    if !status.is_success() {
      let body = response.bytes().await.unwrap_or_default();
      return Err(match status.as_u16() {
        400 | 401 | 403 => AuthError::InvalidCredentials(
          detail_message(&body).unwrap_or_else(|| "incorrect email or password".into()),
        ),
        422 => AuthError::Api(ApiError::Validation(ValidationErrors::from_body(&body))),
        code => AuthError::Api(ApiError::Network {
          status:  Some(code),
          message: detail_message(&body).unwrap_or_else(|| status.to_string()),
        }),
      });
    }

    let token: AuthToken = response.json().await.map_err(ApiError::from)?;
    let credential = Credential::new(token.access_token, token.token_type);
    self
      .credentials
      .set(credential.clone())
      .await
      .map_err(AuthError::storage)?;

    let identity = match self.resolve_identity(&credential).await {
      Ok(identity) => identity,
      Err(e) => {
        self.discard_credential().await;
        return Err(e);
      }
    };

    self.establish(identity.clone());
    self.cache.invalidate_many(&keys::user_scoped());
    info!(email = %identity.email, role = %identity.role, "logged in");
    Ok(identity)
  }

  /// Create an account. Does not sign in.
  pub async fn register(&self, email: &str, password: &str) -> Result<Identity, AuthError> {
    let body = RegisterRequest { email: email.to_string(), password: password.to_string() };
    let response = self
      .transport
      .request(Method::Post, REGISTER_PATH)
      .json(&body)
      .send()
      .await
      .map_err(ApiError::from)?;

    let status = response.status();
    if !status.is_success() {
      let body = response.bytes().await.unwrap_or_default();
      let error = if status.as_u16() == 422 {
        ApiError::Validation(ValidationErrors::from_body(&body))
      } else {
        ApiError::Network {
          status:  Some(status.as_u16()),
          message: detail_message(&body).unwrap_or_else(|| status.to_string()),
        }
      };
      return Err(error.into());
    }

    let identity: Identity = response.json().await.map_err(ApiError::from)?;
    info!(email = %identity.email, "registered");
    Ok(identity)
  }

  // ── Identity resolution ───────────────────────────────────────────────

  async fn fetch_me(&self, credential: &Credential) -> Result<Identity, ApiError> {
    let response = self
      .transport
      .request(Method::Get, ME_PATH)
      .header(reqwest::header::AUTHORIZATION, credential.authorization())
      .send()
      .await?;

    let status = response.status();
    if !status.is_success() {
      return Err(ApiError::Network {
        status:  Some(status.as_u16()),
        message: format!("GET {ME_PATH} returned {status}"),
      });
    }
    Ok(response.json().await?)
  }

  /// `/users/me`, falling back to the token's own claims.
  async fn resolve_identity(&self, credential: &Credential) -> Result<Identity, AuthError> {
    match self.fetch_me(credential).await {
      Ok(identity) => Ok(identity),
      Err(e) => {
        debug!(error = %e, "falling back to token claims");
        let claims = credential.claims()?;
        Ok(Identity::from_claims(&claims, Utc::now())?)
      }
    }
  }

  /// Re-read `/users/me` for the current credential.
  pub async fn refresh_identity(&self) -> Result<Identity, AuthError> {
    let credential = self
      .credential()
      .ok_or(AuthError::Api(ApiError::AuthExpired))?;
    let identity = self.fetch_me(&credential).await?;
    self.identity.send_replace(Some(identity.clone()));
    Ok(identity)
  }

  // ── Restore ───────────────────────────────────────────────────────────

  /// Pick up a persisted session at startup.
  ///
  /// A missing, expired or undecodable credential leaves the session signed
  /// out; nothing here is fatal.
  pub async fn restore(&self) -> Option<Identity> {
    let credential = match self.credentials.load().await {
      Ok(Some(credential)) => credential,
      Ok(None) => return None,
      Err(e) => {
        warn!(error = %e, "could not read persisted credential");
        return None;
      }
    };

    if credential.is_expired() {
      info!("persisted credential has expired");
      self.discard_credential().await;
      return None;
    }

    match self.resolve_identity(&credential).await {
      Ok(identity) => {
        info!(email = %identity.email, "session restored");
        self.establish(identity.clone());
        Some(identity)
      }
      Err(e) => {
        warn!(error = %e, "discarding undecodable credential");
        self.discard_credential().await;
        None
      }
    }
  }

  async fn discard_credential(&self) {
    if let Err(e) = self.credentials.clear().await {
      warn!(error = %e, "could not clear persisted credential");
    }
  }

  // ── Teardown ──────────────────────────────────────────────────────────

  pub async fn logout(&self) {
    self.transition(AuthPhase::Unauthenticated);
    info!("logging out");
    self.teardown().await;
  }

  /// End the session because the server rejected the credential.
  ///
  /// Only the first caller tears down; later callers find the machine
  /// already unauthenticated and return `false`.
  pub async fn expire(&self) -> bool {
    if !self.transition(AuthPhase::Unauthenticated) {
      debug!("session already expired");
      return false;
    }
    info!("session expired");
    self.teardown().await;
    true
  }

  async fn teardown(&self) {
    self.credentials.forget();
    self.identity.send_replace(None);
    self.cache.clear();
    self.discard_credential().await;
    self.navigator.navigate(LOGIN_ROUTE);
  }
}
