//! Error types for `svt-client`.
//!
//! [`ApiError`] is the taxonomy every request can fail with. It is `Clone`
//! because a single in-flight fetch hands the same outcome to every caller
//! waiting on it.

use svt_core::{endpoint::Method, permission::Capability, validation::ValidationErrors};
use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

// ─── ApiError ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Error)]
pub enum ApiError {
  /// The capability check failed; nothing was sent.
  #[error("not authorized to {method} {path}")]
  PermissionDenied {
    method:     Method,
    path:       String,
    /// `None` when the request needed a session and there was none.
    capability: Option<Capability>,
  },

  /// The server answered 401. The session has already been torn down.
  #[error("session expired")]
  AuthExpired,

  #[error("validation failed: {0}")]
  Validation(ValidationErrors),

  /// Timeouts, connection failures, and any other non-2xx status.
  #[error("{message}")]
  Network {
    status:  Option<u16>,
    message: String,
  },

  #[error("could not decode response: {0}")]
  Decode(String),
}

impl ApiError {
  pub fn status(&self) -> Option<u16> {
    match self {
      Self::AuthExpired => Some(401),
      Self::Validation(_) => Some(422),
      Self::Network { status, .. } => *status,
      Self::PermissionDenied { .. } | Self::Decode(_) => None,
    }
  }

  /// Whether the query cache may try again. Only failures outside the
  /// 400-499 range qualify.
  pub fn is_retryable(&self) -> bool {
    match self {
      Self::Network { status, .. } => status.is_none_or(|s| !(400..500).contains(&s)),
      _ => false,
    }
  }
}

impl From<reqwest::Error> for ApiError {
  fn from(e: reqwest::Error) -> Self {
    if e.is_decode() {
      return Self::Decode(e.to_string());
    }
    let message = if e.is_timeout() {
      "request timed out".to_string()
    } else {
      e.to_string()
    };
    Self::Network { status: e.status().map(|s| s.as_u16()), message }
  }
}

impl From<serde_json::Error> for ApiError {
  fn from(e: serde_json::Error) -> Self { Self::Decode(e.to_string()) }
}

// ─── AuthError ───────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum AuthError {
  #[error("invalid credentials: {0}")]
  InvalidCredentials(String),

  #[error(transparent)]
  Api(#[from] ApiError),

  #[error("storage error: {0}")]
  Storage(#[source] BoxError),

  #[error("token error: {0}")]
  Token(#[from] svt_core::Error),
}

impl AuthError {
  pub(crate) fn storage(e: impl std::error::Error + Send + Sync + 'static) -> Self {
    Self::Storage(Box::new(e))
  }
}

// ─── ChatError ───────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ChatError {
  #[error("storage error: {0}")]
  Storage(#[source] BoxError),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),
}

impl ChatError {
  pub(crate) fn storage(e: impl std::error::Error + Send + Sync + 'static) -> Self {
    Self::Storage(Box::new(e))
  }
}

// ─── Error ───────────────────────────────────────────────────────────────────

/// Failures while assembling an [`AppContext`](crate::AppContext).
#[derive(Debug, Error)]
pub enum Error {
  #[error("configuration error: {0}")]
  Config(#[from] config::ConfigError),

  #[error("http client error: {0}")]
  Http(#[from] reqwest::Error),

  #[error("chat error: {0}")]
  Chat(#[from] ChatError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
