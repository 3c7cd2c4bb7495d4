//! Error types for `svt-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("unknown role: {0:?}")]
  UnknownRole(String),

  #[error("unknown HTTP method: {0:?}")]
  UnknownMethod(String),

  #[error("malformed token: {0}")]
  MalformedToken(String),

  #[error("token has no subject claim")]
  MissingSubject,

  #[error("token expired")]
  TokenExpired,

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
