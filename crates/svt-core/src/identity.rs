//! Identity and credential types.
//!
//! An [`Identity`] is the resolved user record behind a session; a
//! [`Credential`] is the bearer token that proves it. Tokens are JWTs issued
//! by the backend. The client never verifies signatures, it only reads the
//! claims to learn the expiry and, as a fallback, who the token belongs to.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, TimeZone as _, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

// ─── Role ────────────────────────────────────────────────────────────────────

/// The closed set of roles the backend can assign.
///
/// `Admin`, `Usuario` and `Invitado` are the current roles. The lowercase
/// variants are legacy values that still appear in older user records.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
  strum::EnumIter,
)]
pub enum Role {
  #[serde(rename = "ADMIN")]
  #[strum(serialize = "ADMIN")]
  Admin,
  #[serde(rename = "USUARIO")]
  #[strum(serialize = "USUARIO")]
  Usuario,
  #[serde(rename = "INVITADO")]
  #[strum(serialize = "INVITADO")]
  Invitado,
  #[serde(rename = "admin")]
  #[strum(serialize = "admin")]
  LegacyAdmin,
  #[serde(rename = "usuario")]
  #[strum(serialize = "usuario")]
  LegacyUsuario,
  #[serde(rename = "supervisor")]
  #[strum(serialize = "supervisor")]
  Supervisor,
  #[serde(rename = "bodeguero")]
  #[strum(serialize = "bodeguero")]
  Bodeguero,
}

impl Role {
  /// Parse the wire representation of a role (case-sensitive).
  pub fn parse(s: &str) -> Result<Self> {
    s.parse().map_err(|_| Error::UnknownRole(s.to_string()))
  }

  pub fn is_legacy(self) -> bool {
    matches!(
      self,
      Self::LegacyAdmin | Self::LegacyUsuario | Self::Supervisor | Self::Bodeguero
    )
  }
}

// ─── Identity ────────────────────────────────────────────────────────────────

/// The authenticated principal, as returned by `GET /users/me`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
  pub id:     i64,
  pub email:  String,
  #[serde(rename = "rol")]
  pub role:   Role,
  #[serde(rename = "activo", default = "default_active")]
  pub active: bool,
  #[serde(rename = "nombre", default, skip_serializing_if = "Option::is_none")]
  pub name:   Option<String>,
}

fn default_active() -> bool { true }

impl Identity {
  pub fn is_admin(&self) -> bool { self.role == Role::Admin }

  pub fn is_usuario(&self) -> bool { self.role == Role::Usuario }

  pub fn is_invitado(&self) -> bool { self.role == Role::Invitado }

  /// Build an identity from the claims embedded in a token.
  ///
  /// Used when `/users/me` is unreachable. The subject claim carries the
  /// email; a missing role claim yields [`Role::Invitado`], the
  /// least-privileged current role.
  pub fn from_claims(claims: &TokenClaims, now: DateTime<Utc>) -> Result<Self> {
    if claims.expires_at().is_some_and(|exp| now >= exp) {
      return Err(Error::TokenExpired);
    }
    let email = claims
      .sub
      .as_deref()
      .filter(|s| !s.is_empty())
      .ok_or(Error::MissingSubject)?;
    let role = match claims.rol.as_deref() {
      Some(raw) => Role::parse(raw)?,
      None => Role::Invitado,
    };

    Ok(Self {
      id: claims.id.unwrap_or_default(),
      email: email.to_string(),
      role,
      active: true,
      name: None,
    })
  }

  /// The part of the email before `@`, used as a display name fallback.
  pub fn display_name(&self) -> &str {
    if let Some(name) = self.name.as_deref() {
      return name;
    }
    self.email.split('@').next().unwrap_or(&self.email)
  }
}

// ─── Token claims ────────────────────────────────────────────────────────────

/// The subset of JWT claims the client reads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
  #[serde(default)]
  pub sub: Option<String>,
  /// Expiry as seconds since the Unix epoch.
  #[serde(default)]
  pub exp: Option<i64>,
  #[serde(default, alias = "role")]
  pub rol: Option<String>,
  #[serde(default, alias = "user_id")]
  pub id:  Option<i64>,
}

impl TokenClaims {
  pub fn expires_at(&self) -> Option<DateTime<Utc>> {
    self.exp.and_then(|secs| Utc.timestamp_opt(secs, 0).single())
  }
}

/// Decode the payload segment of a JWT without verifying its signature.
pub fn decode_claims(token: &str) -> Result<TokenClaims> {
  let mut segments = token.split('.');
  let (Some(_header), Some(payload), Some(_signature), None) = (
    segments.next(),
    segments.next(),
    segments.next(),
    segments.next(),
  ) else {
    return Err(Error::MalformedToken(
      "expected three dot-separated segments".into(),
    ));
  };

  let bytes = URL_SAFE_NO_PAD
    .decode(payload.trim_end_matches('='))
    .map_err(|e| Error::MalformedToken(format!("payload is not base64url: {e}")))?;

  serde_json::from_slice(&bytes)
    .map_err(|e| Error::MalformedToken(format!("payload is not a claims object: {e}")))
}

// ─── Credential ──────────────────────────────────────────────────────────────

/// A bearer token plus its type, as handed out by `POST /auth/login`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
  pub token:      String,
  pub token_type: String,
  /// Taken from the token's `exp` claim when it can be decoded.
  pub expires_at: Option<DateTime<Utc>>,
}

impl Credential {
  pub fn new(token: impl Into<String>, token_type: impl Into<String>) -> Self {
    let token = token.into();
    let expires_at = decode_claims(&token).ok().and_then(|c| c.expires_at());
    Self { token, token_type: token_type.into(), expires_at }
  }

  pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
    self.expires_at.is_some_and(|exp| now >= exp)
  }

  pub fn is_expired(&self) -> bool { self.is_expired_at(Utc::now()) }

  /// Value for the `Authorization` header.
  pub fn authorization(&self) -> String { format!("Bearer {}", self.token) }

  pub fn claims(&self) -> Result<TokenClaims> { decode_claims(&self.token) }
}

#[cfg(test)]
pub(crate) fn unsigned_token(claims: &serde_json::Value) -> String {
  let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
  let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
  format!("{header}.{payload}.signature")
}
