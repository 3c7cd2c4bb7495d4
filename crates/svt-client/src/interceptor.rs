//! Response inspection.
//!
//! Every gateway response passes through [`Interceptor::inspect`]. A 401
//! ends the session (once, however many requests see it); a 422 becomes
//! field-level [`ValidationErrors`]; any other failure status is handed back
//! as [`ApiError::Network`] without retrying.

use std::sync::{
  Arc,
  atomic::{AtomicBool, Ordering},
};

use reqwest::{Response, StatusCode};
use svt_core::{
  storage::Storage,
  validation::{ValidationErrors, detail_message},
};
use tracing::warn;

use crate::{error::ApiError, session::Session};

pub struct Interceptor<S> {
  session: Arc<Session<S>>,
}

impl<S: Storage> Interceptor<S> {
  pub fn new(session: Arc<Session<S>>) -> Self { Self { session } }

  /// Pass successful responses through; turn failures into [`ApiError`]s.
  ///
  /// `expired` belongs to the logical request: the first 401 sets it and
  /// ends the session; a later 401 for the same request only fails.
  pub async fn inspect(
    &self,
    response: Response,
    expired: &AtomicBool,
  ) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
      return Ok(response);
    }

    let url = response.url().path().to_string();
    match status {
      StatusCode::UNAUTHORIZED => {
        if !expired.swap(true, Ordering::SeqCst) {
          self.session.expire().await;
        }
        Err(ApiError::AuthExpired)
      }
      StatusCode::UNPROCESSABLE_ENTITY => {
        let body = response.bytes().await.unwrap_or_default();
        let errors = ValidationErrors::from_body(&body);
        warn!(path = %url, %errors, "validation failed");
        Err(ApiError::Validation(errors))
      }
      _ => {
        let body = response.bytes().await.unwrap_or_default();
        let message = detail_message(&body).unwrap_or_else(|| {
          status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string()
        });
        Err(ApiError::Network { status: Some(status.as_u16()), message })
      }
    }
  }
}
