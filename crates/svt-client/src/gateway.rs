//! The authenticated request gateway.
//!
//! Every request is checked against the endpoint access table before it is
//! sent. Denied requests fail with [`ApiError::PermissionDenied`] and never
//! reach the network. Allowed requests carry the session's bearer token and
//! pass their response through the [`Interceptor`].
//!
//! The gateway never touches the query cache; callers decide what to cache
//! or invalidate.

use std::sync::{Arc, atomic::AtomicBool};

use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use svt_core::{
  endpoint::{self, Access, Method},
  query_key::Filters,
  storage::Storage,
};
use tracing::{debug, warn};

use crate::{error::ApiError, interceptor::Interceptor, session::Session, transport::Transport};

// ─── Request ─────────────────────────────────────────────────────────────────

/// One outbound call: method, path, optional query string and JSON body.
///
/// Clones are the same logical request: they share the flag that records
/// whether a 401 for this request has already ended a session, so resending
/// a clone never tears down a second one.
#[derive(Debug, Clone)]
pub struct ApiRequest {
  method:  Method,
  path:    String,
  query:   Vec<(String, String)>,
  body:    Option<Value>,
  expired: Arc<AtomicBool>,
}

impl ApiRequest {
  pub fn new(method: Method, path: impl Into<String>) -> Self {
    Self {
      method,
      path: path.into(),
      query: Vec::new(),
      body: None,
      expired: Arc::default(),
    }
  }

  pub fn get(path: impl Into<String>) -> Self { Self::new(Method::Get, path) }

  pub fn post(path: impl Into<String>) -> Self { Self::new(Method::Post, path) }

  pub fn put(path: impl Into<String>) -> Self { Self::new(Method::Put, path) }

  pub fn patch(path: impl Into<String>) -> Self { Self::new(Method::Patch, path) }

  pub fn delete(path: impl Into<String>) -> Self { Self::new(Method::Delete, path) }

  pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
    self.query.push((key.into(), value.to_string()));
    self
  }

  pub fn filters(mut self, filters: &Filters) -> Self {
    self
      .query
      .extend(filters.pairs().map(|(k, v)| (k.to_string(), v.to_string())));
    self
  }

  pub fn json(mut self, body: &impl Serialize) -> Result<Self, ApiError> {
    self.body = Some(serde_json::to_value(body)?);
    Ok(self)
  }

  pub fn method(&self) -> Method { self.method }

  pub fn path(&self) -> &str { &self.path }
}

// ─── Gateway ─────────────────────────────────────────────────────────────────

pub struct Gateway<S> {
  transport:   Transport,
  session:     Arc<Session<S>>,
  interceptor: Interceptor<S>,
}

impl<S: Storage> Gateway<S> {
  pub fn new(transport: Transport, session: Arc<Session<S>>) -> Self {
    let interceptor = Interceptor::new(session.clone());
    Self { transport, session, interceptor }
  }

  /// Whether the current identity may issue `method path`.
  pub fn can_make_request(&self, path: &str, method: Method) -> bool {
    endpoint::can_make_request(self.session.identity().as_ref(), path, method)
  }

  /// Check, send, and inspect `request`.
  pub async fn send(&self, request: ApiRequest) -> Result<reqwest::Response, ApiError> {
    let access = endpoint::required_access(&request.path, request.method);
    if !self.can_make_request(&request.path, request.method) {
      let capability = match access {
        Access::Requires(capability) => Some(capability),
        _ => None,
      };
      warn!(
        method = %request.method,
        path = %request.path,
        capability = ?capability,
        "request denied"
      );
      return Err(ApiError::PermissionDenied {
        method: request.method,
        path: request.path,
        capability,
      });
    }

    let mut builder = self.transport.request(request.method, &request.path);
    if access != Access::Public
      && let Some(credential) = self.session.credential()
    {
      builder = builder.header(reqwest::header::AUTHORIZATION, credential.authorization());
    }
    if !request.query.is_empty() {
      builder = builder.query(&request.query);
    }
    if let Some(body) = &request.body {
      builder = builder.json(body);
    }

    debug!(method = %request.method, path = %request.path, "sending");
    let response = builder.send().await?;
    self.interceptor.inspect(response, &request.expired).await
  }

  /// Send and decode a JSON response body.
  pub async fn json<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T, ApiError> {
    let response = self.send(request).await?;
    Ok(response.json().await?)
  }

  /// Send and discard the response body.
  pub async fn execute(&self, request: ApiRequest) -> Result<(), ApiError> {
    self.send(request).await.map(drop)
  }

  pub fn session(&self) -> &Arc<Session<S>> { &self.session }
}
