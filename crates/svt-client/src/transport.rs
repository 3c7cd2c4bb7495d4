//! The HTTP connection to the backend.

use reqwest::{Client, RequestBuilder};
use svt_core::endpoint::Method;

use crate::config::ClientConfig;

/// A [`reqwest::Client`] plus the backend's base URL.
///
/// Cheap to clone; the inner client is `Arc`-based.
#[derive(Debug, Clone)]
pub struct Transport {
  client:   Client,
  base_url: String,
}

impl Transport {
  pub fn new(config: &ClientConfig) -> Result<Self, reqwest::Error> {
    let client = Client::builder().timeout(config.timeout()).build()?;
    Ok(Self {
      client,
      base_url: config.base_url.trim_end_matches('/').to_string(),
    })
  }

  pub fn base_url(&self) -> &str { &self.base_url }

  fn url(&self, path: &str) -> String {
    if path.starts_with('/') {
      format!("{}{path}", self.base_url)
    } else {
      format!("{}/{path}", self.base_url)
    }
  }

  /// Start a request for `method path`. No credential is attached here.
  pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
    self.client.request(http_method(method), self.url(path))
  }
}

fn http_method(method: Method) -> reqwest::Method {
  match method {
    Method::Get => reqwest::Method::GET,
    Method::Post => reqwest::Method::POST,
    Method::Put => reqwest::Method::PUT,
    Method::Patch => reqwest::Method::PATCH,
    Method::Delete => reqwest::Method::DELETE,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn joins_paths_onto_base_url() {
    let transport = Transport::new(&ClientConfig::with_base_url("http://svt.local/api/")).unwrap();
    assert_eq!(transport.base_url(), "http://svt.local/api");
    assert_eq!(transport.url("/productos"), "http://svt.local/api/productos");
    assert_eq!(transport.url("users/me"), "http://svt.local/api/users/me");
  }
}
