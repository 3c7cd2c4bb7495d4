//! Client configuration.
//!
//! Loaded from an optional TOML file, then `SVT_*` environment variables
//! (e.g. `SVT_BASE_URL`). Every field has a default, so an empty source set
//! yields a usable config pointing at a local backend.

use std::{path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{
  Result,
  cache::{QueryOptions, RetryPolicy},
};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
  pub base_url:        String,
  /// Applied uniformly to every request.
  pub timeout_secs:    u64,
  pub stale_time_secs: u64,
  pub gc_time_secs:    u64,
  /// Retries after the first attempt for retryable failures.
  pub max_retries:     u32,
}

impl Default for ClientConfig {
  fn default() -> Self {
    Self {
      base_url:        "http://localhost:8000".into(),
      timeout_secs:    10,
      stale_time_secs: 5 * 60,
      gc_time_secs:    30 * 60,
      max_retries:     3,
    }
  }
}

impl ClientConfig {
  /// Layer an optional file and the environment over the defaults.
  pub fn load(file: Option<&Path>) -> Result<Self> {
    let mut builder = config::Config::builder();
    if let Some(file) = file {
      builder = builder.add_source(config::File::from(file).required(false));
    }
    let settings = builder
      .add_source(config::Environment::with_prefix("SVT"))
      .build()?;
    Ok(settings.try_deserialize()?)
  }

  /// A config for a backend at `base_url` with every other field defaulted.
  pub fn with_base_url(base_url: impl Into<String>) -> Self {
    Self { base_url: base_url.into(), ..Self::default() }
  }

  pub fn timeout(&self) -> Duration { Duration::from_secs(self.timeout_secs) }

  /// Cache defaults for queries that do not override them.
  pub fn query_defaults(&self) -> QueryOptions {
    QueryOptions {
      stale_time: Duration::from_secs(self.stale_time_secs),
      gc_time:    Duration::from_secs(self.gc_time_secs),
      retry:      RetryPolicy { max_retries: self.max_retries, ..RetryPolicy::default() },
    }
  }
}
