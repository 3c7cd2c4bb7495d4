//! Where the user is being sent.
//!
//! The session layer never renders anything; it only records navigation
//! intents here. A front end subscribes and reacts.

use std::sync::{Mutex, PoisonError};

use svt_core::route::HOME_ROUTE;
use tokio::sync::watch;
use tracing::debug;

#[derive(Debug)]
pub struct Navigator {
  current: watch::Sender<String>,
  history: Mutex<Vec<String>>,
}

impl Default for Navigator {
  fn default() -> Self { Self::new(HOME_ROUTE) }
}

impl Navigator {
  pub fn new(start: &str) -> Self {
    let (current, _) = watch::channel(start.to_string());
    Self { current, history: Mutex::new(Vec::new()) }
  }

  pub fn navigate(&self, path: &str) {
    debug!(path, "navigate");
    self
      .history
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .push(path.to_string());
    self.current.send_replace(path.to_string());
  }

  pub fn current(&self) -> String { self.current.borrow().clone() }

  /// Every path navigated to, oldest first.
  pub fn history(&self) -> Vec<String> {
    self
      .history
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .clone()
  }

  /// How many times `path` was navigated to.
  pub fn visits(&self, path: &str) -> usize {
    self
      .history
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .iter()
      .filter(|p| *p == path)
      .count()
  }

  pub fn subscribe(&self) -> watch::Receiver<String> { self.current.subscribe() }
}
