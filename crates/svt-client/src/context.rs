//! [`AppContext`]: the process-wide client state, built once at startup.

use std::sync::Arc;

use svt_core::storage::Storage;
use tokio::task::JoinHandle;
use tracing::info;

use crate::{
  Result,
  cache::QueryCache,
  chat::{Assistant, ChatSession},
  config::ClientConfig,
  gateway::Gateway,
  navigator::Navigator,
  prefetch::Prefetcher,
  resources::{Categories, Inventory, Products, Reports, Suppliers, Users, Warehouses},
  session::Session,
  transport::Transport,
};

/// Owns the session, cache, gateway and chat log, and hands out services
/// that share them.
///
/// Initialise with [`AppContext::init`]; tear down with
/// [`Session::logout`] (or let a 401 do it).
pub struct AppContext<S> {
  pub config:    ClientConfig,
  pub storage:   Arc<S>,
  pub cache:     QueryCache,
  pub navigator: Arc<Navigator>,
  pub session:   Arc<Session<S>>,
  pub gateway:   Arc<Gateway<S>>,
  pub chat:      Arc<ChatSession<S>>,
}

impl<S: Storage + 'static> AppContext<S> {
  /// Wire everything together without touching storage.
  pub fn new(config: ClientConfig, storage: S) -> Result<Self> {
    let storage = Arc::new(storage);
    let transport = Transport::new(&config)?;
    let cache = QueryCache::new(config.query_defaults());
    let navigator = Arc::new(Navigator::default());
    let session = Arc::new(Session::new(
      transport.clone(),
      storage.clone(),
      cache.clone(),
      navigator.clone(),
    ));
    let gateway = Arc::new(Gateway::new(transport, session.clone()));
    let chat = Arc::new(ChatSession::new(storage.clone()));

    Ok(Self { config, storage, cache, navigator, session, gateway, chat })
  }

  /// [`new`](Self::new), then restore any persisted session and chat log.
  pub async fn init(config: ClientConfig, storage: S) -> Result<Self> {
    let context = Self::new(config, storage)?;
    match context.session.restore().await {
      Some(identity) => info!(email = %identity.email, "resumed session"),
      None => info!("no session to resume"),
    }
    context.chat.load().await?;
    Ok(context)
  }

  pub fn assistant(&self) -> Assistant<S> {
    Assistant::new(
      self.gateway.clone(),
      self.chat.clone(),
      self.storage.clone(),
      self.cache.clone(),
    )
  }

  pub fn products(&self) -> Products<S> { Products::new(self.gateway.clone(), self.cache.clone()) }

  pub fn suppliers(&self) -> Suppliers<S> {
    Suppliers::new(self.gateway.clone(), self.cache.clone())
  }

  pub fn inventory(&self) -> Inventory<S> {
    Inventory::new(self.gateway.clone(), self.cache.clone())
  }

  pub fn users(&self) -> Users<S> { Users::new(self.gateway.clone(), self.cache.clone()) }

  pub fn reports(&self) -> Reports<S> { Reports::new(self.gateway.clone(), self.cache.clone()) }

  pub fn categories(&self) -> Categories<S> {
    Categories::new(self.gateway.clone(), self.cache.clone())
  }

  pub fn warehouses(&self) -> Warehouses<S> {
    Warehouses::new(self.gateway.clone(), self.cache.clone())
  }

  pub fn prefetcher(&self) -> Prefetcher<S> {
    Prefetcher::new(self.gateway.clone(), self.cache.clone())
  }

  /// Prefetch for each screen the navigator moves to. Abort the handle to
  /// stop.
  pub fn follow_routes(&self) -> JoinHandle<()> { self.prefetcher().follow(&self.navigator) }
}
