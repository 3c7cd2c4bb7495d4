//! Route-driven prefetching.
//!
//! Entering a screen warms the queries that screen is about to read, so the
//! first render comes from the cache. Prefetches never fail: errors
//! (including permission denials for roles that cannot see the data) are
//! logged and dropped.

use std::sync::Arc;

use svt_core::{query_key::Filters, storage::Storage};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::{
  cache::QueryCache,
  error::ApiError,
  gateway::Gateway,
  navigator::Navigator,
  resources::{Categories, Inventory, Products, Warehouses},
};

/// The screens that have something worth prefetching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
  Dashboard,
  Inventory,
  Products,
  Warehouses,
  Categories,
}

impl Screen {
  /// Classify a route by its most specific known segment, so
  /// `/dashboard/productos` is the products screen.
  pub fn for_route(route: &str) -> Option<Self> {
    let path = route.split(['?', '#']).next().unwrap_or_default();
    path
      .split('/')
      .filter(|segment| !segment.is_empty())
      .rev()
      .find_map(|segment| match segment {
        "inventario" => Some(Self::Inventory),
        "productos" => Some(Self::Products),
        "bodegas" => Some(Self::Warehouses),
        "categorias" => Some(Self::Categories),
        "dashboard" => Some(Self::Dashboard),
        _ => None,
      })
  }
}

pub struct Prefetcher<S> {
  gateway: Arc<Gateway<S>>,
  cache:   QueryCache,
}

impl<S: Storage + 'static> Prefetcher<S> {
  pub fn new(gateway: Arc<Gateway<S>>, cache: QueryCache) -> Self { Self { gateway, cache } }

  fn products(&self) -> Products<S> { Products::new(self.gateway.clone(), self.cache.clone()) }

  fn inventory(&self) -> Inventory<S> { Inventory::new(self.gateway.clone(), self.cache.clone()) }

  fn warehouses(&self) -> Warehouses<S> {
    Warehouses::new(self.gateway.clone(), self.cache.clone())
  }

  fn categories(&self) -> Categories<S> {
    Categories::new(self.gateway.clone(), self.cache.clone())
  }

  /// Warm what `screen` reads first.
  pub async fn prefetch_screen(&self, screen: Screen) {
    debug!(?screen, "prefetching");
    let all = Filters::new();
    let (products, inventory, warehouses, categories) =
      (self.products(), self.inventory(), self.warehouses(), self.categories());

    match screen {
      Screen::Dashboard => log_failure("alerts", inventory.alerts().await.map(drop)),
      Screen::Inventory => {
        let (listed, stored) = tokio::join!(products.list(&all), warehouses.list(true));
        log_failure("products", listed.map(drop));
        log_failure("warehouses", stored.map(drop));
      }
      Screen::Products => {
        let (listed, grouped) = tokio::join!(products.list(&all), categories.list(&all));
        log_failure("products", listed.map(drop));
        log_failure("categories", grouped.map(drop));
      }
      Screen::Warehouses => log_failure("warehouses", warehouses.list(true).await.map(drop)),
      Screen::Categories => log_failure("categories", categories.list(&all).await.map(drop)),
    }
  }

  /// [`prefetch_screen`](Self::prefetch_screen) for whatever screen `route`
  /// shows. Routes with nothing to prefetch are ignored.
  pub async fn prefetch_route(&self, route: &str) {
    if let Some(screen) = Screen::for_route(route) {
      self.prefetch_screen(screen).await;
    }
  }

  /// Data nearly every screen needs: stock alerts and warehouses.
  pub async fn prefetch_critical(&self) {
    let (inventory, warehouses) = (self.inventory(), self.warehouses());
    let (alerts, stored) = tokio::join!(inventory.alerts(), warehouses.list(true));
    log_failure("alerts", alerts.map(drop));
    log_failure("warehouses", stored.map(drop));
  }

  /// Warm one product's detail and stock, e.g. on hover.
  pub async fn prefetch_product(&self, id: i64) {
    let (products, inventory) = (self.products(), self.inventory());
    let (detail, stock) = tokio::join!(products.get(id), inventory.stock(id));
    log_failure("product", detail.map(drop));
    log_failure("stock", stock.map(drop));
  }

  /// Prefetch for the current route and every route navigated to after it,
  /// until the navigator goes away.
  pub fn follow(self, navigator: &Navigator) -> JoinHandle<()> {
    let mut routes = navigator.subscribe();
    tokio::spawn(async move {
      loop {
        let route = routes.borrow_and_update().clone();
        self.prefetch_route(&route).await;
        if routes.changed().await.is_err() {
          break;
        }
      }
    })
  }
}

fn log_failure(what: &str, result: Result<(), ApiError>) {
  if let Err(e) = result {
    warn!(what, error = %e, "prefetch failed");
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn routes_map_to_their_most_specific_screen() {
    assert_eq!(Screen::for_route("/dashboard"), Some(Screen::Dashboard));
    assert_eq!(Screen::for_route("/dashboard/inventario"), Some(Screen::Inventory));
    assert_eq!(Screen::for_route("/dashboard/productos/12"), Some(Screen::Products));
    assert_eq!(Screen::for_route("/dashboard/bodegas?activa=true"), Some(Screen::Warehouses));
    assert_eq!(Screen::for_route("/categorias/"), Some(Screen::Categories));
    assert_eq!(Screen::for_route("/login"), None);
    assert_eq!(Screen::for_route("/"), None);
  }
}
