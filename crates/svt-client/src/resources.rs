//! Typed services for the backend's resources.
//!
//! Reads go through the [`QueryCache`] under the key factories in
//! [`svt_core::query_key::keys`]; writes go straight through the gateway and
//! then invalidate whatever they made stale.

use std::{sync::Arc, time::Duration};

use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use svt_core::{
  identity::{Identity, Role},
  model::{
    Category, CategoryInput, CategoryProductCount, Kardex, Movement, MovementCreate,
    PhysicalCount, Product, ProductCreate, ProductUpdate, RoleUpdate, StockAdjustment, StockLine,
    StockSummary, Supplier, SupplierInput, Transfer, UserCreate, UserStats, UserUpdate, Warehouse,
    WarehouseInput,
  },
  query_key::{Filters, QueryKey, keys},
  storage::Storage,
};
use tracing::warn;

use crate::{
  cache::{QueryCache, QueryOptions},
  error::ApiError,
  gateway::{ApiRequest, Gateway},
};

const MINUTE: Duration = Duration::from_secs(60);

/// Fetch `request` through the cache under `key`.
async fn cached<S, T>(
  gateway: &Arc<Gateway<S>>,
  cache: &QueryCache,
  key: QueryKey,
  options: QueryOptions,
  request: ApiRequest,
) -> Result<T, ApiError>
where
  S: Storage + 'static,
  T: Serialize + DeserializeOwned + Send + 'static,
{
  let gateway = gateway.clone();
  cache
    .fetch_as(key, options, move || {
      let gateway = gateway.clone();
      let request = request.clone();
      async move { gateway.json::<T>(request).await }
    })
    .await
}

// ─── Products ────────────────────────────────────────────────────────────────

pub struct Products<S> {
  gateway: Arc<Gateway<S>>,
  cache:   QueryCache,
}

impl<S: Storage + 'static> Products<S> {
  pub fn new(gateway: Arc<Gateway<S>>, cache: QueryCache) -> Self { Self { gateway, cache } }

  fn list_options(&self) -> QueryOptions {
    self
      .cache
      .defaults()
      .with_stale_time(2 * MINUTE)
      .with_gc_time(5 * MINUTE)
  }

  fn detail_options(&self) -> QueryOptions {
    self
      .cache
      .defaults()
      .with_stale_time(5 * MINUTE)
      .with_gc_time(10 * MINUTE)
  }

  pub async fn list(&self, filters: &Filters) -> Result<Vec<Product>, ApiError> {
    let request = ApiRequest::get("/productos").filters(filters);
    cached(&self.gateway, &self.cache, keys::productos::list(filters), self.list_options(), request)
      .await
  }

  pub async fn get(&self, id: i64) -> Result<Product, ApiError> {
    let request = ApiRequest::get(format!("/productos/{id}"));
    cached(&self.gateway, &self.cache, keys::productos::detail(id), self.detail_options(), request)
      .await
  }

  /// Search by name or SKU.
  pub async fn search(&self, query: &str) -> Result<Vec<Product>, ApiError> {
    let request = ApiRequest::get("/productos").query("search", query);
    let options = self.cache.defaults().with_stale_time(MINUTE);
    cached(&self.gateway, &self.cache, keys::productos::search(query), options, request).await
  }

  /// Warm the detail entry, e.g. on hover.
  pub async fn prefetch(&self, id: i64) {
    let gateway = self.gateway.clone();
    self
      .cache
      .prefetch(keys::productos::detail(id), self.detail_options(), move || {
        let gateway = gateway.clone();
        async move {
          gateway
            .json::<Value>(ApiRequest::get(format!("/productos/{id}")))
            .await
        }
      })
      .await;
  }

  pub async fn create(&self, product: &ProductCreate) -> Result<Product, ApiError> {
    let created: Product = self
      .gateway
      .json(ApiRequest::post("/productos").json(product)?)
      .await?;
    self
      .cache
      .invalidate_many(&[keys::productos::lists(), keys::inventario::all()]);
    Ok(created)
  }

  pub async fn update(&self, id: i64, changes: &ProductUpdate) -> Result<Product, ApiError> {
    let updated: Product = self
      .gateway
      .json(ApiRequest::put(format!("/productos/{id}")).json(changes)?)
      .await?;
    self
      .cache
      .set_data(keys::productos::detail(id), serde_json::to_value(&updated)?);
    self.cache.invalidate(&keys::productos::lists());
    Ok(updated)
  }

  pub async fn delete(&self, id: i64) -> Result<(), ApiError> {
    self
      .gateway
      .execute(ApiRequest::delete(format!("/productos/{id}")))
      .await?;
    self.cache.remove(&keys::productos::detail(id));
    self
      .cache
      .invalidate_many(&[keys::productos::lists(), keys::inventario::all()]);
    Ok(())
  }
}

// ─── Categories ──────────────────────────────────────────────────────────────

pub struct Categories<S> {
  gateway: Arc<Gateway<S>>,
  cache:   QueryCache,
}

impl<S: Storage + 'static> Categories<S> {
  pub fn new(gateway: Arc<Gateway<S>>, cache: QueryCache) -> Self { Self { gateway, cache } }

  /// Categories change rarely.
  fn options(&self) -> QueryOptions { self.cache.defaults().with_stale_time(30 * MINUTE) }

  pub async fn list(&self, filters: &Filters) -> Result<Vec<Category>, ApiError> {
    let request = ApiRequest::get("/categorias").filters(filters);
    cached(&self.gateway, &self.cache, keys::categorias::list(filters), self.options(), request)
      .await
  }

  /// Only the active ones, as offered in product forms.
  pub async fn active(&self) -> Result<Vec<Category>, ApiError> {
    let request = ApiRequest::get("/categorias/activas");
    cached(&self.gateway, &self.cache, keys::categorias_activas(), self.options(), request).await
  }

  pub async fn get(&self, id: i64) -> Result<Category, ApiError> {
    let request = ApiRequest::get(format!("/categorias/{id}"));
    cached(&self.gateway, &self.cache, keys::categorias::detail(id), self.options(), request).await
  }

  /// Search by name, code or description.
  pub async fn search(&self, query: &str) -> Result<Vec<Category>, ApiError> {
    let request = ApiRequest::get("/categorias").query("search", query);
    let options = self.cache.defaults().with_stale_time(MINUTE);
    cached(&self.gateway, &self.cache, keys::categorias::search(query), options, request).await
  }

  pub async fn product_count(&self, id: i64) -> Result<CategoryProductCount, ApiError> {
    self
      .gateway
      .json(ApiRequest::get(format!("/categorias/{id}/productos/count")))
      .await
  }

  pub async fn create(&self, category: &CategoryInput) -> Result<Category, ApiError> {
    let created: Category = self
      .gateway
      .json(ApiRequest::post("/categorias").json(category)?)
      .await?;
    self.cache.invalidate(&keys::categorias::lists());
    Ok(created)
  }

  pub async fn update(&self, id: i64, category: &CategoryInput) -> Result<Category, ApiError> {
    let updated: Category = self
      .gateway
      .json(ApiRequest::put(format!("/categorias/{id}")).json(category)?)
      .await?;
    self
      .cache
      .set_data(keys::categorias::detail(id), serde_json::to_value(&updated)?);
    // products show their category by name
    self
      .cache
      .invalidate_many(&[keys::categorias::lists(), keys::productos::all()]);
    Ok(updated)
  }

  pub async fn delete(&self, id: i64) -> Result<(), ApiError> {
    self
      .gateway
      .execute(ApiRequest::delete(format!("/categorias/{id}")))
      .await?;
    self.cache.remove(&keys::categorias::detail(id));
    self
      .cache
      .invalidate_many(&[keys::categorias::lists(), keys::productos::all()]);
    Ok(())
  }
}

// ─── Suppliers ───────────────────────────────────────────────────────────────

pub struct Suppliers<S> {
  gateway: Arc<Gateway<S>>,
  cache:   QueryCache,
}

impl<S: Storage + 'static> Suppliers<S> {
  pub fn new(gateway: Arc<Gateway<S>>, cache: QueryCache) -> Self { Self { gateway, cache } }

  pub async fn list(&self, filters: &Filters) -> Result<Vec<Supplier>, ApiError> {
    let request = ApiRequest::get("/proveedores").filters(filters);
    let options = self.cache.defaults();
    cached(&self.gateway, &self.cache, keys::proveedores::list(filters), options, request).await
  }

  pub async fn get(&self, id: i64) -> Result<Supplier, ApiError> {
    let request = ApiRequest::get(format!("/proveedores/{id}"));
    let options = self.cache.defaults();
    cached(&self.gateway, &self.cache, keys::proveedores::detail(id), options, request).await
  }

  pub async fn create(&self, supplier: &SupplierInput) -> Result<Supplier, ApiError> {
    let created: Supplier = self
      .gateway
      .json(ApiRequest::post("/proveedores").json(supplier)?)
      .await?;
    self.cache.invalidate(&keys::proveedores::lists());
    Ok(created)
  }

  pub async fn update(&self, id: i64, changes: &SupplierInput) -> Result<Supplier, ApiError> {
    let updated: Supplier = self
      .gateway
      .json(ApiRequest::put(format!("/proveedores/{id}")).json(changes)?)
      .await?;
    self
      .cache
      .set_data(keys::proveedores::detail(id), serde_json::to_value(&updated)?);
    self.cache.invalidate(&keys::proveedores::lists());
    Ok(updated)
  }

  pub async fn delete(&self, id: i64) -> Result<(), ApiError> {
    self
      .gateway
      .execute(ApiRequest::delete(format!("/proveedores/{id}")))
      .await?;
    self.cache.remove(&keys::proveedores::detail(id));
    self.cache.invalidate(&keys::proveedores::lists());
    Ok(())
  }
}

// ─── Warehouses ──────────────────────────────────────────────────────────────

pub struct Warehouses<S> {
  gateway: Arc<Gateway<S>>,
  cache:   QueryCache,
}

impl<S: Storage + 'static> Warehouses<S> {
  pub fn new(gateway: Arc<Gateway<S>>, cache: QueryCache) -> Self { Self { gateway, cache } }

  fn options(&self) -> QueryOptions { self.cache.defaults().with_stale_time(10 * MINUTE) }

  /// Every warehouse, or only the active ones.
  pub async fn list(&self, only_active: bool) -> Result<Vec<Warehouse>, ApiError> {
    let filters = Filters::new()
      .set("skip", 0)
      .set("limit", 100)
      .set("solo_activas", only_active);
    let request = ApiRequest::get("/inventario/bodegas").filters(&filters);
    cached(&self.gateway, &self.cache, keys::bodegas::list(&filters), self.options(), request)
      .await
  }

  pub async fn get(&self, id: i64) -> Result<Warehouse, ApiError> {
    let request = ApiRequest::get(format!("/inventario/bodegas/{id}"));
    cached(&self.gateway, &self.cache, keys::bodegas::detail(id), self.options(), request).await
  }

  pub async fn create(&self, warehouse: &WarehouseInput) -> Result<Warehouse, ApiError> {
    let created: Warehouse = self
      .gateway
      .json(ApiRequest::post("/inventario/bodegas").json(warehouse)?)
      .await?;
    self.cache.invalidate(&keys::bodegas::lists());
    Ok(created)
  }

  pub async fn update(&self, id: i64, changes: &WarehouseInput) -> Result<Warehouse, ApiError> {
    let updated: Warehouse = self
      .gateway
      .json(ApiRequest::put(format!("/inventario/bodegas/{id}")).json(changes)?)
      .await?;
    self
      .cache
      .set_data(keys::bodegas::detail(id), serde_json::to_value(&updated)?);
    self.cache.invalidate(&keys::bodegas::lists());
    Ok(updated)
  }
}

// ─── Inventory ───────────────────────────────────────────────────────────────

pub struct Inventory<S> {
  gateway: Arc<Gateway<S>>,
  cache:   QueryCache,
}

impl<S: Storage + 'static> Inventory<S> {
  pub fn new(gateway: Arc<Gateway<S>>, cache: QueryCache) -> Self { Self { gateway, cache } }

  fn stock_options(&self) -> QueryOptions { self.cache.defaults().with_stale_time(2 * MINUTE) }

  /// Consolidated stock for one product.
  pub async fn stock(&self, producto_id: i64) -> Result<StockSummary, ApiError> {
    let request = ApiRequest::get(format!("/inventario/stock/producto/{producto_id}"));
    let key = keys::inventario::stock_producto(producto_id);
    cached(&self.gateway, &self.cache, key, self.stock_options(), request).await
  }

  /// Every product's stock in one warehouse.
  pub async fn warehouse_stock(&self, bodega_id: i64) -> Result<Vec<StockLine>, ApiError> {
    let request = ApiRequest::get(format!("/inventario/stock/bodega/{bodega_id}"));
    let key = keys::inventario::stock_bodega(bodega_id);
    cached(&self.gateway, &self.cache, key, self.stock_options(), request).await
  }

  /// Products at or below their minimum stock.
  pub async fn alerts(&self) -> Result<Value, ApiError> {
    let request = ApiRequest::get("/inventario/stock/alertas");
    cached(&self.gateway, &self.cache, keys::inventario::alertas(), self.stock_options(), request)
      .await
  }

  /// Movement history, filtered by `producto_id`, `bodega_id`,
  /// `tipo_movimiento`, `fecha_inicio`/`fecha_fin`, and paged with
  /// `skip`/`limit`.
  pub async fn movements(&self, filters: &Filters) -> Result<Vec<Movement>, ApiError> {
    let request = ApiRequest::get("/inventario/movimientos").filters(filters);
    let key = keys::inventario::movimientos(filters);
    cached(&self.gateway, &self.cache, key, self.cache.defaults().with_stale_time(MINUTE), request)
      .await
  }

  /// One page of movements; `page` starts at 1.
  pub async fn movements_page(
    &self,
    page: u32,
    size: u32,
    filters: &Filters,
  ) -> Result<Vec<Movement>, ApiError> {
    let skip = page.saturating_sub(1).saturating_mul(size);
    let filters = filters.clone().set("skip", skip).set("limit", size);
    self.movements(&filters).await
  }

  /// A product's movement ledger, optionally bounded by `fecha_inicio`,
  /// `fecha_fin` and `bodega_id`.
  pub async fn kardex(&self, producto_id: i64, filters: &Filters) -> Result<Kardex, ApiError> {
    let request = ApiRequest::get(format!("/inventario/kardex/{producto_id}")).filters(filters);
    let key = keys::inventario::kardex(producto_id, filters);
    cached(&self.gateway, &self.cache, key, self.cache.defaults().with_stale_time(MINUTE), request)
      .await
  }

  pub async fn record_movement(&self, movement: &MovementCreate) -> Result<Movement, ApiError> {
    let created: Movement = self
      .gateway
      .json(ApiRequest::post("/inventario/movimientos").json(movement)?)
      .await?;
    self.stock_changed();
    Ok(created)
  }

  /// Move stock between two warehouses.
  pub async fn transfer(&self, transfer: &Transfer) -> Result<Value, ApiError> {
    let result = self
      .gateway
      .json(ApiRequest::post("/inventario/transferencia").json(transfer)?)
      .await?;
    self.stock_changed();
    Ok(result)
  }

  /// Submit counted quantities; the backend records an adjustment for every
  /// difference and returns them.
  pub async fn physical_count(&self, count: &PhysicalCount) -> Result<Vec<Movement>, ApiError> {
    let adjustments = self
      .gateway
      .json(ApiRequest::post("/inventario/inventario-fisico").json(count)?)
      .await?;
    self.stock_changed();
    Ok(adjustments)
  }

  fn stock_changed(&self) {
    self
      .cache
      .invalidate_many(&[keys::inventario::all(), keys::productos::lists()]);
  }

  /// Adjust stock with an optimistic update of the product's cached stock.
  /// The cached stock is restored if the backend rejects the adjustment.
  pub async fn adjust(&self, adjustment: &StockAdjustment) -> Result<Value, ApiError> {
    let request = ApiRequest::post("/inventario/ajuste").json(adjustment)?;
    let (bodega_id, delta) = (adjustment.bodega_id, adjustment.cantidad);

    let result = self
      .cache
      .mutate_optimistic(
        keys::inventario::stock_producto(adjustment.producto_id),
        move |old| {
          let mut stock: StockSummary = serde_json::from_value(old?.clone()).ok()?;
          stock.apply(bodega_id, delta);
          serde_json::to_value(stock).ok()
        },
        self.gateway.json::<Value>(request),
      )
      .await?;

    self.stock_changed();
    Ok(result)
  }
}

// ─── Users ───────────────────────────────────────────────────────────────────

pub struct Users<S> {
  gateway: Arc<Gateway<S>>,
  cache:   QueryCache,
}

impl<S: Storage + 'static> Users<S> {
  pub fn new(gateway: Arc<Gateway<S>>, cache: QueryCache) -> Self { Self { gateway, cache } }

  pub async fn list(&self, filters: &Filters) -> Result<Vec<Identity>, ApiError> {
    let request = ApiRequest::get("/users").filters(filters);
    let options = self.cache.defaults();
    cached(&self.gateway, &self.cache, keys::users::list(filters), options, request).await
  }

  pub async fn get(&self, id: i64) -> Result<Identity, ApiError> {
    let request = ApiRequest::get(format!("/users/{id}"));
    let options = self.cache.defaults();
    cached(&self.gateway, &self.cache, keys::users::detail(id), options, request).await
  }

  /// Account counts by state and role.
  pub async fn stats(&self) -> Result<UserStats, ApiError> {
    let request = ApiRequest::get("/users/stats/overview");
    let options = self.cache.defaults();
    cached(&self.gateway, &self.cache, keys::users_stats(), options, request).await
  }

  pub async fn create(&self, user: &UserCreate) -> Result<Identity, ApiError> {
    let created: Identity = self
      .gateway
      .json(ApiRequest::post("/users").json(user)?)
      .await?;
    self.cache.invalidate(&keys::users::all());
    Ok(created)
  }

  pub async fn update(&self, id: i64, changes: &UserUpdate) -> Result<Identity, ApiError> {
    let updated: Identity = self
      .gateway
      .json(ApiRequest::put(format!("/users/{id}")).json(changes)?)
      .await?;
    self
      .cache
      .set_data(keys::users::detail(id), serde_json::to_value(&updated)?);
    self
      .cache
      .invalidate_many(&[keys::users::lists(), keys::users_stats()]);
    self.refresh_if_current(id).await;
    Ok(updated)
  }

  pub async fn change_role(&self, id: i64, role: Role) -> Result<Identity, ApiError> {
    let body = RoleUpdate { new_role: role.to_string() };
    let updated: Identity = self
      .gateway
      .json(ApiRequest::put(format!("/users/{id}/role")).json(&body)?)
      .await?;
    self.cache.invalidate(&keys::users::all());
    self.refresh_if_current(id).await;
    Ok(updated)
  }

  pub async fn activate(&self, id: i64) -> Result<(), ApiError> {
    self.set_active(id, true).await
  }

  pub async fn deactivate(&self, id: i64) -> Result<(), ApiError> {
    self.set_active(id, false).await
  }

  async fn set_active(&self, id: i64, active: bool) -> Result<(), ApiError> {
    let action = if active { "activate" } else { "deactivate" };
    self
      .gateway
      .execute(ApiRequest::patch(format!("/users/{id}/{action}")))
      .await?;
    self.cache.invalidate(&keys::users::all());
    Ok(())
  }

  /// Re-read the signed-in identity if `id` is who we are.
  async fn refresh_if_current(&self, id: i64) {
    let session = self.gateway.session();
    if session.identity().is_none_or(|me| me.id != id) {
      return;
    }
    if let Err(e) = session.refresh_identity().await {
      warn!(error = %e, "could not refresh the signed-in identity");
    }
    self.cache.invalidate(&keys::auth::profile());
  }

  pub async fn delete(&self, id: i64) -> Result<(), ApiError> {
    self
      .gateway
      .execute(ApiRequest::delete(format!("/users/{id}")))
      .await?;
    self.cache.remove(&keys::users::detail(id));
    self.cache.invalidate(&keys::users::lists());
    Ok(())
  }
}

// ─── Reports ─────────────────────────────────────────────────────────────────

pub struct Reports<S> {
  gateway: Arc<Gateway<S>>,
  cache:   QueryCache,
}

impl<S: Storage + 'static> Reports<S> {
  pub fn new(gateway: Arc<Gateway<S>>, cache: QueryCache) -> Self { Self { gateway, cache } }

  pub async fn report(&self, filters: &Filters) -> Result<Value, ApiError> {
    let request = ApiRequest::get("/reportes").filters(filters);
    let options = self.cache.defaults();
    cached(&self.gateway, &self.cache, keys::reportes::report(filters), options, request).await
  }
}
