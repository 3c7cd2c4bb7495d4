//! Wire types for the SVT backend's JSON API.
//!
//! Field names follow the backend (Spanish) so the structs round-trip
//! without per-field renames; Rust-side names are only changed where the
//! backend's would collide with a keyword or read badly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::identity::Role;

fn default_true() -> bool { true }

// ─── Auth ────────────────────────────────────────────────────────────────────

/// Body of a successful `POST /auth/login`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthToken {
  pub access_token: String,
  pub token_type:   String,
}

/// Body of `POST /auth/register`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
  pub email:    String,
  pub password: String,
}

/// Body of `PUT /users/{id}/role`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleUpdate {
  pub new_role: String,
}

// ─── Users ───────────────────────────────────────────────────────────────────

/// Body of `POST /users` (admin-created accounts).
pub type UserCreate = RegisterRequest;

/// Partial update for `PUT /users/{id}`; only the `Some` fields are sent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserUpdate {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub email:    Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub nombre:   Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub apellido: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub rol:      Option<Role>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub activo:   Option<bool>,
}

/// `GET /users/stats/overview`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserStats {
  pub total_users:    i64,
  pub active_users:   i64,
  pub inactive_users: i64,
  pub admin_users:    i64,
  pub regular_users:  i64,
  pub guest_users:    i64,
}

// ─── Products ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
  pub id:              i64,
  pub sku:             String,
  pub nombre:          String,
  #[serde(default)]
  pub descripcion:     Option<String>,
  #[serde(default)]
  pub categoria:       Option<String>,
  pub precio_unitario: f64,
  #[serde(default)]
  pub proveedor_id:    Option<i64>,
  #[serde(default)]
  pub stock_actual:    i64,
  #[serde(default)]
  pub stock_minimo:    i64,
  #[serde(default)]
  pub fecha_creacion:  Option<DateTime<Utc>>,
}

impl Product {
  pub fn is_low_stock(&self) -> bool { self.stock_actual <= self.stock_minimo }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductCreate {
  pub sku:             String,
  pub nombre:          String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub descripcion:     Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub categoria:       Option<String>,
  pub precio_unitario: f64,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub proveedor_id:    Option<i64>,
  pub stock_minimo:    i64,
  pub stock_inicial:   i64,
}

/// Partial update; only the `Some` fields are sent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProductUpdate {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub nombre:          Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub descripcion:     Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub categoria:       Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub precio_unitario: Option<f64>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub proveedor_id:    Option<i64>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub stock_minimo:    Option<i64>,
}

// ─── Categories ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
  pub id:          i64,
  pub nombre:      String,
  #[serde(default)]
  pub codigo:      Option<String>,
  #[serde(default)]
  pub descripcion: Option<String>,
  #[serde(default = "default_true")]
  pub activa:      bool,
}

/// Create and replace body; `PUT /categorias/{id}` takes the full record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryInput {
  pub nombre:      String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub codigo:      Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub descripcion: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryProductCount {
  pub categoria_id:    i64,
  pub productos_count: i64,
}

// ─── Suppliers ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Supplier {
  pub id:        i64,
  pub nombre:    String,
  pub codigo:    String,
  #[serde(default)]
  pub contacto:  Option<String>,
  #[serde(default)]
  pub telefono:  Option<String>,
  #[serde(default)]
  pub email:     Option<String>,
  #[serde(default)]
  pub direccion: Option<String>,
}

/// Create or partial-update body; only the `Some` fields are sent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SupplierInput {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub nombre:    Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub codigo:    Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub contacto:  Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub telefono:  Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub email:     Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub direccion: Option<String>,
}

// ─── Inventory ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarehouseStock {
  pub bodega_id: i64,
  pub cantidad:  i64,
}

/// Consolidated stock for one product across warehouses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockSummary {
  pub producto_id:      i64,
  pub stock_total:      i64,
  #[serde(default)]
  pub stock_por_bodega: Vec<WarehouseStock>,
}

impl StockSummary {
  /// Apply a signed quantity change to one warehouse and the total.
  pub fn apply(&mut self, bodega_id: i64, delta: i64) {
    self.stock_total += delta;
    for stock in &mut self.stock_por_bodega {
      if stock.bodega_id == bodega_id {
        stock.cantidad += delta;
      }
    }
  }
}

/// One product's stock in one warehouse (`GET /inventario/stock/bodega/{id}`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLine {
  pub producto_id: i64,
  pub bodega_id:   i64,
  pub cantidad:    i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warehouse {
  pub id:               i64,
  pub nombre:           String,
  #[serde(default)]
  pub codigo:           Option<String>,
  #[serde(default)]
  pub descripcion:      Option<String>,
  #[serde(default)]
  pub ubicacion:        Option<String>,
  #[serde(default)]
  pub capacidad_maxima: Option<i64>,
  #[serde(default = "default_true")]
  pub activa:           bool,
  #[serde(default)]
  pub responsable_id:   Option<i64>,
}

/// Create or partial-update body; only the `Some` fields are sent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WarehouseInput {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub nombre:           Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub codigo:           Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub descripcion:      Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub ubicacion:        Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub capacidad_maxima: Option<i64>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub activa:           Option<bool>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub responsable_id:   Option<i64>,
}

/// A recorded stock movement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Movement {
  pub id:               i64,
  pub producto_id:      i64,
  #[serde(default)]
  pub bodega_id:        Option<i64>,
  pub tipo_movimiento:  String,
  pub cantidad:         i64,
  #[serde(default)]
  pub motivo:           Option<String>,
  #[serde(default)]
  pub usuario_id:       Option<i64>,
  #[serde(default)]
  pub fecha_movimiento: Option<DateTime<Utc>>,
}

/// Body of `POST /inventario/movimientos`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MovementCreate {
  pub producto_id:     i64,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub bodega_id:       Option<i64>,
  pub tipo_movimiento: String,
  pub cantidad:        i64,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub motivo:          Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub observaciones:   Option<String>,
}

/// Body of `POST /inventario/transferencia`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transfer {
  pub producto_id:       i64,
  pub bodega_origen_id:  i64,
  pub bodega_destino_id: i64,
  pub cantidad:          i64,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub observaciones:     Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CountedStock {
  pub producto_id:      i64,
  pub bodega_id:        i64,
  pub cantidad_contada: i64,
}

/// Body of `POST /inventario/inventario-fisico`: counted quantities that
/// the backend reconciles into adjustments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhysicalCount {
  pub items:         Vec<CountedStock>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub observaciones: Option<String>,
}

/// `GET /inventario/kardex/{producto_id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Kardex {
  pub producto:     Product,
  #[serde(default)]
  pub movimientos:  Vec<Movement>,
  pub stock_actual: i64,
}

/// Body of `POST /inventario/ajuste`. `cantidad` is signed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockAdjustment {
  pub producto_id: i64,
  pub bodega_id:   i64,
  pub cantidad:    i64,
  pub motivo:      String,
}

// ─── Chatbot ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
  pub message:         String,
  pub conversation_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatReply {
  pub response:        String,
  pub conversation_id: String,
  #[serde(default)]
  pub timestamp:       Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuickActions {
  #[serde(default)]
  pub quick_actions: Vec<crate::chat::QuickAction>,
}
