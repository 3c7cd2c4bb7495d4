//! An in-process stand-in for the SVT backend, bound to an ephemeral port.
//!
//! Every request is recorded (method, path, `Authorization` header) so tests
//! can assert on what did and did not reach the network. Flags on
//! [`MockState`] switch individual endpoints into failure modes.

#![allow(dead_code)]

use std::{
  collections::HashMap,
  sync::{
    Arc, Mutex,
    atomic::{AtomicBool, Ordering},
  },
  time::Duration,
};

use axum::{
  Form, Json, Router,
  extract::{Path, Query, Request, State},
  http::{StatusCode, header::AUTHORIZATION},
  middleware::{self, Next},
  response::{IntoResponse, Response},
  routing::{get, patch, post},
};
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::Deserialize;
use serde_json::{Value, json};
use svt_client::{AppContext, ClientConfig};
use svt_store_sqlite::SqliteStore;

pub const ADMIN: (&str, &str) = ("admin@svt.cl", "admin123");
pub const USUARIO: (&str, &str) = ("ana@svt.cl", "ana123");
pub const INVITADO: (&str, &str) = ("visita@svt.cl", "visita123");

// ─── Tokens ──────────────────────────────────────────────────────────────────

/// An unsigned JWT carrying `claims`.
pub fn token(claims: Value) -> String {
  let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
  let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
  format!("{header}.{payload}.sig")
}

/// A token for `email` expiring `ttl_secs` from now (negative for the past).
pub fn token_for(email: &str, role: &str, ttl_secs: i64) -> String {
  let exp = chrono::Utc::now().timestamp() + ttl_secs;
  token(json!({"sub": email, "rol": role, "exp": exp}))
}

fn subject(token: &str) -> Option<String> {
  let payload = token.split('.').nth(1)?;
  let bytes = URL_SAFE_NO_PAD.decode(payload).ok()?;
  let claims: Value = serde_json::from_slice(&bytes).ok()?;
  claims.get("sub")?.as_str().map(str::to_string)
}

// ─── State ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hit {
  pub method:        String,
  pub path:          String,
  pub authorization: Option<String>,
}

struct Account {
  id:       i64,
  password: &'static str,
  role:     &'static str,
}

pub struct MockState {
  accounts:         HashMap<&'static str, Account>,
  pub hits:         Mutex<Vec<Hit>>,
  /// Display names set through `PUT /users/{id}`.
  names:            Mutex<HashMap<i64, String>>,
  /// `/users/me` answers 500.
  pub fail_me:      AtomicBool,
  /// Resource endpoints answer 401 after a short delay.
  pub reject_token: AtomicBool,
  /// `/inventario/ajuste` answers 500.
  pub fail_adjust:  AtomicBool,
}

impl MockState {
  fn new() -> Self {
    let accounts = HashMap::from([
      (ADMIN.0, Account { id: 1, password: ADMIN.1, role: "ADMIN" }),
      (USUARIO.0, Account { id: 2, password: USUARIO.1, role: "USUARIO" }),
      (INVITADO.0, Account { id: 3, password: INVITADO.1, role: "INVITADO" }),
    ]);
    Self {
      accounts,
      hits: Mutex::new(Vec::new()),
      names: Mutex::new(HashMap::new()),
      fail_me: AtomicBool::new(false),
      reject_token: AtomicBool::new(false),
      fail_adjust: AtomicBool::new(false),
    }
  }

  pub fn hits(&self) -> Vec<Hit> { self.hits.lock().unwrap().clone() }

  pub fn count(&self, method: &str, path: &str) -> usize {
    self
      .hits()
      .iter()
      .filter(|h| h.method == method && h.path == path)
      .count()
  }

  pub fn set(&self, flag: &AtomicBool, value: bool) { flag.store(value, Ordering::SeqCst); }

  fn user(&self, id: i64) -> Option<Value> {
    let (email, account) = self.accounts.iter().find(|(_, account)| account.id == id)?;
    let mut user = json!({"id": id, "email": email, "rol": account.role});
    if let Some(name) = self.names.lock().unwrap().get(&id) {
      user["nombre"] = json!(name);
    }
    Some(user)
  }
}

type Shared = Arc<MockState>;

// ─── Handlers ────────────────────────────────────────────────────────────────

async fn record(State(state): State<Shared>, request: Request, next: Next) -> Response {
  let authorization = request
    .headers()
    .get(AUTHORIZATION)
    .and_then(|v| v.to_str().ok())
    .map(str::to_string);
  state.hits.lock().unwrap().push(Hit {
    method: request.method().to_string(),
    path: request.uri().path().to_string(),
    authorization,
  });

  if state.reject_token.load(Ordering::SeqCst) && !request.uri().path().starts_with("/auth") {
    tokio::time::sleep(Duration::from_millis(50)).await;
    return (StatusCode::UNAUTHORIZED, Json(json!({"detail": "Could not validate credentials"})))
      .into_response();
  }

  next.run(request).await
}

#[derive(Deserialize)]
struct LoginForm {
  username:   String,
  password:   String,
  grant_type: String,
}

async fn login(State(state): State<Shared>, Form(form): Form<LoginForm>) -> Response {
  let account = state.accounts.get(form.username.as_str());
  match account {
    Some(account) if account.password == form.password && form.grant_type == "password" => {
      Json(json!({
        "access_token": token_for(&form.username, account.role, 3600),
        "token_type": "bearer",
      }))
      .into_response()
    }
    _ => (StatusCode::UNAUTHORIZED, Json(json!({"detail": "Incorrect email or password"})))
      .into_response(),
  }
}

#[derive(Deserialize)]
struct Register {
  email:    String,
  password: String,
}

async fn register(Json(body): Json<Register>) -> Response {
  if !body.email.contains('@') || body.password.len() < 6 {
    let mut issues = Vec::new();
    if !body.email.contains('@') {
      issues.push(json!({
        "loc": ["body", "email"],
        "msg": "value is not a valid email address",
        "type": "value_error",
      }));
    }
    if body.password.len() < 6 {
      issues.push(json!({
        "loc": ["body", "password"],
        "msg": "ensure this value has at least 6 characters",
        "type": "value_error",
      }));
    }
    return (StatusCode::UNPROCESSABLE_ENTITY, Json(json!({"detail": issues}))).into_response();
  }
  (StatusCode::CREATED, Json(json!({"id": 99, "email": body.email, "rol": "INVITADO"})))
    .into_response()
}

async fn me(State(state): State<Shared>, request: Request) -> Response {
  if state.fail_me.load(Ordering::SeqCst) {
    return StatusCode::INTERNAL_SERVER_ERROR.into_response();
  }
  let email = request
    .headers()
    .get(AUTHORIZATION)
    .and_then(|v| v.to_str().ok())
    .and_then(|v| v.strip_prefix("Bearer "))
    .and_then(subject);
  let Some(email) = email else {
    return StatusCode::UNAUTHORIZED.into_response();
  };
  match state.accounts.get(email.as_str()).and_then(|account| state.user(account.id)) {
    Some(user) => Json(user).into_response(),
    None => StatusCode::UNAUTHORIZED.into_response(),
  }
}

fn product(id: i64) -> Value {
  json!({
    "id": id,
    "sku": format!("SKU-{id:03}"),
    "nombre": format!("Producto {id}"),
    "precio_unitario": 1990.0,
    "stock_actual": 10,
    "stock_minimo": 2,
  })
}

async fn list_products() -> Json<Value> { Json(json!([product(1), product(2)])) }

async fn get_product(Path(id): Path<i64>) -> Json<Value> { Json(product(id)) }

async fn create_product(Json(body): Json<Value>) -> Response {
  let sku = body.get("sku").and_then(Value::as_str).unwrap_or_default();
  if sku.is_empty() {
    return (
      StatusCode::UNPROCESSABLE_ENTITY,
      Json(json!({"detail": [{"loc": ["body", "sku"], "msg": "field required", "type": "missing"}]})),
    )
      .into_response();
  }
  let mut created = body.clone();
  created["id"] = json!(3);
  created["stock_actual"] = body.get("stock_inicial").cloned().unwrap_or(json!(0));
  (StatusCode::CREATED, Json(created)).into_response()
}

// ─── Users ───────────────────────────────────────────────────────────────────

async fn create_user(Json(body): Json<Value>) -> Response {
  let user = json!({"id": 10, "email": body["email"], "rol": "INVITADO"});
  (StatusCode::CREATED, Json(user)).into_response()
}

async fn get_user(State(state): State<Shared>, Path(id): Path<i64>) -> Response {
  match state.user(id) {
    Some(user) => Json(user).into_response(),
    None => StatusCode::NOT_FOUND.into_response(),
  }
}

async fn update_user(
  State(state): State<Shared>,
  Path(id): Path<i64>,
  Json(body): Json<Value>,
) -> Response {
  if let Some(name) = body.get("nombre").and_then(Value::as_str) {
    state.names.lock().unwrap().insert(id, name.to_string());
  }
  match state.user(id) {
    Some(user) => Json(user).into_response(),
    None => StatusCode::NOT_FOUND.into_response(),
  }
}

async fn delete_user(Path(_id): Path<i64>) -> StatusCode { StatusCode::NO_CONTENT }

async fn set_user_active(Path((id, _action)): Path<(i64, String)>) -> Json<Value> {
  Json(json!({"message": format!("user {id} updated")}))
}

async fn user_stats() -> Json<Value> {
  Json(json!({
    "total_users": 3,
    "active_users": 3,
    "inactive_users": 0,
    "admin_users": 1,
    "regular_users": 1,
    "guest_users": 1,
  }))
}

// ─── Categories ──────────────────────────────────────────────────────────────

fn category(id: i64) -> Value {
  json!({"id": id, "nombre": format!("Categoría {id}"), "codigo": format!("CAT{id}"), "activa": id != 2})
}

async fn categories(Query(query): Query<HashMap<String, String>>) -> Json<Value> {
  match query.get("search") {
    Some(term) => Json(json!([{"id": 1, "nombre": format!("Ferretería {term}")}])),
    None => Json(json!([category(1), category(2)])),
  }
}

async fn active_categories() -> Json<Value> { Json(json!([category(1)])) }

async fn get_category(Path(id): Path<i64>) -> Json<Value> { Json(category(id)) }

async fn create_category(Json(mut body): Json<Value>) -> Response {
  body["id"] = json!(7);
  (StatusCode::CREATED, Json(body)).into_response()
}

async fn update_category(Path(id): Path<i64>, Json(mut body): Json<Value>) -> Json<Value> {
  body["id"] = json!(id);
  Json(body)
}

async fn delete_category(Path(_id): Path<i64>) -> StatusCode { StatusCode::NO_CONTENT }

async fn category_count(Path(id): Path<i64>) -> Json<Value> {
  Json(json!({"categoria_id": id, "productos_count": 12}))
}

// ─── Warehouses and movements ────────────────────────────────────────────────

fn warehouse(id: i64) -> Value {
  json!({"id": id, "nombre": format!("Bodega {id}"), "ubicacion": "Santiago", "activa": id != 3})
}

async fn warehouses(Query(query): Query<HashMap<String, String>>) -> Json<Value> {
  let only_active = query.get("solo_activas").is_some_and(|v| v == "true");
  let listed: Vec<Value> = (1..=3)
    .map(warehouse)
    .filter(|w| !only_active || w["activa"] == json!(true))
    .collect();
  Json(json!(listed))
}

async fn get_warehouse(Path(id): Path<i64>) -> Json<Value> { Json(warehouse(id)) }

async fn create_warehouse(Json(mut body): Json<Value>) -> Response {
  body["id"] = json!(4);
  (StatusCode::CREATED, Json(body)).into_response()
}

async fn update_warehouse(Path(id): Path<i64>, Json(changes): Json<Value>) -> Json<Value> {
  let mut updated = warehouse(id);
  if let (Some(target), Some(changes)) = (updated.as_object_mut(), changes.as_object()) {
    target.extend(changes.clone());
  }
  Json(updated)
}

async fn warehouse_stock(Path(id): Path<i64>) -> Json<Value> {
  Json(json!([
    {"producto_id": 1, "bodega_id": id, "cantidad": 6},
    {"producto_id": 2, "bodega_id": id, "cantidad": 0},
  ]))
}

fn movement(id: i64, producto_id: i64, tipo: &str, cantidad: i64) -> Value {
  json!({
    "id": id,
    "producto_id": producto_id,
    "bodega_id": 1,
    "tipo_movimiento": tipo,
    "cantidad": cantidad,
    "fecha_movimiento": "2026-01-01T12:00:00Z",
  })
}

async fn movements(Query(query): Query<HashMap<String, String>>) -> Json<Value> {
  let skip: i64 = query.get("skip").and_then(|v| v.parse().ok()).unwrap_or(0);
  Json(json!([movement(skip + 1, 1, "ENTRADA", 5)]))
}

async fn record_movement(Json(body): Json<Value>) -> Response {
  let created = movement(
    50,
    body["producto_id"].as_i64().unwrap_or_default(),
    body["tipo_movimiento"].as_str().unwrap_or_default(),
    body["cantidad"].as_i64().unwrap_or_default(),
  );
  (StatusCode::CREATED, Json(created)).into_response()
}

async fn transfer(Json(body): Json<Value>) -> Json<Value> {
  Json(json!({"message": "Transferencia realizada", "detalle": body}))
}

async fn physical_count(Json(body): Json<Value>) -> Json<Value> {
  let adjustments: Vec<Value> = body["items"]
    .as_array()
    .into_iter()
    .flatten()
    .enumerate()
    .map(|(i, item)| {
      let counted = item["cantidad_contada"].as_i64().unwrap_or_default();
      movement(60 + i as i64, item["producto_id"].as_i64().unwrap_or_default(), "AJUSTE", counted - 6)
    })
    .collect();
  Json(json!(adjustments))
}

async fn kardex(Path(id): Path<i64>) -> Json<Value> {
  Json(json!({
    "producto": product(id),
    "movimientos": [movement(1, id, "ENTRADA", 10), movement(2, id, "SALIDA", -4)],
    "stock_actual": 6,
  }))
}

async fn alerts() -> Json<Value> { Json(json!([{"producto_id": 2, "stock_actual": 0}])) }

// ─── Reports ─────────────────────────────────────────────────────────────────

async fn reports() -> StatusCode { StatusCode::INTERNAL_SERVER_ERROR }

/// Answers after longer than a one-second client timeout.
async fn slow_report() -> Json<Value> {
  tokio::time::sleep(Duration::from_millis(1500)).await;
  Json(json!({}))
}

async fn stock(Path(id): Path<i64>) -> Json<Value> {
  Json(json!({
    "producto_id": id,
    "stock_total": 10,
    "stock_por_bodega": [
      {"bodega_id": 1, "cantidad": 6},
      {"bodega_id": 2, "cantidad": 4},
    ],
  }))
}

async fn adjust(State(state): State<Shared>, Json(body): Json<Value>) -> Response {
  if state.fail_adjust.load(Ordering::SeqCst) {
    return (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"detail": "database unavailable"})))
      .into_response();
  }
  Json(json!({"id": 1, "tipo": "ajuste", "detalle": body})).into_response()
}

#[derive(Deserialize)]
struct ChatBody {
  message:         String,
  conversation_id: Option<String>,
}

async fn chat(Json(body): Json<ChatBody>) -> Json<Value> {
  Json(json!({
    "response": format!("Recibí: {}", body.message),
    "conversation_id": body.conversation_id.unwrap_or_else(|| "conv-1".into()),
    "timestamp": "2026-01-01T12:00:00Z",
  }))
}

async fn quick_actions() -> Json<Value> {
  Json(json!({"quick_actions": [
    {"action": "stock_bajo", "description": "Productos con stock bajo", "example_query": "¿Qué productos tienen stock bajo?", "icon": "alert"},
    {"action": "resumen", "description": "Resumen del inventario", "example_query": "Dame un resumen", "icon": "chart"},
  ]}))
}

async fn analytics() -> Json<Value> { Json(json!({"total_conversations": 4})) }

fn router(state: Shared) -> Router {
  Router::new()
    .route("/auth/login", post(login))
    .route("/auth/register", post(register))
    .route("/users/me", get(me))
    .route("/users", post(create_user))
    .route("/users/stats/overview", get(user_stats))
    .route("/users/{id}", get(get_user).put(update_user).delete(delete_user))
    .route("/users/{id}/{action}", patch(set_user_active))
    .route("/productos", get(list_products).post(create_product))
    .route("/productos/{id}", get(get_product))
    .route("/categorias", get(categories).post(create_category))
    .route("/categorias/activas", get(active_categories))
    .route("/categorias/{id}", get(get_category).put(update_category).delete(delete_category))
    .route("/categorias/{id}/productos/count", get(category_count))
    .route("/reportes", get(reports))
    .route("/reportes/lento", get(slow_report))
    .route("/inventario/bodegas", get(warehouses).post(create_warehouse))
    .route("/inventario/bodegas/{id}", get(get_warehouse).put(update_warehouse))
    .route("/inventario/stock/producto/{id}", get(stock))
    .route("/inventario/stock/bodega/{id}", get(warehouse_stock))
    .route("/inventario/stock/alertas", get(alerts))
    .route("/inventario/movimientos", get(movements).post(record_movement))
    .route("/inventario/transferencia", post(transfer))
    .route("/inventario/inventario-fisico", post(physical_count))
    .route("/inventario/kardex/{id}", get(kardex))
    .route("/inventario/ajuste", post(adjust))
    .route("/chatbot/chat", post(chat))
    .route("/chatbot/quick-actions", get(quick_actions))
    .route("/chatbot/analytics", get(analytics))
    .layer(middleware::from_fn_with_state(state.clone(), record))
    .with_state(state)
}

// ─── Harness ─────────────────────────────────────────────────────────────────

pub struct MockBackend {
  pub base_url: String,
  pub state:    Shared,
}

impl MockBackend {
  pub async fn spawn() -> Self {
    let state = Arc::new(MockState::new());
    let app = router(state.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
    Self { base_url: format!("http://{address}"), state }
  }

  pub fn config(&self) -> ClientConfig { ClientConfig::with_base_url(&self.base_url) }

  /// A fresh client built from `config` instead of [`config`](Self::config).
  pub async fn client_with_config(&self, config: ClientConfig) -> AppContext<SqliteStore> {
    let store = SqliteStore::open_in_memory().await.unwrap();
    AppContext::init(config, store).await.unwrap()
  }

  /// A fresh client with its own in-memory storage.
  pub async fn client(&self) -> AppContext<SqliteStore> {
    self.client_with(SqliteStore::open_in_memory().await.unwrap()).await
  }

  /// A client over `store`; clones of one store share the same database.
  pub async fn client_with(&self, store: SqliteStore) -> AppContext<SqliteStore> {
    AppContext::init(self.config(), store).await.unwrap()
  }
}
