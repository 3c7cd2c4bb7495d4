mod common;

use common::{ADMIN, INVITADO, MockBackend, USUARIO};
use svt_client::{ApiError, ApiRequest, AuthPhase};
use svt_core::{
  endpoint::Method,
  model::ProductCreate,
  permission::Capability,
  query_key::{Filters, keys},
};

#[tokio::test]
async fn usuario_cannot_delete_users() {
  let backend = MockBackend::spawn().await;
  let client = backend.client().await;
  client.session.login(USUARIO.0, USUARIO.1).await.unwrap();

  assert!(!client.gateway.can_make_request("/users", Method::Delete));
  let err = client.users().delete(3).await.unwrap_err();
  assert!(matches!(
    err,
    ApiError::PermissionDenied { method: Method::Delete, capability: Some(Capability::DeleteUsers), .. }
  ));
  assert_eq!(backend.state.count("DELETE", "/users/3"), 0);
}

#[tokio::test]
async fn admin_can_delete_users() {
  let backend = MockBackend::spawn().await;
  let client = backend.client().await;
  client.session.login(ADMIN.0, ADMIN.1).await.unwrap();

  client.users().delete(3).await.unwrap();
  let hits = backend.state.hits();
  let delete = hits.iter().find(|hit| hit.method == "DELETE").unwrap();
  assert_eq!(delete.path, "/users/3");
  assert!(delete.authorization.as_deref().unwrap().starts_with("Bearer "));
}

#[tokio::test]
async fn signed_out_requests_never_leave_the_client() {
  let backend = MockBackend::spawn().await;
  let client = backend.client().await;

  let err = client
    .gateway
    .send(ApiRequest::get("/productos"))
    .await
    .unwrap_err();
  assert!(matches!(err, ApiError::PermissionDenied { .. }));

  let err = client
    .gateway
    .send(ApiRequest::get("/categorias"))
    .await
    .unwrap_err();
  assert!(matches!(err, ApiError::PermissionDenied { capability: None, .. }));
  assert!(backend.state.hits().is_empty());
}

#[tokio::test]
async fn unmapped_routes_are_allowed_for_any_role() {
  let backend = MockBackend::spawn().await;
  let client = backend.client().await;
  client.session.login(INVITADO.0, INVITADO.1).await.unwrap();

  let categories = client.categories().list(&Filters::new()).await.unwrap();
  assert_eq!(categories[0].nombre, "Categoría 1");
  assert_eq!(backend.state.count("GET", "/categorias"), 1);
}

#[tokio::test]
async fn invitado_cannot_create_products() {
  let backend = MockBackend::spawn().await;
  let client = backend.client().await;
  client.session.login(INVITADO.0, INVITADO.1).await.unwrap();

  let product = ProductCreate {
    sku:             "SKU-100".into(),
    nombre:          "Martillo".into(),
    descripcion:     None,
    categoria:       None,
    precio_unitario: 4990.0,
    proveedor_id:    None,
    stock_minimo:    1,
    stock_inicial:   5,
  };
  let err = client.products().create(&product).await.unwrap_err();
  assert!(matches!(
    err,
    ApiError::PermissionDenied { capability: Some(Capability::CreateProducts), .. }
  ));
  assert_eq!(backend.state.count("POST", "/productos"), 0);
}

#[tokio::test]
async fn validation_errors_keep_the_session() {
  let backend = MockBackend::spawn().await;
  let client = backend.client().await;
  client.session.login(USUARIO.0, USUARIO.1).await.unwrap();

  let product = ProductCreate {
    sku:             String::new(),
    nombre:          "Martillo".into(),
    descripcion:     None,
    categoria:       None,
    precio_unitario: 4990.0,
    proveedor_id:    None,
    stock_minimo:    1,
    stock_inicial:   5,
  };
  let err = client.products().create(&product).await.unwrap_err();
  let ApiError::Validation(errors) = err else {
    panic!("expected validation errors, got {err:?}");
  };
  assert_eq!(errors.field("sku"), Some(&["field required".to_string()][..]));
  assert_eq!(client.session.phase(), AuthPhase::Authenticated);
  assert!(client.session.identity().is_some());
}

#[tokio::test]
async fn server_errors_surface_as_network_errors() {
  let backend = MockBackend::spawn().await;
  let client = backend.client().await;
  client.session.login(ADMIN.0, ADMIN.1).await.unwrap();

  let err = client
    .gateway
    .send(ApiRequest::get("/reportes"))
    .await
    .unwrap_err();
  assert!(matches!(err, ApiError::Network { status: Some(500), .. }));
  assert!(err.is_retryable());
  assert_eq!(client.session.phase(), AuthPhase::Authenticated);
}

#[tokio::test]
async fn created_products_refresh_lists() {
  let backend = MockBackend::spawn().await;
  let client = backend.client().await;
  client.session.login(ADMIN.0, ADMIN.1).await.unwrap();
  let products = client.products();

  let listed = products.list(&Filters::new()).await.unwrap();
  assert_eq!(listed.len(), 2);
  products.list(&Filters::new()).await.unwrap();
  assert_eq!(backend.state.count("GET", "/productos"), 1);

  let product = ProductCreate {
    sku:             "SKU-100".into(),
    nombre:          "Martillo".into(),
    descripcion:     None,
    categoria:       None,
    precio_unitario: 4990.0,
    proveedor_id:    None,
    stock_minimo:    1,
    stock_inicial:   5,
  };
  let created = products.create(&product).await.unwrap();
  assert_eq!(created.id, 3);
  assert_eq!(created.stock_actual, 5);
  assert_eq!(
    client.cache.is_stale(&keys::productos::list(&Filters::new())),
    Some(true)
  );

  products.list(&Filters::new()).await.unwrap();
  assert_eq!(backend.state.count("GET", "/productos"), 2);
}

#[tokio::test]
async fn filters_are_sent_as_query_parameters() {
  let backend = MockBackend::spawn().await;
  let client = backend.client().await;
  client.session.login(USUARIO.0, USUARIO.1).await.unwrap();

  let filters = Filters::new().set("categoria", "ferreteria");
  client.products().list(&filters).await.unwrap();
  client.products().list(&Filters::new()).await.unwrap();

  // distinct filters, distinct cache entries
  assert_eq!(backend.state.count("GET", "/productos"), 2);
  assert!(client.cache.get(&keys::productos::list(&filters)).is_some());
}

#[tokio::test]
async fn timed_out_requests_are_retryable_network_errors() {
  let backend = MockBackend::spawn().await;
  let mut config = backend.config();
  config.timeout_secs = 1;
  let client = backend.client_with_config(config).await;
  client.session.login(ADMIN.0, ADMIN.1).await.unwrap();

  let err = client
    .gateway
    .send(ApiRequest::get("/reportes/lento"))
    .await
    .unwrap_err();
  assert!(
    matches!(err, ApiError::Network { status: None, ref message } if message == "request timed out"),
    "got {err:?}"
  );
  assert!(err.is_retryable());
  // the session survives a timeout
  assert!(client.session.identity().is_some());
}
