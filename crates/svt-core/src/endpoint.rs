//! Endpoint access table.
//!
//! Maps `(path, method)` pairs to the [`Access`] they require. Paths are
//! classified by their first segment, so `/productos/12` and `/productos/`
//! both resolve through the `/productos` rows.
//!
//! | Resource       | GET             | POST              | PUT               | DELETE            |
//! |----------------|-----------------|-------------------|-------------------|-------------------|
//! | `/users`       | ViewUsers       | CreateUsers       | EditUsers         | DeleteUsers       |
//! | `/productos`   | ViewProducts    | CreateProducts    | EditProducts      | DeleteProducts    |
//! | `/inventario`  | ViewInventory   | CreateInventory   | UpdateInventory   | DeleteInventory   |
//! | `/proveedores` | ViewSuppliers   | CreateSuppliers   | EditSuppliers     | DeleteSuppliers   |
//! | `/reportes`    | ViewReports     |                   |                   |                   |
//! | `/chatbot`     |                 | UseChat           |                   |                   |
//!
//! `/auth/*` is public and `/users/me` only needs a session. Anything not in
//! the table is [`UNMAPPED`].

use serde::{Deserialize, Serialize};

use crate::{
  Error, Result,
  identity::Identity,
  permission::{Capability, evaluate},
};

// ─── Method ──────────────────────────────────────────────────────────────────

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
  strum::AsRefStr,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum Method {
  Get,
  Post,
  Put,
  Patch,
  Delete,
}

impl Method {
  pub fn parse(s: &str) -> Result<Self> {
    s.parse().map_err(|_| Error::UnknownMethod(s.to_string()))
  }
}

// ─── Access ──────────────────────────────────────────────────────────────────

/// What a request needs before the gateway lets it leave the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
  /// No identity required and no credential attached (login, register).
  Public,
  /// Any authenticated identity.
  Session,
  /// The identity must hold this capability.
  Requires(Capability),
  /// Not classified; allowed for any authenticated identity.
  Unrestricted,
}

/// Access applied to `(path, method)` pairs missing from [`ENDPOINTS`].
///
/// Unclassified routes fail open. The backend still enforces its own checks.
pub const UNMAPPED: Access = Access::Unrestricted;

/// Paths that bypass the capability table entirely.
const PUBLIC_PREFIX: &str = "/auth";
const SESSION_PATHS: &[&str] = &["/users/me"];

/// The capability table, keyed by resource root and method.
pub const ENDPOINTS: &[(&str, Method, Capability)] = &[
  ("/users", Method::Get, Capability::ViewUsers),
  ("/users", Method::Post, Capability::CreateUsers),
  ("/users", Method::Put, Capability::EditUsers),
  ("/users", Method::Delete, Capability::DeleteUsers),
  ("/productos", Method::Get, Capability::ViewProducts),
  ("/productos", Method::Post, Capability::CreateProducts),
  ("/productos", Method::Put, Capability::EditProducts),
  ("/productos", Method::Delete, Capability::DeleteProducts),
  ("/inventario", Method::Get, Capability::ViewInventory),
  ("/inventario", Method::Post, Capability::CreateInventory),
  ("/inventario", Method::Put, Capability::UpdateInventory),
  ("/inventario", Method::Delete, Capability::DeleteInventory),
  ("/proveedores", Method::Get, Capability::ViewSuppliers),
  ("/proveedores", Method::Post, Capability::CreateSuppliers),
  ("/proveedores", Method::Put, Capability::EditSuppliers),
  ("/proveedores", Method::Delete, Capability::DeleteSuppliers),
  ("/reportes", Method::Get, Capability::ViewReports),
  ("/chatbot", Method::Post, Capability::UseChat),
];

// ─── Resolution ──────────────────────────────────────────────────────────────

/// Strip the query string and trailing slashes: `/productos/?q=x` →
/// `/productos`.
pub fn normalize_path(path: &str) -> &str {
  let path = path.split(['?', '#']).next().unwrap_or_default();
  let trimmed = path.trim_end_matches('/');
  if trimmed.is_empty() { "/" } else { trimmed }
}

/// The first segment of a normalised path, with its leading slash.
fn resource_root(path: &str) -> &str {
  let start = usize::from(path.starts_with('/'));
  match path[start..].find('/') {
    Some(end) => &path[..start + end],
    None => path,
  }
}

/// Resolve what a request needs.
pub fn required_access(path: &str, method: Method) -> Access {
  let path = normalize_path(path);
  let root = resource_root(path);

  if root == PUBLIC_PREFIX {
    return Access::Public;
  }
  if SESSION_PATHS.contains(&path) {
    return Access::Session;
  }

  ENDPOINTS
    .iter()
    .find(|(resource, m, _)| *resource == root && *m == method)
    .map_or(UNMAPPED, |(_, _, capability)| Access::Requires(*capability))
}

/// Whether `identity` may issue `method path`.
///
/// Without an identity only public endpoints are allowed.
pub fn can_make_request(identity: Option<&Identity>, path: &str, method: Method) -> bool {
  match required_access(path, method) {
    Access::Public => true,
    Access::Session | Access::Unrestricted => identity.is_some(),
    Access::Requires(capability) => evaluate(identity).contains(capability),
  }
}
