//! Hierarchical cache keys.
//!
//! A [`QueryKey`] is an ordered tuple of strings. Keys form a hierarchy by
//! prefix: invalidating `["productos"]` touches every products list, detail
//! and search entry. The [`keys`] module holds the factories the resource
//! services use so that writers and readers agree on the layout.

use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QueryKey(Vec<String>);

impl QueryKey {
  pub fn new<I, S>(parts: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    Self(parts.into_iter().map(Into::into).collect())
  }

  /// A copy of this key with one more segment.
  pub fn with(&self, part: impl fmt::Display) -> Self {
    let mut parts = self.0.clone();
    parts.push(part.to_string());
    Self(parts)
  }

  /// Whether `prefix` is this key or one of its ancestors.
  pub fn starts_with(&self, prefix: &QueryKey) -> bool { self.0.starts_with(&prefix.0) }

  pub fn parts(&self) -> &[String] { &self.0 }

  pub fn len(&self) -> usize { self.0.len() }

  pub fn is_empty(&self) -> bool { self.0.is_empty() }
}

impl<const N: usize> From<[&str; N]> for QueryKey {
  fn from(parts: [&str; N]) -> Self { Self::new(parts) }
}

impl fmt::Display for QueryKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "[{}]", self.0.join(", "))
  }
}

/// Query-string style filters, rendered in a stable order so that equal
/// filters always produce equal keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filters(BTreeMap<String, String>);

impl Filters {
  pub fn new() -> Self { Self::default() }

  /// Add a filter; empty values are skipped, as they would be in a URL.
  pub fn set(mut self, key: impl Into<String>, value: impl fmt::Display) -> Self {
    let value = value.to_string();
    if !value.is_empty() {
      self.0.insert(key.into(), value);
    }
    self
  }

  pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
    self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
  }

  pub fn is_empty(&self) -> bool { self.0.is_empty() }
}

impl fmt::Display for Filters {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for (i, (k, v)) in self.0.iter().enumerate() {
      if i > 0 {
        f.write_str("&")?;
      }
      write!(f, "{k}={v}")?;
    }
    Ok(())
  }
}

// ─── Key factories ───────────────────────────────────────────────────────────

pub mod keys {
  use super::{Filters, QueryKey};

  macro_rules! resource_keys {
    ($module:ident, $root:literal) => {
      pub mod $module {
        use super::{Filters, QueryKey};

        pub fn all() -> QueryKey { QueryKey::from([$root]) }

        pub fn lists() -> QueryKey { all().with("list") }

        pub fn list(filters: &Filters) -> QueryKey { lists().with(filters) }

        pub fn details() -> QueryKey { all().with("detail") }

        pub fn detail(id: i64) -> QueryKey { details().with(id) }

        pub fn search(query: &str) -> QueryKey { all().with("search").with(query) }
      }
    };
  }

  resource_keys!(productos, "productos");
  resource_keys!(proveedores, "proveedores");
  resource_keys!(users, "users");
  resource_keys!(categorias, "categorias");
  resource_keys!(bodegas, "bodegas");

  /// Categories flagged active, for product forms.
  pub fn categorias_activas() -> QueryKey { categorias::lists().with("activas") }

  pub fn users_stats() -> QueryKey { users::all().with("stats") }

  pub mod inventario {
    use super::{Filters, QueryKey};

    pub fn all() -> QueryKey { QueryKey::from(["inventario"]) }

    pub fn stock() -> QueryKey { all().with("stock") }

    pub fn stock_producto(producto_id: i64) -> QueryKey {
      stock().with("producto").with(producto_id)
    }

    pub fn stock_bodega(bodega_id: i64) -> QueryKey { stock().with("bodega").with(bodega_id) }

    pub fn alertas() -> QueryKey { all().with("alertas") }

    pub fn movimientos(filters: &Filters) -> QueryKey { all().with("movimientos").with(filters) }

    pub fn kardex(producto_id: i64, filters: &Filters) -> QueryKey {
      all().with("kardex").with(producto_id).with(filters)
    }
  }

  pub mod reportes {
    use super::{Filters, QueryKey};

    pub fn all() -> QueryKey { QueryKey::from(["reportes"]) }

    pub fn report(filters: &Filters) -> QueryKey { all().with(filters) }
  }

  pub mod auth {
    use super::QueryKey;

    pub fn all() -> QueryKey { QueryKey::from(["auth"]) }

    pub fn profile() -> QueryKey { all().with("profile") }
  }

  pub mod chatbot {
    use super::QueryKey;

    pub fn quick_actions() -> QueryKey { QueryKey::from(["chatbot", "quick-actions"]) }
  }

  /// Prefixes whose data depends on who is signed in; refreshed after a
  /// login.
  pub fn user_scoped() -> Vec<QueryKey> {
    vec![
      auth::profile(),
      users::all(),
      productos::all(),
      inventario::all(),
      proveedores::all(),
      bodegas::all(),
      categorias::all(),
    ]
  }
}
