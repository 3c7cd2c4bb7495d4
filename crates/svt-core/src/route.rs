//! Navigation gate.
//!
//! Decides, from the path alone and whether a token cookie is present,
//! whether a screen may be shown. This runs before any identity is resolved,
//! so it only knows "token or no token".

use serde::Serialize;

pub const LOGIN_ROUTE: &str = "/login";
pub const REGISTER_ROUTE: &str = "/register";
pub const HOME_ROUTE: &str = "/";

/// Screens that need a session.
const PROTECTED_PREFIXES: &[&str] = &["/dashboard", "/profile", "/admin"];
/// Screens that only make sense without a session.
const AUTH_ROUTES: &[&str] = &[LOGIN_ROUTE, REGISTER_ROUTE];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum RouteDecision {
  Allow,
  /// Send the user to the login screen, remembering where they were going.
  RedirectToLogin { return_url: String },
  /// Already signed in; leave the auth screens.
  RedirectHome,
}

pub fn guard(path: &str, has_token: bool) -> RouteDecision {
  let protected = PROTECTED_PREFIXES.iter().any(|prefix| path.starts_with(prefix));
  if protected && !has_token {
    return RouteDecision::RedirectToLogin { return_url: path.to_string() };
  }

  if has_token && AUTH_ROUTES.contains(&path) {
    return RouteDecision::RedirectHome;
  }

  RouteDecision::Allow
}
