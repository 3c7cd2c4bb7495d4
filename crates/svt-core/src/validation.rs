//! Parsing of validation-failure bodies (HTTP 422).
//!
//! The backend reports `detail` either as a plain string or as a list of
//! `{loc, msg, type}` issues. In the list form `loc[1]` names the offending
//! field (`loc[0]` is the request part, e.g. `"body"`).

use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Detail {
  Message(String),
  Issues(Vec<Issue>),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Issue {
  #[serde(default)]
  pub loc:  Vec<Value>,
  pub msg:  String,
  #[serde(rename = "type", default)]
  pub kind: Option<String>,
}

impl Issue {
  /// The field this issue refers to, if `loc` has a second element.
  pub fn field(&self) -> Option<String> {
    match self.loc.get(1)? {
      Value::String(s) => Some(s.clone()),
      Value::Number(n) => Some(n.to_string()),
      _ => None,
    }
  }
}

/// Field-level and form-level messages extracted from a 422 body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationErrors {
  /// Messages not tied to a field.
  pub form:   Vec<String>,
  pub fields: BTreeMap<String, Vec<String>>,
}

impl ValidationErrors {
  pub fn from_detail(detail: Detail) -> Self {
    let mut errors = Self::default();
    match detail {
      Detail::Message(msg) => errors.form.push(msg),
      Detail::Issues(issues) => {
        for issue in issues {
          match issue.field() {
            Some(field) => errors.fields.entry(field).or_default().push(issue.msg),
            None => errors.form.push(issue.msg),
          }
        }
      }
    }
    errors
  }

  /// Parse a response body. Bodies without a usable `detail` yield an empty
  /// set.
  pub fn from_body(body: &[u8]) -> Self {
    #[derive(Deserialize)]
    struct Body {
      detail: Detail,
    }

    serde_json::from_slice::<Body>(body)
      .map(|b| Self::from_detail(b.detail))
      .unwrap_or_default()
  }

  pub fn field(&self, name: &str) -> Option<&[String]> {
    self.fields.get(name).map(Vec::as_slice)
  }

  pub fn is_empty(&self) -> bool { self.form.is_empty() && self.fields.is_empty() }
}

impl fmt::Display for ValidationErrors {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let mut parts: Vec<String> = self.form.clone();
    for (field, messages) in &self.fields {
      for msg in messages {
        parts.push(format!("{field}: {msg}"));
      }
    }
    if parts.is_empty() {
      f.write_str("invalid request")
    } else {
      f.write_str(&parts.join("; "))
    }
  }
}

/// The human-readable `detail` of an error body, whatever its shape.
pub fn detail_message(body: &[u8]) -> Option<String> {
  let value: Value = serde_json::from_slice(body).ok()?;
  match value.get("detail")? {
    Value::String(s) => Some(s.clone()),
    Value::Array(items) => items
      .first()
      .and_then(|item| item.get("msg"))
      .and_then(Value::as_str)
      .map(str::to_string),
    _ => None,
  }
}
