//! Core types and rules for the SVT inventory client.
//!
//! This crate is deliberately free of HTTP and database dependencies. It holds
//! the pure parts of the client: roles and capabilities, the endpoint access
//! table, query keys, chat messages, and the [`storage::Storage`] trait that
//! persistence backends implement.

pub mod chat;
pub mod endpoint;
pub mod error;
pub mod identity;
pub mod model;
pub mod permission;
pub mod query_key;
pub mod route;
pub mod storage;
pub mod validation;

pub use error::{Error, Result};
