//! HTTP client for the SVT inventory backend.
//!
//! [`AppContext`] is the entry point. It owns one of each of the stateful
//! pieces and wires them together:
//!
//! - [`Session`]: credential + identity, login/logout/restore.
//! - [`Gateway`]: permission-gated, bearer-authenticated requests.
//! - [`Interceptor`]: turns 401s into a one-shot session teardown.
//! - [`QueryCache`]: keyed results with staleness, de-duplication and
//!   optimistic updates.
//! - [`ChatSession`] and [`Assistant`]: the chat log and the bot that fills
//!   it.
//!
//! Typed resource services ([`resources`]) sit on top of the gateway and
//! the cache; [`Prefetcher`] warms them ahead of navigation.

pub mod cache;
pub mod chat;
pub mod config;
pub mod context;
pub mod credentials;
pub mod error;
pub mod gateway;
pub mod interceptor;
pub mod navigator;
pub mod prefetch;
pub mod resources;
pub mod session;
pub mod transport;

pub use cache::{QueryCache, QueryOptions, RetryPolicy};
pub use chat::{Assistant, ChatSession};
pub use config::ClientConfig;
pub use context::AppContext;
pub use error::{ApiError, AuthError, ChatError, Error, Result};
pub use gateway::{ApiRequest, Gateway};
pub use interceptor::Interceptor;
pub use navigator::Navigator;
pub use prefetch::{Prefetcher, Screen};
pub use session::{AuthPhase, Session};
