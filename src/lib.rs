//! # ramhorn
//!
//! A lightweight HTTP request router built on a compressed radix tree, running
//! on the [`may`] coroutine runtime via [`may_minihttp`].
//!
//! Routes are registered per HTTP method as path patterns with three segment
//! kinds:
//!
//! - static segments (`/users`) match literally,
//! - named parameters (`/users/:id`) match exactly one segment,
//! - a trailing catch-all (`/files/*path`) swallows the rest of the path.
//!
//! Patterns are checked for ambiguity at registration time: a wildcard and a
//! static segment can never compete for the same position, so every request
//! matches at most one route.
//!
//! ## Example
//!
//! ```rust,no_run
//! use ramhorn::{App, Reply};
//!
//! let app = App::new();
//! app.get("/users/:id", |ctx| {
//!     let id = ctx.param("id").to_string();
//!     Reply::value(serde_json::json!({ "id": id }))
//! })
//! .unwrap();
//!
//! app.serve("0.0.0.0:8080").unwrap().join().unwrap();
//! ```
//!
//! Handlers receive a pooled [`Context`] carrying the parsed request, captured
//! path parameters and the response buffer, and return a [`Reply`] (a value
//! encoded through content negotiation, an empty `204` body, or a callback
//! that writes the response itself) or an [`Error`] from the fixed taxonomy,
//! which the dispatcher maps to a status code and an encoded message.

pub mod coerce;
pub mod context;
pub mod error;
pub mod form;
pub mod params;
pub mod path;
pub(crate) mod pool;
pub mod router;
pub mod server;
pub mod static_files;

pub use context::Context;
pub use error::{Error, HandlerResult, Reply, ResponseCallback, RouteError};
pub use params::Params;
pub use router::Router;
pub use server::{App, AppConfig, Outbound, ParsedRequest, ServerHandle};

use std::sync::Arc;

/// A route handler: borrows the request context, returns the reply or an error.
///
/// Handlers run to completion on the serving coroutine; long blocking work
/// should be avoided. Panics are caught by the dispatcher and turned into
/// `500` responses.
pub type Handler = Arc<dyn Fn(&mut Context) -> HandlerResult + Send + Sync>;
