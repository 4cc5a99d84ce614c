//! # Server module
//!
//! The dispatch side of the crate: parsing inbound `may_minihttp` requests,
//! running them through the [`App`] pipeline (method tree selection, tree
//! lookup, pooled context, handler invocation, result encoding) and flushing
//! the buffered response back to the wire.

mod http_server;
pub(crate) mod request;
pub(crate) mod response;
mod service;

pub use http_server::ServerHandle;
pub use request::{parse_request, ParsedRequest};
pub use response::{status_reason, Outbound};
pub use service::{App, AppConfig, CorsHook, PanicObserver};
