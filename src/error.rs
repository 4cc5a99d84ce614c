//! Error taxonomies and handler result types.
//!
//! Two distinct families:
//!
//! - [`RouteError`] covers route registration. These indicate programming
//!   errors (bad pattern, ambiguous wildcard, duplicate route) and are meant
//!   to be surfaced at startup.
//! - [`Error`] covers request processing. Each kind maps to a fixed HTTP
//!   status; the dispatcher encodes the error text through the same content
//!   negotiation as successful responses.

use serde::Serialize;
use thiserror::Error;

use crate::context::Context;

/// Closure that writes the full response in place of the default body path.
///
/// Used by [`Reply::Callback`] for file serving and similar host-driven
/// bodies: the dispatcher hands the closure the context and performs no
/// encoding of its own.
pub type ResponseCallback = Box<dyn FnOnce(&mut Context) -> Result<(), Error> + Send>;

/// What a handler produced on success.
pub enum Reply {
    /// No body; the dispatcher answers `204 No Content`.
    None,
    /// A value to encode through the negotiated response encoder.
    /// `POST` requests answer `201 Created`, everything else `200 OK`.
    Value(serde_json::Value),
    /// The handler delegates the response write to the closure.
    Callback(ResponseCallback),
}

impl Reply {
    /// Serialize `val` and wrap it as [`Reply::Value`].
    pub fn value<T: Serialize>(val: T) -> HandlerResult {
        let val = serde_json::to_value(val).map_err(|e| Error::Unexpected(e.to_string()))?;
        Ok(Reply::Value(val))
    }

    /// Wrap a response-writing closure as [`Reply::Callback`].
    pub fn callback<F>(f: F) -> HandlerResult
    where
        F: FnOnce(&mut Context) -> Result<(), Error> + Send + 'static,
    {
        Ok(Reply::Callback(Box::new(f)))
    }
}

impl std::fmt::Debug for Reply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Reply::None => write!(f, "None"),
            Reply::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Reply::Callback(_) => write!(f, "Callback(..)"),
        }
    }
}

/// Result type returned by every handler.
pub type HandlerResult = Result<Reply, Error>;

/// Request-processing errors, each mapped to an HTTP status.
///
/// The redirect kinds carry the target URL; the dispatcher writes it into the
/// `Location` header. [`Error::BadRequest`] is the default kind for invalid
/// input when nothing more specific applies.
#[derive(Debug, Error)]
pub enum Error {
    /// Missing or invalid credentials.
    #[error("unauthorized")]
    Unauthorized,
    /// Authenticated but not permitted.
    #[error("forbidden")]
    Forbidden,
    /// Resource absent (distinct from a routing 404).
    #[error("not found")]
    NotFound,
    #[error("moved permanently")]
    MovedPermanently(String),
    #[error("found")]
    Found(String),
    #[error("temporary redirect")]
    TemporaryRedirect(String),
    #[error("permanent redirect")]
    PermanentRedirect(String),
    /// Invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),
    /// Feature not wired up (e.g. a missing binary codec hook).
    #[error("not implemented")]
    NotImplemented,
    /// Unsupported media type.
    #[error("content-type not supported")]
    ContentType,
    /// Cross-origin request refused.
    #[error("cross-origin request refused")]
    CorsBlocked,
    /// Catch-all for everything else.
    #[error("unexpected: {0}")]
    Unexpected(String),
}

impl Error {
    /// The HTTP status this error kind maps to.
    pub fn status(&self) -> u16 {
        match self {
            Error::Unauthorized => 401,
            Error::Forbidden | Error::CorsBlocked => 403,
            Error::NotFound => 404,
            Error::MovedPermanently(_) => 301,
            Error::Found(_) => 302,
            Error::TemporaryRedirect(_) => 307,
            Error::PermanentRedirect(_) => 308,
            Error::BadRequest(_) => 400,
            Error::NotImplemented => 501,
            Error::ContentType => 415,
            Error::Unexpected(_) => 500,
        }
    }

    /// Redirect target, for the kinds that carry one.
    pub fn location(&self) -> Option<&str> {
        match self {
            Error::MovedPermanently(url)
            | Error::Found(url)
            | Error::TemporaryRedirect(url)
            | Error::PermanentRedirect(url) => Some(url),
            _ => None,
        }
    }

    /// Message encoded on the wire as the response body.
    pub fn message(&self) -> String {
        self.to_string()
    }
}

/// Route registration errors. Fatal at registration time.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RouteError {
    #[error("http method must not be empty")]
    EmptyMethod,
    #[error("invalid route pattern: {0}")]
    BadPattern(String),
    #[error("a handler is already registered for path '{0}'")]
    DuplicateRoute(String),
    #[error("wildcard segment '{segment}' in new path '{pattern}' conflicts with existing prefix '{prefix}'")]
    WildcardConflict {
        segment: String,
        pattern: String,
        prefix: String,
    },
}
