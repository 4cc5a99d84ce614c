//! Buffered response and the write-out to `may_minihttp`.
//!
//! Handlers and the dispatcher assemble the response in an [`Outbound`]
//! buffer; it is flushed to the wire once, after the handler and its pooled
//! context are done.

use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::OnceLock;

use may_minihttp::Response;
use serde_json::Value;
use tracing::warn;

/// Number of header slots in the wire response.
const MAX_WIRE_HEADERS: usize = 16;

/// Hard cap on distinct dynamic header lines interned for the lifetime of
/// the process. Lines past the cap are dropped, never leaked.
const HEADER_CACHE_CAP: usize = 4096;

/// Response under construction: status, headers and body bytes.
#[derive(Debug, Default)]
pub struct Outbound {
    /// HTTP status; `0` means "not set yet" and flushes as `200`.
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Outbound {
    pub fn with_status(status: u16) -> Self {
        Self {
            status,
            ..Self::default()
        }
    }

    /// Set a header, replacing any previous value (name compared
    /// case-insensitively).
    pub fn set_header(&mut self, name: &str, value: &str) {
        if let Some(entry) = self
            .headers
            .iter_mut()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
        {
            entry.1 = value.to_string();
        } else {
            self.headers.push((name.to_string(), value.to_string()));
        }
    }

    /// Set a header only when absent.
    pub fn set_header_if_unset(&mut self, name: &str, value: &str) {
        if self.header(name).is_none() {
            self.headers.push((name.to_string(), value.to_string()));
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Flush status, headers and body into the wire response.
    ///
    /// `may_minihttp` holds response headers as `&'static str` lines in
    /// [`MAX_WIRE_HEADERS`] slots. Status-critical headers (`Content-Type`,
    /// `Location`, `Allow`) go first so the slot limit can never drop them
    /// in favor of auxiliary ones; dynamic lines are interned through a
    /// bounded leak-once cache. Every dropped header is logged.
    pub fn apply(self, res: &mut Response) {
        let status = if self.status == 0 { 200 } else { self.status };
        res.status_code(status as usize, status_reason(status));
        for line in wire_header_lines(self.headers) {
            res.header(line);
        }
        res.body_vec(self.body);
    }
}

/// Order headers for the wire (status-critical names first, insertion order
/// within each class), intern each line and enforce the slot limit.
fn wire_header_lines(mut headers: Vec<(String, String)>) -> Vec<&'static str> {
    headers.sort_by_key(|(name, _)| !is_critical(name));

    let mut lines = Vec::with_capacity(headers.len().min(MAX_WIRE_HEADERS));
    for (name, value) in &headers {
        if lines.len() == MAX_WIRE_HEADERS {
            warn!(header = %name, "response header slots exhausted, dropping header");
            continue;
        }
        match intern_header(&format!("{name}: {value}")) {
            Some(line) => lines.push(line),
            None => warn!(header = %name, "header line cache full, dropping header"),
        }
    }
    lines
}

/// Headers the response cannot function without.
fn is_critical(name: &str) -> bool {
    name.eq_ignore_ascii_case("content-type")
        || name.eq_ignore_ascii_case("location")
        || name.eq_ignore_ascii_case("allow")
}

/// Fixed lines used by the content negotiation and file serving tables.
/// These resolve without touching the cache.
fn static_header_line(line: &str) -> Option<&'static str> {
    Some(match line {
        "Content-Type: application/json" => "Content-Type: application/json",
        "Content-Type: application/xml" => "Content-Type: application/xml",
        "Content-Type: application/x-bincode" => "Content-Type: application/x-bincode",
        "Content-Type: application/octet-stream" => "Content-Type: application/octet-stream",
        "Content-Type: application/javascript" => "Content-Type: application/javascript",
        "Content-Type: text/html" => "Content-Type: text/html",
        "Content-Type: text/css" => "Content-Type: text/css",
        "Content-Type: text/plain" => "Content-Type: text/plain",
        "Content-Type: image/svg+xml" => "Content-Type: image/svg+xml",
        "Content-Type: image/png" => "Content-Type: image/png",
        "Content-Type: image/x-icon" => "Content-Type: image/x-icon",
        "Access-Control-Allow-Credentials: true" => "Access-Control-Allow-Credentials: true",
        _ => return None,
    })
}

/// Intern one header line as `&'static str`, or `None` once the cache is
/// full: the leak stays bounded even when header values carry unbounded
/// request input (redirect targets, echoed origins).
fn intern_header(line: &str) -> Option<&'static str> {
    if let Some(fixed) = static_header_line(line) {
        return Some(fixed);
    }

    static CACHE: OnceLock<Mutex<HashSet<&'static str>>> = OnceLock::new();
    let cache = CACHE.get_or_init(|| Mutex::new(HashSet::new()));
    let mut cache = cache.lock().unwrap();
    if let Some(&interned) = cache.get(line) {
        return Some(interned);
    }
    if cache.len() >= HEADER_CACHE_CAP {
        return None;
    }
    let leaked: &'static str = Box::leak(line.to_string().into_boxed_str());
    cache.insert(leaked);
    Some(leaked)
}

pub fn status_reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        301 => "Moved Permanently",
        302 => "Found",
        307 => "Temporary Redirect",
        308 => "Permanent Redirect",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        415 => "Unsupported Media Type",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        503 => "Service Unavailable",
        _ => "OK",
    }
}

/// Encode a bare message the way the context would encode it for the given
/// `Accept` header. Used for responses produced outside a handler (404, 405,
/// panic recovery).
pub fn encoded_message(accept: &str, message: &str) -> (&'static str, Vec<u8>) {
    if accept
        .split(',')
        .any(|item| item.trim_start().starts_with("application/xml"))
    {
        let body = crate::context::xml_encode(&Value::String(message.to_string()))
            .unwrap_or_default();
        ("application/xml", body)
    } else {
        (
            "application/json",
            serde_json::to_vec(&Value::String(message.to_string())).unwrap_or_default(),
        )
    }
}
