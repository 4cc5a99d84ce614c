//! Extraction of request data from `may_minihttp`.

use std::collections::HashMap;
use std::io::Read;

use may_minihttp::Request;

/// Owned snapshot of an inbound HTTP request.
///
/// Header names are lowercased; the query string is kept raw and parsed
/// lazily by the context.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ParsedRequest {
    pub method: String,
    pub path: String,
    pub raw_query: String,
    pub host: String,
    pub remote_addr: String,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

/// Pull method, path, query, headers and body out of a `may_minihttp::Request`.
pub fn parse_request(req: Request) -> ParsedRequest {
    let method = req.method().to_string();
    let raw_path = req.path().to_string();
    let (path, raw_query) = match raw_path.split_once('?') {
        Some((p, q)) => (p.to_string(), q.to_string()),
        None => (raw_path, String::new()),
    };

    let headers: HashMap<String, String> = req
        .headers()
        .iter()
        .map(|h| {
            (
                h.name.to_ascii_lowercase(),
                String::from_utf8_lossy(h.value).to_string(),
            )
        })
        .collect();

    let host = headers.get("host").cloned().unwrap_or_default();
    // may_minihttp does not expose the peer address; a forwarding proxy is
    // the only source for the client identity in the logs
    let remote_addr = headers
        .get("x-forwarded-for")
        .and_then(|v| v.split(',').next())
        .unwrap_or("-")
        .trim()
        .to_string();

    let mut body = Vec::new();
    let _ = req.body().read_to_end(&mut body);

    ParsedRequest {
        method,
        path,
        raw_query,
        host,
        remote_addr,
        headers,
        body,
    }
}
