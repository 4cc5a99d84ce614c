//! Per-request context: read accessors, lazy caches, and content-negotiated
//! body decoding / response encoding.
//!
//! A `Context` is drawn from a pool at dispatch, bound to the parsed request
//! and the captured path parameters, handed to the handler, and scrubbed and
//! returned to the pool after the response is written. Handlers must not keep
//! references to it past their return.

use std::collections::HashMap;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::coerce::FromParam;
use crate::error::Error;
use crate::form::{parse_form, FormMap};
use crate::params::Params;
use crate::pool::Recycle;
use crate::server::request::ParsedRequest;
use crate::server::response::Outbound;

/// Decoder hook for `application/octet-stream` request bodies.
pub type BinaryReader = Arc<dyn Fn(&[u8]) -> Result<Value, Error> + Send + Sync>;
/// Encoder hook for `application/octet-stream` response bodies.
pub type BinaryWriter = Arc<dyn Fn(&Value) -> Result<Vec<u8>, Error> + Send + Sync>;
/// Decoder hook for `multipart/form-data` bodies; receives the full
/// `Content-Type` (carrying the boundary) and the raw body.
pub type MultipartReader = Arc<dyn Fn(&str, &[u8]) -> Result<Value, Error> + Send + Sync>;

/// Caller-supplied codec hooks installed into each context at bind time.
#[derive(Clone, Default)]
pub(crate) struct BodyCodecs {
    pub binary_reader: Option<BinaryReader>,
    pub binary_writer: Option<BinaryWriter>,
    pub multipart_reader: Option<MultipartReader>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MediaType {
    Json,
    Xml,
    Binary,
    OctetStream,
    Form,
    Multipart,
    Unknown,
}

fn media_type(item: &str) -> MediaType {
    let item = item.trim_start();
    if item.starts_with("application/json") {
        MediaType::Json
    } else if item.starts_with("application/xml") {
        MediaType::Xml
    } else if item.starts_with("application/x-bincode") {
        MediaType::Binary
    } else if item.starts_with("application/octet-stream") {
        MediaType::OctetStream
    } else if item.starts_with("application/x-www-form-urlencoded") {
        MediaType::Form
    } else if item.starts_with("multipart/form-data") {
        MediaType::Multipart
    } else {
        MediaType::Unknown
    }
}

/// Pick the response encoding from an `Accept` header. The first recognized
/// media type wins; everything else (including absence) falls back to JSON.
fn negotiate(accept: &str) -> MediaType {
    for item in accept.split(',') {
        match media_type(item) {
            MediaType::Unknown | MediaType::Form | MediaType::Multipart => continue,
            m => return m,
        }
    }
    MediaType::Json
}

/// Per-request facade over the parsed request and the response buffer.
#[derive(Default)]
pub struct Context {
    req: ParsedRequest,
    params: Params,
    user_id: u64,
    codecs: BodyCodecs,

    // lazy caches, computed on first access
    query: Option<HashMap<String, String>>,
    form: Option<FormMap>,
    accept: Option<String>,
    content_type: Option<String>,

    out: Outbound,
}

impl Context {
    /// Install the request, captured parameters and codec hooks. Called by
    /// the dispatcher right after the context leaves the pool.
    pub(crate) fn bind(&mut self, req: ParsedRequest, params: Params, codecs: BodyCodecs) {
        self.req = req;
        self.params = params;
        self.codecs = codecs;
    }

    pub(crate) fn take_params(&mut self) -> Params {
        std::mem::take(&mut self.params)
    }

    pub(crate) fn take_outbound(&mut self) -> Outbound {
        std::mem::take(&mut self.out)
    }

    // ---- read side -------------------------------------------------------

    /// Value of the path parameter `name`, or `""`.
    pub fn param(&self, name: &str) -> &str {
        self.params.get(name)
    }

    /// Path parameter parsed into `T`.
    pub fn param_as<T: FromParam>(&self, name: &str) -> Result<T, Error> {
        T::from_param(self.param(name)).map_err(|e| Error::BadRequest(e.to_string()))
    }

    /// Query-string value for `name`, or `""`. Parsed once and cached.
    pub fn query(&mut self, name: &str) -> &str {
        if self.query.is_none() {
            let parsed = url::form_urlencoded::parse(self.req.raw_query.as_bytes())
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect();
            self.query = Some(parsed);
        }
        self.query
            .as_ref()
            .and_then(|q| q.get(name))
            .map(String::as_str)
            .unwrap_or("")
    }

    /// Query value parsed into `T`.
    pub fn query_as<T: FromParam>(&mut self, name: &str) -> Result<T, Error> {
        let raw = self.query(name).to_string();
        T::from_param(&raw).map_err(|e| Error::BadRequest(e.to_string()))
    }

    /// First form value for `name`. Decodes the body on first access.
    pub fn form(&mut self, name: &str) -> Result<&str, Error> {
        Ok(self.form_map()?.get(name))
    }

    /// Form value parsed into `T`.
    pub fn form_as<T: FromParam>(&mut self, name: &str) -> Result<T, Error> {
        let raw = self.form(name)?.to_string();
        T::from_param(&raw).map_err(|e| Error::BadRequest(e.to_string()))
    }

    /// The decoded form multi-map.
    pub fn form_map(&mut self) -> Result<&FormMap, Error> {
        if self.form.is_none() {
            let parsed = parse_form(self.req.body.as_slice())?;
            self.form = Some(parsed);
        }
        Ok(self.form.as_ref().expect("form cache just filled"))
    }

    /// Request header value by name (case-insensitive), or `""`.
    pub fn header(&self, name: &str) -> &str {
        self.req
            .headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
            .unwrap_or("")
    }

    /// The `Accept` header, cached on first access.
    pub fn accept(&mut self) -> &str {
        if self.accept.is_none() {
            self.accept = Some(self.header("accept").to_string());
        }
        self.accept.as_deref().unwrap_or("")
    }

    /// The `Content-Type` header, cached on first access.
    pub fn content_type(&mut self) -> &str {
        if self.content_type.is_none() {
            self.content_type = Some(self.header("content-type").to_string());
        }
        self.content_type.as_deref().unwrap_or("")
    }

    pub fn method(&self) -> &str {
        &self.req.method
    }

    pub fn path(&self) -> &str {
        &self.req.path
    }

    pub fn host(&self) -> &str {
        &self.req.host
    }

    pub fn remote_addr(&self) -> &str {
        &self.req.remote_addr
    }

    /// Raw request body bytes.
    pub fn body(&self) -> &[u8] {
        &self.req.body
    }

    /// Bearer token from the `Authorization` header, or `""`.
    pub fn bearer_token(&self) -> &str {
        let auth = self.header("authorization");
        auth.strip_prefix("Bearer ")
            .or_else(|| auth.strip_prefix("bearer "))
            .unwrap_or("")
    }

    /// The `Origin` header.
    pub fn origin(&self) -> &str {
        self.header("origin")
    }

    pub fn user_agent(&self) -> &str {
        self.header("user-agent")
    }

    /// Whether the request was made with `XMLHttpRequest`.
    pub fn is_ajax(&self) -> bool {
        self.header("x-requested-with") == "XMLHttpRequest"
    }

    /// User identity slot, populated by authenticating handlers.
    pub fn user_id(&self) -> u64 {
        self.user_id
    }

    pub fn set_user_id(&mut self, user_id: u64) {
        self.user_id = user_id;
    }

    /// Decode the request body into `T` according to `Content-Type`.
    ///
    /// Unrecognized or missing content types decode as JSON. The
    /// `application/octet-stream` and `multipart/form-data` rows delegate to
    /// the configured hooks and fail with [`Error::NotImplemented`] when no
    /// hook is installed.
    pub fn read_body<T: DeserializeOwned>(&mut self) -> Result<T, Error> {
        let ctype = self.content_type().to_string();
        match media_type(&ctype) {
            MediaType::Json | MediaType::Unknown => serde_json::from_slice(&self.req.body)
                .map_err(|e| Error::BadRequest(format!("invalid json body: {e}"))),
            MediaType::Xml => quick_xml::de::from_reader(self.req.body.as_slice())
                .map_err(|e| Error::BadRequest(format!("invalid xml body: {e}"))),
            MediaType::Binary => bincode::deserialize(&self.req.body)
                .map_err(|e| Error::BadRequest(format!("invalid binary body: {e}"))),
            MediaType::OctetStream => {
                let reader = self.codecs.binary_reader.clone().ok_or(Error::NotImplemented)?;
                let value = reader(&self.req.body)?;
                serde_json::from_value(value)
                    .map_err(|e| Error::BadRequest(format!("binary decode failed: {e}")))
            }
            MediaType::Form => self.form_map()?.bind(),
            MediaType::Multipart => {
                let reader = self
                    .codecs
                    .multipart_reader
                    .clone()
                    .ok_or(Error::NotImplemented)?;
                let value = reader(&ctype, &self.req.body)?;
                serde_json::from_value(value)
                    .map_err(|e| Error::BadRequest(format!("multipart decode failed: {e}")))
            }
        }
    }

    // ---- write side ------------------------------------------------------

    /// Set (replace) a response header.
    pub fn set_header(&mut self, name: &str, value: &str) {
        self.out.set_header(name, value);
    }

    pub fn set_content_type(&mut self, value: &str) {
        self.out.set_header("Content-Type", value);
    }

    pub fn set_status(&mut self, status: u16) {
        self.out.status = status;
    }

    pub(crate) fn status(&self) -> u16 {
        self.out.status
    }

    /// Shortcut for the `Access-Control-Allow-Origin` response header.
    pub fn set_origin(&mut self, origin: &str) {
        self.set_header("Access-Control-Allow-Origin", origin);
    }

    /// Set `Access-Control-Allow-Credentials: true`.
    pub fn allow_credentials(&mut self) {
        self.set_header("Access-Control-Allow-Credentials", "true");
    }

    /// Append raw bytes to the response body.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.out.body.extend_from_slice(bytes);
    }

    /// Encode `val` into the response body using the encoder negotiated from
    /// the `Accept` header, setting `Content-Type` when not already set.
    pub fn write(&mut self, val: &Value) -> Result<(), Error> {
        let accept = self.accept().to_string();
        match negotiate(&accept) {
            MediaType::Json | MediaType::Unknown | MediaType::Form | MediaType::Multipart => {
                let bytes = serde_json::to_vec(val)
                    .map_err(|e| Error::Unexpected(format!("json encode failed: {e}")))?;
                self.out.set_header_if_unset("Content-Type", "application/json");
                self.out.body.extend_from_slice(&bytes);
            }
            MediaType::Xml => {
                let bytes = xml_encode(val)?;
                self.out.set_header_if_unset("Content-Type", "application/xml");
                self.out.body.extend_from_slice(&bytes);
            }
            MediaType::Binary => {
                let bytes = bincode::serialize(val)
                    .map_err(|e| Error::Unexpected(format!("binary encode failed: {e}")))?;
                self.out.set_header_if_unset("Content-Type", "application/x-bincode");
                self.out.body.extend_from_slice(&bytes);
            }
            MediaType::OctetStream => {
                let writer = self.codecs.binary_writer.clone().ok_or(Error::NotImplemented)?;
                let bytes = writer(val)?;
                self.out.set_header_if_unset("Content-Type", "application/octet-stream");
                self.out.body.extend_from_slice(&bytes);
            }
        }
        Ok(())
    }
}

/// Render a JSON value as an XML document rooted at `<value>`: object keys
/// become elements, arrays repeat their enclosing tag, scalars become text.
pub(crate) fn xml_encode(val: &Value) -> Result<Vec<u8>, Error> {
    let mut buf = Vec::new();
    let mut writer = quick_xml::Writer::new(&mut buf);
    write_xml_element(&mut writer, "value", val)?;
    Ok(buf)
}

fn write_xml_element(
    writer: &mut quick_xml::Writer<&mut Vec<u8>>,
    tag: &str,
    val: &Value,
) -> Result<(), Error> {
    use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};

    fn encode_err<E: std::fmt::Display>(e: E) -> Error {
        Error::Unexpected(format!("xml encode failed: {e}"))
    }

    match val {
        Value::Array(items) => {
            for item in items {
                write_xml_element(writer, tag, item)?;
            }
        }
        Value::Object(map) => {
            writer
                .write_event(Event::Start(BytesStart::new(tag)))
                .map_err(encode_err)?;
            for (key, item) in map {
                write_xml_element(writer, key, item)?;
            }
            writer
                .write_event(Event::End(BytesEnd::new(tag)))
                .map_err(encode_err)?;
        }
        Value::Null => {
            writer
                .write_event(Event::Empty(BytesStart::new(tag)))
                .map_err(encode_err)?;
        }
        other => {
            let text = match other {
                Value::String(s) => s.clone(),
                v => v.to_string(),
            };
            writer
                .write_event(Event::Start(BytesStart::new(tag)))
                .map_err(encode_err)?;
            writer
                .write_event(Event::Text(BytesText::new(&text)))
                .map_err(encode_err)?;
            writer
                .write_event(Event::End(BytesEnd::new(tag)))
                .map_err(encode_err)?;
        }
    }
    Ok(())
}

impl Recycle for Context {
    fn recycle(&mut self) {
        self.req = ParsedRequest::default();
        self.params.clear();
        self.user_id = 0;
        self.codecs = BodyCodecs::default();
        self.query = None;
        self.form = None;
        self.accept = None;
        self.content_type = None;
        self.out = Outbound::default();
    }
}
