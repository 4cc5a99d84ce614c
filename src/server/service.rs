//! The application service: route registration, hooks, and the dispatch
//! pipeline that turns a parsed request into a buffered response.
//!
//! `App` is the handle the host program registers routes on and hands to the
//! HTTP server. Dispatch selects the method tree, walks it, and either
//! invokes the matched handler inside a panic guard or answers with the
//! redirect / `OPTIONS` / `405` / `404` machinery.

use std::io;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, RwLock};
use std::time::Instant;

use http::Method;
use may_minihttp::{HttpService, Request, Response};
use serde_json::Value;
use tracing::{error, info};

use crate::context::{BinaryReader, BinaryWriter, BodyCodecs, Context, MultipartReader};
use crate::error::{Error, HandlerResult, Reply, RouteError};
use crate::params::Params;
use crate::path::clean_path;
use crate::pool::Pool;
use crate::router::Router;
use crate::server::request::{parse_request, ParsedRequest};
use crate::server::response::{encoded_message, Outbound};
use crate::static_files::StaticDir;
use crate::Handler;

/// Invoked when a handler panics: receives the context (with the `500`
/// status already set) and the panic payload text.
pub type PanicObserver = Arc<dyn Fn(&mut Context, &str) + Send + Sync>;

/// Invoked for successful `OPTIONS` preflight matches with the response
/// under construction, the request's `Origin` and the allowed methods.
pub type CorsHook = Arc<dyn Fn(&mut Outbound, &str, &[String]) + Send + Sync>;

/// Dispatcher behavior switches. All default to the permissive/classic
/// behavior; mutate through [`App::configure`] before serving.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Redirect to the path with its trailing slash toggled when the tree
    /// recommends it (`301` for GET, `307` otherwise).
    pub redirect_trailing_slash: bool,
    /// Clean the path and retry case-insensitively, redirecting to the
    /// registered casing on success.
    pub redirect_fixed_path: bool,
    /// Answer `405` with an `Allow` header when another method matches.
    pub handle_method_not_allowed: bool,
    /// Answer `OPTIONS` requests from the route tables.
    pub handle_options: bool,
    /// Query-string key whose value substitutes for the HTTP method
    /// (conventionally `_m` or `$m`). Disabled by default.
    pub method_override_param: Option<String>,
    /// When set, requests whose path carries a different extension are
    /// short-circuited to `404`.
    pub extension_filter: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            redirect_trailing_slash: true,
            redirect_fixed_path: true,
            handle_method_not_allowed: true,
            handle_options: true,
            method_override_param: None,
            extension_filter: None,
        }
    }
}

#[derive(Clone, Default)]
struct Hooks {
    panic_observer: Option<PanicObserver>,
    cors: Option<CorsHook>,
    not_found: Option<Handler>,
    method_not_allowed: Option<Handler>,
    binary_reader: Option<BinaryReader>,
    binary_writer: Option<BinaryWriter>,
    multipart_reader: Option<MultipartReader>,
}

/// Application handle: route registry, hooks, pools and configuration.
///
/// Cloning is cheap and every clone serves the same application; the HTTP
/// server clones one instance per connection.
#[derive(Clone)]
pub struct App {
    router: Arc<RwLock<Router<Handler>>>,
    config: Arc<RwLock<AppConfig>>,
    hooks: Arc<RwLock<Hooks>>,
    ctx_pool: Arc<Pool<Context>>,
    params_pool: Arc<Pool<Params>>,
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}

impl App {
    pub fn new() -> Self {
        Self {
            router: Arc::new(RwLock::new(Router::new())),
            config: Arc::new(RwLock::new(AppConfig::default())),
            hooks: Arc::new(RwLock::new(Hooks::default())),
            ctx_pool: Arc::new(Pool::new()),
            params_pool: Arc::new(Pool::new()),
        }
    }

    /// Mutate the dispatcher configuration. Call before serving; changes are
    /// picked up per request.
    pub fn configure<F: FnOnce(&mut AppConfig)>(&self, f: F) {
        f(&mut self.config.write().unwrap());
    }

    // ---- registration ----------------------------------------------------

    /// Register `handler` for an arbitrary method and pattern.
    pub fn add_route<H>(&self, method: &str, pattern: &str, handler: H) -> Result<(), RouteError>
    where
        H: Fn(&mut Context) -> HandlerResult + Send + Sync + 'static,
    {
        self.router
            .write()
            .unwrap()
            .add_route(method, pattern, Arc::new(handler))
    }

    pub fn get<H>(&self, pattern: &str, handler: H) -> Result<(), RouteError>
    where
        H: Fn(&mut Context) -> HandlerResult + Send + Sync + 'static,
    {
        self.add_route(Method::GET.as_str(), pattern, handler)
    }

    pub fn post<H>(&self, pattern: &str, handler: H) -> Result<(), RouteError>
    where
        H: Fn(&mut Context) -> HandlerResult + Send + Sync + 'static,
    {
        self.add_route(Method::POST.as_str(), pattern, handler)
    }

    pub fn put<H>(&self, pattern: &str, handler: H) -> Result<(), RouteError>
    where
        H: Fn(&mut Context) -> HandlerResult + Send + Sync + 'static,
    {
        self.add_route(Method::PUT.as_str(), pattern, handler)
    }

    pub fn patch<H>(&self, pattern: &str, handler: H) -> Result<(), RouteError>
    where
        H: Fn(&mut Context) -> HandlerResult + Send + Sync + 'static,
    {
        self.add_route(Method::PATCH.as_str(), pattern, handler)
    }

    pub fn delete<H>(&self, pattern: &str, handler: H) -> Result<(), RouteError>
    where
        H: Fn(&mut Context) -> HandlerResult + Send + Sync + 'static,
    {
        self.add_route(Method::DELETE.as_str(), pattern, handler)
    }

    pub fn head<H>(&self, pattern: &str, handler: H) -> Result<(), RouteError>
    where
        H: Fn(&mut Context) -> HandlerResult + Send + Sync + 'static,
    {
        self.add_route(Method::HEAD.as_str(), pattern, handler)
    }

    pub fn options<H>(&self, pattern: &str, handler: H) -> Result<(), RouteError>
    where
        H: Fn(&mut Context) -> HandlerResult + Send + Sync + 'static,
    {
        self.add_route(Method::OPTIONS.as_str(), pattern, handler)
    }

    /// Serve files from `dir` under a pattern ending in `/*filepath`.
    ///
    /// The captured remainder is resolved inside `dir` (traversal is
    /// rejected) and streamed back with a content type derived from the
    /// extension. Missing files answer `404`.
    pub fn serve_files<P: Into<std::path::PathBuf>>(
        &self,
        pattern: &str,
        dir: P,
    ) -> Result<(), RouteError> {
        if !pattern.ends_with("/*filepath") {
            return Err(RouteError::BadPattern(format!(
                "pattern must end with /*filepath in path '{pattern}'"
            )));
        }
        let files = StaticDir::new(dir);
        self.get(pattern, move |ctx| {
            let rel = ctx.param("filepath").to_string();
            let (bytes, content_type) = files.load(&rel).map_err(|_| Error::NotFound)?;
            Reply::callback(move |ctx| {
                ctx.set_status(200);
                ctx.set_content_type(content_type);
                ctx.write_bytes(&bytes);
                Ok(())
            })
        })
    }

    // ---- hooks -----------------------------------------------------------

    /// Observer for handler panics.
    pub fn on_panic<F: Fn(&mut Context, &str) + Send + Sync + 'static>(&self, f: F) {
        self.hooks.write().unwrap().panic_observer = Some(Arc::new(f));
    }

    /// Hook invoked on successful `OPTIONS` preflight matches; expected to
    /// set the `Access-Control-Allow-*` headers.
    pub fn on_cors<F: Fn(&mut Outbound, &str, &[String]) + Send + Sync + 'static>(&self, f: F) {
        self.hooks.write().unwrap().cors = Some(Arc::new(f));
    }

    /// Replace the default `404` body.
    pub fn on_not_found<H>(&self, handler: H)
    where
        H: Fn(&mut Context) -> HandlerResult + Send + Sync + 'static,
    {
        self.hooks.write().unwrap().not_found = Some(Arc::new(handler));
    }

    /// Replace the default `405` body. The `Allow` header is still set.
    pub fn on_method_not_allowed<H>(&self, handler: H)
    where
        H: Fn(&mut Context) -> HandlerResult + Send + Sync + 'static,
    {
        self.hooks.write().unwrap().method_not_allowed = Some(Arc::new(handler));
    }

    /// Decoder for `application/octet-stream` request bodies.
    pub fn set_binary_reader(&self, reader: BinaryReader) {
        self.hooks.write().unwrap().binary_reader = Some(reader);
    }

    /// Encoder for `application/octet-stream` response bodies.
    pub fn set_binary_writer(&self, writer: BinaryWriter) {
        self.hooks.write().unwrap().binary_writer = Some(writer);
    }

    /// Decoder for `multipart/form-data` request bodies.
    pub fn set_multipart_reader(&self, reader: MultipartReader) {
        self.hooks.write().unwrap().multipart_reader = Some(reader);
    }

    // ---- dispatch --------------------------------------------------------

    /// Run one request through the full pipeline and return the buffered
    /// response. This is the body of the `HttpService` implementation,
    /// independent of the wire types.
    pub fn dispatch(&self, mut req: ParsedRequest) -> Outbound {
        let started = Instant::now();
        let config = self.config.read().unwrap().clone();

        if let Some(ref key) = config.method_override_param {
            let substitute = url::form_urlencoded::parse(req.raw_query.as_bytes())
                .find(|(k, _)| k == key.as_str())
                .map(|(_, v)| v.to_string());
            if let Some(m) = substitute {
                if !m.is_empty() {
                    req.method = m.to_ascii_uppercase();
                }
            }
        }

        if let Some(ref ext) = config.extension_filter {
            let path_ext = req
                .path
                .rsplit('/')
                .next()
                .and_then(|segment| segment.rsplit_once('.'))
                .map(|(_, e)| e);
            if path_ext.is_some_and(|e| e != ext) {
                return self.not_found(req, started);
            }
        }

        let method = req.method.clone();
        let path = req.path.clone();

        {
            let router = self.router.read().unwrap();
            if router.has_method(&method) {
                let mut params = self.params_pool.acquire();
                let hit = router.lookup(&method, &path, &mut params);
                if let Some(handler) = hit.handler {
                    let handler = handler.clone();
                    drop(router);
                    return self.invoke(handler, req, params, None, started);
                }
                let tsr = hit.tsr;
                self.params_pool.release(params);

                if method != "CONNECT" && path != "/" {
                    let code = if method == "GET" { 301 } else { 307 };
                    if tsr && config.redirect_trailing_slash {
                        let target = if path.len() > 1 && path.ends_with('/') {
                            path[..path.len() - 1].to_string()
                        } else {
                            format!("{path}/")
                        };
                        return self.redirect(&req, code, &target, started);
                    }
                    if config.redirect_fixed_path {
                        let fixed = router.find_case_insensitive(
                            &method,
                            &clean_path(&path),
                            config.redirect_trailing_slash,
                        );
                        if let Some(fixed) = fixed {
                            return self.redirect(&req, code, &fixed, started);
                        }
                    }
                }
            }

            if method == "OPTIONS" {
                if config.handle_options {
                    let allow = router.allowed(&path, &method);
                    if !allow.is_empty() {
                        drop(router);
                        return self.preflight(&req, &allow, started);
                    }
                }
            } else if config.handle_method_not_allowed {
                let allow = router.allowed(&path, &method);
                if !allow.is_empty() {
                    drop(router);
                    return self.method_not_allowed(req, &allow, started);
                }
            }
        }

        self.not_found(req, started)
    }

    /// Invoke a handler inside the panic guard and encode its result.
    fn invoke(
        &self,
        handler: Handler,
        req: ParsedRequest,
        params: Params,
        forced_status: Option<u16>,
        started: Instant,
    ) -> Outbound {
        let hooks = self.hooks.read().unwrap().clone();
        let codecs = BodyCodecs {
            binary_reader: hooks.binary_reader.clone(),
            binary_writer: hooks.binary_writer.clone(),
            multipart_reader: hooks.multipart_reader.clone(),
        };

        let method = req.method.clone();
        let path = req.path.clone();
        let remote_addr = req.remote_addr.clone();
        let host = req.host.clone();

        let mut ctx = self.ctx_pool.acquire();
        ctx.bind(req, params, codecs);

        let result = catch_unwind(AssertUnwindSafe(|| handler(&mut ctx)));

        // the params slab goes back first; handlers must not retain it
        self.params_pool.release(ctx.take_params());

        let mut error_text = None;
        match result {
            Ok(Ok(Reply::Value(val))) => {
                if ctx.status() == 0 {
                    let status = forced_status
                        .unwrap_or(if method == "POST" { 201 } else { 200 });
                    ctx.set_status(status);
                }
                if let Err(err) = ctx.write(&val) {
                    ctx.set_status(err.status());
                    error_text = Some(err.message());
                }
            }
            Ok(Ok(Reply::None)) => {
                if ctx.status() == 0 {
                    ctx.set_status(forced_status.unwrap_or(204));
                }
            }
            Ok(Ok(Reply::Callback(callback))) => {
                if let Err(err) = callback(&mut ctx) {
                    ctx.set_status(err.status());
                    let _ = ctx.write(&Value::String(err.message()));
                    error_text = Some(err.message());
                }
            }
            Ok(Err(err)) => {
                ctx.set_status(err.status());
                if let Some(location) = err.location() {
                    ctx.set_header("Location", location);
                } else {
                    let _ = ctx.write(&Value::String(err.message()));
                }
                error_text = Some(err.message());
            }
            Err(panic) => {
                let payload = panic_text(panic.as_ref());
                ctx.set_status(500);
                match hooks.panic_observer.as_ref() {
                    Some(observer) => observer(&mut ctx, &payload),
                    None => {
                        let _ = ctx.write(&Value::String("internal server error".to_string()));
                    }
                }
                error_text = Some(format!("handler panicked: {payload}"));
            }
        }

        let user_id = ctx.user_id();
        let out = ctx.take_outbound();
        self.ctx_pool.release(ctx);

        let status = if out.status == 0 { 200 } else { out.status };
        let latency_ms = started.elapsed().as_millis() as u64;
        match error_text {
            Some(err) => error!(
                remote_addr = %remote_addr,
                host = %host,
                user_id,
                method = %method,
                path = %path,
                status,
                latency_ms,
                error = %err,
                "request failed"
            ),
            None => info!(
                remote_addr = %remote_addr,
                host = %host,
                user_id,
                method = %method,
                path = %path,
                status,
                latency_ms,
                "request served"
            ),
        }
        out
    }

    fn redirect(&self, req: &ParsedRequest, code: u16, target: &str, started: Instant) -> Outbound {
        // the query string never enters the Location header; header lines
        // are interned for the process lifetime and must not carry
        // unbounded request input
        let mut out = Outbound::with_status(code);
        out.set_header("Location", target);
        self.log_short(req, code, started);
        out
    }

    fn preflight(&self, req: &ParsedRequest, allow: &[String], started: Instant) -> Outbound {
        let mut out = Outbound::with_status(204);
        out.set_header("Allow", &allow.join(", "));
        let cors = self.hooks.read().unwrap().cors.clone();
        if let Some(cors) = cors {
            let origin = req.headers.get("origin").cloned().unwrap_or_default();
            cors(&mut out, &origin, allow);
        }
        self.log_short(req, 204, started);
        out
    }

    fn method_not_allowed(
        &self,
        req: ParsedRequest,
        allow: &[String],
        started: Instant,
    ) -> Outbound {
        let handler = self.hooks.read().unwrap().method_not_allowed.clone();
        let mut out = match handler {
            Some(handler) => {
                let params = self.params_pool.acquire();
                self.invoke(handler, req, params, Some(405), started)
            }
            None => {
                let accept = req.headers.get("accept").map(String::as_str).unwrap_or("");
                let (content_type, body) = encoded_message(accept, "method not allowed");
                let mut out = Outbound::with_status(405);
                out.set_header("Content-Type", content_type);
                out.body = body;
                self.log_short(&req, 405, started);
                out
            }
        };
        out.set_header_if_unset("Allow", &allow.join(", "));
        out
    }

    fn not_found(&self, req: ParsedRequest, started: Instant) -> Outbound {
        let handler = self.hooks.read().unwrap().not_found.clone();
        match handler {
            Some(handler) => {
                let params = self.params_pool.acquire();
                self.invoke(handler, req, params, Some(404), started)
            }
            None => {
                let accept = req.headers.get("accept").map(String::as_str).unwrap_or("");
                let (content_type, body) = encoded_message(accept, "not found");
                let mut out = Outbound::with_status(404);
                out.set_header("Content-Type", content_type);
                out.body = body;
                self.log_short(&req, 404, started);
                out
            }
        }
    }

    fn log_short(&self, req: &ParsedRequest, status: u16, started: Instant) {
        info!(
            remote_addr = %req.remote_addr,
            host = %req.host,
            user_id = 0u64,
            method = %req.method,
            path = %req.path,
            status,
            latency_ms = started.elapsed().as_millis() as u64,
            "request served"
        );
    }

    #[cfg(test)]
    pub(crate) fn pool_idle(&self) -> (usize, usize) {
        (self.ctx_pool.idle(), self.params_pool.idle())
    }
}

fn panic_text(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

impl HttpService for App {
    fn call(&mut self, req: Request, res: &mut Response) -> io::Result<()> {
        let parsed = parse_request(req);
        let out = self.dispatch(parsed);
        out.apply(res);
        Ok(())
    }
}
