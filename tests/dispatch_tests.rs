//! End-to-end dispatch pipeline tests, driving `App::dispatch` with parsed
//! requests and asserting on the buffered responses.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use ramhorn::{App, Error, ParsedRequest, Reply, RouteError};
use serde_json::json;

mod common;

fn request(method: &str, path: &str) -> ParsedRequest {
    ParsedRequest {
        method: method.to_string(),
        path: path.to_string(),
        ..ParsedRequest::default()
    }
}

fn request_with_query(method: &str, path: &str, query: &str) -> ParsedRequest {
    ParsedRequest {
        raw_query: query.to_string(),
        ..request(method, path)
    }
}

fn request_with_headers(method: &str, path: &str, headers: &[(&str, &str)]) -> ParsedRequest {
    ParsedRequest {
        headers: headers
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<HashMap<_, _>>(),
        ..request(method, path)
    }
}

#[test]
fn path_param_reaches_handler() {
    common::init_tracing();
    let app = App::new();
    app.get("/users/:id", |ctx| {
        Reply::value(json!({ "id": ctx.param("id") }))
    })
    .unwrap();

    let out = app.dispatch(request("GET", "/users/42"));
    assert_eq!(out.status, 200);
    assert_eq!(out.body, br#"{"id":"42"}"#);
    assert_eq!(out.header("Content-Type"), Some("application/json"));
}

#[test]
fn post_answers_created() {
    common::init_tracing();
    let app = App::new();
    app.post("/users/", |_ctx| Reply::value("created")).unwrap();

    let out = app.dispatch(request("POST", "/users/"));
    assert_eq!(out.status, 201);
    assert_eq!(out.body, br#""created""#);
}

#[test]
fn catch_all_captures_remainder() {
    common::init_tracing();
    let app = App::new();
    let seen = Arc::new(Mutex::new(String::new()));
    let seen_in_handler = Arc::clone(&seen);
    app.get("/files/*path", move |ctx| {
        *seen_in_handler.lock().unwrap() = ctx.param("path").to_string();
        Ok(Reply::None)
    })
    .unwrap();

    let out = app.dispatch(request("GET", "/files/a/b/c.txt"));
    assert_eq!(out.status, 204);
    assert_eq!(seen.lock().unwrap().as_str(), "a/b/c.txt");
}

#[test]
fn deeper_pattern_wins() {
    common::init_tracing();
    let app = App::new();
    app.get("/a/:x", |_ctx| Reply::value("one")).unwrap();
    app.get("/a/:x/b", |ctx| {
        Reply::value(json!({ "x": ctx.param("x") }))
    })
    .unwrap();

    let out = app.dispatch(request("GET", "/a/1/b"));
    assert_eq!(out.status, 200);
    assert_eq!(out.body, br#"{"x":"1"}"#);
}

#[test]
fn trailing_slash_redirect() {
    common::init_tracing();
    let app = App::new();
    app.get("/users/", |_ctx| Reply::value("list")).unwrap();

    let out = app.dispatch(request("GET", "/users"));
    assert_eq!(out.status, 301);
    assert_eq!(out.header("Location"), Some("/users/"));

    // the other direction strips the slash
    app.get("/about", |_ctx| Reply::value("about")).unwrap();
    let out = app.dispatch(request("GET", "/about/"));
    assert_eq!(out.status, 301);
    assert_eq!(out.header("Location"), Some("/about"));
}

#[test]
fn trailing_slash_redirect_status_by_method_and_query_left_out() {
    common::init_tracing();
    let app = App::new();
    app.get("/users/", |_ctx| Reply::value("list")).unwrap();
    app.post("/users/", |_ctx| Reply::value("created")).unwrap();

    // the Location carries only the toggled path, never the query string
    let out = app.dispatch(request_with_query("GET", "/users", "page=2"));
    assert_eq!(out.status, 301);
    assert_eq!(out.header("Location"), Some("/users/"));

    // non-GET methods redirect with 307
    let out = app.dispatch(request("POST", "/users"));
    assert_eq!(out.status, 307);
    assert_eq!(out.header("Location"), Some("/users/"));
}

#[test]
fn case_insensitive_redirect() {
    common::init_tracing();
    let app = App::new();
    app.get("/About", |_ctx| Reply::value("about")).unwrap();

    let out = app.dispatch(request("GET", "/about"));
    assert_eq!(out.status, 301);
    assert_eq!(out.header("Location"), Some("/About"));

    // disabled fixing turns it into a plain 404
    app.configure(|c| c.redirect_fixed_path = false);
    let out = app.dispatch(request("GET", "/about"));
    assert_eq!(out.status, 404);
}

#[test]
fn handler_error_maps_to_status_and_encoded_text() {
    common::init_tracing();
    let app = App::new();
    app.get("/secret", |_ctx| Err(Error::Unauthorized)).unwrap();

    let out = app.dispatch(request("GET", "/secret"));
    assert_eq!(out.status, 401);
    assert_eq!(out.body, br#""unauthorized""#);

    let out = app.dispatch(request_with_headers(
        "GET",
        "/secret",
        &[("accept", "application/xml")],
    ));
    assert_eq!(out.status, 401);
    let body = String::from_utf8(out.body).unwrap();
    assert!(body.contains("unauthorized"), "{body}");
    assert_eq!(out.headers.iter().find(|(n, _)| n == "Content-Type").map(|(_, v)| v.as_str()), Some("application/xml"));
}

#[test]
fn redirect_error_sets_location() {
    common::init_tracing();
    let app = App::new();
    app.get("/old", |_ctx| {
        Err(Error::MovedPermanently("https://x.example".to_string()))
    })
    .unwrap();

    let out = app.dispatch(request("GET", "/old"));
    assert_eq!(out.status, 301);
    assert_eq!(out.header("Location"), Some("https://x.example"));
}

#[test]
fn conflicting_wildcards_fail_registration() {
    common::init_tracing();
    let app = App::new();
    app.get("/x/:a", |_ctx| Ok(Reply::None)).unwrap();
    let err = app.get("/x/:b", |_ctx| Ok(Reply::None)).unwrap_err();
    assert!(matches!(err, RouteError::WildcardConflict { .. }));
}

#[test]
fn options_preflight_reports_allowed_methods() {
    common::init_tracing();
    let app = App::new();
    app.get("/users/:id", |_ctx| Ok(Reply::None)).unwrap();
    app.delete("/users/:id", |_ctx| Ok(Reply::None)).unwrap();

    let received = Arc::new(Mutex::new(Vec::<String>::new()));
    let received_in_hook = Arc::clone(&received);
    app.on_cors(move |out, origin, allow| {
        *received_in_hook.lock().unwrap() = allow.to_vec();
        if !origin.is_empty() {
            out.set_header("Access-Control-Allow-Origin", origin);
        }
    });

    let out = app.dispatch(request_with_headers(
        "OPTIONS",
        "/users/7",
        &[("origin", "https://x.example")],
    ));
    assert_eq!(out.status, 204);
    assert_eq!(out.header("Allow"), Some("DELETE, GET, OPTIONS"));
    assert_eq!(
        out.header("Access-Control-Allow-Origin"),
        Some("https://x.example")
    );
    assert_eq!(
        *received.lock().unwrap(),
        vec!["DELETE".to_string(), "GET".to_string(), "OPTIONS".to_string()]
    );
}

#[test]
fn registered_options_route_wins_over_preflight() {
    common::init_tracing();
    let app = App::new();
    app.get("/users/:id", |_ctx| Ok(Reply::None)).unwrap();
    app.options("/users/:id", |ctx| {
        ctx.set_status(200);
        Reply::value("custom preflight")
    })
    .unwrap();

    let out = app.dispatch(request("OPTIONS", "/users/7"));
    assert_eq!(out.status, 200);
    assert_eq!(out.body, br#""custom preflight""#);
}

#[test]
fn method_not_allowed_lists_alternatives() {
    common::init_tracing();
    let app = App::new();
    app.get("/users/:id", |_ctx| Ok(Reply::None)).unwrap();
    app.delete("/users/:id", |_ctx| Ok(Reply::None)).unwrap();

    let out = app.dispatch(request("PUT", "/users/7"));
    assert_eq!(out.status, 405);
    assert_eq!(out.header("Allow"), Some("DELETE, GET, OPTIONS"));

    app.configure(|c| c.handle_method_not_allowed = false);
    let out = app.dispatch(request("PUT", "/users/7"));
    assert_eq!(out.status, 404);
}

#[test]
fn unknown_route_is_not_found() {
    common::init_tracing();
    let app = App::new();
    app.get("/known", |_ctx| Ok(Reply::None)).unwrap();

    let out = app.dispatch(request("GET", "/unknown"));
    assert_eq!(out.status, 404);
    assert_eq!(out.body, br#""not found""#);
}

#[test]
fn not_found_hook_replaces_default_body() {
    common::init_tracing();
    let app = App::new();
    app.on_not_found(|ctx| {
        ctx.set_status(404);
        Reply::value(json!({ "missing": ctx.path() }))
    });

    let out = app.dispatch(request("GET", "/nope"));
    assert_eq!(out.status, 404);
    assert_eq!(out.body, br#"{"missing":"/nope"}"#);
}

#[test]
fn panic_guard_answers_500_and_notifies_observer() {
    common::init_tracing();
    let app = App::new();
    app.get("/boom", |_ctx| panic!("kaboom")).unwrap();

    let observed = Arc::new(Mutex::new(String::new()));
    let observed_in_hook = Arc::clone(&observed);
    app.on_panic(move |ctx, payload| {
        *observed_in_hook.lock().unwrap() = payload.to_string();
        let _ = ctx.write(&json!("internal server error"));
    });

    let out = app.dispatch(request("GET", "/boom"));
    assert_eq!(out.status, 500);
    assert_eq!(observed.lock().unwrap().as_str(), "kaboom");
    assert_eq!(out.body, br#""internal server error""#);
}

#[test]
fn method_override_from_query() {
    common::init_tracing();
    let app = App::new();
    app.configure(|c| c.method_override_param = Some("_m".to_string()));
    app.delete("/things/:id", |ctx| {
        Reply::value(json!({ "deleted": ctx.param("id") }))
    })
    .unwrap();

    let out = app.dispatch(request_with_query("POST", "/things/3", "_m=DELETE"));
    assert_eq!(out.status, 200);
    assert_eq!(out.body, br#"{"deleted":"3"}"#);
}

#[test]
fn extension_filter_short_circuits() {
    common::init_tracing();
    let app = App::new();
    app.configure(|c| c.extension_filter = Some("json".to_string()));
    app.get("/data.json", |_ctx| Reply::value("data")).unwrap();
    app.get("/data.xml", |_ctx| Reply::value("data")).unwrap();
    app.get("/plain", |_ctx| Reply::value("plain")).unwrap();

    assert_eq!(app.dispatch(request("GET", "/data.json")).status, 200);
    assert_eq!(app.dispatch(request("GET", "/data.xml")).status, 404);
    // no extension passes through
    assert_eq!(app.dispatch(request("GET", "/plain")).status, 200);
}

#[test]
fn binary_accept_without_hook_is_not_implemented() {
    common::init_tracing();
    let app = App::new();
    app.get("/blob", |_ctx| Reply::value("payload")).unwrap();

    let out = app.dispatch(request_with_headers(
        "GET",
        "/blob",
        &[("accept", "application/octet-stream")],
    ));
    assert_eq!(out.status, 501);
}

#[test]
fn binary_writer_hook_encodes_response() {
    common::init_tracing();
    let app = App::new();
    app.get("/blob", |_ctx| Reply::value("payload")).unwrap();
    app.set_binary_writer(Arc::new(|val| {
        Ok(val.as_str().unwrap_or_default().as_bytes().to_vec())
    }));

    let out = app.dispatch(request_with_headers(
        "GET",
        "/blob",
        &[("accept", "application/octet-stream")],
    ));
    assert_eq!(out.status, 200);
    assert_eq!(out.body, b"payload");
    assert_eq!(
        out.header("Content-Type"),
        Some("application/octet-stream")
    );
}

#[test]
fn serve_files_round_trip() {
    common::init_tracing();
    let dir = std::env::temp_dir().join(format!("ramhorn-dispatch-{}", std::process::id()));
    std::fs::create_dir_all(dir.join("css")).unwrap();
    std::fs::write(dir.join("css/site.css"), b"body{}").unwrap();

    let app = App::new();
    app.serve_files("/static/*filepath", &dir).unwrap();

    let out = app.dispatch(request("GET", "/static/css/site.css"));
    assert_eq!(out.status, 200);
    assert_eq!(out.body, b"body{}");
    assert_eq!(out.header("Content-Type"), Some("text/css"));

    let out = app.dispatch(request("GET", "/static/../secret"));
    assert_eq!(out.status, 404);

    let out = app.dispatch(request("GET", "/static/missing.css"));
    assert_eq!(out.status, 404);

    std::fs::remove_dir_all(dir).unwrap();

    let err = app.serve_files("/broken/*wrong", "/tmp").unwrap_err();
    assert!(matches!(err, RouteError::BadPattern(_)));
}

#[test]
fn body_decoding_by_content_type() {
    common::init_tracing();
    let app = App::new();
    app.post("/echo", |ctx| {
        let val: serde_json::Value = ctx.read_body()?;
        Reply::value(val)
    })
    .unwrap();

    let mut req = request_with_headers("POST", "/echo", &[("content-type", "application/json")]);
    req.body = br#"{"n":1}"#.to_vec();
    let out = app.dispatch(req);
    assert_eq!(out.status, 201);
    assert_eq!(out.body, br#"{"n":1}"#);

    // malformed body surfaces as a 400 through the error taxonomy
    let mut req = request_with_headers("POST", "/echo", &[("content-type", "application/json")]);
    req.body = b"{oops".to_vec();
    let out = app.dispatch(req);
    assert_eq!(out.status, 400);
}
