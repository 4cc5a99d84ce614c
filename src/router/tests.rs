//! Unit tests for the radix tree and the per-method registry.

use super::node::Node;
use super::Router;
use crate::error::RouteError;
use crate::params::Params;
use crate::path::count_params;

fn insert(tree: &mut Node<String>, pattern: &str) {
    tree.add_route(pattern, pattern.to_string())
        .unwrap_or_else(|e| panic!("insert {pattern}: {e}"));
}

fn lookup<'t>(tree: &'t Node<String>, path: &str) -> (Option<&'t String>, Params, bool) {
    let mut params = Params::new();
    let (handler, tsr) = tree.get_value(path, &mut params);
    (handler, params, tsr)
}

/// Every node's static children must be ordered by non-increasing priority,
/// and each priority must equal the number of handlers in its subtree.
fn check_priorities(n: &Node<String>) -> u32 {
    let mut prio = 0;
    let mut last = u32::MAX;
    for child in n.children() {
        assert!(
            child.priority() <= last,
            "child priorities not monotonically non-increasing"
        );
        last = child.priority();
        prio += check_priorities(child);
    }
    if n.handler_ref().is_some() {
        prio += 1;
    }
    assert_eq!(n.priority(), prio, "priority must count routes through node");
    prio
}

#[test]
fn static_routes() {
    let mut tree = Node::default();
    let routes = [
        "/hi",
        "/contact",
        "/co",
        "/c",
        "/a",
        "/ab",
        "/doc/",
        "/doc/go_faq.html",
        "/doc/go1.html",
        "/α",
        "/β",
    ];
    for r in routes {
        insert(&mut tree, r);
    }

    for r in routes {
        let (handler, params, _) = lookup(&tree, r);
        assert_eq!(handler, Some(&r.to_string()), "route {r}");
        assert!(params.is_empty());
    }

    let (handler, _, tsr) = lookup(&tree, "/con");
    assert!(handler.is_none());
    assert!(!tsr);

    let (handler, _, _) = lookup(&tree, "/no");
    assert!(handler.is_none());

    check_priorities(&tree);
}

#[test]
fn wildcard_routes_capture_params() {
    let mut tree = Node::default();
    for r in [
        "/",
        "/cmd/:tool/:sub",
        "/cmd/:tool/",
        "/src/*filepath",
        "/search/",
        "/search/:query",
        "/user_:name",
        "/user_:name/about",
        "/files/:dir/*filepath",
        "/info/:user/public",
        "/info/:user/project/:project",
    ] {
        insert(&mut tree, r);
    }

    let (handler, params, _) = lookup(&tree, "/cmd/test/");
    assert_eq!(handler, Some(&"/cmd/:tool/".to_string()));
    assert_eq!(params.get("tool"), "test");

    let (handler, params, _) = lookup(&tree, "/cmd/test/3");
    assert_eq!(handler, Some(&"/cmd/:tool/:sub".to_string()));
    assert_eq!(params.get("tool"), "test");
    assert_eq!(params.get("sub"), "3");

    let (handler, params, _) = lookup(&tree, "/src/some/file.png");
    assert_eq!(handler, Some(&"/src/*filepath".to_string()));
    assert_eq!(params.get("filepath"), "some/file.png");

    let (handler, params, _) = lookup(&tree, "/search/someth!ng+in+ünìcodé");
    assert_eq!(handler, Some(&"/search/:query".to_string()));
    assert_eq!(params.get("query"), "someth!ng+in+ünìcodé");

    let (handler, params, _) = lookup(&tree, "/user_gopher");
    assert_eq!(handler, Some(&"/user_:name".to_string()));
    assert_eq!(params.get("name"), "gopher");

    let (handler, params, _) = lookup(&tree, "/user_gopher/about");
    assert_eq!(handler, Some(&"/user_:name/about".to_string()));
    assert_eq!(params.get("name"), "gopher");

    let (handler, params, _) = lookup(&tree, "/files/js/inc/framework.js");
    assert_eq!(handler, Some(&"/files/:dir/*filepath".to_string()));
    assert_eq!(params.get("dir"), "js");
    assert_eq!(params.get("filepath"), "inc/framework.js");

    let (handler, params, _) = lookup(&tree, "/info/gordon/project/go");
    assert_eq!(handler, Some(&"/info/:user/project/:project".to_string()));
    assert_eq!(params.get("user"), "gordon");
    assert_eq!(params.get("project"), "go");

    check_priorities(&tree);
}

#[test]
fn unmatched_wildcard_paths() {
    let mut tree = Node::default();
    for r in ["/cmd/:tool/:sub", "/search/:query"] {
        insert(&mut tree, r);
    }

    let (handler, _, _) = lookup(&tree, "/search/");
    assert!(handler.is_none());
    let (handler, _, _) = lookup(&tree, "/cmd/vet");
    assert!(handler.is_none());
    let (handler, _, _) = lookup(&tree, "/cmd/vet/3/extra");
    assert!(handler.is_none());
}

#[test]
fn duplicate_route_is_rejected() {
    let mut tree = Node::default();
    insert(&mut tree, "/users/:id");
    let err = tree
        .add_route("/users/:id", "again".to_string())
        .unwrap_err();
    assert_eq!(err, RouteError::DuplicateRoute("/users/:id".to_string()));

    insert(&mut tree, "/doc/");
    let err = tree.add_route("/doc/", "again".to_string()).unwrap_err();
    assert_eq!(err, RouteError::DuplicateRoute("/doc/".to_string()));
}

#[test]
fn conflicting_wildcard_names_are_rejected() {
    let mut tree = Node::default();
    insert(&mut tree, "/x/:a");
    let err = tree.add_route("/x/:b", "h".to_string()).unwrap_err();
    assert!(
        matches!(err, RouteError::WildcardConflict { .. }),
        "got {err:?}"
    );
}

#[test]
fn static_after_wildcard_is_rejected() {
    let mut tree = Node::default();
    insert(&mut tree, "/x/:a");
    let err = tree.add_route("/x/foo", "h".to_string()).unwrap_err();
    assert!(matches!(err, RouteError::WildcardConflict { .. }));
}

#[test]
fn wildcard_after_static_is_rejected() {
    let mut tree = Node::default();
    insert(&mut tree, "/x/foo");
    let err = tree.add_route("/x/:a", "h".to_string()).unwrap_err();
    assert!(matches!(err, RouteError::WildcardConflict { .. }));

    let mut tree = Node::default();
    insert(&mut tree, "/user_x");
    let err = tree.add_route("/user_:name", "h".to_string()).unwrap_err();
    assert!(matches!(err, RouteError::WildcardConflict { .. }));
}

#[test]
fn catch_all_refuses_siblings() {
    let mut tree = Node::default();
    insert(&mut tree, "/x/*rest");
    let err = tree.add_route("/x/foo", "h".to_string()).unwrap_err();
    assert!(matches!(err, RouteError::WildcardConflict { .. }));
    let err = tree.add_route("/x/:a", "h".to_string()).unwrap_err();
    assert!(matches!(err, RouteError::WildcardConflict { .. }));

    let mut tree = Node::default();
    insert(&mut tree, "/src/new");
    let err = tree
        .add_route("/src/*filepath", "h".to_string())
        .unwrap_err();
    assert!(matches!(err, RouteError::WildcardConflict { .. }));
}

#[test]
fn malformed_wildcards_are_rejected() {
    let cases = [
        "/:foo:bar",     // two wildcards in one segment
        "/user/:",       // unnamed parameter
        "/src/*",        // unnamed catch-all
        "/src/*filepath/x", // catch-all not terminal
        "/src*filepath", // no slash before catch-all
    ];
    for pattern in cases {
        let mut tree: Node<String> = Node::default();
        let err = tree.add_route(pattern, "h".to_string()).unwrap_err();
        assert!(
            matches!(err, RouteError::BadPattern(_)),
            "{pattern} gave {err:?}"
        );
    }
}

#[test]
fn tsr_recommendations() {
    let mut tree = Node::default();
    for r in [
        "/hi",
        "/b/",
        "/search/:query",
        "/cmd/:tool/",
        "/src/*filepath",
        "/x",
        "/x/y",
        "/y/",
        "/y/z",
        "/doc/",
    ] {
        insert(&mut tree, r);
    }

    // registered without trailing slash, requested with one (and vice versa)
    let tsr_paths = ["/hi/", "/b", "/search/gopher/", "/cmd/vet", "/src", "/x/", "/y", "/doc"];
    for path in tsr_paths {
        let (handler, _, tsr) = lookup(&tree, path);
        assert!(handler.is_none(), "{path} should not match");
        assert!(tsr, "{path} should recommend a trailing-slash toggle");
    }

    let no_tsr = ["/", "/no", "/no/", "/_", "/_/"];
    for path in no_tsr {
        let (handler, _, tsr) = lookup(&tree, path);
        assert!(handler.is_none(), "{path} should not match");
        assert!(!tsr, "{path} should not recommend anything");
    }
}

#[test]
fn tsr_symmetry_for_registered_routes() {
    let patterns = ["/a/b", "/c/d/", "/e", "/f/"];
    let mut tree = Node::default();
    for p in patterns {
        insert(&mut tree, p);
    }
    for p in patterns {
        let toggled = match p.strip_suffix('/') {
            Some(stripped) => stripped.to_string(),
            None => format!("{p}/"),
        };
        let (handler, _, tsr) = lookup(&tree, &toggled);
        assert!(handler.is_none(), "{toggled}");
        assert!(tsr, "{toggled} must recommend toggling back to {p}");
    }
}

#[test]
fn max_params_covers_every_pattern() {
    let patterns = [
        "/",
        "/users/:id",
        "/users/:id/posts/:post",
        "/files/:dir/*filepath",
    ];
    let mut tree = Node::default();
    for p in patterns {
        insert(&mut tree, p);
    }
    for p in patterns {
        assert!(tree.max_params() >= count_params(p), "{p}");
    }
    assert_eq!(tree.max_params(), 2);
}

#[test]
fn priorities_reorder_towards_hot_prefixes() {
    let mut tree = Node::default();
    for r in [
        "/api/a",
        "/api/b",
        "/api/c",
        "/zzz",
        "/api/d",
        "/api/e",
    ] {
        insert(&mut tree, r);
    }
    check_priorities(&tree);
    // the /api branch carries five routes and must be tried before /zzz
    let first = &tree.children()[0];
    assert!(first.priority() >= 5);
}

#[test]
fn case_insensitive_fixing() {
    let mut tree = Node::default();
    for r in [
        "/hi",
        "/b/",
        "/ABC/",
        "/search/:query",
        "/cmd/:tool/",
        "/src/*filepath",
        "/x/y",
    ] {
        insert(&mut tree, r);
    }

    // exact casing survives
    assert_eq!(
        tree.find_case_insensitive_path("/hi", false),
        Some("/hi".to_string())
    );
    // wrong casing is repaired
    assert_eq!(
        tree.find_case_insensitive_path("/HI", false),
        Some("/hi".to_string())
    );
    assert_eq!(
        tree.find_case_insensitive_path("/abc/", false),
        Some("/ABC/".to_string())
    );
    // parameter values keep their own casing
    assert_eq!(
        tree.find_case_insensitive_path("/SEARCH/GoPher", false),
        Some("/search/GoPher".to_string())
    );
    assert_eq!(
        tree.find_case_insensitive_path("/SRC/some/File.txt", false),
        Some("/src/some/File.txt".to_string())
    );
    // trailing slash repaired only when allowed
    assert_eq!(tree.find_case_insensitive_path("/HI/", false), None);
    assert_eq!(
        tree.find_case_insensitive_path("/HI/", true),
        Some("/hi".to_string())
    );
    assert_eq!(
        tree.find_case_insensitive_path("/B", true),
        Some("/b/".to_string())
    );
    // no match at all
    assert_eq!(tree.find_case_insensitive_path("/missing", true), None);
}

#[test]
fn router_validates_method_and_pattern() {
    let mut router: Router<u32> = Router::new();
    assert_eq!(
        router.add_route("", "/x", 1).unwrap_err(),
        RouteError::EmptyMethod
    );
    assert!(matches!(
        router.add_route("GET", "x", 1).unwrap_err(),
        RouteError::BadPattern(_)
    ));
    router.add_route("GET", "/x", 1).unwrap();
    assert!(router.has_method("GET"));
    assert!(!router.has_method("POST"));
}

#[test]
fn router_lookup_per_method() {
    let mut router: Router<&'static str> = Router::new();
    router.add_route("GET", "/users/:id", "get_user").unwrap();
    router.add_route("DELETE", "/users/:id", "del_user").unwrap();

    let mut params = Params::new();
    let hit = router.lookup("GET", "/users/7", &mut params);
    assert_eq!(hit.handler, Some(&"get_user"));
    assert_eq!(params.get("id"), "7");

    params.clear();
    let miss = router.lookup("PUT", "/users/7", &mut params);
    assert!(miss.handler.is_none());
    assert!(!miss.tsr);
}

#[test]
fn allowed_methods_are_sorted_with_options_last() {
    let mut router: Router<&'static str> = Router::new();
    router.add_route("GET", "/users/:id", "get").unwrap();
    router.add_route("DELETE", "/users/:id", "del").unwrap();
    router.add_route("POST", "/users/", "create").unwrap();

    let allow = router.allowed("/users/7", "OPTIONS");
    assert_eq!(allow, vec!["DELETE", "GET", "OPTIONS"]);

    let global = router.allowed("*", "OPTIONS");
    assert_eq!(global, vec!["DELETE", "GET", "POST", "OPTIONS"]);

    assert!(router.allowed("/nowhere", "OPTIONS").is_empty());
}

#[test]
fn router_max_params() {
    let mut router: Router<u8> = Router::new();
    router.add_route("GET", "/a/:b/:c/:d", 1).unwrap();
    router.add_route("POST", "/x", 2).unwrap();
    assert_eq!(router.max_params(), 3);
}
