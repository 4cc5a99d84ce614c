//! Per-method route registry over the radix trees.
//!
//! One tree per HTTP method, created lazily when the first route for that
//! method is registered. The registry also answers the `Allow` computation
//! for `OPTIONS` and `405` responses, keeping a cached server-wide list that
//! is refreshed whenever a new method tree appears.

use std::collections::HashMap;

use crate::error::RouteError;
use crate::params::Params;
use crate::router::node::Node;

/// Outcome of a tree lookup.
pub struct Lookup<'r, T> {
    /// The resolved handler, if the path matched exactly.
    pub handler: Option<&'r T>,
    /// Trailing-slash recommendation: the path would match with its trailing
    /// `/` toggled.
    pub tsr: bool,
}

/// Route registry: one radix tree per HTTP method.
pub struct Router<T> {
    trees: HashMap<String, Node<T>>,
    global_allowed: Vec<String>,
}

impl<T> Default for Router<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Router<T> {
    pub fn new() -> Self {
        Self {
            trees: HashMap::new(),
            global_allowed: Vec::new(),
        }
    }

    /// Register `handler` for `method` and `pattern`.
    ///
    /// Fails when the method is empty, the pattern does not begin with `/`,
    /// the pattern is already taken, or a wildcard would make routing
    /// ambiguous. Registration failures are programming errors; callers are
    /// expected to surface them at startup.
    pub fn add_route(&mut self, method: &str, pattern: &str, handler: T) -> Result<(), RouteError> {
        if method.is_empty() {
            return Err(RouteError::EmptyMethod);
        }
        if !pattern.starts_with('/') {
            return Err(RouteError::BadPattern(format!(
                "path must begin with '/' in path '{pattern}'"
            )));
        }

        let created = !self.trees.contains_key(method);
        let root = self.trees.entry(method.to_string()).or_default();
        root.add_route(pattern, handler)?;

        if created {
            self.refresh_global_allowed();
        }
        Ok(())
    }

    /// Whether any route was registered for `method`.
    pub fn has_method(&self, method: &str) -> bool {
        self.trees.contains_key(method)
    }

    /// Resolve `path` in the tree for `method`, capturing parameters into the
    /// caller-supplied `params` slab.
    pub fn lookup<'r>(&'r self, method: &str, path: &str, params: &mut Params) -> Lookup<'r, T> {
        match self.trees.get(method) {
            Some(root) => {
                let (handler, tsr) = root.get_value(path, params);
                Lookup { handler, tsr }
            }
            None => Lookup {
                handler: None,
                tsr: false,
            },
        }
    }

    /// Reconstruct the registered casing for `path` in the tree for `method`.
    pub fn find_case_insensitive(
        &self,
        method: &str,
        path: &str,
        fix_trailing_slash: bool,
    ) -> Option<String> {
        self.trees
            .get(method)?
            .find_case_insensitive_path(path, fix_trailing_slash)
    }

    /// Methods allowed for `path`, sorted, with `OPTIONS` appended.
    ///
    /// `"*"` answers server-wide: every registered method. For a concrete
    /// path each method's tree is probed with a params-less lookup.
    pub fn allowed(&self, path: &str, req_method: &str) -> Vec<String> {
        if path == "*" {
            return self.global_allowed.clone();
        }

        let mut allow: Vec<String> = Vec::new();
        let mut scratch = Params::new();
        for (method, root) in &self.trees {
            if method == req_method || method == "OPTIONS" {
                continue;
            }
            scratch.clear();
            let (handler, _) = root.get_value(path, &mut scratch);
            if handler.is_some() {
                allow.push(method.clone());
            }
        }
        if !allow.is_empty() {
            allow.sort();
            allow.push("OPTIONS".to_string());
        }
        allow
    }

    /// Highest parameter count on any registered route, used to size pooled
    /// parameter lists.
    pub fn max_params(&self) -> u16 {
        self.trees.values().map(Node::max_params).max().unwrap_or(0)
    }

    fn refresh_global_allowed(&mut self) {
        let mut allow: Vec<String> = self
            .trees
            .keys()
            .filter(|m| *m != "OPTIONS")
            .cloned()
            .collect();
        allow.sort();
        if !allow.is_empty() {
            allow.push("OPTIONS".to_string());
        }
        self.global_allowed = allow;
    }
}
