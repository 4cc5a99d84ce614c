//! Radix-tree node: insertion, lookup and the case-insensitive path fixer.
//!
//! Each node carries a compressed path fragment. Static children are indexed
//! by their first byte (`indices`) and kept ordered by priority (the number
//! of routes passing through each child), so frequently shared prefixes are
//! tried first. A wildcard child (parameter or catch-all), when present, is
//! always the last child and is flagged with `wild_child` instead of being
//! listed in `indices`.
//!
//! Paths are stored and compared as raw bytes: compression may split a
//! multi-byte character across two nodes, which is fine for matching but
//! means fragments are not individually valid UTF-8. Captured values and
//! reconstructed paths always cover whole segments, so they convert back
//! losslessly.
//!
//! The tree is generic over the handler payload so it can be exercised
//! directly in tests; the router stores boxed handler closures in it.

use crate::error::RouteError;
use crate::params::Params;
use crate::path::count_params;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NodeKind {
    Static,
    Root,
    Param,
    CatchAll,
}

pub struct Node<T> {
    path: Vec<u8>,
    wild_child: bool,
    kind: NodeKind,
    max_params: u16,
    indices: Vec<u8>,
    children: Vec<Node<T>>,
    handler: Option<T>,
    priority: u32,
}

impl<T> Default for Node<T> {
    fn default() -> Self {
        Self {
            path: Vec::new(),
            wild_child: false,
            kind: NodeKind::Static,
            max_params: 0,
            indices: Vec::new(),
            children: Vec::new(),
            handler: None,
            priority: 0,
        }
    }
}

fn longest_common_prefix(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b).take_while(|(x, y)| x == y).count()
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

impl<T> Node<T> {
    /// Register `handler` under `path`, splitting and extending the tree as
    /// needed. Conflicting or duplicate routes are rejected.
    pub fn add_route(&mut self, path: &str, handler: T) -> Result<(), RouteError> {
        let num_params = count_params(path);
        self.priority += 1;

        // empty tree
        if self.path.is_empty() && self.children.is_empty() {
            self.insert_child(num_params, path.as_bytes(), path, handler)?;
            self.kind = NodeKind::Root;
            return Ok(());
        }

        self.add_route_walk(path.as_bytes(), path, num_params, handler)
    }

    fn add_route_walk(
        &mut self,
        mut path: &[u8],
        full_path: &str,
        num_params: u16,
        handler: T,
    ) -> Result<(), RouteError> {
        if num_params > self.max_params {
            self.max_params = num_params;
        }

        // split the edge if this node's path and the new path diverge
        let i = longest_common_prefix(path, &self.path);
        if i < self.path.len() {
            let mut child = Node {
                path: self.path[i..].to_vec(),
                wild_child: self.wild_child,
                kind: NodeKind::Static,
                max_params: 0,
                indices: std::mem::take(&mut self.indices),
                children: std::mem::take(&mut self.children),
                handler: self.handler.take(),
                priority: self.priority - 1,
            };
            for c in &child.children {
                if c.max_params > child.max_params {
                    child.max_params = c.max_params;
                }
            }
            self.indices = vec![child.path[0]];
            self.children = vec![child];
            self.path.truncate(i);
            self.wild_child = false;
        }

        if i < path.len() {
            path = &path[i..];

            if self.wild_child {
                let child = &mut self.children[0];
                child.priority += 1;
                if num_params > child.max_params {
                    child.max_params = num_params;
                }
                let num_params = num_params.saturating_sub(1);

                // the existing wildcard must cover the same segment
                if path.len() >= child.path.len()
                    && child.path == path[..child.path.len()]
                    && child.kind != NodeKind::CatchAll
                    && (child.path.len() >= path.len() || path[child.path.len()] == b'/')
                {
                    return child.add_route_walk(path, full_path, num_params, handler);
                }

                let segment = if child.kind == NodeKind::CatchAll {
                    path
                } else {
                    path.split(|&b| b == b'/').next().unwrap_or(path)
                };
                let at = full_path
                    .as_bytes()
                    .windows(segment.len().max(1))
                    .position(|w| w == segment)
                    .unwrap_or(0);
                let prefix = format!(
                    "{}{}",
                    lossy(&full_path.as_bytes()[..at]),
                    lossy(&child.path)
                );
                return Err(RouteError::WildcardConflict {
                    segment: lossy(segment),
                    pattern: full_path.to_string(),
                    prefix,
                });
            }

            let c = path[0];

            // slash after a parameter node
            if self.kind == NodeKind::Param && c == b'/' && self.children.len() == 1 {
                let child = &mut self.children[0];
                child.priority += 1;
                return child.add_route_walk(path, full_path, num_params, handler);
            }

            // descend into an existing static child
            if let Some(pos) = self.indices.iter().position(|&b| b == c) {
                let pos = self.increment_child_prio(pos);
                return self.children[pos].add_route_walk(path, full_path, num_params, handler);
            }

            // append a new static child, unless the remainder starts with a wildcard
            if c != b':' && c != b'*' {
                self.indices.push(c);
                self.children.push(Node {
                    max_params: num_params,
                    ..Node::default()
                });
                let pos = self.increment_child_prio(self.indices.len() - 1);
                return self.children[pos].insert_child(num_params, path, full_path, handler);
            }

            return self.insert_child(num_params, path, full_path, handler);
        }

        // the path ends at this node
        if self.handler.is_some() {
            return Err(RouteError::DuplicateRoute(full_path.to_string()));
        }
        self.handler = Some(handler);
        Ok(())
    }

    /// Append the wildcard chain for the remainder of a pattern below `self`.
    fn insert_child(
        &mut self,
        num_params: u16,
        path: &[u8],
        full_path: &str,
        handler: T,
    ) -> Result<(), RouteError> {
        if num_params == 0 {
            // plain static tail
            self.path = path.to_vec();
            self.handler = Some(handler);
            return Ok(());
        }

        // find the first wildcard and its end ('/' or end of pattern)
        let mut i = 0;
        while path[i] != b':' && path[i] != b'*' {
            i += 1;
        }
        let c = path[i];
        let mut end = i + 1;
        while end < path.len() && path[end] != b'/' {
            if path[end] == b':' || path[end] == b'*' {
                return Err(RouteError::BadPattern(format!(
                    "only one wildcard per path segment is allowed, has '{}' in path '{full_path}'",
                    lossy(&path[i..])
                )));
            }
            end += 1;
        }

        // inserting a wildcard here would shadow the existing children
        if !self.children.is_empty() {
            return Err(RouteError::WildcardConflict {
                segment: lossy(&path[i..end]),
                pattern: full_path.to_string(),
                prefix: lossy(&self.path),
            });
        }

        if end - i < 2 {
            return Err(RouteError::BadPattern(format!(
                "wildcards must be named with a non-empty name in path '{full_path}'"
            )));
        }

        if c == b':' {
            // keep the static prefix on this node
            if i > 0 {
                self.path = path[..i].to_vec();
            }

            self.children = vec![Node {
                kind: NodeKind::Param,
                max_params: num_params,
                priority: 1,
                ..Node::default()
            }];
            self.wild_child = true;
            let child = &mut self.children[0];

            if end < path.len() {
                // more pattern after this parameter
                child.path = path[i..end].to_vec();
                child.children = vec![Node {
                    max_params: num_params - 1,
                    priority: 1,
                    ..Node::default()
                }];
                return child.children[0].insert_child(
                    num_params - 1,
                    &path[end..],
                    full_path,
                    handler,
                );
            }

            child.path = path[i..].to_vec();
            child.handler = Some(handler);
            Ok(())
        } else {
            // catch-all
            if end < path.len() || num_params > 1 {
                return Err(RouteError::BadPattern(format!(
                    "catch-all routes are only allowed at the end of the path in path '{full_path}'"
                )));
            }
            if self.path.last() == Some(&b'/') {
                return Err(RouteError::WildcardConflict {
                    segment: lossy(&path[i..end]),
                    pattern: full_path.to_string(),
                    prefix: lossy(&self.path),
                });
            }
            if i == 0 || path[i - 1] != b'/' {
                return Err(RouteError::BadPattern(format!(
                    "no / before catch-all in path '{full_path}'"
                )));
            }
            let i = i - 1;

            self.path = path[..i].to_vec();

            // first node: catch-all with empty path
            let mut first = Node {
                wild_child: true,
                kind: NodeKind::CatchAll,
                max_params: 1,
                priority: 1,
                ..Node::default()
            };
            // second node: holds the variable and the handler
            first.children = vec![Node {
                path: path[i..].to_vec(),
                kind: NodeKind::CatchAll,
                max_params: 1,
                handler: Some(handler),
                priority: 1,
                ..Node::default()
            }];

            self.children = vec![first];
            self.indices = vec![b'/'];
            Ok(())
        }
    }

    /// Bump the priority of the child at `pos` and bubble it left past
    /// lower-priority siblings, mirroring the move in `indices`. Returns the
    /// child's new position.
    fn increment_child_prio(&mut self, pos: usize) -> usize {
        self.children[pos].priority += 1;
        let prio = self.children[pos].priority;

        let mut new_pos = pos;
        while new_pos > 0 && self.children[new_pos - 1].priority < prio {
            self.children.swap(new_pos - 1, new_pos);
            new_pos -= 1;
        }
        if new_pos != pos {
            let b = self.indices.remove(pos);
            self.indices.insert(new_pos, b);
        }
        new_pos
    }

    /// Resolve `path` to a handler, capturing wildcard values into `params`.
    ///
    /// The second return is the trailing-slash recommendation: the path did
    /// not match, but toggling its trailing `/` would.
    pub fn get_value<'n>(&'n self, path: &str, params: &mut Params) -> (Option<&'n T>, bool) {
        let mut n = self;
        let mut path = path.as_bytes();

        loop {
            if path.len() > n.path.len() {
                if path[..n.path.len()] == n.path[..] {
                    path = &path[n.path.len()..];

                    if !n.wild_child {
                        let c = path[0];
                        if let Some(pos) = n.indices.iter().position(|&b| b == c) {
                            n = &n.children[pos];
                            continue;
                        }

                        // dead end; a leaf without the trailing slash may exist
                        let tsr = path == b"/" && n.handler.is_some();
                        return (None, tsr);
                    }

                    n = &n.children[0];
                    match n.kind {
                        NodeKind::Param => {
                            let mut end = 0;
                            while end < path.len() && path[end] != b'/' {
                                end += 1;
                            }

                            // wildcard tokens and whole segments stay valid utf-8
                            params.push(
                                &String::from_utf8_lossy(&n.path[1..]),
                                &String::from_utf8_lossy(&path[..end]),
                            );

                            if end < path.len() {
                                if !n.children.is_empty() {
                                    path = &path[end..];
                                    n = &n.children[0];
                                    continue;
                                }

                                // the pattern stops here but the path goes on
                                let tsr = path.len() == end + 1;
                                return (None, tsr);
                            }

                            if n.handler.is_some() {
                                return (n.handler.as_ref(), false);
                            }
                            if n.children.len() == 1 {
                                let child = &n.children[0];
                                let tsr = child.path == b"/" && child.handler.is_some();
                                return (None, tsr);
                            }
                            return (None, false);
                        }
                        NodeKind::CatchAll => {
                            // the captured remainder drops its leading slash
                            let captured = path.strip_prefix(b"/").unwrap_or(path);
                            params.push(
                                &String::from_utf8_lossy(&n.path[2..]),
                                &String::from_utf8_lossy(captured),
                            );
                            return (n.handler.as_ref(), false);
                        }
                        _ => unreachable!("wild child must be a wildcard node"),
                    }
                }
            } else if path == &n.path[..] {
                if n.handler.is_some() {
                    return (n.handler.as_ref(), false);
                }

                // a wildcard below this node handles "path + /"
                if path == b"/" && n.wild_child && n.kind != NodeKind::Root {
                    return (None, true);
                }

                if let Some(pos) = n.indices.iter().position(|&b| b == b'/') {
                    let child = &n.children[pos];
                    let tsr = (child.path.len() == 1 && child.handler.is_some())
                        || (child.kind == NodeKind::CatchAll
                            && child.children[0].handler.is_some());
                    return (None, tsr);
                }
                return (None, false);
            }

            // no match; a leaf with the extra trailing slash may exist
            let tsr = path == b"/"
                || (n.path.len() == path.len() + 1
                    && n.path[path.len()] == b'/'
                    && path == &n.path[..path.len()]
                    && n.handler.is_some());
            return (None, tsr);
        }
    }

    /// Walk the tree comparing ASCII case-insensitively and reconstruct the
    /// registered casing of `path`. With `fix_trailing_slash`, a missing or
    /// superfluous trailing `/` is repaired as well.
    pub fn find_case_insensitive_path(
        &self,
        path: &str,
        fix_trailing_slash: bool,
    ) -> Option<String> {
        let mut out = Vec::with_capacity(path.len() + 1);
        if self.ci_walk(path.as_bytes(), &mut out, fix_trailing_slash) {
            String::from_utf8(out).ok()
        } else {
            None
        }
    }

    fn ci_walk(&self, path: &[u8], out: &mut Vec<u8>, fix: bool) -> bool {
        let n_len = self.path.len();

        if path.len() >= n_len && path[..n_len].eq_ignore_ascii_case(&self.path) {
            let mark = out.len();
            out.extend_from_slice(&self.path);
            let rest = &path[n_len..];

            if rest.is_empty() {
                if self.handler.is_some() {
                    return true;
                }
                if fix {
                    // canonical path carries a trailing slash
                    if let Some(pos) = self.indices.iter().position(|&b| b == b'/') {
                        let child = &self.children[pos];
                        if (child.path == b"/" && child.handler.is_some())
                            || (child.kind == NodeKind::CatchAll
                                && child.children[0].handler.is_some())
                        {
                            out.push(b'/');
                            return true;
                        }
                    }
                }
                out.truncate(mark);
                return false;
            }

            if self.wild_child {
                let child = &self.children[0];
                match child.kind {
                    NodeKind::Param => {
                        let mut end = 0;
                        while end < rest.len() && rest[end] != b'/' {
                            end += 1;
                        }
                        // parameter values keep the request's own casing
                        out.extend_from_slice(&rest[..end]);

                        if end < rest.len() {
                            if !child.children.is_empty()
                                && child.children[0].ci_walk(&rest[end..], out, fix)
                            {
                                return true;
                            }
                            // superfluous trailing slash
                            if fix && rest.len() == end + 1 && child.handler.is_some() {
                                return true;
                            }
                        } else {
                            if child.handler.is_some() {
                                return true;
                            }
                            if fix && child.children.len() == 1 {
                                let grandchild = &child.children[0];
                                if grandchild.path == b"/" && grandchild.handler.is_some() {
                                    out.push(b'/');
                                    return true;
                                }
                            }
                        }
                    }
                    NodeKind::CatchAll => {
                        out.extend_from_slice(rest);
                        if child.handler.is_some() {
                            return true;
                        }
                    }
                    _ => {}
                }
                out.truncate(mark);
                return false;
            }

            let c = rest[0];
            let inner = out.len();
            for (pos, &b) in self.indices.iter().enumerate() {
                if b.eq_ignore_ascii_case(&c) {
                    if self.children[pos].ci_walk(rest, out, fix) {
                        return true;
                    }
                    out.truncate(inner);
                }
            }
            // missing trailing slash
            if fix && rest == b"/" && self.handler.is_some() {
                return true;
            }
            out.truncate(mark);
            return false;
        }

        // the registered path only differs by its trailing slash
        if fix
            && n_len == path.len() + 1
            && self.path[path.len()] == b'/'
            && path.eq_ignore_ascii_case(&self.path[..path.len()])
            && self.handler.is_some()
        {
            out.extend_from_slice(&self.path);
            return true;
        }
        false
    }

    /// Highest number of parameters on any route below this node.
    pub fn max_params(&self) -> u16 {
        self.max_params
    }

    #[cfg(test)]
    pub(crate) fn priority(&self) -> u32 {
        self.priority
    }

    #[cfg(test)]
    pub(crate) fn children(&self) -> &[Node<T>] {
        &self.children
    }

    #[cfg(test)]
    pub(crate) fn handler_ref(&self) -> Option<&T> {
        self.handler.as_ref()
    }
}
