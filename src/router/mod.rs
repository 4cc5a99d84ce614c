//! # Router module
//!
//! Radix-tree route matching. Patterns are compressed into a per-method
//! prefix tree at registration time; lookups walk the tree in O(k) where k is
//! the path length, capturing named parameters into a caller-supplied slab.
//!
//! Insertion keeps routes statically unambiguous: registering a wildcard and
//! a static segment for the same position, two differently-named wildcards at
//! one position, or a sibling next to a catch-all is rejected with a
//! [`crate::RouteError`].

mod core;
pub(crate) mod node;
#[cfg(test)]
mod tests;

pub use core::{Lookup, Router};
