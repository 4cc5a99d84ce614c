//! Thread-safe object pools for per-request allocations.
//!
//! Context and parameter objects are recycled across requests so the hot path
//! does not pay for fresh allocations. The pool is a plain mutex over a free
//! list; acquire and release are both O(1) and safe to call from any number
//! of serving coroutines.

use std::sync::Mutex;

/// Objects that can be scrubbed of per-request state before reuse.
pub(crate) trait Recycle: Default {
    /// Clear every owned reference and cache so a recycled object is
    /// indistinguishable from a fresh one.
    fn recycle(&mut self);
}

pub(crate) struct Pool<T: Recycle> {
    free: Mutex<Vec<T>>,
}

impl<T: Recycle> Pool<T> {
    pub fn new() -> Self {
        Self {
            free: Mutex::new(Vec::new()),
        }
    }

    /// Take an object from the pool, or create one if the pool is empty.
    pub fn acquire(&self) -> T {
        self.free.lock().unwrap().pop().unwrap_or_default()
    }

    /// Scrub an object and return it to the pool.
    pub fn release(&self, mut obj: T) {
        obj.recycle();
        self.free.lock().unwrap().push(obj);
    }

    /// Number of idle objects currently in the pool.
    pub fn idle(&self) -> usize {
        self.free.lock().unwrap().len()
    }
}
