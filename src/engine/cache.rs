//! The bounded LRU of instantiated concrete nodes.
//!
//! Pattern matching is cheap but not free — every `pull`/`set` on a pattern
//! instance re-derives its concrete inputs via `substitute`. The cache
//! avoids redoing that for keys pulled repeatedly. Eviction is always safe:
//! a [`ConcreteNode`] is fully rebuildable from the schema plus the key, so
//! a cache miss just costs one re-match.
//!
//! Guarded by `parking_lot::Mutex` rather than the engine's outer
//! `tokio::sync::Mutex`: lookups never cross an `.await`, so a cheaper,
//! non-async lock is the right tool here.

use std::num::NonZeroUsize;

use lru::LruCache;
use parking_lot::Mutex;

use super::ConcreteNode;

pub struct ConcreteCache {
    inner: Mutex<LruCache<String, ConcreteNode>>,
}

impl ConcreteCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::new(1).unwrap());
        ConcreteCache {
            inner: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn get(&self, key: &str) -> Option<ConcreteNode> {
        self.inner.lock().get(key).cloned()
    }

    pub fn put(&self, node: ConcreteNode) {
        self.inner.lock().put(node.key.clone(), node);
    }
}
