//! LRU cache for evaluation decisions
//!
//! Entries are keyed by the full request: principal, resource path, action
//! and every context attribute as a separate key/value pair. The cache sits behind a
//! mutex so lookups work through a shared `&self` resolver.

use super::condition::{CanonicalValue, RequestContext};
use super::policy::{Action, Decision, Principal};
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;

/// Cache key for a single evaluation
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    principal: Principal,
    resource: String,
    action: Action,
    context: Vec<(String, CanonicalValue)>,
}

impl CacheKey {
    fn new(principal: &Principal, resource: &str, action: Action, context: &RequestContext) -> Self {
        CacheKey {
            principal: principal.clone(),
            resource: resource.to_string(),
            action,
            context: context.canonical(),
        }
    }
}

/// LRU cache for evaluation decisions
pub struct DecisionCache {
    cache: Mutex<LruCache<CacheKey, Decision, ahash::RandomState>>,
}

impl DecisionCache {
    /// Create a new cache; a zero capacity is bumped to one entry
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        DecisionCache {
            cache: Mutex::new(LruCache::with_hasher(capacity, ahash::RandomState::new())),
        }
    }

    /// Get a cached decision
    pub fn get(
        &self,
        principal: &Principal,
        resource: &str,
        action: Action,
        context: &RequestContext,
    ) -> Option<Decision> {
        let key = CacheKey::new(principal, resource, action, context);
        self.cache.lock().get(&key).copied()
    }

    /// Store a decision
    pub fn put(
        &self,
        principal: &Principal,
        resource: &str,
        action: Action,
        context: &RequestContext,
        decision: Decision,
    ) {
        let key = CacheKey::new(principal, resource, action, context);
        self.cache.lock().put(key, decision);
    }

    /// Drop every entry
    pub fn clear(&self) {
        self.cache.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.cache.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.cache.lock().cap().get()
    }
}

impl std::fmt::Debug for DecisionCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecisionCache")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .finish()
    }
}
