//! Resolving method references from many threads at once.
use fnv::FnvHashMap;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};
use types::resolve::{resolve_method, MethodSearch};
use types::{Database, MethodId, MethodRefId};

/// A type that resolves method references into method definitions.
///
/// Implementations must be deterministic: resolving the same reference with
/// the same strategy always produces the same result.
pub trait Resolve: Sync {
    fn resolve(
        &self,
        db: &Database,
        reference: MethodRefId,
        search: MethodSearch,
    ) -> Option<MethodId>;
}

impl<F> Resolve for F
where
    F: Fn(&Database, MethodRefId, MethodSearch) -> Option<MethodId> + Sync,
{
    fn resolve(
        &self,
        db: &Database,
        reference: MethodRefId,
        search: MethodSearch,
    ) -> Option<MethodId> {
        self(db, reference, search)
    }
}

/// A resolver that caches the results of `resolve_method`.
///
/// A missing entry is computed without holding the lock. If multiple threads
/// miss the same entry they all compute it, and the first result stored wins.
/// Since resolving is pure, all of them compute the same result.
pub struct CachingResolver {
    cache: RwLock<FnvHashMap<(MethodRefId, MethodSearch), Option<MethodId>>>,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl CachingResolver {
    pub fn new() -> Self {
        Self {
            cache: RwLock::new(FnvHashMap::default()),
            hits: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.cache.read().len()
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> usize {
        self.misses.load(Ordering::Relaxed)
    }

    /// Removes all cached entries.
    ///
    /// This must be called when declarations change in a way that affects
    /// resolution, such as when methods are added.
    pub fn clear(&self) {
        self.cache.write().clear();
    }
}

impl Default for CachingResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl Resolve for CachingResolver {
    fn resolve(
        &self,
        db: &Database,
        reference: MethodRefId,
        search: MethodSearch,
    ) -> Option<MethodId> {
        let key = (reference, search);

        if let Some(&found) = self.cache.read().get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return found;
        }

        let found = resolve_method(db, reference, search);

        self.misses.fetch_add(1, Ordering::Relaxed);
        *self.cache.write().entry(key).or_insert(found)
    }
}
