//! Bounded, single-flighted cache of derived recipes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock, RwLock};

use tracing::debug;

use crate::crypto::MasterSecret;
use crate::error::TokenError;

use super::derive::{derive_recipe, version_for_bucket};
use super::types::{Recipe, MAX_LAYERS, MIN_LAYERS};

type InflightCell = Arc<OnceLock<Arc<Recipe>>>;

struct CachedRecipe {
    recipe: Arc<Recipe>,
    /// Logical access time; the smallest value is evicted first.
    last_used: AtomicU64,
}

/// Owns derived recipes for one master secret.
///
/// Cache hits take only a read lock, so concurrent verifiers never block each
/// other. Concurrent misses for the same version share one derivation.
pub struct RecipeManager {
    secret: Arc<MasterSecret>,
    layer_count: u8,
    rotation_interval: u64,
    capacity: usize,
    cache: RwLock<HashMap<u16, CachedRecipe>>,
    inflight: Mutex<HashMap<u16, InflightCell>>,
    access_tick: AtomicU64,
    derivations: AtomicU64,
}

impl RecipeManager {
    /// Create a manager.
    ///
    /// # Arguments
    ///
    /// * `layer_count` - Layers every derived recipe uses (1..=3)
    /// * `rotation_interval` - Seconds per recipe version
    /// * `capacity` - Maximum number of cached versions
    pub fn new(
        secret: Arc<MasterSecret>,
        layer_count: u8,
        rotation_interval: u64,
        capacity: usize,
    ) -> Result<Self, TokenError> {
        if !(MIN_LAYERS..=MAX_LAYERS).contains(&layer_count) {
            return Err(TokenError::invalid_config(format!(
                "layer_count {} outside [{}, {}]",
                layer_count, MIN_LAYERS, MAX_LAYERS
            )));
        }
        if rotation_interval == 0 {
            return Err(TokenError::invalid_config(
                "recipe rotation interval must be positive",
            ));
        }
        if capacity == 0 {
            return Err(TokenError::invalid_config(
                "recipe cache size must be positive",
            ));
        }

        Ok(Self {
            secret,
            layer_count,
            rotation_interval,
            capacity,
            cache: RwLock::new(HashMap::new()),
            inflight: Mutex::new(HashMap::new()),
            access_tick: AtomicU64::new(0),
            derivations: AtomicU64::new(0),
        })
    }

    /// Rotation bucket containing `now`.
    pub fn active_bucket(&self, now: u64) -> u64 {
        now / self.rotation_interval
    }

    /// Recipe version that is active at `now`.
    pub fn active_version(&self, now: u64) -> u16 {
        version_for_bucket(self.active_bucket(now))
    }

    /// Return the recipe active at `now`, deriving it on a cache miss.
    pub fn get_or_derive(&self, now: u64) -> Arc<Recipe> {
        self.fetch(self.active_version(now))
    }

    /// Resolve the recipe a token names.
    ///
    /// Cached versions always resolve. An uncached version is re-derived only
    /// when it is the active version or the one immediately before it; any
    /// older version is gone for good.
    pub fn resolve(&self, version: u16, now: u64) -> Option<Arc<Recipe>> {
        if let Some(recipe) = self.lookup(version) {
            return Some(recipe);
        }

        let active = self.active_bucket(now);
        [active, active.saturating_sub(1)]
            .into_iter()
            .any(|bucket| version_for_bucket(bucket) == version)
            .then(|| self.fetch(version))
    }

    /// Whether `version` is cache-resident.
    pub fn contains(&self, version: u16) -> bool {
        self.read_cache().contains_key(&version)
    }

    /// Number of cached versions.
    pub fn len(&self) -> usize {
        self.read_cache().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn layer_count(&self) -> u8 {
        self.layer_count
    }

    pub fn rotation_interval(&self) -> u64 {
        self.rotation_interval
    }

    /// Total derivations performed since creation.
    pub fn derivation_count(&self) -> u64 {
        self.derivations.load(Ordering::Relaxed)
    }

    fn read_cache(&self) -> std::sync::RwLockReadGuard<'_, HashMap<u16, CachedRecipe>> {
        self.cache.read().unwrap_or_else(|e| e.into_inner())
    }

    fn next_tick(&self) -> u64 {
        self.access_tick.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn lookup(&self, version: u16) -> Option<Arc<Recipe>> {
        let cache = self.read_cache();
        cache.get(&version).map(|entry| {
            entry.last_used.store(self.next_tick(), Ordering::Relaxed);
            Arc::clone(&entry.recipe)
        })
    }

    fn fetch(&self, version: u16) -> Arc<Recipe> {
        if let Some(recipe) = self.lookup(version) {
            return recipe;
        }

        let cell = {
            let mut inflight = self.inflight.lock().unwrap_or_else(|e| e.into_inner());
            match inflight.get(&version) {
                Some(cell) => Arc::clone(cell),
                None => {
                    // The previous leader inserts into the cache before it
                    // clears its inflight entry, so one of the two is visible.
                    if let Some(recipe) = self.lookup(version) {
                        return recipe;
                    }
                    let cell: InflightCell = Arc::new(OnceLock::new());
                    inflight.insert(version, Arc::clone(&cell));
                    cell
                }
            }
        };

        let recipe = Arc::clone(cell.get_or_init(|| {
            self.derivations.fetch_add(1, Ordering::Relaxed);
            debug!(recipe_version = version, "Deriving recipe");
            Arc::new(derive_recipe(&self.secret, version, self.layer_count))
        }));

        self.insert(version, Arc::clone(&recipe));

        let mut inflight = self.inflight.lock().unwrap_or_else(|e| e.into_inner());
        if inflight
            .get(&version)
            .is_some_and(|current| Arc::ptr_eq(current, &cell))
        {
            inflight.remove(&version);
        }

        recipe
    }

    fn insert(&self, version: u16, recipe: Arc<Recipe>) {
        let tick = self.next_tick();
        let mut cache = self.cache.write().unwrap_or_else(|e| e.into_inner());

        if let Some(entry) = cache.get(&version) {
            entry.last_used.store(tick, Ordering::Relaxed);
            return;
        }

        cache.insert(
            version,
            CachedRecipe {
                recipe,
                last_used: AtomicU64::new(tick),
            },
        );

        while cache.len() > self.capacity {
            let oldest = cache
                .iter()
                .filter(|(&v, _)| v != version)
                .min_by_key(|(_, entry)| entry.last_used.load(Ordering::Relaxed))
                .map(|(&v, _)| v);

            match oldest {
                Some(evicted) => {
                    cache.remove(&evicted);
                    debug!(recipe_version = evicted, "Evicted recipe from cache");
                }
                None => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Barrier;
    use std::thread;

    const HOUR: u64 = 3600;

    fn manager(capacity: usize) -> RecipeManager {
        let secret = Arc::new(MasterSecret::new(vec![42; 32]).unwrap());
        RecipeManager::new(secret, 2, HOUR, capacity).unwrap()
    }

    #[test]
    fn test_rejects_bad_parameters() {
        let secret = Arc::new(MasterSecret::new(vec![1; 32]).unwrap());
        assert!(RecipeManager::new(Arc::clone(&secret), 0, HOUR, 4).is_err());
        assert!(RecipeManager::new(Arc::clone(&secret), 4, HOUR, 4).is_err());
        assert!(RecipeManager::new(Arc::clone(&secret), 1, 0, 4).is_err());
        assert!(RecipeManager::new(secret, 1, HOUR, 0).is_err());
    }

    #[test]
    fn test_get_or_derive_caches() {
        let manager = manager(4);
        let now = 1_000 * HOUR + 5;

        let first = manager.get_or_derive(now);
        let second = manager.get_or_derive(now + 60);

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(manager.derivation_count(), 1);
        assert_eq!(first.version, manager.active_version(now));
    }

    #[test]
    fn test_versions_rotate_hourly() {
        let manager = manager(4);
        let a = manager.get_or_derive(1_000 * HOUR);
        let b = manager.get_or_derive(1_001 * HOUR);
        assert_ne!(a.version, b.version);
    }

    #[test]
    fn test_lru_eviction() {
        let manager = manager(2);
        let v0 = manager.get_or_derive(0).version;
        let v1 = manager.get_or_derive(HOUR).version;

        // Touch v0 so v1 becomes least recently used.
        assert!(manager.resolve(v0, 10 * HOUR).is_some());

        let v2 = manager.get_or_derive(2 * HOUR).version;
        assert_eq!(manager.len(), 2);
        assert!(manager.contains(v0));
        assert!(!manager.contains(v1));
        assert!(manager.contains(v2));
    }

    #[test]
    fn test_resolve_grace_window() {
        let manager = manager(1);
        let now = 50 * HOUR + 30;

        // Previous and active versions are derivable without prior caching.
        assert!(manager.resolve(manager.active_version(now - HOUR), now).is_some());
        assert!(manager.resolve(manager.active_version(now), now).is_some());

        // Anything older must be cache-resident.
        let stale = manager.active_version(now - 2 * HOUR);
        assert!(manager.resolve(stale, now).is_none());
    }

    #[test]
    fn test_wrapped_bucket_derives_same_recipe() {
        let early = manager(1).get_or_derive(5 * HOUR);
        let late = manager(1).get_or_derive(0x1_0005 * HOUR);
        assert_eq!(early.version, late.version);
        assert_eq!(*early, *late);
    }

    #[test]
    fn test_evicted_version_unresolvable() {
        let manager = manager(1);
        let old = manager.get_or_derive(0).version;
        manager.get_or_derive(5 * HOUR);
        assert!(manager.resolve(old, 5 * HOUR).is_none());
    }

    #[test]
    fn test_concurrent_misses_single_flight() {
        let manager = Arc::new(manager(8));
        let barrier = Arc::new(Barrier::new(16));
        let now = 77 * HOUR;

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let manager = Arc::clone(&manager);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    manager.get_or_derive(now)
                })
            })
            .collect();

        let recipes: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(manager.derivation_count(), 1);
        assert!(recipes.iter().all(|r| **r == *recipes[0]));
    }
}
