//! Revocation store interface and an in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::pipeline::{Clock, TokenId};

/// Collaborator consulted during verification when configured.
///
/// Persistent stores live outside this crate; they only need to answer
/// membership queries for token identifiers.
pub trait RevocationStore: Send + Sync {
    fn is_revoked(&self, id: &TokenId) -> bool;

    /// Record `id` as revoked. `expires_at` is the token's own expiry in unix
    /// seconds; the entry must be kept at least until then.
    fn revoke(&self, id: TokenId, expires_at: u64);
}

/// Thread-safe in-memory revocation list.
///
/// Each entry lives exactly as long as the token it revokes. Once the token
/// has expired it is rejected as expired anyway, so the entry can go.
pub struct InMemoryRevocationStore {
    /// Map of token id -> token expiry (unix seconds).
    revoked: Mutex<HashMap<TokenId, u64>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryRevocationStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            revoked: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Get the current number of stored entries (for monitoring).
    pub fn len(&self) -> usize {
        match self.revoked.lock() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    /// Check if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop entries whose tokens have expired.
    pub fn cleanup(&self) {
        let mut revoked = match self.revoked.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let now = self.clock.now();
        revoked.retain(|_, expires_at| *expires_at >= now);
    }

    /// Start a background cleanup task.
    ///
    /// This spawns a tokio task that periodically removes expired entries.
    pub fn start_cleanup_task(self: &Arc<Self>, interval: Duration) {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval_timer = tokio::time::interval(interval);
            loop {
                interval_timer.tick().await;
                store.cleanup();
            }
        });
    }
}

impl RevocationStore for InMemoryRevocationStore {
    fn is_revoked(&self, id: &TokenId) -> bool {
        let revoked = match self.revoked.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(), // Recover from mutex poisoning
        };
        revoked.contains_key(id)
    }

    fn revoke(&self, id: TokenId, expires_at: u64) {
        let mut revoked = match self.revoked.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let now = self.clock.now();

        // Lazy cleanup
        revoked.retain(|_, expiry| *expiry >= now);
        let entry = revoked.entry(id).or_insert(expires_at);
        *entry = (*entry).max(expires_at);
    }
}
