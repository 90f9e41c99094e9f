use parking_lot::Mutex;
use std::collections::HashMap;

use crate::resource::{Handle, Resource, RetainPolicy};
use crate::subscription::Waiter;

/// Truncates a key for safe logging (prevents leaking sensitive key data)
pub(crate) fn truncate_key_for_log(key: &str) -> String {
    const MAX_LOG_LEN: usize = 16;
    match key.char_indices().nth(MAX_LOG_LEN) {
        Some((cut, _)) => format!("{}...", &key[..cut]),
        None => key.to_string(),
    }
}

/// Both maps live behind one lock: a key's stored resource and its waiters
/// are always read and changed together.
#[derive(Default)]
struct EngineState {
    items: HashMap<String, Resource>,
    waiters: HashMap<String, Vec<Waiter>>,
    /// Last generation handed out; each put takes the next one
    generation: u64,
}

impl EngineState {
    fn take(&mut self, key: &str) -> Option<Resource> {
        let resource = self.items.get(key)?.clone();
        if resource.is_consumed_on_delivery() {
            self.items.remove(key);
            self.waiters.remove(key);
        }
        Some(resource)
    }
}

/// Counts of what a flush discarded
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushStats {
    /// Stored resources removed
    pub resources: usize,
    /// Pending subscriptions dropped without a value
    pub waiters: usize,
}

/// The store/subscribe/notify/expire engine.
///
/// Every operation runs as a single critical section over both the resource
/// map and the waiter map, so a consumer registering for a key can never
/// slip between a producer's check for waiters and its store.
///
/// Delivery happens inside the critical section; it only completes a oneshot
/// and never blocks.
#[derive(Default)]
pub(crate) struct Engine {
    state: Mutex<EngineState>,
}

impl Engine {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Stores `value` under `key`, first delivering it to every waiter
    /// registered for that key.
    ///
    /// An until-observed value that reached at least one live waiter counts
    /// as consumed and is not stored. Every live waiter present at the time
    /// of the put receives it, not just the first. Timed values are always
    /// stored, replacing any previous resource for the key.
    ///
    /// Returns the new record so the caller can schedule its expiry by
    /// generation.
    pub(crate) fn put(&self, key: String, value: Handle, policy: RetainPolicy) -> Resource {
        let mut state = self.state.lock();
        state.generation += 1;
        let resource = Resource::new(key, value, policy, state.generation);

        let mut store_item = true;
        if let Some(waiters) = state.waiters.remove(resource.key()) {
            let registered = waiters.len();
            let mut delivered = 0;
            for waiter in waiters {
                // Abandoned waiters do not count as observers
                if waiter.deliver(resource.value_shared()) {
                    delivered += 1;
                }
            }

            if delivered > 0 && resource.is_consumed_on_delivery() {
                store_item = false;
            }

            tracing::debug!(
                "PUT {} delivered to {} of {} waiters",
                truncate_key_for_log(resource.key()),
                delivered,
                registered
            );
        }

        if store_item {
            let replaced = state
                .items
                .insert(resource.key().to_string(), resource.clone());
            tracing::debug!(
                "PUT {} stored generation {} ({:?}, replaced: {:?})",
                truncate_key_for_log(resource.key()),
                resource.generation(),
                resource.policy(),
                replaced.map(|old| old.generation())
            );
        }

        resource
    }

    /// Reads the resource under `key`.
    ///
    /// Until-observed resources are removed by the read; timed resources
    /// stay until they expire.
    pub(crate) fn take(&self, key: &str) -> Option<Resource> {
        self.state.lock().take(key)
    }

    /// Delivers the resource under `key` to `waiter` right away, or
    /// registers the waiter for the next put on that key.
    ///
    /// Returns `true` if the waiter was served immediately.
    pub(crate) fn subscribe_or_deliver(&self, key: &str, waiter: Waiter) -> bool {
        let mut state = self.state.lock();

        if let Some(resource) = state.take(key) {
            if !waiter.deliver(resource.into_value()) {
                tracing::warn!(
                    "SUBSCRIBE {} abandoned before delivery",
                    truncate_key_for_log(key)
                );
            }
            return true;
        }

        let waiters = state.waiters.entry(key.to_string()).or_default();
        waiters.retain(|waiter| !waiter.is_abandoned());
        waiters.push(waiter);
        tracing::debug!(
            "SUBSCRIBE {} waiting ({} pending)",
            truncate_key_for_log(key),
            waiters.len()
        );
        false
    }

    /// Removes the resource under `key` if it is still the record with
    /// `generation`.
    ///
    /// Waiters registered for the key are dropped, which resolves their
    /// subscriptions without a value. Returns `false` when the record was
    /// already replaced or removed.
    pub(crate) fn expire(&self, key: &str, generation: u64) -> bool {
        let mut state = self.state.lock();

        let current = state.items.get(key).map(Resource::generation);
        if current != Some(generation) {
            return false;
        }

        state.items.remove(key);
        if let Some(dropped) = state.waiters.remove(key) {
            tracing::warn!(
                "EXPIRE {} dropped {} pending waiters without a value",
                truncate_key_for_log(key),
                dropped.len()
            );
        }
        true
    }

    /// Removes every resource and drops every pending waiter
    pub(crate) fn flush(&self) -> FlushStats {
        let mut state = self.state.lock();
        let stats = FlushStats {
            resources: state.items.len(),
            waiters: state.waiters.values().map(Vec::len).sum(),
        };
        state.items.clear();
        state.waiters.clear();
        stats
    }

    /// Returns the number of stored resources
    pub(crate) fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    /// Checks if a resource is stored under `key` without consuming it
    pub(crate) fn contains_key(&self, key: &str) -> bool {
        self.state.lock().items.contains_key(key)
    }

    /// Returns the number of waiters registered for `key`
    pub(crate) fn waiters_for(&self, key: &str) -> usize {
        self.state.lock().waiters.get(key).map_or(0, Vec::len)
    }

    /// Returns the number of waiters registered across all keys
    pub(crate) fn pending_waiters(&self) -> usize {
        self.state.lock().waiters.values().map(Vec::len).sum()
    }
}
