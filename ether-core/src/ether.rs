use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::config::{EtherConfig, MAX_RETENTION};
use crate::engine::{truncate_key_for_log, Engine, FlushStats};
use crate::error::EtherError;
use crate::resource::{downcast, Handle, Resource, RetainPolicy};
use crate::subscription::{self, Subscription};
use crate::timer::TimerService;

/// How long a value is held in the ether
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Retain {
    /// Held for the store's configured default retention (10 seconds unless configured)
    #[default]
    Default,
    /// Held for a fixed duration from the moment it is stored
    For(Duration),
    /// Held until delivered to the first consumer, then removed
    UntilObserved,
}

impl Retain {
    fn resolve(self, config: &EtherConfig) -> RetainPolicy {
        match self {
            Retain::Default => RetainPolicy::Timed(config.default_retention),
            Retain::For(duration) => RetainPolicy::Timed(duration.min(MAX_RETENTION)),
            Retain::UntilObserved => RetainPolicy::UntilObserved,
        }
    }
}

/// Internal shared state for the ether
struct EtherInner {
    engine: Arc<Engine>,
    timers: TimerService,
    config: EtherConfig,
}

/// In-process transient object store.
///
/// A producer holds a value under a key with a retention policy; consumers
/// read it directly or subscribe and are notified once it arrives, even if
/// they started listening before the producer stored anything.
///
/// Values are shared, not copied: every consumer receives a clone of the
/// producer's `Arc`. Cloning an `Ether` yields another handle to the same
/// store.
///
/// Timed retention needs a Tokio runtime to run expiry timers. The runtime
/// current at the time of each put is used, falling back to the one current
/// at construction for puts made outside any runtime. Without any runtime,
/// timed values stay until they are replaced or flushed.
///
/// # Example
///
/// ```rust,no_run
/// use ether_core::{Ether, Retain};
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() {
///     let ether = Ether::new();
///
///     // Consumer starts listening first
///     let pending = ether.subscribe::<u64>("answer");
///
///     // Producer hands off the value later
///     ether.hold_with_key("answer", 42u64, Retain::For(Duration::from_secs(5)));
///
///     assert_eq!(pending.await.unwrap().as_deref(), Some(&42));
/// }
/// ```
#[derive(Clone)]
pub struct Ether {
    inner: Arc<EtherInner>,
}

impl Ether {
    /// Creates a new store with default configuration
    pub fn new() -> Self {
        Self::with_config(EtherConfig::default())
    }

    /// Creates a new store with custom configuration
    pub fn with_config(config: EtherConfig) -> Self {
        Self {
            inner: Arc::new(EtherInner {
                engine: Arc::new(Engine::new()),
                timers: TimerService::new(),
                config,
            }),
        }
    }

    /// Returns the configuration this store was built with
    pub fn config(&self) -> &EtherConfig {
        &self.inner.config
    }

    /// Generates a fresh key (UUID v4 string)
    pub fn generate_key() -> String {
        Uuid::new_v4().to_string()
    }

    /// Stores a shared value under `key` and returns the key.
    ///
    /// Waiters already subscribed to `key` receive the value right away. An
    /// existing value under `key` is replaced; its pending expiry no longer
    /// affects the key.
    pub fn put<T: Any + Send + Sync>(
        &self,
        key: impl Into<String>,
        value: Arc<T>,
        retain: Retain,
    ) -> String {
        self.put_handle(key, value, retain)
    }

    /// Stores an already type-erased value under `key` and returns the key
    pub fn put_handle(&self, key: impl Into<String>, value: Handle, retain: Retain) -> String {
        let policy = retain.resolve(&self.inner.config);
        let resource = self.inner.engine.put(key.into(), value, policy);

        if let RetainPolicy::Timed(after) = resource.policy() {
            self.schedule_expiry(&resource, after);
        }

        resource.key().to_string()
    }

    /// Stores `value` under a generated key and returns that key
    pub fn hold<T: Any + Send + Sync>(&self, value: T, retain: Retain) -> String {
        self.put(Self::generate_key(), Arc::new(value), retain)
    }

    /// Stores `value` under `key`
    pub fn hold_with_key<T: Any + Send + Sync>(
        &self,
        key: impl Into<String>,
        value: T,
        retain: Retain,
    ) -> String {
        self.put(key, Arc::new(value), retain)
    }

    fn schedule_expiry(&self, resource: &Resource, after: Duration) {
        let engine = Arc::downgrade(&self.inner.engine);
        let key = resource.key().to_string();
        let generation = resource.generation();

        let scheduled = self.inner.timers.schedule(after, move || {
            let Some(engine) = engine.upgrade() else {
                return;
            };
            if engine.expire(&key, generation) {
                tracing::debug!("EXPIRE {} (generation {})", truncate_key_for_log(&key), generation);
            }
        });

        match scheduled {
            Ok(()) => {}
            Err(EtherError::TimerShutdown) => {
                tracing::warn!(
                    "PUT {} after shutdown: held until replaced or flushed",
                    truncate_key_for_log(resource.key())
                );
            }
            Err(err) => {
                tracing::error!(
                    "PUT {}: failed to schedule expiry ({}); held until replaced or flushed",
                    truncate_key_for_log(resource.key()),
                    err
                );
            }
        }
    }

    /// Reads the value under `key`.
    ///
    /// Returns `Ok(None)` if nothing is held there. A value held until
    /// observed is removed by this read, even if it turns out to be of a
    /// different type than `T`.
    ///
    /// # Errors
    ///
    /// Returns `EtherError::TypeMismatch` if the value is not a `T`.
    pub fn get<T: Any + Send + Sync>(&self, key: &str) -> Result<Option<Arc<T>>, EtherError> {
        self.get_handle(key)
            .map(|value| downcast(key, value))
            .transpose()
    }

    /// Reads the type-erased value under `key`, with the same consumption
    /// rules as [`get`](Self::get)
    pub fn get_handle(&self, key: &str) -> Option<Handle> {
        self.inner.engine.take(key).map(Resource::into_value)
    }

    /// Subscribes to `key`.
    ///
    /// If a value is held, the subscription is already resolved (consuming a
    /// value held until observed). Otherwise it resolves on the next put for
    /// `key`, or with `None` if the request is dropped by a flush or by the
    /// store going away.
    pub fn subscribe<T: Any + Send + Sync>(&self, key: &str) -> Subscription<T> {
        let (waiter, subscription) = subscription::channel(key);
        self.inner.engine.subscribe_or_deliver(key, waiter);
        subscription
    }

    /// Removes every held value and drops every pending subscription.
    ///
    /// # ⚠️ Warning: Destructive Operation
    ///
    /// Pending subscriptions resolve with `None`; callers must not rely on
    /// in-flight waits surviving a flush.
    pub fn flush(&self) -> FlushStats {
        let stats = self.inner.engine.flush();
        tracing::info!(
            "FLUSH removed {} resources, dropped {} waiters",
            stats.resources,
            stats.waiters
        );
        stats
    }

    /// Stops all pending expiry timers.
    ///
    /// Values already held stay until replaced, observed or flushed, and
    /// values put afterwards with timed retention never expire. This is
    /// called automatically when the last handle to the store is dropped.
    pub fn shutdown(&self) {
        self.inner.timers.shutdown();
    }

    /// Returns the number of held values
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.engine.len()
    }

    /// Returns `true` if nothing is held
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Checks if a value is held under `key` without consuming it
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.engine.contains_key(key)
    }

    /// Returns the number of subscriptions waiting on `key`
    pub fn waiters_for(&self, key: &str) -> usize {
        self.inner.engine.waiters_for(key)
    }

    /// Returns the number of subscriptions waiting across all keys
    pub fn pending_waiters(&self) -> usize {
        self.inner.engine.pending_waiters()
    }
}

impl Default for Ether {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Ether {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ether")
            .field("config", &self.inner.config)
            .field("len", &self.len())
            .field("pending_waiters", &self.pending_waiters())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::join_all;
    use tokio::time::{sleep, timeout};

    #[derive(Debug, PartialEq)]
    struct TestResource(&'static str);

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    #[tokio::test(start_paused = true)]
    async fn test_hold_default_retention_expires() {
        let ether = Ether::new();
        let resource = Arc::new(TestResource("my thing"));

        let key = ether.put(Ether::generate_key(), Arc::clone(&resource), Retain::Default);

        sleep(secs(9)).await;
        let observed = timeout(secs(1), ether.subscribe::<TestResource>(&key))
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(Arc::ptr_eq(&resource, &observed));

        sleep(secs(2)).await;
        assert!(ether.is_empty());
        assert_eq!(ether.pending_waiters(), 0);
        assert_eq!(ether.get::<TestResource>(&key).unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_fan_out_returns_identical_instance() {
        let ether = Ether::new();
        let resource = Arc::new(TestResource("some resource"));
        ether.put("some_key", Arc::clone(&resource), Retain::Default);

        sleep(secs(9)).await;
        for _ in 0..100 {
            let observed = ether
                .subscribe::<TestResource>("some_key")
                .await
                .unwrap()
                .unwrap();
            assert!(Arc::ptr_eq(&resource, &observed));
        }

        sleep(secs(2)).await;
        assert!(ether.is_empty());
        assert_eq!(ether.pending_waiters(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_replacement_is_not_evicted_by_old_timer() {
        let ether = Ether::new();
        let first = Arc::new(TestResource("some resource"));
        let second = Arc::new(TestResource("some resource"));

        ether.put("some_key", Arc::clone(&first), Retain::For(secs(5)));
        sleep(secs(3)).await;
        ether.put("some_key", Arc::clone(&second), Retain::Default);

        // The first timer has fired by now
        sleep(secs(3)).await;
        let observed = ether.get::<TestResource>("some_key").unwrap().unwrap();
        assert!(Arc::ptr_eq(&second, &observed));
        assert!(!Arc::ptr_eq(&first, &observed));

        // Second value's own retention ends at t=13
        sleep(secs(8)).await;
        assert!(ether.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_replacement_is_visible_to_next_subscriber() {
        let ether = Ether::new();
        ether.hold_with_key("some_key", TestResource("first"), Retain::Default);

        let observed = ether.subscribe::<TestResource>("some_key").await.unwrap();
        assert_eq!(observed.as_deref(), Some(&TestResource("first")));

        ether.hold_with_key("some_key", TestResource("second"), Retain::Default);

        let observed = ether.subscribe::<TestResource>("some_key").await.unwrap();
        assert_eq!(observed.as_deref(), Some(&TestResource("second")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hold_for_time() {
        let ether = Ether::new();
        let key = ether.hold(TestResource("my thing"), Retain::For(secs(5)));

        sleep(secs(3)).await;
        let observed = timeout(secs(1), ether.subscribe::<TestResource>(&key))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(observed.as_deref(), Some(&TestResource("my thing")));

        sleep(secs(3)).await;
        // Nothing held any more: the subscription just waits
        let late = timeout(secs(1), ether.subscribe::<TestResource>(&key)).await;
        assert!(late.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_observe_first_then_hold_for_time() {
        let ether = Ether::new();
        let pending = ether.subscribe::<TestResource>("some_key");
        assert_eq!(ether.waiters_for("some_key"), 1);

        ether.hold_with_key("some_key", TestResource("my thing"), Retain::For(secs(5)));

        let observed = pending.await.unwrap();
        assert_eq!(observed.as_deref(), Some(&TestResource("my thing")));
        // Timed values stay held after the waiters are served
        assert!(ether.contains_key("some_key"));

        sleep(secs(6)).await;
        assert_eq!(ether.get::<TestResource>("some_key").unwrap(), None);
    }

    #[tokio::test]
    async fn test_hold_until_observed_delivers_once() {
        let ether = Ether::new();
        let key = ether.hold(TestResource("my thing"), Retain::UntilObserved);

        let observed = ether.subscribe::<TestResource>(&key).await.unwrap();
        assert_eq!(observed.as_deref(), Some(&TestResource("my thing")));

        assert!(ether.is_empty());
        assert_eq!(ether.pending_waiters(), 0);
        assert_eq!(ether.get::<TestResource>(&key).unwrap(), None);
    }

    #[tokio::test]
    async fn test_hold_until_observed_get_once() {
        let ether = Ether::new();
        ether.hold_with_key("some_key", TestResource("my thing"), Retain::UntilObserved);

        assert_eq!(
            ether.get::<TestResource>("some_key").unwrap().as_deref(),
            Some(&TestResource("my thing"))
        );
        assert_eq!(ether.get::<TestResource>("some_key").unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_observe_first_then_hold_until_observed() {
        let ether = Ether::new();
        let pending = ether.subscribe::<TestResource>("some_key");

        ether.hold_with_key("some_key", TestResource("my thing"), Retain::UntilObserved);

        let observed = pending.await.unwrap();
        assert_eq!(observed.as_deref(), Some(&TestResource("my thing")));
        assert!(ether.is_empty());
        assert_eq!(ether.pending_waiters(), 0);

        // A second subscriber finds nothing and keeps waiting
        let late = timeout(secs(1), ether.subscribe::<TestResource>("some_key")).await;
        assert!(late.is_err());
    }

    #[tokio::test]
    async fn test_all_waiters_receive_until_observed_value() {
        let ether = Ether::new();
        let pending: Vec<_> = (0..10)
            .map(|_| ether.subscribe::<TestResource>("some_key"))
            .collect();
        assert_eq!(ether.waiters_for("some_key"), 10);

        let resource = Arc::new(TestResource("burst"));
        ether.put("some_key", Arc::clone(&resource), Retain::UntilObserved);

        for observed in join_all(pending).await {
            let observed = observed.unwrap().unwrap();
            assert!(Arc::ptr_eq(&resource, &observed));
        }
        assert!(ether.is_empty());
        assert_eq!(ether.pending_waiters(), 0);
    }

    #[tokio::test]
    async fn test_flush_clears_values_and_waiters() {
        let ether = Ether::new();
        ether.hold_with_key("timed", TestResource("a"), Retain::Default);
        ether.hold_with_key("once", TestResource("b"), Retain::UntilObserved);
        let pending = ether.subscribe::<TestResource>("missing");

        let stats = ether.flush();

        assert_eq!(stats.resources, 2);
        assert_eq!(stats.waiters, 1);
        assert_eq!(pending.await.unwrap(), None);
        assert_eq!(ether.get::<TestResource>("timed").unwrap(), None);
        assert_eq!(ether.get::<TestResource>("once").unwrap(), None);
        assert!(ether.is_empty());
    }

    #[tokio::test]
    async fn test_get_wrong_type_is_mismatch_and_consumes() {
        let ether = Ether::new();
        ether.hold_with_key("some_key", TestResource("x"), Retain::UntilObserved);

        let err = ether.get::<String>("some_key").unwrap_err();
        assert!(err.is_type_mismatch());
        assert_eq!(ether.get::<TestResource>("some_key").unwrap(), None);
    }

    #[tokio::test]
    async fn test_subscribe_wrong_type_is_mismatch() {
        let ether = Ether::new();
        ether.hold_with_key("some_key", 7u32, Retain::Default);

        let err = ether.subscribe::<i64>("some_key").await.unwrap_err();
        assert!(err.is_type_mismatch());
        // Timed value is untouched by the failed read
        assert_eq!(ether.get::<u32>("some_key").unwrap().as_deref(), Some(&7));
    }

    #[tokio::test]
    async fn test_get_handle_is_untyped() {
        let ether = Ether::new();
        let value: Handle = Arc::new(String::from("opaque"));
        ether.put_handle("some_key", Arc::clone(&value), Retain::UntilObserved);

        let observed = ether.get_handle("some_key").unwrap();
        assert!(Arc::ptr_eq(&value, &observed));
        assert!(ether.get_handle("some_key").is_none());
    }

    #[tokio::test]
    async fn test_generated_keys_are_unique() {
        let ether = Ether::new();
        let keys: std::collections::HashSet<String> = (0..100)
            .map(|i| ether.hold(i, Retain::UntilObserved))
            .collect();

        assert_eq!(keys.len(), 100);
        assert_eq!(ether.len(), 100);
        assert!(keys.iter().all(|key| Uuid::parse_str(key).is_ok()));
    }

    #[tokio::test]
    async fn test_clone_shares_data() {
        let ether1 = Ether::new();
        let ether2 = ether1.clone();

        let pending = ether2.subscribe::<u32>("key1");
        ether1.hold_with_key("key1", 1u32, Retain::UntilObserved);

        assert_eq!(pending.await.unwrap().as_deref(), Some(&1));
    }

    #[tokio::test]
    async fn test_drop_resolves_pending_subscriptions() {
        let ether = Ether::new();
        let pending = ether.subscribe::<u32>("key1");

        drop(ether);

        assert_eq!(pending.await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_keeps_timed_values() {
        let ether = Ether::new();
        ether.hold_with_key("before", 1u32, Retain::For(secs(1)));

        ether.shutdown();
        ether.hold_with_key("after", 2u32, Retain::For(secs(1)));

        sleep(secs(5)).await;
        assert!(ether.contains_key("before"));
        assert!(ether.contains_key("after"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_default_retention() {
        let config = EtherConfig::default().with_default_retention(secs(2));
        let ether = Ether::with_config(config);
        ether.hold_with_key("key1", 1u32, Retain::Default);

        sleep(secs(1)).await;
        assert!(ether.contains_key("key1"));

        sleep(secs(2)).await;
        assert!(!ether.contains_key("key1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_extreme_retention_does_not_panic() {
        let ether = Ether::new();
        ether.hold_with_key("key1", 1u32, Retain::For(Duration::MAX));

        sleep(secs(60)).await;
        assert!(ether.contains_key("key1"));
    }

    #[test]
    fn test_timed_without_runtime_never_expires() {
        let ether = Ether::new();
        ether.hold_with_key("key1", 1u32, Retain::For(Duration::from_millis(1)));

        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(ether.get::<u32>("key1").unwrap().as_deref(), Some(&1));
    }

    #[test]
    fn test_timed_put_expires_after_construction_runtime_is_gone() {
        let first = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let ether = first.block_on(async { Ether::new() });
        drop(first);

        let second = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        second.block_on(async {
            ether.hold_with_key("key1", 1u32, Retain::For(Duration::from_millis(10)));
            sleep(Duration::from_millis(100)).await;
        });

        assert!(!ether.contains_key("key1"));
    }

    #[test]
    fn test_concurrent_waiters_all_receive_until_observed_value() {
        use std::sync::Barrier;

        const WAITERS: usize = 8;
        let ether = Ether::new();
        let barrier = Arc::new(Barrier::new(WAITERS + 1));
        let mut handles = vec![];

        for _ in 0..WAITERS {
            let ether = ether.clone();
            let barrier = Arc::clone(&barrier);
            handles.push(std::thread::spawn(move || {
                let pending = ether.subscribe::<TestResource>("some_key");
                barrier.wait();
                pending.blocking_wait().unwrap()
            }));
        }

        barrier.wait();
        assert_eq!(ether.waiters_for("some_key"), WAITERS);

        let resource = Arc::new(TestResource("burst"));
        ether.put("some_key", Arc::clone(&resource), Retain::UntilObserved);

        for handle in handles {
            let observed = handle.join().expect("Thread panicked").unwrap();
            assert!(Arc::ptr_eq(&resource, &observed));
        }
        assert!(ether.is_empty());
        assert_eq!(ether.pending_waiters(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_key_waits_while_flushed_request_ends_empty() {
        let ether = Ether::new();

        // Nothing held yet: the subscription keeps waiting, it does not end with None
        let waiting = timeout(secs(1), ether.subscribe::<u32>("missing")).await;
        assert!(waiting.is_err());

        let pending = ether.subscribe::<u32>("missing");
        ether.flush();
        assert_eq!(pending.await.unwrap(), None);
    }

    #[test]
    fn test_handoff_across_threads() {
        let ether = Ether::new();
        let pending = ether.subscribe::<String>("key1");

        let producer = {
            let ether = ether.clone();
            std::thread::spawn(move || {
                ether.hold_with_key("key1", String::from("from producer"), Retain::UntilObserved)
            })
        };

        let observed = pending.blocking_wait().unwrap();
        assert_eq!(observed.as_deref().map(String::as_str), Some("from producer"));
        assert_eq!(producer.join().expect("Thread panicked"), "key1");
        assert!(ether.is_empty());
    }

    #[test]
    fn test_retain_resolution() {
        let config = EtherConfig::default();
        assert_eq!(Retain::default(), Retain::Default);
        assert_eq!(
            Retain::Default.resolve(&config),
            RetainPolicy::Timed(secs(10))
        );
        assert_eq!(
            Retain::For(secs(3)).resolve(&config),
            RetainPolicy::Timed(secs(3))
        );
        assert_eq!(
            Retain::For(Duration::MAX).resolve(&config),
            RetainPolicy::Timed(MAX_RETENTION)
        );
        assert_eq!(
            Retain::UntilObserved.resolve(&config),
            RetainPolicy::UntilObserved
        );
    }
}
