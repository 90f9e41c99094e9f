use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use crate::error::EtherError;

/// Opaque shared handle to a stored value.
///
/// The ether never copies or frees the value itself; it only holds and drops
/// its own reference.
pub type Handle = Arc<dyn Any + Send + Sync>;

/// Retention policy of a stored resource, with any default already resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RetainPolicy {
    /// Removed automatically once the duration elapses
    Timed(Duration),
    /// Removed the first time it is delivered to a consumer
    UntilObserved,
}

/// Immutable record of a value held under a key
#[derive(Clone)]
pub(crate) struct Resource {
    key: String,
    value: Handle,
    policy: RetainPolicy,
    generation: u64,
}

impl Resource {
    pub(crate) fn new(key: String, value: Handle, policy: RetainPolicy, generation: u64) -> Self {
        Self {
            key,
            value,
            policy,
            generation,
        }
    }

    pub(crate) fn key(&self) -> &str {
        &self.key
    }

    /// Returns a shared reference to the stored value (zero-cost clone)
    pub(crate) fn value_shared(&self) -> Handle {
        Arc::clone(&self.value)
    }

    pub(crate) fn into_value(self) -> Handle {
        self.value
    }

    pub(crate) fn policy(&self) -> RetainPolicy {
        self.policy
    }

    /// Identity of this record; unique for the lifetime of the store
    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    /// Checks if this record is consumed by its first delivery
    pub(crate) fn is_consumed_on_delivery(&self) -> bool {
        self.policy == RetainPolicy::UntilObserved
    }
}

/// Recovers a typed reference from an opaque handle read under `key`
pub(crate) fn downcast<T: Any + Send + Sync>(key: &str, value: Handle) -> Result<Arc<T>, EtherError> {
    value
        .downcast::<T>()
        .map_err(|_| EtherError::type_mismatch::<T>(key))
}

impl std::fmt::Debug for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resource")
            .field("key", &self.key)
            .field("policy", &self.policy)
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}
