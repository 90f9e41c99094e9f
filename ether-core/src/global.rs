//! Optional process-wide default store.
//!
//! Nothing is created implicitly: call [`init`] once at startup and
//! [`teardown`] when the process segment ends. Code that can be handed an
//! [`Ether`] directly should prefer that.

use parking_lot::RwLock;

use crate::config::EtherConfig;
use crate::engine::FlushStats;
use crate::ether::Ether;

static DEFAULT: RwLock<Option<Ether>> = parking_lot::const_rwlock(None);

/// Installs a new default store and returns a handle to it.
///
/// A previously installed store is torn down first.
pub fn init(config: EtherConfig) -> Ether {
    let ether = Ether::with_config(config);
    let previous = DEFAULT.write().replace(ether.clone());
    if let Some(previous) = previous {
        tracing::warn!("Replacing existing default ether");
        previous.flush();
        previous.shutdown();
    }
    ether
}

/// Returns the default store, if one is installed
pub fn get() -> Option<Ether> {
    DEFAULT.read().clone()
}

/// Removes the default store, flushing it and stopping its timers.
///
/// Returns what the flush discarded, or `None` if nothing was installed.
/// Handles obtained earlier keep working but see an empty store.
pub fn teardown() -> Option<FlushStats> {
    let ether = DEFAULT.write().take()?;
    let stats = ether.flush();
    ether.shutdown();
    Some(stats)
}
