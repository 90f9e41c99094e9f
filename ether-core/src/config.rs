use std::time::Duration;

/// Environment variable read by [`EtherConfig::from_env`]
pub const DEFAULT_RETENTION_ENV: &str = "ETHER_DEFAULT_RETENTION_SECS";

/// Retention used by [`Retain::Default`](crate::Retain::Default) unless configured
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(10);

/// Longest retention honoured; longer requests are capped (~100 years)
pub const MAX_RETENTION: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// Configuration for an [`Ether`](crate::Ether) store
///
/// # Example
///
/// ```rust
/// use ether_core::EtherConfig;
/// use std::time::Duration;
///
/// let config = EtherConfig::default()
///     .with_default_retention(Duration::from_secs(30));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EtherConfig {
    /// How long a value stored with the default retention is held (default: 10 seconds)
    pub default_retention: Duration,
}

impl Default for EtherConfig {
    fn default() -> Self {
        Self {
            default_retention: DEFAULT_RETENTION,
        }
    }
}

impl EtherConfig {
    /// Creates a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the default retention
    ///
    /// Values above [`MAX_RETENTION`] are capped.
    pub fn with_default_retention(mut self, retention: Duration) -> Self {
        self.default_retention = retention.min(MAX_RETENTION);
        self
    }

    /// Create configuration from environment variables.
    ///
    /// Reads:
    /// - `ETHER_DEFAULT_RETENTION_SECS` - default retention in whole seconds
    ///   (falls back to 10 when missing or not a number)
    pub fn from_env() -> Self {
        let config = Self::default();
        match std::env::var(DEFAULT_RETENTION_ENV) {
            Ok(raw) => match raw.trim().parse::<u64>() {
                Ok(secs) => config.with_default_retention(Duration::from_secs(secs)),
                Err(_) => {
                    tracing::warn!(
                        "Ignoring {}={:?}: not a whole number of seconds",
                        DEFAULT_RETENTION_ENV,
                        raw
                    );
                    config
                }
            },
            Err(_) => config,
        }
    }
}
