//! # Ether Core
//!
//! An in-process transient object store for handing a value from one part of
//! a program to another part that may not be listening yet.
//!
//! ## Features
//!
//! - Thread-safe storage: stored values and pending subscriptions share one lock
//! - Timed retention with automatic expiry (default 10 seconds)
//! - "Until observed" retention: removed on first delivery
//! - Subscriptions that resolve exactly once, immediately or on a later put
//! - Values are shared `Arc`s, never copied
//!
//! ## Example
//!
//! ```rust,no_run
//! use ether_core::{Ether, EtherConfig, Retain};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     // Create store with default config (10 second default retention)
//!     let ether = Ether::new();
//!
//!     // Or with custom default retention
//!     let config = EtherConfig::default()
//!         .with_default_retention(Duration::from_secs(30));
//!     let ether = Ether::with_config(config);
//!
//!     // Hand off a value under a generated key, held until someone reads it
//!     let key = ether.hold(String::from("payload"), Retain::UntilObserved);
//!
//!     // Read it from elsewhere; the read removes it
//!     let payload = ether.subscribe::<String>(&key).await.unwrap();
//!     assert!(payload.is_some());
//!
//!     // Administrative reset
//!     ether.flush();
//! }
//! ```

mod config;
mod engine;
mod error;
mod ether;
pub mod global;
mod resource;
mod subscription;
mod timer;

pub use config::{EtherConfig, DEFAULT_RETENTION, DEFAULT_RETENTION_ENV, MAX_RETENTION};
pub use engine::FlushStats;
pub use error::EtherError;
pub use ether::{Ether, Retain};
pub use resource::Handle;
pub use subscription::Subscription;
