//! Single-notification handoff between the engine and one consumer.
//!
//! The engine keeps the sending half ([`Waiter`]); the consumer holds the
//! receiving half ([`Subscription`]). Delivery consumes the waiter, so a
//! subscription resolves at most once: either with the value, or with
//! `None` when the engine drops the waiter without delivering (flush,
//! expiry of the key, or the store going away).

use std::any::Any;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use crate::error::EtherError;
use crate::resource::{downcast, Handle};

/// Creates a connected waiter / subscription pair for `key`
pub(crate) fn channel<T>(key: &str) -> (Waiter, Subscription<T>) {
    let (tx, rx) = oneshot::channel();
    (
        Waiter { tx },
        Subscription {
            key: key.to_string(),
            rx,
            _marker: PhantomData,
        },
    )
}

/// Engine-side half of a subscription
#[derive(Debug)]
pub(crate) struct Waiter {
    tx: oneshot::Sender<Handle>,
}

impl Waiter {
    /// Hands `value` to the consumer.
    ///
    /// Returns `false` if the consumer already dropped its subscription.
    pub(crate) fn deliver(self, value: Handle) -> bool {
        self.tx.send(value).is_ok()
    }

    /// Checks if the consumer has dropped its subscription
    pub(crate) fn is_abandoned(&self) -> bool {
        self.tx.is_closed()
    }
}

/// A pending read of a key, resolving exactly once.
///
/// Await it for `Ok(Some(value))` once a value is available. A value of a
/// different type than `T` resolves to [`EtherError::TypeMismatch`].
///
/// `Ok(None)` never means "nothing is held under the key": a subscription
/// on an empty key simply keeps waiting. It means the ether abandoned the
/// request without a value, because the store was flushed, the key expired
/// while the request was pending, or the store itself was dropped.
///
/// The ether enforces no timeout; wrap the subscription in
/// `tokio::time::timeout` if the consumer should give up. Dropping the
/// subscription abandons the request.
///
/// # Example
///
/// ```rust,no_run
/// use ether_core::{Ether, Retain};
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() {
///     let ether = Ether::new();
///     let pending = ether.subscribe::<String>("greeting");
///
///     ether.put("greeting", Arc::new(String::from("hello")), Retain::UntilObserved);
///
///     let greeting = pending.await.unwrap();
///     assert_eq!(greeting.as_deref().map(String::as_str), Some("hello"));
/// }
/// ```
#[must_use = "a subscription does nothing unless awaited"]
#[derive(Debug)]
pub struct Subscription<T> {
    key: String,
    rx: oneshot::Receiver<Handle>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Any + Send + Sync> Subscription<T> {
    /// Returns the key this subscription is waiting on
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Blocks the current thread until the subscription resolves.
    ///
    /// # Panics
    ///
    /// Panics if called from within an asynchronous execution context.
    /// Use `.await` there instead.
    pub fn blocking_wait(self) -> Result<Option<Arc<T>>, EtherError> {
        match self.rx.blocking_recv() {
            Ok(value) => downcast(&self.key, value).map(Some),
            Err(_) => Ok(None),
        }
    }
}

impl<T: Any + Send + Sync> Future for Subscription<T> {
    type Output = Result<Option<Arc<T>>, EtherError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match Pin::new(&mut this.rx).poll(cx) {
            Poll::Ready(Ok(value)) => Poll::Ready(downcast(&this.key, value).map(Some)),
            Poll::Ready(Err(_)) => Poll::Ready(Ok(None)),
            Poll::Pending => Poll::Pending,
        }
    }
}
