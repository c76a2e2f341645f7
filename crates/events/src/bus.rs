//! Notification publishing/subscription abstraction (mechanics only).
//!
//! The bus distributes notifications (e.g. "role changed") to every open
//! session of an identity so that sibling tabs and server instances converge.
//!
//! ## Delivery
//!
//! - **Advisory**: a subscriber that is gone (closed tab, dropped stream) simply
//!   misses the message. Correctness never depends on delivery, because the next
//!   resolution call re-reads the durable state.
//! - **No ordering across publishers**: concurrent publishers may interleave.
//! - **No persistence**: the bus is for distribution, not storage.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Receiver;
use std::time::Duration;

/// A subscription to a notification stream.
///
/// Each subscription gets a copy of every message published after it was
/// created (broadcast semantics).
///
/// ```ignore
/// let subscription = bus.subscribe();
///
/// loop {
///     match subscription.recv_timeout(Duration::from_secs(1)) {
///         Ok(message) => forward(message),
///         Err(std::sync::mpsc::RecvTimeoutError::Timeout) => continue,
///         Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => break,
///     }
/// }
/// ```
///
/// Subscriptions are designed for single-threaded consumption.
#[derive(Debug)]
pub struct Subscription<M> {
    receiver: Receiver<M>,
    open: Arc<AtomicBool>,
}

impl<M> Subscription<M> {
    pub fn new(receiver: Receiver<M>) -> Self {
        Self {
            receiver,
            open: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Handle a producer can poll to notice the subscription was dropped
    /// without having to send a message first.
    pub fn liveness(&self) -> SubscriptionLiveness {
        SubscriptionLiveness(self.open.clone())
    }

    /// Block until the next message is available.
    pub fn recv(&self) -> Result<M, std::sync::mpsc::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive a message without blocking.
    pub fn try_recv(&self) -> Result<M, std::sync::mpsc::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Block for up to `timeout` waiting for a message.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<M, std::sync::mpsc::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }
}

impl<M> Drop for Subscription<M> {
    fn drop(&mut self) {
        self.open.store(false, Ordering::Release);
    }
}

/// Producer-side view of whether a [`Subscription`] is still held.
#[derive(Debug, Clone)]
pub struct SubscriptionLiveness(Arc<AtomicBool>);

impl SubscriptionLiveness {
    pub fn is_open(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Transport-agnostic pub/sub bus.
///
/// Implementations may be in-process channels, Redis pub/sub, or anything else
/// that can fan a message out to subscribers. `publish()` failures are surfaced
/// to the caller, which decides whether they matter (role-change notifications
/// are advisory and only logged).
pub trait EventBus<M>: Send + Sync {
    type Error: core::fmt::Debug + Send + Sync + 'static;

    fn publish(&self, message: M) -> Result<(), Self::Error>;

    fn subscribe(&self) -> Subscription<M>;
}

impl<M, B> EventBus<M> for Arc<B>
where
    B: EventBus<M> + ?Sized,
{
    type Error = B::Error;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        (**self).publish(message)
    }

    fn subscribe(&self) -> Subscription<M> {
        (**self).subscribe()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;

    use super::*;

    #[test]
    fn liveness_tracks_the_subscription() {
        let (_tx, rx) = mpsc::channel::<u8>();
        let subscription = Subscription::new(rx);
        let liveness = subscription.liveness();
        assert!(liveness.is_open());

        drop(subscription);
        assert!(!liveness.is_open());
    }
}
