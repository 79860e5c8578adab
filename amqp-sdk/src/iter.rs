//! Blocking iterator over session notifications
//!
//! Lets sync callers follow connection state changes and subscription
//! confirmations without async/await.

use std::sync::{mpsc, Arc};
use std::time::{Duration, Instant};

use amqp_lifecycle::LifecycleEvent;
use parking_lot::Mutex;

/// Blocking iterator over [`LifecycleEvent`]s
///
/// `next()` blocks until a notification arrives or the session shuts down.
/// Clones share one queue, so each notification is seen by exactly one of them.
///
/// A clone blocked in [`recv`](Self::recv) holds the queue until it returns.
/// Meanwhile [`try_recv`](Self::try_recv) on another clone returns `None`
/// immediately and [`recv_timeout`](Self::recv_timeout) waits at most its
/// timeout.
pub struct SessionEventIterator {
    rx: Arc<Mutex<mpsc::Receiver<LifecycleEvent>>>,
}

impl SessionEventIterator {
    pub(crate) fn new(rx: Arc<Mutex<mpsc::Receiver<LifecycleEvent>>>) -> Self {
        Self { rx }
    }

    /// Block until a notification is available
    ///
    /// Returns `None` once the session has shut down.
    pub fn recv(&self) -> Option<LifecycleEvent> {
        self.rx.lock().recv().ok()
    }

    /// Returns `None` if nothing is queued or another clone is receiving.
    pub fn try_recv(&self) -> Option<LifecycleEvent> {
        self.rx.try_lock()?.try_recv().ok()
    }

    /// Block for up to `timeout`, including any wait for another clone.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<LifecycleEvent> {
        let deadline = Instant::now() + timeout;
        let rx = self.rx.try_lock_until(deadline)?;
        rx.recv_timeout(deadline.saturating_duration_since(Instant::now()))
            .ok()
    }

    /// Drain the notifications queued right now without blocking.
    pub fn try_iter(&self) -> TryIterator<'_> {
        TryIterator { inner: self }
    }

    /// Blocking iterator that ends after `timeout` passes with no notification.
    pub fn timeout_iter(&self, timeout: Duration) -> TimeoutIterator<'_> {
        TimeoutIterator {
            inner: self,
            timeout,
        }
    }
}

impl Iterator for SessionEventIterator {
    type Item = LifecycleEvent;

    fn next(&mut self) -> Option<Self::Item> {
        self.recv()
    }
}

impl Clone for SessionEventIterator {
    fn clone(&self) -> Self {
        Self {
            rx: Arc::clone(&self.rx),
        }
    }
}

/// Non-blocking iterator over queued notifications
pub struct TryIterator<'a> {
    inner: &'a SessionEventIterator,
}

impl<'a> Iterator for TryIterator<'a> {
    type Item = LifecycleEvent;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.try_recv()
    }
}

/// Blocking iterator with a per-item timeout
pub struct TimeoutIterator<'a> {
    inner: &'a SessionEventIterator,
    timeout: Duration,
}

impl<'a> Iterator for TimeoutIterator<'a> {
    type Item = LifecycleEvent;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.recv_timeout(self.timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use amqp_lifecycle::ConnectionState;

    fn iterator() -> (mpsc::Sender<LifecycleEvent>, SessionEventIterator) {
        let (tx, rx) = mpsc::channel();
        (tx, SessionEventIterator::new(Arc::new(Mutex::new(rx))))
    }

    fn state_change(to: ConnectionState) -> LifecycleEvent {
        LifecycleEvent::StateChanged {
            from: ConnectionState::Disconnected,
            to,
        }
    }

    #[test]
    fn test_try_recv_empty() {
        let (_tx, iter) = iterator();
        assert!(iter.try_recv().is_none());
    }

    #[test]
    fn test_recv_timeout_empty() {
        let (_tx, iter) = iterator();

        let start = std::time::Instant::now();
        assert!(iter.recv_timeout(Duration::from_millis(50)).is_none());
        assert!(start.elapsed() >= Duration::from_millis(45));
    }

    #[test]
    fn test_try_iter_drains_queue() {
        let (tx, iter) = iterator();
        tx.send(state_change(ConnectionState::Connecting)).unwrap();
        tx.send(state_change(ConnectionState::Connected)).unwrap();

        let events: Vec<_> = iter.try_iter().collect();
        assert_eq!(events.len(), 2);
        assert!(iter.try_recv().is_none());
    }

    #[test]
    fn test_iteration_ends_when_sender_dropped() {
        let (tx, iter) = iterator();
        tx.send(state_change(ConnectionState::Connecting)).unwrap();
        drop(tx);

        let events: Vec<_> = iter.collect();
        assert_eq!(events, vec![state_change(ConnectionState::Connecting)]);
    }

    #[test]
    fn test_clones_share_queue() {
        let (tx, first) = iterator();
        let second = first.clone();
        tx.send(state_change(ConnectionState::Connected)).unwrap();

        assert!(second.try_recv().is_some());
        assert!(first.try_recv().is_none());
    }

    #[test]
    fn test_clone_does_not_wait_on_blocked_receiver() {
        let (tx, first) = iterator();
        let second = first.clone();

        let blocked = std::thread::spawn(move || first.recv());
        std::thread::sleep(Duration::from_millis(50));

        let start = Instant::now();
        assert!(second.try_recv().is_none());
        assert!(second.recv_timeout(Duration::from_millis(50)).is_none());
        assert!(start.elapsed() < Duration::from_millis(500));

        tx.send(state_change(ConnectionState::Connected)).unwrap();
        assert_eq!(
            blocked.join().unwrap(),
            Some(state_change(ConnectionState::Connected))
        );
    }
}
