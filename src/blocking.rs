//! The blocking-wait subsystem (spec.md §4.E), serving BLPOP/BRPOP and
//! XREAD BLOCK.
//!
//! The teacher has no equivalent — its blocking commands are stubbed or
//! absent — so this is grounded on spec.md's own FIFO-fairness and
//! deadline-timeout rules, built with `tokio::sync::Notify` the way the
//! rest of this crate's connection engine is built on tokio rather than the
//! teacher's hand-rolled event loop (`ae.rs`).

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::timeout;

use crate::events::EventSink;

/// Per-key FIFO queues of clients parked waiting for data to appear.
#[derive(Default)]
pub struct BlockingManager {
    waiters: std::sync::Mutex<HashMap<Vec<u8>, VecDeque<Arc<Notify>>>>,
}

impl BlockingManager {
    pub fn new() -> Self {
        BlockingManager {
            waiters: std::sync::Mutex::new(HashMap::new()),
        }
    }

    /// Registers interest in `keys` and returns a handle to wait on. Must be
    /// called, and the handle awaited, without releasing control back to the
    /// caller in between, or a wakeup fired after registration but before
    /// the wait begins would be missed.
    fn register(&self, keys: &[Vec<u8>]) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        let mut waiters = self.waiters.lock().unwrap();
        for key in keys {
            waiters
                .entry(key.clone())
                .or_default()
                .push_back(notify.clone());
        }
        notify
    }

    fn unregister(&self, keys: &[Vec<u8>], notify: &Arc<Notify>) {
        let mut waiters = self.waiters.lock().unwrap();
        for key in keys {
            if let Some(q) = waiters.get_mut(key) {
                q.retain(|n| !Arc::ptr_eq(n, notify));
                if q.is_empty() {
                    waiters.remove(key);
                }
            }
        }
    }

    /// Blocks the caller until `try_once` returns `Some`, a notification for
    /// one of `keys` arrives and `try_once` succeeds on retry, or
    /// `deadline` elapses (`None` means no timeout, per BLPOP's `0` timeout
    /// convention). `try_once` must be cheap and side-effect-free on
    /// failure, since it can be called repeatedly.
    pub async fn wait_for<T>(
        &self,
        keys: &[Vec<u8>],
        deadline: Option<Duration>,
        mut try_once: impl FnMut() -> Option<T>,
    ) -> Option<T> {
        if let Some(v) = try_once() {
            return Some(v);
        }
        let notify = self.register(keys);
        let result = loop {
            let wait = notify.notified();
            if let Some(v) = try_once() {
                break Some(v);
            }
            match deadline {
                None => {
                    wait.await;
                }
                Some(d) => match timeout(d, wait).await {
                    Ok(()) => {}
                    Err(_) => break try_once(),
                },
            }
            match try_once() {
                Some(v) => break Some(v),
                None => self.advance(keys, &notify),
            }
        };
        self.unregister(keys, &notify);
        result
    }

    /// Wakes only the head of `key`'s queue, so waiters are served in
    /// registration order instead of all racing each other for the store
    /// lock on retry.
    fn wake(&self, key: &[u8]) {
        let waiters = self.waiters.lock().unwrap();
        if let Some(q) = waiters.get(key) {
            if let Some(n) = q.front() {
                n.notify_one();
            }
        }
    }

    /// Called by a waiter whose post-wakeup retry found nothing, to pass the
    /// wakeup on to the next waiter behind it in each key's queue rather than
    /// leaving it parked until some later, unrelated event.
    fn advance(&self, keys: &[Vec<u8>], notify: &Arc<Notify>) {
        let waiters = self.waiters.lock().unwrap();
        for key in keys {
            if let Some(q) = waiters.get(key) {
                if let Some(pos) = q.iter().position(|n| Arc::ptr_eq(n, notify)) {
                    if let Some(next) = q.get(pos + 1) {
                        next.notify_one();
                    }
                }
            }
        }
    }
}

impl EventSink for BlockingManager {
    fn data_added(&self, key: &[u8]) {
        self.wake(key);
    }

    fn data_removed(&self, _key: &[u8]) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[tokio::test]
    async fn wait_for_returns_immediately_when_already_available() {
        let mgr = BlockingManager::new();
        let got = mgr.wait_for(&[b"k".to_vec()], None, || Some(42)).await;
        assert_eq!(got, Some(42));
    }

    #[tokio::test]
    async fn wait_for_wakes_on_data_added() {
        let mgr = Arc::new(BlockingManager::new());
        let ready = Arc::new(AtomicBool::new(false));
        let mgr2 = mgr.clone();
        let ready2 = ready.clone();
        let handle = tokio::spawn(async move {
            mgr2.wait_for(&[b"k".to_vec()], None, || {
                if ready2.load(Ordering::SeqCst) {
                    Some(1)
                } else {
                    None
                }
            })
            .await
        });
        tokio::task::yield_now().await;
        ready.store(true, Ordering::SeqCst);
        mgr.data_added(b"k");
        let got = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got, Some(1));
    }

    #[tokio::test]
    async fn wake_only_notifies_the_head_and_it_advances_on_a_failed_retry() {
        let mgr = Arc::new(BlockingManager::new());
        let can_take = Arc::new(AtomicBool::new(false));

        // Registers first but can never claim anything, so on wake it must
        // pass the notification along rather than hold onto it.
        let mgr_a = mgr.clone();
        let a = tokio::spawn(async move {
            mgr_a
                .wait_for(&[b"k".to_vec()], Some(Duration::from_millis(50)), || None::<i32>)
                .await
        });
        tokio::task::yield_now().await;

        let mgr_b = mgr.clone();
        let can_take_b = can_take.clone();
        let b = tokio::spawn(async move {
            mgr_b
                .wait_for(&[b"k".to_vec()], None, || {
                    can_take_b.load(Ordering::SeqCst).then_some(7)
                })
                .await
        });
        tokio::task::yield_now().await;

        can_take.store(true, Ordering::SeqCst);
        mgr.data_added(b"k");

        let got_b = tokio::time::timeout(Duration::from_secs(1), b)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got_b, Some(7));

        let got_a = tokio::time::timeout(Duration::from_secs(1), a)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got_a, None);
    }

    #[tokio::test]
    async fn wait_for_times_out() {
        let mgr = BlockingManager::new();
        let got: Option<i32> = mgr
            .wait_for(&[b"k".to_vec()], Some(Duration::from_millis(20)), || None)
            .await;
        assert_eq!(got, None);
    }
}
