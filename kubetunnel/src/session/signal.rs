//! One-shot broadcast signal.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;

/// A set-once flag that wakes every waiter when set.
///
/// Firing more than once is allowed and has no further effect. Clones share
/// the same flag.
#[derive(Clone, Debug, Default)]
pub struct Signal {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    fired: AtomicBool,
    notify: Notify,
}

impl Signal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the flag and wake all waiters.
    ///
    /// Returns true only for the call that actually set it.
    pub fn fire(&self) -> bool {
        if self.inner.fired.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.inner.notify.notify_waiters();
        true
    }

    pub fn is_fired(&self) -> bool {
        self.inner.fired.load(Ordering::SeqCst)
    }

    /// Wait until the signal fires. Returns immediately if it already has.
    pub async fn wait(&self) {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            // Register before checking the flag so a concurrent fire() is not missed
            notified.as_mut().enable();

            if self.is_fired() {
                return;
            }
            notified.await;
        }
    }
}

/// Fires the wrapped signal when dropped, including on panic unwind.
pub(crate) struct FireOnDrop(pub(crate) Signal);

impl Drop for FireOnDrop {
    fn drop(&mut self) {
        self.0.fire();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_fire_once() {
        let signal = Signal::new();
        assert!(!signal.is_fired());
        assert!(signal.fire());
        assert!(!signal.fire());
        assert!(signal.is_fired());
    }

    #[test]
    fn test_clones_share_flag() {
        let signal = Signal::new();
        let clone = signal.clone();
        clone.fire();
        assert!(signal.is_fired());
    }

    #[tokio::test]
    async fn test_wait_after_fire_returns() {
        let signal = Signal::new();
        signal.fire();
        tokio::time::timeout(Duration::from_secs(1), signal.wait())
            .await
            .expect("wait should return immediately");
    }

    #[tokio::test]
    async fn test_fire_wakes_all_waiters() {
        let signal = Signal::new();
        let waiters: Vec<_> = (0..4)
            .map(|_| {
                let s = signal.clone();
                tokio::spawn(async move { s.wait().await })
            })
            .collect();

        tokio::time::sleep(Duration::from_millis(20)).await;
        signal.fire();

        for waiter in waiters {
            tokio::time::timeout(Duration::from_secs(1), waiter)
                .await
                .expect("waiter not woken")
                .unwrap();
        }
    }

    #[test]
    fn test_fire_on_drop() {
        let signal = Signal::new();
        {
            let _guard = FireOnDrop(signal.clone());
            assert!(!signal.is_fired());
        }
        assert!(signal.is_fired());
    }
}
