use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::Notify;

#[derive(Debug, Default)]
struct Inner {
    pending: AtomicUsize,
    settled: Notify,
}

/// Counts reactive emissions still in flight after a construction hook returned.
///
/// Hooks that hand work to background streams take a guard per emission; the
/// pipeline's flush waits until every guard has been dropped.
#[derive(Debug, Default, Clone)]
pub struct EmissionTracker {
    inner: Arc<Inner>,
}

impl EmissionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track(&self) -> EmissionGuard {
        self.inner.pending.fetch_add(1, Ordering::AcqRel);
        EmissionGuard {
            inner: Arc::clone(&self.inner),
        }
    }

    pub fn pending(&self) -> usize {
        self.inner.pending.load(Ordering::Acquire)
    }

    /// Resolves once no emission guard is alive.
    pub async fn settled(&self) {
        loop {
            let notified = self.inner.settled.notified();
            if self.pending() == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// Marks one in-flight emission; dropping it settles the emission.
#[must_use = "the emission settles as soon as the guard is dropped"]
#[derive(Debug)]
pub struct EmissionGuard {
    inner: Arc<Inner>,
}

impl Drop for EmissionGuard {
    fn drop(&mut self) {
        if self.inner.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.inner.settled.notify_waiters();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn settled_returns_immediately_without_guards() {
        let tracker = EmissionTracker::new();
        tokio::time::timeout(Duration::from_secs(1), tracker.settled())
            .await
            .expect("no pending emissions");
    }

    #[tokio::test]
    async fn settled_waits_for_every_guard() {
        let tracker = EmissionTracker::new();
        let first = tracker.track();
        let second = tracker.track();
        assert_eq!(tracker.pending(), 2);

        let task = tokio::spawn({
            let tracker = tracker.clone();
            async move { tracker.settled().await }
        });

        drop(first);
        tokio::task::yield_now().await;
        assert!(!task.is_finished());

        drop(second);
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("settled after last guard")
            .expect("task should not panic");
        assert_eq!(tracker.pending(), 0);
    }
}
