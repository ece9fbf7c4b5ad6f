use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{Notify, Semaphore};
use tokio::task::JoinHandle;

/// The hard ceiling on default fetch concurrency, so a remote store is never flooded.
pub const MAX_DEFAULT_CONCURRENCY: usize = 16;

/// Fetches allowed per hardware thread by default.
const FETCHES_PER_THREAD: usize = 4;

/// `4 ×` available hardware threads, capped at `MAX_DEFAULT_CONCURRENCY`.
pub fn default_concurrency() -> usize {
    let threads = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);

    (threads * FETCHES_PER_THREAD).min(MAX_DEFAULT_CONCURRENCY)
}

/// Counts outstanding work and wakes waiters when the count returns to zero.
#[derive(Clone, Debug, Default)]
pub struct IdleTracker {
    inner: Arc<IdleInner>,
}

#[derive(Debug, Default)]
struct IdleInner {
    outstanding: AtomicUsize,
    notify: Notify,
}

/// Keeps its `IdleTracker` busy until dropped.
#[derive(Debug)]
pub struct BusyGuard {
    inner: Arc<IdleInner>,
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        if self.inner.outstanding.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.inner.notify.notify_waiters();
        }
    }
}

impl IdleTracker {
    pub fn busy(&self) -> BusyGuard {
        self.inner.outstanding.fetch_add(1, Ordering::AcqRel);

        BusyGuard {
            inner: Arc::clone(&self.inner),
        }
    }

    #[inline]
    pub fn outstanding(&self) -> usize {
        self.inner.outstanding.load(Ordering::Acquire)
    }

    #[inline]
    pub fn is_idle(&self) -> bool {
        self.outstanding() == 0
    }

    /// Resolves once nothing is outstanding. Resolves immediately if already idle.
    pub async fn on_idle(&self) {
        loop {
            // Created before the check so a wakeup between the check and the await is not lost.
            let notified = self.inner.notify.notified();
            if self.is_idle() {
                return;
            }
            notified.await;
        }
    }
}

/// A bounded-concurrency queue of spawned tasks.
///
/// Tasks are spawned immediately but only run their body while holding one of `concurrency` permits, so at most that many run
/// at once and the rest wait in FIFO order. Must be used from within a tokio runtime.
#[derive(Clone, Debug)]
pub struct WorkQueue {
    permits: Arc<Semaphore>,
    concurrency: usize,
    idle: IdleTracker,
}

impl Default for WorkQueue {
    fn default() -> Self {
        Self::new(default_concurrency())
    }
}

impl WorkQueue {
    /// A `concurrency` of zero is treated as one.
    pub fn new(concurrency: usize) -> Self {
        let concurrency = concurrency.max(1);

        Self {
            permits: Arc::new(Semaphore::new(concurrency)),
            concurrency,
            idle: IdleTracker::default(),
        }
    }

    #[inline]
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Tasks that are queued or running.
    #[inline]
    pub fn outstanding(&self) -> usize {
        self.idle.outstanding()
    }

    /// Tasks currently holding a permit.
    #[inline]
    pub fn running(&self) -> usize {
        self.concurrency - self.permits.available_permits()
    }

    #[inline]
    pub fn is_idle(&self) -> bool {
        self.idle.is_idle()
    }

    /// Resolves when no task is queued or running.
    pub async fn on_idle(&self) {
        self.idle.on_idle().await
    }

    pub fn submit<F>(&self, work: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let busy = self.idle.busy();
        let permits = Arc::clone(&self.permits);

        tokio::spawn(async move {
            let _busy = busy;
            // The semaphore is never closed, so a permit is always granted eventually.
            let _permit = permits.acquire_owned().await.ok();

            work.await
        })
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[test]
    fn default_concurrency_is_capped() {
        let c = default_concurrency();

        assert!(c >= FETCHES_PER_THREAD.min(MAX_DEFAULT_CONCURRENCY));
        assert!(c <= MAX_DEFAULT_CONCURRENCY);
    }

    #[tokio::test(start_paused = true)]
    async fn never_runs_more_than_concurrency_tasks() {
        let queue = WorkQueue::new(2);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..6)
            .map(|_| {
                let running = Arc::clone(&running);
                let peak = Arc::clone(&peak);
                queue.submit(async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();
        assert_eq!(queue.outstanding(), 6);

        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(peak.load(Ordering::SeqCst), 2);
        assert!(queue.is_idle());
    }

    #[tokio::test(start_paused = true)]
    async fn on_idle_waits_for_queued_work() {
        let queue = WorkQueue::new(1);
        let done = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let done = Arc::clone(&done);
            queue.submit(async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                done.fetch_add(1, Ordering::SeqCst);
            });
        }

        queue.on_idle().await;
        assert_eq!(done.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn idle_tracker_resolves_immediately_when_idle() {
        let tracker = IdleTracker::default();
        tracker.on_idle().await;

        let guard = tracker.busy();
        assert_eq!(tracker.outstanding(), 1);
        drop(guard);
        assert!(tracker.is_idle());
    }
}
