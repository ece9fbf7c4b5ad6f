use crate::{FetchError, PyramidSource, RegionData, SmallKeyHashMap, SmallKeyHashSet, WorkQueue};

use volume_stream_core::prelude::*;

use futures::future::{join_all, BoxFuture, FutureExt, Shared};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// The result every requester of one region read receives. Successful results share one allocation.
pub type FetchResult = Result<Arc<RegionData>, FetchError>;

/// A cloneable handle on an in-flight region read.
pub type RegionFetch = Shared<BoxFuture<'static, FetchResult>>;

/// Identifies one region read.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct RegionKey {
    pub source: String,
    pub level: usize,
    pub region: PixelRegion,
}

struct PendingRequest {
    fetch: RegionFetch,
    requesters: SmallKeyHashSet<String>,
    generation: u64,
}

type PendingMap = SmallKeyHashMap<RegionKey, PendingRequest>;

/// Deduplicates concurrent reads of the same `(source, level, region)` and runs them on a bounded `WorkQueue`.
///
/// A pending entry lives exactly as long as its read. Whether the read succeeds or fails, the entry is removed when it
/// settles, so a later identical request always issues a fresh read. Nothing is cached here.
pub struct RegionCoalescer {
    queue: WorkQueue,
    pending: Arc<Mutex<PendingMap>>,
    next_generation: AtomicU64,
}

impl Default for RegionCoalescer {
    fn default() -> Self {
        Self::new(WorkQueue::default())
    }
}

impl RegionCoalescer {
    pub fn new(queue: WorkQueue) -> Self {
        Self {
            queue,
            pending: Default::default(),
            next_generation: AtomicU64::new(0),
        }
    }

    pub fn with_concurrency(concurrency: usize) -> Self {
        Self::new(WorkQueue::new(concurrency))
    }

    #[inline]
    pub fn queue(&self) -> &WorkQueue {
        &self.queue
    }

    /// Reads `region` of `level`, or joins the identical read already in flight.
    ///
    /// `requester` is only recorded for introspection. Must be called from within a tokio runtime.
    pub fn fetch_region(
        &self,
        source: &Arc<dyn PyramidSource>,
        level: usize,
        region: PixelRegion,
        requester: &str,
    ) -> RegionFetch {
        let key = RegionKey {
            source: source.source_id().to_string(),
            level,
            region,
        };

        let mut pending = lock(&self.pending);
        if let Some(existing) = pending.get_mut(&key) {
            existing.requesters.insert(requester.to_string());
            tracing::trace!(source = %key.source, level, region = ?region, requester, "joined pending fetch");

            return existing.fetch.clone();
        }

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let source = Arc::clone(source);
        let map = Arc::clone(&self.pending);
        let settle_key = key.clone();
        // The entry is inserted below while `pending` is still locked, so the task cannot settle before it exists.
        // The source is only asked to read once the queue grants a permit.
        let handle = self.queue.submit(async move {
            let result = source.read_region(level, region).await.map(Arc::new).map_err(FetchError::from);
            if let Err(e) = &result {
                tracing::warn!(source = %settle_key.source, level, region = ?region, error = %e, "region fetch failed");
            }
            settle(&map, &settle_key, generation);

            result
        });

        let map = Arc::clone(&self.pending);
        let abort_key = key.clone();
        let fetch = async move {
            match handle.await {
                Ok(result) => result,
                Err(join_error) => {
                    settle(&map, &abort_key, generation);

                    Err(FetchError::Aborted(join_error.to_string()))
                }
            }
        }
        .boxed()
        .shared();

        tracing::debug!(source = %key.source, level, region = ?region, requester, "issued region fetch");
        let mut requesters = SmallKeyHashSet::default();
        requesters.insert(requester.to_string());
        pending.insert(
            key,
            PendingRequest {
                fetch: fetch.clone(),
                requesters,
                generation,
            },
        );

        fetch
    }

    /// Fans out one coalesced read per region and joins them, preserving input order.
    pub fn fetch_regions(
        &self,
        source: &Arc<dyn PyramidSource>,
        level: usize,
        regions: &[PixelRegion],
        requester: &str,
    ) -> impl std::future::Future<Output = Vec<FetchResult>> {
        join_all(
            regions
                .iter()
                .map(|r| self.fetch_region(source, level, *r, requester))
                .collect::<Vec<_>>(),
        )
    }

    /// Number of distinct reads in flight.
    pub fn pending_count(&self) -> usize {
        lock(&self.pending).len()
    }

    /// Requesters attached to the read for `key`, if it is still in flight.
    pub fn requesters(&self, key: &RegionKey) -> Option<Vec<String>> {
        lock(&self.pending)
            .get(key)
            .map(|p| p.requesters.iter().cloned().collect())
    }

    pub fn is_idle(&self) -> bool {
        self.queue.is_idle() && self.pending_count() == 0
    }

    /// Resolves when no read is queued or running.
    pub async fn on_idle(&self) {
        self.queue.on_idle().await
    }
}

fn lock(map: &Mutex<PendingMap>) -> MutexGuard<'_, PendingMap> {
    map.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Removes the entry for `key` unless it has already been replaced by a newer read.
fn settle(map: &Mutex<PendingMap>, key: &RegionKey, generation: u64) {
    let mut map = lock(map);
    if map.get(key).map_or(false, |p| p.generation == generation) {
        map.remove(key);
    }
}
