use crate::data_sets::{synthetic_region, synthetic_value};

use volume_stream_core::prelude::*;
use volume_stream_storage::prelude::*;

use futures::future::{BoxFuture, FutureExt};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Failure injection and read accounting shared by the fake sources.
#[derive(Debug, Default)]
pub struct ReadLog {
    reads: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    fail_next: AtomicUsize,
    failing_levels: Mutex<Vec<usize>>,
    requests: Mutex<Vec<(usize, PixelRegion)>>,
}

impl ReadLog {
    /// Underlying reads issued so far.
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// The most reads that were ever in flight at once.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    /// `(level, region)` of every read, in issue order.
    pub fn requests(&self) -> Vec<(usize, PixelRegion)> {
        self.requests.lock().unwrap().clone()
    }

    /// Makes the next `n` reads fail with a network error.
    pub fn fail_next(&self, n: usize) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// Makes the next read of `level` fail, whatever is read before it.
    pub fn fail_level(&self, level: usize) {
        self.failing_levels.lock().unwrap().push(level);
    }

    fn begin(&self, level: usize, region: PixelRegion) -> bool {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push((level, region));

        let counted = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if counted {
            return true;
        }

        let mut levels = self.failing_levels.lock().unwrap();
        match levels.iter().position(|&l| l == level) {
            Some(i) => {
                levels.remove(i);
                true
            }
            None => false,
        }
    }

    fn enter(&self) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A `PyramidSource` that synthesizes `u16` data on demand after an optional delay.
pub struct SyntheticSource {
    id: String,
    pyramid: Pyramid,
    delay: Duration,
    log: Arc<ReadLog>,
}

impl SyntheticSource {
    pub fn new(id: &str, pyramid: Pyramid) -> Self {
        Self {
            id: id.to_string(),
            pyramid,
            delay: Duration::ZERO,
            log: Default::default(),
        }
    }

    /// Every read sleeps for `delay` before completing.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn log(&self) -> &Arc<ReadLog> {
        &self.log
    }
}

impl PyramidSource for SyntheticSource {
    fn source_id(&self) -> &str {
        &self.id
    }

    fn pyramid(&self) -> &Pyramid {
        &self.pyramid
    }

    fn read_region(
        &self,
        level: usize,
        region: PixelRegion,
    ) -> BoxFuture<'static, Result<RegionData, SourceError>> {
        let fail = self.log.begin(level, region);
        let exists = self.pyramid.level(level).is_some();
        let log = Arc::clone(&self.log);
        let delay = self.delay;

        async move {
            log.enter();
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            log.exit();

            if !exists {
                Err(SourceError::NoSuchLevel(level))
            } else if fail {
                Err(SourceError::network("injected failure"))
            } else {
                Ok(synthetic_region(level, &region))
            }
        }
        .boxed()
    }
}

/// A `ChunkStore` decoding synthetic chunks, clipped at the array edges.
pub struct SyntheticChunkStore {
    id: String,
    levels: Vec<(String, ChunkAligner)>,
    log: Arc<ReadLog>,
}

impl SyntheticChunkStore {
    pub fn new(id: &str, pyramid: &Pyramid) -> Self {
        Self {
            id: id.to_string(),
            levels: pyramid
                .levels()
                .iter()
                .map(|l| (l.path.clone(), l.aligner()))
                .collect(),
            log: Default::default(),
        }
    }

    pub fn log(&self) -> &Arc<ReadLog> {
        &self.log
    }
}

impl ChunkStore for SyntheticChunkStore {
    fn store_id(&self) -> &str {
        &self.id
    }

    fn read_chunk(&self, path: &str, chunk: Point3i) -> BoxFuture<'static, Result<RegionData, SourceError>> {
        let found = self
            .levels
            .iter()
            .enumerate()
            .find(|(_, (p, _))| p == path)
            .map(|(i, (_, aligner))| (i, aligner.chunk_region(chunk)));
        let result = match found {
            Some((level, region)) => {
                let fail = self.log.begin(level, region);
                if fail {
                    Err(SourceError::network("injected failure"))
                } else {
                    Ok(synthetic_region(level, &region))
                }
            }
            None => Err(SourceError::MissingChunk {
                path: path.to_string(),
                chunk: chunk.0,
            }),
        };

        futures::future::ready(result).boxed()
    }
}

/// Checks every pixel of `data` against the synthetic volume, where `data` was read from `region` of `level`.
pub fn matches_synthetic(data: &RegionData, level: usize, region: &PixelRegion) -> bool {
    let values = match data.to_vec::<u16>() {
        Some(v) => v,
        None => return false,
    };
    if data.shape() != region.shape() {
        return false;
    }

    let mut i = 0;
    for z in region.start[0]..region.end[0] {
        for y in region.start[1]..region.end[1] {
            for x in region.start[2]..region.end[2] {
                if values[i] != synthetic_value(level, PointN([z, y, x])) {
                    return false;
                }
                i += 1;
            }
        }
    }

    true
}
