//! The progressive load orchestrator.
//!
//! A `VolumeStreamer` keeps one state machine per consumer: each attached 3-D view, plus one slab per slice orientation
//! of the attached slice view. Every consumer loads strictly one request at a time. While a load is in flight, further
//! requests wait in a single slot where the latest one wins, and the replaced request is answered with
//! `LoadOutcome::Superseded`. Geometry changes (crop, viewport, configuration) are debounced so that a burst of changes
//! produces a single reload per consumer.
//!
//! A load runs in these steps:
//! 1. The effective world region is derived from the crop, the host's camera and the configured margin.
//! 2. The finest level within the consumer's pixel budget is selected.
//! 3. On a consumer's first load a coarse preview is fetched first, when progressive loading is enabled.
//! 4. The target level is fetched through the shared `RegionCoalescer` and installed into the host.
//!
//! A failed fetch leaves the previous buffer installed, emits `StreamEvent::LoadFailed` and rejects the request.

mod consumer;

pub use consumer::{LoadOutcome, LoadPhase};

use consumer::{
    effective_region, plan_preview, plan_target, slab_contains, ConsumerState, LoadStep, QueuedRequest, Reply,
};

use crate::{
    BusyGuard, ChunkCache, ChunkCacheStats, ChunkStore, ChunkedPyramidSource, ConfigError, ConsumerId, EventBus,
    FetchError, IdleTracker, Pyramid, PyramidSource, RegionCoalescer, RenderHost, SmallKeyHashMap, SourceError,
    StreamConfig, StreamError, StreamEvent, TriggerReason, VolumeBuffer,
};

use volume_stream_core::prelude::*;
use volume_stream_core::planes_to_native;

use futures::channel::mpsc::UnboundedReceiver;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::oneshot;

/// Streams a multi-resolution volume into render hosts under a pixel budget.
///
/// Cloning is cheap and every clone drives the same consumers. All methods that start work must be called from within a
/// tokio runtime.
#[derive(Clone)]
pub struct VolumeStreamer {
    shared: Arc<Shared>,
}

struct Shared {
    source: Arc<dyn PyramidSource>,
    coalescer: Arc<RegionCoalescer>,
    chunk_cache: Option<Arc<ChunkCache>>,
    estimator: Mutex<Arc<dyn ViewportEstimator>>,
    config: Mutex<StreamConfig>,
    state: Mutex<StreamerState>,
    events: EventBus,
    idle: IdleTracker,
    next_volume: AtomicU64,
}

#[derive(Default)]
struct StreamerState {
    clip: ClipRegion,
    consumers: SmallKeyHashMap<ConsumerId, ConsumerState>,
    slice_host: Option<Arc<dyn RenderHost>>,
}

impl VolumeStreamer {
    /// A streamer with its own coalescer, sized by `config`.
    pub fn new(source: Arc<dyn PyramidSource>, config: StreamConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let coalescer = Arc::new(RegionCoalescer::with_concurrency(config.effective_concurrency()));

        Ok(Self::build(source, config, coalescer, None))
    }

    /// A streamer sharing `coalescer` with other streamers, so identical reads across them are issued once.
    pub fn with_coalescer(
        source: Arc<dyn PyramidSource>,
        config: StreamConfig,
        coalescer: Arc<RegionCoalescer>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        Ok(Self::build(source, config, coalescer, None))
    }

    /// A streamer reading from a chunk store through a decoded-chunk cache of `config.cache_chunks` entries.
    pub fn from_chunk_store(
        pyramid: Pyramid,
        store: Arc<dyn ChunkStore>,
        config: StreamConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let cache = Arc::new(ChunkCache::new(config.cache_chunks));
        let source = Arc::new(ChunkedPyramidSource::new(pyramid, store, Arc::clone(&cache)));
        let coalescer = Arc::new(RegionCoalescer::with_concurrency(config.effective_concurrency()));

        Ok(Self::build(source, config, coalescer, Some(cache)))
    }

    fn build(
        source: Arc<dyn PyramidSource>,
        config: StreamConfig,
        coalescer: Arc<RegionCoalescer>,
        chunk_cache: Option<Arc<ChunkCache>>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                source,
                coalescer,
                chunk_cache,
                estimator: Mutex::new(Arc::new(OrthographicViewport)),
                config: Mutex::new(config),
                state: Default::default(),
                events: EventBus::default(),
                idle: IdleTracker::default(),
                next_volume: AtomicU64::new(0),
            }),
        }
    }

    /// Replaces the camera model used for viewport-aware loading.
    pub fn set_viewport_estimator(&self, estimator: Arc<dyn ViewportEstimator>) {
        *lock(&self.shared.estimator) = estimator;
    }

    pub fn config(&self) -> StreamConfig {
        self.shared.config()
    }

    /// Applies a new configuration. Changes that affect level selection schedule a debounced reload of every consumer.
    ///
    /// The fetch queue width is fixed when the coalescer is created, so a changed `concurrency` is ignored.
    pub fn configure(&self, config: StreamConfig) -> Result<(), StreamError> {
        config.validate()?;
        let previous = std::mem::replace(&mut *lock(&self.shared.config), config.clone());

        if let Some(cache) = &self.shared.chunk_cache {
            cache.set_capacity(config.cache_chunks);
        }
        if previous.concurrency != config.concurrency {
            tracing::warn!(
                concurrency = ?config.concurrency,
                "fetch concurrency is fixed once the streamer is created"
            );
        }

        let reselect = previous.max_pixels != config.max_pixels
            || previous.max_pixels_2d != config.max_pixels_2d
            || previous.viewport_aware != config.viewport_aware
            || previous.clip_margin != config.clip_margin;
        if reselect {
            self.shared.schedule_reload(TriggerReason::ConfigChanged);
        }

        Ok(())
    }

    #[inline]
    pub fn pyramid(&self) -> &Pyramid {
        self.shared.source.pyramid()
    }

    #[inline]
    pub fn volume_bounds(&self) -> WorldBox {
        self.pyramid().volume_bounds()
    }

    /// The factor installed affines are scaled by.
    #[inline]
    pub fn normalization_scale(&self) -> f64 {
        self.pyramid().normalization_scale()
    }

    #[inline]
    pub fn coalescer(&self) -> &Arc<RegionCoalescer> {
        &self.shared.coalescer
    }

    /// Decoded-chunk cache counters, when the streamer owns a cache.
    pub fn chunk_cache_stats(&self) -> Option<ChunkCacheStats> {
        self.shared.chunk_cache.as_ref().map(|c| c.stats())
    }

    pub fn subscribe(&self) -> UnboundedReceiver<StreamEvent> {
        self.shared.events.subscribe()
    }

    /// Attaches a 3-D view. Nothing is loaded until `populate` is called.
    pub fn attach_volume(&self, host: Arc<dyn RenderHost>) -> ConsumerId {
        let id = ConsumerId::Volume(self.shared.next_volume.fetch_add(1, Ordering::Relaxed));
        let native = self.shared.native_planes();
        host.set_native_clip_planes(native);

        let norm = self.normalization_scale();
        lock(&self.shared.state)
            .consumers
            .insert(id, ConsumerState::new(host, norm));
        tracing::debug!(consumer = %id, "attached");

        id
    }

    /// Attaches the slice view. Its slab consumers are created the first time each orientation's slice is positioned.
    pub fn attach_slices(&self, host: Arc<dyn RenderHost>) {
        host.set_native_clip_planes(self.shared.native_planes());
        let replaced = {
            let mut state = lock(&self.shared.state);
            state.slice_host = Some(host);
            remove_slabs(&mut state)
        };
        for (id, consumer) in replaced {
            consumer.shut_down(id);
        }
    }

    /// Removes a consumer. A request still queued for it fails with `StreamError::Detached`; a fetch in flight runs to
    /// completion but is not installed.
    pub fn detach(&self, id: ConsumerId) -> Result<(), StreamError> {
        let removed = lock(&self.shared.state)
            .consumers
            .remove(&id)
            .ok_or_else(|| StreamError::UnknownConsumer(id.to_string()))?;
        removed.shut_down(id);
        tracing::debug!(consumer = %id, "detached");

        Ok(())
    }

    /// Removes the slice view and all of its slabs.
    pub fn detach_slices(&self) {
        let removed = {
            let mut state = lock(&self.shared.state);
            state.slice_host = None;
            remove_slabs(&mut state)
        };
        for (id, consumer) in removed {
            consumer.shut_down(id);
        }
    }

    pub fn consumers(&self) -> Vec<ConsumerId> {
        lock(&self.shared.state).consumers.keys().copied().collect()
    }

    /// Crops to the intersection of the given half-spaces. Only the first six planes are kept.
    pub fn set_clip_planes(&self, planes: Vec<ClipPlane>) {
        self.shared.apply_clip(ClipRegion::from_planes(planes));
    }

    /// Crops to an axis-aligned box.
    pub fn set_crop_box(&self, crop: WorldBox) {
        self.shared.apply_clip(ClipRegion::Box(crop));
    }

    /// Removes all cropping.
    pub fn clear_clip_planes(&self) {
        self.shared.apply_clip(ClipRegion::default());
    }

    pub fn clip_planes(&self) -> Vec<ClipPlane> {
        lock(&self.shared.state).clip.to_planes()
    }

    pub fn clip_region(&self) -> ClipRegion {
        lock(&self.shared.state).clip.clone()
    }

    /// The crop as a box within the volume.
    pub fn clip_box(&self) -> WorldBox {
        lock(&self.shared.state).clip.to_box(&self.volume_bounds())
    }

    pub fn current_level(&self, id: ConsumerId) -> Option<usize> {
        self.shared.with_consumer(id, |c| c.current_level).flatten()
    }

    pub fn target_level(&self, id: ConsumerId) -> Option<usize> {
        self.shared.with_consumer(id, |c| c.target_level).flatten()
    }

    pub fn phase(&self, id: ConsumerId) -> Option<LoadPhase> {
        self.shared.with_consumer(id, |c| c.phase)
    }

    /// The last buffer installed for `id`.
    pub fn buffer(&self, id: ConsumerId) -> Option<VolumeBuffer> {
        self.shared.with_consumer(id, |c| c.buffer.clone()).flatten()
    }

    /// Loads `id` now, bypassing the debounce.
    ///
    /// If a load is already in flight, this request waits behind it and may be superseded by a newer one.
    pub async fn populate(&self, id: ConsumerId) -> Result<LoadOutcome, StreamError> {
        let reason = match self.shared.with_consumer(id, |c| c.current_level) {
            Some(None) => TriggerReason::Initial,
            _ => TriggerReason::Manual,
        };

        self.shared.request(id, reason).await
    }

    /// Schedules a debounced reload of every consumer that has been populated.
    pub fn request_reload(&self, reason: TriggerReason) {
        self.shared.schedule_reload(reason);
    }

    /// Tells the streamer a host's camera moved. Only has an effect when viewport-aware loading is on.
    pub fn notify_viewport_changed(&self) {
        if self.config().viewport_aware {
            self.shared.schedule_reload(TriggerReason::Viewport);
        }
    }

    /// Moves the slice normal to `axis` to the physical world coordinate `position`.
    ///
    /// The first call for an orientation creates its slab consumer. A new slab is only loaded when the slice leaves the slab
    /// currently installed, otherwise this returns `LoadOutcome::Unchanged`.
    pub async fn set_slice_position(&self, axis: Axis3, position: f64) -> Result<LoadOutcome, StreamError> {
        let id = ConsumerId::Slab(axis);
        let norm = self.normalization_scale();
        let reason = {
            let mut state = lock(&self.shared.state);
            if !state.consumers.contains_key(&id) {
                let host = state
                    .slice_host
                    .clone()
                    .ok_or_else(|| StreamError::UnknownConsumer(id.to_string()))?;
                state.consumers.insert(id, ConsumerState::new(host, norm));
                tracing::debug!(consumer = %id, "slab created");
            }
            let consumer = state
                .consumers
                .get_mut(&id)
                .ok_or_else(|| StreamError::UnknownConsumer(id.to_string()))?;
            consumer.slice_position = Some(position);

            match &consumer.buffer {
                None => TriggerReason::Initial,
                Some(buffer) => {
                    if !consumer.driving && slab_contains(self.pyramid(), buffer, axis, position) {
                        return Ok(LoadOutcome::Unchanged);
                    }
                    TriggerReason::SliceMoved
                }
            }
        };

        self.shared.request(id, reason).await
    }

    /// Resolves once every consumer is idle, no debounce timer is pending and the fetch queue is empty.
    pub async fn wait_idle(&self) {
        loop {
            self.shared.idle.on_idle().await;
            self.shared.coalescer.on_idle().await;
            if self.shared.idle.is_idle() {
                return;
            }
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn remove_slabs(state: &mut StreamerState) -> Vec<(ConsumerId, ConsumerState)> {
    let slabs: Vec<ConsumerId> = state
        .consumers
        .keys()
        .filter(|id| matches!(id, ConsumerId::Slab(_)))
        .copied()
        .collect();

    slabs
        .into_iter()
        .filter_map(|id| state.consumers.remove(&id).map(|c| (id, c)))
        .collect()
}

impl Shared {
    fn config(&self) -> StreamConfig {
        lock(&self.config).clone()
    }

    fn with_consumer<T>(&self, id: ConsumerId, f: impl FnOnce(&ConsumerState) -> T) -> Option<T> {
        lock(&self.state).consumers.get(&id).map(f)
    }

    fn native_planes(&self) -> Vec<NativeClipPlane> {
        let planes = lock(&self.state).clip.to_planes();

        planes_to_native(&planes, &self.source.pyramid().volume_bounds())
    }

    fn apply_clip(self: &Arc<Self>, clip: ClipRegion) {
        let planes = clip.to_planes();
        let native = planes_to_native(&planes, &self.source.pyramid().volume_bounds());

        let hosts = {
            let mut state = lock(&self.state);
            state.clip = clip;

            let mut hosts: Vec<Arc<dyn RenderHost>> = Vec::new();
            let all = state.consumers.values().map(|c| &c.host).chain(state.slice_host.iter());
            for host in all {
                if !hosts.iter().any(|h| Arc::ptr_eq(h, host)) {
                    hosts.push(Arc::clone(host));
                }
            }

            hosts
        };
        for host in hosts {
            host.set_native_clip_planes(native.clone());
            host.request_redraw();
        }

        self.events.emit(StreamEvent::ClipPlanesChanged { planes });
        self.schedule_reload(TriggerReason::ClipPlanes);
    }

    /// Queues a request for `id` and waits for its outcome.
    async fn request(self: &Arc<Self>, id: ConsumerId, reason: TriggerReason) -> Result<LoadOutcome, StreamError> {
        let (tx, rx) = oneshot::channel();
        self.enqueue(id, reason, Some(tx))?;

        rx.await
            .unwrap_or_else(|_| Err(StreamError::Detached(id.to_string())))
    }

    /// Puts a request in `id`'s single queue slot, superseding whatever was there, and makes sure a driver is running.
    fn enqueue(self: &Arc<Self>, id: ConsumerId, reason: TriggerReason, reply: Option<Reply>) -> Result<(), StreamError> {
        let mut state = lock(&self.state);
        let consumer = state
            .consumers
            .get_mut(&id)
            .ok_or_else(|| StreamError::UnknownConsumer(id.to_string()))?;

        if let Some(old) = consumer.queued.replace(QueuedRequest { reason, reply }) {
            tracing::debug!(consumer = %id, reason = ?old.reason, "queued request superseded");
            self.events.emit(StreamEvent::RequestSuperseded {
                consumer: id,
                reason: old.reason,
            });
            if let Some(reply) = old.reply {
                let _ = reply.send(Ok(LoadOutcome::Superseded));
            }
        }

        if !consumer.driving {
            consumer.driving = true;
            let busy = self.idle.busy();
            tokio::spawn(Arc::clone(self).drive(id, busy));
        }

        Ok(())
    }

    /// Runs `id`'s queued requests one at a time until the queue slot is empty.
    async fn drive(self: Arc<Self>, id: ConsumerId, _busy: BusyGuard) {
        loop {
            let request = {
                let mut state = lock(&self.state);
                let consumer = match state.consumers.get_mut(&id) {
                    Some(c) => c,
                    None => return,
                };
                match consumer.queued.take() {
                    Some(request) => request,
                    None => {
                        consumer.driving = false;
                        consumer.phase = LoadPhase::Idle;
                        let level = consumer.current_level;
                        drop(state);

                        self.events.emit(StreamEvent::PopulateComplete { consumer: id, level });
                        return;
                    }
                }
            };

            let result = self.load(id, request.reason).await;
            if let Err(e) = &result {
                tracing::warn!(consumer = %id, reason = ?request.reason, error = %e, "load failed");
            }
            if let Some(reply) = request.reply {
                let _ = reply.send(result);
            }
        }
    }

    /// One full load sequence: optional preview, then target.
    async fn load(&self, id: ConsumerId, reason: TriggerReason) -> Result<LoadOutcome, StreamError> {
        let config = self.config();
        let pyramid = self.source.pyramid();
        let volume = pyramid.volume_bounds();

        let (host, clip, first_load, norm, slice_position) = {
            let state = lock(&self.state);
            let c = state
                .consumers
                .get(&id)
                .ok_or_else(|| StreamError::Detached(id.to_string()))?;

            (
                Arc::clone(&c.host),
                state.clip.clone(),
                c.current_level.is_none(),
                c.normalization_scale,
                c.slice_position,
            )
        };
        let camera = if config.viewport_aware {
            Some(host.camera())
        } else {
            None
        };
        let estimator = Arc::clone(&*lock(&self.estimator));
        let base = effective_region(
            &clip,
            &volume,
            camera.as_ref(),
            id,
            estimator.as_ref(),
            config.clip_margin,
            norm,
        );

        let target = plan_target(pyramid, &config, &base, &volume, id, slice_position);
        self.update_consumer(id, |c| c.target_level = Some(target.level))?;
        tracing::debug!(consumer = %id, level = target.level, region = ?target.region.aligned, "loading");
        self.events.emit(match id {
            ConsumerId::Volume(_) => StreamEvent::LoadingStart {
                consumer: id,
                target_level: target.level,
                reason,
            },
            ConsumerId::Slab(axis) => {
                let (slab_start, slab_end) = target.interval_on(axis);
                StreamEvent::SlabLoadingStart {
                    axis,
                    level: target.level,
                    slab_start,
                    slab_end,
                    reason,
                }
            }
        });

        if config.progressive && first_load && target.level != pyramid.coarsest() {
            let preview = plan_preview(pyramid, &base, &volume, id, slice_position);
            self.update_consumer(id, |c| c.phase = LoadPhase::LoadingPreview)?;
            self.fetch_and_install(id, &preview, reason, norm, &host).await?;
        }

        self.update_consumer(id, |c| c.phase = LoadPhase::LoadingTarget)?;
        self.fetch_and_install(id, &target, reason, norm, &host).await?;

        self.events.emit(match id {
            ConsumerId::Volume(_) => StreamEvent::LoadingComplete {
                consumer: id,
                current_level: target.level,
                target_level: target.level,
                reason,
            },
            ConsumerId::Slab(axis) => {
                let (slab_start, slab_end) = target.interval_on(axis);
                StreamEvent::SlabLoadingComplete {
                    axis,
                    level: target.level,
                    slab_start,
                    slab_end,
                    reason,
                }
            }
        });

        Ok(LoadOutcome::Loaded {
            level: target.level,
            dimensions: target.region.dimensions(),
        })
    }

    fn update_consumer(&self, id: ConsumerId, f: impl FnOnce(&mut ConsumerState)) -> Result<(), StreamError> {
        let mut state = lock(&self.state);
        let consumer = state
            .consumers
            .get_mut(&id)
            .ok_or_else(|| StreamError::Detached(id.to_string()))?;
        f(consumer);

        Ok(())
    }

    /// Fetches `step` (or reuses the installed data when it already covers the same aligned region) and installs it.
    async fn fetch_and_install(
        &self,
        id: ConsumerId,
        step: &LoadStep,
        reason: TriggerReason,
        norm: f64,
        host: &Arc<dyn RenderHost>,
    ) -> Result<(), StreamError> {
        let reusable = self
            .with_consumer(id, |c| {
                c.buffer
                    .as_ref()
                    .filter(|b| b.level == step.level && b.region.aligned == step.region.aligned)
                    .map(|b| Arc::clone(&b.data))
            })
            .flatten();

        let data = match reusable {
            Some(data) => data,
            None => {
                let fetch = self
                    .coalescer
                    .fetch_region(&self.source, step.level, step.region.aligned, &id.to_string());
                let fetched = fetch.await.and_then(|data| {
                    if data.shape() == step.region.dimensions() {
                        Ok(data)
                    } else {
                        Err(FetchError::from(SourceError::ShapeMismatch {
                            expected: step.region.dimensions().0,
                            actual: data.shape().0,
                        }))
                    }
                });
                match fetched {
                    Ok(data) => data,
                    Err(e) => {
                        self.events.emit(StreamEvent::LoadFailed {
                            consumer: id,
                            level: step.level,
                            reason,
                            error: e.to_string(),
                        });
                        return Err(e.into());
                    }
                }
            }
        };

        let buffer = VolumeBuffer {
            data,
            level: step.level,
            region: step.region,
            affine: step.affine.with_origin(step.region.aligned.start).rescaled(norm),
            normalization_scale: norm,
        };
        let previous = {
            let mut state = lock(&self.state);
            let consumer = state
                .consumers
                .get_mut(&id)
                .ok_or_else(|| StreamError::Detached(id.to_string()))?;
            consumer.buffer = Some(buffer.clone());

            consumer.current_level.replace(step.level)
        };

        match id {
            ConsumerId::Volume(_) => host.install_volume(buffer),
            ConsumerId::Slab(axis) => host.install_slab(axis, buffer),
        }
        host.request_redraw();

        if previous != Some(step.level) {
            self.events.emit(StreamEvent::ResolutionChange {
                consumer: id,
                previous_level: previous,
                level: step.level,
                reason,
            });
        }

        Ok(())
    }

    /// Restarts every consumer's quiet-interval timer. Only the last timer of a burst enqueues a reload.
    fn schedule_reload(self: &Arc<Self>, reason: TriggerReason) {
        let delay = self.config().debounce();
        let mut state = lock(&self.state);
        for (&id, consumer) in state.consumers.iter_mut() {
            if consumer.is_dormant() {
                continue;
            }
            if let Some(timer) = consumer.debounce.take() {
                timer.abort();
            }
            consumer.debounce_generation += 1;
            let generation = consumer.debounce_generation;

            let shared = Arc::clone(self);
            let busy = self.idle.busy();
            consumer.debounce = Some(tokio::spawn(async move {
                let _busy = busy;
                tokio::time::sleep(delay).await;
                shared.fire_debounced(id, generation, reason);
            }));
        }
    }

    fn fire_debounced(self: &Arc<Self>, id: ConsumerId, generation: u64, reason: TriggerReason) {
        let current = {
            let mut state = lock(&self.state);
            match state.consumers.get_mut(&id) {
                Some(c) if c.debounce_generation == generation => {
                    c.debounce = None;
                    true
                }
                _ => false,
            }
        };
        if !current {
            return;
        }

        // Nobody awaits a debounced reload; failures are reported through `StreamEvent::LoadFailed`.
        if let Err(e) = self.enqueue(id, reason, None) {
            tracing::debug!(consumer = %id, error = %e, "debounced reload dropped");
        }
    }
}
