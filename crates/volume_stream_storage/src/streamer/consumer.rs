use crate::{
    region_for_level, select_level, ConsumerId, Level, Pyramid, RenderHost, SelectionMode, StreamConfig, StreamError,
    TriggerReason, VolumeBuffer,
};

use volume_stream_core::prelude::*;

use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Where a consumer's state machine is.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LoadPhase {
    Idle,
    /// Fetching the coarsest level as a quick first picture.
    LoadingPreview,
    LoadingTarget,
}

/// How a load request ended.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LoadOutcome {
    /// The target level is installed.
    Loaded { level: usize, dimensions: Point3i },
    /// A newer request replaced this one before it ran.
    Superseded,
    /// Nothing needed to be fetched.
    Unchanged,
}

pub(crate) type Reply = oneshot::Sender<Result<LoadOutcome, StreamError>>;

pub(crate) struct QueuedRequest {
    pub reason: TriggerReason,
    pub reply: Option<Reply>,
}

pub(crate) struct ConsumerState {
    pub host: Arc<dyn RenderHost>,
    pub phase: LoadPhase,
    /// A driver task owns this consumer's queue.
    pub driving: bool,
    pub current_level: Option<usize>,
    pub target_level: Option<usize>,
    /// Latest-wins: at most one request waits behind the one in flight.
    pub queued: Option<QueuedRequest>,
    pub debounce: Option<JoinHandle<()>>,
    pub debounce_generation: u64,
    pub buffer: Option<VolumeBuffer>,
    /// Physical world coordinate of the slice, for slab consumers.
    pub slice_position: Option<f64>,
    pub normalization_scale: f64,
}

impl ConsumerState {
    pub fn new(host: Arc<dyn RenderHost>, normalization_scale: f64) -> Self {
        Self {
            host,
            phase: LoadPhase::Idle,
            driving: false,
            current_level: None,
            target_level: None,
            queued: None,
            debounce: None,
            debounce_generation: 0,
            buffer: None,
            slice_position: None,
            normalization_scale,
        }
    }

    /// Never loaded and nothing in flight. Debounced reloads skip it until `populate` runs.
    pub fn is_dormant(&self) -> bool {
        self.current_level.is_none() && !self.driving
    }

    /// Cancels any timer and answers any queued request with `Detached`.
    pub fn shut_down(self, id: ConsumerId) {
        if let Some(timer) = self.debounce {
            timer.abort();
        }
        if let Some(reply) = self.queued.and_then(|q| q.reply) {
            let _ = reply.send(Err(StreamError::Detached(id.to_string())));
        }
    }
}

/// One fetch a load sequence performs.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct LoadStep {
    pub level: usize,
    pub region: ChunkAlignedRegion,
    pub affine: Affine3,
}

impl LoadStep {
    /// The `[start, end)` pixel interval of the step along `axis`.
    pub fn interval_on(&self, axis: Axis3) -> (i64, i64) {
        let i = axis.pixel_index();

        (self.region.aligned.start[i], self.region.aligned.end[i])
    }
}

/// The world box a consumer should load: the crop, narrowed to what the host shows when viewport-aware, then widened by the
/// margin. Always within `volume`.
pub(crate) fn effective_region(
    clip: &ClipRegion,
    volume: &WorldBox,
    camera: Option<&CameraState>,
    id: ConsumerId,
    estimator: &dyn ViewportEstimator,
    margin: f64,
    normalization_scale: f64,
) -> WorldBox {
    let mut region = clip.to_box(volume);

    let visible = match (id, camera) {
        (ConsumerId::Volume(_), Some(CameraState::Volume(c))) => Some(estimator.visible_bounds_3d(c, volume)),
        (ConsumerId::Slab(axis), Some(CameraState::Slices(c))) => {
            Some(estimator.visible_bounds_2d(c, axis, volume, normalization_scale))
        }
        _ => None,
    };
    if let Some(visible) = visible {
        region = region.intersection(&visible);
    }

    if margin > 0.0 {
        region = region.expand_by_margin(margin, volume);
    }

    region
}

/// The pixel index along `axis` of the slice at world `position`, clamped into the level.
pub(crate) fn slice_index(level: &Level, axis: Axis3, position: f64, volume: &WorldBox) -> i64 {
    let mut p = volume.center();
    p[axis.index()] = position;
    let i = axis.pixel_index();
    let index = level.affine.world_to_pixel(p)[i].floor() as i64;

    index.max(0).min((level.shape[i] - 1).max(0))
}

fn step_at(
    level_index: usize,
    level: &Level,
    base: &WorldBox,
    volume: &WorldBox,
    id: ConsumerId,
    slice_position: Option<f64>,
) -> LoadStep {
    let region = region_for_level(level, base, volume);
    let region = match id {
        ConsumerId::Volume(_) => region,
        ConsumerId::Slab(axis) => {
            let position = slice_position.unwrap_or_else(|| volume.center()[axis.index()]);
            let index = slice_index(level, axis, position, volume);
            let slab = level.aligner().slab_containing(&region.aligned, axis, index);
            let requested = region
                .requested
                .with_interval(axis, slab.start[axis.pixel_index()], slab.end[axis.pixel_index()]);

            ChunkAlignedRegion {
                requested,
                aligned: slab,
                expanded: requested != slab,
            }
        }
    };

    LoadStep {
        level: level_index,
        region,
        affine: level.affine,
    }
}

/// The step for the finest level that fits the consumer's budget.
pub(crate) fn plan_target(
    pyramid: &Pyramid,
    config: &StreamConfig,
    base: &WorldBox,
    volume: &WorldBox,
    id: ConsumerId,
    slice_position: Option<f64>,
) -> LoadStep {
    let (budget, mode) = match id {
        ConsumerId::Volume(_) => (config.max_pixels, SelectionMode::Volume),
        ConsumerId::Slab(axis) => (config.max_pixels_2d, SelectionMode::Plane(axis)),
    };
    let selection = select_level(pyramid, budget, base, volume, mode);
    let index = selection.level_index;

    step_at(index, &pyramid.levels()[index], base, volume, id, slice_position)
}

/// The step for the coarsest level.
pub(crate) fn plan_preview(
    pyramid: &Pyramid,
    base: &WorldBox,
    volume: &WorldBox,
    id: ConsumerId,
    slice_position: Option<f64>,
) -> LoadStep {
    let index = pyramid.coarsest();

    step_at(index, &pyramid.levels()[index], base, volume, id, slice_position)
}

/// Returns `true` iff `buffer` already holds the slab containing the slice at `position`.
pub(crate) fn slab_contains(
    pyramid: &Pyramid,
    buffer: &VolumeBuffer,
    axis: Axis3,
    position: f64,
) -> bool {
    let level = match pyramid.level(buffer.level) {
        Some(level) => level,
        None => return false,
    };
    let index = slice_index(level, axis, position, &pyramid.volume_bounds());
    let i = axis.pixel_index();

    buffer.region.aligned.start[i] <= index && index < buffer.region.aligned.end[i]
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

    use crate::LevelMetadata;

    use pretty_assertions::assert_eq;

    fn pyramid() -> Pyramid {
        let level = |s: u64, scale: f64| LevelMetadata {
            path: s.to_string(),
            shape: vec![s, s, s],
            chunk_shape: vec![16, 16, 16],
            scale: [scale; 3],
            translation: [0.0; 3],
            channels: None,
            orientation: None,
            dtype: "uint8".into(),
        };

        Pyramid::from_metadata(&[level(128, 1.0), level(64, 2.0), level(32, 4.0)]).unwrap()
    }

    #[test]
    fn slab_is_one_chunk_thick_around_the_slice() {
        let p = pyramid();
        let v = p.volume_bounds();
        let config = StreamConfig::default().with_max_pixels_2d(128 * 128);
        let step = plan_target(&p, &config, &v, &v, ConsumerId::Slab(Axis3::Z), Some(40.0));

        assert_eq!(step.level, 0);
        assert_eq!(step.interval_on(Axis3::Z), (32, 48));
        assert_eq!(step.interval_on(Axis3::X), (0, 128));
        assert_eq!(step.region.dimensions(), PointN([16, 128, 128]));
    }

    #[test]
    fn slab_containment_tracks_the_slice_index() {
        let p = pyramid();
        let v = p.volume_bounds();
        let step = plan_target(
            &p,
            &StreamConfig::default(),
            &v,
            &v,
            ConsumerId::Slab(Axis3::X),
            Some(5.0),
        );
        let buffer = VolumeBuffer {
            data: Arc::new(crate::RegionData::zeros(
                crate::DataType::U8,
                step.region.dimensions(),
                1,
            )),
            level: step.level,
            region: step.region,
            affine: step.affine,
            normalization_scale: 1.0,
        };

        assert!(slab_contains(&p, &buffer, Axis3::X, 15.9));
        assert!(!slab_contains(&p, &buffer, Axis3::X, 16.0));
    }

    #[test]
    fn margin_never_leaves_the_volume() {
        let v = WorldBox::from_bounds([0.0, 100.0, 0.0, 100.0, 0.0, 100.0]);
        let clip = ClipRegion::Box(WorldBox::from_bounds([10.0, 20.0, 0.0, 100.0, 90.0, 100.0]));
        let r = effective_region(
            &clip,
            &v,
            None,
            ConsumerId::Volume(0),
            &OrthographicViewport,
            0.5,
            1.0,
        );

        assert!(r.is_subset_of(&v));
        assert_eq!(r.min_on(Axis3::X), 5.0);
        assert_eq!(r.max_on(Axis3::X), 25.0);
    }

    #[test]
    fn camera_of_the_wrong_kind_is_ignored() {
        let v = WorldBox::from_bounds([0.0, 100.0, 0.0, 100.0, 0.0, 100.0]);
        let camera = CameraState::Slices(Camera2D {
            zoom: 4.0,
            ..Default::default()
        });
        let r = effective_region(
            &ClipRegion::default(),
            &v,
            Some(&camera),
            ConsumerId::Volume(0),
            &OrthographicViewport,
            0.0,
            1.0,
        );

        assert_eq!(r, v);
    }
}
