use utilities::data_sets::{pyramid_metadata, uint16_pyramid};
use utilities::host::RecordingHost;
use utilities::sources::{matches_synthetic, SyntheticChunkStore, SyntheticSource};

use volume_stream_core::prelude::*;
use volume_stream_core::approx_eq;
use volume_stream_storage::prelude::*;

use futures::channel::mpsc::UnboundedReceiver;
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;

// Level 0 (16 x 128 x 128) exceeds the 3-D budget, level 1 (16 x 64 x 64) fits, level 2 is the coarsest.
const SHAPES: [[u64; 3]; 3] = [[16, 128, 128], [16, 64, 64], [8, 32, 32]];
const CHUNK: [u64; 3] = [8, 32, 32];

fn config() -> StreamConfig {
    StreamConfig::default()
        .with_max_pixels(70_000)
        .with_max_pixels_2d(64 * 64)
        .with_viewport_aware(false)
        .with_progressive(false)
        .with_concurrency(4)
}

fn streamer(config: StreamConfig) -> (VolumeStreamer, Arc<SyntheticSource>) {
    let source = Arc::new(
        SyntheticSource::new("synthetic", uint16_pyramid(&SHAPES, CHUNK)).with_delay(Duration::from_millis(10)),
    );
    let streamer = VolumeStreamer::new(source.clone(), config).unwrap();

    (streamer, source)
}

fn drain(events: &mut UnboundedReceiver<StreamEvent>) -> Vec<StreamEvent> {
    let mut out = Vec::new();
    while let Ok(Some(e)) = events.try_next() {
        out.push(e);
    }

    out
}

#[tokio::test(start_paused = true)]
async fn first_load_shows_coarse_preview_then_target() {
    let (streamer, source) = streamer(config().with_progressive(true));
    let host = Arc::new(RecordingHost::volume_view());
    let id = streamer.attach_volume(host.clone());
    let mut events = streamer.subscribe();

    let outcome = streamer.populate(id).await.unwrap();
    streamer.wait_idle().await;

    assert_eq!(
        outcome,
        LoadOutcome::Loaded {
            level: 1,
            dimensions: PointN([16, 64, 64])
        }
    );
    assert_eq!(
        drain(&mut events),
        vec![
            StreamEvent::LoadingStart {
                consumer: id,
                target_level: 1,
                reason: TriggerReason::Initial
            },
            StreamEvent::ResolutionChange {
                consumer: id,
                previous_level: None,
                level: 2,
                reason: TriggerReason::Initial
            },
            StreamEvent::ResolutionChange {
                consumer: id,
                previous_level: Some(2),
                level: 1,
                reason: TriggerReason::Initial
            },
            StreamEvent::LoadingComplete {
                consumer: id,
                current_level: 1,
                target_level: 1,
                reason: TriggerReason::Initial
            },
            StreamEvent::PopulateComplete {
                consumer: id,
                level: Some(1)
            },
        ]
    );

    let installed = host.volumes();
    assert_eq!(installed.len(), 2);
    assert_eq!(installed[0].level, 2);
    let last = &installed[1];
    assert!(matches_synthetic(&last.data, 1, &last.region.aligned));
    assert_eq!(source.log().reads(), 2);
    assert_eq!(streamer.current_level(id), Some(1));
    assert_eq!(streamer.target_level(id), Some(1));
    assert_eq!(streamer.phase(id), Some(LoadPhase::Idle));
    assert!(host.redraws() >= 2);
}

#[tokio::test(start_paused = true)]
async fn queued_requests_are_latest_wins() {
    let (streamer, source) = streamer(config());
    let id = streamer.attach_volume(Arc::new(RecordingHost::volume_view()));
    let mut events = streamer.subscribe();

    let s = streamer.clone();
    let first = tokio::spawn(async move { s.populate(id).await });
    tokio::time::sleep(Duration::from_millis(1)).await;
    assert_eq!(streamer.phase(id), Some(LoadPhase::LoadingTarget));

    let s = streamer.clone();
    let second = tokio::spawn(async move { s.populate(id).await });
    tokio::time::sleep(Duration::from_millis(1)).await;
    let s = streamer.clone();
    let third = tokio::spawn(async move { s.populate(id).await });

    assert!(matches!(first.await.unwrap(), Ok(LoadOutcome::Loaded { level: 1, .. })));
    assert_eq!(second.await.unwrap().unwrap(), LoadOutcome::Superseded);
    assert!(matches!(third.await.unwrap(), Ok(LoadOutcome::Loaded { level: 1, .. })));
    streamer.wait_idle().await;

    assert_eq!(source.log().peak_in_flight(), 1);
    let superseded = drain(&mut events)
        .into_iter()
        .filter(|e| matches!(e, StreamEvent::RequestSuperseded { .. }))
        .count();
    assert_eq!(superseded, 1);
}

#[tokio::test(start_paused = true)]
async fn burst_of_triggers_produces_one_reload() {
    let (streamer, _) = streamer(config());
    let id = streamer.attach_volume(Arc::new(RecordingHost::volume_view()));
    streamer.populate(id).await.unwrap();
    streamer.wait_idle().await;
    let mut events = streamer.subscribe();

    for _ in 0..5 {
        streamer.request_reload(TriggerReason::Manual);
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    streamer.wait_idle().await;

    let reloads = drain(&mut events)
        .into_iter()
        .filter(|e| {
            matches!(
                e,
                StreamEvent::LoadingStart {
                    reason: TriggerReason::Manual,
                    ..
                }
            )
        })
        .count();
    assert_eq!(reloads, 1);
}

#[tokio::test(start_paused = true)]
async fn failed_fetch_keeps_previous_buffer() {
    let (streamer, source) = streamer(config());
    let host = Arc::new(RecordingHost::volume_view());
    let id = streamer.attach_volume(host.clone());
    streamer.populate(id).await.unwrap();
    let mut events = streamer.subscribe();

    source.log().fail_next(1);
    streamer.set_crop_box(WorldBox::from_bounds([0.0, 32.0, 0.0, 128.0, 0.0, 16.0]));
    let result = streamer.populate(id).await;

    assert!(matches!(result, Err(StreamError::Fetch(_))));
    assert_eq!(streamer.buffer(id).map(|b| b.level), Some(1));
    assert_eq!(host.volumes().len(), 1);
    assert!(drain(&mut events)
        .iter()
        .any(|e| matches!(e, StreamEvent::LoadFailed { level: 0, .. })));

    // The debounced crop reload retries cleanly.
    streamer.wait_idle().await;
    let buffer = streamer.buffer(id).unwrap();
    assert_eq!(buffer.level, 0);
    assert_eq!(buffer.region.dimensions(), PointN([16, 128, 32]));
    assert_eq!(host.volumes().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn failed_target_after_preview_keeps_the_preview() {
    let (streamer, source) = streamer(config().with_progressive(true));
    let host = Arc::new(RecordingHost::volume_view());
    let id = streamer.attach_volume(host.clone());
    let mut events = streamer.subscribe();

    source.log().fail_level(1);
    let result = streamer.populate(id).await;
    streamer.wait_idle().await;

    assert!(matches!(result, Err(StreamError::Fetch(_))));
    assert_eq!(source.log().reads(), 2);
    let installed = host.volumes();
    assert_eq!(installed.len(), 1);
    assert_eq!(installed[0].level, 2);
    assert!(matches_synthetic(&installed[0].data, 2, &installed[0].region.aligned));
    assert_eq!(streamer.buffer(id).map(|b| b.level), Some(2));
    assert_eq!(streamer.current_level(id), Some(2));
    assert_eq!(streamer.phase(id), Some(LoadPhase::Idle));
    assert!(drain(&mut events)
        .iter()
        .any(|e| matches!(e, StreamEvent::LoadFailed { level: 1, .. })));

    // The next request fetches the target on top of the preview.
    let outcome = streamer.populate(id).await.unwrap();
    assert!(matches!(outcome, LoadOutcome::Loaded { level: 1, .. }));
    assert_eq!(host.volumes().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn clearing_clip_planes_restores_the_full_region() {
    let (streamer, _) = streamer(config());
    let host = Arc::new(RecordingHost::volume_view());
    let id = streamer.attach_volume(host.clone());
    streamer.populate(id).await.unwrap();
    assert_eq!(streamer.current_level(id), Some(1));
    let mut events = streamer.subscribe();

    streamer.set_crop_box(WorldBox::from_bounds([0.0, 32.0, 0.0, 128.0, 0.0, 16.0]));
    assert_eq!(host.native_planes().len(), 6);
    assert_eq!(streamer.clip_planes().len(), 6);
    streamer.wait_idle().await;
    assert_eq!(streamer.current_level(id), Some(0));

    streamer.clear_clip_planes();
    streamer.wait_idle().await;

    assert!(streamer.clip_planes().is_empty());
    assert!(host.native_planes().is_empty());
    assert_eq!(streamer.clip_box(), streamer.volume_bounds());
    let buffer = streamer.buffer(id).unwrap();
    assert_eq!(buffer.level, 1);
    assert_eq!(buffer.region.aligned, PixelRegion::full(PointN([16, 64, 64])));
    assert!(drain(&mut events)
        .iter()
        .any(|e| *e == StreamEvent::ClipPlanesChanged { planes: vec![] }));
}

#[tokio::test(start_paused = true)]
async fn crop_changes_leave_unpopulated_views_alone() {
    let (streamer, source) = streamer(config());
    let host = Arc::new(RecordingHost::volume_view());
    let id = streamer.attach_volume(host.clone());

    streamer.set_crop_box(WorldBox::from_bounds([0.0, 32.0, 0.0, 128.0, 0.0, 16.0]));
    streamer.request_reload(TriggerReason::Manual);
    streamer.wait_idle().await;

    assert_eq!(host.native_planes().len(), 6);
    assert!(host.volumes().is_empty());
    assert_eq!(source.log().reads(), 0);
    assert_eq!(streamer.current_level(id), None);

    // The crop is still applied by the first explicit load.
    streamer.populate(id).await.unwrap();
    assert_eq!(streamer.buffer(id).unwrap().region.dimensions(), PointN([16, 128, 32]));
}

#[tokio::test(start_paused = true)]
async fn slabs_reload_only_when_the_slice_leaves_them() {
    let (streamer, _) = streamer(config());
    let host = Arc::new(RecordingHost::slice_view());
    streamer.attach_slices(host.clone());
    let mut events = streamer.subscribe();

    let outcome = streamer.set_slice_position(Axis3::Z, 5.0).await.unwrap();
    assert_eq!(
        outcome,
        LoadOutcome::Loaded {
            level: 1,
            dimensions: PointN([8, 64, 64])
        }
    );
    streamer.wait_idle().await;
    let slab_events: Vec<_> = drain(&mut events)
        .into_iter()
        .filter(|e| {
            matches!(
                e,
                StreamEvent::SlabLoadingStart { .. } | StreamEvent::SlabLoadingComplete { .. }
            )
        })
        .collect();
    assert_eq!(
        slab_events,
        vec![
            StreamEvent::SlabLoadingStart {
                axis: Axis3::Z,
                level: 1,
                slab_start: 0,
                slab_end: 8,
                reason: TriggerReason::Initial
            },
            StreamEvent::SlabLoadingComplete {
                axis: Axis3::Z,
                level: 1,
                slab_start: 0,
                slab_end: 8,
                reason: TriggerReason::Initial
            },
        ]
    );

    assert_eq!(
        streamer.set_slice_position(Axis3::Z, 6.0).await.unwrap(),
        LoadOutcome::Unchanged
    );
    streamer.set_slice_position(Axis3::Z, 12.0).await.unwrap();

    let slabs = host.slabs();
    assert_eq!(slabs.len(), 2);
    let (axis, last) = &slabs[1];
    assert_eq!(*axis, Axis3::Z);
    assert_eq!(last.region.aligned.start[0], 8);
    assert_eq!(last.region.aligned.end[0], 16);
    assert!(matches_synthetic(&last.data, 1, &last.region.aligned));
    assert!(streamer.consumers().contains(&ConsumerId::Slab(Axis3::Z)));
}

#[tokio::test]
async fn slices_need_an_attached_slice_view() {
    let (streamer, _) = streamer(config());
    let r = streamer.set_slice_position(Axis3::X, 1.0).await;

    assert!(matches!(r, Err(StreamError::UnknownConsumer(_))));
}

#[tokio::test]
async fn detached_consumers_are_unknown() {
    let (streamer, _) = streamer(config());
    let id = streamer.attach_volume(Arc::new(RecordingHost::volume_view()));
    streamer.detach(id).unwrap();

    assert!(streamer.consumers().is_empty());
    assert!(matches!(
        streamer.populate(id).await,
        Err(StreamError::UnknownConsumer(_))
    ));
    assert!(streamer.detach(id).is_err());
}

#[tokio::test(start_paused = true)]
async fn zoomed_in_camera_allows_a_finer_level() {
    let (streamer, _) = streamer(config().with_viewport_aware(true));
    let top_down = |scale_multiplier| {
        CameraState::Volume(Camera3D {
            azimuth: 180.0,
            elevation: 90.0,
            scale_multiplier,
            canvas_width: 800.0,
            canvas_height: 800.0,
        })
    };
    let host = Arc::new(RecordingHost::new(top_down(4.0)));
    let id = streamer.attach_volume(host.clone());

    streamer.populate(id).await.unwrap();
    let buffer = streamer.buffer(id).unwrap();
    assert_eq!(buffer.level, 0);
    assert_eq!(buffer.region.aligned.start, PointN([0, 32, 32]));
    assert_eq!(buffer.region.aligned.end, PointN([16, 96, 96]));

    host.set_camera(top_down(1.0));
    streamer.notify_viewport_changed();
    streamer.wait_idle().await;
    assert_eq!(streamer.current_level(id), Some(1));
}

#[tokio::test(start_paused = true)]
async fn tiny_volumes_install_normalized_affines() {
    let mut meta = pyramid_metadata(&SHAPES, CHUNK, "uint16");
    for level in meta.iter_mut() {
        for s in level.scale.iter_mut() {
            *s *= 1e-4;
        }
    }
    let source = Arc::new(SyntheticSource::new("tiny", Pyramid::from_metadata(&meta).unwrap()));
    let streamer = VolumeStreamer::new(source, config()).unwrap();
    let host = Arc::new(RecordingHost::volume_view());
    let id = streamer.attach_volume(host.clone());

    streamer.populate(id).await.unwrap();
    let buffer = host.last_volume().unwrap();

    assert_eq!(buffer.normalization_scale, 8192.0);
    assert!(buffer.affine.scale.x() > 1.0);
    let physical = buffer.world_bounds();
    let volume = streamer.volume_bounds();
    assert!(approx_eq(&physical.minimum, &volume.minimum, 1e-12));
    assert!(approx_eq(&physical.maximum, &volume.maximum, 1e-12));
}

#[tokio::test(start_paused = true)]
async fn chunk_store_streams_share_decoded_chunks() {
    let pyramid = uint16_pyramid(&SHAPES, CHUNK);
    let store = Arc::new(SyntheticChunkStore::new("store", &pyramid));
    let streamer =
        VolumeStreamer::from_chunk_store(pyramid, store.clone(), config().with_cache_chunks(64)).unwrap();
    let id = streamer.attach_volume(Arc::new(RecordingHost::volume_view()));

    streamer.populate(id).await.unwrap();
    assert_eq!(store.log().reads(), 8);

    streamer.set_crop_box(WorldBox::from_bounds([0.0, 64.0, 0.0, 128.0, 0.0, 16.0]));
    streamer.populate(id).await.unwrap();
    streamer.wait_idle().await;

    let buffer = streamer.buffer(id).unwrap();
    assert_eq!(buffer.level, 1);
    assert_eq!(buffer.region.aligned.end[2], 32);
    assert!(matches_synthetic(&buffer.data, 1, &buffer.region.aligned));
    assert_eq!(store.log().reads(), 8);
    assert_eq!(streamer.chunk_cache_stats().unwrap().hits, 4);
}

#[test]
fn invalid_configuration_is_rejected_up_front() {
    let source = Arc::new(SyntheticSource::new("s", uint16_pyramid(&SHAPES, CHUNK)));

    assert!(matches!(
        VolumeStreamer::new(source, config().with_max_pixels(0)),
        Err(ConfigError::Invalid(_))
    ));
}
