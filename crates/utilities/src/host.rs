use volume_stream_core::prelude::*;
use volume_stream_storage::prelude::*;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// A `RenderHost` that records everything it is given.
pub struct RecordingHost {
    camera: Mutex<CameraState>,
    volumes: Mutex<Vec<VolumeBuffer>>,
    slabs: Mutex<Vec<(Axis3, VolumeBuffer)>>,
    native_planes: Mutex<Vec<NativeClipPlane>>,
    redraws: AtomicUsize,
}

impl RecordingHost {
    pub fn new(camera: CameraState) -> Self {
        Self {
            camera: Mutex::new(camera),
            volumes: Default::default(),
            slabs: Default::default(),
            native_planes: Default::default(),
            redraws: AtomicUsize::new(0),
        }
    }

    /// A 3-D view with the default camera.
    pub fn volume_view() -> Self {
        Self::new(CameraState::Volume(Camera3D::default()))
    }

    /// A slice view with the default camera.
    pub fn slice_view() -> Self {
        Self::new(CameraState::Slices(Camera2D::default()))
    }

    pub fn set_camera(&self, camera: CameraState) {
        *self.camera.lock().unwrap() = camera;
    }

    pub fn volumes(&self) -> Vec<VolumeBuffer> {
        self.volumes.lock().unwrap().clone()
    }

    pub fn last_volume(&self) -> Option<VolumeBuffer> {
        self.volumes.lock().unwrap().last().cloned()
    }

    pub fn slabs(&self) -> Vec<(Axis3, VolumeBuffer)> {
        self.slabs.lock().unwrap().clone()
    }

    pub fn native_planes(&self) -> Vec<NativeClipPlane> {
        self.native_planes.lock().unwrap().clone()
    }

    pub fn redraws(&self) -> usize {
        self.redraws.load(Ordering::SeqCst)
    }
}

impl RenderHost for RecordingHost {
    fn camera(&self) -> CameraState {
        *self.camera.lock().unwrap()
    }

    fn install_volume(&self, buffer: VolumeBuffer) {
        self.volumes.lock().unwrap().push(buffer);
    }

    fn install_slab(&self, axis: Axis3, buffer: VolumeBuffer) {
        self.slabs.lock().unwrap().push((axis, buffer));
    }

    fn set_native_clip_planes(&self, planes: Vec<NativeClipPlane>) {
        *self.native_planes.lock().unwrap() = planes;
    }

    fn request_redraw(&self) {
        self.redraws.fetch_add(1, Ordering::SeqCst);
    }
}
