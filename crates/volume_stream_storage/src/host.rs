use crate::RegionData;

use volume_stream_core::prelude::*;

use std::sync::Arc;

/// The renderer a consumer streams into.
///
/// Calls arrive from the streamer's tasks, so implementations hand the data to their own render thread rather than drawing
/// inline.
pub trait RenderHost: Send + Sync {
    /// A snapshot of what the host currently shows.
    fn camera(&self) -> CameraState;

    /// Replaces the 3-D buffer. The buffer's shape and affine may differ from the previous one.
    fn install_volume(&self, buffer: VolumeBuffer);

    /// Replaces the slab shown by the slice view normal to `axis`.
    fn install_slab(&self, axis: Axis3, buffer: VolumeBuffer);

    /// Replaces the host's clip planes. At most six entries, in the host's native encoding.
    fn set_native_clip_planes(&self, planes: Vec<NativeClipPlane>);

    fn request_redraw(&self);
}

/// A loaded region, sized exactly to the chunk-aligned region that was fetched.
#[derive(Clone, Debug, PartialEq)]
pub struct VolumeBuffer {
    pub data: Arc<RegionData>,
    pub level: usize,
    pub region: ChunkAlignedRegion,
    /// Maps buffer pixel indices to normalized world coordinates.
    pub affine: Affine3,
    pub normalization_scale: f64,
}

impl VolumeBuffer {
    /// The affine in the pyramid's own world units.
    pub fn physical_affine(&self) -> Affine3 {
        self.affine.rescaled(1.0 / self.normalization_scale)
    }

    /// The physical world box covered by the buffer.
    pub fn world_bounds(&self) -> WorldBox {
        self.physical_affine()
            .level_bounds(self.region.dimensions())
    }
}
