//! The core geometry for streaming multi-resolution volumes:
//! - `PointN`: small fixed-size points, most importantly `Point3i` (pixel indices) and `Point3d` (world coordinates)
//! - `WorldBox`: world-space axis-aligned boxes
//! - `PixelRegion` and `ChunkAligner`: integer regions of a pyramid level and their chunk-aligned expansions
//! - `Affine3`: conversion between pixel indices and world coordinates
//! - `clip`: crop boxes, clip planes and the render host's plane encoding
//! - `viewport`: what part of the volume a render host currently shows

pub mod affine;
pub mod axis;
pub mod clip;
pub mod pixel_region;
pub mod point;
pub mod viewport;
pub mod world_box;

pub use affine::Affine3;
pub use axis::{Axis3, SignedAxis3};
pub use clip::{
    box_to_planes, planes_from_native, planes_to_box, planes_to_native, ClipPlane, ClipRegion,
    NativeClipPlane, MAX_CLIP_PLANES,
};
pub use pixel_region::{ChunkAlignedRegion, ChunkAligner, PixelRegion};
pub use point::{approx_eq, Point3, Point3d, Point3i, PointN};
pub use viewport::{
    compute_visible_bounds_2d, compute_visible_bounds_3d, Camera2D, Camera3D, CameraState,
    OrthographicViewport, ViewportEstimator,
};
pub use world_box::WorldBox;

pub use num;

pub mod prelude {
    pub use super::{
        Affine3, Axis3, Camera2D, Camera3D, CameraState, ChunkAlignedRegion, ChunkAligner,
        ClipPlane, ClipRegion, NativeClipPlane, OrthographicViewport, PixelRegion, Point3, Point3d, Point3i, PointN,
        SignedAxis3, ViewportEstimator, WorldBox,
    };
}
