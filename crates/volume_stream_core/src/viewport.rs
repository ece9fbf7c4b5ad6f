//! Estimates which part of a volume is on screen, by reproducing the render host's camera model.
//!
//! The host draws 3-D views with an orthographic projection rotated by azimuth and elevation, and 2-D slice views by fitting
//! the volume's in-plane extent to the canvas and then applying pan and zoom. `OrthographicViewport` mirrors those formulas.
//! Everything that depends on the host's exact camera math lives behind `ViewportEstimator`, so a different host only needs a
//! different estimator.

use crate::{Axis3, Point3d, PointN, WorldBox};

use serde::{Deserialize, Serialize};

/// Fraction of the pivot-to-corner distance the host's orthographic half-height covers at zoom 1.
pub const ORTHO_SCALE_FACTOR: f64 = 0.8;

/// Camera state of a 3-D volume rendering.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub struct Camera3D {
    /// Degrees.
    pub azimuth: f64,
    /// Degrees.
    pub elevation: f64,
    /// The host's zoom factor; larger values show less of the volume.
    pub scale_multiplier: f64,
    pub canvas_width: f64,
    pub canvas_height: f64,
}

impl Default for Camera3D {
    fn default() -> Self {
        Self {
            azimuth: 110.0,
            elevation: 10.0,
            scale_multiplier: 1.0,
            canvas_width: 1.0,
            canvas_height: 1.0,
        }
    }
}

/// Camera state of a 2-D slice view. `pan` is in the host's (normalized) world units, in `(x, y, z)` order.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub struct Camera2D {
    pub pan: Point3d,
    pub zoom: f64,
    pub canvas_width: f64,
    pub canvas_height: f64,
}

impl Default for Camera2D {
    fn default() -> Self {
        Self {
            pan: Point3d::ZERO,
            zoom: 1.0,
            canvas_width: 1.0,
            canvas_height: 1.0,
        }
    }
}

/// What a render host is currently showing.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub enum CameraState {
    Volume(Camera3D),
    Slices(Camera2D),
}

pub trait ViewportEstimator: Send + Sync {
    /// The world box visible in a 3-D rendering, intersected with `volume`.
    fn visible_bounds_3d(&self, camera: &Camera3D, volume: &WorldBox) -> WorldBox;

    /// The world box visible in a 2-D slice view normal to `slice_axis`, intersected with `volume`. The whole volume depth is
    /// kept along `slice_axis`.
    ///
    /// `normalization_scale` is the factor the consumer multiplied world coordinates by before handing them to the host.
    fn visible_bounds_2d(
        &self,
        camera: &Camera2D,
        slice_axis: Axis3,
        volume: &WorldBox,
        normalization_scale: f64,
    ) -> WorldBox;
}

/// Mirrors an orthographic host camera.
#[derive(Clone, Copy, Debug, Default)]
pub struct OrthographicViewport;

impl OrthographicViewport {
    /// Rows are the screen's right, up and toward-viewer axes expressed in world coordinates.
    ///
    /// The host's model rotation is `Rx(270 - elevation) * Rz(azimuth - 180)`.
    pub fn view_rotation(azimuth: f64, elevation: f64) -> [Point3d; 3] {
        let a = (270.0 - elevation).to_radians();
        let b = (azimuth - 180.0).to_radians();
        let (sa, ca) = a.sin_cos();
        let (sb, cb) = b.sin_cos();

        [
            PointN([cb, -sb, 0.0]),
            PointN([ca * sb, ca * cb, -sa]),
            PointN([sa * sb, sa * cb, ca]),
        ]
    }

    /// Orthographic half width and half height.
    pub fn ortho_half_extents(camera: &Camera3D, volume: &WorldBox) -> (f64, f64) {
        let multiplier = if camera.scale_multiplier > 0.0 {
            camera.scale_multiplier
        } else {
            1.0
        };
        let scale = ORTHO_SCALE_FACTOR * volume.radius() / multiplier;
        let aspect = canvas_aspect(camera.canvas_width, camera.canvas_height);

        if aspect >= 1.0 {
            (scale * aspect, scale)
        } else {
            (scale, scale / aspect)
        }
    }
}

fn canvas_aspect(width: f64, height: f64) -> f64 {
    if width > 0.0 && height > 0.0 {
        width / height
    } else {
        1.0
    }
}

impl ViewportEstimator for OrthographicViewport {
    fn visible_bounds_3d(&self, camera: &Camera3D, volume: &WorldBox) -> WorldBox {
        let (half_w, half_h) = Self::ortho_half_extents(camera, volume);
        let [right, up, depth] = Self::view_rotation(camera.azimuth, camera.elevation);
        let pivot = volume.center();
        // The view ray passes through the whole volume, so depth contributes the volume's full extent along it.
        let extent = volume.extent();
        let half_depth = 0.5 * (0..3).map(|j| depth[j].abs() * extent[j]).sum::<f64>();

        let mut minimum = volume.minimum;
        let mut maximum = volume.maximum;
        for i in 0..3 {
            let half = right[i].abs() * half_w + up[i].abs() * half_h + depth[i].abs() * half_depth;
            minimum[i] = pivot[i] - half;
            maximum[i] = pivot[i] + half;
        }

        WorldBox::from_min_max(minimum, maximum).intersection(volume)
    }

    fn visible_bounds_2d(
        &self,
        camera: &Camera2D,
        slice_axis: Axis3,
        volume: &WorldBox,
        normalization_scale: f64,
    ) -> WorldBox {
        let norm = if normalization_scale > 0.0 {
            normalization_scale
        } else {
            1.0
        };
        let zoom = if camera.zoom > 0.0 { camera.zoom } else { 1.0 };
        let (h_axis, v_axis) = slice_axis.in_plane_axes();

        // The field of view always starts from the full volume, never from whatever is currently loaded.
        let fov = volume.scaled(norm);
        let (mut h_lo, mut h_hi) = (fov.min_on(h_axis), fov.max_on(h_axis));
        let (mut v_lo, mut v_hi) = (fov.min_on(v_axis), fov.max_on(v_axis));

        let width = h_hi - h_lo;
        let height = v_hi - v_lo;
        let canvas = canvas_aspect(camera.canvas_width, camera.canvas_height);
        if height > 0.0 && width > 0.0 {
            if canvas > width / height {
                let grow = 0.5 * (height * canvas - width);
                h_lo -= grow;
                h_hi += grow;
            } else {
                let grow = 0.5 * (width / canvas - height);
                v_lo -= grow;
                v_hi += grow;
            }
        }

        let pan_h = camera.pan[h_axis.index()];
        let pan_v = camera.pan[v_axis.index()];
        let to_world = |c: f64, pan: f64| (c - pan) / zoom / norm;

        volume
            .with_interval(h_axis, to_world(h_lo, pan_h), to_world(h_hi, pan_h))
            .with_interval(v_axis, to_world(v_lo, pan_v), to_world(v_hi, pan_v))
            .intersection(volume)
    }
}

/// `ViewportEstimator::visible_bounds_3d` using the default host model.
pub fn compute_visible_bounds_3d(camera: &Camera3D, volume: &WorldBox) -> WorldBox {
    OrthographicViewport.visible_bounds_3d(camera, volume)
}

/// `ViewportEstimator::visible_bounds_2d` using the default host model.
pub fn compute_visible_bounds_2d(
    camera: &Camera2D,
    slice_axis: Axis3,
    volume: &WorldBox,
    normalization_scale: f64,
) -> WorldBox {
    OrthographicViewport.visible_bounds_2d(camera, slice_axis, volume, normalization_scale)
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝
