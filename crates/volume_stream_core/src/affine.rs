use crate::{Axis3, PixelRegion, Point3d, Point3i, PointN, WorldBox};

use serde::{Deserialize, Serialize};

/// Slop, in pixel units, tolerated when snapping world coordinates to pixel boundaries.
const SNAP_EPSILON: f64 = 1e-6;

/// A per-axis scale, translation and orientation mapping pixel indices to world coordinates:
///
/// `world[a] = translation[a] + orientation[a] * scale[a] * index[a]`
///
/// All fields are stored in world `(x, y, z)` order, even though pixel indices are `(z, y, x)`.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub struct Affine3 {
    pub scale: Point3d,
    pub translation: Point3d,
    /// `+1` or `-1` per axis. Negative signs flip an anatomical axis.
    pub orientation: [i8; 3],
}

impl Default for Affine3 {
    fn default() -> Self {
        Self {
            scale: PointN([1.0; 3]),
            translation: Point3d::ZERO,
            orientation: [1; 3],
        }
    }
}

impl Affine3 {
    pub fn new(scale: Point3d, translation: Point3d, orientation: [i8; 3]) -> Self {
        Self {
            scale,
            translation,
            orientation: [
                unit_sign(orientation[0]),
                unit_sign(orientation[1]),
                unit_sign(orientation[2]),
            ],
        }
    }

    /// Builds an affine from per-axis metadata given in `(z, y, x)` order, as stored alongside array levels.
    pub fn from_zyx(scale: [f64; 3], translation: [f64; 3], orientation: Option<[i8; 3]>) -> Self {
        let o = orientation.unwrap_or([1; 3]);

        Self::new(
            PointN(scale).reversed(),
            PointN(translation).reversed(),
            [o[2], o[1], o[0]],
        )
    }

    /// The signed step between neighboring pixels along each world axis.
    #[inline]
    pub fn signed_scale(&self) -> Point3d {
        PointN([
            self.scale[0] * f64::from(self.orientation[0]),
            self.scale[1] * f64::from(self.orientation[1]),
            self.scale[2] * f64::from(self.orientation[2]),
        ])
    }

    /// Maps a pixel index (in `(z, y, x)` order, possibly fractional) to world coordinates.
    #[inline]
    pub fn pixel_to_world(&self, index_zyx: Point3d) -> Point3d {
        self.translation + self.signed_scale() * index_zyx.reversed()
    }

    /// Maps a world point to a fractional pixel index in `(z, y, x)` order.
    #[inline]
    pub fn world_to_pixel(&self, world: Point3d) -> Point3d {
        let s = self.signed_scale();
        let xyz = (world - self.translation).zip_with(&s, |d, s| if s == 0.0 { 0.0 } else { d / s });

        xyz.reversed()
    }

    /// The world box covered by the edges of the pixels in `region`.
    #[inline]
    pub fn pixel_region_to_world(&self, region: &PixelRegion) -> WorldBox {
        WorldBox::from_corners(
            self.pixel_to_world(region.start.as_f64()),
            self.pixel_to_world(region.end.as_f64()),
        )
    }

    /// The smallest pixel region within a level of `shape` that covers `world`.
    ///
    /// The result is always clamped into `[0, shape]` and ordered. A box that collapses to zero width on some axis still yields
    /// one pixel on that axis, so degenerate crops keep showing the slice they collapsed onto.
    pub fn world_to_pixel_region(&self, world: &WorldBox, shape: Point3i) -> PixelRegion {
        let a = self.world_to_pixel(world.minimum);
        let b = self.world_to_pixel(world.maximum);
        let lo = a.meet(&b);
        let hi = a.join(&b);

        let mut start = lo.map(|c| (c + SNAP_EPSILON).floor() as i64);
        let mut end = hi.map(|c| (c - SNAP_EPSILON).ceil() as i64);
        for i in 0..3 {
            start[i] = start[i].max(0).min(shape[i]);
            end[i] = end[i].max(0).min(shape[i]);
            if end[i] < start[i] {
                std::mem::swap(&mut start[i], &mut end[i]);
            }
            if start[i] == end[i] {
                if end[i] < shape[i] {
                    end[i] += 1;
                } else if start[i] > 0 {
                    start[i] -= 1;
                }
            }
        }

        PixelRegion::new(start, end)
    }

    /// The world box of a whole level with `shape`.
    #[inline]
    pub fn level_bounds(&self, shape: Point3i) -> WorldBox {
        self.pixel_region_to_world(&PixelRegion::full(shape))
    }

    /// The affine of a buffer whose first pixel is `origin` within this level.
    #[inline]
    pub fn with_origin(&self, origin: Point3i) -> Self {
        Self {
            translation: self.pixel_to_world(origin.as_f64()),
            ..*self
        }
    }

    /// Uniformly rescales world space by `factor`. Used to keep coordinates of very small or very large volumes in a
    /// numerically comfortable range.
    #[inline]
    pub fn rescaled(&self, factor: f64) -> Self {
        Self {
            scale: self.scale * factor,
            translation: self.translation * factor,
            orientation: self.orientation,
        }
    }

    /// The world spacing along `axis`.
    #[inline]
    pub fn spacing_on(&self, axis: Axis3) -> f64 {
        self.scale[axis.index()]
    }
}

fn unit_sign(s: i8) -> i8 {
    if s < 0 {
        -1
    } else {
        1
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝
