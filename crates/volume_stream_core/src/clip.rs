//! Crop geometry: axis-aligned clip boxes, half-space clip planes, and the render host's native plane encoding.
//!
//! A clip plane keeps the half-space its normal points into. Six axis-aligned planes with inward normals describe the same
//! region as a clip box, and the conversions in this module move between the two forms. Planes whose normals are not one of
//! the six canonical directions cannot be expressed as a box; they are carried through unchanged but do not narrow the box
//! form.

use crate::{Axis3, Point3d, PointN, SignedAxis3, WorldBox};

use serde::{Deserialize, Serialize};

/// The most clip planes a render host accepts.
pub const MAX_CLIP_PLANES: usize = 6;

/// Tolerance used to recognize a plane normal as one of the six canonical directions.
const CANONICAL_NORMAL_TOLERANCE: f64 = 1e-6;

/// A half-space `{ p : (p - point) . normal >= 0 }`.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub struct ClipPlane {
    pub point: Point3d,
    /// Unit normal pointing into the kept side.
    pub normal: Point3d,
}

impl ClipPlane {
    pub fn new(point: Point3d, normal: Point3d) -> Self {
        Self {
            point,
            normal: normal.normalized(),
        }
    }

    /// Returns `true` iff `p` is on the kept side (or on the plane).
    #[inline]
    pub fn keeps(&self, p: Point3d) -> bool {
        (p - self.point).dot(&self.normal) >= 0.0
    }

    /// The canonical direction of the normal, if it is axis-aligned.
    #[inline]
    pub fn canonical_direction(&self) -> Option<SignedAxis3> {
        SignedAxis3::from_vector(self.normal, CANONICAL_NORMAL_TOLERANCE)
    }
}

/// The visible part of a volume, as either a box or a set of half-spaces.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub enum ClipRegion {
    Box(WorldBox),
    Planes(Vec<ClipPlane>),
}

impl Default for ClipRegion {
    fn default() -> Self {
        ClipRegion::Planes(Vec::new())
    }
}

impl ClipRegion {
    /// A plane region keeping at most `MAX_CLIP_PLANES` planes.
    pub fn from_planes(mut planes: Vec<ClipPlane>) -> Self {
        planes.truncate(MAX_CLIP_PLANES);

        ClipRegion::Planes(planes)
    }

    /// Returns `true` iff nothing is cropped.
    pub fn is_unclipped(&self) -> bool {
        matches!(self, ClipRegion::Planes(p) if p.is_empty())
    }

    /// The axis-aligned box form, always within `volume`.
    pub fn to_box(&self, volume: &WorldBox) -> WorldBox {
        match self {
            ClipRegion::Box(b) => b.intersection(volume),
            ClipRegion::Planes(planes) => planes_to_box(planes, volume),
        }
    }

    /// The half-space form.
    pub fn to_planes(&self) -> Vec<ClipPlane> {
        match self {
            ClipRegion::Box(b) => box_to_planes(b),
            ClipRegion::Planes(planes) => planes.clone(),
        }
    }
}

/// Six inward-facing planes bounding `clip`, ordered `x_min, x_max, y_min, y_max, z_min, z_max`.
pub fn box_to_planes(clip: &WorldBox) -> Vec<ClipPlane> {
    let center = clip.center();
    let mut planes = Vec::with_capacity(MAX_CLIP_PLANES);
    for &axis in Axis3::ALL.iter() {
        let mut lo = center;
        lo[axis.index()] = clip.min_on(axis);
        planes.push(ClipPlane::new(lo, axis.unit_vector()));

        let mut hi = center;
        hi[axis.index()] = clip.max_on(axis);
        planes.push(ClipPlane::new(hi, -axis.unit_vector()));
    }

    planes
}

/// Narrows `volume` by every axis-aligned plane in `planes`. Opposing planes that cross collapse the axis rather than
/// inverting it.
pub fn planes_to_box(planes: &[ClipPlane], volume: &WorldBox) -> WorldBox {
    let mut minimum = volume.minimum;
    let mut maximum = volume.maximum;
    for plane in planes {
        if let Some(dir) = plane.canonical_direction() {
            let i = dir.axis.index();
            let at = plane.point[i];
            if dir.sign > 0 {
                minimum[i] = minimum[i].max(at);
            } else {
                maximum[i] = maximum[i].min(at);
            }
        }
    }

    WorldBox::from_min_max(minimum, maximum).intersection(volume)
}

/// A clip plane as the render host encodes it: a signed normalized depth plus the azimuth and elevation of the normal.
///
/// The normal for `(azimuth, elevation)` is `(sin az cos el, cos az cos el, sin el)`, so the six canonical directions are
/// `+X = (90, 0)`, `-X = (270, 0)`, `+Y = (0, 0)`, `-Y = (180, 0)`, `+Z = (0, 90)` and `-Z = (0, -90)`.
///
/// `depth` places the plane along its normal relative to the volume center, in units of the volume's half extent on that axis:
/// `coordinate = center + sign * depth * half_extent`. A full-volume box therefore encodes as six planes at depth `-1`.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub struct NativeClipPlane {
    pub depth: f64,
    pub azimuth: f64,
    pub elevation: f64,
}

impl NativeClipPlane {
    /// The fixed `(azimuth, elevation)` pair in degrees for a canonical direction.
    pub fn angles_for(dir: SignedAxis3) -> (f64, f64) {
        match (dir.axis, dir.sign > 0) {
            (Axis3::X, true) => (90.0, 0.0),
            (Axis3::X, false) => (270.0, 0.0),
            (Axis3::Y, true) => (0.0, 0.0),
            (Axis3::Y, false) => (180.0, 0.0),
            (Axis3::Z, true) => (0.0, 90.0),
            (Axis3::Z, false) => (0.0, -90.0),
        }
    }

    /// The unit normal described by the angles.
    pub fn normal(&self) -> Point3d {
        let az = self.azimuth.to_radians();
        let el = self.elevation.to_radians();

        PointN([az.sin() * el.cos(), az.cos() * el.cos(), el.sin()])
    }

    /// Encodes an axis-aligned `plane` against `volume`. Returns `None` for planes that are not axis-aligned.
    ///
    /// When `volume` has zero extent on the plane's axis, the depth is `0`.
    pub fn from_plane(plane: &ClipPlane, volume: &WorldBox) -> Option<Self> {
        let dir = plane.canonical_direction()?;
        let axis = dir.axis;
        let half = 0.5 * (volume.max_on(axis) - volume.min_on(axis));
        let center = volume.center()[axis.index()];
        let depth = if half > 0.0 {
            (plane.point[axis.index()] - center) / (half * f64::from(dir.sign))
        } else {
            0.0
        };
        let (azimuth, elevation) = Self::angles_for(dir);

        Some(Self {
            depth,
            azimuth,
            elevation,
        })
    }

    /// Decodes into a point and normal within `volume`. Returns `None` when the angles are not one of the canonical pairs.
    pub fn to_plane(&self, volume: &WorldBox) -> Option<ClipPlane> {
        let dir = SignedAxis3::from_vector(self.normal(), CANONICAL_NORMAL_TOLERANCE)?;
        let axis = dir.axis;
        let half = 0.5 * (volume.max_on(axis) - volume.min_on(axis));
        let mut point = volume.center();
        point[axis.index()] += f64::from(dir.sign) * self.depth * half;

        Some(ClipPlane::new(point, dir.vector()))
    }
}

/// Encodes every axis-aligned plane for the host, dropping any that cannot be expressed.
pub fn planes_to_native(planes: &[ClipPlane], volume: &WorldBox) -> Vec<NativeClipPlane> {
    planes
        .iter()
        .filter_map(|p| NativeClipPlane::from_plane(p, volume))
        .take(MAX_CLIP_PLANES)
        .collect()
}

/// Decodes the host's planes, dropping any with non-canonical angles.
pub fn planes_from_native(native: &[NativeClipPlane], volume: &WorldBox) -> Vec<ClipPlane> {
    native
        .iter()
        .filter_map(|n| n.to_plane(volume))
        .take(MAX_CLIP_PLANES)
        .collect()
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝
