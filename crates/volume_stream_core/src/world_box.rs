use crate::{Axis3, Point3d, PointN};

use serde::{Deserialize, Serialize};

/// An axis-aligned box in world space, stored as `(x, y, z)` minimum and maximum corners.
///
/// Every constructor and combinator keeps `minimum <= maximum` on each axis. Inverted inputs are collapsed rather than rejected,
/// since they arise naturally from interactive crop sliders.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub struct WorldBox {
    pub minimum: Point3d,
    pub maximum: Point3d,
}

impl WorldBox {
    /// Constructs the box spanned by two arbitrary corners.
    #[inline]
    pub fn from_corners(a: Point3d, b: Point3d) -> Self {
        Self {
            minimum: a.meet(&b),
            maximum: a.join(&b),
        }
    }

    /// Constructs a box from a `minimum` and `maximum`. Any axis where `maximum < minimum` collapses to a zero-width interval at
    /// the midpoint.
    #[inline]
    pub fn from_min_max(minimum: Point3d, maximum: Point3d) -> Self {
        let mut out = Self { minimum, maximum };
        for i in 0..3 {
            if out.maximum[i] < out.minimum[i] {
                let mid = 0.5 * (out.minimum[i] + out.maximum[i]);
                out.minimum[i] = mid;
                out.maximum[i] = mid;
            }
        }

        out
    }

    /// The 6-valued `[x_min, x_max, y_min, y_max, z_min, z_max]` form.
    #[inline]
    pub fn from_bounds(bounds: [f64; 6]) -> Self {
        let [x0, x1, y0, y1, z0, z1] = bounds;

        Self::from_min_max(PointN([x0, y0, z0]), PointN([x1, y1, z1]))
    }

    #[inline]
    pub fn to_bounds(&self) -> [f64; 6] {
        [
            self.minimum.x(),
            self.maximum.x(),
            self.minimum.y(),
            self.maximum.y(),
            self.minimum.z(),
            self.maximum.z(),
        ]
    }

    #[inline]
    pub fn extent(&self) -> Point3d {
        self.maximum - self.minimum
    }

    #[inline]
    pub fn center(&self) -> Point3d {
        (self.minimum + self.maximum) * 0.5
    }

    /// Distance from the center to the farthest corner.
    #[inline]
    pub fn radius(&self) -> f64 {
        self.extent().norm() * 0.5
    }

    #[inline]
    pub fn min_on(&self, axis: Axis3) -> f64 {
        self.minimum[axis.index()]
    }

    #[inline]
    pub fn max_on(&self, axis: Axis3) -> f64 {
        self.maximum[axis.index()]
    }

    /// Replaces the interval on `axis`, keeping it ordered.
    #[inline]
    pub fn with_interval(&self, axis: Axis3, min: f64, max: f64) -> Self {
        let mut out = *self;
        out.minimum[axis.index()] = min.min(max);
        out.maximum[axis.index()] = min.max(max);

        out
    }

    #[inline]
    pub fn contains(&self, p: Point3d) -> bool {
        self.minimum.all_le(&p) && p.all_le(&self.maximum)
    }

    /// Returns `true` iff `self` lies entirely within `other`.
    #[inline]
    pub fn is_subset_of(&self, other: &Self) -> bool {
        other.minimum.all_le(&self.minimum) && self.maximum.all_le(&other.maximum)
    }

    /// The box containing only points in both `self` and `other`. Disjoint inputs produce a zero-width box on the separating
    /// axis, pinned inside `other`.
    #[inline]
    pub fn intersection(&self, other: &Self) -> Self {
        let minimum = self.minimum.join(&other.minimum);
        let maximum = self.maximum.meet(&other.maximum);
        let mut out = Self { minimum, maximum };
        for i in 0..3 {
            if out.maximum[i] < out.minimum[i] {
                let pinned = out.minimum[i].min(other.maximum[i]).max(other.minimum[i]);
                out.minimum[i] = pinned;
                out.maximum[i] = pinned;
            }
        }

        out
    }

    /// Grows the box by `fraction` of its own extent on every side, then clamps to `limit`.
    #[inline]
    pub fn expand_by_margin(&self, fraction: f64, limit: &Self) -> Self {
        let pad = self.extent() * fraction.max(0.0);

        Self::from_min_max(self.minimum - pad, self.maximum + pad).intersection(limit)
    }

    /// Returns `true` iff any axis has zero width.
    #[inline]
    pub fn is_degenerate(&self) -> bool {
        let e = self.extent();

        e.x() <= 0.0 || e.y() <= 0.0 || e.z() <= 0.0
    }

    /// Uniformly scales both corners by `factor`.
    #[inline]
    pub fn scaled(&self, factor: f64) -> Self {
        Self::from_corners(self.minimum * factor, self.maximum * factor)
    }
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

    use pretty_assertions::assert_eq;

    fn unit_volume() -> WorldBox {
        WorldBox::from_bounds([0.0, 10.0, 0.0, 20.0, 0.0, 4.0])
    }

    #[test]
    fn intersecting_with_itself_is_identity() {
        let v = unit_volume();
        assert_eq!(v.intersection(&v), v);
    }

    #[test]
    fn inverted_bounds_collapse_to_midpoint() {
        let b = WorldBox::from_bounds([5.0, 3.0, 0.0, 1.0, 0.0, 1.0]);
        assert_eq!(b.minimum.x(), 4.0);
        assert_eq!(b.maximum.x(), 4.0);
    }

    #[test]
    fn disjoint_intersection_is_ordered_and_inside_other() {
        let a = WorldBox::from_bounds([20.0, 30.0, 0.0, 5.0, 0.0, 1.0]);
        let v = unit_volume();
        let i = a.intersection(&v);
        assert!(i.minimum.all_le(&i.maximum));
        assert!(i.is_subset_of(&v));
        assert!(i.is_degenerate());
    }

    #[test]
    fn margin_expansion_is_clamped_to_limit() {
        let v = unit_volume();
        let inner = WorldBox::from_bounds([2.0, 8.0, 5.0, 15.0, 1.0, 3.0]);
        let grown = inner.expand_by_margin(0.5, &v);
        assert_eq!(grown, WorldBox::from_bounds([0.0, 10.0, 0.0, 20.0, 0.0, 4.0]));

        let small = inner.expand_by_margin(0.1, &v);
        assert!((small.minimum.x() - 1.4).abs() < 1e-12);
        assert!((small.maximum.y() - 16.0).abs() < 1e-12);
    }
}
