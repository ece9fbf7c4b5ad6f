use crate::{Point3d, PointN};

use serde::{Deserialize, Serialize};

/// Either the X, Y, or Z world axis.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum Axis3 {
    X = 0,
    Y = 1,
    Z = 2,
}

impl Axis3 {
    pub const ALL: [Axis3; 3] = [Axis3::X, Axis3::Y, Axis3::Z];

    /// The index for a world point's component on this axis.
    #[inline]
    pub fn index(&self) -> usize {
        *self as usize
    }

    /// The index for a pixel index's component on this axis. Pixel indices are stored `(z, y, x)`.
    #[inline]
    pub fn pixel_index(&self) -> usize {
        2 - self.index()
    }

    pub fn unit_vector(&self) -> Point3d {
        match self {
            Axis3::X => PointN([1.0, 0.0, 0.0]),
            Axis3::Y => PointN([0.0, 1.0, 0.0]),
            Axis3::Z => PointN([0.0, 0.0, 1.0]),
        }
    }

    /// The two axes spanning a slice whose normal is `self`, as `(horizontal, vertical)` on screen.
    ///
    /// Axial slices (normal Z) show X across and Y up, coronal slices (normal Y) show X and Z, sagittal slices (normal X) show
    /// Y and Z.
    pub fn in_plane_axes(&self) -> (Axis3, Axis3) {
        match self {
            Axis3::X => (Axis3::Y, Axis3::Z),
            Axis3::Y => (Axis3::X, Axis3::Z),
            Axis3::Z => (Axis3::X, Axis3::Y),
        }
    }
}

/// An axis with a direction.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct SignedAxis3 {
    pub sign: i8,
    pub axis: Axis3,
}

impl SignedAxis3 {
    pub fn new(sign: i8, axis: Axis3) -> Self {
        Self {
            sign: if sign < 0 { -1 } else { 1 },
            axis,
        }
    }

    /// The six canonical directions in the order `+X, -X, +Y, -Y, +Z, -Z`.
    pub fn all() -> [SignedAxis3; 6] {
        [
            SignedAxis3::new(1, Axis3::X),
            SignedAxis3::new(-1, Axis3::X),
            SignedAxis3::new(1, Axis3::Y),
            SignedAxis3::new(-1, Axis3::Y),
            SignedAxis3::new(1, Axis3::Z),
            SignedAxis3::new(-1, Axis3::Z),
        ]
    }

    pub fn vector(&self) -> Point3d {
        self.axis.unit_vector() * f64::from(self.sign)
    }

    /// Recognizes `v` as one of the six canonical directions, allowing `tolerance` of slop in each component.
    pub fn from_vector(v: Point3d, tolerance: f64) -> Option<Self> {
        let n = v.normalized();
        Axis3::ALL.iter().find_map(|&axis| {
            let c = n[axis.index()];
            if (c.abs() - 1.0).abs() <= tolerance {
                Some(SignedAxis3::new(if c < 0.0 { -1 } else { 1 }, axis))
            } else {
                None
            }
        })
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

    #[test]
    fn pixel_index_reverses_world_index() {
        assert_eq!(Axis3::X.pixel_index(), 2);
        assert_eq!(Axis3::Y.pixel_index(), 1);
        assert_eq!(Axis3::Z.pixel_index(), 0);
    }

    #[test]
    fn canonical_directions_round_trip_through_vectors() {
        for dir in SignedAxis3::all().iter() {
            assert_eq!(SignedAxis3::from_vector(dir.vector(), 1e-9), Some(*dir));
        }
        assert_eq!(SignedAxis3::from_vector(PointN([1.0, 1.0, 0.0]), 1e-6), None);
    }
}
