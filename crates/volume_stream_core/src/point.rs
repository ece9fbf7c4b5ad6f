use core::ops::{Add, AddAssign, Div, Index, IndexMut, Mul, Neg, Sub, SubAssign};
use num::{Float, Num};
use serde::{Deserialize, Serialize};

/// An N-dimensional point, which is usually just a primitive array of type `N`.
///
/// ```
/// use volume_stream_core::PointN;
///
/// let p1 = PointN([1, 2, 3]);
/// let p2 = PointN([3, 4, 5]);
///
/// assert_eq!(p1 + p2, PointN([4, 6, 8]));
/// assert_eq!(p2 - p1, PointN([2, 2, 2]));
/// assert_eq!(p1 * 2, PointN([2, 4, 6]));
/// ```
///
/// Which component belongs to which axis is decided by the type that holds the point. World-space points are stored `(x, y, z)`,
/// while pixel indices are stored `(z, y, x)` to match the array layout of a level.
#[derive(Copy, Clone, Debug, Deserialize, Default, Eq, Hash, PartialEq, Serialize)]
pub struct PointN<N>(pub N);

/// A 3-dimensional point with scalar type `T`.
pub type Point3<T> = PointN<[T; 3]>;
/// A 3-dimensional point with scalar type `i64`, used for pixel indices.
pub type Point3i = PointN<[i64; 3]>;
/// A 3-dimensional point with scalar type `f64`, used for world coordinates.
pub type Point3d = PointN<[f64; 3]>;

impl<T: Copy> Point3<T> {
    #[inline]
    pub fn fill(value: T) -> Self {
        PointN([value; 3])
    }

    /// Component 0. Only names the x axis on world points; pixel indices are `(z, y, x)`, so index those directly.
    #[inline]
    pub fn x(&self) -> T {
        self.0[0]
    }

    #[inline]
    pub fn y(&self) -> T {
        self.0[1]
    }

    /// Component 2. On a pixel index this is the x axis.
    #[inline]
    pub fn z(&self) -> T {
        self.0[2]
    }

    /// Returns the point after applying `f` component-wise.
    #[inline]
    pub fn map<U>(&self, f: impl Fn(T) -> U) -> Point3<U> {
        let [a, b, c] = self.0;

        PointN([f(a), f(b), f(c)])
    }

    /// Combines `self` and `other` component-wise with `f`.
    #[inline]
    pub fn zip_with<U, V>(&self, other: &Point3<U>, f: impl Fn(T, U) -> V) -> Point3<V>
    where
        U: Copy,
    {
        PointN([
            f(self.0[0], other.0[0]),
            f(self.0[1], other.0[1]),
            f(self.0[2], other.0[2]),
        ])
    }

    /// The same point with components in reverse order. Converts between `(x, y, z)` and `(z, y, x)`.
    #[inline]
    pub fn reversed(&self) -> Self {
        PointN([self.0[2], self.0[1], self.0[0]])
    }
}

impl<T> Point3<T>
where
    T: Copy + PartialOrd,
{
    /// Component-wise minimum.
    #[inline]
    pub fn meet(&self, other: &Self) -> Self {
        self.zip_with(other, |a, b| if b < a { b } else { a })
    }

    /// Component-wise maximum.
    #[inline]
    pub fn join(&self, other: &Self) -> Self {
        self.zip_with(other, |a, b| if b > a { b } else { a })
    }

    #[inline]
    pub fn max_component(&self) -> T {
        let [a, b, c] = self.0;
        let ab = if b > a { b } else { a };

        if c > ab {
            c
        } else {
            ab
        }
    }

    /// Returns `true` iff every component of `self` is less than or equal to the same component of `other`.
    #[inline]
    pub fn all_le(&self, other: &Self) -> bool {
        self.0.iter().zip(other.0.iter()).all(|(a, b)| a <= b)
    }
}

impl<T> Point3<T>
where
    T: Copy + Num,
{
    /// The product of all components.
    #[inline]
    pub fn volume(&self) -> T {
        self.0[0] * self.0[1] * self.0[2]
    }

    #[inline]
    pub fn dot(&self, other: &Self) -> T {
        self.0[0] * other.0[0] + self.0[1] * other.0[1] + self.0[2] * other.0[2]
    }
}

impl Point3d {
    pub const ZERO: Self = PointN([0.0; 3]);

    #[inline]
    pub fn abs(&self) -> Self {
        self.map(f64::abs)
    }

    #[inline]
    pub fn norm(&self) -> f64 {
        self.dot(self).sqrt()
    }

    /// The unit vector pointing in the same direction, or the zero vector when the norm is zero.
    #[inline]
    pub fn normalized(&self) -> Self {
        let n = self.norm();
        if n == 0.0 {
            Self::ZERO
        } else {
            *self / n
        }
    }

    #[inline]
    pub fn floor(&self) -> Point3i {
        self.map(|c| c.floor() as i64)
    }

    #[inline]
    pub fn ceil(&self) -> Point3i {
        self.map(|c| c.ceil() as i64)
    }

    /// Returns `true` iff all components are finite.
    #[inline]
    pub fn is_finite(&self) -> bool {
        self.0.iter().all(|c| c.is_finite())
    }
}

impl Point3i {
    pub const ZERO: Self = PointN([0; 3]);
    pub const ONES: Self = PointN([1; 3]);

    #[inline]
    pub fn as_f64(&self) -> Point3d {
        self.map(|c| c as f64)
    }
}

/// Returns `true` iff `a` and `b` are within `eps` of each other on every axis.
pub fn approx_eq<T: Float>(a: &Point3<T>, b: &Point3<T>, eps: T) -> bool {
    a.0.iter().zip(b.0.iter()).all(|(x, y)| (*x - *y).abs() <= eps)
}

impl<T> Index<usize> for Point3<T> {
    type Output = T;

    #[inline]
    fn index(&self, i: usize) -> &T {
        &self.0[i]
    }
}

impl<T> IndexMut<usize> for Point3<T> {
    #[inline]
    fn index_mut(&mut self, i: usize) -> &mut T {
        &mut self.0[i]
    }
}

macro_rules! impl_componentwise_op {
    ($trait:ident, $method:ident, $op:tt) => {
        impl<T> $trait for Point3<T>
        where
            T: Copy + $trait<Output = T>,
        {
            type Output = Self;

            #[inline]
            fn $method(self, rhs: Self) -> Self {
                self.zip_with(&rhs, |a, b| a $op b)
            }
        }

        impl<T> $trait<T> for Point3<T>
        where
            T: Copy + $trait<Output = T>,
        {
            type Output = Self;

            #[inline]
            fn $method(self, rhs: T) -> Self {
                self.map(|a| a $op rhs)
            }
        }
    };
}

impl_componentwise_op!(Add, add, +);
impl_componentwise_op!(Sub, sub, -);
impl_componentwise_op!(Mul, mul, *);
impl_componentwise_op!(Div, div, /);

impl<T> Neg for Point3<T>
where
    T: Copy + Neg<Output = T>,
{
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        self.map(|a| -a)
    }
}

impl<T> AddAssign for Point3<T>
where
    T: Copy + Add<Output = T>,
{
    #[inline]
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl<T> SubAssign for Point3<T>
where
    T: Copy + Sub<Output = T>,
{
    #[inline]
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝
