use crate::{Axis3, Point3i, PointN};

use itertools::iproduct;
use serde::{Deserialize, Serialize};

/// A half-open box of pixel indices `[start, end)` within one pyramid level, stored in `(z, y, x)` order.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct PixelRegion {
    pub start: Point3i,
    pub end: Point3i,
}

impl PixelRegion {
    /// Constructs the region `[start, end)`, clamping `end` so the shape is never negative.
    #[inline]
    pub fn new(start: Point3i, end: Point3i) -> Self {
        Self {
            start,
            end: end.join(&start),
        }
    }

    /// The whole of a level with `shape`.
    #[inline]
    pub fn full(shape: Point3i) -> Self {
        Self::new(Point3i::ZERO, shape)
    }

    #[inline]
    pub fn shape(&self) -> Point3i {
        self.end - self.start
    }

    #[inline]
    pub fn num_pixels(&self) -> u64 {
        self.shape().volume().max(0) as u64
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.num_pixels() == 0
    }

    /// Number of pixels along a world `axis`.
    #[inline]
    pub fn len_on(&self, axis: Axis3) -> i64 {
        let i = axis.pixel_index();

        self.end[i] - self.start[i]
    }

    /// Replaces the interval on a world `axis`.
    #[inline]
    pub fn with_interval(&self, axis: Axis3, start: i64, end: i64) -> Self {
        let i = axis.pixel_index();
        let mut out = *self;
        out.start[i] = start;
        out.end[i] = end.max(start);

        out
    }

    /// The region containing only pixels in both `self` and `other`.
    #[inline]
    pub fn intersection(&self, other: &Self) -> Self {
        Self::new(self.start.join(&other.start), self.end.meet(&other.end))
    }

    #[inline]
    pub fn contains_region(&self, other: &Self) -> bool {
        self.start.all_le(&other.start) && other.end.all_le(&self.end)
    }

    /// Clamps both corners into `[0, shape]` and orders them.
    #[inline]
    pub fn clamped_to(&self, shape: Point3i) -> Self {
        let lo = self.start.join(&Point3i::ZERO).meet(&shape);
        let hi = self.end.join(&Point3i::ZERO).meet(&shape);

        Self::new(lo.meet(&hi), lo.join(&hi))
    }
}

/// A `PixelRegion` together with the same region expanded outward to whole chunks.
///
/// Consumers that must not display the padding margin can crop back to `requested` when `expanded` is set.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct ChunkAlignedRegion {
    pub requested: PixelRegion,
    pub aligned: PixelRegion,
    pub expanded: bool,
}

impl ChunkAlignedRegion {
    /// The shape of the buffer that holds the aligned region.
    #[inline]
    pub fn dimensions(&self) -> Point3i {
        self.aligned.shape()
    }

    /// Where `requested` sits inside the aligned buffer.
    #[inline]
    pub fn crop_within_aligned(&self) -> PixelRegion {
        PixelRegion::new(
            self.requested.start - self.aligned.start,
            self.requested.end - self.aligned.start,
        )
    }
}

/// Calculates chunk boundaries for a level with a fixed chunk shape. Unlike lattice chunk maps, pyramid levels are finite and
/// their last chunk along each axis may be clipped by the level shape.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ChunkAligner {
    chunk_shape: Point3i,
    level_shape: Point3i,
}

impl ChunkAligner {
    /// Non-positive chunk dimensions are treated as 1.
    #[inline]
    pub fn new(chunk_shape: Point3i, level_shape: Point3i) -> Self {
        Self {
            chunk_shape: chunk_shape.join(&Point3i::ONES),
            level_shape: level_shape.join(&Point3i::ZERO),
        }
    }

    #[inline]
    pub fn chunk_shape(&self) -> Point3i {
        self.chunk_shape
    }

    #[inline]
    pub fn level_shape(&self) -> Point3i {
        self.level_shape
    }

    /// The number of chunks along each axis, counting partial edge chunks.
    #[inline]
    pub fn grid_shape(&self) -> Point3i {
        self.level_shape
            .zip_with(&self.chunk_shape, |s, c| (s + c - 1).div_euclid(c))
    }

    /// Expands `region` outward to whole chunks, capped at the level shape.
    ///
    /// Aligning an aligned region returns it unchanged.
    #[inline]
    pub fn align(&self, region: &PixelRegion) -> ChunkAlignedRegion {
        let requested = region.clamped_to(self.level_shape);
        let start = requested
            .start
            .zip_with(&self.chunk_shape, |s, c| s.div_euclid(c) * c);
        let end = requested
            .end
            .zip_with(&self.chunk_shape, |e, c| (e + c - 1).div_euclid(c) * c)
            .meet(&self.level_shape);
        let aligned = PixelRegion::new(start, end);

        ChunkAlignedRegion {
            requested,
            aligned,
            expanded: aligned != requested,
        }
    }

    /// The chunk containing pixel index `p`.
    #[inline]
    pub fn chunk_containing(&self, p: Point3i) -> Point3i {
        p.zip_with(&self.chunk_shape, |v, c| v.div_euclid(c))
    }

    /// The pixel region covered by the chunk at grid coordinates `chunk`, clipped to the level shape.
    #[inline]
    pub fn chunk_region(&self, chunk: Point3i) -> PixelRegion {
        let start = chunk * self.chunk_shape;

        PixelRegion::new(start, (start + self.chunk_shape).meet(&self.level_shape))
    }

    /// Grid coordinates for all chunks overlapping `region`, in `(z, y, x)` row-major order.
    pub fn chunks_overlapping(&self, region: &PixelRegion) -> impl Iterator<Item = Point3i> {
        let clamped = region.clamped_to(self.level_shape);
        let (lo, hi) = if clamped.is_empty() {
            (Point3i::ZERO, Point3i::ZERO)
        } else {
            (
                self.chunk_containing(clamped.start),
                self.chunk_containing(clamped.end - Point3i::ONES) + Point3i::ONES,
            )
        };

        let ([z0, y0, x0], [z1, y1, x1]) = (lo.0, hi.0);

        iproduct!(z0..z1, y0..y1, x0..x1).map(|(z, y, x)| PointN([z, y, x]))
    }

    /// The chunk-thick slab along world `axis` that contains `index`, spanning `region` on the other two axes.
    pub fn slab_containing(&self, region: &PixelRegion, axis: Axis3, index: i64) -> PixelRegion {
        let i = axis.pixel_index();
        let c = self.chunk_shape[i];
        let len = self.level_shape[i];
        let index = index.max(0).min((len - 1).max(0));
        let start = index.div_euclid(c) * c;
        let end = (start + c).min(len);

        region.with_interval(axis, start, end)
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
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn aligner() -> ChunkAligner {
        ChunkAligner::new(PointN([8, 128, 128]), PointN([20, 300, 500]))
    }

    #[test]
    fn align_expands_to_chunk_boundaries_capped_at_shape() {
        let r = PixelRegion::new(PointN([3, 130, 10]), PointN([9, 200, 490]));
        let a = aligner().align(&r);

        assert_eq!(a.aligned, PixelRegion::new(PointN([0, 128, 0]), PointN([16, 256, 500])));
        assert!(a.expanded);
        assert_eq!(a.requested, r);
    }

    #[test]
    fn align_is_idempotent() {
        let aligner = aligner();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..500 {
            let a: Point3i = PointN([rng.gen_range(-5..25), rng.gen_range(-5..310), rng.gen_range(-5..510)]);
            let b: Point3i = PointN([rng.gen_range(-5..25), rng.gen_range(-5..310), rng.gen_range(-5..510)]);
            let once = aligner.align(&PixelRegion::new(a.meet(&b), a.join(&b)));
            let twice = aligner.align(&once.aligned);

            assert_eq!(twice.aligned, once.aligned);
            assert!(!twice.expanded);
        }
    }

    #[test]
    fn chunks_overlapping_counts_partial_edge_chunks() {
        let aligner = aligner();
        let all: Vec<_> = aligner
            .chunks_overlapping(&PixelRegion::full(aligner.level_shape()))
            .collect();

        assert_eq!(aligner.grid_shape(), PointN([3, 3, 4]));
        assert_eq!(all.len(), 36);
        assert_eq!(all[0], PointN([0, 0, 0]));
        assert_eq!(all[1], PointN([0, 0, 1]));
        assert_eq!(
            aligner.chunk_region(PointN([2, 2, 3])),
            PixelRegion::new(PointN([16, 256, 384]), PointN([20, 300, 500]))
        );
    }

    #[test]
    fn empty_region_overlaps_no_chunks() {
        let empty = PixelRegion::new(PointN([4, 4, 4]), PointN([4, 9, 9]));
        assert_eq!(aligner().chunks_overlapping(&empty).count(), 0);
    }

    #[test]
    fn slab_contains_index_and_is_one_chunk_thick() {
        let aligner = aligner();
        let full = PixelRegion::full(aligner.level_shape());
        let slab = aligner.slab_containing(&full, Axis3::Z, 11);

        assert_eq!((slab.start[0], slab.end[0]), (8, 16));
        assert_eq!(slab.len_on(Axis3::X), 500);
        assert_eq!(slab.len_on(Axis3::Y), 300);

        let edge = aligner.slab_containing(&full, Axis3::Z, 100);
        assert_eq!((edge.start[0], edge.end[0]), (16, 20));

        let column = aligner.slab_containing(&full, Axis3::X, 450);
        assert_eq!((column.start[2], column.end[2]), (384, 500));
        assert_eq!(column.len_on(Axis3::Z), 20);
    }

    #[test]
    fn chunks_overlapping_stay_inside_the_grid() {
        let aligner = aligner();
        let grid = aligner.grid_shape();
        let all: Vec<_> = aligner
            .chunks_overlapping(&PixelRegion::full(aligner.level_shape()))
            .collect();

        assert!(all.iter().all(|c| c.all_le(&(grid - Point3i::ONES)) && Point3i::ZERO.all_le(c)));
        assert!(all.contains(&PointN([0, 0, 3])));
        assert!(all.contains(&PointN([2, 2, 3])));

        // Only the last x chunk column.
        let right = PixelRegion::new(PointN([0, 0, 400]), PointN([20, 300, 500]));
        let chunks: Vec<_> = aligner.chunks_overlapping(&right).collect();
        assert_eq!(chunks.len(), 9);
        assert!(chunks.iter().all(|c| c[2] == 3));
    }
}
