use crate::{Level, Pyramid};

use volume_stream_core::prelude::*;

use serde::{Deserialize, Serialize};

/// How pixels are counted against the budget.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum SelectionMode {
    /// Every pixel of the 3-D region counts.
    Volume,
    /// Only the two in-plane axes of a slice normal to the given axis count.
    Plane(Axis3),
}

/// The level chosen for a region and the exact buffer shape it needs.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ResolutionSelection {
    pub level_index: usize,
    /// `(z, y, x)` chunk-aligned buffer shape.
    pub dimensions: Point3i,
    /// The quantity compared against the budget.
    pub pixel_count: u64,
    pub region: ChunkAlignedRegion,
}

/// The chunk-aligned region of `level` covering `clip`, after clamping to `volume_bounds`.
pub fn region_for_level(level: &Level, clip: &WorldBox, volume_bounds: &WorldBox) -> ChunkAlignedRegion {
    let world = clip.intersection(volume_bounds);
    let pixels = level.affine.world_to_pixel_region(&world, level.shape);

    level.aligner().align(&pixels)
}

/// Pixels counted against the budget for an aligned region.
pub fn budget_pixel_count(region: &ChunkAlignedRegion, mode: SelectionMode) -> u64 {
    let aligned = &region.aligned;
    match mode {
        SelectionMode::Volume => aligned.num_pixels(),
        SelectionMode::Plane(normal) => {
            let (h, v) = normal.in_plane_axes();

            (aligned.len_on(h).max(0) * aligned.len_on(v).max(0)) as u64
        }
    }
}

/// The selection for one specific level.
pub fn selection_at_level(
    pyramid: &Pyramid,
    level_index: usize,
    clip: &WorldBox,
    mode: SelectionMode,
) -> Option<ResolutionSelection> {
    let level = pyramid.level(level_index)?;
    let region = region_for_level(level, clip, &pyramid.volume_bounds());

    Some(ResolutionSelection {
        level_index,
        dimensions: region.dimensions(),
        pixel_count: budget_pixel_count(&region, mode),
        region,
    })
}

/// Picks the finest level whose chunk-aligned region covering `clip` fits in `max_pixels`.
///
/// If no level fits, the coarsest level is returned; this never fails.
pub fn select_level(
    pyramid: &Pyramid,
    max_pixels: u64,
    clip: &WorldBox,
    volume_bounds: &WorldBox,
    mode: SelectionMode,
) -> ResolutionSelection {
    let make = |level_index: usize, level: &Level| {
        let region = region_for_level(level, clip, volume_bounds);

        ResolutionSelection {
            level_index,
            dimensions: region.dimensions(),
            pixel_count: budget_pixel_count(&region, mode),
            region,
        }
    };

    let coarsest = pyramid.coarsest();
    let levels = pyramid.levels();
    for (level_index, level) in levels[..coarsest].iter().enumerate() {
        let selection = make(level_index, level);
        if selection.pixel_count <= max_pixels {
            return selection;
        }
    }

    make(coarsest, &levels[coarsest])
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝
