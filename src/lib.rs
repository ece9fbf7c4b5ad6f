//! Progressive, budget-bounded streaming of multi-resolution chunked volumes into render-ready buffers.
//!
//! This library is organized into two crates:
//! - **core**: world and pixel geometry, affines, clip planes and camera viewport estimation
//! - **storage**: pyramids, level selection, chunk caching, request coalescing and the `VolumeStreamer` orchestrator
//!
//! Start with [`storage::VolumeStreamer`]: attach a `RenderHost`, call `populate`, and adjust the crop or camera as the
//! user interacts. Every change is debounced into a single reload at the finest level that fits the pixel budget.

pub use volume_stream_core as core;
pub use volume_stream_storage as storage;

pub mod prelude {
    pub use super::core::prelude::*;
    pub use super::storage::prelude::*;
}
