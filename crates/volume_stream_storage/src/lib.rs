#![allow(clippy::type_complexity, clippy::too_many_arguments)]

//! Streaming of multi-resolution volumes into render hosts under a pixel budget.
//!
//! The pieces, from the bottom up:
//!   - `Pyramid`: validated levels of one volume, finest first
//!   - `select_level`: picks the finest level whose chunk-aligned region fits a pixel budget
//!   - `PyramidSource` and `ChunkStore`: the boundary to external storage, with `ChunkedPyramidSource` assembling regions
//!     from decoded chunks held in a shared `ChunkCache`
//!   - `RegionCoalescer`: deduplicates identical in-flight region reads on a bounded `WorkQueue`
//!   - `VolumeStreamer`: the per-consumer load state machines, with latest-wins queueing, debouncing, coarse previews and
//!     2-D slabs
//!
//! Geometry (points, boxes, affines, clip planes, viewport estimation) lives in `volume_stream_core`.

pub mod caching;
pub mod coalescer;
pub mod config;
pub mod data;
pub mod error;
pub mod events;
pub mod host;
pub mod pyramid;
pub mod selection;
pub mod source;
pub mod streamer;
pub mod work_queue;

pub use caching::*;
pub use coalescer::*;
pub use config::*;
pub use data::*;
pub use error::*;
pub use events::*;
pub use host::*;
pub use pyramid::*;
pub use selection::*;
pub use source::*;
pub use streamer::*;
pub use work_queue::*;

// Hash types to use for small keys like `PointN` and `ConsumerId`.
pub type SmallKeyHashMap<K, V> = ahash::AHashMap<K, V>;
pub type SmallKeyHashSet<K> = ahash::AHashSet<K>;
pub type SmallKeyBuildHasher = ahash::RandomState;

pub mod prelude {
    pub use super::{
        select_level, ChunkCache, ChunkStore, ChunkedPyramidSource, ConfigError, ConsumerId, DataType, FetchError,
        LevelMetadata, LoadOutcome, LoadPhase, Pyramid, PyramidSource, RegionCoalescer, RegionData, RenderHost,
        SelectionMode, SourceError, StreamConfig, StreamError, StreamEvent, TriggerReason, VolumeBuffer, VolumeStreamer,
    };
}
