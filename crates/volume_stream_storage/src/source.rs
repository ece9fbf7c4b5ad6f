//! The boundary to external storage.
//!
//! A `PyramidSource` is anything that can describe its pyramid and read pixel regions of a level. The streamer only ever asks
//! for chunk-aligned regions. `ChunkedPyramidSource` is a source built on top of a `ChunkStore`, which decodes individual
//! chunks; it reads every chunk overlapping a region through a shared `ChunkCache` and assembles them.

use crate::{ChunkCache, ChunkKey, Pyramid, RegionData, SourceError};

use volume_stream_core::prelude::*;

use futures::future::{join_all, BoxFuture, FutureExt};
use std::sync::Arc;

/// A multi-resolution volume that can read pixel regions of its levels.
pub trait PyramidSource: Send + Sync {
    /// Identifies the source in coalescing keys. Two sources with the same id must return the same data.
    fn source_id(&self) -> &str;

    fn pyramid(&self) -> &Pyramid;

    /// Reads `region` of level `level`, returning a block with exactly `region.shape()`.
    fn read_region(
        &self,
        level: usize,
        region: PixelRegion,
    ) -> BoxFuture<'static, Result<RegionData, SourceError>>;
}

/// Reads and decodes single chunks of a chunked array store.
pub trait ChunkStore: Send + Sync {
    /// Identifies the store in cache keys.
    fn store_id(&self) -> &str;

    /// Decodes the chunk at grid coordinates `chunk` of the array at `path`.
    ///
    /// Edge chunks may come back either at the full chunk shape or clipped to the array shape.
    fn read_chunk(
        &self,
        path: &str,
        chunk: Point3i,
    ) -> BoxFuture<'static, Result<RegionData, SourceError>>;
}

/// A `PyramidSource` that assembles regions from the chunks of a `ChunkStore`.
#[derive(Clone)]
pub struct ChunkedPyramidSource {
    pyramid: Arc<Pyramid>,
    store: Arc<dyn ChunkStore>,
    cache: Arc<ChunkCache>,
}

impl ChunkedPyramidSource {
    pub fn new(pyramid: Pyramid, store: Arc<dyn ChunkStore>, cache: Arc<ChunkCache>) -> Self {
        Self {
            pyramid: Arc::new(pyramid),
            store,
            cache,
        }
    }

    pub fn cache(&self) -> &Arc<ChunkCache> {
        &self.cache
    }

    fn load_chunk(
        &self,
        path: &str,
        chunk: Point3i,
    ) -> BoxFuture<'static, Result<Arc<RegionData>, SourceError>> {
        let key = ChunkKey::new(self.store.store_id(), path, chunk);
        if let Some(hit) = self.cache.get(&key) {
            return futures::future::ready(Ok(hit)).boxed();
        }

        let read = self.store.read_chunk(path, chunk);
        let cache = Arc::clone(&self.cache);

        async move {
            let decoded = Arc::new(read.await?);
            cache.insert(key, Arc::clone(&decoded));

            Ok(decoded)
        }
        .boxed()
    }
}

impl PyramidSource for ChunkedPyramidSource {
    fn source_id(&self) -> &str {
        self.store.store_id()
    }

    fn pyramid(&self) -> &Pyramid {
        &self.pyramid
    }

    fn read_region(
        &self,
        level_index: usize,
        region: PixelRegion,
    ) -> BoxFuture<'static, Result<RegionData, SourceError>> {
        let this = self.clone();

        async move {
            let level = this
                .pyramid
                .level(level_index)
                .ok_or(SourceError::NoSuchLevel(level_index))?;
            let aligner = level.aligner();
            let region = region.clamped_to(level.shape);
            let (dtype, channels) = (level.dtype, level.channels);

            let chunks: Vec<Point3i> = aligner.chunks_overlapping(&region).collect();
            let reads: Vec<_> = chunks
                .iter()
                .map(|&chunk| this.load_chunk(&level.path, chunk))
                .collect();
            let decoded = join_all(reads).await;

            let mut out = RegionData::zeros(dtype, region.shape(), channels);
            for (chunk, result) in chunks.into_iter().zip(decoded) {
                let data = result?;
                if data.dtype() != dtype || data.channels() != channels {
                    return Err(SourceError::decode(format!(
                        "chunk {:?} decoded as {} x{}, expected {} x{}",
                        chunk.0,
                        data.dtype().name(),
                        data.channels(),
                        dtype.name(),
                        channels
                    )));
                }

                let chunk_region = aligner.chunk_region(chunk);
                if !chunk_region.shape().all_le(&data.shape()) {
                    return Err(SourceError::ShapeMismatch {
                        expected: chunk_region.shape().0,
                        actual: data.shape().0,
                    });
                }

                let overlap = chunk_region.intersection(&region);
                let local = PixelRegion::new(
                    overlap.start - chunk_region.start,
                    overlap.end - chunk_region.start,
                );
                out.copy_from(&data, &local, overlap.start - region.start);
            }

            Ok(out)
        }
        .boxed()
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝
