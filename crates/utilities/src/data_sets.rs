use volume_stream_core::prelude::*;
use volume_stream_storage::prelude::*;

/// Metadata for a pyramid whose levels all cover the finest level's world box, with unit spacing at level 0.
pub fn pyramid_metadata(shapes: &[[u64; 3]], chunk_shape: [u64; 3], dtype: &str) -> Vec<LevelMetadata> {
    let finest = shapes[0];

    shapes
        .iter()
        .enumerate()
        .map(|(i, s)| LevelMetadata {
            path: i.to_string(),
            shape: s.to_vec(),
            chunk_shape: chunk_shape.to_vec(),
            scale: [
                finest[0] as f64 / s[0] as f64,
                finest[1] as f64 / s[1] as f64,
                finest[2] as f64 / s[2] as f64,
            ],
            translation: [0.0; 3],
            channels: None,
            orientation: None,
            dtype: dtype.to_string(),
        })
        .collect()
}

pub fn uint16_pyramid(shapes: &[[u64; 3]], chunk_shape: [u64; 3]) -> Pyramid {
    match Pyramid::from_metadata(&pyramid_metadata(shapes, chunk_shape, "uint16")) {
        Ok(p) => p,
        Err(e) => panic!("invalid test pyramid: {}", e),
    }
}

/// The value a synthetic volume holds at the `(z, y, x)` pixel `p` of `level`. Distinct across levels and nearby pixels.
pub fn synthetic_value(level: usize, p: Point3i) -> u16 {
    (level as i64 * 10_000 + p[0] * 1_000 + p[1] * 37 + p[2]).rem_euclid(u16::MAX as i64) as u16
}

/// A `u16` block holding `synthetic_value` for every pixel of `region`.
pub fn synthetic_region(level: usize, region: &PixelRegion) -> RegionData {
    let shape = region.shape();
    let mut values = Vec::with_capacity(region.num_pixels() as usize);
    for z in region.start[0]..region.end[0] {
        for y in region.start[1]..region.end[1] {
            for x in region.start[2]..region.end[2] {
                values.push(synthetic_value(level, PointN([z, y, x])));
            }
        }
    }

    match RegionData::from_elements(DataType::U16, shape, 1, &values) {
        Some(data) => data,
        None => panic!("synthetic region has the wrong length"),
    }
}
