use crate::{ConfigError, DataType};

use volume_stream_core::prelude::*;

use serde::{Deserialize, Serialize};

/// Volumes whose largest world extent falls outside this range get a normalization scale.
const COMFORTABLE_EXTENT: (f64, f64) = (1.0, 10_000.0);
/// The extent a normalized volume is scaled toward.
const NORMALIZED_EXTENT: f64 = 100.0;

/// Per-level metadata as a source describes it. Shapes may carry a trailing channel axis.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct LevelMetadata {
    /// Where the level's array lives inside its store.
    pub path: String,
    /// `(z, y, x)` or `(z, y, x, c)`.
    pub shape: Vec<u64>,
    /// `(z, y, x)` or `(z, y, x, c)`.
    pub chunk_shape: Vec<u64>,
    /// `(z, y, x)` world units per pixel.
    pub scale: [f64; 3],
    /// `(z, y, x)` world position of pixel `(0, 0, 0)`.
    pub translation: [f64; 3],
    /// Overrides the channel count implied by a 4-D shape.
    #[serde(default)]
    pub channels: Option<usize>,
    /// `(z, y, x)` signs; negative flips that axis.
    #[serde(default)]
    pub orientation: Option<[i8; 3]>,
    pub dtype: String,
}

/// One validated resolution step of a pyramid.
#[derive(Clone, Debug, PartialEq)]
pub struct Level {
    pub path: String,
    /// `(z, y, x)`.
    pub shape: Point3i,
    /// `(z, y, x)`.
    pub chunk_shape: Point3i,
    pub affine: Affine3,
    pub channels: usize,
    pub dtype: DataType,
}

impl Level {
    #[inline]
    pub fn aligner(&self) -> ChunkAligner {
        ChunkAligner::new(self.chunk_shape, self.shape)
    }

    /// The world box covered by this whole level.
    #[inline]
    pub fn bounds(&self) -> WorldBox {
        self.affine.level_bounds(self.shape)
    }

    fn from_metadata(index: usize, meta: &LevelMetadata) -> Result<Self, ConfigError> {
        let dtype: DataType = meta.dtype.parse()?;

        let spatial = |v: &[u64], what: &'static str| -> Result<Point3i, ConfigError> {
            if v.len() != 3 && v.len() != 4 {
                return Err(ConfigError::invalid(format!(
                    "level {}: {} must have 3 or 4 dimensions, got {}",
                    index,
                    what,
                    v.len()
                )));
            }
            if v[..3].iter().any(|&d| d == 0) {
                return Err(ConfigError::ZeroSized { level: index, what });
            }

            Ok(PointN([v[0] as i64, v[1] as i64, v[2] as i64]))
        };
        let shape = spatial(&meta.shape, "shape")?;
        let chunk_shape = spatial(&meta.chunk_shape, "chunk shape")?;

        let channels = meta
            .channels
            .unwrap_or_else(|| meta.shape.get(3).copied().unwrap_or(1) as usize);
        if channels == 0 || channels > 4 {
            return Err(ConfigError::MalformedChannels {
                level: index,
                channels,
            });
        }
        if let Some(&c) = meta.shape.get(3) {
            if c as usize != channels {
                return Err(ConfigError::MalformedChannels {
                    level: index,
                    channels: c as usize,
                });
            }
        }

        if meta.scale.iter().any(|s| !s.is_finite() || *s <= 0.0)
            || meta.translation.iter().any(|t| !t.is_finite())
        {
            return Err(ConfigError::InvalidScale {
                level: index,
                scale: meta.scale,
            });
        }

        Ok(Self {
            path: meta.path.clone(),
            shape,
            chunk_shape,
            affine: Affine3::from_zyx(meta.scale, meta.translation, meta.orientation),
            channels,
            dtype,
        })
    }
}

/// An ordered set of progressively coarser resolutions of one volume. Level 0 is the finest.
#[derive(Clone, Debug, PartialEq)]
pub struct Pyramid {
    levels: Vec<Level>,
    volume_bounds: WorldBox,
}

impl Pyramid {
    /// Validates `levels` and derives the volume bounds from the finest level.
    pub fn new(levels: Vec<Level>) -> Result<Self, ConfigError> {
        let finest = levels.first().ok_or(ConfigError::EmptyPyramid)?;
        let volume_bounds = finest.bounds();

        for (i, pair) in levels.windows(2).enumerate() {
            let (finer, coarser) = (&pair[0], &pair[1]);
            if !coarser.shape.all_le(&finer.shape) {
                return Err(ConfigError::NotMonotonic { level: i + 1 });
            }
            if coarser.dtype != finest.dtype || coarser.channels != finest.channels {
                return Err(ConfigError::MixedDataTypes { level: i + 1 });
            }
        }

        Ok(Self {
            levels,
            volume_bounds,
        })
    }

    pub fn from_metadata(metadata: &[LevelMetadata]) -> Result<Self, ConfigError> {
        let levels = metadata
            .iter()
            .enumerate()
            .map(|(i, m)| Level::from_metadata(i, m))
            .collect::<Result<Vec<_>, _>>()?;

        Self::new(levels)
    }

    #[inline]
    pub fn levels(&self) -> &[Level] {
        &self.levels
    }

    #[inline]
    pub fn level(&self, index: usize) -> Option<&Level> {
        self.levels.get(index)
    }

    #[inline]
    pub fn num_levels(&self) -> usize {
        self.levels.len()
    }

    /// Index of the coarsest, cheapest level.
    #[inline]
    pub fn coarsest(&self) -> usize {
        self.levels.len() - 1
    }

    /// The constant outer boundary for every region computation: the full extent of the finest level.
    #[inline]
    pub fn volume_bounds(&self) -> WorldBox {
        self.volume_bounds
    }

    #[inline]
    pub fn dtype(&self) -> DataType {
        self.levels[0].dtype
    }

    #[inline]
    pub fn channels(&self) -> usize {
        self.levels[0].channels
    }

    /// A power-of-two factor that brings the volume's largest extent near 100 world units when it is very small or very
    /// large, and `1.0` otherwise.
    pub fn normalization_scale(&self) -> f64 {
        let largest = self.volume_bounds.extent().max_component();
        if !largest.is_finite() || largest <= 0.0 {
            return 1.0;
        }
        if largest >= COMFORTABLE_EXTENT.0 && largest <= COMFORTABLE_EXTENT.1 {
            return 1.0;
        }

        2f64.powi((NORMALIZED_EXTENT / largest).log2().round() as i32)
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

    fn meta(shape: &[u64], scale: f64) -> LevelMetadata {
        LevelMetadata {
            path: format!("{}", shape[1]),
            shape: shape.to_vec(),
            chunk_shape: vec![8, 128, 128],
            scale: [scale; 3],
            translation: [0.0; 3],
            channels: None,
            orientation: None,
            dtype: "uint16".to_string(),
        }
    }

    #[test]
    fn volume_bounds_come_from_finest_level() {
        let p = Pyramid::from_metadata(&[meta(&[8, 512, 512], 1.0), meta(&[8, 256, 256], 2.0)]).unwrap();

        assert_eq!(p.num_levels(), 2);
        assert_eq!(p.volume_bounds(), WorldBox::from_bounds([0.0, 512.0, 0.0, 512.0, 0.0, 8.0]));
        assert_eq!(p.coarsest(), 1);
    }

    #[test]
    fn empty_pyramid_is_rejected() {
        assert_eq!(Pyramid::from_metadata(&[]), Err(ConfigError::EmptyPyramid));
    }

    #[test]
    fn finer_level_after_coarser_is_rejected() {
        let r = Pyramid::from_metadata(&[meta(&[8, 256, 256], 2.0), meta(&[8, 512, 512], 1.0)]);
        assert_eq!(r, Err(ConfigError::NotMonotonic { level: 1 }));
    }

    #[test]
    fn malformed_channel_counts_are_rejected() {
        let r = Pyramid::from_metadata(&[meta(&[8, 64, 64, 5], 1.0)]);
        assert_eq!(
            r,
            Err(ConfigError::MalformedChannels {
                level: 0,
                channels: 5
            })
        );

        let mut m = meta(&[8, 64, 64, 3], 1.0);
        m.channels = Some(2);
        assert!(Pyramid::from_metadata(&[m]).is_err());

        let rgb = Pyramid::from_metadata(&[meta(&[8, 64, 64, 3], 1.0)]).unwrap();
        assert_eq!(rgb.channels(), 3);
    }

    #[test]
    fn unsupported_dtype_is_a_config_error() {
        let mut m = meta(&[8, 64, 64], 1.0);
        m.dtype = "complex128".to_string();

        assert_eq!(
            Pyramid::from_metadata(&[m]),
            Err(ConfigError::UnsupportedDataType("complex128".to_string()))
        );
    }

    #[test]
    fn tiny_volumes_are_normalized_by_a_power_of_two() {
        let p = Pyramid::from_metadata(&[meta(&[8, 512, 512], 1e-4)]).unwrap();
        let s = p.normalization_scale();

        assert_eq!(s.log2().fract(), 0.0);
        let normalized = p.volume_bounds().extent().max_component() * s;
        assert!(normalized > 50.0 && normalized < 200.0);

        let ordinary = Pyramid::from_metadata(&[meta(&[8, 512, 512], 1.0)]).unwrap();
        assert_eq!(ordinary.normalization_scale(), 1.0);
    }
}
