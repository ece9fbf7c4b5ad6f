use crate::{default_concurrency, ConfigError};

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tunables for a `VolumeStreamer`.
///
/// ```
/// use volume_stream_storage::StreamConfig;
///
/// let config = StreamConfig::from_ron_str("(max_pixels: 1000000, debounce_ms: 50)").unwrap();
/// assert_eq!(config.max_pixels, 1_000_000);
/// assert_eq!(config.debounce_ms, 50);
/// assert!(config.viewport_aware);
/// ```
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Pixel budget for the 3-D view.
    pub max_pixels: u64,
    /// In-plane pixel budget for each slab.
    pub max_pixels_2d: u64,
    /// Decoded chunks kept by the chunk cache. Zero disables caching.
    pub cache_chunks: usize,
    /// Quiet interval after the last geometry change before a reload fires.
    pub debounce_ms: u64,
    /// Narrow fetched regions to what the render host currently shows.
    pub viewport_aware: bool,
    /// Width of the fetch queue. `None` uses `default_concurrency()`.
    pub concurrency: Option<usize>,
    /// Fraction of the effective region's extent added on every side before level selection.
    pub clip_margin: f64,
    /// Load a coarse preview before the target level on a consumer's first load.
    pub progressive: bool,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            max_pixels: 128 * 128 * 128 * 8,
            max_pixels_2d: 2048 * 2048,
            cache_chunks: 256,
            debounce_ms: 150,
            viewport_aware: true,
            concurrency: None,
            clip_margin: 0.0,
            progressive: true,
        }
    }
}

impl StreamConfig {
    /// Parses a RON struct. Missing fields take their defaults.
    pub fn from_ron_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = ron::de::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;

        Ok(config)
    }

    pub fn to_ron_string(&self) -> Result<String, ConfigError> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_pixels == 0 || self.max_pixels_2d == 0 {
            return Err(ConfigError::invalid("pixel budgets must be positive"));
        }
        if self.concurrency == Some(0) {
            return Err(ConfigError::invalid("concurrency must be positive"));
        }
        if !self.clip_margin.is_finite() || self.clip_margin < 0.0 {
            return Err(ConfigError::invalid(format!(
                "clip margin must be a non-negative fraction, got {}",
                self.clip_margin
            )));
        }

        Ok(())
    }

    #[inline]
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    #[inline]
    pub fn effective_concurrency(&self) -> usize {
        self.concurrency.unwrap_or_else(default_concurrency)
    }

    pub fn with_max_pixels(mut self, max_pixels: u64) -> Self {
        self.max_pixels = max_pixels;
        self
    }

    pub fn with_max_pixels_2d(mut self, max_pixels_2d: u64) -> Self {
        self.max_pixels_2d = max_pixels_2d;
        self
    }

    pub fn with_cache_chunks(mut self, cache_chunks: usize) -> Self {
        self.cache_chunks = cache_chunks;
        self
    }

    pub fn with_debounce_ms(mut self, debounce_ms: u64) -> Self {
        self.debounce_ms = debounce_ms;
        self
    }

    pub fn with_viewport_aware(mut self, viewport_aware: bool) -> Self {
        self.viewport_aware = viewport_aware;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = Some(concurrency);
        self
    }

    pub fn with_clip_margin(mut self, clip_margin: f64) -> Self {
        self.clip_margin = clip_margin;
        self
    }

    pub fn with_progressive(mut self, progressive: bool) -> Self {
        self.progressive = progressive;
        self
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝
