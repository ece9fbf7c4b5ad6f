//! Error types for every layer of the streamer.
//!
//! - **ConfigError**: invalid pyramid metadata or configuration, raised synchronously at setup
//! - **SourceError**: raised by an external pyramid source or chunk store
//! - **FetchError**: a cloneable fetch failure shared by every requester of a coalesced read
//! - **StreamError**: what orchestrator operations return

use std::sync::Arc;
use thiserror::Error;

/// Invalid metadata or configuration.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum ConfigError {
    /// A pyramid must have at least one level.
    #[error("pyramid has no levels")]
    EmptyPyramid,

    /// The data type name is not one the streamer can buffer.
    #[error("unsupported data type: {0}")]
    UnsupportedDataType(String),

    /// Channel counts must be between 1 and 4.
    #[error("level {level}: malformed channel count {channels}")]
    MalformedChannels { level: usize, channels: usize },

    /// A level or chunk has a zero-sized dimension.
    #[error("level {level}: zero-sized {what}")]
    ZeroSized { level: usize, what: &'static str },

    /// Scales must be finite and positive.
    #[error("level {level}: invalid scale {scale:?}")]
    InvalidScale { level: usize, scale: [f64; 3] },

    /// Each level must be no finer than the one before it.
    #[error("level {level} is finer than the level before it")]
    NotMonotonic { level: usize },

    /// Every level of a pyramid must share one data type and channel count.
    #[error("level {level}: data type or channel count differs from level 0")]
    MixedDataTypes { level: usize },

    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    Invalid(String),

    /// A configuration file could not be parsed.
    #[error("malformed configuration: {0}")]
    Parse(String),
}

impl ConfigError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::Invalid(msg.into())
    }
}

/// Failures reported by an external pyramid source or chunk store.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Local storage failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Remote storage failure.
    #[error("network error: {0}")]
    Network(String),

    /// A chunk could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// The store has no chunk at the given coordinates.
    #[error("missing chunk {chunk:?} in {path}")]
    MissingChunk { path: String, chunk: [i64; 3] },

    /// Returned data does not match the requested shape.
    #[error("shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch { expected: [i64; 3], actual: [i64; 3] },

    /// The level index does not exist.
    #[error("no level {0}")]
    NoSuchLevel(usize),
}

impl SourceError {
    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network(msg.into())
    }

    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }
}

/// A fetch failure, shared by every requester attached to the same region read.
#[derive(Clone, Debug, Error)]
pub enum FetchError {
    #[error(transparent)]
    Source(Arc<SourceError>),

    /// The task performing the read ended without producing a result.
    #[error("fetch aborted: {0}")]
    Aborted(String),
}

impl From<SourceError> for FetchError {
    fn from(e: SourceError) -> Self {
        Self::Source(Arc::new(e))
    }
}

/// Errors returned by orchestrator operations.
#[derive(Clone, Debug, Error)]
pub enum StreamError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// No consumer is attached under this id.
    #[error("unknown consumer {0}")]
    UnknownConsumer(String),

    /// The consumer was detached before its request ran.
    #[error("consumer {0} was detached")]
    Detached(String),
}
