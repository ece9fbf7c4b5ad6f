#![deny(
    rust_2018_compatibility,
    rust_2018_idioms,
    nonstandard_style,
    unused,
    future_incompatible
)]
#![warn(clippy::doc_markdown)]

//! Fakes of the streamer's external collaborators, for tests and benches.

pub mod data_sets;
pub mod host;
pub mod sources;
