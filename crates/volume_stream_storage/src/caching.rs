mod chunk_cache;
mod lru_cache;

pub use chunk_cache::*;
pub use lru_cache::*;
