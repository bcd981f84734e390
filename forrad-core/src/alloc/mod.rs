//! ## forrad-core::alloc
//! **Chunk bump allocation and fixed-size object pools**
//!
//! ### Key Submodules:
//! - `chunk/`: cache-line aligned bump allocator over a chain of chunks
//! - `pool/`: fixed-size object pool with rotating free lists and quota backpressure
//! - `typed/`: typed RAII wrapper over an object pool
//! - `stats/`: allocator counters and the metrics seam

pub mod chunk;
pub mod pool;
pub mod stats;
pub mod typed;

pub use chunk::{ChunkSource, CACHE_LINE_SIZE};
pub use pool::{ObjectPool, ALLOCATOR_PREFETCH_DISTANCE};
pub use stats::{AllocStats, MetricsSink, StatsSnapshot};
pub use typed::{Pooled, TypedPool};
