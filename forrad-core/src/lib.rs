//! # forrad-core
//!
//! Node-local memory allocator for cooperatively scheduled workers.
//!
//! ### Layers:
//! - [`ChunkSource`]: bump allocation over large, zero-filled, cache-line aligned chunks
//! - [`ObjectPool`]: fixed-size objects recycled through rotating free lists
//! - [`AllocatorDomain`]: byte budget shared by every pool of a node; over budget,
//!   pools poll the network and yield the task instead of growing
//!
//! ### Expectations:
//! - No locks; one task touches a pool at a time
//! - Allocation never fails: it returns an object, waits for one, or the process aborts

pub mod alloc;
pub mod domain;
pub mod error;
pub mod sched;

pub mod prelude {
    pub use crate::alloc::*;
    pub use crate::domain::*;
    pub use crate::error::*;
    pub use crate::sched::*;
}

pub use alloc::{ChunkSource, ObjectPool, Pooled, TypedPool};
pub use domain::AllocatorDomain;
pub use error::AllocError;
