use thiserror::Error;

/// Construction-time allocator errors.
///
/// Running out of memory is not represented here: a node that cannot obtain
/// another chunk aborts.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AllocError {
    #[error("Invalid alignment {0} (must be a non-zero power of two)")]
    InvalidAlignment(usize),

    #[error("Chunk object count must be greater than zero")]
    EmptyChunk,
}
