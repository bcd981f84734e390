//! ## forrad-core::alloc::chunk
//! **Cache-line aligned bump allocation over a chain of chunks**
//!
//! A [`ChunkSource`] hands out raw, aligned regions by advancing a cursor
//! through its newest chunk. Regions are never returned individually; every
//! chunk lives until the source is dropped.

use std::alloc::{self, Layout};
use std::mem;
use std::ptr::{self, NonNull};
use std::rc::Rc;

use tracing::{debug, error};

use crate::domain::AllocatorDomain;
use crate::error::AllocError;

/// Alignment of every chunk buffer and the minimum accounting granule.
pub const CACHE_LINE_SIZE: usize = 64;

#[inline]
pub(crate) const fn align_up(value: usize, align: usize) -> Option<usize> {
    match value.checked_add(align - 1) {
        Some(v) => Some(v & !(align - 1)),
        None => None,
    }
}

/// One zero-filled buffer of the chain.
struct MemoryChunk {
    data: NonNull<u8>,
    size: usize,
    /// Bytes skipped at the front so the first region meets the source alignment.
    padding: usize,
    cursor: usize,
}

impl MemoryChunk {
    fn new(size: usize, align_on: usize) -> Self {
        let layout = match Layout::from_size_align(size, CACHE_LINE_SIZE) {
            Ok(layout) => layout,
            Err(_) => fatal_layout(size),
        };

        // SAFETY: size is non-zero, it always includes the alignment slack
        let raw = unsafe { alloc::alloc(layout) };
        let Some(data) = NonNull::new(raw) else {
            error!(size, "node-local allocation failed for memory chunk");
            alloc::handle_alloc_error(layout);
        };

        // Pay for first touch now rather than on the allocation path.
        // SAFETY: data points to `size` writable bytes
        unsafe { ptr::write_bytes(data.as_ptr(), 0, size) };

        let padding = data.as_ptr().align_offset(align_on);
        Self {
            data,
            size,
            padding,
            cursor: padding,
        }
    }

    #[inline]
    fn remaining(&self) -> usize {
        self.size - self.cursor
    }

    /// Bump `size` bytes. Caller checked `remaining() >= size`.
    #[inline]
    fn bump(&mut self, size: usize) -> NonNull<u8> {
        debug_assert!(self.remaining() >= size);
        // SAFETY: cursor + size <= self.size, so the result stays in bounds
        let p = unsafe { NonNull::new_unchecked(self.data.as_ptr().add(self.cursor)) };
        self.cursor += size;
        p
    }
}

impl Drop for MemoryChunk {
    fn drop(&mut self) {
        // SAFETY: data was allocated with exactly this layout in `new`
        unsafe {
            let layout = Layout::from_size_align_unchecked(self.size, CACHE_LINE_SIZE);
            alloc::dealloc(self.data.as_ptr(), layout);
        }
    }
}

#[cold]
fn fatal_layout(size: usize) -> ! {
    error!(size, "memory chunk size overflows the address space");
    std::process::abort()
}

/// Bump allocator over a growing chain of chunks.
///
/// Only the tail chunk serves allocations. When it cannot fit a request a new
/// tail of `max(size, default_chunk_size) + alignment` bytes is appended; the
/// slack absorbs alignment padding inside the chunk.
pub struct ChunkSource {
    domain: Rc<AllocatorDomain>,
    align_on: usize,
    chunk_size: usize,
    chunks: Vec<MemoryChunk>,
}

impl ChunkSource {
    pub fn new(
        domain: Rc<AllocatorDomain>,
        align_on: usize,
        default_chunk_size: usize,
    ) -> Result<Self, AllocError> {
        if !align_on.is_power_of_two() {
            return Err(AllocError::InvalidAlignment(align_on));
        }
        Ok(Self {
            domain,
            align_on,
            chunk_size: default_chunk_size,
            chunks: Vec::new(),
        })
    }

    /// Returns `size` bytes (rounded up to the alignment) from the tail chunk.
    ///
    /// The memory is zeroed on first use and stays valid until the source is
    /// dropped. Aborts the process if a new chunk cannot be obtained.
    pub fn alloc(&mut self, size: usize) -> NonNull<u8> {
        let size = match align_up(size, self.align_on) {
            Some(size) => size,
            None => fatal_layout(size),
        };

        let fits = matches!(self.chunks.last(), Some(tail) if tail.remaining() >= size);
        if !fits {
            self.append_chunk(size);
        }

        let tail = self.chunks.len() - 1;
        self.chunks[tail].bump(size)
    }

    fn append_chunk(&mut self, min_size: usize) {
        let size = match min_size.max(self.chunk_size).checked_add(self.align_on) {
            Some(size) => size,
            None => fatal_layout(min_size),
        };
        let chunk = MemoryChunk::new(size, self.align_on);

        let charged = mem::size_of::<MemoryChunk>().max(CACHE_LINE_SIZE) + size.max(CACHE_LINE_SIZE);
        self.domain.charge(charged);
        self.domain.metrics().chunk_appended(charged);

        debug!(
            chunk_size = size,
            padding = chunk.padding,
            chunks = self.chunks.len() + 1,
            total_allocated = self.domain.total_allocated(),
            "appended memory chunk"
        );
        self.chunks.push(chunk);
    }

    #[inline]
    pub fn alignment(&self) -> usize {
        self.align_on
    }

    #[inline]
    pub fn default_chunk_size(&self) -> usize {
        self.chunk_size
    }

    #[inline]
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Free bytes left in the tail chunk.
    pub fn remaining(&self) -> usize {
        self.chunks.last().map_or(0, MemoryChunk::remaining)
    }

    /// Sum of all chunk buffer sizes.
    pub fn reserved_bytes(&self) -> usize {
        self.chunks.iter().map(|c| c.size).sum()
    }
}

impl std::fmt::Debug for ChunkSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkSource")
            .field("align_on", &self.align_on)
            .field("chunk_size", &self.chunk_size)
            .field("chunks", &self.chunks.len())
            .field("remaining", &self.remaining())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc::stats::AllocStats;
    use crate::sched::{LocalScheduler, NullCommunicator};
    use proptest::prelude::*;

    fn source(align_on: usize, chunk_size: usize) -> ChunkSource {
        ChunkSource::new(AllocatorDomain::unbounded(), align_on, chunk_size).unwrap()
    }

    #[test]
    fn test_rejects_bad_alignment() {
        let domain = AllocatorDomain::unbounded();
        assert_eq!(
            ChunkSource::new(domain.clone(), 0, 64).unwrap_err(),
            AllocError::InvalidAlignment(0)
        );
        assert_eq!(
            ChunkSource::new(domain, 24, 64).unwrap_err(),
            AllocError::InvalidAlignment(24)
        );
    }

    #[test]
    fn test_first_alloc_appends_chunk() {
        let mut src = source(8, 64);
        assert_eq!(src.chunk_count(), 0);
        assert_eq!(src.remaining(), 0);

        src.alloc(16);
        assert_eq!(src.chunk_count(), 1);
        assert_eq!(src.reserved_bytes(), 72);
        assert_eq!(src.remaining(), 56);
    }

    #[test]
    fn test_sizes_round_up_to_alignment() {
        let mut src = source(16, 256);
        let a = src.alloc(1).as_ptr() as usize;
        let b = src.alloc(17).as_ptr() as usize;
        let c = src.alloc(16).as_ptr() as usize;
        assert_eq!(b - a, 16);
        assert_eq!(c - b, 32);
    }

    #[test]
    fn test_oversized_request_gets_own_chunk() {
        let mut src = source(8, 64);
        src.alloc(8);
        let p = src.alloc(1000);
        assert_eq!(src.chunk_count(), 2);
        assert_eq!(src.reserved_bytes(), 72 + 1008);
        assert_eq!(p.as_ptr() as usize % 8, 0);
    }

    #[test]
    fn test_large_alignment_uses_padding() {
        let mut src = source(4096, 4096);
        for _ in 0..3 {
            let p = src.alloc(100);
            assert_eq!(p.as_ptr() as usize % 4096, 0);
        }
    }

    #[test]
    fn test_chunks_are_zeroed() {
        let mut src = source(8, 128);
        let p = src.alloc(128);
        // SAFETY: 128 bytes were just handed out
        let bytes = unsafe { std::slice::from_raw_parts(p.as_ptr(), 128) };
        assert!(bytes.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_appends_charge_domain() {
        let stats = Rc::new(AllocStats::new());
        let domain = AllocatorDomain::new(
            usize::MAX,
            Rc::new(LocalScheduler::new()),
            Rc::new(NullCommunicator),
            stats.clone(),
        );
        let mut src = ChunkSource::new(domain.clone(), 8, 1024).unwrap();
        src.alloc(8);
        src.alloc(8);

        let expected = CACHE_LINE_SIZE.max(mem::size_of::<MemoryChunk>()) + 1032;
        assert_eq!(domain.total_allocated(), expected);
        assert_eq!(stats.chunk_appends(), 1);
        assert_eq!(stats.bytes_allocated(), expected as u64);
    }

    proptest! {
        #[test]
        fn prop_aligned_and_disjoint(
            align_shift in 0u32..8,
            chunk_size in 1usize..512,
            sizes in prop::collection::vec(0usize..300, 1..64),
        ) {
            let align_on = 1usize << align_shift;
            let mut src = source(align_on, chunk_size);
            let mut regions: Vec<(usize, usize)> = Vec::new();

            for size in sizes {
                let start = src.alloc(size).as_ptr() as usize;
                prop_assert_eq!(start % align_on, 0);
                let len = align_up(size, align_on).unwrap();
                for &(s, l) in &regions {
                    prop_assert!(start + len <= s || s + l <= start || len == 0 || l == 0);
                }
                regions.push((start, len));
            }

            for chunk in &src.chunks {
                prop_assert!(chunk.cursor <= chunk.size);
                prop_assert!(chunk.padding <= chunk.cursor);
            }
        }
    }
}
