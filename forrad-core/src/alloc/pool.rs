//! ## forrad-core::alloc::pool
//! **Fixed-size object pool with rotating free lists**
//!
//! Freed objects are threaded onto `D` independent singly-linked stacks. Every
//! pop and push moves the rotation cursor one bucket further, so back-to-back
//! operations touch different list heads and the next candidate can be
//! prefetched while the current one is in use.
//!
//! When every bucket is empty the pool carves a fresh object from its
//! [`ChunkSource`], as long as the [`AllocatorDomain`] budget allows it. Over
//! budget, [`ObjectPool::alloc`] polls the network, yields the task and
//! retries until some other task frees an object.
//!
//! A pool is driven by one task at a time. It is `!Send` and `!Sync`.

use std::cell::{Cell, RefCell};
use std::mem;
use std::ptr::NonNull;
use std::rc::Rc;

use tracing::trace;

use super::chunk::ChunkSource;
use crate::domain::AllocatorDomain;
use crate::error::AllocError;

/// Default number of rotating free lists.
pub const ALLOCATOR_PREFETCH_DISTANCE: usize = 4;

/// Overlay of a free object. Only objects sitting on a free list are viewed
/// through this type; in-use objects are opaque bytes owned by the caller.
#[repr(C)]
struct FreeSlot {
    next: Option<NonNull<FreeSlot>>,
}

type Bucket = Cell<Option<NonNull<FreeSlot>>>;

pub struct ObjectPool<const D: usize = ALLOCATOR_PREFETCH_DISTANCE> {
    domain: Rc<AllocatorDomain>,
    arena: RefCell<ChunkSource>,
    object_size: usize,
    firsts: [Bucket; D],
    first_index: Cell<usize>,
    in_use: Cell<isize>,
    fresh: Cell<usize>,
}

impl<const D: usize> ObjectPool<D> {
    const NONEMPTY: () = assert!(D > 0, "an object pool needs at least one free list");

    /// Creates a pool of `object_size`-byte objects whose chunks hold about
    /// `chunk_object_count` objects each.
    ///
    /// `object_size` is widened to hold a free-list link and `align_on` to
    /// the link's alignment.
    pub fn new(
        domain: Rc<AllocatorDomain>,
        align_on: usize,
        object_size: usize,
        chunk_object_count: usize,
    ) -> Result<Self, AllocError> {
        #[allow(clippy::let_unit_value)]
        let () = Self::NONEMPTY;

        if !align_on.is_power_of_two() {
            return Err(AllocError::InvalidAlignment(align_on));
        }
        if chunk_object_count == 0 {
            return Err(AllocError::EmptyChunk);
        }

        let object_size = object_size.max(mem::size_of::<FreeSlot>());
        let align_on = align_on.max(mem::align_of::<FreeSlot>());
        let arena = ChunkSource::new(
            domain.clone(),
            align_on,
            object_size.saturating_mul(chunk_object_count),
        )?;

        Ok(Self {
            domain,
            arena: RefCell::new(arena),
            object_size,
            firsts: std::array::from_fn(|_| Cell::new(None)),
            first_index: Cell::new(0),
            in_use: Cell::new(0),
            fresh: Cell::new(0),
        })
    }

    /// Returns an object, suspending the task while the domain is over budget
    /// and nothing has been freed.
    ///
    /// The object holds whatever its previous user left in it (or zeroes when
    /// freshly carved), except for the first pointer-sized word, which is
    /// cleared.
    pub async fn alloc(&self) -> NonNull<u8> {
        let mut yielded = false;
        loop {
            if let Some(obj) = self.try_alloc() {
                return obj;
            }

            if !yielded {
                yielded = true;
                self.domain.metrics().yielded();
            }
            self.domain.backpressure().await;
        }
    }

    /// Like [`alloc`](Self::alloc) but returns `None` instead of suspending.
    pub fn try_alloc(&self) -> Option<NonNull<u8>> {
        if let Some(obj) = self.pop_recycled() {
            return Some(obj);
        }

        if self.domain.may_carve() {
            self.fresh.set(self.fresh.get() + 1);
            self.in_use.set(self.in_use.get() + 1);
            let obj = self.arena.borrow_mut().alloc(self.object_size);
            trace!(fresh = self.fresh.get(), "carved fresh object");
            return Some(obj);
        }

        None
    }

    fn pop_recycled(&self) -> Option<NonNull<u8>> {
        let mut index = self.first_index.get();
        if self.firsts[index].get().is_none() {
            index = self.firsts.iter().position(|head| head.get().is_some())?;
            self.first_index.set(index);
        }

        let slot = self.firsts[index].get()?;
        // SAFETY: slot sits on our free list, so it is a live FreeSlot in
        // memory owned by this pool's chunk source
        let next = unsafe { (*slot.as_ptr()).next.take() };
        self.firsts[index].set(next);

        self.first_index.set((index + 1) % D);
        self.in_use.set(self.in_use.get() + 1);
        Some(slot.cast())
    }

    /// Returns `obj` to the bucket under the rotation cursor.
    ///
    /// # Safety
    ///
    /// `obj` must have been returned by `alloc`/`try_alloc` on this pool and
    /// must not be freed twice. The caller gives up all access to it.
    pub unsafe fn free(&self, obj: NonNull<u8>) {
        let slot = obj.cast::<FreeSlot>();
        let index = self.first_index.get();

        // SAFETY: the caller hands back one of our objects; it is at least
        // pointer sized and aligned for FreeSlot
        slot.as_ptr().write(FreeSlot {
            next: self.firsts[index].get(),
        });
        self.firsts[index].set(Some(slot));

        self.first_index.set((index + 1) % D);
        self.in_use.set(self.in_use.get() - 1);
    }

    /// Negated in-use count. A debugging signal, not a capacity.
    #[inline]
    pub fn freelist_size(&self) -> isize {
        -self.in_use.get()
    }

    /// Objects handed out and not yet freed.
    #[inline]
    pub fn in_use(&self) -> isize {
        self.in_use.get()
    }

    /// Objects ever carved from the chunk source.
    #[inline]
    pub fn fresh_allocations(&self) -> usize {
        self.fresh.get()
    }

    #[inline]
    pub fn object_size(&self) -> usize {
        self.object_size
    }

    pub fn chunk_count(&self) -> usize {
        self.arena.borrow().chunk_count()
    }

    pub fn domain(&self) -> &Rc<AllocatorDomain> {
        &self.domain
    }

    /// Length of free list `index`. Walks the list.
    ///
    /// # Panics
    ///
    /// Panics if `index >= D`.
    pub fn bucket_len(&self, index: usize) -> usize {
        let mut len = 0;
        let mut cursor = self.firsts[index].get();
        while let Some(slot) = cursor {
            len += 1;
            // SAFETY: every node reachable from a head is a free slot
            cursor = unsafe { (*slot.as_ptr()).next };
        }
        len
    }

    /// Objects currently waiting on the free lists.
    pub fn recycled(&self) -> usize {
        (0..D).map(|i| self.bucket_len(i)).sum()
    }
}

impl<const D: usize> std::fmt::Debug for ObjectPool<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectPool")
            .field("object_size", &self.object_size)
            .field("buckets", &D)
            .field("first_index", &self.first_index.get())
            .field("in_use", &self.in_use.get())
            .field("fresh", &self.fresh.get())
            .field("arena", &self.arena.borrow())
            .finish()
    }
}
