//! ## forrad-core::alloc::typed
//! **Typed objects on top of an [`ObjectPool`]**
//!
//! [`TypedPool`] sizes and aligns an object pool for `T` and hands out
//! [`Pooled`] guards that drop the value and recycle its slot.

use std::marker::PhantomData;
use std::mem::{self, ManuallyDrop};
use std::ops::{Deref, DerefMut};
use std::ptr::{self, NonNull};
use std::rc::Rc;

use super::pool::{ObjectPool, ALLOCATOR_PREFETCH_DISTANCE};
use crate::domain::AllocatorDomain;
use crate::error::AllocError;

pub struct TypedPool<T, const D: usize = ALLOCATOR_PREFETCH_DISTANCE> {
    pool: ObjectPool<D>,
    _marker: PhantomData<T>,
}

impl<T, const D: usize> TypedPool<T, D> {
    pub fn new(domain: Rc<AllocatorDomain>, chunk_object_count: usize) -> Result<Self, AllocError> {
        Ok(Self {
            pool: ObjectPool::new(
                domain,
                mem::align_of::<T>(),
                mem::size_of::<T>(),
                chunk_object_count,
            )?,
            _marker: PhantomData,
        })
    }

    /// Moves `value` into a pooled slot, waiting under backpressure if needed.
    pub async fn alloc(&self, value: T) -> Pooled<'_, T, D> {
        let slot = self.pool.alloc().await;
        self.emplace(slot, value)
    }

    /// Non-suspending variant; hands `value` back when no slot is available.
    pub fn try_alloc(&self, value: T) -> Result<Pooled<'_, T, D>, T> {
        match self.pool.try_alloc() {
            Some(slot) => Ok(self.emplace(slot, value)),
            None => Err(value),
        }
    }

    fn emplace(&self, slot: NonNull<u8>, value: T) -> Pooled<'_, T, D> {
        let ptr = slot.cast::<T>();
        // SAFETY: the slot is at least size_of::<T>() bytes, aligned for T and
        // exclusively ours until it is freed
        unsafe { ptr.as_ptr().write(value) };
        Pooled { ptr, pool: self }
    }

    pub fn raw(&self) -> &ObjectPool<D> {
        &self.pool
    }
}

/// A `T` living in a pool slot. Dropping it drops the value and frees the slot.
pub struct Pooled<'a, T, const D: usize = ALLOCATOR_PREFETCH_DISTANCE> {
    ptr: NonNull<T>,
    pool: &'a TypedPool<T, D>,
}

impl<T, const D: usize> Pooled<'_, T, D> {
    /// Moves the value out and recycles the slot.
    pub fn into_inner(self) -> T {
        let this = ManuallyDrop::new(self);
        // SAFETY: the value is initialized and read exactly once; the guard
        // will not run its destructor
        unsafe {
            let value = ptr::read(this.ptr.as_ptr());
            this.pool.pool.free(this.ptr.cast());
            value
        }
    }
}

impl<T, const D: usize> Deref for Pooled<'_, T, D> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        // SAFETY: initialized in emplace, uniquely owned by this guard
        unsafe { self.ptr.as_ref() }
    }
}

impl<T, const D: usize> DerefMut for Pooled<'_, T, D> {
    #[inline]
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: as in deref, and we hold &mut self
        unsafe { self.ptr.as_mut() }
    }
}

impl<T, const D: usize> Drop for Pooled<'_, T, D> {
    fn drop(&mut self) {
        // SAFETY: the slot came from this pool and is released exactly once
        unsafe {
            ptr::drop_in_place(self.ptr.as_ptr());
            self.pool.pool.free(self.ptr.cast());
        }
    }
}

impl<T: std::fmt::Debug, const D: usize> std::fmt::Debug for Pooled<'_, T, D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Pooled").field(&**self).finish()
    }
}
