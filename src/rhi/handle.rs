//! Generational Handles, Pools, and Scoped Resource Ownership
//!
//! Rendering code never holds raw references to device resources: slots in
//! a [`Pool`] may be reused after destruction, and a raw pointer or bare
//! index would silently alias whatever object lands in the slot next.
//! A [`Handle`] pairs the slot index with a generation counter, and every
//! access re-checks the generation against the pool.
//!
//! # Provided Types
//!
//! - [`Handle<T>`] — opaque `(index, generation)` pair, typed by resource kind
//! - [`Pool<T>`] — slot arena with LIFO free-list reuse and generation checks
//! - [`Holder<T>`] — scope-bound owner that destroys its handle exactly once

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::rhi::context::GraphicsContext;

// ============================================================================
// Handle
// ============================================================================

/// An opaque, generation-checked reference into a [`Pool`].
///
/// Generation `0` is reserved for the empty handle; pool generations start
/// at `1` and only ever increase, so an empty handle can never match a slot.
pub struct Handle<T> {
    index: u32,
    generation: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Handle<T> {
    /// The empty (null) handle.
    pub const EMPTY: Self = Self {
        index: 0,
        generation: 0,
        _marker: PhantomData,
    };

    pub(crate) fn new(index: u32, generation: u32) -> Self {
        Self {
            index,
            generation,
            _marker: PhantomData,
        }
    }

    /// Returns `true` if this is the empty handle.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.generation == 0
    }

    /// Slot index inside the owning pool.
    #[inline]
    #[must_use]
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Generation this handle was issued with.
    #[inline]
    #[must_use]
    pub fn generation(&self) -> u32 {
        self.generation
    }
}

// Manual impls: a derived bound would needlessly require `T: Clone` etc.
impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.generation == other.generation
    }
}
impl<T> Eq for Handle<T> {}

impl<T> std::hash::Hash for Handle<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.index.hash(state);
        self.generation.hash(state);
    }
}

impl<T> Default for Handle<T> {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            write!(f, "Handle(empty)")
        } else {
            write!(f, "Handle({}v{})", self.index, self.generation)
        }
    }
}

// ============================================================================
// Pool
// ============================================================================

const FREE_LIST_END: u32 = u32::MAX;

struct Slot<T> {
    object: T,
    generation: u32,
    next_free: u32,
    occupied: bool,
}

/// A generational object pool.
///
/// The pool is the sole owner of every contained object; handles are
/// non-owning references. Freed slots are reused LIFO, and each reuse bumps
/// the slot generation so handles issued before the free are rejected.
///
/// Generation mismatches are programmer errors (double free, use after
/// free) and panic unconditionally. The check is two integer compares on an
/// access that is about to cross into device work; it stays on in release
/// builds.
pub struct Pool<T, K = T> {
    slots: Vec<Slot<T>>,
    free_head: u32,
    live: usize,
    _marker: PhantomData<fn() -> K>,
}

impl<T: Default, K> Pool<T, K> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_head: FREE_LIST_END,
            live: 0,
            _marker: PhantomData,
        }
    }

    /// Stores `object` and returns a handle to it.
    ///
    /// Reuses the most recently freed slot when one exists, otherwise
    /// appends. Never invalidates previously issued valid handles.
    pub fn create(&mut self, object: T) -> Handle<K> {
        self.live += 1;

        if self.free_head != FREE_LIST_END {
            let index = self.free_head;
            let slot = &mut self.slots[index as usize];
            self.free_head = slot.next_free;
            slot.object = object;
            slot.next_free = FREE_LIST_END;
            slot.occupied = true;
            return Handle::new(index, slot.generation);
        }

        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            object,
            generation: 1,
            next_free: FREE_LIST_END,
            occupied: true,
        });
        Handle::new(index, 1)
    }

    /// Destroys the object behind `handle` and recycles its slot.
    ///
    /// A no-op for the empty handle. Panics on a generation mismatch: the
    /// handle was already destroyed, or its slot has since been reused.
    pub fn destroy(&mut self, handle: Handle<K>) {
        if handle.is_empty() {
            return;
        }
        let slot = self
            .slots
            .get_mut(handle.index as usize)
            .unwrap_or_else(|| panic!("pool destroy: handle index {} out of range", handle.index));
        assert_eq!(
            slot.generation, handle.generation,
            "pool destroy: stale handle (slot {} is at generation {}, handle carries {})",
            handle.index, slot.generation, handle.generation
        );
        assert!(
            slot.occupied,
            "pool destroy: slot {} already freed",
            handle.index
        );

        slot.object = T::default();
        slot.generation += 1;
        slot.occupied = false;
        slot.next_free = self.free_head;
        self.free_head = handle.index;
        self.live -= 1;
    }

    /// Returns the object behind `handle`, or `None` for the empty handle.
    ///
    /// Panics on a generation mismatch; holding a handle across its destroy
    /// is a programmer error, not a recoverable condition.
    #[must_use]
    pub fn get(&self, handle: Handle<K>) -> Option<&T> {
        if handle.is_empty() {
            return None;
        }
        let slot = self.check_slot(handle);
        Some(&slot.object)
    }

    /// Mutable variant of [`Pool::get`].
    ///
    /// The returned reference must not be kept past the next pool mutation.
    #[must_use]
    pub fn get_mut(&mut self, handle: Handle<K>) -> Option<&mut T> {
        if handle.is_empty() {
            return None;
        }
        self.check_slot(handle);
        Some(&mut self.slots[handle.index as usize].object)
    }

    fn check_slot(&self, handle: Handle<K>) -> &Slot<T> {
        let slot = self
            .slots
            .get(handle.index as usize)
            .unwrap_or_else(|| panic!("pool get: handle index {} out of range", handle.index));
        assert_eq!(
            slot.generation, handle.generation,
            "pool get: stale handle (slot {} is at generation {}, handle carries {})",
            handle.index, slot.generation, handle.generation
        );
        slot
    }

    /// Number of live (non-freed) objects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.live
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Iterates over live slots as `(handle, object)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (Handle<K>, &T)> {
        self.slots.iter().enumerate().filter_map(|(i, slot)| {
            slot.occupied
                .then(|| (Handle::new(i as u32, slot.generation), &slot.object))
        })
    }
}

impl<T: Default + PartialEq, K> Pool<T, K> {
    /// Finds a live object equal to `object` and returns its handle.
    ///
    /// Equality is the raw `PartialEq` of the stored type; this is only
    /// meaningful for descriptor-like value types.
    #[must_use]
    pub fn find(&self, object: &T) -> Option<Handle<K>> {
        self.iter().find(|(_, o)| *o == object).map(|(h, _)| h)
    }

    /// Returns `true` if a live object equal to `object` is present.
    #[must_use]
    pub fn contains(&self, object: &T) -> bool {
        self.find(object).is_some()
    }
}

impl<T: Default, K> Default for Pool<T, K> {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Holder
// ============================================================================

/// A resource kind whose handles a [`GraphicsContext`] can destroy.
///
/// Implemented by the zero-sized resource markers in
/// [`descriptors`](crate::rhi::descriptors); each marker routes to the
/// matching `destroy_*` method on the context.
pub trait DeviceResource: Sized + 'static {
    fn destroy(ctx: &dyn GraphicsContext, handle: Handle<Self>);
}

/// Scope-bound owner of exactly one device resource handle.
///
/// Dropping a `Holder` issues the device destroy for its handle; calling
/// [`Holder::release`] hands the handle back without destroying it. Either
/// way the destroy runs at most once, and `Holder` is not `Clone`, so it
/// can never run twice for the same handle.
pub struct Holder<T: DeviceResource> {
    handle: Handle<T>,
    ctx: Arc<dyn GraphicsContext>,
}

impl<T: DeviceResource> Holder<T> {
    #[must_use]
    pub fn new(ctx: Arc<dyn GraphicsContext>, handle: Handle<T>) -> Self {
        Self { handle, ctx }
    }

    /// The owned handle. The holder retains ownership.
    #[inline]
    #[must_use]
    pub fn handle(&self) -> Handle<T> {
        self.handle
    }

    /// Releases ownership without destroying the resource.
    #[must_use]
    pub fn release(mut self) -> Handle<T> {
        std::mem::replace(&mut self.handle, Handle::EMPTY)
    }
}

impl<T: DeviceResource> Drop for Holder<T> {
    fn drop(&mut self) {
        let handle = std::mem::replace(&mut self.handle, Handle::EMPTY);
        if !handle.is_empty() {
            T::destroy(self.ctx.as_ref(), handle);
        }
    }
}

impl<T: DeviceResource> fmt::Debug for Holder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Holder").field("handle", &self.handle).finish()
    }
}
