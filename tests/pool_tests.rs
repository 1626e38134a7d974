//! Pool, Handle, and Holder tests
//!
//! Tests for:
//! - Handle validity across create/destroy
//! - LIFO free-list reuse and generation bumping
//! - Stale-handle and double-free detection
//! - Raw-equality find/contains
//! - Holder destroy-exactly-once semantics against the recording backend

use std::sync::Arc;

use ember::rhi::descriptors::{BufferDesc, BufferUsage, MemoryLocation};
use ember::rhi::{GraphicsContext, Handle, Holder, Pool, RecordingContext};

// ============================================================================
// Handle basics
// ============================================================================

#[test]
fn empty_handle_is_default() {
    let handle: Handle<u32> = Handle::default();
    assert!(handle.is_empty());
    assert_eq!(handle, Handle::EMPTY);
}

#[test]
fn get_on_empty_handle_returns_none() {
    let pool: Pool<u32> = Pool::new();
    assert!(pool.get(Handle::EMPTY).is_none());
}

#[test]
fn destroy_on_empty_handle_is_noop() {
    let mut pool: Pool<u32> = Pool::new();
    let live = pool.create(7);
    pool.destroy(Handle::EMPTY);
    assert_eq!(pool.len(), 1);
    assert_eq!(pool.get(live), Some(&7));
}

// ============================================================================
// Create / Destroy lifecycle
// ============================================================================

#[test]
fn create_returns_index_zero_generation_one() {
    let mut pool: Pool<u32> = Pool::new();
    let handle = pool.create(42);
    assert_eq!(handle.index(), 0);
    assert_eq!(handle.generation(), 1);
    assert_eq!(pool.get(handle), Some(&42));
}

#[test]
fn destroyed_slot_is_reused_with_higher_generation() {
    // Create A {0, 1}, destroy it, create B: B must land in slot 0 with a
    // strictly greater generation.
    let mut pool: Pool<u32> = Pool::new();
    let a = pool.create(1);
    assert_eq!((a.index(), a.generation()), (0, 1));

    pool.destroy(a);
    let b = pool.create(2);
    assert_eq!(b.index(), 0);
    assert_eq!(b.generation(), 2);
    assert!(b.generation() > a.generation());
    assert_eq!(pool.get(b), Some(&2));
}

#[test]
#[should_panic(expected = "stale handle")]
fn get_through_stale_handle_panics_after_reuse() {
    let mut pool: Pool<u32> = Pool::new();
    let a = pool.create(1);
    pool.destroy(a);
    let _b = pool.create(2);

    // The slot is live again, but `a` carries the old generation.
    let _ = pool.get(a);
}

#[test]
#[should_panic(expected = "stale handle")]
fn double_destroy_panics() {
    let mut pool: Pool<u32> = Pool::new();
    let a = pool.create(1);
    pool.destroy(a);
    pool.destroy(a);
}

#[test]
fn free_list_reuse_is_lifo() {
    let mut pool: Pool<u32> = Pool::new();
    let a = pool.create(10);
    let b = pool.create(20);
    let c = pool.create(30);

    pool.destroy(b);
    pool.destroy(a);

    // Most recently freed slot (a's) comes back first.
    let first = pool.create(40);
    assert_eq!(first.index(), a.index());
    let second = pool.create(50);
    assert_eq!(second.index(), b.index());

    // Untouched handle stays valid throughout.
    assert_eq!(pool.get(c), Some(&30));
}

#[test]
fn create_never_invalidates_live_handles() {
    let mut pool: Pool<u32> = Pool::new();
    let handles: Vec<_> = (0..64).map(|i| pool.create(i)).collect();
    for (i, handle) in handles.iter().enumerate() {
        assert_eq!(pool.get(*handle), Some(&(i as u32)));
    }
}

#[test]
fn len_tracks_live_objects() {
    let mut pool: Pool<u32> = Pool::new();
    assert_eq!(pool.len(), 0);

    let a = pool.create(1);
    let b = pool.create(2);
    assert_eq!(pool.len(), 2);

    pool.destroy(a);
    assert_eq!(pool.len(), 1);
    pool.destroy(b);
    assert_eq!(pool.len(), 0);
    assert!(pool.is_empty());
}

#[test]
fn iter_skips_freed_slots() {
    let mut pool: Pool<u32> = Pool::new();
    let _a = pool.create(1);
    let b = pool.create(2);
    let _c = pool.create(3);
    pool.destroy(b);

    let values: Vec<u32> = pool.iter().map(|(_, v)| *v).collect();
    assert_eq!(values, vec![1, 3]);
}

// ============================================================================
// Raw-equality lookup
// ============================================================================

#[test]
fn find_returns_handle_of_equal_object() {
    let mut pool: Pool<u32> = Pool::new();
    let _a = pool.create(10);
    let b = pool.create(20);

    assert_eq!(pool.find(&20), Some(b));
    assert!(pool.contains(&10));
    assert!(!pool.contains(&99));
}

#[test]
fn find_ignores_destroyed_objects() {
    let mut pool: Pool<u32> = Pool::new();
    let a = pool.create(10);
    pool.destroy(a);
    assert_eq!(pool.find(&10), None);
}

// ============================================================================
// Holder (RAII over the recording backend)
// ============================================================================

fn host_buffer_desc() -> BufferDesc {
    BufferDesc {
        size: 64,
        usage: BufferUsage::TRANSFER_SRC,
        memory: MemoryLocation::HostVisible,
        label: "HolderTest",
    }
}

#[test]
fn holder_destroys_on_drop() {
    let ctx: Arc<RecordingContext> = Arc::new(RecordingContext::new(64, 64));
    let buffer = ctx.create_buffer(&host_buffer_desc()).unwrap();
    assert_eq!(ctx.live_buffers(), 1);

    {
        let _holder = Holder::new(ctx.clone() as Arc<dyn GraphicsContext>, buffer);
        assert_eq!(ctx.live_buffers(), 1);
    }
    assert_eq!(ctx.live_buffers(), 0);
}

#[test]
fn holder_release_skips_destroy() {
    let ctx: Arc<RecordingContext> = Arc::new(RecordingContext::new(64, 64));
    let buffer = ctx.create_buffer(&host_buffer_desc()).unwrap();

    let holder = Holder::new(ctx.clone() as Arc<dyn GraphicsContext>, buffer);
    let released = holder.release();
    assert_eq!(released, buffer);
    assert_eq!(ctx.live_buffers(), 1);

    ctx.destroy_buffer(released);
    assert_eq!(ctx.live_buffers(), 0);
}

#[test]
#[should_panic(expected = "stale handle")]
fn backend_rejects_destroy_after_holder_drop() {
    let ctx: Arc<RecordingContext> = Arc::new(RecordingContext::new(64, 64));
    let buffer = ctx.create_buffer(&host_buffer_desc()).unwrap();
    drop(Holder::new(ctx.clone() as Arc<dyn GraphicsContext>, buffer));

    // The holder already destroyed it; a second destroy is a double free.
    ctx.destroy_buffer(buffer);
}
