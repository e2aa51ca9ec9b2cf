//! The meta-allocator capability: where a [`crate::buddy::Buddy`] or
//! [`crate::slab::SlabAllocator`] gets the memory for *its own bookkeeping*
//! (the chunk descriptor array, the bitmap array) — never for the logical
//! address space it manages, which the caller owns entirely.
//!
//! Absence of a caller-supplied callback pair falls back to the global
//! `alloc` allocator, the same "if NULL, fall back to the host default"
//! contract the reference design describes.

use core::{alloc::Layout, ptr::NonNull};

/// An injected capability for allocating and freeing the allocator's own
/// metadata.
///
/// The `ctx` pointer is opaque to the allocator; it is only ever handed back
/// to the callbacks unchanged. Neither callback is invoked outside of
/// construction/destruction.
#[derive(Clone, Copy)]
pub struct MetaAllocator {
	allocate: fn(layout: Layout, ctx: *mut ()) -> *mut u8,
	free: fn(ptr: NonNull<u8>, layout: Layout, ctx: *mut ()),
	ctx: *mut (),
}

impl MetaAllocator {
	/// Builds a meta-allocator from an explicit allocate/free callback pair
	/// and an opaque context pointer passed back to both.
	pub const fn new(
		allocate: fn(layout: Layout, ctx: *mut ()) -> *mut u8,
		free: fn(ptr: NonNull<u8>, layout: Layout, ctx: *mut ()),
		ctx: *mut (),
	) -> Self {
		Self { allocate, free, ctx }
	}

	/// The default meta-allocator: the global `alloc` allocator, matching the
	/// C original's fallback to `malloc`/`free` when no callback is given.
	pub const fn system() -> Self {
		Self {
			allocate: system_allocate,
			free: system_free,
			ctx: core::ptr::null_mut(),
		}
	}

	/// Requests `layout` worth of metadata space. Returns `None` on failure,
	/// mirroring the callback's null-pointer-on-failure contract.
	pub fn allocate(&self, layout: Layout) -> Option<NonNull<u8>> {
		NonNull::new((self.allocate)(layout, self.ctx))
	}

	/// Releases metadata space previously returned by [`Self::allocate`] with
	/// the identical `layout`.
	pub fn free(&self, ptr: NonNull<u8>, layout: Layout) {
		(self.free)(ptr, layout, self.ctx);
	}
}

fn system_allocate(layout: Layout, _ctx: *mut ()) -> *mut u8 {
	if layout.size() == 0 {
		return NonNull::dangling().as_ptr();
	}
	unsafe { alloc::alloc::alloc(layout) }
}

fn system_free(ptr: NonNull<u8>, layout: Layout, _ctx: *mut ()) {
	if layout.size() == 0 {
		return;
	}
	unsafe { alloc::alloc::dealloc(ptr.as_ptr(), layout) };
}
