//! A two-tier buddy/slab memory allocator over a caller-owned logical
//! address space.
//!
//! The caller hands this crate a chunk count (or byte size) and, optionally,
//! a [`MetaAllocator`] telling it where to put its own bookkeeping; from
//! then on [`Buddy`] serves power-of-two block requests and [`SlabAllocator`]
//! layers fixed-size piece allocation on top for anything small enough to be
//! worth subdividing. Neither type touches the address space itself — every
//! `addr`/`chunk_index` is just an offset the caller is free to interpret
//! however it likes (a flat `Vec<u8>`, an `mmap`'d region, a page table).
#![cfg_attr(not(test), no_std)]
#![warn(clippy::all)]
#![deny(unsafe_op_in_unsafe_fn)]

extern crate alloc;

pub mod buddy;
pub mod collections;
pub mod descriptor;
pub mod error;
pub mod meta;
pub mod size_class;
pub mod slab;

pub use buddy::Buddy;
pub use descriptor::FAIL;
pub use error::{FreeError, InitError, ReserveError};
pub use meta::MetaAllocator;
pub use size_class::{level_size, level_to_order, size_to_level};
pub use slab::SlabAllocator;

/// Sentinel returned by [`Buddy::allocate`] when no block of the requested
/// order is available.
pub const BUDDY_FAIL: usize = FAIL;
/// Sentinel returned by [`SlabAllocator::allocate`] when the request cannot
/// be satisfied.
pub const ALLOCATOR_FAIL: usize = FAIL;

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn buddy_and_slab_are_reachable_from_the_crate_root() {
		let mut buddy = Buddy::new(4, None).unwrap();
		assert_ne!(buddy.allocate(0), FAIL);

		let mut slab = SlabAllocator::new(4096, None).unwrap();
		assert_ne!(slab.allocate(8), FAIL);
	}
}
