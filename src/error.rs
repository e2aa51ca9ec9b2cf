//! Error taxonomy shared by the buddy and slab layers.
//!
//! The original design (see the crate's design notes) distinguishes three
//! failure kinds: a malformed argument (`Invalid`), a request that collides
//! with an existing allocation (`Busy`), and a meta-allocator failure at
//! construction time (`OutOfMemory`). `allocate()` unavailability is not an
//! error at all — it is conveyed through the `BUDDY_FAIL`/`ALLOCATOR_FAIL`
//! sentinel, per the external interface.

use core::fmt;

/// Failure to construct a [`crate::buddy::Buddy`] or
/// [`crate::slab::SlabAllocator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitError {
	/// `chunk_count` (or the size it is derived from) was zero or exceeded
	/// `MAX_CHUNK_COUNT`.
	Invalid,
	/// The meta-allocator callback (or the default system allocator) returned
	/// a null pointer.
	OutOfMemory,
}

impl fmt::Display for InitError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Invalid => write!(f, "invalid chunk count"),
			Self::OutOfMemory => write!(f, "meta-allocator returned null"),
		}
	}
}

/// Failure to reserve a block/piece at a caller-chosen position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReserveError {
	/// The index/address/order/size combination is out of range, misaligned,
	/// or mismatched with the piece's size class.
	Invalid,
	/// The block (or part of it) is already occupied by an incompatible
	/// allocation.
	Busy,
}

impl fmt::Display for ReserveError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Invalid => write!(f, "invalid reservation request"),
			Self::Busy => write!(f, "block already occupied"),
		}
	}
}

/// Failure to free a previously allocated block/piece.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreeError {
	/// `chunk_index`/`addr` is out of range, already free, or the block it
	/// names is ill-formed.
	Invalid,
}

impl fmt::Display for FreeError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Invalid => write!(f, "invalid or already-free address"),
		}
	}
}
