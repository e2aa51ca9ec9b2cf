//! The packed chunk descriptor (buddy layer) and bitmap descriptor (slab
//! layer), and the constants that size them.
//!
//! Both are single 64-bit words, one per chunk, bit-packed with the
//! `bitfield` crate so the whole bookkeeping array stays at 8 bytes/chunk —
//! the same memory bound the reference design calls out, reused here as an
//! intrusive doubly-linked list node (the chunk descriptor's `prev`/`next`
//! fields) instead of a pointer-based node.

use bitfield::bitfield;

/// Width, in bits, of the `order` field of a chunk descriptor.
pub const ORDER_BITS: u32 = 4;
/// Number of distinct buddy orders representable in `ORDER_BITS` bits.
pub const MAX_ORDER_COUNT: usize = 1 << ORDER_BITS;
/// Largest representable buddy order.
pub const MAX_ORDER: u8 = (MAX_ORDER_COUNT - 1) as u8;
/// Width, in bits, of each intrusive-list link field.
pub const LINK_BITS: u32 = (64 - ORDER_BITS - 1) / 2;
/// Largest chunk count a `prev`/`next` link field can index.
pub const MAX_CHUNK_COUNT: usize = 1 << LINK_BITS;
/// Size, in bytes, of a single chunk — the buddy layer's smallest quantum.
pub const CHUNK_SIZE: usize = 512;

/// Number of slab levels: four per buddy order.
pub const MAX_LEVEL_COUNT: usize = 4 * MAX_ORDER_COUNT;
/// Largest representable slab level.
pub const MAX_LEVEL: u8 = (MAX_LEVEL_COUNT - 1) as u8;
/// Width, in bits, of the per-piece free bitmap carried by a bitmap
/// descriptor.
pub const BITMAP_BITS: u32 = 64 - 1 - 2;

bitfield! {
	/// A single chunk's buddy-layer state: its free bit, the order of the
	/// block it starts or is covered by, and the two intrusive-list link
	/// fields (valid only while the chunk is the head of a free block).
	#[derive(Clone, Copy, PartialEq, Eq)]
	pub struct ChunkDescriptor(u64);
	impl Debug;
	/// `1` if this chunk is the head of a free block, `0` if allocated.
	pub free, set_free: 0;
	u8;
	/// Order of the block starting at (or covering) this chunk.
	pub order, set_order: 4, 1;
	u32;
	/// Chunk index of the previous node in the free list, valid only while
	/// `free() == true`.
	pub prev, set_prev: 33, 5;
	/// Chunk index of the next node in the free list, valid only while
	/// `free() == true`.
	pub next, set_next: 62, 34;
}

impl Default for ChunkDescriptor {
	fn default() -> Self {
		ChunkDescriptor(0)
	}
}

bitfield! {
	/// A single chunk's slab-layer state, meaningful only for the first
	/// chunk of an allocated block. Carries two interpretations selected by
	/// `tiny`: a direct buddy allocation (`tiny == false`, rest undefined)
	/// or a tiny block subdivided into pieces (`tiny == true`, with the low
	/// two bits of its level and a 61-bit per-piece free bitmap).
	#[derive(Clone, Copy, PartialEq, Eq)]
	pub struct BitmapDescriptor(u64);
	impl Debug;
	/// `true` if this block is subdivided into fixed-size pieces.
	pub tiny, set_tiny: 0;
	u8;
	/// Low two bits of the slab level (`level % 4`); undefined if `!tiny`.
	pub index_in_group, set_index_in_group: 2, 1;
	u64;
	/// Per-piece free bitmap (bit = 1 means the piece is free); undefined if
	/// `!tiny`.
	pub frees, set_frees: 63, 3;
}

impl Default for BitmapDescriptor {
	fn default() -> Self {
		BitmapDescriptor(0)
	}
}

/// Reserved return value of `allocate()` when no block of the required order
/// (or level) is available.
pub const FAIL: usize = usize::MAX;
