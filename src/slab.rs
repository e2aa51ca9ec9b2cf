//! The slab layer: fixed-size "piece" allocation on top of [`Buddy`] blocks,
//! falling back straight to the buddy layer for anything too large to be
//! worth subdividing.
//!
//! A tiny block is a buddy block whose [`BitmapDescriptor`] marks it `tiny`
//! and whose `frees` bitmap tracks which of its fixed-size pieces are free.
//! The block's level list link is threaded through the *chunk* descriptor's
//! `prev`/`next` fields — the same mechanism the buddy layer uses for its own
//! free lists, borrowed here because an allocated block's link fields are
//! otherwise unused.

use core::{alloc::Layout, ptr::NonNull, slice};

use crate::{
	buddy::{chunk_slice, Buddy},
	collections::chunk_list::ListHead,
	descriptor::{BitmapDescriptor, CHUNK_SIZE, FAIL, MAX_LEVEL_COUNT},
	error::{FreeError, InitError, ReserveError},
	meta::MetaAllocator,
	size_class::{full_bitmap, level_bits, level_size, level_to_order, size_to_level},
};

/// A two-tier allocator: a [`Buddy`] underneath, subdivided into fixed-size
/// pieces for small requests.
pub struct SlabAllocator {
	buddy: Buddy,
	bitmaps_ptr: NonNull<BitmapDescriptor>,
	levels: [ListHead; MAX_LEVEL_COUNT],
	bitmaps_layout: Layout,
	meta: MetaAllocator,
}

#[inline]
unsafe fn bitmap_slice<'a>(
	ptr: NonNull<BitmapDescriptor>,
	len: usize,
) -> &'a mut [BitmapDescriptor] {
	unsafe { slice::from_raw_parts_mut(ptr.as_ptr(), len) }
}

#[inline]
const fn align_down(index: usize, order: u8) -> usize {
	index & !((1usize << order) - 1)
}

impl SlabAllocator {
	/// Builds a slab allocator managing `size` bytes, floored to whole chunks
	/// (`size < CHUNK_SIZE` yields a zero chunk count, which `Buddy::new`
	/// rejects as `InitError::Invalid`).
	pub fn new(size: usize, meta: Option<MetaAllocator>) -> Result<Self, InitError> {
		let chunk_count = size / CHUNK_SIZE;
		let meta = meta.unwrap_or_else(MetaAllocator::system);
		let buddy = Buddy::new(chunk_count, Some(meta))?;

		let bitmaps_layout =
			Layout::array::<BitmapDescriptor>(chunk_count).map_err(|_| InitError::Invalid)?;
		let raw = meta.allocate(bitmaps_layout).ok_or(InitError::OutOfMemory)?;
		let bitmaps_ptr = raw.cast::<BitmapDescriptor>();
		unsafe { bitmaps_ptr.as_ptr().write_bytes(0, chunk_count) };

		Ok(Self {
			buddy,
			bitmaps_ptr,
			levels: [ListHead::new(); MAX_LEVEL_COUNT],
			bitmaps_layout,
			meta,
		})
	}

	fn chunk_count(&self) -> usize {
		self.buddy.chunk_array().1
	}

	/// Allocates `size` bytes, dispatching to a tiny piece or a direct buddy
	/// block depending on size class.
	///
	/// Returns [`FAIL`] if the request cannot be satisfied.
	#[must_use]
	pub fn allocate(&mut self, size: usize) -> usize {
		match size_to_level(size) {
			Ok(level) => self.allocate_tiny(level),
			Err(order) => {
				let chunk_index = self.buddy.allocate(order);
				if chunk_index == FAIL {
					FAIL
				} else {
					chunk_index * CHUNK_SIZE
				}
			}
		}
	}

	fn allocate_tiny(&mut self, level: u8) -> usize {
		let chunk_count = self.chunk_count();
		let (chunks_ptr, _) = self.buddy.chunk_array();

		let block_chunk_index = if let Some(head) = self.levels[level as usize].head() {
			head
		} else {
			let order = level_to_order(level);
			let new_chunk = self.buddy.allocate(order);
			if new_chunk == FAIL {
				return FAIL;
			}
			let bitmaps = unsafe { bitmap_slice(self.bitmaps_ptr, chunk_count) };
			bitmaps[new_chunk] = BitmapDescriptor::default();
			bitmaps[new_chunk].set_tiny(true);
			bitmaps[new_chunk].set_index_in_group(level % 4);
			bitmaps[new_chunk].set_frees(full_bitmap(level));

			let chunks = unsafe { chunk_slice(chunks_ptr, chunk_count) };
			self.levels[level as usize].push_back(chunks, new_chunk);
			new_chunk
		};

		let bitmaps = unsafe { bitmap_slice(self.bitmaps_ptr, chunk_count) };
		let frees = bitmaps[block_chunk_index].frees();
		let piece = frees.trailing_zeros() as usize;
		let new_frees = frees & !(1u64 << piece);
		bitmaps[block_chunk_index].set_frees(new_frees);

		if new_frees == 0 {
			let chunks = unsafe { chunk_slice(chunks_ptr, chunk_count) };
			self.levels[level as usize].remove(chunks, block_chunk_index);
		}

		log::trace!("slab: allocated piece {piece} of block {block_chunk_index} at level {level}");
		block_chunk_index * CHUNK_SIZE + piece * level_size(level)
	}

	/// Reserves the exact address `addr` as a piece (or block, for direct
	/// sizes) of `size` bytes.
	pub fn reserve(&mut self, addr: usize, size: usize) -> Result<(), ReserveError> {
		match size_to_level(size) {
			Ok(level) => self.reserve_tiny(addr, level),
			Err(order) => {
				#[cfg(feature = "strict-addr")]
				if addr % CHUNK_SIZE != 0 {
					return Err(ReserveError::Invalid);
				}
				self.buddy.reserve(addr / CHUNK_SIZE, order)
			}
		}
	}

	fn reserve_tiny(&mut self, addr: usize, level: u8) -> Result<(), ReserveError> {
		let order = level_to_order(level);
		let block_chunk_index = align_down(addr / CHUNK_SIZE, order);
		let block_start_addr = block_chunk_index * CHUNK_SIZE;

		let piece_size = level_size(level);
		let offset = addr - block_start_addr;
		#[cfg(feature = "strict-addr")]
		if offset % piece_size != 0 {
			return Err(ReserveError::Invalid);
		}
		let piece = offset / piece_size;
		if piece as u32 >= level_bits(level) {
			return Err(ReserveError::Invalid);
		}

		let chunk_count = self.chunk_count();
		let (chunks_ptr, _) = self.buddy.chunk_array();

		let occupant_order = {
			let chunks = unsafe { chunk_slice(chunks_ptr, chunk_count) };
			let descriptor = chunks[block_chunk_index];
			if descriptor.free() {
				None
			} else {
				Some(descriptor.order())
			}
		};

		if let Some(occupant_order) = occupant_order {
			// Mirrors the original's `chunk->order == order && bitmap->tiny`
			// guard: only trust `bitmaps[block_chunk_index]` once we know this
			// chunk is actually the head of a block at this level's order —
			// otherwise it's an interior chunk of some other live block and
			// its bitmap slot is stale leftover data.
			if occupant_order != order {
				return Err(ReserveError::Busy);
			}
			let bitmaps = unsafe { bitmap_slice(self.bitmaps_ptr, chunk_count) };
			let head = bitmaps[block_chunk_index];
			if !head.tiny() || head.index_in_group() != level % 4 {
				return Err(ReserveError::Busy);
			}
			let frees = head.frees();
			if frees & (1u64 << piece) == 0 {
				return Err(ReserveError::Busy);
			}
			let new_frees = frees & !(1u64 << piece);
			bitmaps[block_chunk_index].set_frees(new_frees);
			if new_frees == 0 {
				let chunks = unsafe { chunk_slice(chunks_ptr, chunk_count) };
				self.levels[level as usize].remove(chunks, block_chunk_index);
			}
			return Ok(());
		}

		self.buddy.reserve(block_chunk_index, order)?;

		let bitmaps = unsafe { bitmap_slice(self.bitmaps_ptr, chunk_count) };
		let frees = full_bitmap(level) & !(1u64 << piece);
		bitmaps[block_chunk_index] = BitmapDescriptor::default();
		bitmaps[block_chunk_index].set_tiny(true);
		bitmaps[block_chunk_index].set_index_in_group(level % 4);
		bitmaps[block_chunk_index].set_frees(frees);

		if frees != 0 {
			let chunks = unsafe { chunk_slice(chunks_ptr, chunk_count) };
			self.levels[level as usize].push_back(chunks, block_chunk_index);
		}
		log::trace!("slab: reserved piece {piece} of block {block_chunk_index} at level {level}");
		Ok(())
	}

	/// Frees a previously allocated address, returning a block to the buddy
	/// layer once every one of its pieces is free again.
	pub fn free(&mut self, addr: usize) -> Result<(), FreeError> {
		let chunk_count = self.chunk_count();
		let chunk_index = addr / CHUNK_SIZE;
		if chunk_index >= chunk_count {
			return Err(FreeError::Invalid);
		}

		let (chunks_ptr, _) = self.buddy.chunk_array();
		let chunks = unsafe { chunk_slice(chunks_ptr, chunk_count) };
		let descriptor = chunks[chunk_index];
		if descriptor.free() {
			return Err(FreeError::Invalid);
		}

		let order = descriptor.order();
		let block_chunk_index = align_down(chunk_index, order);

		let bitmaps = unsafe { bitmap_slice(self.bitmaps_ptr, chunk_count) };
		let head = bitmaps[block_chunk_index];

		if !head.tiny() {
			#[cfg(feature = "strict-addr")]
			if block_chunk_index != chunk_index {
				return Err(FreeError::Invalid);
			}
			return self.buddy.free(block_chunk_index).map_err(|_| FreeError::Invalid);
		}

		let level = order * 4 + head.index_in_group();
		let piece_size = level_size(level);
		let block_start = block_chunk_index * CHUNK_SIZE;
		let offset = addr - block_start;
		#[cfg(feature = "strict-addr")]
		if offset % piece_size != 0 {
			return Err(FreeError::Invalid);
		}
		let piece = offset / piece_size;
		if piece as u32 >= level_bits(level) {
			return Err(FreeError::Invalid);
		}

		let frees = head.frees();
		if frees & (1u64 << piece) != 0 {
			return Err(FreeError::Invalid);
		}
		let was_fully_allocated = frees == 0;
		let new_frees = frees | (1u64 << piece);
		bitmaps[block_chunk_index].set_frees(new_frees);

		let chunks = unsafe { chunk_slice(chunks_ptr, chunk_count) };
		if was_fully_allocated {
			self.levels[level as usize].push_back(chunks, block_chunk_index);
		}

		if new_frees == full_bitmap(level) {
			self.levels[level as usize].remove(chunks, block_chunk_index);
			self.buddy
				.free(block_chunk_index)
				.map_err(|_| FreeError::Invalid)?;
		}

		log::trace!("slab: freed piece {piece} of block {block_chunk_index} at level {level}");
		Ok(())
	}

	/// Size, in bytes, of the allocation containing `addr`, or [`FAIL`] if
	/// `addr` does not name a live allocation.
	#[must_use]
	pub fn usable_size(&self, addr: usize) -> usize {
		let chunk_count = self.chunk_count();
		let chunk_index = addr / CHUNK_SIZE;
		if chunk_index >= chunk_count {
			return FAIL;
		}

		let (chunks_ptr, _) = self.buddy.chunk_array();
		let chunks = unsafe { chunk_slice(chunks_ptr, chunk_count) };
		let descriptor = chunks[chunk_index];
		if descriptor.free() {
			return FAIL;
		}

		let order = descriptor.order();
		let block_chunk_index = align_down(chunk_index, order);
		let bitmaps = unsafe { bitmap_slice(self.bitmaps_ptr, chunk_count) };
		let head = bitmaps[block_chunk_index];

		if head.tiny() {
			level_size(order * 4 + head.index_in_group())
		} else {
			#[cfg(feature = "strict-addr")]
			if block_chunk_index != chunk_index {
				return FAIL;
			}
			(1usize << order) * CHUNK_SIZE
		}
	}
}

impl Drop for SlabAllocator {
	fn drop(&mut self) {
		self.meta.free(self.bitmaps_ptr.cast(), self.bitmaps_layout);
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn init_rejects_zero_and_sub_chunk_sizes() {
		assert_eq!(SlabAllocator::new(0, None).unwrap_err(), InitError::Invalid);
		assert_eq!(
			SlabAllocator::new(CHUNK_SIZE - 1, None).unwrap_err(),
			InitError::Invalid
		);
	}

	#[test]
	fn tiny_allocations_share_a_block_until_exhausted() {
		let mut slab = SlabAllocator::new(4096, None).unwrap();
		let a = slab.allocate(8);
		let b = slab.allocate(8);
		assert_ne!(a, FAIL);
		assert_ne!(b, FAIL);
		assert_ne!(a, b);
		assert_eq!(a / CHUNK_SIZE, b / CHUNK_SIZE);
	}

	#[test]
	fn direct_allocation_bypasses_the_slab_bitmap() {
		let mut slab = SlabAllocator::new(CHUNK_SIZE * 20_000, None).unwrap();
		let huge = slab.allocate(CHUNK_SIZE * 10_000);
		assert_ne!(huge, FAIL);
		// 10_000 chunks rounds up to the next power of two: 16384.
		assert_eq!(slab.usable_size(huge), 16_384 * CHUNK_SIZE);
	}

	#[test]
	fn free_restores_capacity_for_reuse() {
		let mut slab = SlabAllocator::new(4096, None).unwrap();
		let a = slab.allocate(8);
		slab.free(a).unwrap();
		let b = slab.allocate(8);
		assert_eq!(a, b);
	}

	#[test]
	fn double_free_is_rejected() {
		let mut slab = SlabAllocator::new(4096, None).unwrap();
		let a = slab.allocate(8);
		slab.free(a).unwrap();
		assert_eq!(slab.free(a).unwrap_err(), FreeError::Invalid);
	}

	#[test]
	fn usable_size_reports_the_piece_class() {
		let mut slab = SlabAllocator::new(4096, None).unwrap();
		let a = slab.allocate(9);
		assert_eq!(slab.usable_size(a), 10);
	}

	#[test]
	fn reserve_colliding_with_a_different_order_block_is_busy() {
		let mut slab = SlabAllocator::new(4096, None).unwrap();
		// Takes chunks 0-1 as a single order-1 (level 4, size 16) block.
		let a = slab.allocate(16);
		assert_eq!(a, 0);
		// A level-0 (order-0) reserve landing on chunk 0 collides with a
		// block of a different order, not a same-order bitmap mismatch, but
		// must still report Busy rather than Invalid.
		assert_eq!(slab.reserve(0, 8).unwrap_err(), ReserveError::Busy);
	}

	#[test]
	fn reserve_claims_a_specific_piece() {
		let mut slab = SlabAllocator::new(4096, None).unwrap();
		slab.reserve(0, 8).unwrap();
		let a = slab.allocate(8);
		assert_ne!(a, 0);
	}

	#[test]
	fn reserve_twice_on_the_same_piece_is_busy() {
		let mut slab = SlabAllocator::new(4096, None).unwrap();
		slab.reserve(0, 8).unwrap();
		assert_eq!(slab.reserve(0, 8).unwrap_err(), ReserveError::Busy);
	}

	#[test]
	fn fully_freed_block_returns_to_buddy() {
		let mut slab = SlabAllocator::new(4096, None).unwrap();
		let mut pieces = alloc::vec::Vec::new();
		loop {
			let p = slab.allocate(8);
			if p == FAIL {
				break;
			}
			pieces.push(p);
		}
		for p in pieces {
			slab.free(p).unwrap();
		}
		// All 8 chunks should have coalesced back into one order-3 block,
		// which is exactly what a level-12 piece (order 3, size 64) needs.
		assert_ne!(slab.allocate(64), FAIL);
	}
}
