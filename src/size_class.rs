//! Pure size-classification functions: mapping a requested byte size to
//! either a non-negative tiny-allocation *level* or a negative number whose
//! magnitude is the buddy order for a direct allocation.
//!
//! These carry no allocator state — they're free functions, consulted by
//! both `Buddy` (indirectly, via `SlabAllocator`) and `SlabAllocator` itself.

use crate::descriptor::{
	BITMAP_BITS, CHUNK_SIZE, MAX_LEVEL, MAX_LEVEL_COUNT,
};

/// Given a slab level, the order of the buddy block that backs it.
#[inline]
#[must_use]
pub const fn level_to_order(level: u8) -> u8 {
	level / 4
}

/// Given a slab level, the size in bytes of one piece of that level.
///
/// Levels are grouped in fours: group `g` covers base size `8 << g` with a
/// gap of `2 << g` between consecutive levels in the group (so group 0 is
/// `8, 10, 12, 14`; group 1 is `16, 20, 24, 28`; and so on).
#[inline]
#[must_use]
pub const fn level_size(level: u8) -> usize {
	let group = (level / 4) as usize;
	let base = 8usize << group;
	let gap = 2usize << group;
	base + (level % 4) as usize * gap
}

/// Number of valid bits in a level's bitmap.
///
/// A block of order `o` spans `2^o` chunks and holds pieces of
/// `level_size(level)` bytes; the piece count `(2^o * CHUNK_SIZE) /
/// level_size(level)` collapses to `CHUNK_SIZE / level_size(level % 4)`
/// independent of the order, because `level_size` scales linearly with `2^o`
/// within a group. Using `level % 4` (always a group-0 level, base size 8,
/// 10, 12 or 14) computes that invariant directly instead of recomputing and
/// cancelling the `2^o` factor per call.
#[inline]
#[must_use]
pub const fn level_bits(level: u8) -> u32 {
	let unit_size = level_size(level % 4);
	let fit = (CHUNK_SIZE / unit_size) as u32;
	if fit < BITMAP_BITS {
		fit
	} else {
		BITMAP_BITS
	}
}

/// A full (all-pieces-free) bitmap for the given level.
#[inline]
#[must_use]
pub const fn full_bitmap(level: u8) -> u64 {
	(1u64 << level_bits(level)) - 1
}

/// Classifies a requested byte size.
///
/// Returns `Ok(level)` for a tiny allocation served by the slab layer, or
/// `Err(order)` for a direct allocation that must go straight to the buddy
/// layer. `size == 0` is treated as level 0 (the smallest tiny class),
/// matching the reference design rather than rejecting it outright.
#[must_use]
pub fn size_to_level(size: usize) -> Result<u8, u8> {
	if size < 8 {
		return Ok(0);
	}

	let highest_bit = usize::BITS - 1 - size.leading_zeros();
	let group = highest_bit - 3;
	let base = 8usize << group;
	let gap = 2usize << group;
	let addition = div_ceil(size - base, gap);
	debug_assert!(addition <= 4);
	let level = group * 4 + addition;

	if level <= MAX_LEVEL as u32 {
		return Ok(level as u8);
	}

	let chunk_count = div_ceil(size, CHUNK_SIZE);
	let order = smallest_order_covering(chunk_count);
	Err(order)
}

/// Smallest `o` such that `2^o >= chunk_count`, for `chunk_count >= 1`.
fn smallest_order_covering(chunk_count: usize) -> u8 {
	debug_assert!(chunk_count > 0);
	let highest_bit = usize::BITS - 1 - chunk_count.leading_zeros();
	if chunk_count.is_power_of_two() {
		highest_bit as u8
	} else {
		(highest_bit + 1) as u8
	}
}

const fn div_ceil(n: usize, d: usize) -> usize {
	if n == 0 {
		0
	} else {
		(n - 1) / d + 1
	}
}

const _: () = assert!(MAX_LEVEL_COUNT == 64);

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn small_sizes_are_level_zero() {
		for size in 0..8 {
			assert_eq!(size_to_level(size), Ok(0));
		}
	}

	#[test]
	fn first_group_sizes() {
		assert_eq!(size_to_level(8), Ok(0));
		assert_eq!(size_to_level(9), Ok(1));
		assert_eq!(size_to_level(10), Ok(1));
		assert_eq!(size_to_level(11), Ok(2));
		assert_eq!(size_to_level(12), Ok(2));
		assert_eq!(size_to_level(14), Ok(3));
	}

	#[test]
	fn level_size_matches_groups() {
		assert_eq!(level_size(0), 8);
		assert_eq!(level_size(1), 10);
		assert_eq!(level_size(2), 12);
		assert_eq!(level_size(3), 14);
		assert_eq!(level_size(4), 16);
		assert_eq!(level_size(5), 20);
		assert_eq!(level_size(6), 24);
		assert_eq!(level_size(7), 28);
		assert_eq!(level_size(8), 32);
	}

	#[test]
	fn size_to_level_round_trips_through_level_size() {
		for level in 0..=MAX_LEVEL {
			let size = level_size(level);
			assert_eq!(size_to_level(size), Ok(level), "level {level}, size {size}");
		}
	}

	#[test]
	fn tiny_classification_can_span_many_chunks() {
		// A single level covers a whole buddy block, which for high levels is
		// many chunks wide; sizes well past CHUNK_SIZE still classify as tiny
		// as long as their level stays within MAX_LEVEL.
		assert_eq!(size_to_level(CHUNK_SIZE), Ok(24));
		assert_eq!(level_size(24), CHUNK_SIZE);
	}

	#[test]
	fn boundary_between_tiny_and_direct() {
		let last_tiny_size = level_size(MAX_LEVEL);
		assert_eq!(size_to_level(last_tiny_size), Ok(MAX_LEVEL));
		assert!(size_to_level(last_tiny_size + 1).is_err());
	}

	#[test]
	fn direct_allocation_order_covers_requested_size() {
		for size in [CHUNK_SIZE * 10_000, CHUNK_SIZE * 10_000 + 1, 50_000_000] {
			let order = size_to_level(size).expect_err("expected a direct size");
			let capacity = (1usize << order) * CHUNK_SIZE;
			assert!(capacity >= size);
			if order > 0 {
				let half = (1usize << (order - 1)) * CHUNK_SIZE;
				assert!(half < size);
			}
		}
	}

	#[test]
	fn largest_tiny_allocation_hits_max_order_and_last_index_in_group() {
		let level = MAX_LEVEL;
		assert_eq!(level_to_order(level), crate::descriptor::MAX_ORDER);
		assert_eq!(level % 4, 3);
	}
}
