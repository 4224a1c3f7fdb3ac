//! Memory workload: allocate a block and touch every byte.

use std::hint::black_box;

/// Allocate `chunk_size * chunk_count` bytes and write through all of them so
/// the pages are resident and the allocation cannot be elided.
pub fn allocate_block(chunk_size: usize, chunk_count: usize) -> Box<[u8]> {
    let len = chunk_size.saturating_mul(chunk_count);
    let mut block = vec![0u8; len].into_boxed_slice();
    for (i, byte) in block.iter_mut().enumerate() {
        *byte = i as u8;
    }
    black_box(block)
}
