//! Bounded retention buffer backing the memory-retention route.
//!
//! # Invariants
//! - `len() <= capacity()` at all times
//! - When full, the oldest block is evicted before the new one is appended
//!
//! Appends and evictions happen under one mutex. Evicted blocks are dropped
//! after the lock is released so freeing a large block never blocks other
//! requests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Identifier assigned to a block when it is retained. Monotonic per buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockId(pub u64);

#[derive(Debug)]
struct Block {
    id: BlockId,
    data: Box<[u8]>,
}

/// Outcome of a [`RetentionBuffer::retain`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Retained {
    pub id: BlockId,
    pub evicted: Option<BlockId>,
    pub len: usize,
    pub bytes: usize,
}

/// Block count and byte total read under a single lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionUsage {
    pub blocks: usize,
    pub bytes: usize,
}

/// Fixed-capacity FIFO of opaque memory blocks.
#[derive(Debug)]
pub struct RetentionBuffer {
    capacity: usize,
    blocks: Mutex<VecDeque<Block>>,
    next_id: AtomicU64,
}

impl RetentionBuffer {
    /// Create an empty buffer. A zero capacity is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            blocks: Mutex::new(VecDeque::with_capacity(capacity)),
            next_id: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Block>> {
        // A panic while holding the lock cannot leave the deque half-updated.
        self.blocks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Maximum number of blocks kept.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append a block, evicting the oldest one first when the buffer is full.
    pub fn retain(&self, data: Box<[u8]>) -> Retained {
        let id = BlockId(self.next_id.fetch_add(1, Ordering::Relaxed));

        let (evicted, retained) = {
            let mut blocks = self.lock();
            let evicted = if blocks.len() >= self.capacity {
                blocks.pop_front()
            } else {
                None
            };
            blocks.push_back(Block { id, data });
            let retained = Retained {
                id,
                evicted: evicted.as_ref().map(|block| block.id),
                len: blocks.len(),
                bytes: blocks.iter().map(|block| block.data.len()).sum(),
            };
            (evicted, retained)
        };
        drop(evicted);

        retained
    }

    /// Drop every retained block, returning how many were released.
    pub fn clear(&self) -> usize {
        let drained: Vec<Block> = self.lock().drain(..).collect();
        drained.len()
    }

    /// Number of blocks currently retained.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// True when no block is retained.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Total bytes currently retained.
    pub fn total_bytes(&self) -> usize {
        self.lock().iter().map(|block| block.data.len()).sum()
    }

    /// Block count and bytes as one consistent snapshot.
    pub fn usage(&self) -> RetentionUsage {
        let blocks = self.lock();
        RetentionUsage {
            blocks: blocks.len(),
            bytes: blocks.iter().map(|block| block.data.len()).sum(),
        }
    }

    /// True while the block with `id` has not been evicted or cleared.
    pub fn contains(&self, id: BlockId) -> bool {
        self.lock().iter().any(|block| block.id == id)
    }

    /// Ids of the retained blocks, oldest first.
    pub fn block_ids(&self) -> Vec<BlockId> {
        self.lock().iter().map(|block| block.id).collect()
    }
}
