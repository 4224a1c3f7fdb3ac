//! Fault-injection workloads.
//!
//! # Data Flow
//! ```text
//! /slow, /cpu, traffic generator
//!     → cpu.rs (regex email check, duration-bound burn)
//!
//! /alloc
//!     → memory.rs (allocate + touch a block)
//!     → retention.rs (bounded FIFO, evicts oldest when full)
//! ```
//!
//! # Design Decisions
//! - Workloads are synchronous and never yield; the CPU signature must be an
//!   uninterrupted burn visible to the sampler
//! - The retention buffer is the only shared mutable state, guarded by a lock
//! - Iteration counts and sizes come from configuration

pub mod cpu;
pub mod memory;
pub mod retention;

pub use cpu::{BurnReport, EmailCheck};
pub use retention::{BlockId, Retained, RetentionBuffer, RetentionUsage};

use crate::config::WorkloadConfig;

/// Everything the handlers need to run their workloads.
#[derive(Debug)]
pub struct Workloads {
    pub config: WorkloadConfig,
    pub email: EmailCheck,
    pub retention: RetentionBuffer,
}

impl Workloads {
    /// Compile the CPU pattern and create an empty retention buffer.
    pub fn new(config: WorkloadConfig) -> Result<Self, regex::Error> {
        Ok(Self {
            email: EmailCheck::new()?,
            retention: RetentionBuffer::new(config.retention_capacity),
            config,
        })
    }
}
