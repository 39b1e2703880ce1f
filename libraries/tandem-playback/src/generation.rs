//! Track-switch generation counter
//!
//! Every switch (and every force stop) advances the generation. Anything that
//! completes asynchronously carries the generation it was started under and is
//! ignored if that generation is no longer current.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Shared monotonic counter
#[derive(Debug, Clone, Default)]
pub struct Generation(Arc<AtomicU64>);

impl Generation {
    /// Create a counter starting at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Current generation
    pub fn current(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }

    /// Start a new generation and return it
    pub fn advance(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Whether `generation` is still the current one
    pub fn is_current(&self, generation: u64) -> bool {
        self.current() == generation
    }
}
