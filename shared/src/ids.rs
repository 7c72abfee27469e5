use std::sync::atomic::{AtomicU64, Ordering};

/// Hands out monotonically increasing identifiers.
///
/// The game loop owns one for actors and one for packets; the client owns its
/// own for the packets it sends. Ids are never reused for the lifetime of the
/// allocator.
#[derive(Debug, Default)]
pub struct IdAllocator {
    next: AtomicU64,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    pub fn starting_at(first: u64) -> Self {
        Self {
            next: AtomicU64::new(first),
        }
    }

    pub fn next_id(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }

    /// The id the next call to `next_id` will return.
    pub fn peek(&self) -> u64 {
        self.next.load(Ordering::Relaxed)
    }
}
