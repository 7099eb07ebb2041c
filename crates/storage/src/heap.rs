//! Engine-owned word heap
//!
//! All transactional memory lives here. Words are valid for the lifetime of
//! the engine, so a load can never touch freed memory; an address outside
//! the heap is reported to the caller instead.

use greenstm_core::{Address, Result, StmError, Word};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tracing::warn;

/// Fixed-size array of atomically accessed words with bump allocation
#[derive(Debug)]
pub struct WordHeap {
    words: Box<[AtomicU64]>,
    next: AtomicUsize,
}

impl WordHeap {
    /// Create a zeroed heap of `len` words
    pub fn new(len: usize) -> Self {
        let words = (0..len).map(|_| AtomicU64::new(0)).collect::<Vec<_>>();
        WordHeap {
            words: words.into_boxed_slice(),
            next: AtomicUsize::new(0),
        }
    }

    /// Capacity in words
    pub fn len(&self) -> usize {
        self.words.len()
    }

    /// True if the heap has no words
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Words handed out by [`WordHeap::allocate`] so far
    pub fn allocated(&self) -> usize {
        self.next.load(Ordering::Acquire)
    }

    /// Reserve `count` consecutive words and return the first address
    ///
    /// Allocation is bump-only; ranges are never returned.
    pub fn allocate(&self, count: usize) -> Result<Address> {
        let limit = self.words.len();
        let mut current = self.next.load(Ordering::Acquire);
        loop {
            let end = match current.checked_add(count) {
                Some(end) if end <= limit => end,
                _ => {
                    warn!(requested = count, allocated = current, limit, "heap exhausted");
                    return Err(StmError::ResourceExhausted {
                        resource: "heap words",
                        limit,
                    });
                }
            };
            match self
                .next
                .compare_exchange_weak(current, end, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return Ok(Address::new(current)),
                Err(observed) => current = observed,
            }
        }
    }

    /// True if `addr` lies inside the heap
    #[inline]
    pub fn contains(&self, addr: Address) -> bool {
        addr.index() < self.words.len()
    }

    /// Atomic load with acquire ordering
    #[inline]
    pub fn load(&self, addr: Address) -> Option<Word> {
        self.words
            .get(addr.index())
            .map(|w| w.load(Ordering::Acquire))
    }

    /// Atomic store with release ordering
    ///
    /// Returns false if `addr` is outside the heap.
    #[inline]
    pub fn store(&self, addr: Address, value: Word) -> bool {
        match self.words.get(addr.index()) {
            Some(w) => {
                w.store(value, Ordering::Release);
                true
            }
            None => false,
        }
    }
}
