// Copyright (c) 2024-present, coldb
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::refs::Ref;

/// A host-heap-allocated chunk of scratch memory holding writable arrays
/// created during a write transaction.
///
/// Slabs are contiguous in *ref space* (`start..start + data.len()`) but
/// never in the host address space relative to one another, which is why
/// the free list must never coalesce across a slab boundary.
#[derive(Debug)]
pub struct Slab {
    pub start: Ref,
    pub data: Vec<u8>,
}

impl Slab {
    #[must_use]
    pub fn new(start: Ref, size: u64) -> Self {
        Self {
            start,
            data: vec![0_u8; size as usize],
        }
    }

    #[must_use]
    pub fn end(&self) -> Ref {
        self.start + self.data.len() as Ref
    }

    #[must_use]
    pub fn contains(&self, r: Ref) -> bool {
        r >= self.start && r < self.end()
    }
}

/// Smallest slab we'll ever allocate, to avoid a flurry of tiny allocations
/// right after opening a group for writing.
pub const MIN_SLAB_SIZE: u64 = 256;

/// Picks the size of the next slab: generous enough to amortize repeated
/// growth, bounded only by what the host allocator is willing to give us.
#[must_use]
pub fn next_slab_size(requested: u64, last_slab_size: u64) -> u64 {
    let rounded = crate::file::round_up_to_alignment(requested).max(MIN_SLAB_SIZE);
    let grown = last_slab_size.saturating_mul(2);
    rounded.max(grown)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn grows_exponentially() {
        assert_eq!(MIN_SLAB_SIZE, next_slab_size(8, 0));
        assert_eq!(512, next_slab_size(8, 256));
        assert_eq!(4096, next_slab_size(4000, 256));
    }

    #[test]
    fn slab_contains() {
        let slab = Slab::new(800, 64);
        assert!(slab.contains(800));
        assert!(slab.contains(863));
        assert!(!slab.contains(864));
        assert!(!slab.contains(799));
    }
}
