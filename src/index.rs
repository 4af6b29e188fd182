//
// index.rs -- linear-hashing split bookkeeping
//
// This file is part of the nudb-native project.
// SPDX-License-Identifier: MIT

//! Tracks the `(buckets, modulus)` pair and the fractional split accumulator (spec §4.5). The
//! actual entry redistribution between a split's two halves happens in the committer, which
//! owns the caches and bulk writer this needs; this module only knows when a split must happen
//! and which two bucket indices it involves.

use crate::hashutil::{bucket_index, ceil_pow2};

/// Fixed-point unit: one fully-accumulated item is worth `UNIT` in `frac`/`thresh` space, and
/// `load_factor` in the key-file header is already expressed in the same units (`LF * UNIT`).
const UNIT: u64 = 65536;

#[derive(Clone, Copy, Debug)]
pub struct LinearHashIndex {
    buckets: u64,
    modulus: u64,
    frac: u64,
    thresh: u64,
}

impl LinearHashIndex {
    /// `buckets` is the bucket count derived from the key-file length at open time; `capacity`
    /// is the number of entries that fit in one bucket block; `load_factor_fixed` is the header
    /// field (`LF * 65536`, saturated).
    pub fn new(buckets: u64, capacity: u64, load_factor_fixed: u16) -> Self {
        let buckets = buckets.max(1);
        let modulus = ceil_pow2(buckets);
        let thresh = Self::compute_thresh(capacity, load_factor_fixed);
        LinearHashIndex {
            buckets,
            modulus,
            frac: thresh / 2,
            thresh,
        }
    }

    fn compute_thresh(capacity: u64, load_factor_fixed: u16) -> u64 {
        (load_factor_fixed as u64 * capacity).max(UNIT)
    }

    pub fn buckets(&self) -> u64 {
        self.buckets
    }

    pub fn modulus(&self) -> u64 {
        self.modulus
    }

    pub fn bucket_index(&self, hash: u64) -> u64 {
        bucket_index(hash, self.buckets, self.modulus)
    }

    /// Called once per value committed. Returns `true` exactly when this item's contribution
    /// pushed the accumulator past the threshold, meaning the caller must now run one split via
    /// `begin_split`.
    pub fn tick(&mut self) -> bool {
        self.frac += UNIT;
        if self.frac >= self.thresh {
            self.frac -= self.thresh;
            true
        } else {
            false
        }
    }

    /// Performs the `(buckets, modulus)` bookkeeping for one split and returns `(n1, n2)`, the
    /// bucket being split and the new bucket being created. Per the ordering the original
    /// preserves: when `buckets == modulus`, `modulus` must double *before* `n1` is computed.
    pub fn begin_split(&mut self) -> (u64, u64) {
        if self.buckets == self.modulus {
            self.modulus *= 2;
        }
        let n1 = self.buckets - self.modulus / 2;
        let n2 = self.buckets;
        self.buckets += 1;
        (n1, n2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_doubles_modulus_before_computing_n1_when_buckets_eq_modulus() {
        // buckets=1, modulus=1 initially (ceil_pow2(1) == 1).
        let mut idx = LinearHashIndex::new(1, 100, 32768);
        assert_eq!(idx.buckets(), 1);
        assert_eq!(idx.modulus(), 1);

        let (n1, n2) = idx.begin_split();
        // modulus doubles to 2 first, so n1 = 1 - 2/2 = 0, n2 = 1 (the old bucket count).
        assert_eq!(idx.modulus(), 2);
        assert_eq!(n1, 0);
        assert_eq!(n2, 1);
        assert_eq!(idx.buckets(), 2);
    }

    #[test]
    fn split_without_modulus_growth() {
        // buckets=3, modulus=4: buckets != modulus, so no doubling this time.
        let mut idx = LinearHashIndex::new(3, 100, 32768);
        assert_eq!(idx.modulus(), 4);
        let (n1, n2) = idx.begin_split();
        assert_eq!(idx.modulus(), 4);
        assert_eq!(n1, 3 - 4 / 2);
        assert_eq!(n2, 3);
        assert_eq!(idx.buckets(), 4);
    }

    #[test]
    fn tick_fires_once_per_threshold() {
        let mut idx = LinearHashIndex::new(1, 2, 65535); // thresh = max(65536, 65535*2) = 131070
        let mut splits = 0;
        for _ in 0..10 {
            if idx.tick() {
                splits += 1;
            }
        }
        // frac starts at thresh/2; after enough ticks of +65536 each, a split should fire.
        assert!(splits >= 1);
    }
}
