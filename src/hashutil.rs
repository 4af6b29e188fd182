//
// hashutil.rs -- seedable hasher capability and linear-hashing helpers
//
// This file is part of the nudb-native project.
// SPDX-License-Identifier: MIT

use crate::ser::write_u64;

/// An opaque, seedable 64-bit hasher. The core never assumes anything about the algorithm
/// beyond this contract (spec §6, §9): constructible from a seed, fed bytes, and asked for a
/// single 64-bit digest at the end.
pub trait KeyHasher {
    fn new(seed: u64) -> Self
    where
        Self: Sized;
    fn write(&mut self, bytes: &[u8]);
    fn finish(&self) -> u64;
}

/// Hashes `bytes` in one shot with a freshly seeded `H`.
pub fn hash_with<H: KeyHasher>(seed: u64, bytes: &[u8]) -> u64 {
    let mut h = H::new(seed);
    h.write(bytes);
    h.finish()
}

/// Default hasher: a seeded xxh3-64. Chosen for the same reason peer embedded key/value engines
/// in this ecosystem reach for the xxhash family: fast, well distributed, and seedable.
pub struct Xxh3Hasher(xxhash_rust::xxh3::Xxh3);

impl KeyHasher for Xxh3Hasher {
    fn new(seed: u64) -> Self {
        Xxh3Hasher(xxhash_rust::xxh3::Xxh3::with_seed(seed))
    }

    fn write(&mut self, bytes: &[u8]) {
        self.0.update(bytes);
    }

    fn finish(&self) -> u64 {
        self.0.digest()
    }
}

/// `pepper(salt)` binds a key file to the hasher identity used to create it: it is
/// `hasher(salt-seeded)(be64(salt))`. Reopening the same file with a different hasher
/// implementation (or a bug that reorders bytes) makes the pepper mismatch, which is detected
/// at open time rather than silently returning wrong answers.
pub fn pepper<H: KeyHasher>(salt: u64) -> u64 {
    let mut buf = Vec::with_capacity(8);
    write_u64(&mut buf, salt).expect("write to Vec never fails");
    hash_with::<H>(salt, &buf)
}

/// Litwin linear-hashing bucket mapping: `n = h mod modulus`, folded back into `[0, buckets)`.
///
/// Per spec §4.5 / §9 open question (a): callers performing a split must grow `modulus` (if
/// `buckets == modulus`) strictly before computing `n1 = buckets - modulus/2` for the bucket
/// being split; this function on its own just evaluates the mapping for a given `(buckets,
/// modulus)` snapshot and does not mutate either.
pub fn bucket_index(hash: u64, buckets: u64, modulus: u64) -> u64 {
    let n = hash % modulus;
    if n >= buckets {
        n - modulus / 2
    } else {
        n
    }
}

/// Smallest power of two `>= n` (with `ceil_pow2(0) == 1`, `ceil_pow2(1) == 1`).
pub fn ceil_pow2(n: u64) -> u64 {
    if n <= 1 {
        1
    } else {
        1u64 << (64 - (n - 1).leading_zeros())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ceil_pow2_values() {
        assert_eq!(ceil_pow2(0), 1);
        assert_eq!(ceil_pow2(1), 1);
        assert_eq!(ceil_pow2(2), 2);
        assert_eq!(ceil_pow2(3), 4);
        assert_eq!(ceil_pow2(4), 4);
        assert_eq!(ceil_pow2(5), 8);
        assert_eq!(ceil_pow2(1024), 1024);
        assert_eq!(ceil_pow2(1025), 2048);
    }

    #[test]
    fn bucket_index_folds_back() {
        // buckets=3, modulus=4: indices 0,1,2 map to themselves, and any hash landing on
        // modulus-space index 3 folds back to bucket 1 (3 - modulus/2).
        assert_eq!(bucket_index(0, 3, 4), 0);
        assert_eq!(bucket_index(1, 3, 4), 1);
        assert_eq!(bucket_index(2, 3, 4), 2);
        assert_eq!(bucket_index(3, 3, 4), 1);
        assert_eq!(bucket_index(7, 3, 4), 1);
    }

    #[test]
    fn xxh3_is_seed_sensitive() {
        let a = hash_with::<Xxh3Hasher>(1, b"hello");
        let b = hash_with::<Xxh3Hasher>(2, b"hello");
        assert_ne!(a, b);
    }

    #[test]
    fn pepper_changes_with_salt() {
        assert_ne!(pepper::<Xxh3Hasher>(1), pepper::<Xxh3Hasher>(2));
    }
}
