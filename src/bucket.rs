//
// bucket.rs -- bucket block view
//
// This file is part of the nudb-native project.
// SPDX-License-Identifier: MIT

//! A bucket is `{ count: u16, spill: u48, entries: [ (offset: u48, size: u32, hash: u64); count ] }`
//! (spec §6), padded with zeroes out to `block_size` bytes when it lives directly in the key
//! file. Entries are kept sorted by ascending hash so a fetch can `lower_bound` straight to the
//! first candidate and stop as soon as the hash no longer matches.

use crate::bulkio::{BulkReader, BulkWriter};
use crate::error::{Error, Result};
use crate::file::RandomAccessFile;
use crate::ser::{read_u16, read_u32, read_u48, read_u64, write_u16, write_u32, write_u48, write_u64};

/// Bytes occupied by the fixed bucket header (count + spill pointer).
const BUCKET_HEADER_SIZE: usize = 2 + 6;
/// Bytes occupied by one entry (value offset + value size + hash).
pub const ENTRY_SIZE: usize = 6 + 4 + 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketEntry {
    pub offset: u64,
    pub size: u32,
    pub hash: u64,
}

#[derive(Debug, Clone)]
pub struct Bucket {
    spill: u64,
    entries: Vec<BucketEntry>,
}

impl Bucket {
    pub fn empty() -> Self {
        Bucket {
            spill: 0,
            entries: Vec::new(),
        }
    }

    /// Maximum number of entries that fit in one `block_size`-byte block.
    pub fn capacity(block_size: usize) -> usize {
        block_size.saturating_sub(BUCKET_HEADER_SIZE) / ENTRY_SIZE
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn spill(&self) -> u64 {
        self.spill
    }

    pub fn set_spill(&mut self, offset: u64) {
        self.spill = offset;
    }

    /// Bytes this bucket's content actually occupies (header + live entries), as opposed to the
    /// block size it may be padded out to.
    pub fn actual_size(&self) -> usize {
        BUCKET_HEADER_SIZE + self.entries.len() * ENTRY_SIZE
    }

    pub fn is_full(&self, block_size: usize) -> bool {
        self.entries.len() >= Self::capacity(block_size)
    }

    /// Index of the first entry with `hash >= h`.
    pub fn lower_bound(&self, h: u64) -> usize {
        self.entries.partition_point(|e| e.hash < h)
    }

    pub fn get(&self, i: usize) -> &BucketEntry {
        &self.entries[i]
    }

    pub fn entries(&self) -> &[BucketEntry] {
        &self.entries
    }

    /// Inserts a new entry, preserving ascending hash order. Entries sharing a hash are kept in
    /// insertion order among themselves.
    pub fn insert(&mut self, offset: u64, size: u32, hash: u64) {
        let at = self.entries.partition_point(|e| e.hash <= hash);
        self.entries.insert(at, BucketEntry { offset, size, hash });
    }

    pub fn erase(&mut self, i: usize) -> BucketEntry {
        self.entries.remove(i)
    }

    fn encode_body(&self) -> Vec<u8> {
        let mut body = Vec::with_capacity(self.actual_size());
        write_u16(&mut body, self.entries.len() as u16).expect("write to Vec never fails");
        write_u48(&mut body, self.spill).expect("spill offset fits in 48 bits");
        for e in &self.entries {
            write_u48(&mut body, e.offset).expect("value offset fits in 48 bits");
            write_u32(&mut body, e.size).expect("write to Vec never fails");
            write_u64(&mut body, e.hash).expect("write to Vec never fails");
        }
        body
    }

    fn decode_body(body: &[u8], block_size: usize) -> Result<Self> {
        if body.len() < BUCKET_HEADER_SIZE {
            return Err(Error::InvalidBucketSize {
                found: body.len(),
                block_size: block_size as u32,
            });
        }
        let mut r = body;
        let count = read_u16(&mut r)? as usize;
        let spill = read_u48(&mut r)?;
        if count > Self::capacity(block_size) {
            return Err(Error::InvalidBucketSize {
                found: body.len(),
                block_size: block_size as u32,
            });
        }
        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            let offset = read_u48(&mut r)?;
            let size = read_u32(&mut r)?;
            let hash = read_u64(&mut r)?;
            entries.push(BucketEntry { offset, size, hash });
        }
        Ok(Bucket { spill, entries })
    }

    /// Reads a full `block_size`-byte bucket image directly out of a key-file block.
    pub fn from_block(buf: &[u8], block_size: usize) -> Result<Self> {
        Self::decode_body(buf, block_size)
    }

    /// Serializes this bucket as a zero-padded `block_size`-byte block, as stored in the key
    /// file.
    pub fn to_block(&self, block_size: usize) -> Vec<u8> {
        let mut block = self.encode_body();
        block.resize(block_size, 0);
        block
    }

    /// Reads a variable-length, length-prefixed bucket body from a spill or log record. Expects
    /// the caller to have already consumed the 6-byte zero sentinel that precedes it.
    pub fn read_spill_body(r: &mut BulkReader, block_size: usize) -> Result<Option<Self>> {
        let len_bytes = match r.read_exact(2)? {
            Some(b) => b,
            None => return Ok(None),
        };
        let len = u16::from_be_bytes([len_bytes[0], len_bytes[1]]) as usize;
        let body = match r.read_exact(len)? {
            Some(b) => b,
            None => return Ok(None),
        };
        Self::decode_body(&body, block_size).map(Some)
    }

    /// Writes this bucket as a `6B zero sentinel || 2B length || body` spill/log record and
    /// returns the file offset the sentinel started at, so a sequential scan over the data file
    /// can tell a spill record apart from a value record (whose first 6 bytes are its nonzero
    /// size) by the same field.
    pub fn write_spill_body(&self, w: &mut BulkWriter) -> Result<u64> {
        let body = self.encode_body();
        if body.len() > u16::MAX as usize {
            return Err(Error::InvalidSpillSize(body.len() as u32));
        }
        let start = w.offset();
        w.write(&[0u8; 6]);
        w.write(&(body.len() as u16).to_be_bytes());
        w.write(&body);
        Ok(start)
    }

    /// Reads a length-prefixed bucket body directly out of a spill chain link, given the file
    /// offset of its leading sentinel, without going through a `BulkReader`. Used to walk a chain
    /// one hop at a time (fetch) rather than streaming it (commit).
    pub fn read_spill_at(file: &dyn RandomAccessFile, offset: u64, block_size: usize) -> Result<Self> {
        let mut len_buf = [0u8; 2];
        file.read_at(&mut len_buf, offset + 6)?;
        let len = u16::from_be_bytes(len_buf) as usize;
        let mut body = vec![0u8; len];
        file.read_at(&mut body, offset + 8)?;
        Self::decode_body(&body, block_size)
    }

    /// Runs the spill policy: if this bucket is already at capacity for `block_size`, writes its
    /// current contents out as a spill record, points `self` at that record, and empties `self`
    /// so a fresh insert can proceed. The old spill chain (if any) is preserved because it is
    /// encoded inside the just-written record.
    pub fn maybe_spill(&mut self, block_size: usize, w: &mut BulkWriter) -> Result<()> {
        if !self.is_full(block_size) {
            return Ok(());
        }
        let offset = self.write_spill_body(w)?;
        self.entries.clear();
        self.spill = offset;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::{NativeFile, RandomAccessFile};
    use std::sync::Arc;

    #[test]
    fn capacity_matches_layout() {
        // header 8B, entry 18B: a 256B block holds (256-8)/18 = 13 entries.
        assert_eq!(Bucket::capacity(256), 13);
    }

    #[test]
    fn insert_keeps_ascending_hash_order() {
        let mut b = Bucket::empty();
        b.insert(100, 10, 5);
        b.insert(200, 20, 1);
        b.insert(300, 30, 9);
        b.insert(400, 40, 5);
        let hashes: Vec<u64> = b.entries().iter().map(|e| e.hash).collect();
        assert_eq!(hashes, vec![1, 5, 5, 9]);
        assert_eq!(b.lower_bound(5), 1);
        assert_eq!(b.lower_bound(6), 3);
    }

    #[test]
    fn block_roundtrip() {
        let mut b = Bucket::empty();
        b.insert(1000, 4, 77);
        b.set_spill(555);
        let block = b.to_block(256);
        assert_eq!(block.len(), 256);
        let back = Bucket::from_block(&block, 256).unwrap();
        assert_eq!(back.spill(), 555);
        assert_eq!(back.entries(), b.entries());
    }

    #[test]
    fn spill_record_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spill.dat");
        let file: Arc<dyn crate::file::RandomAccessFile> =
            Arc::new(NativeFile::create_new(&path).unwrap());

        let mut b = Bucket::empty();
        b.insert(42, 4, 9);
        let mut w = BulkWriter::new(Arc::clone(&file), 0);
        let off = b.write_spill_body(&mut w).unwrap();
        assert_eq!(off, 0);
        w.flush().unwrap();

        let mut r = BulkReader::new(file, 0, w.offset());
        let sentinel = r.read_exact(6).unwrap().unwrap();
        assert_eq!(sentinel, [0u8; 6]);
        let back = Bucket::read_spill_body(&mut r, 256).unwrap().unwrap();
        assert_eq!(back.entries(), b.entries());
    }

    #[test]
    fn maybe_spill_empties_full_bucket() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spill2.dat");
        let file: Arc<dyn crate::file::RandomAccessFile> =
            Arc::new(NativeFile::create_new(&path).unwrap());
        file.set_len(100).unwrap();
        let mut w = BulkWriter::new(file, 100);

        let block_size = 64; // capacity = (64-8)/18 = 3
        let mut b = Bucket::empty();
        for i in 0..3u64 {
            b.insert(i * 10, 4, i);
        }
        assert!(b.is_full(block_size));
        b.maybe_spill(block_size, &mut w).unwrap();
        assert!(b.is_empty());
        assert_ne!(b.spill(), 0);
    }
}
