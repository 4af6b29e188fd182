//
// verify.rs -- read-only integrity check and sequential value enumeration
//
// This file is part of the nudb-native project.
// SPDX-License-Identifier: MIT

//! `verify` walks every bucket in the key file plus their spill chains and cross-checks what it
//! finds against the data file; `visit` ignores the key file entirely and just streams the data
//! file's value records in append order. Both are read-only and safe to run against a store the
//! caller also has open for writes, though the report may then describe a view that's already
//! stale by the time it's returned.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use crate::bucket::Bucket;
use crate::bulkio::BulkReader;
use crate::error::{Error, Result};
use crate::file::{NativeFile, RandomAccessFile};
use crate::header::{DataHeader, KeyHeader, DATA_HEADER_SIZE, KEY_HEADER_SIZE};
use crate::ser::read_u48;

/// Summary statistics produced by [`verify`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Report {
    pub capacity: usize,
    pub bucket_count: u64,
    pub key_file_size: u64,
    pub dat_file_size: u64,
    pub value_count: u64,
    pub spill_count: u64,
    pub value_bytes: u64,
    /// `spill_histogram[i]` = number of buckets whose spill chain is `i` links long.
    pub spill_histogram: Vec<u64>,
    pub avg_fetches_per_lookup: f64,
    pub key_file_waste_bytes: u64,
    pub actual_load: f64,
}

/// Walks the key file and every bucket's spill chain, cross-checking bucket entries against the
/// data file. Returns a [`Report`], or the first inconsistency found.
pub fn verify(dat_path: impl AsRef<Path>, key_path: impl AsRef<Path>) -> Result<Report> {
    let dat: Arc<dyn RandomAccessFile> = Arc::new(NativeFile::open(dat_path.as_ref())?);
    let key: Arc<dyn RandomAccessFile> = Arc::new(NativeFile::open(key_path.as_ref())?);

    let mut dat_header_buf = vec![0u8; DATA_HEADER_SIZE];
    dat.read_at(&mut dat_header_buf, 0)?;
    let data_header = DataHeader::read_from(&dat_header_buf[..])?;

    let mut key_header_buf = vec![0u8; KEY_HEADER_SIZE];
    key.read_at(&mut key_header_buf, 0).map_err(|_| Error::ShortKeyFile)?;
    let key_header = KeyHeader::read_from(&key_header_buf[..])?;
    key_header.verify_against_data(&data_header)?;

    let block_size = key_header.block_size as usize;
    let capacity = Bucket::capacity(block_size);
    if capacity == 0 {
        return Err(Error::InvalidCapacity);
    }

    let key_file_size = key.size()?;
    let dat_file_size = dat.size()?;
    let bucket_count = (key_file_size / block_size as u64).saturating_sub(1);

    let mut seen_offsets: HashSet<u64> = HashSet::new();
    let mut value_count = 0u64;
    let mut spill_count = 0u64;
    let mut value_bytes = 0u64;
    let mut spill_histogram: Vec<u64> = Vec::new();
    let mut total_fetch_steps = 0u64;
    let mut used_bytes = 0u64;

    for n in 0..bucket_count {
        let mut buf = vec![0u8; block_size];
        key.read_at(&mut buf, (n + 1) * block_size as u64)?;
        let mut bucket = Bucket::from_block(&buf, block_size)?;
        used_bytes += bucket.actual_size() as u64;

        let mut chain_len = 0u64;
        loop {
            for e in bucket.entries() {
                if !seen_offsets.insert(e.offset) {
                    return Err(Error::DuplicateValue { offset: e.offset });
                }
                let mut size_buf = [0u8; 6];
                dat.read_at(&mut size_buf, e.offset)
                    .map_err(|_| Error::MissingValue { offset: e.offset })?;
                let found_size = read_u48(&size_buf[..])?;
                if found_size != e.size as u64 {
                    return Err(Error::SizeMismatch {
                        offset: e.offset,
                        expected: e.size,
                        found: found_size as u32,
                    });
                }
                let mut key_buf = vec![0u8; data_header.key_size as usize];
                dat.read_at(&mut key_buf, e.offset + 6)?;
                let h = crate::hashutil::hash_with::<crate::hashutil::Xxh3Hasher>(key_header.salt, &key_buf);
                if h != e.hash {
                    return Err(Error::HashMismatch { offset: e.offset });
                }
                value_count += 1;
                value_bytes += e.size as u64;
                total_fetch_steps += chain_len + 1;
            }

            if bucket.spill() == 0 {
                break;
            }
            spill_count += 1;
            chain_len += 1;
            bucket = Bucket::read_spill_at(dat.as_ref(), bucket.spill(), block_size)?;
        }

        if chain_len as usize >= spill_histogram.len() {
            spill_histogram.resize(chain_len as usize + 1, 0);
        }
        spill_histogram[chain_len as usize] += 1;
    }

    let key_file_capacity = bucket_count * capacity as u64;
    let key_file_waste_bytes = (bucket_count * block_size as u64).saturating_sub(used_bytes);
    let actual_load = if key_file_capacity == 0 {
        0.0
    } else {
        value_count as f64 / key_file_capacity as f64
    };
    let avg_fetches_per_lookup = if value_count == 0 {
        0.0
    } else {
        total_fetch_steps as f64 / value_count as f64
    };

    Ok(Report {
        capacity,
        bucket_count,
        key_file_size,
        dat_file_size,
        value_count,
        spill_count,
        value_bytes,
        spill_histogram,
        avg_fetches_per_lookup,
        key_file_waste_bytes,
        actual_load,
    })
}

/// Streams the data file's value records in append order, invoking `on_value(key, value)` for
/// each. Spill records are skipped by their length prefix. Does not touch the key file.
pub fn visit(dat_path: impl AsRef<Path>, mut on_value: impl FnMut(&[u8], &[u8])) -> Result<()> {
    let dat: Arc<dyn RandomAccessFile> = Arc::new(NativeFile::open(dat_path.as_ref())?);
    let dat_size = dat.size()?;

    let mut header_buf = vec![0u8; DATA_HEADER_SIZE];
    dat.read_at(&mut header_buf, 0)?;
    let data_header = DataHeader::read_from(&header_buf[..])?;

    let mut reader = BulkReader::new(Arc::clone(&dat), DATA_HEADER_SIZE as u64, dat_size);
    loop {
        let size_bytes = match reader.read_exact(6)? {
            Some(b) => b,
            None => break,
        };
        let size = read_u48(&size_bytes[..])?;
        if size == 0 {
            let len_bytes = match reader.read_exact(2)? {
                Some(b) => b,
                None => break,
            };
            let len = u16::from_be_bytes([len_bytes[0], len_bytes[1]]) as usize;
            if reader.read_exact(len)?.is_none() {
                break;
            }
            continue;
        }
        let body = match reader.read_exact(data_header.key_size as usize + size as usize)? {
            Some(b) => b,
            None => break,
        };
        let (k, v) = body.split_at(data_header.key_size as usize);
        on_value(k, v);
    }
    Ok(())
}
