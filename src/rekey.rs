//
// rekey.rs -- rebuild the key file from the data file alone
//
// This file is part of the nudb-native project.
// SPDX-License-Identifier: MIT

//! Used when the key file is lost or deliberately discarded: every value record in the data
//! file still names its own key, so the index can be reconstructed by a sequential scan. Runs
//! the scan once per stripe of buckets rather than once for the whole index, so memory use is
//! bounded by the caller's budget instead of the total bucket count.

use std::path::Path;
use std::sync::Arc;

use crate::bucket::Bucket;
use crate::bulkio::{BulkReader, BulkWriter};
use crate::error::{Error, Result};
use crate::file::{NativeFile, RandomAccessFile};
use crate::hashutil::{bucket_index, ceil_pow2, hash_with, pepper, Xxh3Hasher};
use crate::header::{DataHeader, KeyHeader, CURRENT_VERSION, DATA_HEADER_SIZE};
use crate::ser::read_u48;

/// One value or spill record read off the data file during a rekey scan.
enum Record {
    Value { offset: u64, key: Vec<u8>, size: u32 },
    Spill,
}

fn next_record(reader: &mut BulkReader, key_size: u16) -> Result<Option<Record>> {
    let offset = reader.offset();
    let size_bytes = match reader.read_exact(6)? {
        Some(b) => b,
        None => return Ok(None),
    };
    let size = read_u48(&size_bytes[..])?;
    if size == 0 {
        let len_bytes = match reader.read_exact(2)? {
            Some(b) => b,
            None => return Ok(None),
        };
        let len = u16::from_be_bytes([len_bytes[0], len_bytes[1]]) as usize;
        if reader.read_exact(len)?.is_none() {
            return Ok(None);
        }
        return Ok(Some(Record::Spill));
    }
    let body = match reader.read_exact(key_size as usize + size as usize)? {
        Some(b) => b,
        None => return Ok(None),
    };
    let key = body[..key_size as usize].to_vec();
    Ok(Some(Record::Value {
        offset,
        key,
        size: size as u32,
    }))
}

/// Rebuilds `key_path` from `dat_path`. `item_count_estimate` drives the target bucket count;
/// `memory_budget` bounds how many buckets are held in memory per pass. `on_progress(done,
/// total)` is called once per stripe completed.
pub fn rekey(
    dat_path: impl AsRef<Path>,
    key_path: impl AsRef<Path>,
    item_count_estimate: u64,
    memory_budget: usize,
    load_factor: f64,
    salt: u64,
    mut on_progress: impl FnMut(u64, u64),
) -> Result<()> {
    if !(load_factor > 0.0 && load_factor < 1.0) {
        return Err(Error::InvalidLoadFactor(load_factor));
    }

    let dat: Arc<dyn RandomAccessFile> = Arc::new(NativeFile::open(dat_path.as_ref())?);
    let dat_size = dat.size()?;

    let mut header_buf = vec![0u8; DATA_HEADER_SIZE];
    dat.read_at(&mut header_buf, 0)?;
    let data_header = DataHeader::read_from(&header_buf[..])?;

    let block_size = crate::options::DEFAULT_BLOCK_SIZE;
    let capacity = Bucket::capacity(block_size as usize) as u64;
    if capacity == 0 {
        return Err(Error::InvalidCapacity);
    }
    let load_factor_fixed = (load_factor * 65536.0).round().clamp(1.0, 65535.0) as u16;
    let per_bucket = ((capacity as f64) * load_factor).max(1.0) as u64;
    let buckets = ((item_count_estimate + per_bucket - 1) / per_bucket).max(1);
    let modulus = ceil_pow2(buckets);

    let pep = pepper::<Xxh3Hasher>(salt);
    let key_header = KeyHeader {
        version: CURRENT_VERSION,
        uid: data_header.uid,
        appnum: data_header.appnum,
        key_size: data_header.key_size,
        salt,
        pepper: pep,
        block_size: block_size as u16,
        load_factor: load_factor_fixed,
    };

    let key = NativeFile::create_new(key_path.as_ref())?;
    let mut kbuf = Vec::new();
    key_header.write_to(&mut kbuf)?;
    kbuf.resize(block_size as usize, 0);
    key.write_at(&kbuf, 0)?;
    key.set_len((buckets + 1) * block_size as u64)?;

    let stripe = (memory_budget / block_size as usize).max(1) as u64;
    let mut b0 = 0u64;
    let mut dat_write = BulkWriter::new(Arc::clone(&dat), dat_size);

    while b0 < buckets {
        let b1 = (b0 + stripe).min(buckets);
        let mut stripe_buckets: Vec<Bucket> = (b0..b1).map(|_| Bucket::empty()).collect();

        let mut reader = BulkReader::new(Arc::clone(&dat), DATA_HEADER_SIZE as u64, dat_write.offset());
        while let Some(rec) = next_record(&mut reader, data_header.key_size)? {
            let Record::Value { offset, key, size } = rec else {
                continue;
            };
            let h = hash_with::<Xxh3Hasher>(salt, &key);
            let n = bucket_index(h, buckets, modulus);
            if n < b0 || n >= b1 {
                continue;
            }
            let b = &mut stripe_buckets[(n - b0) as usize];
            if b.is_full(block_size as usize) {
                b.maybe_spill(block_size as usize, &mut dat_write)?;
            }
            b.insert(offset, size, h);
        }

        for (i, b) in stripe_buckets.iter().enumerate() {
            let n = b0 + i as u64;
            key.write_at(&b.to_block(block_size as usize), (n + 1) * block_size as u64)?;
        }

        on_progress(b1, buckets);
        b0 = b1;
    }

    dat_write.flush()?;
    dat.sync_all()?;
    key.sync_all()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::OpenOptions;

    #[test]
    fn rekey_reconstructs_lookups() {
        let dir = tempfile::tempdir().unwrap();
        let dat_path = dir.path().join("r.dat");
        let key_path = dir.path().join("r.key");
        let log_path = dir.path().join("r.log");

        let items = [(b"one".to_vec(), b"1".to_vec()), (b"two".to_vec(), b"2".to_vec()), (b"three".to_vec(), b"3".to_vec())];

        {
            let mut store = OpenOptions::new()
                .create()
                .key_size(8)
                .open(&dat_path, &key_path, &log_path)
                .unwrap();
            for (k, v) in &items {
                let mut padded = k.clone();
                padded.resize(8, 0);
                store.insert(&padded, v).unwrap();
            }
            store.flush().unwrap();
            store.close().unwrap();
        }

        std::fs::remove_file(&key_path).unwrap();
        rekey(&dat_path, &key_path, 10, 64 * 1024, 0.5, 0, |_, _| {}).unwrap();

        let store = OpenOptions::new().open(&dat_path, &key_path, &log_path).unwrap();
        for (k, v) in &items {
            let mut padded = k.clone();
            padded.resize(8, 0);
            store.fetch(&padded, |found| assert_eq!(found, v.as_slice())).unwrap();
        }
    }
}
