//
// recover.rs -- crash recovery by rolling back an interrupted commit
//
// This file is part of the nudb-native project.
// SPDX-License-Identifier: MIT

//! Runs at the top of every `Store::open`. If the log file is absent or empty, there is nothing
//! to do: either the store has never crashed mid-commit, or a previous `close()` already erased
//! it. Otherwise the log holds a header describing the pre-commit file sizes plus the pre-images
//! of every bucket the interrupted commit touched; replaying them undoes everything step 2
//! onward of the commit protocol did.

use std::path::Path;
use std::sync::Arc;

use crate::bulkio::BulkReader;
use crate::error::{Error, Result};
use crate::file::{NativeFile, RandomAccessFile};
use crate::header::{DataHeader, KeyHeader, LogHeader, DATA_HEADER_SIZE, KEY_HEADER_SIZE, LOG_HEADER_SIZE};
use crate::ser::{read_u16, read_u48, read_u64};

pub fn recover(dat_path: impl AsRef<Path>, key_path: impl AsRef<Path>, log_path: impl AsRef<Path>) -> Result<()> {
    let log_path = log_path.as_ref();
    if !log_path.exists() {
        return Ok(());
    }

    let log = NativeFile::open(log_path)?;
    let log_size = log.size()?;
    if log_size == 0 {
        crate::file::erase_file(log_path)?;
        return Ok(());
    }

    let dat = NativeFile::open(dat_path.as_ref())?;
    let key = NativeFile::open(key_path.as_ref())?;

    let mut dat_buf = vec![0u8; DATA_HEADER_SIZE];
    dat.read_at(&mut dat_buf, 0)?;
    let data_header = DataHeader::read_from(&dat_buf[..])?;

    let mut key_buf = vec![0u8; KEY_HEADER_SIZE];
    key.read_at(&mut key_buf, 0).map_err(|_| Error::ShortKeyFile)?;
    let key_header = KeyHeader::read_from(&key_buf[..])?;
    key_header.verify_against_data(&data_header)?;

    if (log_size as usize) < LOG_HEADER_SIZE {
        // Crashed before the log header's fsync landed -- the commit point was never reached,
        // so there is nothing to roll back (spec §4.8 step 2: "zero records").
        log::warn!("recover: torn log header, treating as zero pending records");
        truncate_and_erase(&dat, &key, &log, key_header.block_size as u64, data_header.key_size, log_path)?;
        return Ok(());
    }

    let mut header_buf = vec![0u8; LOG_HEADER_SIZE];
    log.read_at(&mut header_buf, 0)?;
    let log_header = LogHeader::read_from(&header_buf[..])?;
    log_header.verify_against_key(&key_header)?;

    let block_size = key_header.block_size as u32;
    let buckets = (key.size()? / block_size as u64).saturating_sub(1);
    let dat_file_size = dat.size()?;

    let log_arc: Arc<dyn RandomAccessFile> = Arc::new(log);
    let mut reader = BulkReader::new(Arc::clone(&log_arc), LOG_HEADER_SIZE as u64, log_size);
    let mut replayed = 0u64;

    loop {
        let index_bytes = match reader.read_exact(8)? {
            Some(b) => b,
            None => break,
        };
        let n = read_u64(&index_bytes[..])?;

        let len_bytes = match reader.read_exact(2)? {
            Some(b) => b,
            None => break,
        };
        let body_len = read_u16(&len_bytes[..])? as usize;

        let body = match reader.read_exact(body_len)? {
            Some(b) => b,
            None => break,
        };

        if n >= buckets {
            return Err(Error::InvalidLogIndex { index: n, buckets });
        }
        // Pre-images never carry a spill pointer past the data file's pre-commit size; anything
        // further was appended by the interrupted commit and is about to be truncated away. The
        // body is a bucket block: 2B count, 6B spill pointer, then entries.
        if body.len() < 8 {
            return Err(Error::InvalidLogRecord);
        }
        let spill = read_u48(&body[2..8])?;
        if spill != 0 && spill > log_header.dat_file_size {
            return Err(Error::InvalidLogSpill {
                offset: spill,
                data_file_size: log_header.dat_file_size,
            });
        }

        key.write_at(&body, (n + 1) * block_size as u64)?;
        replayed += 1;
    }

    log::info!(
        "recover: rolled back {replayed} bucket(s), data file {dat_file_size} -> {}, key file -> {}",
        log_header.dat_file_size,
        log_header.key_file_size
    );

    dat.set_len(log_header.dat_file_size)?;
    dat.sync_all()?;
    key.set_len(log_header.key_file_size)?;
    key.sync_all()?;
    drop(reader);
    log_arc.set_len(0)?;
    log_arc.sync_all()?;
    drop(log_arc);
    crate::file::erase_file(log_path)?;
    Ok(())
}

fn truncate_and_erase(
    dat: &NativeFile,
    key: &NativeFile,
    log: &NativeFile,
    _block_size: u64,
    _key_size: u16,
    log_path: &Path,
) -> Result<()> {
    let _ = dat;
    let _ = key;
    log.set_len(0)?;
    log.sync_all()?;
    crate::file::erase_file(log_path)?;
    Ok(())
}
