//
// bulkio.rs -- buffered sequential reader and appending writer
//
// This file is part of the nudb-native project.
// SPDX-License-Identifier: MIT

//! The data and log files are only ever scanned sequentially (recovery, rekey, verify, visit)
//! or appended to (the committer). `BulkReader` amortizes the read-at capability behind a large
//! buffer so sequential scans don't issue a syscall per record; `BulkWriter` accumulates writes
//! and flushes them as one `write_at` call, tracking the logical end-of-file offset so callers
//! can learn where a just-written record landed before it's actually flushed.

use std::io;
use std::sync::Arc;

use crate::file::RandomAccessFile;

const DEFAULT_BUFFER: usize = 256 * 1024;

/// Sequential reader over `[start, end)` of a file, refilling its buffer from disk as needed.
pub struct BulkReader {
    file: Arc<dyn RandomAccessFile>,
    buf: Vec<u8>,
    buf_pos: usize,  // next unread byte within `buf`
    buf_len: usize,  // valid bytes in `buf`
    file_pos: u64,   // file offset of `buf[buf_len]` (one past the buffered region)
    end: u64,        // exclusive upper bound of the range being scanned
}

impl BulkReader {
    pub fn new(file: Arc<dyn RandomAccessFile>, start: u64, end: u64) -> Self {
        BulkReader {
            file,
            buf: vec![0u8; DEFAULT_BUFFER],
            buf_pos: 0,
            buf_len: 0,
            file_pos: start,
            end,
        }
    }

    /// Current absolute file offset of the read cursor.
    pub fn offset(&self) -> u64 {
        self.file_pos - (self.buf_len - self.buf_pos) as u64
    }

    fn refill(&mut self) -> io::Result<()> {
        let remaining = (self.end - self.file_pos).min(self.buf.len() as u64) as usize;
        if remaining == 0 {
            self.buf_len = 0;
            self.buf_pos = 0;
            return Ok(());
        }
        self.file.read_at(&mut self.buf[..remaining], self.file_pos)?;
        self.buf_len = remaining;
        self.buf_pos = 0;
        self.file_pos += remaining as u64;
        Ok(())
    }

    /// Reads exactly `n` bytes, or returns `Ok(None)` if fewer than `n` bytes remain before
    /// `end` (a short read at a record boundary, which callers treat as a clean stop rather
    /// than an error -- a torn tail from an interrupted append).
    pub fn read_exact(&mut self, n: usize) -> io::Result<Option<Vec<u8>>> {
        let mut out = Vec::with_capacity(n);
        let mut need = n;
        while need > 0 {
            if self.buf_pos == self.buf_len {
                self.refill()?;
                if self.buf_len == 0 {
                    return Ok(None);
                }
            }
            let take = need.min(self.buf_len - self.buf_pos);
            out.extend_from_slice(&self.buf[self.buf_pos..self.buf_pos + take]);
            self.buf_pos += take;
            need -= take;
        }
        Ok(Some(out))
    }

    pub fn remaining(&self) -> u64 {
        self.end.saturating_sub(self.offset())
    }
}

/// Appending writer that buffers output and issues one `write_at` per flush, starting at a
/// fixed logical offset (the data/log file's current length at construction time).
pub struct BulkWriter {
    file: Arc<dyn RandomAccessFile>,
    buf: Vec<u8>,
    flushed_end: u64, // file offset where `buf` would be written
}

impl BulkWriter {
    pub fn new(file: Arc<dyn RandomAccessFile>, start: u64) -> Self {
        BulkWriter {
            file,
            buf: Vec::with_capacity(DEFAULT_BUFFER),
            flushed_end: start,
        }
    }

    /// The logical file offset the next `write()` call will land at.
    pub fn offset(&self) -> u64 {
        self.flushed_end + self.buf.len() as u64
    }

    pub fn write(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Flushes buffered bytes to disk. Does not fsync -- callers decide when durability is
    /// required (the commit protocol fsyncs explicitly, in the order the spec mandates).
    pub fn flush(&mut self) -> io::Result<()> {
        if !self.buf.is_empty() {
            self.file.write_at(&self.buf, self.flushed_end)?;
            self.flushed_end += self.buf.len() as u64;
            self.buf.clear();
        }
        Ok(())
    }
}
