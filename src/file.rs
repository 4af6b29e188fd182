//
// file.rs -- polymorphic file capability
//
// This file is part of the nudb-native project.
// SPDX-License-Identifier: MIT

//! The core never depends on `std::fs::File` directly; it depends on this narrow capability
//! (spec §9: "Polymorphic file"). Positioned reads/writes take `&self`, which is what lets a
//! single open file be shared between the foreground caller and the background committer
//! thread without a mutex guarding a shared cursor -- every call already carries its own offset.

use std::fs::{self, File, OpenOptions as StdOpenOptions};
use std::io;
use std::path::Path;

#[cfg(unix)]
use std::os::unix::fs::FileExt;

/// open/create/read-at/write-at/truncate/sync/size/close/erase, as a trait object-free generic
/// bound. `close` is implicit in `Drop`.
pub trait RandomAccessFile: Send + Sync {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<()>;
    fn write_at(&self, buf: &[u8], offset: u64) -> io::Result<()>;
    fn size(&self) -> io::Result<u64>;
    fn set_len(&self, len: u64) -> io::Result<()>;
    fn sync_all(&self) -> io::Result<()>;
}

/// The default `RandomAccessFile`, backed by a real `std::fs::File`.
pub struct NativeFile(File);

impl NativeFile {
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        StdOpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map(NativeFile)
    }

    pub fn create_new(path: impl AsRef<Path>) -> io::Result<Self> {
        StdOpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)
            .map(NativeFile)
    }
}

impl RandomAccessFile for NativeFile {
    #[cfg(unix)]
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<()> {
        self.0.read_exact_at(buf, offset)
    }

    #[cfg(not(unix))]
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<()> {
        use std::io::{Read, Seek, SeekFrom};
        // Non-unix targets lack a positioned read syscall; fall back to seek+read, which is
        // safe here because callers never share a `NativeFile` across threads off unix.
        let mut f = self.0.try_clone()?;
        f.seek(SeekFrom::Start(offset))?;
        f.read_exact(buf)
    }

    #[cfg(unix)]
    fn write_at(&self, buf: &[u8], offset: u64) -> io::Result<()> {
        self.0.write_all_at(buf, offset)
    }

    #[cfg(not(unix))]
    fn write_at(&self, buf: &[u8], offset: u64) -> io::Result<()> {
        use std::io::{Seek, SeekFrom, Write};
        let mut f = self.0.try_clone()?;
        f.seek(SeekFrom::Start(offset))?;
        f.write_all(buf)
    }

    fn size(&self) -> io::Result<u64> {
        self.0.metadata().map(|m| m.len())
    }

    fn set_len(&self, len: u64) -> io::Result<()> {
        self.0.set_len(len)
    }

    fn sync_all(&self) -> io::Result<()> {
        self.0.sync_all()
    }
}

/// Erases a file, treating "already gone" as success (spec §6).
pub fn erase_file(path: impl AsRef<Path>) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}
