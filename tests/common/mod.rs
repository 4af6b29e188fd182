use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use nudb_native::{NativeFile, RandomAccessFile};
use tempfile::TempDir;

/// Three throwaway paths for a data/key/log file triple, backed by a `TempDir` kept alive for
/// as long as the returned value lives.
pub struct StorePaths {
    _dir: TempDir,
    pub dat: PathBuf,
    pub key: PathBuf,
    pub log: PathBuf,
}

#[allow(dead_code)]
pub fn store_paths(stem: &str) -> StorePaths {
    let dir = TempDir::new().expect("creating a temporary directory");
    let dat = dir.path().join(format!("{stem}.dat"));
    let key = dir.path().join(format!("{stem}.key"));
    let log = dir.path().join(format!("{stem}.log"));
    StorePaths { _dir: dir, dat, key, log }
}

/// Counts down to a forced failure: the `n`-th call after a `reset` fails, or never fails if
/// `n` is zero. Mirrors the original project's `fail_counter`.
pub struct FailCounter {
    target: AtomicUsize,
    count: AtomicUsize,
}

impl FailCounter {
    pub fn new(target: usize) -> Arc<Self> {
        Arc::new(FailCounter {
            target: AtomicUsize::new(target),
            count: AtomicUsize::new(0),
        })
    }

    fn fail(&self) -> bool {
        let target = self.target.load(Ordering::SeqCst);
        target != 0 && self.count.fetch_add(1, Ordering::SeqCst) + 1 >= target
    }
}

/// Wraps a `NativeFile` and forces the `n`-th call to `write_at`, `sync_all`, or `set_len`
/// (counted together, across all three) to fail. Reads never fail: a crash can always still
/// see what already made it to disk.
pub struct FaultInjectingFile {
    inner: NativeFile,
    counter: Arc<FailCounter>,
}

impl FaultInjectingFile {
    pub fn wrap(inner: NativeFile, counter: Arc<FailCounter>) -> Self {
        FaultInjectingFile { inner, counter }
    }
}

fn injected_failure() -> io::Error {
    io::Error::new(io::ErrorKind::Other, "injected file failure")
}

impl RandomAccessFile for FaultInjectingFile {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<()> {
        self.inner.read_at(buf, offset)
    }

    fn write_at(&self, buf: &[u8], offset: u64) -> io::Result<()> {
        if self.counter.fail() {
            return Err(injected_failure());
        }
        self.inner.write_at(buf, offset)
    }

    fn size(&self) -> io::Result<u64> {
        self.inner.size()
    }

    fn set_len(&self, len: u64) -> io::Result<()> {
        if self.counter.fail() {
            return Err(injected_failure());
        }
        self.inner.set_len(len)
    }

    fn sync_all(&self) -> io::Result<()> {
        if self.counter.fail() {
            return Err(injected_failure());
        }
        self.inner.sync_all()
    }
}

/// A small xorshift64 PRNG: deterministic but well-spread, for tests that need many distinct
/// keys or value sizes without pulling randomness into the library itself.
#[allow(dead_code)]
pub struct XorShift64(u64);

#[allow(dead_code)]
impl XorShift64 {
    pub fn new(seed: u64) -> Self {
        XorShift64(if seed == 0 { 0x9E3779B97F4A7C15 } else { seed })
    }

    pub fn next(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x
    }
}
