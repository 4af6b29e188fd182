//
// store.rs -- open/close lifecycle, fetch/insert, and the background committer
//
// This file is part of the nudb-native project.
// SPDX-License-Identifier: MIT

//! The store owns the three file handles, the two-generation pools and caches, and a
//! background thread that periodically folds pending inserts into the data and key files. See
//! the module-level commentary on [`crate::gentex`] for how readers avoid blocking on a commit
//! in progress.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::{Condvar, Mutex, RwLock};

use crate::bucket::{Bucket, BucketEntry};
use crate::bulkio::BulkWriter;
use crate::cache::Cache;
use crate::error::{Error, Result};
use crate::file::{NativeFile, RandomAccessFile};
use crate::gentex::Gentex;
use crate::hashutil::{bucket_index, hash_with, pepper, Xxh3Hasher};
use crate::header::{DataHeader, KeyHeader, LogHeader, CURRENT_VERSION, DATA_HEADER_SIZE, KEY_HEADER_SIZE, LOG_HEADER_SIZE};
use crate::index::LinearHashIndex;
use crate::pool::Pool;
use crate::ser::{write_u16, write_u48, write_u64};

const DEFAULT_POOL_THRESH: u64 = 64 * 1024;

struct State {
    p1: Pool,
    p0: Pool,
    c1: Cache,
    index: LinearHashIndex,
    pool_thresh: u64,
}

struct Inner {
    dat: Arc<dyn RandomAccessFile>,
    key: Arc<dyn RandomAccessFile>,
    log: Arc<dyn RandomAccessFile>,
    log_path: PathBuf,

    uid: u64,
    appnum: u64,
    key_size: u16,
    block_size: u32,
    salt: u64,
    pepper: u64,
    commit_limit: u64,
    cache_arena_block_size: usize,

    state: RwLock<State>,
    insert_mutex: Mutex<()>,
    commit_mutex: Mutex<()>,
    gentex: Gentex,
    error: Mutex<Option<Error>>,

    stop: AtomicBool,
    committer_ctl: Mutex<()>,
    committer_cv: Condvar,
    overflow_mutex: Mutex<()>,
    overflow_cv: Condvar,
}

/// An open append-only key/value store.
pub struct Store {
    inner: Arc<Inner>,
    committer: Option<JoinHandle<()>>,
}

fn generate_uid() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);
    let pid = std::process::id() as u64;
    let addr = &nanos as *const u64 as u64;
    nanos ^ pid.rotate_left(32) ^ addr.rotate_left(16)
}

impl Store {
    /// Lays down fresh data and key files. Does not touch the log file -- a brand-new store has
    /// nothing to roll back.
    pub fn create(
        dat_path: impl AsRef<Path>,
        key_path: impl AsRef<Path>,
        key_size: u16,
        block_size: u32,
        load_factor: f64,
        salt: u64,
        appnum: u64,
    ) -> Result<()> {
        if key_size == 0 {
            return Err(Error::InvalidKeySize(key_size as u32));
        }
        if !(load_factor > 0.0 && load_factor < 1.0) {
            return Err(Error::InvalidLoadFactor(load_factor));
        }
        if block_size > u16::MAX as u32 || (block_size as usize) < KEY_HEADER_SIZE {
            return Err(Error::InvalidBlockSize(block_size));
        }
        if Bucket::capacity(block_size as usize) == 0 {
            return Err(Error::InvalidCapacity);
        }

        let uid = generate_uid();
        let pep = pepper::<Xxh3Hasher>(salt);
        let load_factor_fixed = (load_factor * 65536.0).round().clamp(1.0, 65535.0) as u16;

        let dat = NativeFile::create_new(dat_path.as_ref())?;
        let data_header = DataHeader {
            version: CURRENT_VERSION,
            uid,
            appnum,
            key_size,
        };
        let mut dbuf = Vec::with_capacity(DATA_HEADER_SIZE);
        data_header.write_to(&mut dbuf)?;
        dat.write_at(&dbuf, 0)?;
        dat.sync_all()?;

        let key = NativeFile::create_new(key_path.as_ref())?;
        let key_header = KeyHeader {
            version: CURRENT_VERSION,
            uid,
            appnum,
            key_size,
            salt,
            pepper: pep,
            block_size: block_size as u16,
            load_factor: load_factor_fixed,
        };
        let mut kbuf = Vec::with_capacity(block_size as usize);
        key_header.write_to(&mut kbuf)?;
        kbuf.resize(block_size as usize, 0);
        key.write_at(&kbuf, 0)?;
        let empty_bucket = Bucket::empty().to_block(block_size as usize);
        key.write_at(&empty_bucket, block_size as u64)?;
        key.sync_all()?;

        log::info!(
            "create: key_size={key_size} block_size={block_size} load_factor={load_factor} appnum={appnum}"
        );
        Ok(())
    }

    /// Runs recovery, then opens an existing store and starts its committer thread.
    pub fn open(
        dat_path: impl AsRef<Path>,
        key_path: impl AsRef<Path>,
        log_path: impl AsRef<Path>,
        cache_size_budget: usize,
        commit_limit: u64,
    ) -> Result<Store> {
        let dat_path = dat_path.as_ref();
        let key_path = key_path.as_ref();
        let log_path = log_path.as_ref();

        crate::recover::recover(dat_path, key_path, log_path)?;

        let dat: Arc<dyn RandomAccessFile> = Arc::new(NativeFile::open(dat_path)?);
        let key: Arc<dyn RandomAccessFile> = Arc::new(NativeFile::open(key_path)?);
        let log: Arc<dyn RandomAccessFile> = match NativeFile::open(log_path) {
            Ok(f) => Arc::new(f),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Arc::new(NativeFile::create_new(log_path)?),
            Err(e) => return Err(e.into()),
        };

        Self::open_with_files(dat, key, log, log_path, cache_size_budget, commit_limit)
    }

    /// Opens a store over already-constructed file handles, skipping recovery and the
    /// native-file construction `open` otherwise does. The seam a test harness uses to run the
    /// store over a fault-injecting `RandomAccessFile` while still exercising the real commit
    /// and committer-thread machinery.
    pub fn open_with_files(
        dat: Arc<dyn RandomAccessFile>,
        key: Arc<dyn RandomAccessFile>,
        log: Arc<dyn RandomAccessFile>,
        log_path: impl AsRef<Path>,
        cache_size_budget: usize,
        commit_limit: u64,
    ) -> Result<Store> {
        let log_path = log_path.as_ref();

        let mut dat_buf = vec![0u8; DATA_HEADER_SIZE];
        dat.read_at(&mut dat_buf, 0)?;
        let data_header = DataHeader::read_from(&dat_buf[..])?;

        let mut key_buf = vec![0u8; KEY_HEADER_SIZE];
        key.read_at(&mut key_buf, 0).map_err(|_| Error::ShortKeyFile)?;
        let key_header = KeyHeader::read_from(&key_buf[..])?;
        key_header.verify_against_data(&data_header)?;

        if pepper::<Xxh3Hasher>(key_header.salt) != key_header.pepper {
            return Err(Error::PepperMismatch);
        }

        let block_size = key_header.block_size as u32;
        if (block_size as usize) < KEY_HEADER_SIZE {
            return Err(Error::InvalidBlockSize(block_size));
        }
        let capacity = Bucket::capacity(block_size as usize) as u64;
        if capacity == 0 {
            return Err(Error::InvalidCapacity);
        }

        let key_file_size = key.size()?;
        if key_file_size < block_size as u64 {
            return Err(Error::ShortKeyFile);
        }
        let buckets = ((key_file_size / block_size as u64).saturating_sub(1)).max(1);

        let index = LinearHashIndex::new(buckets, capacity, key_header.load_factor);
        log::info!(
            "open: block_size={block_size} key_size={} buckets={buckets} modulus={}",
            key_header.key_size,
            index.modulus()
        );

        let arena_block_size = (cache_size_budget / 4).max(4096);
        let state = RwLock::new(State {
            p1: Pool::new(arena_block_size),
            p0: Pool::new(arena_block_size),
            c1: Cache::new(arena_block_size),
            index,
            pool_thresh: DEFAULT_POOL_THRESH,
        });

        let inner = Arc::new(Inner {
            dat,
            key,
            log,
            log_path: log_path.to_path_buf(),
            uid: data_header.uid,
            appnum: data_header.appnum,
            key_size: data_header.key_size,
            block_size,
            salt: key_header.salt,
            pepper: key_header.pepper,
            commit_limit,
            cache_arena_block_size: arena_block_size,
            state,
            insert_mutex: Mutex::new(()),
            commit_mutex: Mutex::new(()),
            gentex: Gentex::new(),
            error: Mutex::new(None),
            stop: AtomicBool::new(false),
            committer_ctl: Mutex::new(()),
            committer_cv: Condvar::new(),
            overflow_mutex: Mutex::new(()),
            overflow_cv: Condvar::new(),
        });

        let committer_inner = Arc::clone(&inner);
        let handle = thread::Builder::new()
            .name("nudb-committer".into())
            .spawn(move || Self::run_committer(committer_inner))
            .map_err(io::Error::from)?;

        Ok(Store {
            inner,
            committer: Some(handle),
        })
    }

    /// Signals the committer to stop, joins it, and -- if no background error was latched --
    /// deletes the (now empty) log file. A latched error is surfaced here and leaves the log
    /// file in place, since it may still hold pre-images recovery needs.
    pub fn close(&mut self) -> Result<()> {
        let Some(handle) = self.committer.take() else {
            return Ok(());
        };
        self.inner.stop.store(true, Ordering::SeqCst);
        self.inner.committer_cv.notify_all();
        let _ = handle.join();

        if let Some(e) = self.inner.error.lock().clone() {
            return Err(e);
        }
        crate::file::erase_file(&self.inner.log_path)?;
        Ok(())
    }

    fn hash(&self, key: &[u8]) -> u64 {
        hash_with::<Xxh3Hasher>(self.inner.salt, key)
    }

    fn check_latched_error(&self) -> Result<()> {
        match self.inner.error.lock().as_ref() {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    fn check_key_size(&self, key: &[u8]) -> Result<()> {
        if key.len() != self.inner.key_size as usize {
            return Err(Error::InvalidKeySize(key.len() as u32));
        }
        Ok(())
    }

    fn entry_matches(&self, e: &BucketEntry, key: &[u8]) -> Result<bool> {
        let mut found = vec![0u8; self.inner.key_size as usize];
        self.inner.dat.read_at(&mut found, e.offset + 6)?;
        Ok(found == key)
    }

    fn read_value(&self, e: &BucketEntry) -> Result<Vec<u8>> {
        let mut value = vec![0u8; e.size as usize];
        self.inner
            .dat
            .read_at(&mut value, e.offset + 6 + self.inner.key_size as u64)?;
        Ok(value)
    }

    fn search_chain(&self, head_body: &[u8], h: u64, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let mut bucket = Bucket::from_block(head_body, self.inner.block_size as usize)?;
        loop {
            let mut i = bucket.lower_bound(h);
            while i < bucket.len() && bucket.get(i).hash == h {
                let e = *bucket.get(i);
                if self.entry_matches(&e, key)? {
                    return Ok(Some(self.read_value(&e)?));
                }
                i += 1;
            }
            if bucket.spill() == 0 {
                return Ok(None);
            }
            bucket = Bucket::read_spill_at(self.inner.dat.as_ref(), bucket.spill(), self.inner.block_size as usize)?;
        }
    }

    /// Looks up `key` and invokes `on_value` with the matching bytes. Returns
    /// `Err(Error::KeyNotFound)` if no entry matches.
    pub fn fetch<F: FnOnce(&[u8])>(&self, key: &[u8], on_value: F) -> Result<()> {
        self.check_latched_error()?;
        self.check_key_size(key)?;
        let h = self.hash(key);

        enum Found {
            Value(Vec<u8>),
            Bucket(Vec<u8>),
        }

        let found = {
            let state = self.inner.state.read();
            if let Some((_, v)) = state.p1.find(key) {
                Found::Value(v.to_vec())
            } else if let Some((_, v)) = state.p0.find(key) {
                Found::Value(v.to_vec())
            } else {
                let n = state.index.bucket_index(h);
                if let Some(body) = state.c1.find(n) {
                    Found::Bucket(body.to_vec())
                } else {
                    let _token = self.inner.gentex.enter();
                    drop(state);
                    let mut buf = vec![0u8; self.inner.block_size as usize];
                    self.inner.key.read_at(&mut buf, (n + 1) * self.inner.block_size as u64)?;
                    Found::Bucket(buf)
                }
            }
        };

        let value = match found {
            Found::Value(v) => Some(v),
            Found::Bucket(body) => self.search_chain(&body, h, key)?,
        };

        match value {
            Some(v) => {
                on_value(&v);
                Ok(())
            }
            None => Err(Error::KeyNotFound),
        }
    }

    /// Inserts `key` with `value`. Returns `Err(Error::KeyExists)` if the key is already
    /// present; inserts never overwrite.
    pub fn insert(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.check_latched_error()?;
        self.check_key_size(key)?;
        if value.is_empty() {
            return Err(Error::ZeroSizeValue);
        }
        if value.len() as u64 > u32::MAX as u64 {
            return Err(Error::OversizeValue(value.len() as u64));
        }

        let _serialize = self.inner.insert_mutex.lock();
        let h = self.hash(key);

        enum Existing {
            None,
            Body(Vec<u8>),
        }

        let existing = {
            let state = self.inner.state.read();
            if state.p1.contains(key) || state.p0.contains(key) {
                return Err(Error::KeyExists);
            }
            let n = state.index.bucket_index(h);
            if let Some(body) = state.c1.find(n) {
                Existing::Body(body.to_vec())
            } else {
                let _token = self.inner.gentex.enter();
                drop(state);
                let key_file_size = self.inner.key.size()?;
                if (n + 2) * self.inner.block_size as u64 <= key_file_size {
                    let mut buf = vec![0u8; self.inner.block_size as usize];
                    self.inner.key.read_at(&mut buf, (n + 1) * self.inner.block_size as u64)?;
                    Existing::Body(buf)
                } else {
                    Existing::None
                }
            }
        };

        if let Existing::Body(body) = existing {
            if self.search_chain(&body, h, key)?.is_some() {
                return Err(Error::KeyExists);
            }
        }

        let (data_size, pool_thresh) = {
            let mut state = self.inner.state.write();
            state.p1.insert(h, key, value);
            (state.p1.data_size(), state.pool_thresh)
        };

        if data_size >= self.inner.commit_limit {
            self.wake_committer();
            self.wait_for_drain();
        } else if data_size >= pool_thresh {
            self.wake_committer();
        }

        Ok(())
    }

    /// Forces an out-of-band commit, for callers (such as [`crate::context::Context`]) that
    /// drive flushing cooperatively instead of relying on the store's own background thread.
    pub fn flush(&self) -> Result<()> {
        self.check_latched_error()?;
        match Self::commit_once(&self.inner) {
            Ok(_) => Ok(()),
            Err(e) => {
                *self.inner.error.lock() = Some(e.clone());
                Err(e)
            }
        }
    }

    fn wake_committer(&self) {
        let _guard = self.inner.committer_ctl.lock();
        self.inner.committer_cv.notify_all();
    }

    fn wait_for_drain(&self) {
        let mut guard = self.inner.overflow_mutex.lock();
        loop {
            if self.inner.state.read().p1.data_size() < self.inner.commit_limit {
                return;
            }
            if self.inner.error.lock().is_some() {
                return;
            }
            self.inner
                .overflow_cv
                .wait_for(&mut guard, Duration::from_millis(50));
        }
    }

    fn run_committer(inner: Arc<Inner>) {
        loop {
            let timed_out = {
                let mut ctl = inner.committer_ctl.lock();
                if inner.stop.load(Ordering::SeqCst) {
                    false
                } else {
                    inner
                        .committer_cv
                        .wait_for(&mut ctl, Duration::from_secs(1))
                        .timed_out()
                }
            };

            match Self::commit_once(&inner) {
                Ok(true) => {
                    inner.overflow_cv.notify_all();
                }
                Ok(false) => {
                    if timed_out {
                        Self::reclaim(&inner);
                    }
                }
                Err(e) => {
                    log::error!("commit failed, latching error: {e}");
                    *inner.error.lock() = Some(e);
                    inner.overflow_cv.notify_all();
                    break;
                }
            }

            if inner.stop.load(Ordering::SeqCst) {
                break;
            }
        }
    }

    fn reclaim(inner: &Inner) {
        let mut state = inner.state.write();
        state.pool_thresh = (state.pool_thresh / 2).max(1);
        state.p1.shrink_to_fit();
        state.p0.shrink_to_fit();
        state.c1.shrink_to_fit();
        state.p1.periodic_activity();
        state.p0.periodic_activity();
        state.c1.periodic_activity();
    }

    fn load_for_mutation(
        inner: &Inner,
        n: u64,
        original_buckets: u64,
        built_c1: &mut Cache,
        c0: &mut Cache,
    ) -> Result<Bucket> {
        if let Some(bytes) = built_c1.find(n) {
            return Bucket::from_block(bytes, inner.block_size as usize);
        }
        if n < original_buckets {
            let mut buf = vec![0u8; inner.block_size as usize];
            inner.key.read_at(&mut buf, (n + 1) * inner.block_size as u64)?;
            c0.insert(n, &buf);
            built_c1.insert(n, &buf);
            Bucket::from_block(&buf, inner.block_size as usize)
        } else {
            built_c1.create(n, inner.block_size as usize);
            Ok(Bucket::empty())
        }
    }

    fn perform_split(
        inner: &Inner,
        n1: u64,
        n2: u64,
        original_buckets: u64,
        built_c1: &mut Cache,
        c0: &mut Cache,
        writer: &mut BulkWriter,
        new_buckets: u64,
        new_modulus: u64,
    ) -> Result<()> {
        writer.flush()?;
        let head = Self::load_for_mutation(inner, n1, original_buckets, built_c1, c0)?;
        built_c1.create(n2, inner.block_size as usize);

        let mut all_entries: Vec<BucketEntry> = head.entries().to_vec();
        let mut spill = head.spill();
        while spill != 0 {
            writer.flush()?;
            let body = Bucket::read_spill_at(inner.dat.as_ref(), spill, inner.block_size as usize)?;
            all_entries.extend_from_slice(body.entries());
            spill = body.spill();
        }

        let mut new_b1 = Bucket::empty();
        let mut new_b2 = Bucket::empty();
        for e in all_entries {
            let dest = bucket_index(e.hash, new_buckets, new_modulus);
            let target = if dest == n1 { &mut new_b1 } else { &mut new_b2 };
            if target.is_full(inner.block_size as usize) {
                target.maybe_spill(inner.block_size as usize, writer)?;
            }
            target.insert(e.offset, e.size, e.hash);
        }

        built_c1.insert(n1, &new_b1.to_block(inner.block_size as usize));
        built_c1.insert(n2, &new_b2.to_block(inner.block_size as usize));
        Ok(())
    }

    /// Runs one commit cycle. Returns `Ok(false)` if there was nothing pending.
    fn commit_once(inner: &Inner) -> Result<bool> {
        let _serialize = inner.commit_mutex.lock();

        let (mut built_c1, original_buckets, mut index) = {
            let mut state = inner.state.write();
            if state.p1.is_empty() {
                return Ok(false);
            }
            let State { ref mut p1, ref mut p0, .. } = *state;
            std::mem::swap(p1, p0);
            state.pool_thresh = state.pool_thresh.max(state.p0.data_size());
            let mut built_c1 = std::mem::replace(&mut state.c1, Cache::new(inner.cache_arena_block_size));
            built_c1.clear();
            (built_c1, state.index.buckets(), state.index)
        };

        let entries: Vec<(u64, Vec<u8>, Vec<u8>)> = {
            let state = inner.state.read();
            state.p0.iter().map(|(h, k, v)| (h, k.to_vec(), v.to_vec())).collect()
        };

        // Step 1: log header, fsync -- this is the commit point.
        let pre_key_size = inner.key.size()?;
        let pre_dat_size = inner.dat.size()?;
        let log_header = LogHeader {
            version: CURRENT_VERSION,
            uid: inner.uid,
            appnum: inner.appnum,
            key_size: inner.key_size,
            salt: inner.salt,
            pepper: inner.pepper,
            block_size: inner.block_size as u16,
            key_file_size: pre_key_size,
            dat_file_size: pre_dat_size,
        };
        let mut header_buf = Vec::with_capacity(LOG_HEADER_SIZE);
        log_header.write_to(&mut header_buf)?;
        inner.log.write_at(&header_buf, 0)?;
        inner.log.sync_all()?;

        // Step 2: append values and splits to the data file.
        let mut writer = BulkWriter::new(Arc::clone(&inner.dat), pre_dat_size);
        let mut offsets = Vec::with_capacity(entries.len());
        for (_, key, value) in &entries {
            offsets.push(writer.offset());
            let mut rec = Vec::with_capacity(6 + key.len() + value.len());
            write_u48(&mut rec, value.len() as u64).expect("checked non-oversize in insert()");
            rec.extend_from_slice(key);
            rec.extend_from_slice(value);
            writer.write(&rec);
        }

        let mut c0 = Cache::new(inner.cache_arena_block_size);
        let mut splits = 0u64;
        for (i, (hash, _, value)) in entries.iter().enumerate() {
            if index.tick() {
                let (n1, n2) = index.begin_split();
                Self::perform_split(
                    inner,
                    n1,
                    n2,
                    original_buckets,
                    &mut built_c1,
                    &mut c0,
                    &mut writer,
                    index.buckets(),
                    index.modulus(),
                )?;
                splits += 1;
            }
            let n = index.bucket_index(*hash);
            let mut bucket = Self::load_for_mutation(inner, n, original_buckets, &mut built_c1, &mut c0)?;
            if bucket.is_full(inner.block_size as usize) {
                bucket.maybe_spill(inner.block_size as usize, &mut writer)?;
            }
            bucket.insert(offsets[i], value.len() as u32, *hash);
            built_c1.insert(n, &bucket.to_block(inner.block_size as usize));
        }
        writer.flush()?;
        let appended = writer.offset() - pre_dat_size;

        // Step 3: publish the new generation.
        let started = {
            let mut state = inner.state.write();
            state.c1 = built_c1;
            state.p0.clear();
            state.index = index;
            inner.gentex.start()
        };

        // Step 4: write bucket pre-images to the log, fsync, then wait out old readers.
        let mut log_writer = BulkWriter::new(Arc::clone(&inner.log), LOG_HEADER_SIZE as u64);
        for (n, body) in c0.iter() {
            let mut rec = Vec::with_capacity(8 + 2 + body.len());
            write_u64(&mut rec, n)?;
            write_u16(&mut rec, body.len() as u16)?;
            rec.extend_from_slice(body);
            log_writer.write(&rec);
        }
        log_writer.flush()?;
        drop(c0);
        inner.log.sync_all()?;
        inner.gentex.finish(started);

        // Step 5: write the new buckets to the key file; fsync data, then key.
        {
            let state = inner.state.read();
            for (n, body) in state.c1.iter() {
                inner.key.write_at(body, (n + 1) * inner.block_size as u64)?;
            }
        }
        inner.dat.sync_all()?;
        inner.key.sync_all()?;

        // Step 6: truncate the log; it is durable once this fsync completes.
        inner.log.set_len(0)?;
        inner.log.sync_all()?;

        // Step 7: drop the bucket cache; fetches resume reading the key file directly.
        {
            let mut state = inner.state.write();
            state.c1.clear();
        }

        log::debug!(
            "commit: {} items flushed, {splits} splits, {appended} bytes appended",
            entries.len()
        );
        Ok(true)
    }

    pub fn key_size(&self) -> u16 {
        self.inner.key_size
    }

    pub fn block_size(&self) -> u32 {
        self.inner.block_size
    }

    pub(crate) fn dat_file(&self) -> &Arc<dyn RandomAccessFile> {
        &self.inner.dat
    }

    pub(crate) fn key_file(&self) -> &Arc<dyn RandomAccessFile> {
        &self.inner.key
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        if self.committer.is_some() {
            let _ = self.close();
        }
    }
}
