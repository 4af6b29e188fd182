//
// context.rs -- optional cooperative flush scheduler shared by many stores
//
// This file is part of the nudb-native project.
// SPDX-License-Identifier: MIT

//! A store is fully usable with no `Context` at all -- it already owns its own committer
//! thread. A `Context` exists for the case where an application opens many stores and would
//! rather amortize the background work over a small worker pool than pay one thread per store.
//! Each registered store is visited roughly once per second and asked to `flush()`; unlike the
//! full multi-worker rendezvous the wire format describes (`waiting -> flushing -> intermediate
//! -> waiting`, with `erase` rendezvousing against an in-flight flush), this keeps one worker
//! thread walking the registration list in order, which is enough to amortize flushing without
//! the bookkeeping a multi-worker handoff needs.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;

use crate::store::Store;

trait Flushable: Send + Sync {
    fn flush(&self) -> crate::error::Result<()>;
}

impl Flushable for Store {
    fn flush(&self) -> crate::error::Result<()> {
        Store::flush(self)
    }
}

/// A handle returned by [`Context::register`]. Dropping it unregisters the store; there is no
/// separate `erase` call to rendezvous against because the worker only ever touches the list
/// between sweeps, not mid-store.
pub struct Registration {
    context: Arc<Shared>,
    id: u64,
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.context.members.lock().retain(|(id, _)| *id != self.id);
    }
}

struct Shared {
    members: Mutex<Vec<(u64, Weak<dyn Flushable>)>>,
    next_id: Mutex<u64>,
    stop: AtomicBool,
}

/// A worker pool that periodically flushes every store registered with it.
pub struct Context {
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
}

impl Context {
    pub fn new() -> Self {
        let shared = Arc::new(Shared {
            members: Mutex::new(Vec::new()),
            next_id: Mutex::new(0),
            stop: AtomicBool::new(false),
        });
        let worker_shared = Arc::clone(&shared);
        let worker = thread::Builder::new()
            .name("nudb-context".into())
            .spawn(move || Self::run(worker_shared))
            .expect("spawning the context worker thread");
        Context {
            shared,
            worker: Some(worker),
        }
    }

    /// Registers `store` for periodic flushing. The store is only held weakly: once every
    /// `Arc<Store>` and the returned `Registration` are dropped, it drops out of the sweep.
    pub fn register(&self, store: &Arc<Store>) -> Registration {
        let mut next_id = self.shared.next_id.lock();
        let id = *next_id;
        *next_id += 1;
        drop(next_id);

        let store_dyn: Arc<dyn Flushable> = Arc::clone(store) as Arc<dyn Flushable>;
        let weak: Weak<dyn Flushable> = Arc::downgrade(&store_dyn);
        self.shared.members.lock().push((id, weak));
        Registration {
            context: Arc::clone(&self.shared),
            id,
        }
    }

    fn run(shared: Arc<Shared>) {
        while !shared.stop.load(Ordering::SeqCst) {
            thread::sleep(Duration::from_secs(1));
            let snapshot: Vec<Weak<dyn Flushable>> =
                shared.members.lock().iter().map(|(_, w)| w.clone()).collect();
            for weak in snapshot {
                if let Some(store) = weak.upgrade() {
                    if let Err(e) = store.flush() {
                        log::warn!("context: flush failed for a registered store: {e}");
                    }
                }
            }
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        self.shared.stop.store(true, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::OpenOptions;
    use std::sync::Arc;

    #[test]
    fn registration_drop_unregisters() {
        let dir = tempfile::tempdir().unwrap();
        let dat_path = dir.path().join("c.dat");
        let key_path = dir.path().join("c.key");
        let log_path = dir.path().join("c.log");

        let store = Arc::new(
            OpenOptions::new()
                .create()
                .key_size(4)
                .open(&dat_path, &key_path, &log_path)
                .unwrap(),
        );
        let ctx = Context::new();
        let reg = ctx.register(&store);
        assert_eq!(ctx.shared.members.lock().len(), 1);
        drop(reg);
        assert_eq!(ctx.shared.members.lock().len(), 0);
    }
}
