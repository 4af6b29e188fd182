//
// gentex.rs -- generation latch
//
// This file is part of the nudb-native project.
// SPDX-License-Identifier: MIT

//! A lightweight alternative to RCU for the single-writer case (spec §9). Fetches that have to
//! drop the reader-writer lock to read a bucket body straight off disk grab a token first; the
//! committer bumps the generation at its publish point and then waits for every token issued
//! under the previous generation to be released before it overwrites the key file in place.
//! Because there is exactly one writer (the committer thread), the counter itself needs no
//! locking beyond what `Mutex`+`Condvar` already give the wait/notify path.

use std::collections::HashMap;

use parking_lot::{Condvar, Mutex};

struct Inner {
    current: u64,
    /// outstanding token count per generation; a generation is retired once its count hits zero
    /// and it is no longer the current generation.
    outstanding: HashMap<u64, u64>,
}

pub struct Gentex {
    inner: Mutex<Inner>,
    retired: Condvar,
}

/// An outstanding reference to a generation. Dropping it releases the reference; holders must
/// not retain a token across a blocking wait on anything the committer might itself wait on.
pub struct GenToken<'a> {
    gentex: &'a Gentex,
    gen: u64,
}

impl Drop for GenToken<'_> {
    fn drop(&mut self) {
        let mut inner = self.gentex.inner.lock();
        if let Some(count) = inner.outstanding.get_mut(&self.gen) {
            *count -= 1;
            if *count == 0 && self.gen != inner.current {
                inner.outstanding.remove(&self.gen);
                drop(inner);
                self.gentex.retired.notify_all();
            }
        }
    }
}

impl Default for Gentex {
    fn default() -> Self {
        Self::new()
    }
}

impl Gentex {
    pub fn new() -> Self {
        Gentex {
            inner: Mutex::new(Inner {
                current: 0,
                outstanding: HashMap::new(),
            }),
            retired: Condvar::new(),
        }
    }

    /// Takes a token tagged with the current generation.
    pub fn enter(&self) -> GenToken<'_> {
        let mut inner = self.inner.lock();
        let gen = inner.current;
        *inner.outstanding.entry(gen).or_insert(0) += 1;
        GenToken { gentex: self, gen }
    }

    /// Publishes a new generation. Callers holding tokens from the prior generation keep them
    /// valid until they drop; `finish()` waits for all of them to do so.
    pub fn start(&self) -> u64 {
        let mut inner = self.inner.lock();
        inner.current += 1;
        inner.current
    }

    /// Blocks until every token issued under a generation older than `started` has been
    /// released.
    pub fn finish(&self, started: u64) {
        let mut inner = self.inner.lock();
        loop {
            let stale = inner
                .outstanding
                .iter()
                .any(|(&gen, &count)| gen < started && count > 0);
            if !stale {
                inner.outstanding.retain(|&gen, _| gen >= started);
                return;
            }
            self.retired.wait(&mut inner);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn finish_waits_for_outstanding_tokens() {
        let gentex = Arc::new(Gentex::new());
        let token = gentex.enter();

        let g2 = Arc::clone(&gentex);
        let handle = thread::spawn(move || {
            let started = g2.start();
            g2.finish(started);
        });

        thread::sleep(Duration::from_millis(50));
        assert!(!handle.is_finished());
        drop(token);
        handle.join().unwrap();
    }

    #[test]
    fn finish_returns_immediately_with_no_readers() {
        let gentex = Gentex::new();
        let started = gentex.start();
        gentex.finish(started);
    }
}
