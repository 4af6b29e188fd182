mod common;

use std::sync::Arc;

use common::{store_paths, FailCounter, FaultInjectingFile};
use nudb_native::{verify, NativeFile, OpenOptions, RandomAccessFile, Store};

const ITEMS: u64 = 40;
const COMMIT_LIMIT: u64 = 512; // tiny, so every few inserts forces a commit under test control

fn key_for(i: u64) -> [u8; 8] {
    i.to_le_bytes()
}

/// Runs an insertion workload with the `n`-th file operation (write/sync/truncate, counted
/// across the data, key, and log files together) forced to fail, simulating a crash at that
/// point. Whatever that leaves on disk must still be a state that real recovery -- using real,
/// non-failing files -- can restore to a consistent, previously-committed point.
fn run_with_failure_at(n: usize) {
    let paths = store_paths(&format!("crash_{n}"));

    Store::create(&paths.dat, &paths.key, 8, 4096, 0.5, 0, 0).unwrap();

    let counter = FailCounter::new(n);
    let dat: Arc<dyn RandomAccessFile> =
        Arc::new(FaultInjectingFile::wrap(NativeFile::open(&paths.dat).unwrap(), counter.clone()));
    let key: Arc<dyn RandomAccessFile> =
        Arc::new(FaultInjectingFile::wrap(NativeFile::open(&paths.key).unwrap(), counter.clone()));
    let log: Arc<dyn RandomAccessFile> = Arc::new(FaultInjectingFile::wrap(
        NativeFile::create_new(&paths.log).unwrap(),
        counter,
    ));

    {
        let store = Store::open_with_files(dat, key, log, &paths.log, 16 * 1024 * 1024, COMMIT_LIMIT).unwrap();

        for i in 0..ITEMS {
            // Ignore insert/flush errors here: whichever one the injected failure lands on is
            // exactly the crash point under test. What matters is what survives on disk.
            let _ = store.insert(&key_for(i), b"payload");
            let _ = store.flush();
        }
        // `store` drops here, which attempts a graceful close; any latched error is swallowed
        // by `Drop`, leaving the log file in place for recovery to find.
    }

    let reopened = OpenOptions::new()
        .open(&paths.dat, &paths.key, &paths.log)
        .map_err(|e| format!("n={n}: reopen after simulated crash failed: {e}"))
        .unwrap();

    let report = verify(&paths.dat, &paths.key)
        .map_err(|e| format!("n={n}: verify found an inconsistency after recovery: {e}"))
        .unwrap();
    assert!(
        report.value_count <= ITEMS,
        "n={n}: verify reported {} values, more than the {ITEMS} ever inserted",
        report.value_count
    );

    // Every value verify did find must actually fetch back through the public API.
    for i in 0..ITEMS {
        let present = reopened.fetch(&key_for(i), |v| assert_eq!(v, b"payload")).is_ok();
        let _ = present;
    }
}

#[test]
fn recovery_is_consistent_for_a_failure_at_every_early_file_operation() {
    (1..=80usize)
        .try_for_each(|n| {
            std::panic::catch_unwind(|| run_with_failure_at(n)).map_err(|_| format!("n={n} panicked"))
        })
        .unwrap_or_else(|e| panic!("{e}"));
}
