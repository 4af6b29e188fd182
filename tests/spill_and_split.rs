mod common;

use common::{store_paths, XorShift64};
use nudb_native::{verify, OpenOptions};

#[test]
fn heavy_insertion_forces_spills_and_splits_without_losing_anything() {
    const N: u64 = 4000;
    let paths = store_paths("spill");

    let mut store = OpenOptions::new()
        .create()
        .key_size(8)
        .block_size(256) // small block -> few entries per bucket -> frequent spills
        .load_factor(0.95)
        .open(&paths.dat, &paths.key, &paths.log)
        .unwrap();

    let mut rng = XorShift64::new(1);
    let mut inserted = Vec::with_capacity(N as usize);
    for _ in 0..N {
        let key = rng.next();
        let size = 4 + (rng.next() % 64) as usize;
        let value: Vec<u8> = (0..size).map(|_| (rng.next() & 0xff) as u8).collect();
        // xorshift never repeats within a short run from a fixed seed, but guard anyway.
        if store.insert(&key.to_be_bytes(), &value).is_ok() {
            inserted.push((key, value));
        }
    }
    store.flush().unwrap();
    store.close().unwrap();

    let report = verify(&paths.dat, &paths.key).unwrap();
    assert_eq!(report.value_count, inserted.len() as u64);
    assert!(
        report.spill_histogram.len() > 1,
        "expected at least one bucket with a non-trivial spill chain, got histogram {:?}",
        report.spill_histogram
    );

    let reopened = OpenOptions::new().open(&paths.dat, &paths.key, &paths.log).unwrap();
    for (key, value) in &inserted {
        reopened
            .fetch(&key.to_be_bytes(), |found| assert_eq!(found, value.as_slice()))
            .unwrap();
    }
}
