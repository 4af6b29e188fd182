mod common;

use common::{store_paths, XorShift64};
use nudb_native::{rekey, verify, OpenOptions};

#[test]
fn rekey_reconstructs_a_deleted_key_file_and_verify_agrees() {
    const N: u64 = 500;
    let paths = store_paths("rekey_int");

    {
        let mut store = OpenOptions::new()
            .create()
            .key_size(8)
            .load_factor(0.5)
            .open(&paths.dat, &paths.key, &paths.log)
            .unwrap();

        let mut rng = XorShift64::new(7);
        for i in 0..N {
            let size = 1 + (rng.next() % 32) as usize;
            let value: Vec<u8> = (0..size).map(|_| (rng.next() & 0xff) as u8).collect();
            store.insert(&i.to_be_bytes(), &value).unwrap();
        }
        store.flush().unwrap();
        store.close().unwrap();
    }

    std::fs::remove_file(&paths.key).unwrap();

    let mut progress_calls = 0u32;
    rekey(&paths.dat, &paths.key, N, 256 * 1024, 0.5, 0, |_done, _total| {
        progress_calls += 1;
    })
    .unwrap();
    assert!(progress_calls > 0, "rekey should report progress at least once");

    let report = verify(&paths.dat, &paths.key).unwrap();
    assert_eq!(report.value_count, N);

    let store = OpenOptions::new().open(&paths.dat, &paths.key, &paths.log).unwrap();
    for i in (0..N).step_by(37) {
        assert!(store.fetch(&i.to_be_bytes(), |_| {}).is_ok(), "key {i} missing after rekey");
    }
}
