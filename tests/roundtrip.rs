mod common;

use common::store_paths;
use nudb_native::OpenOptions;

#[test]
fn round_trip_survives_a_close_and_reopen() {
    const N: u64 = 1000;
    let paths = store_paths("roundtrip");

    OpenOptions::new()
        .create()
        .key_size(8)
        .block_size(4096)
        .load_factor(0.5)
        .salt(42)
        .appnum(1337)
        .open(&paths.dat, &paths.key, &paths.log)
        .and_then(|mut store| {
            (0..N).try_for_each(|i| store.insert(&i.to_le_bytes(), &[0u8]))?;
            store.flush()?;
            store.close()
        })
        .map_err(|e| format!("populating store: {e}"))
        .unwrap();

    let store = OpenOptions::new()
        .open(&paths.dat, &paths.key, &paths.log)
        .map_err(|e| format!("reopening store: {e}"))
        .unwrap();

    (0..N)
        .try_for_each(|i| {
            store.fetch(&i.to_le_bytes(), |value| {
                assert_eq!(value, &[0u8]);
            })
        })
        .map_err(|e| format!("fetching after reopen: {e}"))
        .unwrap();
}

#[test]
fn missing_key_is_reported_without_touching_present_ones() {
    let paths = store_paths("roundtrip_miss");
    let mut store = OpenOptions::new()
        .create()
        .key_size(4)
        .open(&paths.dat, &paths.key, &paths.log)
        .unwrap();

    store.insert(b"abcd", b"present").unwrap();
    store.flush().unwrap();

    assert!(store.fetch(b"abcd", |_| {}).is_ok());
    assert!(matches!(
        store.fetch(b"zzzz", |_| {}),
        Err(nudb_native::Error::KeyNotFound)
    ));
}
