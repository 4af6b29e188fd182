mod common;

use common::store_paths;
use nudb_native::{Error, OpenOptions};

#[test]
fn second_insert_of_a_key_is_rejected_and_the_first_value_survives() {
    let paths = store_paths("duplicate");
    let store = OpenOptions::new()
        .create()
        .key_size(2)
        .open(&paths.dat, &paths.key, &paths.log)
        .unwrap();

    let key = 0x1234u16.to_be_bytes();
    store.insert(&key, b"abc").unwrap();

    match store.insert(&key, b"zzzzz") {
        Err(Error::KeyExists) => {}
        other => panic!("expected KeyExists, got {other:?}"),
    }

    store.fetch(&key, |value| assert_eq!(value, b"abc")).unwrap();
}

#[test]
fn duplicate_rejection_holds_across_a_flush() {
    let paths = store_paths("duplicate_flush");
    let store = OpenOptions::new()
        .create()
        .key_size(2)
        .open(&paths.dat, &paths.key, &paths.log)
        .unwrap();

    let key = 7u16.to_be_bytes();
    store.insert(&key, b"first").unwrap();
    store.flush().unwrap();

    match store.insert(&key, b"second") {
        Err(Error::KeyExists) => {}
        other => panic!("expected KeyExists after flush, got {other:?}"),
    }
    store.fetch(&key, |value| assert_eq!(value, b"first")).unwrap();
}

#[test]
fn zero_and_oversize_values_are_rejected_before_touching_the_index() {
    let paths = store_paths("duplicate_edge");
    let store = OpenOptions::new()
        .create()
        .key_size(4)
        .open(&paths.dat, &paths.key, &paths.log)
        .unwrap();

    assert!(matches!(store.insert(b"abcd", b""), Err(Error::ZeroSizeValue)));
    assert!(matches!(
        store.fetch(b"abcd", |_| {}),
        Err(Error::KeyNotFound)
    ));
}
