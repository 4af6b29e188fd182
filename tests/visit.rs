mod common;

use std::collections::HashMap;

use common::{store_paths, XorShift64};
use nudb_native::{visit, OpenOptions};

#[test]
fn visit_sees_every_inserted_value_exactly_once() {
    const N: u64 = 5000;
    let paths = store_paths("visit");

    let mut expected: HashMap<u64, Vec<u8>> = HashMap::with_capacity(N as usize);
    {
        let mut store = OpenOptions::new()
            .create()
            .key_size(8)
            .open(&paths.dat, &paths.key, &paths.log)
            .unwrap();

        let mut rng = XorShift64::new(99);
        for i in 0..N {
            let size = 1 + (rng.next() % 200) as usize;
            let value: Vec<u8> = (0..size).map(|_| (rng.next() & 0xff) as u8).collect();
            store.insert(&i.to_be_bytes(), &value).unwrap();
            expected.insert(i, value);
        }
        store.flush().unwrap();
        store.close().unwrap();
    }

    let mut seen = 0u64;
    visit(&paths.dat, |key, value| {
        seen += 1;
        let k = u64::from_be_bytes(key.try_into().expect("8-byte key"));
        let want = expected.get(&k).expect("visited key was actually inserted");
        assert_eq!(value, want.as_slice());
    })
    .unwrap();

    assert_eq!(seen, N);
}
