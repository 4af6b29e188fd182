//
// lib.rs -- nudb-native core library API routines
//
// This file is part of the nudb-native project.
// SPDX-License-Identifier: MIT

//! A Rust-native, append-only key/value store: values and keys are only ever appended to a
//! data file, a separate linear-hashed key file maps hashes to value offsets, and a log file
//! makes every commit crash-safe by recording enough of a pre-image to roll back an
//! interrupted one. Inserts never overwrite -- the design favors write-once logs, snapshots,
//! and content-addressed blobs over general-purpose key/value workloads that mutate in place.
//!
//! # Examples
//! ```
//! use nudb_native::OpenOptions;
//!
//! # use tempfile::tempdir;
//! # fn main() -> Result<(), String> {
//! #     let dir = tempdir().map_err(|e| e.to_string())?;
//! #     let dat = dir.path().join("demo.dat");
//! #     let key = dir.path().join("demo.key");
//! #     let log = dir.path().join("demo.log");
//! #     || -> nudb_native::Result<()> {
//! let mut store = OpenOptions::new()
//!     .create()
//!     .key_size(8)
//!     .open(&dat, &key, &log)?;
//!
//! let k = b"user-42\0".to_vec();
//! store.insert(&k, b"alice@example.com")?;
//! store.fetch(&k, |value| assert_eq!(value, b"alice@example.com"))?;
//! #         Ok(())
//! #     }().map_err(|e| e.to_string())
//! # }
//! ```

mod arena;
mod bucket;
mod bulkio;
mod cache;
mod context;
mod error;
mod file;
mod gentex;
mod hashutil;
mod header;
mod index;
mod options;
mod pool;
mod recover;
mod rekey;
mod ser;
mod store;
mod verify;

pub use context::{Context, Registration};
pub use error::{Error, Result};
pub use file::{NativeFile, RandomAccessFile};
pub use options::{Create, NotCreate, OpenOptions};
pub use rekey::rekey;
pub use store::Store;
pub use verify::{verify, visit, Report};
