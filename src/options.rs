//
// options.rs -- typestate builder for opening or creating a store
//
// This file is part of the nudb-native project.
// SPDX-License-Identifier: MIT

//! A `Create` state carries the fields that only matter when a new database is being laid
//! down (key size, block size, load factor, salt, appnum); a `NotCreate` state carries none of
//! them. Both share the fields meaningful either way: the cache size budget and an optional
//! override of the pool commit limit.

use std::path::Path;

use crate::error::{Error, Result};
use crate::store::Store;

pub const DEFAULT_KEY_SIZE: u16 = 8;
pub const DEFAULT_BLOCK_SIZE: u32 = 4096;
pub const DEFAULT_LOAD_FACTOR: f64 = 0.5;
pub const DEFAULT_COMMIT_LIMIT: u64 = 1024 * 1024 * 1024; // 1 GiB

#[derive(Copy, Clone, Debug)]
pub struct Create {
    pub key_size: u16,
    pub block_size: u32,
    pub load_factor: f64,
    pub salt: u64,
    pub appnum: u64,
}

impl Default for Create {
    fn default() -> Self {
        Create {
            key_size: DEFAULT_KEY_SIZE,
            block_size: DEFAULT_BLOCK_SIZE,
            load_factor: DEFAULT_LOAD_FACTOR,
            salt: 0,
            appnum: 0,
        }
    }
}

#[derive(Copy, Clone, Debug, Default)]
pub struct NotCreate;

#[derive(Copy, Clone, Debug)]
pub struct OpenOptions<C> {
    pub cache_size_budget: usize,
    pub commit_limit: u64,
    pub create: C,
}

impl Default for OpenOptions<NotCreate> {
    fn default() -> Self {
        OpenOptions {
            cache_size_budget: 16 * 1024 * 1024,
            commit_limit: DEFAULT_COMMIT_LIMIT,
            create: NotCreate,
        }
    }
}

impl OpenOptions<NotCreate> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(self) -> OpenOptions<Create> {
        OpenOptions {
            cache_size_budget: self.cache_size_budget,
            commit_limit: self.commit_limit,
            create: Create::default(),
        }
    }
}

impl<C> OpenOptions<C> {
    pub fn cache_size_budget(self, bytes: usize) -> OpenOptions<C> {
        OpenOptions {
            cache_size_budget: bytes,
            ..self
        }
    }

    pub fn commit_limit(self, bytes: u64) -> OpenOptions<C> {
        OpenOptions {
            commit_limit: bytes,
            ..self
        }
    }
}

impl OpenOptions<Create> {
    pub fn key_size(self, key_size: u16) -> OpenOptions<Create> {
        OpenOptions {
            create: Create {
                key_size,
                ..self.create
            },
            ..self
        }
    }

    pub fn block_size(self, block_size: u32) -> OpenOptions<Create> {
        OpenOptions {
            create: Create {
                block_size,
                ..self.create
            },
            ..self
        }
    }

    pub fn load_factor(self, load_factor: f64) -> OpenOptions<Create> {
        OpenOptions {
            create: Create {
                load_factor,
                ..self.create
            },
            ..self
        }
    }

    pub fn salt(self, salt: u64) -> OpenOptions<Create> {
        OpenOptions {
            create: Create {
                salt,
                ..self.create
            },
            ..self
        }
    }

    pub fn appnum(self, appnum: u64) -> OpenOptions<Create> {
        OpenOptions {
            create: Create {
                appnum,
                ..self.create
            },
            ..self
        }
    }
}

impl OpenOptions<NotCreate> {
    /// Opens an existing store. Fails with `Error::Io` (not found) if the files are absent --
    /// use `.create()` to allow creating them.
    pub fn open(
        &self,
        dat_path: impl AsRef<Path>,
        key_path: impl AsRef<Path>,
        log_path: impl AsRef<Path>,
    ) -> Result<Store> {
        Store::open(dat_path, key_path, log_path, self.cache_size_budget, self.commit_limit)
    }
}

impl OpenOptions<Create> {
    /// Opens the store at the given paths, creating it with this builder's settings if the
    /// files don't yet exist.
    pub fn open(
        &self,
        dat_path: impl AsRef<Path>,
        key_path: impl AsRef<Path>,
        log_path: impl AsRef<Path>,
    ) -> Result<Store> {
        let dat_path = dat_path.as_ref();
        let key_path = key_path.as_ref();
        let log_path = log_path.as_ref();

        if !dat_path.exists() && !key_path.exists() {
            if !(self.create.load_factor > 0.0 && self.create.load_factor < 1.0) {
                return Err(Error::InvalidLoadFactor(self.create.load_factor));
            }
            if self.create.key_size == 0 {
                return Err(Error::InvalidKeySize(self.create.key_size as u32));
            }
            Store::create(
                dat_path,
                key_path,
                self.create.key_size,
                self.create.block_size,
                self.create.load_factor,
                self.create.salt,
                self.create.appnum,
            )?;
        }

        Store::open(
            dat_path,
            key_path,
            log_path,
            self.cache_size_budget,
            self.commit_limit,
        )
    }
}
