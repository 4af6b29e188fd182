//
// header.rs -- data/key/log file header layouts
//
// This file is part of the nudb-native project.
// SPDX-License-Identifier: MIT

//! Exact on-disk byte layouts for the three file headers (spec §6). All three carry a copy of
//! `{uid, appnum, key_size}` so `open` and recovery can detect a file swapped out from under
//! the store; the key and log headers additionally carry `{salt, pepper, block_size}` for the
//! same reason.

use std::io::{self, Read, Write};

use crate::error::{Error, Result};
use crate::ser::{read_u16, read_u64, write_u16, write_u64};

pub const CURRENT_VERSION: u16 = 1;

pub const DATA_MAGIC: &[u8; 8] = b"nudb.dat";
pub const KEY_MAGIC: &[u8; 8] = b"nudb.key";
pub const LOG_MAGIC: &[u8; 8] = b"nudb.log";

const DATA_RESERVED: usize = 64;
const KEY_RESERVED: usize = 64;

pub const DATA_HEADER_SIZE: usize = 8 + 2 + 8 + 8 + 2 + DATA_RESERVED;
pub const KEY_HEADER_SIZE: usize = 8 + 2 + 8 + 8 + 2 + 8 + 8 + 2 + 2 + KEY_RESERVED;
pub const LOG_HEADER_SIZE: usize = 8 + 2 + 8 + 8 + 2 + 8 + 8 + 2 + 8 + 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataHeader {
    pub version: u16,
    pub uid: u64,
    pub appnum: u64,
    pub key_size: u16,
}

impl DataHeader {
    pub fn write_to(&self, mut w: impl Write) -> io::Result<()> {
        w.write_all(DATA_MAGIC)?;
        write_u16(&mut w, self.version)?;
        write_u64(&mut w, self.uid)?;
        write_u64(&mut w, self.appnum)?;
        write_u16(&mut w, self.key_size)?;
        w.write_all(&[0u8; DATA_RESERVED])
    }

    pub fn read_from(mut r: impl Read) -> Result<Self> {
        let mut magic = [0u8; 8];
        r.read_exact(&mut magic).map_err(|_| Error::IncompleteHeader)?;
        if &magic != DATA_MAGIC {
            return Err(Error::NotDataFile);
        }
        let version = read_u16(&mut r)?;
        if version != CURRENT_VERSION {
            return Err(Error::DifferentVersion {
                found: version,
                expected: CURRENT_VERSION,
            });
        }
        let uid = read_u64(&mut r)?;
        let appnum = read_u64(&mut r)?;
        let key_size = read_u16(&mut r)?;
        let mut reserved = [0u8; DATA_RESERVED];
        r.read_exact(&mut reserved)?;
        Ok(DataHeader {
            version,
            uid,
            appnum,
            key_size,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyHeader {
    pub version: u16,
    pub uid: u64,
    pub appnum: u64,
    pub key_size: u16,
    pub salt: u64,
    pub pepper: u64,
    pub block_size: u16,
    /// `load_factor * 65536`, saturated to `u16::MAX`.
    pub load_factor: u16,
}

impl KeyHeader {
    pub fn write_to(&self, mut w: impl Write) -> io::Result<()> {
        w.write_all(KEY_MAGIC)?;
        write_u16(&mut w, self.version)?;
        write_u64(&mut w, self.uid)?;
        write_u64(&mut w, self.appnum)?;
        write_u16(&mut w, self.key_size)?;
        write_u64(&mut w, self.salt)?;
        write_u64(&mut w, self.pepper)?;
        write_u16(&mut w, self.block_size)?;
        write_u16(&mut w, self.load_factor)?;
        w.write_all(&[0u8; KEY_RESERVED])
    }

    pub fn read_from(mut r: impl Read) -> Result<Self> {
        let mut magic = [0u8; 8];
        r.read_exact(&mut magic).map_err(|_| Error::ShortKeyFile)?;
        if &magic != KEY_MAGIC {
            return Err(Error::NotKeyFile);
        }
        let version = read_u16(&mut r)?;
        if version != CURRENT_VERSION {
            return Err(Error::DifferentVersion {
                found: version,
                expected: CURRENT_VERSION,
            });
        }
        let uid = read_u64(&mut r)?;
        let appnum = read_u64(&mut r)?;
        let key_size = read_u16(&mut r)?;
        let salt = read_u64(&mut r)?;
        let pepper = read_u64(&mut r)?;
        let block_size = read_u16(&mut r)?;
        let load_factor = read_u16(&mut r)?;
        let mut reserved = [0u8; KEY_RESERVED];
        r.read_exact(&mut reserved)?;
        Ok(KeyHeader {
            version,
            uid,
            appnum,
            key_size,
            salt,
            pepper,
            block_size,
            load_factor,
        })
    }

    /// Checks this header against the data-file header it is paired with (spec §4.6 step 3 /
    /// §7 "header agreement").
    pub fn verify_against_data(&self, data: &DataHeader) -> Result<()> {
        if self.uid != data.uid {
            return Err(Error::UidMismatch);
        }
        if self.appnum != data.appnum {
            return Err(Error::AppnumMismatch);
        }
        if self.key_size != data.key_size {
            return Err(Error::KeySizeMismatch);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogHeader {
    pub version: u16,
    pub uid: u64,
    pub appnum: u64,
    pub key_size: u16,
    pub salt: u64,
    pub pepper: u64,
    pub block_size: u16,
    pub key_file_size: u64,
    pub dat_file_size: u64,
}

impl LogHeader {
    pub fn write_to(&self, mut w: impl Write) -> io::Result<()> {
        w.write_all(LOG_MAGIC)?;
        write_u16(&mut w, self.version)?;
        write_u64(&mut w, self.uid)?;
        write_u64(&mut w, self.appnum)?;
        write_u16(&mut w, self.key_size)?;
        write_u64(&mut w, self.salt)?;
        write_u64(&mut w, self.pepper)?;
        write_u16(&mut w, self.block_size)?;
        write_u64(&mut w, self.key_file_size)?;
        write_u64(&mut w, self.dat_file_size)
    }

    pub fn read_from(mut r: impl Read) -> Result<Self> {
        let mut magic = [0u8; 8];
        r.read_exact(&mut magic).map_err(|_| Error::IncompleteHeader)?;
        if &magic != LOG_MAGIC {
            return Err(Error::NotLogFile);
        }
        let version = read_u16(&mut r)?;
        if version != CURRENT_VERSION {
            return Err(Error::DifferentVersion {
                found: version,
                expected: CURRENT_VERSION,
            });
        }
        let uid = read_u64(&mut r)?;
        let appnum = read_u64(&mut r)?;
        let key_size = read_u16(&mut r)?;
        let salt = read_u64(&mut r)?;
        let pepper = read_u64(&mut r)?;
        let block_size = read_u16(&mut r)?;
        let key_file_size = read_u64(&mut r)?;
        let dat_file_size = read_u64(&mut r)?;
        Ok(LogHeader {
            version,
            uid,
            appnum,
            key_size,
            salt,
            pepper,
            block_size,
            key_file_size,
            dat_file_size,
        })
    }

    /// Checks a just-read log header against the (already cross-checked) key header, per
    /// spec §4.8 step 3.
    pub fn verify_against_key(&self, key: &KeyHeader) -> Result<()> {
        if self.uid != key.uid {
            return Err(Error::UidMismatch);
        }
        if self.appnum != key.appnum {
            return Err(Error::AppnumMismatch);
        }
        if self.key_size != key.key_size {
            return Err(Error::KeySizeMismatch);
        }
        if self.salt != key.salt {
            return Err(Error::SaltMismatch);
        }
        if self.pepper != key.pepper {
            return Err(Error::PepperMismatch);
        }
        if self.block_size != key.block_size {
            return Err(Error::BlockSizeMismatch);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_header_roundtrip() {
        let h = DataHeader {
            version: CURRENT_VERSION,
            uid: 0xdead_beef,
            appnum: 1337,
            key_size: 8,
        };
        let mut buf = Vec::new();
        h.write_to(&mut buf).unwrap();
        assert_eq!(buf.len(), DATA_HEADER_SIZE);
        assert_eq!(DataHeader::read_from(&buf[..]).unwrap(), h);
    }

    #[test]
    fn key_header_roundtrip_and_agreement() {
        let data = DataHeader {
            version: CURRENT_VERSION,
            uid: 7,
            appnum: 1,
            key_size: 8,
        };
        let key = KeyHeader {
            version: CURRENT_VERSION,
            uid: 7,
            appnum: 1,
            key_size: 8,
            salt: 42,
            pepper: 99,
            block_size: 4096,
            load_factor: 32768,
        };
        let mut buf = Vec::new();
        key.write_to(&mut buf).unwrap();
        assert_eq!(buf.len(), KEY_HEADER_SIZE);
        let read_back = KeyHeader::read_from(&buf[..]).unwrap();
        assert_eq!(read_back, key);
        assert!(read_back.verify_against_data(&data).is_ok());

        let mismatched = DataHeader { uid: 8, ..data };
        assert!(matches!(
            read_back.verify_against_data(&mismatched),
            Err(Error::UidMismatch)
        ));
    }

    #[test]
    fn rejects_wrong_magic() {
        let mut buf = vec![0u8; DATA_HEADER_SIZE];
        buf[..8].copy_from_slice(b"nope\0\0\0\0");
        assert!(matches!(DataHeader::read_from(&buf[..]), Err(Error::NotDataFile)));
    }

    #[test]
    fn log_header_roundtrip() {
        let log = LogHeader {
            version: CURRENT_VERSION,
            uid: 1,
            appnum: 2,
            key_size: 8,
            salt: 3,
            pepper: 4,
            block_size: 4096,
            key_file_size: 112,
            dat_file_size: 92,
        };
        let mut buf = Vec::new();
        log.write_to(&mut buf).unwrap();
        assert_eq!(buf.len(), LOG_HEADER_SIZE);
        assert_eq!(LogHeader::read_from(&buf[..]).unwrap(), log);
    }
}
