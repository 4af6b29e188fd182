//
// error.rs -- core error taxonomy
//
// This file is part of the nudb-native project.
// SPDX-License-Identifier: MIT

use std::{fmt, io};

/// The crate-wide result alias, re-exported at the crate root.
pub type Result<T> = std::result::Result<T, Error>;

/// The crate-wide error sum. Every public operation returns `Result<T, Error>`; there are no
/// panics or exceptions in the recoverable path.
#[derive(Debug)]
pub enum Error {
    /// Wraps an underlying OS error (short reads/writes surface through `io::ErrorKind`).
    Io(io::Error),

    /// A file's magic bytes don't match the expected data-file magic.
    NotDataFile,
    /// A file's magic bytes don't match the expected key-file magic.
    NotKeyFile,
    /// A file's magic bytes don't match the expected log-file magic.
    NotLogFile,
    /// On-disk version differs from the version this build understands.
    DifferentVersion { found: u16, expected: u16 },
    /// Key file is shorter than one block (can't even hold a header).
    ShortKeyFile,
    /// Data-file or key-file header is truncated.
    IncompleteHeader,

    /// Requested key size is zero or exceeds what a 4-byte key-size field can encode.
    InvalidKeySize(u32),
    /// Requested block size can't hold a header plus at least one bucket entry.
    InvalidBlockSize(u32),
    /// Load factor isn't strictly between 0 and 1.
    InvalidLoadFactor(f64),
    /// Derived bucket capacity is zero.
    InvalidCapacity,
    /// Bucket count stored/derived is zero.
    InvalidBucketCount,
    /// A serialized bucket body is larger than the block it's supposed to fit in.
    InvalidBucketSize { found: usize, block_size: u32 },

    /// Header field disagreement between the key and data files.
    UidMismatch,
    /// Header field disagreement between the key and data files.
    AppnumMismatch,
    /// Header field disagreement between the key and data files.
    KeySizeMismatch,
    /// Header field disagreement between the key and log files.
    SaltMismatch,
    /// `pepper` doesn't match `hash(salt)`; usually means a different hasher reopened the file.
    PepperMismatch,
    /// Header field disagreement between the key and log files.
    BlockSizeMismatch,

    /// A log record's bucket index is beyond the key file's current bucket count.
    InvalidLogIndex { index: u64, buckets: u64 },
    /// A log record's spill offset would read past the end of the data file.
    InvalidLogSpill { offset: u64, data_file_size: u64 },
    /// A log record is truncated mid-record; the tail is discarded, not an open failure.
    InvalidLogRecord,
    /// A bucket's spill-chain body declares a size that can't be real.
    InvalidSpillSize(u32),

    /// No matching entry for the requested key.
    KeyNotFound,
    /// An entry for this key already exists; inserts never overwrite.
    KeyExists,
    /// `create()` was requested but a non-empty log file already exists.
    LogFileExists,
    /// Operation requires a key file that has not yet been created.
    NoKeyFile,

    /// `verify`: a value record in the data file is not reachable from any bucket.
    OrphanedValue { offset: u64 },
    /// `verify`: a bucket entry points at a data-file offset whose record doesn't exist.
    MissingValue { offset: u64 },
    /// `verify`: a bucket entry's recorded size doesn't match the record at its offset.
    SizeMismatch { offset: u64, expected: u32, found: u32 },
    /// `verify`: the same (hash, offset) pair appears in more than one bucket entry.
    DuplicateValue { offset: u64 },
    /// `verify`: a key's stored hash doesn't match `hasher(key)`.
    HashMismatch { offset: u64 },

    /// Attempted to insert a zero-length value.
    ZeroSizeValue,
    /// Attempted to insert a value too large to be expressed by the 4-byte size field.
    OversizeValue(u64),
    /// A background commit failed; this code is latched and returned by every subsequent call
    /// until the store is closed and reopened.
    Inconsistent(Box<Error>),
    /// Operation attempted on a store that has already been closed.
    Closed,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {e}"),
            Error::NotDataFile => write!(f, "not a data file"),
            Error::NotKeyFile => write!(f, "not a key file"),
            Error::NotLogFile => write!(f, "not a log file"),
            Error::DifferentVersion { found, expected } => {
                write!(f, "different version: found {found}, expected {expected}")
            }
            Error::ShortKeyFile => write!(f, "key file shorter than one block"),
            Error::IncompleteHeader => write!(f, "incomplete file header"),
            Error::InvalidKeySize(n) => write!(f, "invalid key size: {n}"),
            Error::InvalidBlockSize(n) => write!(f, "invalid block size: {n}"),
            Error::InvalidLoadFactor(lf) => write!(f, "invalid load factor: {lf}"),
            Error::InvalidCapacity => write!(f, "derived bucket capacity is zero"),
            Error::InvalidBucketCount => write!(f, "invalid bucket count"),
            Error::InvalidBucketSize { found, block_size } => {
                write!(f, "bucket body of {found} bytes exceeds block size {block_size}")
            }
            Error::UidMismatch => write!(f, "uid mismatch between data and key files"),
            Error::AppnumMismatch => write!(f, "appnum mismatch between data and key files"),
            Error::KeySizeMismatch => write!(f, "key size mismatch between data and key files"),
            Error::SaltMismatch => write!(f, "salt mismatch between key and log files"),
            Error::PepperMismatch => write!(f, "pepper mismatch: wrong hasher for this file"),
            Error::BlockSizeMismatch => write!(f, "block size mismatch between key and log files"),
            Error::InvalidLogIndex { index, buckets } => {
                write!(f, "log record index {index} exceeds bucket count {buckets}")
            }
            Error::InvalidLogSpill { offset, data_file_size } => write!(
                f,
                "log record spill offset {offset} exceeds data file size {data_file_size}"
            ),
            Error::InvalidLogRecord => write!(f, "truncated log record"),
            Error::InvalidSpillSize(n) => write!(f, "invalid spill body size: {n}"),
            Error::KeyNotFound => write!(f, "key not found"),
            Error::KeyExists => write!(f, "key already exists"),
            Error::LogFileExists => write!(f, "log file already exists and is non-empty"),
            Error::NoKeyFile => write!(f, "key file does not exist"),
            Error::OrphanedValue { offset } => write!(f, "value at {offset} is unreachable"),
            Error::MissingValue { offset } => write!(f, "entry points at missing value {offset}"),
            Error::SizeMismatch { offset, expected, found } => write!(
                f,
                "value at {offset}: entry size {expected} != record size {found}"
            ),
            Error::DuplicateValue { offset } => write!(f, "value at {offset} referenced twice"),
            Error::HashMismatch { offset } => write!(f, "value at {offset}: stored hash disagrees with key"),
            Error::ZeroSizeValue => write!(f, "zero-size values are not permitted"),
            Error::OversizeValue(n) => write!(f, "value of {n} bytes exceeds the maximum record size"),
            Error::Inconsistent(e) => write!(f, "database inconsistent after background error: {e}"),
            Error::Closed => write!(f, "operation on a closed store"),
        }
    }
}

impl std::error::Error for Error {}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

impl Clone for Error {
    /// `io::Error` itself isn't `Clone`; reconstructed from its kind and message, which is
    /// enough fidelity for a latched error that every subsequent call just needs to report.
    fn clone(&self) -> Self {
        match self {
            Error::Io(e) => Error::Io(io::Error::new(e.kind(), e.to_string())),
            Error::NotDataFile => Error::NotDataFile,
            Error::NotKeyFile => Error::NotKeyFile,
            Error::NotLogFile => Error::NotLogFile,
            Error::DifferentVersion { found, expected } => Error::DifferentVersion {
                found: *found,
                expected: *expected,
            },
            Error::ShortKeyFile => Error::ShortKeyFile,
            Error::IncompleteHeader => Error::IncompleteHeader,
            Error::InvalidKeySize(n) => Error::InvalidKeySize(*n),
            Error::InvalidBlockSize(n) => Error::InvalidBlockSize(*n),
            Error::InvalidLoadFactor(lf) => Error::InvalidLoadFactor(*lf),
            Error::InvalidCapacity => Error::InvalidCapacity,
            Error::InvalidBucketCount => Error::InvalidBucketCount,
            Error::InvalidBucketSize { found, block_size } => Error::InvalidBucketSize {
                found: *found,
                block_size: *block_size,
            },
            Error::UidMismatch => Error::UidMismatch,
            Error::AppnumMismatch => Error::AppnumMismatch,
            Error::KeySizeMismatch => Error::KeySizeMismatch,
            Error::SaltMismatch => Error::SaltMismatch,
            Error::PepperMismatch => Error::PepperMismatch,
            Error::BlockSizeMismatch => Error::BlockSizeMismatch,
            Error::InvalidLogIndex { index, buckets } => Error::InvalidLogIndex {
                index: *index,
                buckets: *buckets,
            },
            Error::InvalidLogSpill { offset, data_file_size } => Error::InvalidLogSpill {
                offset: *offset,
                data_file_size: *data_file_size,
            },
            Error::InvalidLogRecord => Error::InvalidLogRecord,
            Error::InvalidSpillSize(n) => Error::InvalidSpillSize(*n),
            Error::KeyNotFound => Error::KeyNotFound,
            Error::KeyExists => Error::KeyExists,
            Error::LogFileExists => Error::LogFileExists,
            Error::NoKeyFile => Error::NoKeyFile,
            Error::OrphanedValue { offset } => Error::OrphanedValue { offset: *offset },
            Error::MissingValue { offset } => Error::MissingValue { offset: *offset },
            Error::SizeMismatch { offset, expected, found } => Error::SizeMismatch {
                offset: *offset,
                expected: *expected,
                found: *found,
            },
            Error::DuplicateValue { offset } => Error::DuplicateValue { offset: *offset },
            Error::HashMismatch { offset } => Error::HashMismatch { offset: *offset },
            Error::ZeroSizeValue => Error::ZeroSizeValue,
            Error::OversizeValue(n) => Error::OversizeValue(*n),
            Error::Inconsistent(e) => Error::Inconsistent(Box::new(e.as_ref().clone())),
            Error::Closed => Error::Closed,
        }
    }
}

/// Whether an error requires the store to be closed and reopened (which runs recovery) before
/// any further operation can succeed. Per the spec, only `KeyNotFound` and `KeyExists` are
/// "soft" — every other error leaves the database session unusable.
impl Error {
    pub fn requires_reopen(&self) -> bool {
        !matches!(self, Error::KeyNotFound | Error::KeyExists)
    }
}
