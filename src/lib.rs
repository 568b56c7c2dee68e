#![deny(missing_docs)]
//! A log-structured key-value store.
//!
//! Writes append records to a single data file, `current-data`, inside a
//! caller-provided directory; an in-memory index maps each key to the offset
//! of its latest record. Deletes append a tombstone. Opening a directory
//! replays the file to rebuild the index, and a background compaction
//! rewrites the file to drop superseded records once it grows past a
//! threshold.
//!
//! Keys and values are opaque byte strings. The on-disk record layout is
//! fixed and little-endian, so files written by one build are readable by
//! any other.
//!
//! ```no_run
//! use logcask::Store;
//!
//! # fn main() -> logcask::Result<()> {
//! let store = Store::open("./data")?;
//! store.put(b"key", b"value")?;
//! assert_eq!(store.get(b"key")?, b"value");
//! store.delete(b"key")?;
//! store.close()?;
//! # Ok(())
//! # }
//! ```

mod datafile;
mod error;
mod index;
mod record;
mod store;

pub use error::{Result, StoreError};
pub use store::Store;
