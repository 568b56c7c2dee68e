//! On-disk record codec.
//!
//! A record is a self-delimiting unit, little-endian throughout:
//!
//! ```text
//! | total_size: u32 | key_len: u32 | key | value_len: u32 | value |
//! ```
//!
//! `total_size` counts the whole record including itself, so
//! `total_size == key_len + value_len + 12`. The size prefix makes the log
//! self-framing: recovery streams records without a side index file.

use crate::{Result, StoreError};

/// Value marking its key as deleted. A user value equal to this marker is
/// indistinguishable from a deletion; see [`crate::Store::put`].
pub(crate) const TOMBSTONE: &[u8] = b"DELETE";

/// Bytes of header around the key and value: three u32 fields.
pub(crate) const RECORD_OVERHEAD: usize = 12;

/// Smallest well-formed record: empty key, empty value.
pub(crate) const MIN_RECORD_SIZE: u32 = RECORD_OVERHEAD as u32;

/// Upper bound on an encoded record. Sizes past this are rejected at encode
/// time and treated as corruption when read back.
pub(crate) const MAX_RECORD_SIZE: u32 = i32::MAX as u32;

/// A decoded record.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct Record {
    pub(crate) key: Vec<u8>,
    pub(crate) value: Vec<u8>,
}

impl Record {
    pub(crate) fn is_tombstone(&self) -> bool {
        self.value == TOMBSTONE
    }
}

/// Encode a key/value pair into record bytes.
///
/// Fails with `InvalidArgument` if the encoded size would not fit the u32
/// header fields.
pub(crate) fn encode(key: &[u8], value: &[u8]) -> Result<Vec<u8>> {
    let total = encoded_size(key.len(), value.len())?;
    let mut buf = Vec::with_capacity(total);
    buf.extend_from_slice(&(total as u32).to_le_bytes());
    buf.extend_from_slice(&(key.len() as u32).to_le_bytes());
    buf.extend_from_slice(key);
    buf.extend_from_slice(&(value.len() as u32).to_le_bytes());
    buf.extend_from_slice(value);
    Ok(buf)
}

/// Size a record would encode to, or `InvalidArgument` if it would not fit
/// the u32 header fields.
pub(crate) fn encoded_size(key_len: usize, value_len: usize) -> Result<usize> {
    key_len
        .checked_add(value_len)
        .and_then(|n| n.checked_add(RECORD_OVERHEAD))
        .filter(|&n| n <= MAX_RECORD_SIZE as usize)
        .ok_or_else(|| {
            StoreError::InvalidArgument(format!(
                "key ({} bytes) and value ({} bytes) exceed the record size limit",
                key_len, value_len
            ))
        })
}

/// Decode record bytes into a [`Record`].
///
/// The caller has already framed `buf` using the `total_size` prefix; this
/// only checks that the declared key and value lengths fit the buffer and
/// fails with `Corrupt` when they do not.
pub(crate) fn decode(buf: &[u8]) -> Result<Record> {
    let key_len = read_len(buf, 4)?;
    let key_end = 8 + key_len;
    let value_len = read_len(buf, key_end)?;
    let value_start = key_end + 4;
    let value_end = value_start + value_len;
    if buf.len() < value_end {
        return Err(StoreError::Corrupt(format!(
            "value length {} overruns record of {} bytes",
            value_len,
            buf.len()
        )));
    }
    Ok(Record {
        key: buf[8..key_end].to_vec(),
        value: buf[value_start..value_end].to_vec(),
    })
}

fn read_len(buf: &[u8], at: usize) -> Result<usize> {
    let bytes = buf
        .get(at..at + 4)
        .ok_or_else(|| {
            StoreError::Corrupt(format!(
                "length field at byte {} overruns record of {} bytes",
                at,
                buf.len()
            ))
        })?
        .try_into()
        .unwrap();
    Ok(u32::from_le_bytes(bytes) as usize)
}
