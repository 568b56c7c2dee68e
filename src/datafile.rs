//! Thin wrapper over the active data file.
//!
//! The writer holds a single append-mode handle for the life of the engine.
//! Readers open their own handles and seek positionally; there is no shared
//! cursor between the two sides.

use std::{
    fs::{File, OpenOptions},
    io::{self, BufReader, Read, Seek, SeekFrom, Write},
    path::Path,
};

use crate::{record, Result, StoreError};

/// Open (creating if absent) a file for appending.
pub(crate) fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new()
        .create(true)
        .write(true)
        .append(true)
        .open(path)
}

/// Append record bytes with a single write call.
///
/// A short write leaves a torn record at the tail, which recovery will trim;
/// it is reported as an IO error and the caller must not advance its offset.
pub(crate) fn append(file: &mut File, bytes: &[u8]) -> Result<usize> {
    let n = file.write(bytes)?;
    if n != bytes.len() {
        return Err(StoreError::Io(io::Error::new(
            io::ErrorKind::WriteZero,
            format!("short append: wrote {} of {} bytes", n, bytes.len()),
        )));
    }
    Ok(n)
}

/// Read the complete record starting at `offset`.
///
/// Returns the raw record bytes, header included. Fails with `Corrupt` if the
/// size prefix is out of bounds, with `Io` if the file ends early or the read
/// itself fails.
pub(crate) fn read_record_at(file: &mut File, offset: u64) -> Result<Vec<u8>> {
    file.seek(SeekFrom::Start(offset))?;
    let mut header = [0u8; 4];
    file.read_exact(&mut header)?;
    let total = u32::from_le_bytes(header);
    if !(record::MIN_RECORD_SIZE..=record::MAX_RECORD_SIZE).contains(&total) {
        return Err(StoreError::Corrupt(format!(
            "record size {} at offset {}",
            total, offset
        )));
    }
    let mut buf = vec![0u8; total as usize];
    buf[..4].copy_from_slice(&header);
    file.read_exact(&mut buf[4..])?;
    Ok(buf)
}

/// Sequential reader over the records of a data file, used for recovery and
/// for carrying tail writes across a compaction.
///
/// Stops cleanly at end of file. A torn tail (a partial size prefix, or
/// fewer bytes than the prefix declares) ends the stream and sets
/// [`truncated`](Replay::truncated); `offset` then points at the last
/// complete record boundary. A size prefix outside the legal range is
/// reported as `Corrupt`.
pub(crate) struct Replay {
    reader: BufReader<File>,
    offset: u64,
    truncated: bool,
}

impl Replay {
    /// Start replaying `file` at `start`, which must be a record boundary.
    pub(crate) fn new(mut file: File, start: u64) -> Result<Self> {
        file.seek(SeekFrom::Start(start))?;
        Ok(Replay {
            reader: BufReader::new(file),
            offset: start,
            truncated: false,
        })
    }

    /// The next complete record and the offset it starts at.
    pub(crate) fn next_record(&mut self) -> Result<Option<(u64, Vec<u8>)>> {
        let mut header = [0u8; 4];
        let n = read_full(&mut self.reader, &mut header)?;
        if n == 0 {
            return Ok(None);
        }
        if n < header.len() {
            self.truncated = true;
            return Ok(None);
        }
        let total = u32::from_le_bytes(header);
        if !(record::MIN_RECORD_SIZE..=record::MAX_RECORD_SIZE).contains(&total) {
            return Err(StoreError::Corrupt(format!(
                "record size {} at offset {}",
                total, self.offset
            )));
        }
        let mut buf = vec![0u8; total as usize];
        buf[..4].copy_from_slice(&header);
        let m = read_full(&mut self.reader, &mut buf[4..])?;
        if m < buf.len() - 4 {
            self.truncated = true;
            return Ok(None);
        }
        let start = self.offset;
        self.offset += u64::from(total);
        Ok(Some((start, buf)))
    }

    /// Bytes consumed up to the last complete record.
    pub(crate) fn offset(&self) -> u64 {
        self.offset
    }

    /// Whether the stream ended on a torn record.
    pub(crate) fn truncated(&self) -> bool {
        self.truncated
    }
}

/// Read until `buf` is full or the reader is exhausted, returning the number
/// of bytes read. Unlike `read_exact` this distinguishes a clean EOF from a
/// partial fill.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record;

    fn scratch_file(contents: &[u8]) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data");
        std::fs::write(&path, contents).unwrap();
        (dir, path)
    }

    #[test]
    fn append_then_read_back() -> Result<()> {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data");

        let first = record::encode(b"key1", b"value1")?;
        let second = record::encode(b"key2", b"value2")?;
        let mut out = open_append(&path)?;
        let n = append(&mut out, &first)?;
        append(&mut out, &second)?;

        let mut input = File::open(&path)?;
        assert_eq!(read_record_at(&mut input, 0)?, first);
        assert_eq!(read_record_at(&mut input, n as u64)?, second);
        Ok(())
    }

    #[test]
    fn read_rejects_bad_size_prefix() {
        let (_dir, path) = scratch_file(&0u32.to_le_bytes());
        let mut input = File::open(&path).unwrap();
        assert!(matches!(
            read_record_at(&mut input, 0),
            Err(StoreError::Corrupt(_))
        ));
    }

    #[test]
    fn read_past_end_is_io() {
        let (_dir, path) = scratch_file(&record::encode(b"k", b"v").unwrap());
        let mut input = File::open(&path).unwrap();
        assert!(matches!(
            read_record_at(&mut input, 1000),
            Err(StoreError::Io(_))
        ));
    }

    #[test]
    fn replay_walks_records() -> Result<()> {
        let first = record::encode(b"key1", b"value1")?;
        let second = record::encode(b"key2", b"value2")?;
        let mut contents = first.clone();
        contents.extend_from_slice(&second);
        let (_dir, path) = scratch_file(&contents);

        let mut replay = Replay::new(File::open(&path)?, 0)?;
        assert_eq!(replay.next_record()?, Some((0, first.clone())));
        assert_eq!(replay.next_record()?, Some((first.len() as u64, second)));
        assert_eq!(replay.next_record()?, None);
        assert!(!replay.truncated());
        assert_eq!(replay.offset(), contents.len() as u64);
        Ok(())
    }

    #[test]
    fn replay_flags_torn_tail() -> Result<()> {
        let whole = record::encode(b"key1", b"value1")?;
        for cut in [2, whole.len() + 2, whole.len() * 2 - 3] {
            let mut contents = whole.clone();
            contents.extend_from_slice(&whole);
            contents.truncate(cut);
            let (_dir, path) = scratch_file(&contents);

            let mut replay = Replay::new(File::open(&path)?, 0)?;
            while replay.next_record()?.is_some() {}
            assert!(replay.truncated(), "cut at {} not flagged", cut);
            assert_eq!(replay.offset() as usize, (cut / whole.len()) * whole.len());
        }
        Ok(())
    }

    #[test]
    fn replay_rejects_zero_size_mid_stream() -> Result<()> {
        let mut contents = record::encode(b"key1", b"value1")?;
        contents.extend_from_slice(&[0u8; 8]);
        let (_dir, path) = scratch_file(&contents);

        let mut replay = Replay::new(File::open(&path)?, 0)?;
        assert!(replay.next_record()?.is_some());
        assert!(matches!(
            replay.next_record(),
            Err(StoreError::Corrupt(_))
        ));
        Ok(())
    }

    #[test]
    fn replay_from_nonzero_start() -> Result<()> {
        let first = record::encode(b"key1", b"value1")?;
        let second = record::encode(b"key2", b"value2")?;
        let mut out = Vec::new();
        out.write_all(&first).unwrap();
        out.write_all(&second).unwrap();
        let (_dir, path) = scratch_file(&out);

        let mut replay = Replay::new(File::open(&path)?, first.len() as u64)?;
        assert_eq!(replay.next_record()?, Some((first.len() as u64, second)));
        assert_eq!(replay.next_record()?, None);
        Ok(())
    }
}
