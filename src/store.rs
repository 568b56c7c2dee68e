//! The storage engine: recovery, reads, writes and compaction over a single
//! append-only data file.

use std::{
    fs::{self, File},
    io,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, RwLock,
    },
    thread,
    time::Instant,
};

use log::{error, info, warn};

use crate::{datafile, index::Index, record, Result, StoreError};

/// Name of the active data file inside the store directory.
const DATA_FILE: &str = "current-data";

/// Scratch file compaction builds before the atomic rename.
const TEMP_FILE: &str = "current-data.temp";

/// Write offset at which a background compaction is scheduled.
const COMPACTION_THRESHOLD: u64 = 10 * 1024 * 1024;

/// A log-structured key-value store over a single directory.
///
/// Every `put` and `delete` appends a record to `<dir>/current-data`; an
/// in-memory index maps each key to the offset of its latest live record, so
/// a `get` is one index probe and one positional read. Opening the store
/// replays the file to rebuild the index. When the file outgrows a threshold
/// a background compaction rewrites it to hold only live records and swaps it
/// in with an atomic rename.
///
/// A `Store` is a cheap clonable handle; all clones share the same engine
/// state. Reads take a shared lock and run in parallel, each on its own file
/// handle; writes take the lock exclusively, so record offsets are assigned
/// uniquely and in order. Compactions are serialized by their own mutex,
/// which is always acquired before the index lock.
#[derive(Clone)]
pub struct Store {
    inner: Arc<Inner>,
}

struct Inner {
    /// `<dir>/current-data`
    path: PathBuf,
    /// `<dir>/current-data.temp`
    temp_path: PathBuf,
    state: RwLock<State>,
    /// Serializes compactions. Lock order: this, then `state`.
    merge_lock: Mutex<()>,
    /// A compaction is scheduled or running; further triggers are dropped.
    merge_pending: AtomicBool,
}

/// Everything guarded by the index lock: the append handle, the offset the
/// next record will land at, and the index itself. `out` is `None` once the
/// store is closed.
struct State {
    out: Option<File>,
    offset: u64,
    index: Index,
}

impl Store {
    /// Open the store in `dir`, creating `current-data` if absent. The
    /// directory itself must already exist.
    ///
    /// Replays the data file to rebuild the index. A torn record at the tail
    /// (from a crash mid-append) is trimmed off and recovery proceeds;
    /// corruption anywhere before the tail fails with `Corrupt`.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Store> {
        let dir = dir.into();
        let path = dir.join(DATA_FILE);
        let out = datafile::open_append(&path)?;

        let (index, offset, truncated) = recover(&path)?;
        if truncated {
            warn!("dropping torn record at the tail of {}", path.display());
            out.set_len(offset)?;
        }
        info!(
            "recovered {}: {} live keys in {} bytes",
            path.display(),
            index.len(),
            offset
        );

        Ok(Store {
            inner: Arc::new(Inner {
                temp_path: dir.join(TEMP_FILE),
                path,
                state: RwLock::new(State {
                    out: Some(out),
                    offset,
                    index,
                }),
                merge_lock: Mutex::new(()),
                merge_pending: AtomicBool::new(false),
            }),
        })
    }

    /// Get the value stored under `key`.
    ///
    /// Fails with `KeyNotFound` if the key was never written, or its latest
    /// record is a deletion. I/O failures are reported as `Io`, never
    /// conflated with a missing key.
    pub fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        let state = self.inner.state.read().unwrap();
        let offset = state.index.lookup(key).ok_or(StoreError::KeyNotFound)?;

        let mut file = File::open(&self.inner.path)?;
        let buf = datafile::read_record_at(&mut file, offset)?;
        let rec = record::decode(&buf)?;
        Ok(rec.value)
    }

    /// Store `value` under `key`, replacing any previous value.
    ///
    /// A value equal to the byte string `DELETE` collides with the on-disk
    /// deletion marker: it reads back normally on this handle, but a reopen
    /// or compaction will treat the record as a deletion. This ambiguity is
    /// inherent to the file format.
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let buf = record::encode(key, value)?;

        let mut state = self.inner.state.write().unwrap();
        let n = match state.out.as_mut() {
            Some(out) => datafile::append(out, &buf)?,
            None => return Err(StoreError::Closed),
        };
        let offset = state.offset;
        state.index.insert(key.to_vec(), offset);
        state.offset += n as u64;

        let over = state.offset >= COMPACTION_THRESHOLD;
        drop(state);
        if over {
            self.schedule_compaction();
        }
        Ok(())
    }

    /// Remove `key` by appending a deletion record.
    ///
    /// Deleting an absent key is not an error; the record is appended either
    /// way so a replay settles on the same answer.
    pub fn delete(&self, key: &[u8]) -> Result<()> {
        let buf = record::encode(key, record::TOMBSTONE)?;

        let mut state = self.inner.state.write().unwrap();
        let n = match state.out.as_mut() {
            Some(out) => datafile::append(out, &buf)?,
            None => return Err(StoreError::Closed),
        };
        state.index.remove(key);
        state.offset += n as u64;

        let over = state.offset >= COMPACTION_THRESHOLD;
        drop(state);
        if over {
            self.schedule_compaction();
        }
        Ok(())
    }

    /// Rewrite the data file to contain only the latest live record per key,
    /// then swap it in with an atomic rename and replace the index with the
    /// freshly built offsets.
    ///
    /// Runs synchronously on the calling thread. Reads and writes proceed
    /// while live records are copied; only the final swap takes the index
    /// lock exclusively. On failure the scratch file is removed and the store
    /// keeps running on the old file.
    pub fn compact(&self) -> Result<()> {
        let _merge = self.inner.merge_lock.lock().unwrap();
        let result = self.merge();
        if result.is_err() {
            let _ = fs::remove_file(&self.inner.temp_path);
        }
        result
    }

    /// Close the store, waiting for any in-flight compaction to finish and
    /// releasing the write handle. Later writes fail with `Closed`; the
    /// directory can be reopened.
    pub fn close(&self) -> Result<()> {
        let _merge = self.inner.merge_lock.lock().unwrap();
        let mut state = self.inner.state.write().unwrap();
        if let Some(out) = state.out.take() {
            out.sync_all()?;
            info!("closed {}", self.inner.path.display());
        }
        Ok(())
    }

    /// Hand the next compaction to a detached thread, unless one is already
    /// scheduled or running.
    fn schedule_compaction(&self) {
        if self
            .inner
            .merge_pending
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        let store = self.clone();
        thread::spawn(move || {
            let start = Instant::now();
            info!("compaction starts");
            match store.compact() {
                Ok(()) => info!("compaction finished, cost {:?}", start.elapsed()),
                Err(e) => error!("compaction failed: {}", e),
            }
            store.inner.merge_pending.store(false, Ordering::SeqCst);
        });
    }

    fn merge(&self) -> Result<()> {
        // A stale scratch file from an interrupted run is discarded.
        match fs::remove_file(&self.inner.temp_path) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => return Err(e.into()),
            _ => {}
        }
        let mut temp = datafile::open_append(&self.inner.temp_path)?;

        // Snapshot the live offsets, then let readers and writers proceed
        // while the records are copied.
        let (snapshot, snapshot_end) = {
            let state = self.inner.state.read().unwrap();
            if state.out.is_none() {
                return Err(StoreError::Closed);
            }
            (state.index.snapshot(), state.offset)
        };

        let mut new_index = Index::new();
        let mut new_offset = 0u64;
        let mut src = File::open(&self.inner.path)?;
        for (key, offset) in snapshot {
            let buf = datafile::read_record_at(&mut src, offset)?;
            let rec = record::decode(&buf)?;
            let n = datafile::append(&mut temp, &record::encode(&rec.key, &rec.value)?)?;
            new_index.insert(key, new_offset);
            new_offset += n as u64;
        }

        let mut state = self.inner.state.write().unwrap();
        if state.out.is_none() {
            return Err(StoreError::Closed);
        }

        // Records appended after the snapshot sit past `snapshot_end` in the
        // old file; replay them into the new one so the rename loses nothing.
        if state.offset > snapshot_end {
            let mut tail = datafile::Replay::new(File::open(&self.inner.path)?, snapshot_end)?;
            while let Some((_, buf)) = tail.next_record()? {
                let rec = record::decode(&buf)?;
                let n = datafile::append(&mut temp, &buf)?;
                if rec.is_tombstone() {
                    new_index.remove(&rec.key);
                } else {
                    new_index.insert(rec.key, new_offset);
                }
                new_offset += n as u64;
            }
        }

        // `temp` stays valid across the rename and becomes the active write
        // handle; assigning it drops and closes the superseded one.
        fs::rename(&self.inner.temp_path, &self.inner.path)?;
        state.out = Some(temp);
        state.offset = new_offset;
        state.index = new_index;
        Ok(())
    }
}

/// Replay the data file from the start, building the index and finding the
/// end of the last complete record.
fn recover(path: &Path) -> Result<(Index, u64, bool)> {
    let mut index = Index::new();
    let mut replay = datafile::Replay::new(File::open(path)?, 0)?;
    while let Some((offset, buf)) = replay.next_record()? {
        let rec = record::decode(&buf)?;
        if rec.is_tombstone() {
            index.remove(&rec.key);
        } else {
            index.insert(rec.key, offset);
        }
    }
    Ok((index, replay.offset(), replay.truncated()))
}
