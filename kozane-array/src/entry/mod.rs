//! Bounded append-only log entries.
//!
//! Writes are absorbed at memory speed by the one OPEN entry, written
//! through to its slot file without fsync. A full entry seals (header
//! patched, fsync) and queues for apply; applied entries are truncated and
//! recycled. The pool bounds the number of slot files, which bounds both
//! pending-write memory and recovery replay cost.

mod file;
mod types;

pub use types::{
    entry_file_name, parse_entry_slot, record_size, EntryKind, EntryRecord, EntryState,
    ENTRY_HEADER_SIZE, ENTRY_MAGIC, ENTRY_VERSION,
};

pub(crate) use file::{scan_entry_file, ScannedEntry};

use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use kozane_core::error::{Error, IoResultExt, Result};

use crate::element::Element;
use crate::file::ArrayFile;

use self::file::{finalize_header, write_placeholder_header, write_record};

/// One bounded log segment backed by a slot file
#[derive(Debug)]
pub struct Entry<V: Element> {
    slot: u32,
    path: PathBuf,
    file: File,
    kind: EntryKind,
    state: EntryState,
    records: Vec<EntryRecord<V>>,
    min_scn: u64,
    max_scn: u64,
    capacity: usize,
}

impl<V: Element> Entry<V> {
    /// Initialize a slot file: truncate, write a placeholder header, and
    /// hand the entry back RECYCLED
    fn open_slot(dir: &Path, slot: u32, capacity: usize) -> Result<Self> {
        let path = dir.join(entry_file_name(slot));
        let mut file = OpenOptions::new()
            .create(true)
            .truncate(true)
            .read(true)
            .write(true)
            .open(&path)
            .io_context(|| format!("failed to create entry file {:?}", path))?;
        write_placeholder_header(&mut file, EntryKind::Data)?;

        Ok(Self {
            slot,
            path,
            file,
            kind: EntryKind::Data,
            state: EntryState::Recycled,
            records: Vec::with_capacity(capacity),
            min_scn: u64::MAX,
            max_scn: 0,
            capacity,
        })
    }

    pub fn slot(&self) -> u32 {
        self.slot
    }

    pub fn state(&self) -> EntryState {
        self.state
    }

    pub fn kind(&self) -> EntryKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.records.len() >= self.capacity
    }

    /// Smallest SCN recorded; 0 while empty
    pub fn min_scn(&self) -> u64 {
        if self.records.is_empty() {
            0
        } else {
            self.min_scn
        }
    }

    /// Largest SCN recorded; 0 while empty
    pub fn max_scn(&self) -> u64 {
        self.max_scn
    }

    fn make_open(&mut self) {
        self.state = EntryState::Open;
    }

    /// Append a record, writing it through to the slot file (no fsync).
    ///
    /// SCNs are expected to be non-decreasing but are absorbed in any
    /// order; an out-of-order SCN widens the entry's range and leaves the
    /// replay outcome to file order (last record wins).
    pub fn append(&mut self, index: u32, value: V, scn: u64) -> Result<()> {
        if self.records.len() >= self.capacity {
            return Err(Error::EntryFull {
                capacity: self.capacity,
            });
        }
        let record = EntryRecord { index, value, scn };
        write_record(&mut self.file, &record)?;
        self.min_scn = self.min_scn.min(scn);
        self.max_scn = self.max_scn.max(scn);
        self.records.push(record);
        Ok(())
    }

    /// Patch the final header and fsync; the entry becomes FULL and its
    /// records are durable
    pub fn seal(&mut self) -> Result<()> {
        let min_scn = self.min_scn();
        finalize_header(
            &mut self.file,
            self.records.len() as u32,
            min_scn,
            self.max_scn,
        )?;
        self.file.sync_all()?;
        self.state = EntryState::Full;
        Ok(())
    }

    /// Fsync the slot file without sealing
    pub fn flush(&mut self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }

    /// Write every record through to the array file, in order, then fsync
    /// the array file
    pub fn apply(&mut self, array_file: &mut ArrayFile<V>) -> Result<()> {
        let batch: Vec<(u32, V)> = self.records.iter().map(|r| (r.index, r.value)).collect();
        array_file.put_bulk(&batch)?;
        array_file.flush()?;
        self.state = EntryState::Applied;
        debug!(slot = self.slot, records = batch.len(), max_scn = self.max_scn, "entry applied");
        Ok(())
    }

    /// Truncate back to an empty placeholder header; the entry becomes
    /// RECYCLED
    pub fn recycle(&mut self) -> Result<()> {
        self.file.set_len(0)?;
        use std::io::{Seek, SeekFrom};
        self.file.seek(SeekFrom::Start(0))?;
        write_placeholder_header(&mut self.file, self.kind)?;
        self.records.clear();
        self.min_scn = u64::MAX;
        self.max_scn = 0;
        self.state = EntryState::Recycled;
        Ok(())
    }
}

/// The bounded set of entry slots for one array
#[derive(Debug)]
pub struct EntryPool<V: Element> {
    dir: PathBuf,
    max_entry_size: usize,
    pub(crate) max_entries: usize,
    /// The unique OPEN entry; `None` only inside a rollover
    pub(crate) current: Option<Entry<V>>,
    /// Sealed entries awaiting apply, oldest first
    pub(crate) full: VecDeque<Entry<V>>,
    free: Vec<Entry<V>>,
    next_slot: u32,
}

impl<V: Element> EntryPool<V> {
    /// Build the pool over the slot files found on disk, re-initializing
    /// every slot and opening one current entry. Slot files at or beyond
    /// `max_entries` (a shrunk configuration) are deleted.
    pub fn open(
        dir: &Path,
        max_entry_size: usize,
        max_entries: usize,
        existing_slots: &[u32],
    ) -> Result<Self> {
        let mut free = Vec::new();
        let mut next_slot = 0u32;
        for &slot in existing_slots {
            if slot as usize >= max_entries {
                let path = dir.join(entry_file_name(slot));
                warn!(slot, "removing entry slot beyond the configured pool size");
                std::fs::remove_file(&path)
                    .io_context(|| format!("failed to remove {:?}", path))?;
                continue;
            }
            free.push(Entry::open_slot(dir, slot, max_entry_size)?);
            next_slot = next_slot.max(slot + 1);
        }

        let mut pool = Self {
            dir: dir.to_path_buf(),
            max_entry_size,
            max_entries,
            current: None,
            full: VecDeque::new(),
            free,
            next_slot,
        };
        let current = pool.acquire()?.ok_or_else(|| Error::Configuration {
            message: "entry pool has no usable slot".to_string(),
        })?;
        pool.current = Some(current);
        Ok(pool)
    }

    fn allocated(&self) -> usize {
        self.current.is_some() as usize + self.full.len() + self.free.len()
    }

    /// Take a RECYCLED entry (or allocate a fresh slot) and make it OPEN.
    /// Returns `None` when the pool is exhausted.
    pub fn acquire(&mut self) -> Result<Option<Entry<V>>> {
        if let Some(mut entry) = self.free.pop() {
            entry.make_open();
            return Ok(Some(entry));
        }
        if self.allocated() < self.max_entries && (self.next_slot as usize) < self.max_entries {
            let mut entry = Entry::open_slot(&self.dir, self.next_slot, self.max_entry_size)?;
            self.next_slot += 1;
            entry.make_open();
            return Ok(Some(entry));
        }
        Ok(None)
    }

    /// Recycle an APPLIED entry back onto the free list
    pub fn retire(&mut self, mut entry: Entry<V>) -> Result<()> {
        entry.recycle()?;
        self.free.push(entry);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_entry_append_until_full() {
        let temp_dir = TempDir::new().unwrap();
        let mut pool = EntryPool::<i64>::open(temp_dir.path(), 3, 2, &[]).unwrap();
        let entry = pool.current.as_mut().unwrap();

        entry.append(0, 10, 1).unwrap();
        entry.append(5, 50, 2).unwrap();
        entry.append(0, 11, 3).unwrap();
        assert!(entry.is_full());
        assert_eq!(entry.min_scn(), 1);
        assert_eq!(entry.max_scn(), 3);

        let err = entry.append(9, 90, 4).unwrap_err();
        assert_eq!(err.error_code(), "ENTRY_FULL");
    }

    #[test]
    fn test_sealed_entry_survives_scan() {
        let temp_dir = TempDir::new().unwrap();
        let mut pool = EntryPool::<i64>::open(temp_dir.path(), 10, 2, &[]).unwrap();
        let entry = pool.current.as_mut().unwrap();
        entry.append(1, 100, 7).unwrap();
        entry.append(2, 200, 8).unwrap();
        entry.seal().unwrap();
        let slot = entry.slot();

        let path = temp_dir.path().join(entry_file_name(slot));
        let scanned = scan_entry_file::<i64>(&path, slot).unwrap();
        assert_eq!(scanned.records.len(), 2);
        assert_eq!(scanned.min_scn, 7);
        assert_eq!(scanned.max_scn, 8);
    }

    #[test]
    fn test_recycled_entry_scans_empty() {
        let temp_dir = TempDir::new().unwrap();
        let mut pool = EntryPool::<i64>::open(temp_dir.path(), 10, 2, &[]).unwrap();
        let mut entry = pool.current.take().unwrap();
        entry.append(1, 100, 7).unwrap();
        entry.seal().unwrap();
        let slot = entry.slot();
        pool.retire(entry).unwrap();

        let path = temp_dir.path().join(entry_file_name(slot));
        let scanned = scan_entry_file::<i64>(&path, slot).unwrap();
        assert!(scanned.records.is_empty());

        // The recycled slot is reusable
        let mut reused = pool.acquire().unwrap().unwrap();
        assert_eq!(reused.slot(), slot);
        assert!(reused.is_empty());
        reused.append(3, 30, 9).unwrap();
        assert_eq!(reused.min_scn(), 9);
    }

    #[test]
    fn test_pool_is_bounded() {
        let temp_dir = TempDir::new().unwrap();
        let mut pool = EntryPool::<i64>::open(temp_dir.path(), 10, 2, &[]).unwrap();

        // Slot 0 is current; slot 1 is the only headroom
        let second = pool.acquire().unwrap().unwrap();
        assert_eq!(second.slot(), 1);
        pool.full.push_back(second);
        assert!(pool.acquire().unwrap().is_none());
    }

    #[test]
    fn test_pool_drops_out_of_range_slots() {
        let temp_dir = TempDir::new().unwrap();
        for slot in [0u32, 1, 7] {
            std::fs::write(temp_dir.path().join(entry_file_name(slot)), b"").unwrap();
        }

        let pool = EntryPool::<i64>::open(temp_dir.path(), 10, 2, &[0, 1, 7]).unwrap();
        assert!(!temp_dir.path().join(entry_file_name(7)).exists());
        assert!(temp_dir.path().join(entry_file_name(0)).exists());
        assert_eq!(pool.allocated(), 2);
    }
}
