//! Write absorption, flushing, and recovery.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       Write Path                            │
//! │                                                             │
//! │  set ──► open Entry (write-through, no fsync)               │
//! │             │ full                                          │
//! │             ▼                                               │
//! │          seal (fsync) ──► FULL queue ──► apply ──► recycle  │
//! │                               │                             │
//! │                      queue at capacity:                     │
//! │                      inline apply (backpressure)            │
//! │                                                             │
//! │  sync ──► seal + apply everything, lwm := hwm, fsync header │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Between syncs the entry files are the authority: recovery replays every
//! record newer than the array file's durable low water mark, in entry
//! `min_scn` order and file order within an entry.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use kozane_core::config::ArrayConfig;
use kozane_core::error::{Error, IoResultExt, Result};
use kozane_core::metrics::Metrics;

use crate::element::Element;
use crate::entry::{entry_file_name, parse_entry_slot, scan_entry_file, Entry, EntryPool, ScannedEntry};
use crate::file::ArrayFile;

/// Controller gluing writes, entries, and water marks together
#[derive(Debug)]
pub struct EntryManager<V: Element> {
    array_file: Arc<Mutex<ArrayFile<V>>>,
    pool: EntryPool<V>,
    lwm_scn: u64,
    hwm_scn: u64,
    metrics: Metrics,
}

impl<V: Element> EntryManager<V> {
    /// Recover pending entries into the array file and build the pool.
    ///
    /// Runs the on-open protocol: scan the slot files, discard entries
    /// already covered by the durable mark, replay the rest oldest-range
    /// first, fsync, and advance both header marks to the recovered end.
    pub fn open(
        config: &ArrayConfig,
        array_file: Arc<Mutex<ArrayFile<V>>>,
        metrics: Metrics,
    ) -> Result<Self> {
        let dir = &config.directory;
        let (file_lwm, file_hwm) = {
            let file = array_file.lock();
            (file.lwm_scn(), file.hwm_scn())
        };

        let mut slots = Vec::new();
        for dirent in
            std::fs::read_dir(dir).io_context(|| format!("failed to list {:?}", dir))?
        {
            let dirent = dirent?;
            let name = dirent.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Some(slot) = parse_entry_slot(name) {
                slots.push(slot);
            }
        }
        slots.sort_unstable();

        // Scan slots; entries fully covered by the durable mark are dead
        let mut pending: Vec<ScannedEntry<V>> = Vec::new();
        for &slot in &slots {
            let path = dir.join(entry_file_name(slot));
            match scan_entry_file::<V>(&path, slot) {
                Ok(scanned) => {
                    if !scanned.records.is_empty() && scanned.max_scn > file_lwm {
                        pending.push(scanned);
                    }
                }
                Err(err @ Error::CorruptEntry { .. }) => {
                    warn!(slot, error = %err, "discarding corrupt entry file");
                }
                Err(err) => return Err(err),
            }
        }
        pending.sort_by_key(|scanned| scanned.min_scn);

        // Replay in file order; on equal SCNs the later record wins
        let mut end = file_hwm.max(file_lwm);
        let mut replayed = 0u64;
        {
            let mut file = array_file.lock();
            for scanned in &pending {
                debug!(
                    slot = scanned.slot,
                    records = scanned.records.len(),
                    kind = ?scanned.kind,
                    truncated = scanned.truncated,
                    "replaying entry"
                );
                for record in &scanned.records {
                    if record.scn <= file_lwm {
                        continue;
                    }
                    if record.index >= file.array_length() {
                        file.set_array_length(config.aligned_length(record.index))?;
                    }
                    file.put(record.index, record.value)?;
                    end = end.max(record.scn);
                    replayed += 1;
                }
            }
            if replayed > 0 {
                file.flush()?;
                info!(replayed, end_scn = end, "replayed entries into array file");
            }
            if (file.lwm_scn(), file.hwm_scn()) != (end, end) {
                file.write_water_marks(end, end)?;
            }
        }
        metrics.record_replayed(replayed);

        // Every slot is recycled; one fresh entry opens
        let pool = EntryPool::open(dir, config.max_entry_size, config.max_entries, &slots)?;

        Ok(Self {
            array_file,
            pool,
            lwm_scn: end,
            hwm_scn: end,
            metrics,
        })
    }

    pub fn lwm_scn(&self) -> u64 {
        self.lwm_scn
    }

    pub fn hwm_scn(&self) -> u64 {
        self.hwm_scn
    }

    /// Append one record to the open entry, rolling to a fresh entry when
    /// the current one fills
    pub fn add_record(&mut self, index: u32, value: V, scn: u64) -> Result<()> {
        if self.pool.current.as_ref().map_or(true, Entry::is_full) {
            self.roll_entry()?;
        }
        let entry = self.pool.current.as_mut().ok_or_else(no_open_entry)?;
        entry.append(index, value, scn)?;
        self.hwm_scn = self.hwm_scn.max(scn);
        self.metrics.record_append();
        Ok(())
    }

    /// Seal the open entry and install a successor, applying the oldest
    /// FULL entries inline while the queue is at capacity (backpressure:
    /// one slot stays reserved for the open entry)
    fn roll_entry(&mut self) -> Result<()> {
        if let Some(mut sealed) = self.pool.current.take() {
            if sealed.is_empty() {
                self.pool.current = Some(sealed);
                return Ok(());
            }
            sealed.seal()?;
            debug!(slot = sealed.slot(), max_scn = sealed.max_scn(), "entry sealed");
            self.pool.full.push_back(sealed);
            self.metrics.record_rollover();
        }

        while self.pool.full.len() >= self.pool.max_entries - 1 {
            self.apply_oldest()?;
            self.metrics.record_inline_apply();
        }

        let next = self.pool.acquire()?.ok_or_else(no_open_entry)?;
        self.pool.current = Some(next);
        Ok(())
    }

    /// Apply the oldest FULL entry, advance the durable mark, and recycle
    /// the entry
    fn apply_oldest(&mut self) -> Result<()> {
        let Some(mut entry) = self.pool.full.pop_front() else {
            return Ok(());
        };
        {
            let mut file = self.array_file.lock();
            entry.apply(&mut file)?;
            let lwm = self.lwm_scn.max(entry.max_scn());
            let hwm = file.hwm_scn().max(lwm);
            file.write_water_marks(lwm, hwm)?;
            self.lwm_scn = lwm;
        }
        self.metrics.record_entry_applied();
        self.pool.retire(entry)?;
        Ok(())
    }

    /// Make everything accepted so far durable in the array file.
    ///
    /// Seals the open entry if non-empty, applies every FULL entry, writes
    /// `lwm = hwm` into the header, and recycles. Idempotent: with nothing
    /// pending this is a no-op.
    pub fn sync(&mut self) -> Result<()> {
        let has_pending = !self.pool.full.is_empty()
            || self.pool.current.as_ref().is_some_and(|e| !e.is_empty());
        if !has_pending && self.lwm_scn == self.hwm_scn {
            return Ok(());
        }

        if self.pool.current.as_ref().is_some_and(|e| !e.is_empty()) {
            if let Some(mut sealed) = self.pool.current.take() {
                sealed.seal()?;
                self.pool.full.push_back(sealed);
            }
        }

        // Apply everything, then commit the marks, then recycle: a crash
        // in between leaves entries whose ranges the durable mark already
        // covers, and recovery discards them
        let mut applied = Vec::new();
        while let Some(mut entry) = self.pool.full.pop_front() {
            {
                let mut file = self.array_file.lock();
                entry.apply(&mut file)?;
            }
            self.metrics.record_entry_applied();
            applied.push(entry);
        }

        // The in-memory mark advances only once the header write lands
        self.array_file
            .lock()
            .write_water_marks(self.hwm_scn, self.hwm_scn)?;
        self.lwm_scn = self.hwm_scn;

        for entry in applied {
            self.pool.retire(entry)?;
        }
        if self.pool.current.is_none() {
            let next = self.pool.acquire()?.ok_or_else(no_open_entry)?;
            self.pool.current = Some(next);
        }

        self.metrics.record_sync();
        info!(scn = self.hwm_scn, "synced");
        Ok(())
    }

    /// Synonym of [`sync`](Self::sync) in the external contract
    pub fn persist(&mut self) -> Result<()> {
        self.sync()
    }

    /// Force both marks; used by recovery resets and the rewind branch of
    /// `save_hwmark`
    pub fn set_water_marks(&mut self, lwm_scn: u64, hwm_scn: u64) -> Result<()> {
        if lwm_scn > hwm_scn {
            return Err(Error::Configuration {
                message: format!("water marks out of order: lwm {} > hwm {}", lwm_scn, hwm_scn),
            });
        }
        self.lwm_scn = lwm_scn;
        self.hwm_scn = hwm_scn;
        self.array_file.lock().write_water_marks(lwm_scn, hwm_scn)
    }

    /// Recycle every entry and reset both marks to zero
    pub fn clear(&mut self) -> Result<()> {
        if let Some(entry) = self.pool.current.take() {
            self.pool.retire(entry)?;
        }
        while let Some(entry) = self.pool.full.pop_front() {
            self.pool.retire(entry)?;
        }
        self.lwm_scn = 0;
        self.hwm_scn = 0;
        let next = self.pool.acquire()?.ok_or_else(no_open_entry)?;
        self.pool.current = Some(next);
        Ok(())
    }

    /// Fsync the open entry without sealing it; its records become
    /// replayable after a crash or close
    pub fn flush_current(&mut self) -> Result<()> {
        if let Some(entry) = self.pool.current.as_mut() {
            entry.flush()?;
        }
        Ok(())
    }
}

fn no_open_entry() -> Error {
    Error::Configuration {
        message: "entry pool has no open entry".to_string(),
    }
}
