//! The recoverable array facade.
//!
//! Combines the on-disk [`ArrayFile`], the [`EntryManager`], and the
//! in-memory [`MemoryArray`] behind the array contract: constant-time
//! reads, logged writes, caller-driven sync, and dynamic power-of-two
//! growth.

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{error, info};

use kozane_core::config::ArrayConfig;
use kozane_core::error::{Error, IoResultExt, Result};
use kozane_core::metrics::{Metrics, MetricsSnapshot};

use crate::element::Element;
use crate::file::{ArrayFile, ARRAY_FILE_NAME};
use crate::manager::EntryManager;
use crate::memory::{ArrayExpandListener, MemoryArray};

/// Lifecycle state of a recoverable array
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Constructed, never opened
    Init,
    /// Mutations and reads permitted
    Open,
    /// Resources released; reopenable
    Closed,
}

/// Bridge that keeps the array file's length aligned with the memory
/// array's capacity
struct FileGrowth<V: Element> {
    array_file: Arc<Mutex<ArrayFile<V>>>,
}

impl<V: Element> ArrayExpandListener for FileGrowth<V> {
    fn array_expanded(&self, new_length: u32) -> Result<()> {
        let mut file = self.array_file.lock();
        if file.array_length() < new_length {
            file.set_array_length(new_length)?;
        }
        Ok(())
    }
}

#[derive(Debug)]
struct Inner<V: Element> {
    length: u32,
    memory: MemoryArray<V>,
    array_file: Arc<Mutex<ArrayFile<V>>>,
    manager: EntryManager<V>,
}

/// A persistent, recoverable, dynamically growing primitive array
#[derive(Debug)]
pub struct RecoverableArray<V: Element> {
    config: ArrayConfig,
    metrics: Metrics,
    mode: Mode,
    inner: Option<Inner<V>>,
}

/// Recoverable array of `i32` cells
pub type RecoverableIntArray = RecoverableArray<i32>;
/// Recoverable array of `i64` cells
pub type RecoverableLongArray = RecoverableArray<i64>;

impl<V: Element> RecoverableArray<V> {
    /// Create an unopened array over `config`; call
    /// [`open`](Self::open) before use
    pub fn new(config: ArrayConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            metrics: Metrics::new(),
            mode: Mode::Init,
            inner: None,
        })
    }

    /// Create and open in one step
    pub fn open_with(config: ArrayConfig) -> Result<Self> {
        let mut array = Self::new(config)?;
        array.open()?;
        Ok(array)
    }

    fn inner(&self, operation: &'static str) -> Result<&Inner<V>> {
        self.inner.as_ref().ok_or(Error::NotOpen { operation })
    }

    fn inner_mut(&mut self, operation: &'static str) -> Result<&mut Inner<V>> {
        self.inner.as_mut().ok_or(Error::NotOpen { operation })
    }

    /// Open the array: create or validate the array file, recover pending
    /// entries, bulk load into memory, and wire the growth bridge.
    /// Idempotent when already open.
    pub fn open(&mut self) -> Result<()> {
        if self.mode == Mode::Open {
            return Ok(());
        }

        let directory = self.config.directory.clone();
        std::fs::create_dir_all(&directory)
            .io_context(|| format!("failed to create array directory {:?}", directory))?;

        let path = directory.join(ARRAY_FILE_NAME);
        let array_file = if path.exists() {
            ArrayFile::<V>::open(&path)?
        } else {
            ArrayFile::<V>::create(&path, self.config.sub_array_size())?
        };

        let length = array_file.array_length();
        if length % self.config.sub_array_size() != 0 {
            return Err(Error::CorruptHeader {
                message: format!(
                    "array length {} is not a multiple of the sub-array size {}",
                    length,
                    self.config.sub_array_size()
                ),
            });
        }
        let array_file = Arc::new(Mutex::new(array_file));

        // Recovery replays surviving entries into the file before the load
        let manager =
            EntryManager::open(&self.config, Arc::clone(&array_file), self.metrics.clone())?;

        let mut memory = MemoryArray::new(self.config.sub_array_bits);
        if length > 0 {
            memory.expand_capacity(length - 1)?;
        }
        array_file.lock().load(&mut memory)?;
        // The bridge is wired only after the load, so load-time expansion
        // does not touch the file
        memory.set_expand_listener(Box::new(FileGrowth {
            array_file: Arc::clone(&array_file),
        }));

        info!(
            length,
            max_entry_size = self.config.max_entry_size,
            max_entries = self.config.max_entries,
            directory = ?directory,
            "opened recoverable array"
        );

        self.inner = Some(Inner {
            length,
            memory,
            array_file,
            manager,
        });
        self.mode = Mode::Open;
        Ok(())
    }

    /// Flush the open entry and the array file, then release resources.
    /// Pending entries are not applied; the next [`open`](Self::open)
    /// replays them. Idempotent when already closed.
    pub fn close(&mut self) -> Result<()> {
        if self.mode == Mode::Closed {
            return Ok(());
        }
        if let Some(mut inner) = self.inner.take() {
            inner.manager.flush_current()?;
            inner.array_file.lock().flush()?;
            info!(length = inner.length, "closed recoverable array");
        }
        self.mode = Mode::Closed;
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.mode == Mode::Open
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Current array length; 0 while closed
    pub fn length(&self) -> u32 {
        self.inner.as_ref().map_or(0, |inner| inner.length)
    }

    /// High water mark: every accepted write has SCN at or below this
    pub fn hwm_scn(&self) -> Result<u64> {
        Ok(self.inner("hwm_scn")?.manager.hwm_scn())
    }

    /// Low water mark: every write at or below this SCN is durable in the
    /// array file
    pub fn lwm_scn(&self) -> Result<u64> {
        Ok(self.inner("lwm_scn")?.manager.lwm_scn())
    }

    /// Constant-time read of cell `index`
    pub fn get(&self, index: u32) -> Result<V> {
        let inner = self.inner("get")?;
        if index >= inner.length {
            return Err(Error::IndexOutOfRange {
                index,
                length: inner.length,
            });
        }
        Ok(inner.memory.get(index))
    }

    /// Write cell `index` at version `scn`, growing the array as needed.
    ///
    /// The record is logged before the memory cell is touched; on a failed
    /// append the in-memory state is unchanged.
    pub fn set(&mut self, index: u32, value: V, scn: u64) -> Result<()> {
        self.inner("set")?;
        if index >= self.length() {
            self.expand_capacity(index)?;
        }
        let inner = self.inner_mut("set")?;
        if index >= inner.length {
            // Growth clamped at the maximum addressable length
            return Err(Error::IndexOutOfRange {
                index,
                length: inner.length,
            });
        }
        inner.manager.add_record(index, value, scn)?;
        inner.memory.set(index, value);
        Ok(())
    }

    /// Grow memory and file so that `index` is addressable; the new length
    /// is the next sub-array boundary. No-op when already covered.
    pub fn expand_capacity(&mut self, index: u32) -> Result<()> {
        let new_length = self.config.aligned_length(index);
        let metrics = self.metrics.clone();
        let inner = self.inner_mut("expand_capacity")?;
        if new_length <= inner.length {
            return Ok(());
        }

        // Memory first; the growth bridge follows with the file. The
        // observable length advances only once both have grown.
        inner.memory.expand_capacity(new_length - 1)?;
        {
            let mut file = inner.array_file.lock();
            if file.array_length() < new_length {
                file.set_array_length(new_length)?;
            }
        }
        inner.length = new_length;
        metrics.record_expansion();
        info!(length = new_length, "expanded recoverable array");
        Ok(())
    }

    /// Apply all pending entries and fsync; afterwards `lwm == hwm` and
    /// the array file reflects every prior write
    pub fn sync(&mut self) -> Result<()> {
        self.inner_mut("sync")?.manager.sync()
    }

    /// Synonym of [`sync`](Self::sync)
    pub fn persist(&mut self) -> Result<()> {
        self.inner_mut("persist")?.manager.persist()
    }

    /// Move the high water mark to `end_of_period`.
    ///
    /// Advancing records a no-op re-write of cell 0 at the new SCN, so the
    /// advance rides the normal log path. Rewinding below the durable mark
    /// syncs first, then forces both marks to `end_of_period`.
    pub fn save_hwmark(&mut self, end_of_period: u64) -> Result<()> {
        let hwm = self.hwm_scn()?;
        if hwm < end_of_period {
            let value = self.get(0)?;
            self.set(0, value, end_of_period)?;
        } else if 0 < end_of_period && end_of_period < self.lwm_scn()? {
            self.sync()?;
            self.inner_mut("save_hwmark")?
                .manager
                .set_water_marks(end_of_period, end_of_period)?;
        }
        Ok(())
    }

    /// Zero every cell, recycle every entry, and reset both marks to zero.
    /// The length is preserved.
    pub fn clear(&mut self) -> Result<()> {
        let inner = self.inner_mut("clear")?;
        inner.memory.clear();
        inner.manager.clear()?;
        if let Err(err) = inner.array_file.lock().reset(0) {
            error!(error = %err, "failed to reset array file");
            return Err(err);
        }
        info!("cleared recoverable array");
        Ok(())
    }

    /// Counters for this array
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// The directory holding this array's files
    pub fn directory(&self) -> &PathBuf {
        &self.config.directory
    }
}
