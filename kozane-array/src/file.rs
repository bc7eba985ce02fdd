//! On-disk array file.
//!
//! File Format
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Array File Layout                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Header (40 bytes, big-endian)                              │
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │ Magic (4 bytes): "KZAF"                             │    │
//! │  │ Version (4 bytes)                                   │    │
//! │  │ Element Width (4 bytes)                             │    │
//! │  │ Reserved (4 bytes)                                  │    │
//! │  │ Low Water Mark SCN (8 bytes)                        │    │
//! │  │ High Water Mark SCN (8 bytes)                       │    │
//! │  │ Array Length (4 bytes)                              │    │
//! │  │ Reserved (4 bytes)                                  │    │
//! │  └─────────────────────────────────────────────────────┘    │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Element 0 .. Element length-1 (width bytes each, packed)   │
//! └─────────────────────────────────────────────────────────────┘
//!
//! Element `i` lives at byte offset `40 + i * width`. The header water
//! marks are only rewritten through [`ArrayFile::write_water_marks`],
//! which fsyncs; element writes are batched by the caller and made
//! durable by [`ArrayFile::flush`].

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use byteorder::{BigEndian, ByteOrder, ReadBytesExt, WriteBytesExt};
use bytes::{BufMut, BytesMut};
use tracing::{debug, info};

use kozane_core::error::{Error, IoResultExt, Result};

use crate::element::Element;
use crate::memory::MemoryArray;

pub const ARRAY_FILE_MAGIC: &[u8; 4] = b"KZAF";
pub const ARRAY_FILE_VERSION: u32 = 1;
pub const ARRAY_FILE_HEADER_SIZE: u64 = 40;

/// Name of the array file within an array directory
pub const ARRAY_FILE_NAME: &str = "indexes.dat";

// Header field offsets
const OFFSET_WATER_MARKS: u64 = 16;
const OFFSET_LENGTH: u64 = 32;

/// The dense on-disk backing store of an array
#[derive(Debug)]
pub struct ArrayFile<V: Element> {
    path: PathBuf,
    file: File,
    length: u32,
    lwm_scn: u64,
    hwm_scn: u64,
    _marker: PhantomData<V>,
}

impl<V: Element> ArrayFile<V> {
    /// Allocate a new array file of `length` zero elements with both water
    /// marks at 0
    pub fn create(path: &Path, length: u32) -> Result<Self> {
        let mut file = OpenOptions::new()
            .create(true)
            .truncate(true)
            .read(true)
            .write(true)
            .open(path)
            .io_context(|| format!("failed to create array file {:?}", path))?;

        file.write_all(ARRAY_FILE_MAGIC)?;
        file.write_u32::<BigEndian>(ARRAY_FILE_VERSION)?;
        file.write_u32::<BigEndian>(V::WIDTH as u32)?;
        file.write_u32::<BigEndian>(0)?; // Reserved
        file.write_u64::<BigEndian>(0)?; // lwm_scn
        file.write_u64::<BigEndian>(0)?; // hwm_scn
        file.write_u32::<BigEndian>(length)?;
        file.write_u32::<BigEndian>(0)?; // Reserved

        // The body is sparse zero-fill
        file.set_len(ARRAY_FILE_HEADER_SIZE + length as u64 * V::WIDTH as u64)?;
        file.sync_all()?;

        info!(path = ?path, length, width = V::WIDTH, "created array file");

        Ok(Self {
            path: path.to_path_buf(),
            file,
            length,
            lwm_scn: 0,
            hwm_scn: 0,
            _marker: PhantomData,
        })
    }

    /// Open an existing array file, validating its header
    pub fn open(path: &Path) -> Result<Self> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .io_context(|| format!("failed to open array file {:?}", path))?;

        let mut magic = [0u8; 4];
        file.read_exact(&mut magic).map_err(|_| Error::CorruptHeader {
            message: format!("{:?} is shorter than the header", path),
        })?;
        if &magic != ARRAY_FILE_MAGIC {
            return Err(Error::CorruptHeader {
                message: format!("bad magic in {:?}", path),
            });
        }

        let version = file.read_u32::<BigEndian>()?;
        if version != ARRAY_FILE_VERSION {
            return Err(Error::CorruptHeader {
                message: format!("unsupported array file version {}", version),
            });
        }

        let width = file.read_u32::<BigEndian>()?;
        if width as usize != V::WIDTH {
            return Err(Error::CorruptHeader {
                message: format!(
                    "element width mismatch: file has {}, array expects {}",
                    width,
                    V::WIDTH
                ),
            });
        }

        let _reserved = file.read_u32::<BigEndian>()?;
        let lwm_scn = file.read_u64::<BigEndian>()?;
        let hwm_scn = file.read_u64::<BigEndian>()?;
        let length = file.read_u32::<BigEndian>()?;
        let _reserved = file.read_u32::<BigEndian>()?;

        if lwm_scn > hwm_scn {
            return Err(Error::CorruptHeader {
                message: format!("water marks out of order: lwm {} > hwm {}", lwm_scn, hwm_scn),
            });
        }

        let expected = ARRAY_FILE_HEADER_SIZE + length as u64 * V::WIDTH as u64;
        let actual = file.seek(SeekFrom::End(0))?;
        if actual < expected {
            return Err(Error::CorruptHeader {
                message: format!(
                    "array file {:?} truncated: {} bytes, header claims {}",
                    path, actual, expected
                ),
            });
        }

        debug!(path = ?path, length, lwm_scn, hwm_scn, "opened array file");

        Ok(Self {
            path: path.to_path_buf(),
            file,
            length,
            lwm_scn,
            hwm_scn,
            _marker: PhantomData,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn array_length(&self) -> u32 {
        self.length
    }

    pub fn lwm_scn(&self) -> u64 {
        self.lwm_scn
    }

    pub fn hwm_scn(&self) -> u64 {
        self.hwm_scn
    }

    fn element_offset(index: u32) -> u64 {
        ARRAY_FILE_HEADER_SIZE + index as u64 * V::WIDTH as u64
    }

    /// Bulk load the file body into a memory array of the same length
    pub fn load(&mut self, memory: &mut MemoryArray<V>) -> Result<()> {
        if memory.length() != self.length {
            return Err(Error::Configuration {
                message: format!(
                    "cannot load: memory length {} != file length {}",
                    memory.length(),
                    self.length
                ),
            });
        }

        self.file.seek(SeekFrom::Start(ARRAY_FILE_HEADER_SIZE))?;
        let mut buf = vec![0u8; memory.sub_array_size() as usize * V::WIDTH];
        for seg in 0..memory.segment_count() {
            self.file
                .read_exact(&mut buf)
                .io_context(|| format!("short read loading {:?}", self.path))?;
            let segment = memory.segment_mut(seg);
            for (i, cell) in segment.iter_mut().enumerate() {
                *cell = V::read_from(&buf[i * V::WIDTH..]);
            }
        }
        Ok(())
    }

    /// Overwrite a single element. No fsync; callers batch and
    /// [`flush`](Self::flush).
    pub fn put(&mut self, index: u32, value: V) -> Result<()> {
        let mut buf = [0u8; 8];
        value.write_to(&mut buf);
        self.file.seek(SeekFrom::Start(Self::element_offset(index)))?;
        self.file.write_all(&buf[..V::WIDTH])?;
        Ok(())
    }

    /// Apply an ordered batch of writes.
    ///
    /// Runs of adjacent indexes are coalesced into a single positioned
    /// write; batch order is preserved, so the last value recorded for an
    /// index is the one that lands.
    pub fn put_bulk(&mut self, records: &[(u32, V)]) -> Result<()> {
        let mut buf = BytesMut::new();
        let mut run_start: Option<u32> = None;
        let mut prev_index = 0u32;

        for &(index, value) in records {
            match run_start {
                Some(_) if index == prev_index.wrapping_add(1) => {}
                Some(start) => {
                    self.write_run(start, &buf)?;
                    buf.clear();
                    run_start = Some(index);
                }
                None => run_start = Some(index),
            }
            let mut cell = [0u8; 8];
            value.write_to(&mut cell);
            buf.put_slice(&cell[..V::WIDTH]);
            prev_index = index;
        }

        if let Some(start) = run_start {
            self.write_run(start, &buf)?;
        }
        Ok(())
    }

    fn write_run(&mut self, start: u32, bytes: &[u8]) -> Result<()> {
        self.file.seek(SeekFrom::Start(Self::element_offset(start)))?;
        self.file.write_all(bytes)?;
        Ok(())
    }

    /// Grow (zero-filling the tail) or truncate the element body. The new
    /// length is durable before this returns.
    pub fn set_array_length(&mut self, new_length: u32) -> Result<()> {
        if new_length == self.length {
            return Ok(());
        }
        self.file
            .set_len(ARRAY_FILE_HEADER_SIZE + new_length as u64 * V::WIDTH as u64)?;
        self.file.seek(SeekFrom::Start(OFFSET_LENGTH))?;
        self.file.write_u32::<BigEndian>(new_length)?;
        self.file.sync_all()?;

        info!(path = ?self.path, old = self.length, new = new_length, "array file resized");
        self.length = new_length;
        Ok(())
    }

    /// Update the header water marks and fsync
    pub fn write_water_marks(&mut self, lwm_scn: u64, hwm_scn: u64) -> Result<()> {
        debug_assert!(lwm_scn <= hwm_scn);
        let mut buf = [0u8; 16];
        BigEndian::write_u64(&mut buf[0..8], lwm_scn);
        BigEndian::write_u64(&mut buf[8..16], hwm_scn);
        self.file.seek(SeekFrom::Start(OFFSET_WATER_MARKS))?;
        self.file.write_all(&buf)?;
        self.file.sync_all()?;

        self.lwm_scn = lwm_scn;
        self.hwm_scn = hwm_scn;
        Ok(())
    }

    /// Fsync file data and metadata
    pub fn flush(&mut self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }

    /// Zero the element body (length unchanged) and reset both water marks
    /// to `lwm_scn`
    pub fn reset(&mut self, lwm_scn: u64) -> Result<()> {
        // Truncating to the header and re-extending zero-fills the body
        self.file.set_len(ARRAY_FILE_HEADER_SIZE)?;
        self.file
            .set_len(ARRAY_FILE_HEADER_SIZE + self.length as u64 * V::WIDTH as u64)?;
        self.write_water_marks(lwm_scn, lwm_scn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_create_open_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(ARRAY_FILE_NAME);

        {
            let mut file = ArrayFile::<i64>::create(&path, 16).unwrap();
            file.put(3, 300).unwrap();
            file.put(0, -1).unwrap();
            file.write_water_marks(5, 9).unwrap();
        }

        let mut file = ArrayFile::<i64>::open(&path).unwrap();
        assert_eq!(file.array_length(), 16);
        assert_eq!(file.lwm_scn(), 5);
        assert_eq!(file.hwm_scn(), 9);

        let mut memory = MemoryArray::<i64>::new(4);
        file.load(&mut memory).unwrap();
        assert_eq!(memory.get(3), 300);
        assert_eq!(memory.get(0), -1);
        assert_eq!(memory.get(7), 0);
    }

    #[test]
    fn test_width_mismatch_is_corrupt() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(ARRAY_FILE_NAME);
        ArrayFile::<i64>::create(&path, 16).unwrap();

        let err = ArrayFile::<i32>::open(&path).unwrap_err();
        assert_eq!(err.error_code(), "CORRUPT_HEADER");
    }

    #[test]
    fn test_bad_magic_is_corrupt() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(ARRAY_FILE_NAME);
        std::fs::write(&path, b"not an array file at all....................").unwrap();

        let err = ArrayFile::<i64>::open(&path).unwrap_err();
        assert_eq!(err.error_code(), "CORRUPT_HEADER");
    }

    #[test]
    fn test_resize_zero_fills_and_persists() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(ARRAY_FILE_NAME);

        {
            let mut file = ArrayFile::<i32>::create(&path, 16).unwrap();
            file.put(15, 7).unwrap();
            file.set_array_length(32).unwrap();
        }

        let mut file = ArrayFile::<i32>::open(&path).unwrap();
        assert_eq!(file.array_length(), 32);
        let mut memory = MemoryArray::<i32>::new(4);
        memory.expand_capacity(31).unwrap();
        file.load(&mut memory).unwrap();
        assert_eq!(memory.get(15), 7);
        assert_eq!(memory.get(16), 0);
        assert_eq!(memory.get(31), 0);
    }

    #[test]
    fn test_put_bulk_last_value_wins() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(ARRAY_FILE_NAME);

        let mut file = ArrayFile::<i64>::create(&path, 16).unwrap();
        // Adjacent run, a gap, and a duplicate index
        file.put_bulk(&[(0, 1), (1, 2), (2, 3), (9, 90), (0, 100)]).unwrap();
        file.flush().unwrap();

        let mut memory = MemoryArray::<i64>::new(4);
        file.load(&mut memory).unwrap();
        assert_eq!(memory.get(0), 100);
        assert_eq!(memory.get(1), 2);
        assert_eq!(memory.get(2), 3);
        assert_eq!(memory.get(9), 90);
    }

    #[test]
    fn test_reset_zeroes_body_and_marks() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(ARRAY_FILE_NAME);

        let mut file = ArrayFile::<i64>::create(&path, 16).unwrap();
        file.put(4, 44).unwrap();
        file.write_water_marks(3, 3).unwrap();
        file.reset(0).unwrap();

        assert_eq!(file.array_length(), 16);
        assert_eq!(file.lwm_scn(), 0);
        assert_eq!(file.hwm_scn(), 0);
        let mut memory = MemoryArray::<i64>::new(4);
        file.load(&mut memory).unwrap();
        assert_eq!(memory.get(4), 0);
    }
}
