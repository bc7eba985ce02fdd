//! Entry file codec.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Entry File Layout                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Header (32 bytes, big-endian)                              │
//! │    Magic (4 bytes): "KZEN"                                  │
//! │    Version (4 bytes)                                        │
//! │    Kind (4 bytes): data / compaction                        │
//! │    Record Count (4 bytes; 0 until sealed)                   │
//! │    Min SCN (8 bytes)                                        │
//! │    Max SCN (8 bytes)                                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Records, packed: index (4) | value (width) | scn (8)       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! An open entry carries a placeholder header (count 0); the count and SCN
//! range are patched in when the entry seals. Scanning therefore trusts the
//! header count only when it is non-zero and otherwise reads records to end
//! of file, which is exactly the shape a crash leaves behind.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use byteorder::{BigEndian, ByteOrder, ReadBytesExt, WriteBytesExt};
use tracing::warn;

use kozane_core::error::{Error, IoResultExt, Result};

use crate::element::Element;

use super::types::{
    record_size, EntryKind, EntryRecord, ENTRY_HEADER_SIZE, ENTRY_MAGIC, ENTRY_VERSION,
};

// Header field offsets
const OFFSET_COUNT: u64 = 12;

pub(crate) fn write_placeholder_header(file: &mut File, kind: EntryKind) -> Result<()> {
    file.write_all(ENTRY_MAGIC)?;
    file.write_u32::<BigEndian>(ENTRY_VERSION)?;
    file.write_u32::<BigEndian>(kind as u32)?;
    file.write_u32::<BigEndian>(0)?; // Record count (patched at seal)
    file.write_u64::<BigEndian>(0)?; // Min SCN
    file.write_u64::<BigEndian>(0)?; // Max SCN
    Ok(())
}

/// Patch count and SCN range into the header before the seal fsync
pub(crate) fn finalize_header(
    file: &mut File,
    count: u32,
    min_scn: u64,
    max_scn: u64,
) -> Result<()> {
    file.seek(SeekFrom::Start(OFFSET_COUNT))?;
    file.write_u32::<BigEndian>(count)?;
    file.write_u64::<BigEndian>(min_scn)?;
    file.write_u64::<BigEndian>(max_scn)?;
    file.seek(SeekFrom::End(0))?;
    Ok(())
}

pub(crate) fn write_record<V: Element>(file: &mut File, record: &EntryRecord<V>) -> Result<()> {
    let mut buf = [0u8; 24];
    BigEndian::write_u32(&mut buf[0..4], record.index);
    record.value.write_to(&mut buf[4..]);
    BigEndian::write_u64(&mut buf[4 + V::WIDTH..], record.scn);
    file.write_all(&buf[..record_size::<V>()])?;
    Ok(())
}

/// A fully scanned entry file
#[derive(Debug)]
pub(crate) struct ScannedEntry<V: Element> {
    pub slot: u32,
    pub kind: EntryKind,
    pub records: Vec<EntryRecord<V>>,
    pub min_scn: u64,
    pub max_scn: u64,
    /// A short or torn trailing record was dropped
    pub truncated: bool,
}

/// Scan one entry file for recovery.
///
/// Returns the record prefix that survives: for a sealed entry up to the
/// header count, for an unsealed entry up to end of file. A torn trailing
/// record truncates the scan. A zero-length file reads as empty; a
/// malformed header is a [`Error::CorruptEntry`].
pub(crate) fn scan_entry_file<V: Element>(path: &Path, slot: u32) -> Result<ScannedEntry<V>> {
    let mut file = File::open(path).io_context(|| format!("failed to open entry {:?}", path))?;
    let file_len = file.seek(SeekFrom::End(0))?;
    file.seek(SeekFrom::Start(0))?;

    if file_len == 0 {
        // Slot created but never initialized
        return Ok(ScannedEntry {
            slot,
            kind: EntryKind::Data,
            records: Vec::new(),
            min_scn: 0,
            max_scn: 0,
            truncated: false,
        });
    }
    if file_len < ENTRY_HEADER_SIZE {
        return Err(Error::CorruptEntry {
            message: format!("{:?} is shorter than the header", path),
        });
    }

    let mut magic = [0u8; 4];
    file.read_exact(&mut magic)?;
    if &magic != ENTRY_MAGIC {
        return Err(Error::CorruptEntry {
            message: format!("bad magic in {:?}", path),
        });
    }
    let version = file.read_u32::<BigEndian>()?;
    if version != ENTRY_VERSION {
        return Err(Error::CorruptEntry {
            message: format!("unsupported entry version {} in {:?}", version, path),
        });
    }
    let kind = EntryKind::try_from(file.read_u32::<BigEndian>()?)?;
    let sealed_count = file.read_u32::<BigEndian>()? as usize;
    let _header_min = file.read_u64::<BigEndian>()?;
    let _header_max = file.read_u64::<BigEndian>()?;

    let available = (file_len - ENTRY_HEADER_SIZE) / record_size::<V>() as u64;
    let torn_tail = (file_len - ENTRY_HEADER_SIZE) % record_size::<V>() as u64 != 0;
    // A sealed count is authoritative; an unsealed entry reads to EOF
    let to_read = if sealed_count > 0 {
        (sealed_count as u64).min(available)
    } else {
        available
    };
    let short_of_sealed = sealed_count > 0 && (sealed_count as u64) > available;

    let mut records = Vec::with_capacity(to_read as usize);
    let mut min_scn = u64::MAX;
    let mut max_scn = 0u64;
    let mut buf = [0u8; 24];
    for _ in 0..to_read {
        file.read_exact(&mut buf[..record_size::<V>()])?;
        let record = EntryRecord {
            index: BigEndian::read_u32(&buf[0..4]),
            value: V::read_from(&buf[4..]),
            scn: BigEndian::read_u64(&buf[4 + V::WIDTH..]),
        };
        min_scn = min_scn.min(record.scn);
        max_scn = max_scn.max(record.scn);
        records.push(record);
    }

    let truncated = torn_tail || short_of_sealed;
    if truncated {
        warn!(
            path = ?path,
            kept = records.len(),
            sealed_count,
            "torn entry file, dropping trailing record(s)"
        );
    }

    Ok(ScannedEntry {
        slot,
        kind,
        min_scn: if records.is_empty() { 0 } else { min_scn },
        max_scn,
        records,
        truncated,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::OpenOptions;
    use tempfile::TempDir;

    fn record(index: u32, value: i64, scn: u64) -> EntryRecord<i64> {
        EntryRecord { index, value, scn }
    }

    fn write_entry(path: &Path, records: &[EntryRecord<i64>], seal: bool) {
        let mut file = OpenOptions::new()
            .create(true)
            .truncate(true)
            .read(true)
            .write(true)
            .open(path)
            .unwrap();
        write_placeholder_header(&mut file, EntryKind::Data).unwrap();
        for r in records {
            write_record(&mut file, r).unwrap();
        }
        if seal {
            let min = records.iter().map(|r| r.scn).min().unwrap_or(0);
            let max = records.iter().map(|r| r.scn).max().unwrap_or(0);
            finalize_header(&mut file, records.len() as u32, min, max).unwrap();
        }
    }

    #[test]
    fn test_scan_sealed_entry() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("entry_0.dat");
        write_entry(&path, &[record(1, 10, 5), record(2, 20, 6)], true);

        let scanned = scan_entry_file::<i64>(&path, 0).unwrap();
        assert_eq!(scanned.records.len(), 2);
        assert_eq!(scanned.min_scn, 5);
        assert_eq!(scanned.max_scn, 6);
        assert!(!scanned.truncated);
    }

    #[test]
    fn test_scan_unsealed_entry_reads_to_eof() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("entry_1.dat");
        write_entry(&path, &[record(7, 70, 9)], false);

        let scanned = scan_entry_file::<i64>(&path, 1).unwrap();
        assert_eq!(scanned.records.len(), 1);
        assert_eq!(scanned.records[0].index, 7);
        assert_eq!(scanned.max_scn, 9);
    }

    #[test]
    fn test_scan_drops_torn_tail() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("entry_2.dat");
        write_entry(&path, &[record(1, 10, 5), record(2, 20, 6)], false);

        // Chop the last record in half
        let full = std::fs::metadata(&path).unwrap().len();
        let file = OpenOptions::new().write(true).open(&path).unwrap();
        file.set_len(full - record_size::<i64>() as u64 / 2).unwrap();

        let scanned = scan_entry_file::<i64>(&path, 2).unwrap();
        assert_eq!(scanned.records.len(), 1);
        assert_eq!(scanned.records[0].scn, 5);
        assert!(scanned.truncated);
    }

    #[test]
    fn test_scan_rejects_garbage_header() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("entry_3.dat");
        std::fs::write(&path, vec![0xAA; 64]).unwrap();

        let err = scan_entry_file::<i64>(&path, 3).unwrap_err();
        assert_eq!(err.error_code(), "CORRUPT_ENTRY");
    }

    #[test]
    fn test_scan_empty_file_is_empty_entry() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("entry_4.dat");
        std::fs::write(&path, b"").unwrap();

        let scanned = scan_entry_file::<i64>(&path, 4).unwrap();
        assert!(scanned.records.is_empty());
        assert!(!scanned.truncated);
    }
}
