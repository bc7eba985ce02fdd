use kozane_core::error::{Error, Result};

use crate::element::Element;

pub const ENTRY_MAGIC: &[u8; 4] = b"KZEN";
pub const ENTRY_VERSION: u32 = 1;
pub const ENTRY_HEADER_SIZE: u64 = 32;

/// Kind of records an entry carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum EntryKind {
    /// Regular array writes
    Data = 1,

    /// Address rewrites produced by segment compaction in the stores
    /// layered above the array. Accepted on replay; this crate's write
    /// path only produces `Data`.
    Compaction = 2,
}

impl TryFrom<u32> for EntryKind {
    type Error = Error;

    fn try_from(value: u32) -> Result<Self> {
        match value {
            1 => Ok(EntryKind::Data),
            2 => Ok(EntryKind::Compaction),
            _ => Err(Error::CorruptEntry {
                message: format!("invalid entry kind: {}", value),
            }),
        }
    }
}

/// Lifecycle state of an entry
///
/// Entries cycle OPEN → FULL → APPLIED → RECYCLED → OPEN.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    /// The unique entry currently absorbing writes
    Open,
    /// Sealed and durable, awaiting apply to the array file
    Full,
    /// Contents written through to the array file
    Applied,
    /// Truncated and waiting on the free list
    Recycled,
}

/// One logged write: `(index, value, scn)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryRecord<V: Element> {
    pub index: u32,
    pub value: V,
    pub scn: u64,
}

/// Packed on-disk size of one record
pub const fn record_size<V: Element>() -> usize {
    4 + V::WIDTH + 8
}

/// File name of an entry slot, `entry_<N>.dat`
pub fn entry_file_name(slot: u32) -> String {
    format!("entry_{}.dat", slot)
}

/// Parse the slot number out of an entry file name
pub fn parse_entry_slot(file_name: &str) -> Option<u32> {
    file_name
        .strip_prefix("entry_")?
        .strip_suffix(".dat")?
        .parse()
        .ok()
}
