//! # Kozane Array Engine
//!
//! A persistent, recoverable primitive-value array: a fixed-width typed
//! array of `i32` or `i64` cells, addressable by a 32-bit index, durable
//! through a write-ahead entry log, growing dynamically in power-of-two
//! sub-arrays over an on-disk data file.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Write Path                             │
//! │                                                             │
//! │  set(index, value, scn) ──┬──► open Entry (log record)      │
//! │                           └──► MemoryArray (cell update)    │
//! │                                      │                      │
//! │  sync ──► apply FULL entries ──► ArrayFile + water marks    │
//! └─────────────────────────────────────────────────────────────┘
//!
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       Read Path                             │
//! │                                                             │
//! │  get(index) ──► segments[index >> bits][index & mask]       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! On open, entries newer than the array file's durable low water mark
//! are replayed into the file, then the file is bulk loaded into memory;
//! a crash at any point loses at most the records that never reached an
//! entry file.
//!
//! ```no_run
//! use kozane_array::RecoverableLongArray;
//! use kozane_core::ArrayConfig;
//!
//! # fn main() -> kozane_core::Result<()> {
//! let mut array = RecoverableLongArray::open_with(ArrayConfig::new("./data/scores"))?;
//! array.set(42, 1_000, 1)?;
//! array.sync()?;
//! assert_eq!(array.get(42)?, 1_000);
//! # Ok(())
//! # }
//! ```

pub mod element;
pub mod entry;
pub mod file;
pub mod manager;
pub mod memory;
pub mod recoverable;

pub use element::Element;
pub use entry::{EntryKind, EntryRecord, EntryState};
pub use file::{ArrayFile, ARRAY_FILE_NAME};
pub use manager::EntryManager;
pub use memory::{ArrayExpandListener, MemoryArray};
pub use recoverable::{Mode, RecoverableArray, RecoverableIntArray, RecoverableLongArray};
