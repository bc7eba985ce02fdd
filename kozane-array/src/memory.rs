//! In-memory segmented array.
//!
//! Cells live in fixed-size sub-arrays of `1 << sub_array_bits` elements.
//! A read resolves to `segments[i >> bits][i & mask]`. Growth appends
//! zero-filled sub-arrays; existing sub-arrays are boxed slices that are
//! never moved or reallocated, so a reference into a segment stays valid
//! across growth.

use std::fmt;

use tracing::debug;

use kozane_core::error::Result;

use crate::element::Element;

/// Observer of memory-array growth.
///
/// The facade registers a single listener that keeps the on-disk array
/// file's length aligned with the in-memory capacity.
pub trait ArrayExpandListener: Send {
    /// Called after sub-arrays were appended; `new_length` is the grown
    /// cell count
    fn array_expanded(&self, new_length: u32) -> Result<()>;
}

/// The in-memory segmented view of an array
pub struct MemoryArray<V: Element> {
    sub_array_bits: u32,
    sub_array_mask: u32,
    segments: Vec<Box<[V]>>,
    listener: Option<Box<dyn ArrayExpandListener>>,
}

impl<V: Element> fmt::Debug for MemoryArray<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryArray")
            .field("sub_array_bits", &self.sub_array_bits)
            .field("sub_array_mask", &self.sub_array_mask)
            .field("segments", &self.segments)
            .field("listener", &self.listener.is_some())
            .finish()
    }
}

impl<V: Element> MemoryArray<V> {
    /// Create a memory array with a single zero-filled sub-array
    pub fn new(sub_array_bits: u32) -> Self {
        let mut array = Self {
            sub_array_bits,
            sub_array_mask: (1 << sub_array_bits) - 1,
            segments: Vec::new(),
            listener: None,
        };
        array.segments.push(array.new_segment());
        array
    }

    fn new_segment(&self) -> Box<[V]> {
        vec![V::default(); 1 << self.sub_array_bits].into_boxed_slice()
    }

    /// Cells per sub-array
    pub fn sub_array_size(&self) -> u32 {
        1 << self.sub_array_bits
    }

    /// Current cell count; always a multiple of the sub-array size
    pub fn length(&self) -> u32 {
        ((self.segments.len() as u64) << self.sub_array_bits) as u32
    }

    /// Read the cell at `index`. Callers bound `index` by
    /// [`length`](Self::length); an out-of-range index is a programming
    /// error and panics.
    pub fn get(&self, index: u32) -> V {
        self.segments[(index >> self.sub_array_bits) as usize][(index & self.sub_array_mask) as usize]
    }

    /// Write the cell at `index` in place
    pub fn set(&mut self, index: u32, value: V) {
        self.segments[(index >> self.sub_array_bits) as usize]
            [(index & self.sub_array_mask) as usize] = value;
    }

    /// Grow the segment list so that `index` is addressable, appending
    /// zero-filled sub-arrays and notifying the registered listener.
    /// Never shrinks.
    pub fn expand_capacity(&mut self, index: u32) -> Result<()> {
        let needed = (index >> self.sub_array_bits) as usize + 1;
        if needed <= self.segments.len() {
            return Ok(());
        }

        while self.segments.len() < needed {
            let segment = self.new_segment();
            self.segments.push(segment);
        }
        debug!(segments = self.segments.len(), length = self.length(), "memory array expanded");

        if let Some(listener) = &self.listener {
            listener.array_expanded(self.length())?;
        }
        Ok(())
    }

    /// Zero every cell; the segment count is unchanged
    pub fn clear(&mut self) {
        for segment in &mut self.segments {
            segment.fill(V::default());
        }
    }

    /// Register the growth observer (one slot; replaces any previous)
    pub fn set_expand_listener(&mut self, listener: Box<dyn ArrayExpandListener>) {
        self.listener = Some(listener);
    }

    pub(crate) fn segment_count(&self) -> usize {
        self.segments.len()
    }

    pub(crate) fn segment_mut(&mut self, segment: usize) -> &mut [V] {
        &mut self.segments[segment]
    }
}
