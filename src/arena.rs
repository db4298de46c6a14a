//! Shared backing memory: the per-slot header table and the payload arena.
//!
//! Both structures are written by exactly one side and read by the other,
//! with publication ordered by the toggle words in [`crate::lock`]. Accessors
//! are therefore plain (non-atomic) and `unsafe`: the caller asserts that the
//! handshake for the touched slot or range has been observed.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::config::PayloadConfig;
use crate::layout::{ARENA_PREFIX_BYTES, HEADER_WORDS, SLOTS, SLOT_STRIDE_WORDS};

fn zeroed_byte_cells(len: usize) -> Box<[UnsafeCell<u8>]> {
    // UnsafeCell<u8> is repr(transparent) over u8.
    let raw = Box::into_raw(vec![0u8; len].into_boxed_slice());
    unsafe { Box::from_raw(raw as *mut [UnsafeCell<u8>]) }
}

/// The 32-slot header table: `SLOTS x SLOT_STRIDE_WORDS` u32 words.
///
/// Words 0..8 of each slot are the fixed header; words 8..128 are the inline
/// payload tail used for static placement.
pub struct HeaderTable {
    words: Box<[UnsafeCell<u32>]>,
}

unsafe impl Send for HeaderTable {}
unsafe impl Sync for HeaderTable {}

impl HeaderTable {
    pub fn new() -> Self {
        let words = (0..SLOTS * SLOT_STRIDE_WORDS)
            .map(|_| UnsafeCell::new(0))
            .collect();
        Self { words }
    }

    #[inline]
    fn word_index(slot: usize, word: usize) -> usize {
        debug_assert!(slot < SLOTS);
        debug_assert!(word < SLOT_STRIDE_WORDS);
        slot * SLOT_STRIDE_WORDS + word
    }

    /// Pointer into the whole table, so multi-word copies stay within one
    /// provenance.
    #[inline]
    fn word_ptr(&self, slot: usize, word: usize) -> *mut u32 {
        let base = self.words.as_ptr() as *mut u32;
        unsafe { base.add(Self::word_index(slot, word)) }
    }

    /// Store one header word of a slot.
    ///
    /// # Safety
    /// Caller must own the slot on the producing side of the handshake.
    #[inline]
    pub unsafe fn store_word(&self, slot: usize, word: usize, value: u32) {
        *self.word_ptr(slot, word) = value;
    }

    /// Load one header word of a slot.
    ///
    /// # Safety
    /// Caller must have observed the toggle flip for this slot.
    #[inline]
    pub unsafe fn load_word(&self, slot: usize, word: usize) -> u32 {
        *self.word_ptr(slot, word)
    }

    /// Write `bytes` into the inline payload tail of a slot.
    ///
    /// # Safety
    /// Same contract as [`HeaderTable::store_word`]; `bytes.len()` must not
    /// exceed [`crate::layout::STATIC_CAPACITY_BYTES`].
    pub unsafe fn write_inline(&self, slot: usize, bytes: &[u8]) {
        debug_assert!(bytes.len() <= (SLOT_STRIDE_WORDS - HEADER_WORDS) * 4);
        let base = self.word_ptr(slot, HEADER_WORDS) as *mut u8;
        std::ptr::copy_nonoverlapping(bytes.as_ptr(), base, bytes.len());
    }

    /// Copy `len` bytes out of the inline payload tail of a slot.
    ///
    /// # Safety
    /// Same contract as [`HeaderTable::load_word`].
    pub unsafe fn read_inline(&self, slot: usize, len: usize) -> Vec<u8> {
        debug_assert!(len <= (SLOT_STRIDE_WORDS - HEADER_WORDS) * 4);
        let base = self.word_ptr(slot, HEADER_WORDS) as *const u8;
        let mut out = vec![0u8; len];
        std::ptr::copy_nonoverlapping(base, out.as_mut_ptr(), len);
        out
    }

}

impl Default for HeaderTable {
    fn default() -> Self {
        Self::new()
    }
}

/// The shared payload arena: a reserved prefix followed by the data region
/// that region-registry offsets index into.
///
/// The full ceiling is reserved at creation; "growth" raises a committed
/// watermark without remapping, so both sides always address stable memory.
pub struct PayloadArena {
    bytes: Box<[UnsafeCell<u8>]>,
    committed: AtomicUsize,
    data_len: usize,
}

unsafe impl Send for PayloadArena {}
unsafe impl Sync for PayloadArena {}

impl PayloadArena {
    /// Create an arena from a validated [`PayloadConfig`].
    pub fn new(config: &PayloadConfig) -> Self {
        Self {
            bytes: zeroed_byte_cells(ARENA_PREFIX_BYTES + config.max_byte_length),
            committed: AtomicUsize::new(config.initial_bytes),
            data_len: config.max_byte_length,
        }
    }

    /// Length of the data region (the addressable range for region offsets).
    #[inline]
    pub fn data_len(&self) -> usize {
        self.data_len
    }

    /// Current committed watermark in bytes.
    #[inline]
    pub fn committed(&self) -> usize {
        self.committed.load(Ordering::Relaxed)
    }

    /// Raise the committed watermark to cover `end` (data-relative).
    ///
    /// A no-op when already covered. The registry guarantees `end` stays
    /// within the data region, so this cannot fail.
    #[inline]
    pub fn commit_to(&self, end: usize) {
        debug_assert!(end <= self.data_len);
        self.committed.fetch_max(end, Ordering::Relaxed);
    }

    #[inline]
    fn data_ptr(&self, start: usize) -> *mut u8 {
        debug_assert!(start <= self.data_len);
        let base = self.bytes.as_ptr() as *mut u8;
        unsafe { base.add(ARENA_PREFIX_BYTES + start) }
    }

    /// Write `bytes` at a data-relative offset.
    ///
    /// # Safety
    /// The range must be a live region allocation owned by the producer.
    pub unsafe fn write(&self, start: usize, bytes: &[u8]) {
        debug_assert!(start + bytes.len() <= self.data_len);
        std::ptr::copy_nonoverlapping(bytes.as_ptr(), self.data_ptr(start), bytes.len());
    }

    /// Copy `len` bytes out of a data-relative offset.
    ///
    /// # Safety
    /// The range must be a published region allocation the caller observed.
    pub unsafe fn read_copy(&self, start: usize, len: usize) -> Vec<u8> {
        debug_assert!(start + len <= self.data_len);
        let mut out = vec![0u8; len];
        std::ptr::copy_nonoverlapping(self.data_ptr(start), out.as_mut_ptr(), len);
        out
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::STATIC_CAPACITY_BYTES;

    #[test]
    fn header_words_roundtrip() {
        let table = HeaderTable::new();
        unsafe {
            table.store_word(3, 1, 0xdead_beef);
            assert_eq!(table.load_word(3, 1), 0xdead_beef);
            // Other slots untouched.
            assert_eq!(table.load_word(2, 1), 0);
        }
    }

    #[test]
    fn inline_tail_roundtrip() {
        let table = HeaderTable::new();
        let payload = vec![0xabu8; STATIC_CAPACITY_BYTES];
        unsafe {
            table.write_inline(31, &payload);
            assert_eq!(table.read_inline(31, payload.len()), payload);
            // Inline tail does not clobber the header words.
            assert_eq!(table.load_word(31, 7), 0);
        }
    }

    #[test]
    fn arena_commit_watermark() {
        let cfg = PayloadConfig {
            mode: crate::config::ArenaMode::Growable,
            initial_bytes: 128,
            max_byte_length: 1024,
            max_payload_bytes: 128,
        }
        .validated()
        .unwrap();
        let arena = PayloadArena::new(&cfg);
        assert_eq!(arena.committed(), 128);
        arena.commit_to(512);
        assert_eq!(arena.committed(), 512);
        arena.commit_to(256);
        assert_eq!(arena.committed(), 512);
    }

    #[test]
    fn arena_write_read() {
        let cfg = PayloadConfig::small().validated().unwrap();
        let arena = PayloadArena::new(&cfg);
        let data = b"sixty-four bytes of payload data, padded out to alignment....!!";
        unsafe {
            arena.write(64, data);
            assert_eq!(arena.read_copy(64, data.len()), data);
            assert_eq!(arena.read_copy(64, 4), b"sixt");
        }
    }
}
