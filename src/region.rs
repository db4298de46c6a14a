//! Region registry: placement of dynamic payloads inside the shared arena.
//!
//! The registry is a sorted table of at most 32 `(start | slot_index)` words
//! (starts are 64-byte aligned, so the low bits carry the index) plus a
//! parallel size table. Reclaim follows the same toggle handshake as the
//! slot channel: the producer flips its bit on allocate, the consumer flips
//! the matching bit on free, and parity-equal bits are reclaimable. Frees are
//! O(1); a stable left-compaction pass runs on every eighth successful
//! allocation.
//!
//! A general allocator is deliberately avoided: allocation count is bounded
//! by the 32-slot channel capacity, and at that size a sorted array with
//! periodic compaction wins.

use std::sync::atomic::{AtomicU32, Ordering};

use crossbeam_utils::CachePadded;

use crate::layout::{align_region_len, META_REGION_MASK, SLOTS};

const EMPTY: u32 = u32::MAX;
const START_MASK: u32 = !META_REGION_MASK;

/// How many successful allocations between opportunistic compaction passes.
const COMPACT_INTERVAL: u32 = 8;

/// The registry's pair of toggle words (producer-owned / consumer-owned).
pub struct RegionSector {
    produced: CachePadded<AtomicU32>,
    consumed: CachePadded<AtomicU32>,
}

impl RegionSector {
    pub fn new() -> Self {
        Self {
            produced: CachePadded::new(AtomicU32::new(0)),
            consumed: CachePadded::new(AtomicU32::new(0)),
        }
    }
}

impl Default for RegionSector {
    fn default() -> Self {
        Self::new()
    }
}

/// A successful allocation: data-relative start plus the registry slot index
/// the consumer must free.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionSlot {
    pub start: u32,
    pub index: u32,
}

/// Transient allocation failure: no table entry or no arena gap right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionFull;

/// Producer-side allocator state. Lives on the encoding side only; the
/// consumer never sees the table, just the toggle words.
pub struct RegionRegistry {
    entries: [u32; SLOTS],
    sizes: [u32; SLOTS],
    len: usize,
    used_bits: u32,
    shadow: u32,
    alloc_counter: u32,
    data_cap: u32,
}

impl RegionRegistry {
    /// `data_cap` is the length of the arena's data region; allocations
    /// never extend past it.
    pub fn new(data_cap: usize) -> Self {
        Self {
            entries: [EMPTY; SLOTS],
            sizes: [0; SLOTS],
            len: 0,
            used_bits: 0,
            shadow: 0,
            alloc_counter: 0,
            data_cap: data_cap as u32,
        }
    }

    /// Live entry count (for backpressure checks and tests).
    pub fn live(&self) -> usize {
        self.len
    }

    /// Snapshot of the live `(start, index, size)` entries in table order.
    pub fn entries(&self) -> Vec<(u32, u32, u32)> {
        self.entries[..self.len]
            .iter()
            .filter(|&&e| e != EMPTY)
            .map(|&e| {
                let index = e & META_REGION_MASK;
                (e & START_MASK, index, self.sizes[index as usize])
            })
            .collect()
    }

    /// Allocate space for a payload of `payload_len` bytes.
    ///
    /// The size is rounded up to the 64-byte granule (with a one-granule
    /// minimum). Placement is first-fit, lowest address first: before the
    /// first entry, in the earliest sufficient gap, or appended at the end.
    /// The registry slot index is the lowest free occupancy bit.
    ///
    /// On success the producer toggle bit for the chosen index is published.
    ///
    /// The compaction cadence counts successful placements only; a caller
    /// stuck on [`RegionFull`] reclaims explicitly through its retry path
    /// (see [`RegionRegistry::compact_and_reclaim`]).
    pub fn allocate(
        &mut self,
        sector: &RegionSector,
        payload_len: u32,
    ) -> std::result::Result<RegionSlot, RegionFull> {
        if self.alloc_counter == 0 {
            self.compact_and_reclaim(sector);
        }

        let size = align_region_len(payload_len.max(1));

        let free_bits = !self.used_bits;
        let free_bit = free_bits & free_bits.wrapping_neg();
        if free_bit == 0 || self.len >= SLOTS {
            return Err(RegionFull);
        }
        let index = free_bit.trailing_zeros();

        // Empty table.
        if self.len == 0 {
            if size > self.data_cap {
                return Err(RegionFull);
            }
            self.entries[0] = index;
            return Ok(self.commit(sector, 0, index, free_bit, size));
        }

        // Gap before the first entry.
        let first_start = self.entries[0] & START_MASK;
        if first_start >= size {
            self.entries.copy_within(0..self.len, 1);
            self.entries[0] = index;
            return Ok(self.commit(sector, 0, index, free_bit, size));
        }

        // Gap between consecutive entries.
        for at in 0..self.len.saturating_sub(1) {
            let cur = self.entries[at];
            let cur_start = cur & START_MASK;
            let cur_end = cur_start + self.sizes[(cur & META_REGION_MASK) as usize];
            let next_start = self.entries[at + 1] & START_MASK;

            if next_start - cur_end < size {
                continue;
            }

            self.entries.copy_within(at + 1..self.len, at + 2);
            self.entries[at + 1] = cur_end | index;
            return Ok(self.commit(sector, cur_end, index, free_bit, size));
        }

        // Append after the last entry.
        let last = self.entries[self.len - 1];
        let last_start = last & START_MASK;
        let new_start = last_start + self.sizes[(last & META_REGION_MASK) as usize];
        if new_start + size > self.data_cap {
            return Err(RegionFull);
        }
        self.entries[self.len] = new_start | index;
        Ok(self.commit(sector, new_start, index, free_bit, size))
    }

    fn commit(
        &mut self,
        sector: &RegionSector,
        start: u32,
        index: u32,
        bit: u32,
        size: u32,
    ) -> RegionSlot {
        self.alloc_counter = (self.alloc_counter + 1) % COMPACT_INTERVAL;
        self.sizes[index as usize] = size;
        self.len += 1;
        self.used_bits |= bit;
        self.shadow ^= bit;
        sector.produced.store(self.shadow, Ordering::Release);
        RegionSlot { start, index }
    }

    /// Drop entries whose free acknowledgment has round-tripped, then
    /// left-compact the table preserving survivor order.
    pub fn compact_and_reclaim(&mut self, sector: &RegionSector) {
        let consumed = sector.consumed.load(Ordering::Acquire);
        let in_use = self.shadow ^ consumed;
        let mut free_bits = !in_use;

        if self.len == 0 || free_bits == 0 {
            return;
        }
        if free_bits == u32::MAX {
            self.len = 0;
            self.used_bits = 0;
            self.entries[..SLOTS].fill(EMPTY);
            return;
        }

        free_bits &= self.used_bits;
        if free_bits == 0 {
            return;
        }

        for entry in self.entries[..self.len].iter_mut() {
            if *entry == EMPTY {
                continue;
            }
            if free_bits & (1 << (*entry & META_REGION_MASK)) != 0 {
                *entry = EMPTY;
            }
        }

        self.used_bits &= !free_bits;
        self.len = self.compact_stable();
    }

    fn compact_stable(&mut self) -> usize {
        let mut write = 0;
        for read in 0..self.len {
            let v = self.entries[read];
            if v != EMPTY {
                self.entries[write] = v;
                write += 1;
            }
        }
        for entry in self.entries[write..self.len].iter_mut() {
            *entry = EMPTY;
        }
        write
    }
}

/// Consumer-side handle: records "this region is no longer needed" by
/// flipping the matching toggle bit. Reclaim happens later, on the producer.
pub struct RegionReclaimer {
    shadow: u32,
}

impl RegionReclaimer {
    pub fn new() -> Self {
        Self { shadow: 0 }
    }

    #[inline]
    pub fn free(&mut self, sector: &RegionSector, index: u32) {
        debug_assert!(index < SLOTS as u32);
        self.shadow ^= 1 << index;
        sector.consumed.store(self.shadow, Ordering::Release);
    }
}

impl Default for RegionReclaimer {
    fn default() -> Self {
        Self::new()
    }
}
