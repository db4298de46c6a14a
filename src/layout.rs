//! Shared-layout constants for the slot protocol.
//!
//! Host and worker operate on the same memory, so every offset here is part
//! of the wire contract:
//!
//! ```text
//! lock sector    two cache-line padded 32-bit words (one per side)
//! header table   SLOTS x SLOT_STRIDE_WORDS u32 words
//! payload arena  ARENA_PREFIX_BYTES reserved prefix + data region
//! ```

/// Number of slots per channel direction. One bit of each lock word per slot.
pub const SLOTS: usize = 32;

/// Fixed header words at the start of each slot record.
pub const HEADER_WORDS: usize = 8;

/// Spare tail words per slot, available for static (in-header) payloads.
pub const INLINE_WORDS: usize = 120;

/// Total words per slot record.
pub const SLOT_STRIDE_WORDS: usize = HEADER_WORDS + INLINE_WORDS;

/// Static payload capacity in bytes (the inline tail of one slot record).
pub const STATIC_CAPACITY_BYTES: usize = INLINE_WORDS * 4;

/// Lock word value with every slot claimed.
pub const FULL_MASK: u32 = u32::MAX;

/// Reserved prefix at the start of the payload arena. Region offsets are
/// relative to the end of this prefix.
pub const ARENA_PREFIX_BYTES: usize = 64;

/// Region allocation granularity. Every region start and size is a multiple
/// of this, which is also what frees the low bits of `start` for packing.
pub const REGION_ALIGN: u32 = 64;

// Header word indices within a slot record.
pub const W_FLAGS_OR_FN: usize = 0;
pub const W_ID: usize = 1;
pub const W_TYPE: usize = 2;
pub const W_START: usize = 3;
pub const W_END: usize = 4;
pub const W_PAYLOAD_LEN: usize = 5;
pub const W_SLOT_META: usize = 6;
pub const W_RESERVED: usize = 7;

/// Bits of `slot_meta` holding the region-registry slot index.
pub const META_REGION_BITS: u32 = 5;

/// Mask for the region slot index in `slot_meta`.
pub const META_REGION_MASK: u32 = (1 << META_REGION_BITS) - 1;

/// Largest timeout (milliseconds) representable in the spare meta bits.
pub const META_TIMEOUT_MAX_MS: u32 = (1 << (32 - META_REGION_BITS)) - 1;

/// Pack a region slot index and an advisory timeout into one meta word.
///
/// The timeout saturates at [`META_TIMEOUT_MAX_MS`] (about 37 hours); zero
/// means "no timeout requested".
#[inline]
pub fn pack_slot_meta(region_slot: u32, timeout_ms: u32) -> u32 {
    debug_assert!(region_slot <= META_REGION_MASK);
    let timeout = timeout_ms.min(META_TIMEOUT_MAX_MS);
    (timeout << META_REGION_BITS) | (region_slot & META_REGION_MASK)
}

/// Extract the region slot index from a meta word.
#[inline]
pub fn meta_region_slot(meta: u32) -> u32 {
    meta & META_REGION_MASK
}

/// Extract the advisory timeout (milliseconds) from a meta word.
#[inline]
pub fn meta_timeout_ms(meta: u32) -> u32 {
    meta >> META_REGION_BITS
}

/// Round a payload length up to the region allocation granularity.
#[inline]
pub fn align_region_len(len: u32) -> u32 {
    (len + (REGION_ALIGN - 1)) & !(REGION_ALIGN - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stride_is_contract_size() {
        assert_eq!(SLOT_STRIDE_WORDS, 128);
        assert_eq!(STATIC_CAPACITY_BYTES, 480);
    }

    #[test]
    fn meta_roundtrip() {
        let meta = pack_slot_meta(17, 12_345);
        assert_eq!(meta_region_slot(meta), 17);
        assert_eq!(meta_timeout_ms(meta), 12_345);
    }

    #[test]
    fn meta_timeout_saturates() {
        let meta = pack_slot_meta(0, u32::MAX);
        assert_eq!(meta_timeout_ms(meta), META_TIMEOUT_MAX_MS);
        assert_eq!(meta_region_slot(meta), 0);
    }

    #[test]
    fn region_alignment() {
        assert_eq!(align_region_len(0), 0);
        assert_eq!(align_region_len(1), 64);
        assert_eq!(align_region_len(64), 64);
        assert_eq!(align_region_len(65), 128);
    }
}
