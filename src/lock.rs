//! The slot channel: a single-producer single-consumer, 32-slot frame
//! channel over shared memory, coordinated by one pair of toggle words.
//!
//! Each side owns one 32-bit word and only ever writes its own. A slot's
//! state is the PARITY of its bit across the two words: unequal means a
//! frame is in flight toward the consumer, equal means the slot is free.
//! Claiming toggles the producer's bit; re-arming toggles the consumer's.
//! Neither side needs read-modify-write atomics, and the words never wrap,
//! so there is no sequence-number reset protocol.
//!
//! Claims and drain sweeps both walk bits from the MSB down, which keeps the
//! drain order stable and makes saturation behavior easy to reason about.
//!
//! A duplex lane is two of these channels back to back; see
//! [`duplex`](crate::lock::duplex).

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crossbeam_utils::CachePadded;

use crate::arena::{HeaderTable, PayloadArena};
use crate::codec::{decode_payload, encode_payload};
use crate::config::PayloadConfig;
use crate::error::ClaimError;
use crate::layout::FULL_MASK;
use crate::region::{RegionReclaimer, RegionRegistry, RegionSector};
use crate::task::{Task, TaskPool};
use crate::value::Value;

/// Publish the consumed word after this many settles during a matching
/// drain, so the producer sees capacity return before the sweep finishes.
const DRAIN_FLUSH_INTERVAL: u32 = 8;

struct Shared {
    produced: CachePadded<AtomicU32>,
    consumed: CachePadded<AtomicU32>,
    region: RegionSector,
    headers: HeaderTable,
    arena: PayloadArena,
}

/// The claiming side of one channel direction.
pub struct Producer {
    shared: Arc<Shared>,
    shadow: u32,
    registry: RegionRegistry,
    max_payload: usize,
}

/// The draining side of one channel direction.
pub struct Consumer {
    shared: Arc<Shared>,
    shadow: u32,
    reclaimer: RegionReclaimer,
    scratch: Task,
}

/// Create one channel direction.
pub fn channel(config: &PayloadConfig) -> (Producer, Consumer) {
    let arena = PayloadArena::new(config);
    let registry = RegionRegistry::new(arena.data_len());
    let shared = Arc::new(Shared {
        produced: CachePadded::new(AtomicU32::new(0)),
        consumed: CachePadded::new(AtomicU32::new(0)),
        region: RegionSector::new(),
        headers: HeaderTable::new(),
        arena,
    });
    (
        Producer {
            shared: Arc::clone(&shared),
            shadow: 0,
            registry,
            max_payload: config.max_payload_bytes,
        },
        Consumer {
            shared,
            shadow: 0,
            reclaimer: RegionReclaimer::new(),
            scratch: Task::request(0, 0, Value::Undefined),
        },
    )
}

/// A host-facing duplex lane: requests flow out on one channel, responses
/// come back on the other.
pub struct Duplex {
    pub tx: Producer,
    pub rx: Consumer,
}

/// The worker end of the same lane.
pub struct DuplexPeer {
    pub rx: Consumer,
    pub tx: Producer,
}

/// Create a request/response lane pair.
pub fn duplex(config: &PayloadConfig) -> (Duplex, DuplexPeer) {
    let (req_tx, req_rx) = channel(config);
    let (res_tx, res_rx) = channel(config);
    (
        Duplex {
            tx: req_tx,
            rx: res_rx,
        },
        DuplexPeer {
            rx: req_rx,
            tx: res_tx,
        },
    )
}

impl Producer {
    /// Bits currently in flight toward the consumer.
    #[inline]
    fn occupied(&self) -> u32 {
        self.shadow ^ self.shared.consumed.load(Ordering::Acquire)
    }

    /// True if at least one slot can be claimed right now.
    #[inline]
    pub fn has_free_slot(&self) -> bool {
        self.occupied() != FULL_MASK
    }

    /// True when every frame this producer ever published has been drained.
    #[inline]
    pub fn is_idle(&self) -> bool {
        self.occupied() == 0
    }

    /// Claim the highest free slot, encode `task` into it, and publish it.
    ///
    /// Returns the claimed slot index. Transient failures
    /// ([`ClaimError::Full`], region exhaustion) leave the channel untouched
    /// so the caller can retry the same task on the next cycle.
    pub fn claim(&mut self, task: &Task) -> crate::error::Result<u32> {
        let free = !self.occupied();
        if free == 0 {
            return Err(ClaimError::Full);
        }
        let at = 31 - free.leading_zeros();

        encode_payload(
            &self.shared.headers,
            &self.shared.arena,
            &mut self.registry,
            &self.shared.region,
            at as usize,
            task,
            self.max_payload,
        )
        .map_err(ClaimError::Encode)?;

        let bit = 1 << at;
        self.shadow ^= bit;
        self.shared.produced.store(self.shadow, Ordering::Release);
        Ok(at)
    }

    /// Pick up region frees whose acknowledgment has round-tripped.
    ///
    /// The claim path only compacts on its periodic cadence, so a producer
    /// that hit region exhaustion calls this before retrying. Cheap when
    /// nothing was freed.
    pub fn reclaim_regions(&mut self) {
        self.registry.compact_and_reclaim(&self.shared.region);
    }
}

impl Consumer {
    /// Pending frame bits as of one acquire load.
    #[inline]
    fn pending(&self) -> u32 {
        self.shared.produced.load(Ordering::Acquire) ^ self.shadow
    }

    /// True if a frame is waiting.
    #[inline]
    pub fn has_pending(&self) -> bool {
        self.pending() != 0
    }

    /// Drain every pending frame into fresh task records.
    ///
    /// Used on the request path: each frame becomes a task pulled from
    /// `pool` and handed to `sink`. Slots are re-armed with a single
    /// publication at the end of the sweep, so the producer sees all
    /// capacity return at once. Returns true if anything was drained.
    pub fn drain_as_new(&mut self, pool: &mut TaskPool, mut sink: impl FnMut(Task)) -> bool {
        let mut pending = self.pending();
        if pending == 0 {
            return false;
        }
        while pending != 0 {
            let at = 31 - pending.leading_zeros();
            let bit = 1 << at;
            let mut task = pool.take();
            decode_payload(
                &self.shared.headers,
                &self.shared.arena,
                &mut self.reclaimer,
                &self.shared.region,
                at as usize,
                &mut task,
            );
            sink(task);
            self.shadow ^= bit;
            pending &= !bit;
        }
        self.shared.consumed.store(self.shadow, Ordering::Release);
        true
    }

    /// Drain every pending frame, settling each through `settle`.
    ///
    /// Used on the response path: the callback gets the call id, whether the
    /// frame is a rejection, and the decoded value. The consumed word is
    /// flushed every [`DRAIN_FLUSH_INTERVAL`] settles and once at the end,
    /// so a saturated producer regains slots mid-sweep. Returns the number
    /// of frames settled.
    pub fn drain_and_match(&mut self, mut settle: impl FnMut(u32, bool, Value)) -> usize {
        let mut pending = self.pending();
        if pending == 0 {
            return 0;
        }
        let mut settled = 0usize;
        let mut since_flush = 0u32;
        while pending != 0 {
            let at = 31 - pending.leading_zeros();
            let bit = 1 << at;
            decode_payload(
                &self.shared.headers,
                &self.shared.arena,
                &mut self.reclaimer,
                &self.shared.region,
                at as usize,
                &mut self.scratch,
            );
            let value = std::mem::replace(&mut self.scratch.value, Value::Undefined);
            settle(self.scratch.id, self.scratch.is_reject(), value);
            self.shadow ^= bit;
            pending &= !bit;
            settled += 1;
            since_flush += 1;
            if since_flush == DRAIN_FLUSH_INTERVAL {
                self.shared.consumed.store(self.shadow, Ordering::Release);
                since_flush = 0;
            }
        }
        if since_flush != 0 {
            self.shared.consumed.store(self.shadow, Ordering::Release);
        }
        settled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::SLOTS;

    fn small_channel() -> (Producer, Consumer) {
        channel(&PayloadConfig::small().validated().unwrap())
    }

    #[test]
    fn claim_fills_msb_first() {
        let (mut tx, _rx) = small_channel();
        let a = tx.claim(&Task::request(1, 0, Value::Int(0))).unwrap();
        let b = tx.claim(&Task::request(1, 1, Value::Int(1))).unwrap();
        assert_eq!(a, 31);
        assert_eq!(b, 30);
    }

    #[test]
    fn saturation_and_recovery() {
        let (mut tx, mut rx) = small_channel();
        for i in 0..SLOTS as u32 {
            tx.claim(&Task::request(1, i, Value::Int(i as i64))).unwrap();
        }
        assert!(!tx.has_free_slot());
        let err = tx
            .claim(&Task::request(1, 99, Value::Int(99)))
            .unwrap_err();
        assert_eq!(err, ClaimError::Full);
        assert!(err.is_transient());

        let mut pool = TaskPool::new();
        let mut seen = Vec::new();
        assert!(rx.drain_as_new(&mut pool, |t| seen.push(t.id)));
        assert_eq!(seen.len(), SLOTS);
        assert!(tx.has_free_slot());
        assert!(tx.is_idle());
        tx.claim(&Task::request(1, 99, Value::Int(99))).unwrap();
    }

    #[test]
    fn drain_order_is_claim_order_within_a_sweep() {
        let (mut tx, mut rx) = small_channel();
        for i in 0..5u32 {
            tx.claim(&Task::request(1, i, Value::Int(i as i64))).unwrap();
        }
        let mut pool = TaskPool::new();
        let mut seen = Vec::new();
        rx.drain_as_new(&mut pool, |t| seen.push(t.id));
        // Claims walk down from bit 31 and the sweep does too.
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn matching_drain_reports_rejections() {
        let (mut tx, mut rx) = small_channel();
        tx.claim(&Task::response(7, Value::Int(1))).unwrap();
        tx.claim(&Task::rejection(8, Value::Str("bad".into())))
            .unwrap();

        let mut results = Vec::new();
        let settled = rx.drain_and_match(|id, rejected, value| {
            results.push((id, rejected, value));
        });
        assert_eq!(settled, 2);
        assert_eq!(results[0], (7, false, Value::Int(1)));
        assert_eq!(results[1], (8, true, Value::Str("bad".into())));
    }

    #[test]
    fn dynamic_payload_regions_recycle_through_drain() {
        let (mut tx, mut rx) = small_channel();
        let big = "z".repeat(1024);
        let mut pool = TaskPool::new();
        // Far more messages than region slots; only works if drain frees.
        for i in 0..200u32 {
            tx.claim(&Task::request(1, i, Value::Str(big.clone())))
                .unwrap();
            let mut got = None;
            rx.drain_as_new(&mut pool, |t| got = Some(t));
            let task = got.unwrap();
            assert_eq!(task.id, i);
            pool.put(task);
        }
    }

    #[test]
    fn explicit_reclaim_recovers_region_exhaustion() {
        let (mut tx, mut rx) = small_channel();
        let mut pool = TaskPool::new();
        // 6 KiB regions against a 64 KiB arena: ten fit, the eleventh does
        // not, and ten is off the compaction cadence.
        let big = Value::Bytes(vec![7u8; 6144]);
        for i in 0..10u32 {
            tx.claim(&Task::request(1, i, big.clone())).unwrap();
        }
        let err = tx.claim(&Task::request(1, 10, big.clone())).unwrap_err();
        assert!(err.is_transient());

        // Draining frees every region, but the producer's table only learns
        // of it through reclaim.
        rx.drain_as_new(&mut pool, |_| {});
        let err = tx.claim(&Task::request(1, 10, big.clone())).unwrap_err();
        assert!(err.is_transient());

        tx.reclaim_regions();
        tx.claim(&Task::request(1, 10, big)).unwrap();
    }

    #[test]
    fn duplex_echo() {
        let cfg = PayloadConfig::small().validated().unwrap();
        let (mut host, mut worker) = duplex(&cfg);
        let mut pool = TaskPool::new();

        for i in 0..10u32 {
            host.tx
                .claim(&Task::request(1, i, Value::Int(i as i64)))
                .unwrap();
        }
        let mut echoed = Vec::new();
        worker.rx.drain_as_new(&mut pool, |t| echoed.push(t));
        for task in echoed {
            worker
                .tx
                .claim(&Task::response(task.id, task.value.clone()))
                .unwrap();
            pool.put(task);
        }

        let mut settled = Vec::new();
        host.rx.drain_and_match(|id, rejected, value| {
            assert!(!rejected);
            settled.push((id, value));
        });
        assert_eq!(settled.len(), 10);
        for (id, value) in settled {
            assert_eq!(value, Value::Int(id as i64));
        }
        assert!(host.tx.is_idle());
        assert!(worker.tx.is_idle());
    }
}
