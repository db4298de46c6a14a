//! Host-side adapter: turns the raw slot channel into a call/response API.
//!
//! The host queue owns the outbound producer and the inbound consumer of one
//! lane. Calls that cannot claim a slot (channel saturated, regions
//! exhausted) wait in an overflow queue and are retried in FIFO order, so
//! submission order is preserved end to end. Call ids are monotonic per
//! lane; responses are matched back through a pending map.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::error::CallError;
use crate::layout::META_TIMEOUT_MAX_MS;
use crate::lock::Duplex;
use crate::task::Task;
use crate::value::Value;

pub(crate) struct CallState {
    result: Mutex<Option<std::result::Result<Value, CallError>>>,
    cond: Condvar,
    /// Pool-wide in-flight counter, decremented on the first settlement.
    in_flight: Option<Arc<AtomicUsize>>,
}

impl CallState {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(CallState {
            result: Mutex::new(None),
            cond: Condvar::new(),
            in_flight: None,
        })
    }

    /// A state whose settlement decrements `counter` exactly once. The
    /// caller increments before submitting.
    pub(crate) fn tracked(counter: Arc<AtomicUsize>) -> Arc<Self> {
        Arc::new(CallState {
            result: Mutex::new(None),
            cond: Condvar::new(),
            in_flight: Some(counter),
        })
    }

    pub(crate) fn settle(&self, outcome: std::result::Result<Value, CallError>) {
        let mut slot = self.result.lock().unwrap_or_else(|e| e.into_inner());
        // First settlement wins; a timeout racing a late response is benign.
        if slot.is_none() {
            *slot = Some(outcome);
            if let Some(counter) = &self.in_flight {
                counter.fetch_sub(1, Ordering::AcqRel);
            }
            self.cond.notify_all();
        }
    }
}

/// A pending call's future result.
#[derive(Clone)]
pub struct CallHandle {
    state: Arc<CallState>,
}

impl CallHandle {
    pub(crate) fn from_state(state: Arc<CallState>) -> Self {
        Self { state }
    }

    /// Block until the call settles.
    pub fn wait(&self) -> std::result::Result<Value, CallError> {
        let mut slot = self.state.result.lock().unwrap_or_else(|e| e.into_inner());
        loop {
            if let Some(outcome) = slot.clone() {
                return outcome;
            }
            slot = self
                .state
                .cond
                .wait(slot)
                .unwrap_or_else(|e| e.into_inner());
        }
    }

    /// Block until the call settles or `timeout` passes. `None` means the
    /// call is still in flight.
    pub fn wait_timeout(
        &self,
        timeout: Duration,
    ) -> Option<std::result::Result<Value, CallError>> {
        let deadline = Instant::now() + timeout;
        let mut slot = self.state.result.lock().unwrap_or_else(|e| e.into_inner());
        loop {
            if let Some(outcome) = slot.clone() {
                return Some(outcome);
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            let (guard, _) = self
                .state
                .cond
                .wait_timeout(slot, deadline - now)
                .unwrap_or_else(|e| e.into_inner());
            slot = guard;
        }
    }

    /// The settled outcome, or `None` while the call is in flight.
    pub fn try_wait(&self) -> Option<std::result::Result<Value, CallError>> {
        self.state
            .result
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn is_settled(&self) -> bool {
        self.try_wait().is_some()
    }
}

struct Pending {
    state: Arc<CallState>,
    started: Instant,
    limit: Option<Duration>,
}

struct Staged {
    task: Task,
    state: Arc<CallState>,
    limit: Option<Duration>,
}

/// One lane's host end.
pub struct HostQueue {
    lane: Duplex,
    pending: HashMap<u32, Pending>,
    overflow: VecDeque<Staged>,
    next_id: u32,
}

impl HostQueue {
    pub fn new(lane: Duplex) -> Self {
        Self {
            lane,
            pending: HashMap::new(),
            overflow: VecDeque::new(),
            next_id: 0,
        }
    }

    /// Calls submitted but not yet settled (claimed or overflowed).
    pub fn in_flight(&self) -> usize {
        self.pending.len() + self.overflow.len()
    }

    /// True when nothing is in flight in either direction.
    pub fn is_idle(&self) -> bool {
        self.pending.is_empty() && self.overflow.is_empty() && self.lane.tx.is_idle()
    }

    /// Submit a call. Never fails: saturation parks the call in the
    /// overflow queue, and terminal encode rejections settle the handle
    /// immediately.
    pub fn submit(
        &mut self,
        fn_id: u32,
        value: Value,
        timeout: Option<Duration>,
    ) -> CallHandle {
        let state = CallState::new();
        self.submit_prepared(Arc::clone(&state), fn_id, value, timeout);
        CallHandle { state }
    }

    /// Submit against an externally created call state (pool dispatch path).
    pub(crate) fn submit_prepared(
        &mut self,
        state: Arc<CallState>,
        fn_id: u32,
        value: Value,
        timeout: Option<Duration>,
    ) {
        self.next_id = self.next_id.wrapping_add(1);
        let id = self.next_id;
        let mut task = Task::request(fn_id, id, value);
        task.timeout_ms = timeout
            .map(|d| (d.as_millis() as u64).min(META_TIMEOUT_MAX_MS as u64) as u32)
            .unwrap_or(0);

        let staged = Staged {
            task,
            state,
            limit: timeout,
        };
        // Preserve order: never claim ahead of an already-parked call.
        if self.overflow.is_empty() {
            if let Some(parked) = self.try_claim(staged) {
                self.overflow.push_back(parked);
            }
        } else {
            self.overflow.push_back(staged);
        }
    }

    /// Claim a slot for `staged`, or hand it back on a transient failure.
    /// Terminal encode rejections settle the handle here.
    fn try_claim(&mut self, staged: Staged) -> Option<Staged> {
        match self.lane.tx.claim(&staged.task) {
            Ok(_) => {
                self.pending.insert(
                    staged.task.id,
                    Pending {
                        state: staged.state,
                        started: Instant::now(),
                        limit: staged.limit,
                    },
                );
                None
            }
            Err(err) if err.is_transient() => Some(staged),
            Err(err) => {
                log::debug!("call {} rejected at encode: {}", staged.task.id, err);
                staged
                    .state
                    .settle(Err(CallError::Rejected(err.to_string())));
                None
            }
        }
    }

    /// Retry parked calls in FIFO order. Stops at the first transient
    /// failure to keep ordering intact. Returns how many were claimed.
    pub fn flush(&mut self) -> usize {
        if self.overflow.is_empty() {
            return 0;
        }
        // A parked call may be blocked on regions whose frees have already
        // round-tripped; pick those up before retrying.
        self.lane.tx.reclaim_regions();
        let mut moved = 0;
        while let Some(staged) = self.overflow.pop_front() {
            if let Some(parked) = self.try_claim(staged) {
                self.overflow.push_front(parked);
                break;
            }
            moved += 1;
        }
        moved
    }

    /// Drain inbound responses, settling matched calls. Returns the number
    /// of frames settled.
    pub fn drain_responses(&mut self) -> usize {
        let pending = &mut self.pending;
        self.lane.rx.drain_and_match(|id, rejected, value| {
            match pending.remove(&id) {
                Some(call) => {
                    let outcome = if rejected {
                        Err(CallError::Rejected(reject_text(value)))
                    } else {
                        Ok(value)
                    };
                    call.state.settle(outcome);
                }
                None => {
                    // Settled already (timeout) or torn down; drop the frame.
                    log::warn!("response for unknown call id {}", id);
                }
            }
        })
    }

    /// First call that has exceeded its hard timeout, if any. The caller is
    /// expected to tear the lane down and then [`HostQueue::reject_all`].
    pub fn hard_expired(&self, now: Instant) -> Option<(u32, Duration, Duration)> {
        self.pending.iter().find_map(|(&id, call)| {
            let limit = call.limit?;
            let elapsed = now.duration_since(call.started);
            (elapsed > limit).then_some((id, elapsed, limit))
        })
    }

    /// Settle every in-flight and parked call with `err`.
    pub fn reject_all(&mut self, err: CallError) {
        for (_, call) in self.pending.drain() {
            call.state.settle(Err(err.clone()));
        }
        for staged in self.overflow.drain(..) {
            staged.state.settle(Err(err.clone()));
        }
    }
}

fn reject_text(value: Value) -> String {
    match value {
        Value::Str(s) => s,
        Value::Error(e) => format!("{}: {}", e.name, e.message),
        other => format!("{:?}", other),
    }
}
