//! The worker pool: lanes, dispatch, and lifecycle.
//!
//! A pool spawns one worker thread per lane and one dispatcher thread that
//! owns every host queue. Submitting threads never touch the slot channels;
//! they hand an op to the dispatcher over an mpsc channel and get a
//! [`CallHandle`] back immediately. The dispatcher multiplexes submission,
//! overflow flushing, response draining, and hard-timeout policing in one
//! loop, so all single-writer invariants hold by construction.
//!
//! A lane whose call exceeds its hard timeout is torn down: it stops
//! receiving dispatch, its pending calls settle with
//! [`CallError::HardTimeout`], and its thread is signalled to exit. Threads
//! cannot be killed mid-job, so a job that never returns leaks its thread;
//! the pool itself stays usable on the surviving lanes.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};

use crate::balancer::Balancer;
use crate::config::PoolConfig;
use crate::error::{CallError, ConfigError};
use crate::host::{CallHandle, CallState, HostQueue};
use crate::lock::duplex;
use crate::value::Value;
use crate::worker::{worker_loop, JobTable, WorkerQueue};

/// Dispatcher poll interval while waiting for ops.
const POLL_INTERVAL: Duration = Duration::from_micros(200);

/// Pump interval during graceful shutdown.
const SHUTDOWN_PUMP: Duration = Duration::from_millis(1);

enum Op {
    Submit {
        fn_id: u32,
        value: Value,
        timeout: Option<Duration>,
        state: Arc<CallState>,
    },
    Shutdown {
        grace: Duration,
    },
}

struct Lane {
    host: HostQueue,
    term: Arc<AtomicBool>,
    join: Option<thread::JoinHandle<()>>,
    alive: bool,
}

/// A running pool of worker lanes behind one dispatcher.
pub struct Pool {
    ops: mpsc::Sender<Op>,
    dispatcher: Option<thread::JoinHandle<()>>,
    jobs: Arc<JobTable>,
    in_flight: Arc<AtomicUsize>,
    accepting: Arc<AtomicBool>,
    inline_threshold: usize,
    default_grace: Duration,
}

impl Pool {
    pub fn new(config: PoolConfig, jobs: JobTable) -> std::result::Result<Pool, ConfigError> {
        let config = config.validated()?;
        let jobs = Arc::new(jobs);

        let mut lanes = Vec::with_capacity(config.workers);
        for i in 0..config.workers {
            let (host_end, peer) = duplex(&config.payload);
            let term = Arc::new(AtomicBool::new(false));
            let queue = WorkerQueue::new(peer, Arc::clone(&jobs));
            let batch = config.service_batch;
            let loop_term = Arc::clone(&term);
            let join = thread::Builder::new()
                .name(format!("slotrpc-worker-{}", i))
                .spawn(move || worker_loop(queue, loop_term, batch))
                .map_err(|e| ConfigError::Spawn(e.to_string()))?;
            lanes.push(Lane {
                host: HostQueue::new(host_end),
                term,
                join: Some(join),
                alive: true,
            });
        }

        let (ops, op_rx) = mpsc::channel();
        let in_flight = Arc::new(AtomicUsize::new(0));
        let accepting = Arc::new(AtomicBool::new(true));
        let balancer = Balancer::new(config.strategy);

        let dispatcher = thread::Builder::new()
            .name("slotrpc-dispatch".into())
            .spawn(move || dispatch_loop(op_rx, lanes, balancer))
            .map_err(|e| ConfigError::Spawn(e.to_string()))?;

        Ok(Pool {
            ops,
            dispatcher: Some(dispatcher),
            jobs,
            in_flight,
            accepting,
            inline_threshold: config.inline_threshold,
            default_grace: Duration::from_secs(1),
        })
    }

    /// Submit a call. The handle settles with the result, a rejection, or a
    /// lifecycle error; submission itself never blocks on channel capacity.
    pub fn submit(&self, fn_id: u32, value: Value, timeout: Option<Duration>) -> CallHandle {
        if !self.accepting.load(Ordering::Acquire) {
            let state = CallState::new();
            let handle = CallHandle::from_state(Arc::clone(&state));
            state.settle(Err(CallError::ShuttingDown));
            return handle;
        }

        // Count this call before routing it, so concurrent submitters see
        // each other; settlement decrements through the tracked state.
        let before = self.in_flight.fetch_add(1, Ordering::AcqRel);
        let state = CallState::tracked(Arc::clone(&self.in_flight));
        let handle = CallHandle::from_state(Arc::clone(&state));

        // Inliner lane: under light load run the job on the submitting
        // thread and skip the channel round trip entirely.
        if self.inline_threshold > 0 && before < self.inline_threshold {
            let outcome = match self.jobs.get(fn_id) {
                Some(job) => {
                    job(value).map_err(|thrown| CallError::Rejected(thrown_text(thrown)))
                }
                None => Err(CallError::Rejected(format!("unknown-function: {}", fn_id))),
            };
            state.settle(outcome);
            return handle;
        }

        let op = Op::Submit {
            fn_id,
            value,
            timeout,
            state: Arc::clone(&state),
        };
        if self.ops.send(op).is_err() {
            state.settle(Err(CallError::ShuttingDown));
        }
        handle
    }

    /// Calls submitted and not yet settled, inline calls included. This is
    /// the counter the inliner gate reads.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Stop accepting, give in-flight calls `grace` to finish, then stop
    /// the workers. Calls still unsettled after the grace period settle
    /// with [`CallError::ShuttingDown`].
    pub fn shutdown(&mut self, grace: Duration) {
        if self.dispatcher.is_none() {
            return;
        }
        self.accepting.store(false, Ordering::Release);
        let _ = self.ops.send(Op::Shutdown { grace });
        if let Some(handle) = self.dispatcher.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Pool {
    fn drop(&mut self) {
        let grace = self.default_grace;
        self.shutdown(grace);
    }
}

fn thrown_text(value: Value) -> String {
    match value {
        Value::Str(s) => s,
        Value::Error(e) => format!("{}: {}", e.name, e.message),
        other => format!("{:?}", other),
    }
}

fn dispatch_loop(ops: mpsc::Receiver<Op>, mut lanes: Vec<Lane>, mut balancer: Balancer) {
    loop {
        match ops.recv_timeout(POLL_INTERVAL) {
            Ok(Op::Submit {
                fn_id,
                value,
                timeout,
                state,
            }) => dispatch_one(&mut lanes, &mut balancer, fn_id, value, timeout, state),
            Ok(Op::Shutdown { grace }) => {
                shutdown_lanes(&mut lanes, grace);
                return;
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                shutdown_lanes(&mut lanes, Duration::ZERO);
                return;
            }
        }

        pump_lanes(&mut lanes);
        police_timeouts(&mut lanes);
    }
}

fn dispatch_one(
    lanes: &mut [Lane],
    balancer: &mut Balancer,
    fn_id: u32,
    value: Value,
    timeout: Option<Duration>,
    state: Arc<CallState>,
) {
    if !lanes.iter().any(|l| l.alive) {
        state.settle(Err(CallError::WorkerLost(
            "all worker lanes torn down".into(),
        )));
        return;
    }
    let idle: Vec<bool> = lanes
        .iter()
        .map(|l| l.alive && l.host.is_idle())
        .collect();
    let mut at = balancer.pick(&idle);
    while !lanes[at].alive {
        at = (at + 1) % lanes.len();
    }
    lanes[at].host.submit_prepared(state, fn_id, value, timeout);
    if let Some(join) = &lanes[at].join {
        join.thread().unpark();
    }
}

/// Flush overflow and drain responses on every live lane.
fn pump_lanes(lanes: &mut [Lane]) {
    for lane in lanes.iter_mut().filter(|l| l.alive) {
        lane.host.flush();
        lane.host.drain_responses();
    }
}

/// Tear down any lane with an expired hard timeout.
fn police_timeouts(lanes: &mut [Lane]) {
    let now = Instant::now();
    for lane in lanes.iter_mut().filter(|l| l.alive) {
        if let Some((id, elapsed, limit)) = lane.host.hard_expired(now) {
            log::error!(
                "call {} exceeded hard timeout ({:?} > {:?}); tearing lane down",
                id,
                elapsed,
                limit
            );
            lane.alive = false;
            lane.term.store(true, Ordering::Release);
            // The thread may be stuck inside the job; do not join it.
            lane.join = None;
            lane.host.reject_all(CallError::HardTimeout { elapsed, limit });
        }
    }
}

fn shutdown_lanes(lanes: &mut [Lane], grace: Duration) {
    let deadline = Instant::now() + grace;
    while lanes.iter().any(|l| l.alive && !l.host.is_idle()) {
        pump_lanes(lanes);
        police_timeouts(lanes);
        if Instant::now() >= deadline {
            break;
        }
        thread::sleep(SHUTDOWN_PUMP);
    }

    for lane in lanes.iter_mut() {
        lane.term.store(true, Ordering::Release);
    }
    for lane in lanes.iter_mut() {
        if let Some(join) = lane.join.take() {
            join.thread().unpark();
            let _ = join.join();
        }
    }
    // One last drain: workers flush completed results on the way out.
    pump_lanes(lanes);
    for lane in lanes.iter_mut() {
        lane.host.reject_all(CallError::ShuttingDown);
    }
}
