//! Worker-side adapter: drains requests, runs jobs, writes results back.
//!
//! The worker never blocks on the channel. Each cycle drains whatever is
//! pending, services a bounded batch, and writes back as many results as the
//! return channel accepts; anything left stays queued for the next cycle.
//! Results that cannot be written because the channel is saturated are
//! retried unchanged, so no response is ever dropped.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::error::ClaimError;
use crate::lock::DuplexPeer;
use crate::task::{Task, TaskFlags, TaskPool};
use crate::value::Value;

/// A registered job: takes the request value, returns a result or a thrown
/// value. Thrown values travel back as rejection frames.
pub type Job = Box<dyn Fn(Value) -> std::result::Result<Value, Value> + Send + Sync>;

/// Function-id to job mapping, shared by every lane of a pool.
#[derive(Default)]
pub struct JobTable {
    jobs: HashMap<u32, Job>,
}

impl JobTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, fn_id: u32, job: F)
    where
        F: Fn(Value) -> std::result::Result<Value, Value> + Send + Sync + 'static,
    {
        self.jobs.insert(fn_id, Box::new(job));
    }

    pub(crate) fn get(&self, fn_id: u32) -> Option<&Job> {
        self.jobs.get(&fn_id)
    }
}

/// One lane's worker end.
pub struct WorkerQueue {
    lane: DuplexPeer,
    jobs: Arc<JobTable>,
    pool: TaskPool,
    to_work: VecDeque<Task>,
    completed: VecDeque<Task>,
}

impl WorkerQueue {
    pub fn new(lane: DuplexPeer, jobs: Arc<JobTable>) -> Self {
        Self {
            lane,
            jobs,
            pool: TaskPool::new(),
            to_work: VecDeque::new(),
            completed: VecDeque::new(),
        }
    }

    /// Pull every pending request off the channel. Returns true if any
    /// arrived.
    pub fn drain_requests(&mut self) -> bool {
        let to_work = &mut self.to_work;
        self.lane
            .rx
            .drain_as_new(&mut self.pool, |task| to_work.push_back(task))
    }

    /// Run up to `max` queued jobs. Returns the number serviced.
    pub fn service_batch(&mut self, max: usize) -> usize {
        let mut ran = 0;
        while ran < max {
            let Some(mut task) = self.to_work.pop_front() else {
                break;
            };
            let value = std::mem::replace(&mut task.value, Value::Undefined);
            let outcome = match self.jobs.get(task.flags_or_fn) {
                Some(job) => job(value),
                None => {
                    log::warn!("request for unregistered function id {}", task.flags_or_fn);
                    Err(Value::Str(format!(
                        "unknown-function: {}",
                        task.flags_or_fn
                    )))
                }
            };
            // Reuse the record as the response frame.
            match outcome {
                Ok(result) => {
                    task.flags_or_fn = TaskFlags::empty().bits();
                    task.value = result;
                }
                Err(thrown) => {
                    task.flags_or_fn = TaskFlags::REJECT.bits();
                    task.value = thrown;
                }
            }
            task.timeout_ms = 0;
            self.completed.push_back(task);
            ran += 1;
        }
        ran
    }

    /// Write up to `max` completed results back. Returns the number written.
    ///
    /// Saturation stops the batch with the result requeued for the next
    /// cycle. A result value the codec rejects is downgraded in place to a
    /// rejection frame carrying the reason, so the call still settles.
    pub fn write_batch(&mut self, max: usize) -> usize {
        if self.completed.is_empty() {
            return 0;
        }
        // A requeued result may be blocked on regions the host has already
        // freed; pick those up before claiming.
        self.lane.tx.reclaim_regions();
        let mut wrote = 0;
        while wrote < max {
            let Some(task) = self.completed.pop_front() else {
                break;
            };
            match self.lane.tx.claim(&task) {
                Ok(_) => {
                    self.pool.put(task);
                    wrote += 1;
                }
                Err(err) if err.is_transient() => {
                    self.completed.push_front(task);
                    break;
                }
                Err(ClaimError::Encode(e)) => {
                    if task.is_reject() {
                        // The downgraded reason failed too; drop rather than
                        // loop. The host's timeout owns this call now.
                        log::error!(
                            "dropping unencodable rejection for call {}: {}",
                            task.id,
                            e
                        );
                        self.pool.put(task);
                    } else {
                        log::debug!("result for call {} not encodable: {}", task.id, e);
                        self.completed
                            .push_front(Task::rejection(task.id, Value::Str(e.to_string())));
                        self.pool.put(task);
                    }
                }
                Err(ClaimError::Full) => unreachable!("saturation is transient"),
            }
        }
        wrote
    }

    /// True when nothing is queued or pending in either direction.
    pub fn is_idle(&self) -> bool {
        self.to_work.is_empty() && self.completed.is_empty() && !self.lane.rx.has_pending()
    }

    /// One full drain/service/write cycle. Returns true if any work moved.
    pub fn cycle(&mut self, batch: usize) -> bool {
        let drained = self.drain_requests();
        let ran = self.service_batch(batch);
        let wrote = self.write_batch(batch);
        drained || ran > 0 || wrote > 0
    }
}

/// How many empty cycles to spin before parking.
const SPIN_CYCLES: u32 = 64;

/// Park interval while idle. Wakeups are driven by timeout rather than
/// unpark, so this bounds idle-path latency.
const PARK_INTERVAL: Duration = Duration::from_micros(100);

/// Drive a worker queue until `term` is set. On termination the queue makes
/// a best-effort pass to flush completed results before exiting.
pub fn worker_loop(mut queue: WorkerQueue, term: Arc<AtomicBool>, batch: usize) {
    let mut idle_cycles = 0u32;
    loop {
        if term.load(Ordering::Acquire) {
            queue.write_batch(usize::MAX);
            return;
        }
        if queue.cycle(batch) {
            idle_cycles = 0;
            continue;
        }
        idle_cycles += 1;
        if idle_cycles < SPIN_CYCLES {
            std::hint::spin_loop();
        } else {
            std::thread::park_timeout(PARK_INTERVAL);
        }
    }
}
