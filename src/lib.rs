//! Cross-thread call dispatch over lock-free slot channels.
//!
//! The substrate is a pair of 32-slot shared-memory channels per worker
//! lane, coordinated by toggle words: each side owns one 32-bit atomic and
//! only ever writes its own, so a slot's state is the bit parity across the
//! two words. No compare-and-swap, no sequence numbers, no wraparound.
//!
//! Layered on top:
//!
//! - [`lock`]: the channel itself (claim, drain, re-arm).
//! - [`value`]: a closed value model with header-only, inline (480-byte)
//!   and arena-backed payload placement.
//! - [`host`] / [`worker`]: call/response adapters with overflow queues,
//!   monotonic call ids, and rejection taxonomy.
//! - [`pool`]: worker lanes behind a dispatcher thread, with lane balancing,
//!   hard-timeout teardown, and an inliner gate for light load.
//!
//! ```no_run
//! use slotrpc::{JobTable, Pool, PoolConfig, Value};
//!
//! let mut jobs = JobTable::new();
//! jobs.register(1, |v| match v {
//!     Value::Int(n) => Ok(Value::Int(n + 1)),
//!     other => Err(Value::Str(format!("expected int, got {:?}", other))),
//! });
//!
//! let pool = Pool::new(PoolConfig::default(), jobs).unwrap();
//! let handle = pool.submit(1, Value::Int(41), None);
//! assert_eq!(handle.wait(), Ok(Value::Int(42)));
//! ```

pub mod balancer;
pub mod config;
pub mod error;
pub mod host;
pub mod layout;
pub mod lock;
pub mod pool;
pub mod task;
pub mod value;
pub mod worker;

mod arena;
mod codec;
mod region;

pub use balancer::Strategy;
pub use config::{ArenaMode, PayloadConfig, PoolConfig};
pub use error::{CallError, ClaimError, ConfigError, EncodeError, RejectReason};
pub use host::{CallHandle, HostQueue};
pub use lock::{channel, duplex, Consumer, Duplex, DuplexPeer, Producer};
pub use pool::Pool;
pub use task::{Task, TaskFlags, TaskPool};
pub use value::{BigIntValue, ErrorValue, Symbol, Value};
pub use worker::{worker_loop, Job, JobTable, WorkerQueue};
