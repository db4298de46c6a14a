//! Error types for slotrpc.

use std::fmt;
use std::time::Duration;

/// Reasons a value can never cross the channel.
///
/// These always settle the affected call as a rejection carrying the reason
/// string; they never unwind across a thread boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// Function values cannot be reconstructed in another thread.
    FunctionNotSerializable,
    /// Only symbols created through the global registry are shareable.
    SymbolNotRegistered,
    /// Structural serialization (JSON) of the value failed.
    StructuralSerializationFailed(String),
    /// Encoded form exceeds the configured per-value payload cap.
    PayloadTooLarge { len: usize, max: usize },
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::FunctionNotSerializable => write!(f, "function-not-serializable"),
            RejectReason::SymbolNotRegistered => write!(f, "symbol-not-registered"),
            RejectReason::StructuralSerializationFailed(detail) => {
                write!(f, "structural-serialization-failed: {}", detail)
            }
            RejectReason::PayloadTooLarge { len, max } => {
                write!(f, "payload-too-large: {} bytes exceeds cap of {}", len, max)
            }
        }
    }
}

impl std::error::Error for RejectReason {}

/// Errors from encoding a payload into a slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    /// The region registry has no space for the dynamic payload right now.
    /// Transient: retry after the consumer frees regions.
    RegionFull,
    /// The value can never be encoded. Terminal for this call.
    Reject(RejectReason),
}

impl EncodeError {
    /// True when the caller should hold the task and retry later.
    pub fn is_transient(&self) -> bool {
        matches!(self, EncodeError::RegionFull)
    }
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncodeError::RegionFull => write!(f, "payload region registry is full"),
            EncodeError::Reject(reason) => write!(f, "{}", reason),
        }
    }
}

impl std::error::Error for EncodeError {}

/// Errors from [`Producer::claim`](crate::lock::Producer::claim).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimError {
    /// All 32 slots are in flight. Not an error condition: hold the task in
    /// an overflow queue and retry on the next drain cycle.
    Full,
    /// The codec could not place the value.
    Encode(EncodeError),
}

impl ClaimError {
    /// True when the task should be queued and retried unchanged.
    pub fn is_transient(&self) -> bool {
        match self {
            ClaimError::Full => true,
            ClaimError::Encode(e) => e.is_transient(),
        }
    }
}

impl fmt::Display for ClaimError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClaimError::Full => write!(f, "channel is saturated (32 slots in flight)"),
            ClaimError::Encode(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for ClaimError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ClaimError::Encode(e) => Some(e),
            _ => None,
        }
    }
}

/// User-visible outcome when a call does not resolve.
#[derive(Debug, Clone, PartialEq)]
pub enum CallError {
    /// The worker (or the codec) rejected the call; the string names the
    /// violated rule or carries the worker's error value.
    Rejected(String),
    /// The call exceeded its hard timeout; the owning worker was torn down.
    HardTimeout { elapsed: Duration, limit: Duration },
    /// The owning worker lane was torn down while this call was in flight.
    WorkerLost(String),
    /// The pool is no longer accepting submissions.
    ShuttingDown,
}

impl fmt::Display for CallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallError::Rejected(reason) => write!(f, "call rejected: {}", reason),
            CallError::HardTimeout { elapsed, limit } => write!(
                f,
                "hard timeout: call ran {:?} against a limit of {:?}; worker torn down",
                elapsed, limit
            ),
            CallError::WorkerLost(reason) => write!(f, "worker lost: {}", reason),
            CallError::ShuttingDown => write!(f, "pool is shutting down"),
        }
    }
}

impl std::error::Error for CallError {}

/// Configuration validation errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// `max_byte_length` leaves no room for a payload cap.
    ArenaTooSmall { max_byte_length: usize },
    /// `max_payload_bytes` must be in `1..=max_byte_length / 8`.
    PayloadCapOutOfRange { requested: usize, ceiling: usize },
    /// `initial_bytes` must not exceed `max_byte_length`.
    InitialExceedsMax { initial: usize, max: usize },
    /// A pool needs at least one worker lane or an inliner lane.
    NoLanes,
    /// The OS refused to spawn a pool thread.
    Spawn(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ArenaTooSmall { max_byte_length } => write!(
                f,
                "payload arena of {} bytes is too small; must be at least 8",
                max_byte_length
            ),
            ConfigError::PayloadCapOutOfRange { requested, ceiling } => write!(
                f,
                "max_payload_bytes must be > 0 and <= {} (got {})",
                ceiling, requested
            ),
            ConfigError::InitialExceedsMax { initial, max } => write!(
                f,
                "initial_bytes {} exceeds max_byte_length {}",
                initial, max
            ),
            ConfigError::NoLanes => write!(f, "pool has no worker lanes and no inliner"),
            ConfigError::Spawn(detail) => write!(f, "failed to spawn pool thread: {}", detail),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Result alias for slotrpc operations.
pub type Result<T> = std::result::Result<T, ClaimError>;
