//! Channel and pool configuration.

use crate::balancer::Strategy;
use crate::error::ConfigError;

/// Default payload arena ceiling (64 MiB).
pub const PAYLOAD_DEFAULT_MAX_BYTE_LENGTH: usize = 64 * 1024 * 1024;

/// Default committed arena size in growable mode (4 MiB).
pub const PAYLOAD_DEFAULT_INITIAL_BYTES: usize = 4 * 1024 * 1024;

/// How the payload arena commits its space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArenaMode {
    /// Commit the whole ceiling up front.
    Fixed,
    /// Start at `initial_bytes` and raise the committed watermark on demand,
    /// up to `max_byte_length`.
    Growable,
}

/// Payload arena configuration for one channel direction.
#[derive(Debug, Clone)]
pub struct PayloadConfig {
    pub mode: ArenaMode,
    /// Committed bytes at creation (growable mode only).
    pub initial_bytes: usize,
    /// Arena ceiling in bytes.
    pub max_byte_length: usize,
    /// Per-value encoded-size cap. Must be `<= max_byte_length / 8`.
    pub max_payload_bytes: usize,
}

impl Default for PayloadConfig {
    fn default() -> Self {
        Self {
            mode: ArenaMode::Growable,
            initial_bytes: PAYLOAD_DEFAULT_INITIAL_BYTES,
            max_byte_length: PAYLOAD_DEFAULT_MAX_BYTE_LENGTH,
            max_payload_bytes: PAYLOAD_DEFAULT_MAX_BYTE_LENGTH >> 3,
        }
    }
}

impl PayloadConfig {
    /// A small configuration for tests and low-volume channels.
    pub fn small() -> Self {
        Self {
            mode: ArenaMode::Fixed,
            initial_bytes: 64 * 1024,
            max_byte_length: 64 * 1024,
            max_payload_bytes: 8 * 1024,
        }
    }

    /// Validate and normalize the configuration.
    ///
    /// Fixed mode commits the ceiling up front, so `initial_bytes` is forced
    /// to `max_byte_length`. The per-value cap ceiling is `max_byte_length / 8`,
    /// keeping a single value from monopolizing the arena.
    pub fn validated(mut self) -> std::result::Result<Self, ConfigError> {
        let ceiling = self.max_byte_length >> 3;
        if ceiling == 0 {
            return Err(ConfigError::ArenaTooSmall {
                max_byte_length: self.max_byte_length,
            });
        }
        if self.max_payload_bytes == 0 || self.max_payload_bytes > ceiling {
            return Err(ConfigError::PayloadCapOutOfRange {
                requested: self.max_payload_bytes,
                ceiling,
            });
        }
        match self.mode {
            ArenaMode::Fixed => self.initial_bytes = self.max_byte_length,
            ArenaMode::Growable => {
                if self.initial_bytes > self.max_byte_length {
                    return Err(ConfigError::InitialExceedsMax {
                        initial: self.initial_bytes,
                        max: self.max_byte_length,
                    });
                }
            }
        }
        Ok(self)
    }
}

/// Pool configuration.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Number of worker threads (lanes).
    pub workers: usize,
    /// Lane-selection strategy for dispatch.
    pub strategy: Strategy,
    /// While fewer than this many calls are in flight, run calls on the
    /// submitting thread instead of dispatching to a worker. Zero disables
    /// the inliner lane.
    pub inline_threshold: usize,
    /// Payload arena configuration applied to every channel direction.
    pub payload: PayloadConfig,
    /// Upper bound on tasks serviced or results written per worker cycle.
    pub service_batch: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            strategy: Strategy::RoundRobin,
            inline_threshold: 0,
            payload: PayloadConfig::default(),
            service_batch: 32,
        }
    }
}

impl PoolConfig {
    pub fn validated(self) -> std::result::Result<Self, ConfigError> {
        if self.workers == 0 && self.inline_threshold == 0 {
            return Err(ConfigError::NoLanes);
        }
        let payload = self.payload.validated()?;
        Ok(Self { payload, ..self })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        let cfg = PayloadConfig::default().validated().unwrap();
        assert_eq!(cfg.max_payload_bytes, PAYLOAD_DEFAULT_MAX_BYTE_LENGTH >> 3);
    }

    #[test]
    fn fixed_mode_commits_ceiling() {
        let cfg = PayloadConfig {
            mode: ArenaMode::Fixed,
            initial_bytes: 1,
            max_byte_length: 1024,
            max_payload_bytes: 128,
        }
        .validated()
        .unwrap();
        assert_eq!(cfg.initial_bytes, 1024);
    }

    #[test]
    fn payload_cap_ceiling_enforced() {
        let err = PayloadConfig {
            mode: ArenaMode::Fixed,
            initial_bytes: 1024,
            max_byte_length: 1024,
            max_payload_bytes: 512,
        }
        .validated()
        .unwrap_err();
        assert!(matches!(err, ConfigError::PayloadCapOutOfRange { ceiling: 128, .. }));
    }

    #[test]
    fn pool_needs_a_lane() {
        let err = PoolConfig {
            workers: 0,
            inline_threshold: 0,
            ..PoolConfig::default()
        }
        .validated()
        .unwrap_err();
        assert_eq!(err, ConfigError::NoLanes);
    }
}
