//! Connection state machine and reconnection backoff.

use std::fmt;
use std::time::Duration;

/// Lifecycle of the transport's single connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection has been attempted yet.
    Disconnected,
    /// Establishing a connection.
    Connecting,
    /// Connected; frames are flowing.
    Connected,
    /// The connection dropped and will be re-established.
    Lost,
    /// `stop()` was requested and teardown is in progress.
    Closing,
    /// Stopped. Terminal.
    Closed,
    /// The reconnection policy gave up. Terminal.
    Failed,
}

impl ConnectionState {
    /// Whether no further connection attempts will be made.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Failed)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Lost => "lost",
            Self::Closing => "closing",
            Self::Closed => "closed",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// How reconnection attempts are spaced and when they stop.
///
/// Attempt `n` counts consecutive failures. The first retry after a lost
/// connection is always immediate; later ones back off exponentially.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    /// Delay before the second attempt.
    pub initial_delay: Duration,
    /// Upper bound for any delay.
    pub max_delay: Duration,
    /// Growth factor between attempts.
    pub multiplier: f64,
    /// Random extra fraction (0.0..=1.0) added to each delay.
    pub jitter: f64,
    /// Consecutive failed attempts before giving up. `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            multiplier: 2.0,
            jitter: 0.1,
            max_attempts: Some(10),
        }
    }
}

impl ReconnectPolicy {
    /// Retry immediately and forever.
    #[must_use]
    pub const fn immediate() -> Self {
        Self {
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            multiplier: 1.0,
            jitter: 0.0,
            max_attempts: None,
        }
    }

    /// Cap the number of consecutive failed attempts.
    #[must_use]
    pub const fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    /// Whether `failures` consecutive failures exhaust the policy.
    #[must_use]
    pub fn is_exhausted(&self, failures: u32) -> bool {
        self.max_attempts.is_some_and(|max| failures >= max)
    }

    /// Delay before the next attempt after `failures` consecutive failures.
    #[must_use]
    pub fn delay_for(&self, failures: u32) -> Duration {
        if failures == 0 || self.initial_delay.is_zero() {
            return Duration::ZERO;
        }

        let exponent = i32::try_from(failures - 1).unwrap_or(i32::MAX);
        let max = self.max_delay.as_secs_f64();
        let base = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        // Negative or NaN multipliers fall back to no delay.
        if base.is_nan() || base <= 0.0 {
            return Duration::ZERO;
        }

        let jitter = if self.jitter.is_nan() {
            0.0
        } else {
            self.jitter.clamp(0.0, 1.0)
        };
        let jittered = base.min(max) * fastrand::f64().mul_add(jitter, 1.0);

        Duration::from_secs_f64(jittered.min(max))
    }
}
