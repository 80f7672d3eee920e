use std::time::Duration;

use crate::config::server::ClientConfig;

/// Client-side view of the push stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Connecting,
    Open,
    /// Closed by the client; no reconnect.
    Closed,
    Error,
    /// Reconnect attempts exhausted; live updates are paused and the client
    /// polls conversation history instead.
    Paused,
}

/// Exponential reconnect backoff with optional jitter.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: f64,
    /// 0 retries forever.
    pub max_attempts: u32,
    pub jitter: bool,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::from(&ClientConfig::default())
    }
}

impl From<&ClientConfig> for ReconnectPolicy {
    fn from(config: &ClientConfig) -> Self {
        Self {
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
            multiplier: 2.0,
            max_attempts: config.max_reconnect_attempts,
            jitter: true,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before reconnect attempt number `attempt` (zero based).
    #[must_use]
    pub fn next_backoff(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let base = self.initial_backoff.as_secs_f64() * self.multiplier.powi(exponent);
        let capped = base.min(self.max_backoff.as_secs_f64());

        if self.jitter {
            // ±20%
            let offset = (rand::random::<f64>() - 0.5) * capped * 0.4;
            Duration::from_secs_f64((capped + offset).max(0.0))
        } else {
            Duration::from_secs_f64(capped)
        }
    }

    #[must_use]
    pub fn should_retry(&self, attempt: u32) -> bool {
        self.max_attempts == 0 || attempt < self.max_attempts
    }
}

/// What the caller should do after a stream failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconnect {
    Retry(Duration),
    Pause,
}

/// Stream state machine: `Connecting -> Open -> {Closed, Error}`, with
/// `Error` looping back to `Connecting` until attempts run out.
#[derive(Debug, Clone)]
pub struct StreamLifecycle {
    state: StreamState,
    attempts: u32,
    policy: ReconnectPolicy,
}

impl StreamLifecycle {
    #[must_use]
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            state: StreamState::Connecting,
            attempts: 0,
            policy,
        }
    }

    #[must_use]
    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Failed attempts since the stream was last open.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn connecting(&mut self) {
        if self.state != StreamState::Closed {
            self.state = StreamState::Connecting;
        }
    }

    pub fn opened(&mut self) {
        self.state = StreamState::Open;
        self.attempts = 0;
    }

    /// Client-initiated close. Terminal.
    pub fn close(&mut self) {
        self.state = StreamState::Closed;
    }

    /// Records a connect failure or a dropped stream.
    pub fn failed(&mut self) -> Reconnect {
        if self.state == StreamState::Closed {
            return Reconnect::Pause;
        }

        if self.policy.should_retry(self.attempts) {
            let delay = self.policy.next_backoff(self.attempts);
            self.attempts += 1;
            self.state = StreamState::Error;
            Reconnect::Retry(delay)
        } else {
            self.state = StreamState::Paused;
            Reconnect::Pause
        }
    }

    /// Leaves the paused state for a fresh round of attempts.
    pub fn resume(&mut self) {
        if self.state == StreamState::Paused {
            self.attempts = 0;
            self.state = StreamState::Connecting;
        }
    }

    #[must_use]
    pub fn is_live(&self) -> bool {
        self.state == StreamState::Open
    }
}
