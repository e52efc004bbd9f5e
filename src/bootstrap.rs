//! Startup gate for external dependencies.
//!
//! A [`Bootstrapper`] drives one [`Dependency`] from `Disconnected` to either
//! `Ready` or `Failed`. Each attempt must open the connection and prove it
//! alive with a round trip. Failures are retried after a backoff until the
//! attempt budget is spent, at which point the caller is expected to exit.
//! This loop only ever runs before the listener is bound.

use std::{fmt, time::Duration};

use async_trait::async_trait;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Same delay after every failure.
    Fixed(Duration),
    /// `attempt² × unit` after the n-th failure.
    Quadratic(Duration),
}

impl Backoff {
    /// Delay to sleep after failed attempt number `attempt` (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        match *self {
            Backoff::Fixed(d) => d,
            Backoff::Quadratic(unit) => unit.saturating_mul(attempt.saturating_mul(attempt)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Backoff) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    /// Sum of every sleep a fully failing run performs.
    pub fn total_backoff(&self) -> Duration {
        (1..self.max_attempts)
            .map(|attempt| self.backoff.delay(attempt))
            .fold(Duration::ZERO, Duration::saturating_add)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapState {
    Disconnected,
    Connecting { attempt: u32 },
    Ready,
    Failed,
}

impl fmt::Display for BootstrapState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BootstrapState::Disconnected => f.write_str("disconnected"),
            BootstrapState::Connecting { attempt } => write!(f, "connecting (attempt {attempt})"),
            BootstrapState::Ready => f.write_str("ready"),
            BootstrapState::Failed => f.write_str("failed"),
        }
    }
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("{dependency} unreachable after {attempts} attempts: {last_error}")]
    Exhausted {
        dependency: String,
        attempts: u32,
        last_error: String,
    },
}

/// Something the service cannot start without.
#[async_trait]
pub trait Dependency: Send + Sync {
    type Handle: Send;

    fn name(&self) -> &str;

    /// Opens a connection and verifies it with a round trip.
    async fn connect(&self) -> anyhow::Result<Self::Handle>;
}

#[derive(Debug)]
pub struct Bootstrapper {
    policy: RetryPolicy,
    state: BootstrapState,
}

impl Bootstrapper {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            state: BootstrapState::Disconnected,
        }
    }

    pub fn state(&self) -> BootstrapState {
        self.state
    }

    pub async fn establish<D: Dependency>(&mut self, dep: &D) -> Result<D::Handle, BootstrapError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            self.state = BootstrapState::Connecting { attempt };

            let err = match dep.connect().await {
                Ok(handle) => {
                    self.state = BootstrapState::Ready;
                    info!(dependency = dep.name(), attempt, "dependency ready");
                    return Ok(handle);
                }
                Err(e) => e,
            };

            if attempt >= self.policy.max_attempts {
                self.state = BootstrapState::Failed;
                warn!(
                    dependency = dep.name(),
                    attempts = attempt,
                    error = %err,
                    "giving up on dependency"
                );
                return Err(BootstrapError::Exhausted {
                    dependency: dep.name().to_string(),
                    attempts: attempt,
                    last_error: format!("{err:#}"),
                });
            }

            let delay = self.policy.backoff.delay(attempt);
            warn!(
                dependency = dep.name(),
                attempt,
                max_attempts = self.policy.max_attempts,
                backoff_ms = delay.as_millis() as u64,
                error = %err,
                "dependency not ready yet, backing off"
            );
            tokio::time::sleep(delay).await;
        }
    }
}
