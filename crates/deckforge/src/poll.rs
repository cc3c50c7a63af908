//! Bounded polling of asynchronous remote operations.
//!
//! A remote operation is started once, then its status is checked at a fixed
//! interval until it reports success or failure, or until the attempt budget
//! runs out. Sleeping goes through [`Sleeper`] so tests never wait on the
//! wall clock.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::config::schema::PollSettings;
use crate::pipeline::error::{Stage, StageError};

/// Observed state of a remote operation.
#[derive(Debug, Clone, PartialEq)]
pub enum PollState<T> {
    Pending,
    Succeeded(T),
    Failed(StageError),
}

/// Spacing and budget for status checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl PollPolicy {
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts,
        }
    }

    /// Total time spent sleeping if every attempt is used.
    pub fn budget(&self) -> Duration {
        self.interval.saturating_mul(self.max_attempts)
    }
}

impl From<&PollSettings> for PollPolicy {
    fn from(settings: &PollSettings) -> Self {
        Self::new(
            Duration::from_millis(settings.interval_ms),
            settings.max_attempts,
        )
    }
}

#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Sleeps on the tokio timer.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Starts a remote operation and waits for it to finish.
///
/// `check` receives the handle returned by `start` and the 1-based attempt
/// number. A check is preceded by one poll interval of sleep. A
/// [`PollState::Failed`] or an `Err` from `check` ends polling immediately;
/// running out of attempts while still pending yields
/// [`StageError::Timeout`].
pub async fn run_bounded<H, T, S, C, CFut>(
    stage: Stage,
    policy: PollPolicy,
    sleeper: &dyn Sleeper,
    start: S,
    mut check: C,
) -> Result<T, StageError>
where
    H: Clone,
    S: Future<Output = Result<H, StageError>>,
    C: FnMut(H, u32) -> CFut,
    CFut: Future<Output = Result<PollState<T>, StageError>>,
{
    let handle = start.await?;

    for attempt in 1..=policy.max_attempts {
        sleeper.sleep(policy.interval).await;

        match check(handle.clone(), attempt).await? {
            PollState::Pending => {
                debug!(%stage, attempt, "Remote operation still pending");
            }
            PollState::Succeeded(value) => {
                debug!(%stage, attempt, "Remote operation succeeded");
                return Ok(value);
            }
            PollState::Failed(err) => {
                warn!(%stage, attempt, code = err.code().as_str(), "Remote operation failed");
                return Err(err);
            }
        }
    }

    Err(StageError::Timeout {
        stage,
        attempts: policy.max_attempts,
        waited: policy.budget(),
    })
}
