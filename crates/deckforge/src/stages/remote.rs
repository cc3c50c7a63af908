//! Adapters that turn a remote start/check API into a [`Transformer`] or a
//! [`Synthesizer`] by waiting on it with [`poll::run_bounded`].

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::operations::{Synthesizer, Transformer};
use super::resolver::ResourceHandle;
use super::{StageUpdate, StatusCallback};
use crate::credentials::Credentials;
use crate::pipeline::error::{Stage, StageError};
use crate::poll::{self, PollPolicy, PollState, Sleeper, TokioSleeper};

/// A long-running operation on a remote service.
///
/// `start` submits the work and returns an operation id; `check` reports
/// the state of that operation. HTTP error responses should be mapped with
/// [`StageError::from_http_status`].
#[async_trait]
pub trait RemoteOperation: Send + Sync {
    type Input: ?Sized + Sync;
    type Output: Send;

    fn stage(&self) -> Stage;

    async fn start(
        &self,
        input: &Self::Input,
        credentials: &Credentials,
    ) -> Result<String, StageError>;

    async fn check(
        &self,
        operation_id: &str,
        credentials: &Credentials,
    ) -> Result<PollState<Self::Output>, StageError>;
}

/// Stage-local progress for a poll attempt, kept within 5..=95.
fn attempt_progress(attempt: u32, max_attempts: u32) -> u8 {
    let max = u64::from(max_attempts.max(1));
    let attempt = u64::from(attempt.min(max_attempts));
    (5 + attempt * 90 / max) as u8
}

async fn run_polled<O: RemoteOperation>(
    operation: &O,
    policy: PollPolicy,
    sleeper: &dyn Sleeper,
    input: &O::Input,
    credentials: &Credentials,
    on_status: StatusCallback<'_>,
) -> Result<O::Output, StageError> {
    let stage = operation.stage();
    on_status(StageUpdate::new(stage, 0, format!("{} submitted", stage)));

    let output = poll::run_bounded(
        stage,
        policy,
        sleeper,
        async {
            let id = operation.start(input, credentials).await?;
            debug!(%stage, operation_id = %id, "Remote operation started");
            Ok(id)
        },
        |operation_id: String, attempt| {
            on_status(StageUpdate::new(
                stage,
                attempt_progress(attempt, policy.max_attempts),
                format!("{} in progress", stage),
            ));
            async move { operation.check(&operation_id, credentials).await }
        },
    )
    .await?;

    on_status(StageUpdate::new(stage, 100, format!("{} finished", stage)));
    Ok(output)
}

/// [`Transformer`] backed by a remote transcription service.
pub struct PolledTransformer<O> {
    operation: O,
    policy: PollPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl<O> PolledTransformer<O>
where
    O: RemoteOperation<Input = ResourceHandle, Output = String>,
{
    pub fn new(operation: O, policy: PollPolicy) -> Self {
        Self::with_sleeper(operation, policy, Arc::new(TokioSleeper))
    }

    pub fn with_sleeper(operation: O, policy: PollPolicy, sleeper: Arc<dyn Sleeper>) -> Self {
        Self {
            operation,
            policy,
            sleeper,
        }
    }
}

#[async_trait]
impl<O> Transformer for PolledTransformer<O>
where
    O: RemoteOperation<Input = ResourceHandle, Output = String>,
{
    async fn transform(
        &self,
        input: &ResourceHandle,
        credentials: &Credentials,
        on_status: StatusCallback<'_>,
    ) -> Result<String, StageError> {
        run_polled(
            &self.operation,
            self.policy,
            self.sleeper.as_ref(),
            input,
            credentials,
            on_status,
        )
        .await
    }
}

/// [`Synthesizer`] backed by a remote presentation service.
pub struct PolledSynthesizer<O> {
    operation: O,
    policy: PollPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl<O> PolledSynthesizer<O>
where
    O: RemoteOperation<Input = str, Output = String>,
{
    pub fn new(operation: O, policy: PollPolicy) -> Self {
        Self::with_sleeper(operation, policy, Arc::new(TokioSleeper))
    }

    pub fn with_sleeper(operation: O, policy: PollPolicy, sleeper: Arc<dyn Sleeper>) -> Self {
        Self {
            operation,
            policy,
            sleeper,
        }
    }
}

#[async_trait]
impl<O> Synthesizer for PolledSynthesizer<O>
where
    O: RemoteOperation<Input = str, Output = String>,
{
    async fn synthesize(
        &self,
        text: &str,
        credentials: &Credentials,
        on_status: StatusCallback<'_>,
    ) -> Result<String, StageError> {
        run_polled(
            &self.operation,
            self.policy,
            self.sleeper.as_ref(),
            text,
            credentials,
            on_status,
        )
        .await
    }
}
