//! The scheduler's owner task.
//!
//! One task owns the admission queue and the merge coordinator and is the
//! only writer of job state once a job has been submitted. Runner tasks
//! talk to it through [`SchedulerMessage`]s. A concurrency slot is a
//! semaphore permit; it travels with the `Finished` message and is released
//! only after the job's outcome has been recorded.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, WeakUnboundedSender};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinError;
use tracing::{debug, error, info, warn};

use crate::broadcast::JobStore;
use crate::job::{Job, JobFailure, JobMode, JobResult, JobStatus};
use crate::pipeline::error::{Stage, StageError};
use crate::pipeline::{Pipeline, PipelineContext, ProgressEvent, ProgressReporter};

use super::merge::{MergeCoordinator, ReadyMerge};

/// How a runner task ended.
#[derive(Debug)]
pub(crate) enum TaskOutcome {
    Finished(Result<JobResult, StageError>),
    Panicked(String),
}

pub(crate) enum SchedulerMessage {
    Enqueue(Vec<String>),
    Progress {
        job_id: String,
        event: ProgressEvent,
    },
    Finished {
        job_id: String,
        outcome: TaskOutcome,
        permit: OwnedSemaphorePermit,
    },
    CheckMerge(String),
    Shutdown,
}

/// Forwards pipeline progress to the owner task.
struct ChannelProgress {
    job_id: String,
    sender: UnboundedSender<SchedulerMessage>,
}

impl ProgressReporter for ChannelProgress {
    fn report(&self, event: ProgressEvent) {
        // The owner may already be gone after shutdown
        let _ = self.sender.send(SchedulerMessage::Progress {
            job_id: self.job_id.clone(),
            event,
        });
    }
}

pub(crate) struct Dispatcher {
    store: Arc<JobStore>,
    pipeline: Pipeline,
    slots: Arc<Semaphore>,
    queue: VecDeque<String>,
    merges: MergeCoordinator,
    receiver: UnboundedReceiver<SchedulerMessage>,
    sender: WeakUnboundedSender<SchedulerMessage>,
    /// Runner tasks whose outcome has not been recorded yet.
    running: usize,
    stopping: bool,
}

impl Dispatcher {
    pub(crate) fn new(
        store: Arc<JobStore>,
        pipeline: Pipeline,
        slots: Arc<Semaphore>,
        receiver: UnboundedReceiver<SchedulerMessage>,
        sender: WeakUnboundedSender<SchedulerMessage>,
    ) -> Self {
        Self {
            store,
            pipeline,
            slots,
            queue: VecDeque::new(),
            merges: MergeCoordinator::new(),
            receiver,
            sender,
            running: 0,
            stopping: false,
        }
    }

    /// Processes messages until every sender is gone, or until shutdown has
    /// been requested and every running job has reported its outcome.
    pub(crate) async fn run(mut self) {
        debug!("Scheduler owner task started");

        while let Some(message) = self.receiver.recv().await {
            match message {
                SchedulerMessage::Enqueue(ids) => {
                    debug!(count = ids.len(), "Jobs enqueued");
                    self.queue.extend(ids);
                }
                SchedulerMessage::Progress { job_id, event } => {
                    self.store.update(&job_id, |job| {
                        job.advance(event.status, event.progress, &event.message)
                    });
                }
                SchedulerMessage::Finished {
                    job_id,
                    outcome,
                    permit,
                } => {
                    self.running = self.running.saturating_sub(1);
                    self.finish(&job_id, outcome);
                    drop(permit);
                }
                SchedulerMessage::CheckMerge(parent_id) => {
                    self.merges.check(&self.store, &parent_id);
                }
                SchedulerMessage::Shutdown => {
                    info!(
                        queued = self.queue.len(),
                        running = self.running,
                        "Scheduler shutting down"
                    );
                    self.stopping = true;
                }
            }

            if self.stopping {
                if self.running == 0 {
                    break;
                }
            } else {
                self.dispatch();
            }
        }

        debug!("Scheduler owner task stopped");
    }

    /// Starts work while slots are free. Ready merge parents go first.
    fn dispatch(&mut self) {
        while self.merges.has_ready() || !self.queue.is_empty() {
            let Ok(permit) = Arc::clone(&self.slots).try_acquire_owned() else {
                return;
            };

            if let Some(ready) = self.merges.next_ready() {
                self.start_merge(ready, permit);
                continue;
            }

            let Some(job_id) = self.queue.pop_front() else {
                return;
            };
            let Some(job) = self.store.get(&job_id) else {
                warn!(job_id = %job_id, "Queued job vanished, skipping");
                continue;
            };
            match job.mode {
                JobMode::MergeParent => {
                    debug!(job_id = %job_id, "Merge parent found in queue, skipping");
                }
                _ if job.is_finished() => {
                    debug!(job_id = %job_id, "Queued job already finished, skipping");
                }
                _ => self.start_run(job, permit),
            }
        }
    }

    fn start_run(&mut self, job: Job, permit: OwnedSemaphorePermit) {
        let Some(sender) = self.sender.upgrade() else {
            return;
        };

        self.store.update(&job.id, |j| {
            j.advance(JobStatus::Downloading, 0, "Starting download")
        });
        info!(job_id = %job.id, mode = ?job.mode, "Job dispatched");
        self.running += 1;

        let ctx = PipelineContext::from_job(&job);
        let pipeline = self.pipeline.clone();
        let reporter = ChannelProgress {
            job_id: job.id.clone(),
            sender: sender.clone(),
        };

        tokio::spawn(async move {
            let job_id = ctx.job_id.clone();
            let task = tokio::spawn(async move { pipeline.run(&ctx, &reporter).await });
            let outcome = join_outcome(task.await);
            let _ = sender.send(SchedulerMessage::Finished {
                job_id,
                outcome,
                permit,
            });
        });
    }

    fn start_merge(&mut self, ready: ReadyMerge, permit: OwnedSemaphorePermit) {
        let Some(parent) = self.store.get(&ready.parent_id) else {
            return;
        };
        if parent.is_finished() {
            return;
        }
        let Some(sender) = self.sender.upgrade() else {
            return;
        };

        self.store.update(&parent.id, |j| {
            j.advance(JobStatus::Generating, 75, "Generating presentation")
        });
        info!(job_id = %parent.id, sources = parent.child_ids.len(), "Merge synthesis dispatched");
        self.running += 1;

        let ctx = PipelineContext::from_job(&parent);
        let pipeline = self.pipeline.clone();
        let reporter = ChannelProgress {
            job_id: parent.id.clone(),
            sender: sender.clone(),
        };
        let combined = ready.combined;

        tokio::spawn(async move {
            let job_id = ctx.job_id.clone();
            let task = tokio::spawn(async move {
                let url = pipeline
                    .synthesize_merged(&ctx, &combined, &reporter)
                    .await?;
                Ok::<_, StageError>(JobResult {
                    transcript: combined,
                    presentation_url: Some(url),
                })
            });
            let outcome = join_outcome(task.await);
            let _ = sender.send(SchedulerMessage::Finished {
                job_id,
                outcome,
                permit,
            });
        });
    }

    /// Records a runner's outcome and notifies the merge coordinator.
    fn finish(&mut self, job_id: &str, outcome: TaskOutcome) {
        let Some(job) = self.store.get(job_id) else {
            warn!(job_id, "Finished job vanished");
            return;
        };

        let result = match outcome {
            TaskOutcome::Finished(result) => result,
            TaskOutcome::Panicked(detail) => {
                error!(job_id, panic = %detail, "Job runner panicked");
                Err(StageError::Unknown {
                    stage: stage_of(job.status),
                    detail: "processing stopped unexpectedly".to_string(),
                })
            }
        };

        match result {
            Ok(result) => {
                info!(job_id, "Job completed");
                self.store.update(job_id, |j| j.complete(result));
            }
            Err(err) => {
                warn!(
                    job_id,
                    code = err.code().as_str(),
                    retryable = err.retryable(),
                    error = %err,
                    "Job failed"
                );
                self.store.update(job_id, |j| j.fail(JobFailure::from(&err)));
            }
        }

        if let (JobMode::MergeChild, Some(parent_id)) = (job.mode, job.parent_id.as_deref()) {
            self.merges.check(&self.store, parent_id);
        }
    }
}

fn join_outcome(joined: Result<Result<JobResult, StageError>, JoinError>) -> TaskOutcome {
    match joined {
        Ok(result) => TaskOutcome::Finished(result),
        Err(e) if e.is_panic() => {
            let payload = e.into_panic();
            let detail = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "non-string panic payload".to_string());
            TaskOutcome::Panicked(detail)
        }
        Err(e) => TaskOutcome::Panicked(e.to_string()),
    }
}

/// Stage a job was in, judged by its status.
fn stage_of(status: JobStatus) -> Stage {
    match status {
        JobStatus::Transcribing => Stage::Transform,
        JobStatus::Generating => Stage::Synthesize,
        _ => Stage::Resolve,
    }
}
