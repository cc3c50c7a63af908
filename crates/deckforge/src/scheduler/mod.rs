//! Job admission, bounded-concurrency dispatch and merge fan-in.
//!
//! [`Scheduler`] is a cheap, cloneable handle. Submissions create job
//! records and hand their ids to an owner task that runs at most
//! `max_concurrency` jobs at once, across all modes.

mod dispatcher;
pub mod merge;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, Semaphore};
use tracing::info;

use crate::broadcast::{JobCounts, JobEvent, JobEventBroadcaster, JobStore};
use crate::config::Config;
use crate::credentials::Credentials;
use crate::error::SchedulerError;
use crate::job::{validate_locator, Job, JobSummary};
use crate::pipeline::Pipeline;

use dispatcher::{Dispatcher, SchedulerMessage};

pub use merge::{MergeCheck, MergeCoordinator, MergeDecision, ReadyMerge};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Jobs allowed to be processing at once.
    pub max_concurrency: usize,
    /// Capacity of the job event broadcast channel.
    pub event_capacity: usize,
}

impl SchedulerConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_concurrency: config.max_concurrency,
            event_capacity: config.event_capacity,
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 2,
            event_capacity: 1024,
        }
    }
}

#[derive(Clone)]
pub struct Scheduler {
    store: Arc<JobStore>,
    sender: mpsc::UnboundedSender<SchedulerMessage>,
    slots: Arc<Semaphore>,
    max_concurrency: usize,
    next_seq: Arc<AtomicU64>,
    stopped: Arc<AtomicBool>,
}

impl Scheduler {
    /// Spawns the owner task. Must be called from within a tokio runtime.
    pub fn start(config: SchedulerConfig, pipeline: Pipeline) -> Self {
        let max_concurrency = config.max_concurrency.max(1);
        let store = Arc::new(JobStore::new(JobEventBroadcaster::new(
            config.event_capacity,
        )));
        let slots = Arc::new(Semaphore::new(max_concurrency));
        let (sender, receiver) = mpsc::unbounded_channel();

        let dispatcher = Dispatcher::new(
            Arc::clone(&store),
            pipeline,
            Arc::clone(&slots),
            receiver,
            sender.downgrade(),
        );
        tokio::spawn(dispatcher.run());

        info!(max_concurrency, "Scheduler started");

        Self {
            store,
            sender,
            slots,
            max_concurrency,
            next_seq: Arc::new(AtomicU64::new(0)),
            stopped: Arc::new(AtomicBool::new(false)),
        }
    }

    fn next_seq(&self) -> u64 {
        self.next_seq.fetch_add(1, Ordering::Relaxed)
    }

    fn check_submission(&self, locators: &[String]) -> Result<(), SchedulerError> {
        if self.is_stopped() {
            return Err(SchedulerError::Stopped);
        }
        if locators.is_empty() {
            return Err(SchedulerError::EmptySubmission);
        }
        for locator in locators {
            validate_locator(locator)?;
        }
        Ok(())
    }

    fn admit(&self, jobs: Vec<Job>, queued: Vec<String>) -> Result<Vec<JobSummary>, SchedulerError> {
        let summaries = jobs.iter().map(Job::summary).collect();
        self.store.insert_all(jobs);
        self.sender
            .send(SchedulerMessage::Enqueue(queued))
            .map_err(|_| SchedulerError::Stopped)?;
        Ok(summaries)
    }

    /// Creates one independent job per locator.
    ///
    /// All locators are validated first; nothing is created if any is
    /// rejected.
    pub fn submit(
        &self,
        locators: &[String],
        credentials: Credentials,
    ) -> Result<Vec<JobSummary>, SchedulerError> {
        self.check_submission(locators)?;
        let credentials = Arc::new(credentials);

        let jobs: Vec<Job> = locators
            .iter()
            .map(|l| Job::individual(l.trim(), Arc::clone(&credentials), self.next_seq()))
            .collect();
        let ids = jobs.iter().map(|j| j.id.clone()).collect();

        info!(count = locators.len(), "Individual jobs submitted");
        self.admit(jobs, ids)
    }

    /// Creates one child per locator plus a parent that combines them.
    ///
    /// Children are queued; the parent is not, it runs once all children
    /// have completed. Returns the children followed by the parent.
    pub fn submit_merge(
        &self,
        locators: &[String],
        credentials: Credentials,
    ) -> Result<Vec<JobSummary>, SchedulerError> {
        self.check_submission(locators)?;
        if locators.len() < 2 {
            return Err(SchedulerError::MergeTooSmall {
                count: locators.len(),
            });
        }
        let credentials = Arc::new(credentials);
        let locators: Vec<String> = locators.iter().map(|l| l.trim().to_string()).collect();

        let parent_id = uuid::Uuid::new_v4().to_string();
        let mut jobs: Vec<Job> = locators
            .iter()
            .map(|l| Job::merge_child(l, Arc::clone(&credentials), &parent_id, self.next_seq()))
            .collect();
        let child_ids: Vec<String> = jobs.iter().map(|j| j.id.clone()).collect();
        jobs.push(Job::merge_parent(
            parent_id.clone(),
            &locators,
            credentials,
            child_ids.clone(),
            self.next_seq(),
        ));

        info!(parent_id = %parent_id, sources = locators.len(), "Merge submitted");
        self.admit(jobs, child_ids)
    }

    /// Credential-free view of one job.
    pub fn get_job(&self, job_id: &str) -> Option<JobSummary> {
        self.store.get(job_id).map(|job| job.summary())
    }

    /// All jobs, newest first.
    pub fn list_jobs(&self) -> Vec<JobSummary> {
        self.store.summaries()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.store.events().subscribe()
    }

    /// Jobs currently holding a concurrency slot.
    pub fn active_count(&self) -> usize {
        self.max_concurrency
            .saturating_sub(self.slots.available_permits())
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    pub fn counts(&self) -> JobCounts {
        self.store.counts()
    }

    /// Asks the owner task to re-evaluate a merge parent. Repeated requests
    /// are harmless.
    pub fn request_merge_check(&self, parent_id: &str) {
        let _ = self
            .sender
            .send(SchedulerMessage::CheckMerge(parent_id.to_string()));
    }

    /// Stops dispatching and rejects new submissions. Jobs already running
    /// still finish and have their outcome recorded; queued jobs stay queued.
    pub fn shutdown(&self) {
        if !self.stopped.swap(true, Ordering::SeqCst) {
            let _ = self.sender.send(SchedulerMessage::Shutdown);
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst) || self.sender.is_closed()
    }
}
