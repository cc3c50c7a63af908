//! In-memory job table.
//!
//! State lives only for the lifetime of the process. Every change is
//! published as a [`JobEvent`] on the store's broadcaster.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::Serialize;

use crate::broadcast::job_events::{JobEvent, JobEventBroadcaster};
use crate::job::{Job, JobStatus, JobSummary};

/// Number of jobs per status bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobCounts {
    pub queued: usize,
    pub in_flight: usize,
    pub completed: usize,
    pub failed: usize,
}

/// Job table shared between the scheduler's owner task and readers.
///
/// Uses `std::sync::RwLock`; no lock is held across an await point.
pub struct JobStore {
    jobs: RwLock<HashMap<String, Job>>,
    events: JobEventBroadcaster,
}

impl JobStore {
    pub fn new(events: JobEventBroadcaster) -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            events,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Job>> {
        match self.jobs.read() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Job store lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Job>> {
        match self.jobs.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Job store lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    pub fn events(&self) -> &JobEventBroadcaster {
        &self.events
    }

    /// Inserts new jobs in order and announces each one.
    pub fn insert_all(&self, jobs: Vec<Job>) {
        let events: Vec<JobEvent> = {
            let mut table = self.write();
            jobs.into_iter()
                .map(|job| {
                    let event = JobEvent::from_job(&job);
                    table.insert(job.id.clone(), job);
                    event
                })
                .collect()
        };
        for event in events {
            self.events.send(event);
        }
    }

    pub fn insert(&self, job: Job) {
        self.insert_all(vec![job]);
    }

    /// Applies `mutate` to a job. The closure reports whether it changed
    /// anything; an event is published only in that case.
    ///
    /// Returns `None` if the job does not exist.
    pub fn update<F>(&self, job_id: &str, mutate: F) -> Option<bool>
    where
        F: FnOnce(&mut Job) -> bool,
    {
        let event = {
            let mut table = self.write();
            let job = table.get_mut(job_id)?;
            if !mutate(job) {
                return Some(false);
            }
            JobEvent::from_job(job)
        };
        self.events.send(event);
        Some(true)
    }

    pub fn get(&self, job_id: &str) -> Option<Job> {
        self.read().get(job_id).cloned()
    }

    /// Fetches jobs by id, keeping the requested order. Missing ids are
    /// skipped.
    pub fn get_many(&self, ids: &[String]) -> Vec<Job> {
        let table = self.read();
        ids.iter().filter_map(|id| table.get(id).cloned()).collect()
    }

    /// Returns all jobs, newest first.
    pub fn get_all(&self) -> Vec<Job> {
        let mut result: Vec<Job> = self.read().values().cloned().collect();
        result.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.seq.cmp(&a.seq))
        });
        result
    }

    /// Credential-free summaries of all jobs, newest first.
    pub fn summaries(&self) -> Vec<JobSummary> {
        self.get_all().iter().map(Job::summary).collect()
    }

    pub fn status_of(&self, job_id: &str) -> Option<JobStatus> {
        self.read().get(job_id).map(|job| job.status)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn counts(&self) -> JobCounts {
        let table = self.read();
        let mut counts = JobCounts::default();
        for job in table.values() {
            match job.status {
                JobStatus::Queued => counts.queued += 1,
                JobStatus::Downloading | JobStatus::Transcribing | JobStatus::Generating => {
                    counts.in_flight += 1
                }
                JobStatus::Completed => counts.completed += 1,
                JobStatus::Failed => counts.failed += 1,
            }
        }
        counts
    }
}

impl Default for JobStore {
    fn default() -> Self {
        Self::new(JobEventBroadcaster::default())
    }
}
