//! Fan-in of merge children into their parent.
//!
//! After each child reaches a terminal state the parent is re-evaluated:
//! any failed child fails the parent at once, otherwise the parent's
//! progress tracks the share of completed children. Once every child has
//! completed, the parent is released with the children's combined text and
//! waits for a free slot to run synthesis.

use std::collections::{HashMap, HashSet, VecDeque};

use tracing::{debug, info, warn};

use crate::broadcast::JobStore;
use crate::job::{Job, JobFailure, JobMode, JobStatus};
use crate::pipeline::error::ErrorCode;
use crate::sanitize;

/// Share of overall progress covered by the children; synthesis owns the rest.
const CHILDREN_SHARE: usize = 70;

/// A parent whose children are all done.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadyMerge {
    pub parent_id: String,
    pub combined: String,
}

/// What a merge check did to the parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeCheck {
    /// Parent unknown, not a parent, already terminal or already released.
    Ignored,
    Failed,
    Waiting { completed: usize, total: usize },
    Released,
}

/// Outcome of looking at a parent's children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeDecision {
    Fail(JobFailure),
    Wait { completed: usize, total: usize },
    Ready(String),
}

/// Tracks parents that are ready for synthesis.
#[derive(Debug, Default)]
pub struct MergeCoordinator {
    ready: VecDeque<ReadyMerge>,
    released: HashSet<String>,
}

impl MergeCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_ready(&self) -> bool {
        !self.ready.is_empty()
    }

    pub fn next_ready(&mut self) -> Option<ReadyMerge> {
        self.ready.pop_front()
    }

    pub fn is_released(&self, parent_id: &str) -> bool {
        self.released.contains(parent_id)
    }

    /// Re-evaluates a parent. Safe to call any number of times.
    pub fn check(&mut self, store: &JobStore, parent_id: &str) -> MergeCheck {
        let Some(parent) = store.get(parent_id) else {
            warn!(parent_id, "Merge check for unknown job");
            return MergeCheck::Ignored;
        };
        if parent.mode != JobMode::MergeParent {
            warn!(job_id = parent_id, "Merge check for a job that is not a merge parent");
            return MergeCheck::Ignored;
        }
        if parent.is_finished() || self.is_released(parent_id) {
            return MergeCheck::Ignored;
        }

        let children = store.get_many(&parent.child_ids);
        match evaluate(&parent, &children) {
            MergeDecision::Fail(failure) => {
                warn!(parent_id, error = %failure.message, "Merge failed");
                store.update(parent_id, |job| job.fail(failure));
                MergeCheck::Failed
            }
            MergeDecision::Wait { completed, total } => {
                debug!(parent_id, completed, total, "Merge waiting on children");
                store.update(parent_id, |job| {
                    let status = job.status;
                    job.advance(
                        status,
                        waiting_progress(completed, total),
                        &format!("{} of {} sources transcribed", completed, total),
                    )
                });
                MergeCheck::Waiting { completed, total }
            }
            MergeDecision::Ready(combined) => {
                let total = parent.child_ids.len();
                info!(parent_id, sources = total, "All merge sources transcribed");
                store.update(parent_id, |job| {
                    let status = job.status;
                    job.advance(
                        status,
                        waiting_progress(total, total),
                        &format!(
                            "All {} sources transcribed, waiting for a free slot",
                            total
                        ),
                    )
                });
                self.released.insert(parent_id.to_string());
                self.ready.push_back(ReadyMerge {
                    parent_id: parent_id.to_string(),
                    combined,
                });
                MergeCheck::Released
            }
        }
    }
}

/// Parent progress while `completed` of `total` children are done.
pub fn waiting_progress(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return CHILDREN_SHARE as u8;
    }
    (CHILDREN_SHARE * completed.min(total) / total) as u8
}

/// Decides what the parent should do given its children.
///
/// `children` may come in any order; `parent.child_ids` fixes the order
/// used for failure reporting and for the combined text.
pub fn evaluate(parent: &Job, children: &[Job]) -> MergeDecision {
    let by_id: HashMap<&str, &Job> = children.iter().map(|c| (c.id.as_str(), c)).collect();
    let total = parent.child_ids.len();

    let mut ordered = Vec::with_capacity(total);
    for (index, child_id) in parent.child_ids.iter().enumerate() {
        let Some(child) = by_id.get(child_id.as_str()) else {
            return MergeDecision::Fail(JobFailure {
                message: format!("Source {} of {} is missing", index + 1, total),
                code: ErrorCode::Unknown,
                retryable: false,
            });
        };
        if child.status == JobStatus::Failed {
            return MergeDecision::Fail(child_failure(index, total, child));
        }
        ordered.push(*child);
    }

    let completed = ordered
        .iter()
        .filter(|c| c.status == JobStatus::Completed)
        .count();
    if completed < total {
        return MergeDecision::Wait { completed, total };
    }

    MergeDecision::Ready(combine_transcripts(&ordered))
}

fn child_failure(index: usize, total: usize, child: &Job) -> JobFailure {
    let (reason, code, retryable) = match &child.failure {
        Some(f) => (f.message.clone(), f.code, f.retryable),
        None => ("unknown error".to_string(), ErrorCode::Unknown, false),
    };
    JobFailure {
        message: format!(
            "Source {} of {} ({}, job {}) failed: {}",
            index + 1,
            total,
            sanitize::redact_locator(&child.locator),
            child.id,
            reason
        ),
        code,
        retryable,
    }
}

/// Joins child transcripts in the given order, one labelled section each.
pub fn combine_transcripts(children: &[&Job]) -> String {
    children
        .iter()
        .enumerate()
        .map(|(index, child)| {
            let text = child
                .result
                .as_ref()
                .map(|r| r.transcript.trim())
                .unwrap_or_default();
            format!(
                "### Source {}: {}\n\n{}",
                index + 1,
                sanitize::redact_locator(&child.locator),
                text
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}
