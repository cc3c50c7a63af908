//! Builders for scripted collaborators and started schedulers.

#![allow(dead_code)]

use std::sync::Arc;

use tokio::sync::Semaphore;

use deckforge::{Pipeline, Scheduler, SchedulerConfig, StageError};

use super::harness::FakeStages;

/// Builder for creating `FakeStages` instances.
pub struct StagesBuilder {
    stages: FakeStages,
}

impl StagesBuilder {
    pub fn new() -> Self {
        Self {
            stages: FakeStages::new(),
        }
    }

    /// Hold the transform for `locator` until [`FakeStages::release`].
    pub fn gated(mut self, locator: &str) -> Self {
        self.stages
            .gates
            .insert(locator.to_string(), Arc::new(Semaphore::new(0)));
        self
    }

    pub fn gate_all(mut self, locators: &[&str]) -> Self {
        for locator in locators {
            self = self.gated(locator);
        }
        self
    }

    /// Make the transform for `locator` fail with `err`.
    pub fn failing(mut self, locator: &str, err: StageError) -> Self {
        self.stages.failures.insert(locator.to_string(), err);
        self
    }

    /// Make the transform for `locator` panic.
    pub fn panicking(mut self, locator: &str) -> Self {
        self.stages.panics.insert(locator.to_string());
        self
    }

    pub fn transcript(mut self, locator: &str, text: &str) -> Self {
        self.stages
            .transcripts
            .insert(locator.to_string(), text.to_string());
        self
    }

    /// Hold every synthesize call until [`FakeStages::release_synthesis`].
    pub fn synthesis_gated(mut self) -> Self {
        self.stages.synthesis_gate = Some(Arc::new(Semaphore::new(0)));
        self
    }

    /// Make every synthesize call fail with `err`.
    pub fn synthesis_failing(mut self, err: StageError) -> Self {
        self.stages.synthesis_failure = Some(err);
        self
    }

    pub fn build(self) -> Arc<FakeStages> {
        Arc::new(self.stages)
    }
}

impl Default for StagesBuilder {
    fn default() -> Self {
        Self::new()
    }
}

pub fn pipeline(stages: &Arc<FakeStages>) -> Pipeline {
    Pipeline::new(stages.clone(), stages.clone(), stages.clone())
}

/// Starts a scheduler with the given ceiling on top of `stages`.
pub fn start_scheduler(max_concurrency: usize, stages: &Arc<FakeStages>) -> Scheduler {
    Scheduler::start(
        SchedulerConfig {
            max_concurrency,
            ..SchedulerConfig::default()
        },
        pipeline(stages),
    )
}

pub fn urls(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
