use crate::job::{JobMode, JobStatus};
use crate::pipeline::error::Stage;

/// Overall progress emitted by the pipeline while a job runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    pub status: JobStatus,
    /// 0..=100 across the whole job.
    pub progress: u8,
    pub message: String,
}

pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// No-op reporter for unit tests.
pub struct NoopProgress;

impl ProgressReporter for NoopProgress {
    fn report(&self, _event: ProgressEvent) {}
}

/// Portion of overall progress owned by one stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageSlice {
    pub base: u8,
    pub weight: u8,
}

impl StageSlice {
    const fn new(base: u8, weight: u8) -> Self {
        Self { base, weight }
    }

    fn scale(&self, local: u8) -> u8 {
        let local = u16::from(local.min(100));
        self.base + (local * u16::from(self.weight) / 100) as u8
    }
}

/// Maps stage-local progress onto the job's 0..=100 range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageWeights {
    pub resolve: StageSlice,
    pub transform: StageSlice,
    /// Absent for jobs that stop after transform.
    pub synthesize: Option<StageSlice>,
}

impl StageWeights {
    pub const FULL: StageWeights = StageWeights {
        resolve: StageSlice::new(0, 30),
        transform: StageSlice::new(30, 40),
        synthesize: Some(StageSlice::new(70, 30)),
    };

    pub const TRANSFORM_ONLY: StageWeights = StageWeights {
        resolve: StageSlice::new(0, 50),
        transform: StageSlice::new(50, 50),
        synthesize: None,
    };

    pub fn for_mode(mode: JobMode) -> Self {
        match mode {
            JobMode::Individual | JobMode::MergeParent => Self::FULL,
            JobMode::MergeChild => Self::TRANSFORM_ONLY,
        }
    }

    pub fn overall(&self, stage: Stage, local: u8) -> u8 {
        match stage {
            Stage::Resolve => self.resolve.scale(local),
            Stage::Transform => self.transform.scale(local),
            Stage::Synthesize => self.synthesize.map_or(100, |s| s.scale(local)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_weights() {
        let w = StageWeights::for_mode(JobMode::Individual);
        assert_eq!(w.overall(Stage::Resolve, 0), 0);
        assert_eq!(w.overall(Stage::Resolve, 100), 30);
        assert_eq!(w.overall(Stage::Transform, 0), 30);
        assert_eq!(w.overall(Stage::Transform, 50), 50);
        assert_eq!(w.overall(Stage::Transform, 100), 70);
        assert_eq!(w.overall(Stage::Synthesize, 0), 70);
        assert_eq!(w.overall(Stage::Synthesize, 100), 100);
        assert_eq!(StageWeights::for_mode(JobMode::MergeParent), w);
    }

    #[test]
    fn test_child_weights() {
        let w = StageWeights::for_mode(JobMode::MergeChild);
        assert_eq!(w.overall(Stage::Resolve, 100), 50);
        assert_eq!(w.overall(Stage::Transform, 20), 60);
        assert_eq!(w.overall(Stage::Transform, 100), 100);
        assert!(w.synthesize.is_none());
    }

    #[test]
    fn test_local_progress_is_clamped() {
        let w = StageWeights::FULL;
        assert_eq!(w.overall(Stage::Resolve, 250), 30);
    }
}
