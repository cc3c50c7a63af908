//! Scriptable pipeline collaborators and polling helpers.
//!
//! `FakeStages` implements all three stage traits. Transform can be held
//! back per URL by a gate, made to fail or made to panic, and records how
//! many transforms run at the same time.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, Semaphore};
use tokio::time::Instant;

use deckforge::sanitize::redact_locator;
use deckforge::stages::StatusCallback;
use deckforge::{
    Credentials, InputResolver, JobEvent, JobSummary, ResolvedInput, ResourceHandle, Scheduler,
    ScopedCleanup, Stage, StageError, StageUpdate, Synthesizer, Transformer,
};

/// Upper bound for any single wait in a test.
pub const WAIT_LIMIT: Duration = Duration::from_secs(5);

pub struct FakeStages {
    pub(crate) gates: HashMap<String, Arc<Semaphore>>,
    pub(crate) failures: HashMap<String, StageError>,
    pub(crate) panics: HashSet<String>,
    pub(crate) transcripts: HashMap<String, String>,
    pub(crate) synthesis_failure: Option<StageError>,
    pub(crate) synthesis_gate: Option<Arc<Semaphore>>,
    running: AtomicUsize,
    peak: AtomicUsize,
    cleanups: Arc<AtomicUsize>,
    synthesized: Mutex<Vec<String>>,
}

impl FakeStages {
    pub(crate) fn new() -> Self {
        Self {
            gates: HashMap::new(),
            failures: HashMap::new(),
            panics: HashSet::new(),
            transcripts: HashMap::new(),
            synthesis_failure: None,
            synthesis_gate: None,
            running: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            cleanups: Arc::new(AtomicUsize::new(0)),
            synthesized: Mutex::new(Vec::new()),
        }
    }

    /// Lets the gated transform for `locator` finish.
    pub fn release(&self, locator: &str) {
        match self.gates.get(locator) {
            Some(gate) => gate.add_permits(1),
            None => panic!("no gate registered for {}", locator),
        }
    }

    /// Lets one gated synthesize call finish.
    pub fn release_synthesis(&self) {
        match &self.synthesis_gate {
            Some(gate) => gate.add_permits(1),
            None => panic!("synthesis is not gated"),
        }
    }

    /// Most transforms observed running at once.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn running(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }

    /// Number of resolved inputs released so far.
    pub fn cleanups(&self) -> usize {
        self.cleanups.load(Ordering::SeqCst)
    }

    /// Text handed to every synthesize call, in call order.
    pub fn synthesized(&self) -> Vec<String> {
        self.synthesized
            .lock()
            .expect("synthesized lock poisoned")
            .clone()
    }

    pub fn transcript_for(&self, locator: &str) -> String {
        self.transcripts
            .get(locator)
            .cloned()
            .unwrap_or_else(|| format!("transcript of {}", redact_locator(locator)))
    }
}

/// Decrements the running counter even when a transform panics.
struct RunningGuard<'a>(&'a AtomicUsize);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl InputResolver for FakeStages {
    async fn resolve(
        &self,
        locator: &str,
        on_status: StatusCallback<'_>,
    ) -> Result<ResolvedInput, StageError> {
        on_status(StageUpdate::new(Stage::Resolve, 50, "Fetching"));
        let cleanups = Arc::clone(&self.cleanups);
        Ok(ResolvedInput {
            handle: ResourceHandle {
                path: PathBuf::from(locator),
                media_type: "audio/mpeg".to_string(),
            },
            cleanup: ScopedCleanup::new(format!("fake {}", locator), async move {
                cleanups.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        })
    }
}

#[async_trait]
impl Transformer for FakeStages {
    async fn transform(
        &self,
        input: &ResourceHandle,
        _credentials: &Credentials,
        on_status: StatusCallback<'_>,
    ) -> Result<String, StageError> {
        let locator = input.path.to_string_lossy().to_string();

        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let _guard = RunningGuard(&self.running);

        on_status(StageUpdate::new(Stage::Transform, 10, "Uploading"));
        if let Some(gate) = self.gates.get(&locator) {
            gate.acquire()
                .await
                .expect("gate closed")
                .forget();
        }
        on_status(StageUpdate::new(Stage::Transform, 90, "Transcribing"));

        if self.panics.contains(&locator) {
            panic!("transcriber crashed on {}", locator);
        }
        if let Some(err) = self.failures.get(&locator) {
            return Err(err.clone());
        }
        Ok(self.transcript_for(&locator))
    }
}

#[async_trait]
impl Synthesizer for FakeStages {
    async fn synthesize(
        &self,
        text: &str,
        _credentials: &Credentials,
        _on_status: StatusCallback<'_>,
    ) -> Result<String, StageError> {
        if let Some(gate) = &self.synthesis_gate {
            gate.acquire()
                .await
                .expect("gate closed")
                .forget();
        }
        let index = {
            let mut synthesized = self
                .synthesized
                .lock()
                .expect("synthesized lock poisoned");
            synthesized.push(text.to_string());
            synthesized.len()
        };
        match &self.synthesis_failure {
            Some(err) => Err(err.clone()),
            None => Ok(format!("https://slides.example.com/deck/{}", index)),
        }
    }
}

/// Polls until `predicate` holds for the job, or panics after [`WAIT_LIMIT`].
pub async fn wait_for<F>(scheduler: &Scheduler, job_id: &str, what: &str, predicate: F) -> JobSummary
where
    F: Fn(&JobSummary) -> bool,
{
    let deadline = Instant::now() + WAIT_LIMIT;
    loop {
        if let Some(job) = scheduler.get_job(job_id) {
            if predicate(&job) {
                return job;
            }
        }
        if Instant::now() >= deadline {
            panic!(
                "timed out waiting for {} on {}: {:?}",
                what,
                job_id,
                scheduler.get_job(job_id)
            );
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Waits for the job to reach `completed` or `failed`.
pub async fn wait_finished(scheduler: &Scheduler, job_id: &str) -> JobSummary {
    wait_for(scheduler, job_id, "a terminal status", |j| j.status.is_terminal()).await
}

/// Polls an arbitrary condition.
pub async fn wait_until<F>(what: &str, condition: F)
where
    F: Fn() -> bool,
{
    let deadline = Instant::now() + WAIT_LIMIT;
    while !condition() {
        if Instant::now() >= deadline {
            panic!("timed out waiting for {}", what);
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Collects the events of one job until it finishes.
pub async fn events_until_finished(
    receiver: &mut broadcast::Receiver<JobEvent>,
    job_id: &str,
) -> Vec<JobEvent> {
    let mut events = Vec::new();
    let collect = async {
        loop {
            match receiver.recv().await {
                Ok(event) if event.job_id == job_id => {
                    let done = event.is_finished();
                    events.push(event);
                    if done {
                        break;
                    }
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    panic!("event receiver lagged by {}", n)
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    };
    tokio::time::timeout(WAIT_LIMIT, collect)
        .await
        .expect("timed out collecting job events");
    events
}

/// Progress values in order, with consecutive repeats removed.
pub fn progress_steps(events: &[JobEvent]) -> Vec<u8> {
    let mut steps: Vec<u8> = events.iter().map(|e| e.progress).collect();
    steps.dedup();
    steps
}
