//! End-to-end tests for individual jobs running through the scheduler.

mod common;

use std::time::Duration;

use common::*;
use deckforge::{Credentials, ErrorCode, JobMode, JobStatus, Stage, StageError};

const A: &str = "https://media.example.com/watch/a";
const B: &str = "https://media.example.com/watch/b";
const C: &str = "https://media.example.com/watch/c";
const D: &str = "https://media.example.com/watch/d";
const E: &str = "https://media.example.com/watch/e";

#[tokio::test]
async fn test_individual_job_completes() {
    let stages = StagesBuilder::new().build();
    let scheduler = start_scheduler(2, &stages);

    let jobs = scheduler.submit(&urls(&[A]), Credentials::new()).unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].mode, JobMode::Individual);
    assert_eq!(jobs[0].status, JobStatus::Queued);
    assert_eq!(jobs[0].progress, 0);

    let job = wait_finished(&scheduler, &jobs[0].id).await;
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.progress, 100);

    let result = job.result.expect("completed job has a result");
    assert_eq!(result.transcript.as_deref(), Some("transcript of https://media.example.com/watch/a"));
    assert_eq!(
        result.presentation_url.as_deref(),
        Some("https://slides.example.com/deck/1")
    );
    assert_eq!(stages.synthesized(), vec![stages.transcript_for(A)]);

    wait_until("input cleanup", || stages.cleanups() == 1).await;
}

#[tokio::test]
async fn test_concurrency_ceiling_is_respected() {
    let all = [A, B, C, D, E];
    let stages = StagesBuilder::new().gate_all(&all).build();
    let scheduler = start_scheduler(2, &stages);

    let jobs = scheduler.submit(&urls(&all), Credentials::new()).unwrap();

    wait_until("two running transforms", || stages.running() == 2).await;
    // Give the scheduler a chance to over-dispatch
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(stages.running(), 2);
    assert_eq!(scheduler.active_count(), 2);
    let counts = scheduler.counts();
    assert_eq!(counts.in_flight, 2);
    assert_eq!(counts.queued, 3);

    for locator in all {
        stages.release(locator);
    }
    for job in &jobs {
        let job = wait_finished(&scheduler, &job.id).await;
        assert_eq!(job.status, JobStatus::Completed);
    }

    assert_eq!(stages.peak(), 2);
    wait_until("all slots released", || scheduler.active_count() == 0).await;
    assert_eq!(scheduler.counts().completed, 5);
}

#[tokio::test]
async fn test_jobs_start_in_submission_order() {
    let stages = StagesBuilder::new().gate_all(&[A, B, C]).build();
    let scheduler = start_scheduler(1, &stages);

    let jobs = scheduler.submit(&urls(&[A, B, C]), Credentials::new()).unwrap();
    let (a, b, c) = (&jobs[0].id, &jobs[1].id, &jobs[2].id);

    wait_for(&scheduler, a, "transcribing", |j| j.status == JobStatus::Transcribing).await;
    assert_eq!(scheduler.get_job(b).unwrap().status, JobStatus::Queued);
    assert_eq!(scheduler.get_job(c).unwrap().status, JobStatus::Queued);

    stages.release(A);
    wait_finished(&scheduler, a).await;
    wait_for(&scheduler, b, "transcribing", |j| j.status == JobStatus::Transcribing).await;
    assert_eq!(scheduler.get_job(c).unwrap().status, JobStatus::Queued);

    stages.release(B);
    stages.release(C);
    wait_finished(&scheduler, c).await;
}

#[tokio::test]
async fn test_jobs_listed_newest_first() {
    let stages = StagesBuilder::new().build();
    let scheduler = start_scheduler(2, &stages);

    let first = scheduler.submit(&urls(&[A, B]), Credentials::new()).unwrap();
    let second = scheduler.submit(&urls(&[C]), Credentials::new()).unwrap();

    let ids: Vec<String> = scheduler.list_jobs().into_iter().map(|j| j.id).collect();
    assert_eq!(
        ids,
        vec![
            second[0].id.clone(),
            first[1].id.clone(),
            first[0].id.clone()
        ]
    );
    assert!(scheduler.get_job("no-such-job").is_none());
}

#[tokio::test]
async fn test_views_never_expose_secrets() {
    let stages = StagesBuilder::new().build();
    let scheduler = start_scheduler(2, &stages);
    let mut events = scheduler.subscribe();

    let credentials = Credentials::new()
        .with("transcription", "sk-live-transcription-secret")
        .with("slides", "sk-live-slides-secret");
    let locator = "https://media.example.com/watch/a?token=url-secret&t=42";
    let jobs = scheduler.submit(&urls(&[locator]), credentials).unwrap();

    let collected = events_until_finished(&mut events, &jobs[0].id).await;
    let summaries = serde_json::to_string(&scheduler.list_jobs()).unwrap();
    let event_json = serde_json::to_string(&collected).unwrap();

    for json in [&summaries, &event_json] {
        assert!(!json.contains("sk-live-transcription-secret"));
        assert!(!json.contains("sk-live-slides-secret"));
        assert!(!json.contains("url-secret"));
    }
    assert!(summaries.contains("token=****"));
    assert!(summaries.contains("transcript of https://media.example.com/watch/a?token=****&t=42"));
    assert!(summaries.contains("t=42"));
}

#[tokio::test]
async fn test_progress_never_decreases() {
    let stages = StagesBuilder::new().build();
    let scheduler = start_scheduler(2, &stages);
    let mut events = scheduler.subscribe();

    let jobs = scheduler.submit(&urls(&[A]), Credentials::new()).unwrap();
    let collected = events_until_finished(&mut events, &jobs[0].id).await;

    let progress: Vec<u8> = collected.iter().map(|e| e.progress).collect();
    assert!(
        progress.windows(2).all(|w| w[0] <= w[1]),
        "progress went backwards: {:?}",
        progress
    );

    let statuses: Vec<JobStatus> = collected.iter().map(|e| e.status).collect();
    assert_eq!(statuses.first(), Some(&JobStatus::Queued));
    assert!(statuses.contains(&JobStatus::Downloading));
    assert!(statuses.contains(&JobStatus::Transcribing));
    assert!(statuses.contains(&JobStatus::Generating));

    let last = collected.last().unwrap();
    assert_eq!(last.status, JobStatus::Completed);
    assert_eq!(last.progress, 100);
    assert_eq!(
        last.presentation_url.as_deref(),
        Some("https://slides.example.com/deck/1")
    );
}

#[tokio::test]
async fn test_stage_failure_is_classified() {
    let stages = StagesBuilder::new()
        .failing(A, StageError::from_http_status(Stage::Transform, 401, "invalid api key"))
        .build();
    let scheduler = start_scheduler(2, &stages);

    let jobs = scheduler.submit(&urls(&[A, B]), Credentials::new()).unwrap();

    let failed = wait_finished(&scheduler, &jobs[0].id).await;
    assert_eq!(failed.status, JobStatus::Failed);
    assert_eq!(failed.error_code, Some(ErrorCode::Authentication));
    assert_eq!(failed.retryable, Some(false));
    assert!(failed
        .error
        .as_deref()
        .unwrap()
        .starts_with("Transcription failed"));

    // A sibling in the same batch is unaffected
    let other = wait_finished(&scheduler, &jobs[1].id).await;
    assert_eq!(other.status, JobStatus::Completed);

    // The resolved input is released after a failed transform too
    wait_until("both cleanups", || stages.cleanups() == 2).await;
    assert_eq!(stages.synthesized().len(), 1);
}

#[tokio::test]
async fn test_blank_transcript_fails() {
    let stages = StagesBuilder::new().transcript(A, "  \n\t ").build();
    let scheduler = start_scheduler(2, &stages);

    let jobs = scheduler.submit(&urls(&[A]), Credentials::new()).unwrap();
    let job = wait_finished(&scheduler, &jobs[0].id).await;

    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error_code, Some(ErrorCode::EmptyResult));
    assert!(stages.synthesized().is_empty());
}

#[tokio::test]
async fn test_synthesis_failure_keeps_progress() {
    let stages = StagesBuilder::new()
        .synthesis_failing(StageError::from_http_status(Stage::Synthesize, 402, ""))
        .build();
    let scheduler = start_scheduler(2, &stages);

    let jobs = scheduler.submit(&urls(&[A]), Credentials::new()).unwrap();
    let job = wait_finished(&scheduler, &jobs[0].id).await;

    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error_code, Some(ErrorCode::QuotaExhausted));
    assert!(job.progress >= 70);
    assert!(job.result.is_none());
}

#[tokio::test]
async fn test_panicking_job_releases_its_slot() {
    let stages = StagesBuilder::new().panicking(A).build();
    let scheduler = start_scheduler(1, &stages);

    let jobs = scheduler.submit(&urls(&[A, B]), Credentials::new()).unwrap();

    let crashed = wait_finished(&scheduler, &jobs[0].id).await;
    assert_eq!(crashed.status, JobStatus::Failed);
    assert_eq!(crashed.error_code, Some(ErrorCode::Unknown));
    assert_eq!(crashed.retryable, Some(true));

    let next = wait_finished(&scheduler, &jobs[1].id).await;
    assert_eq!(next.status, JobStatus::Completed);
    wait_until("slot released", || scheduler.active_count() == 0).await;
}

#[tokio::test]
async fn test_shutdown_drains_running_jobs() {
    let stages = StagesBuilder::new().gate_all(&[A, B]).build();
    let scheduler = start_scheduler(1, &stages);

    let jobs = scheduler.submit(&urls(&[A, B]), Credentials::new()).unwrap();
    wait_for(&scheduler, &jobs[0].id, "transcribing", |j| {
        j.status == JobStatus::Transcribing
    })
    .await;

    scheduler.shutdown();
    assert!(scheduler
        .submit(&urls(&[C]), Credentials::new())
        .is_err());

    stages.release(A);
    stages.release(B);
    let running = wait_finished(&scheduler, &jobs[0].id).await;
    assert_eq!(running.status, JobStatus::Completed);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(scheduler.get_job(&jobs[1].id).unwrap().status, JobStatus::Queued);
}
