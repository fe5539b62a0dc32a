// SPDX-FileCopyrightText: 2026 GenShield Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use genshield_core::{
    GenerationBackend, GenerationRequest, GenerationResult, PluginAdapter, Priority, ShieldError,
};
use genshield_jobs::{
    JobExecutor, JobOptions, JobProcessor, JobRecord, JobState, JobStatusTracker,
    MemoryJobTracker, ProcessorSettings, SqliteJobTracker,
};
use genshield_resilience::RetryPolicy;
use genshield_test_utils::{MockBackend, MockStep};

struct BackendExecutor(Arc<MockBackend>);

#[async_trait]
impl JobExecutor for BackendExecutor {
    async fn execute(&self, job: &JobRecord) -> Result<GenerationResult, ShieldError> {
        self.0.submit_generation(job.request.payload()).await
    }
}

fn settings(max_concurrent: usize) -> ProcessorSettings {
    ProcessorSettings {
        dispatch_interval: Duration::from_millis(10),
        max_concurrent,
        max_attempts: 3,
        retention: Duration::from_secs(24 * 60 * 60),
        retry: RetryPolicy {
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            ..RetryPolicy::default()
        },
    }
}

fn processor(
    backend: &Arc<MockBackend>,
    tracker: Arc<dyn JobStatusTracker>,
    max_concurrent: usize,
) -> JobProcessor {
    JobProcessor::new(
        Arc::new(BackendExecutor(Arc::clone(backend))),
        tracker,
        settings(max_concurrent),
    )
}

fn request(prompt: &str) -> GenerationRequest {
    GenerationRequest::new(serde_json::json!({ "prompt": prompt }))
}

async fn drain(p: &JobProcessor, rounds: usize) {
    for _ in 0..rounds {
        p.tick().await;
        p.wait_idle().await;
    }
}

#[tokio::test]
async fn persistent_failure_exhausts_attempts_then_fails() {
    let backend = Arc::new(MockBackend::new().fallback(MockStep::network("connection refused")));
    let p = processor(&backend, Arc::new(MemoryJobTracker::new()), 2);

    let id = p
        .enqueue(request("storm"), JobOptions::for_user("u1"))
        .await
        .unwrap();
    drain(&p, 4).await;

    let status = p.get_status(&id).await.unwrap();
    assert_eq!(status.state, JobState::Failed);
    assert_eq!(status.attempts, 3);
    assert_eq!(status.progress, 100);
    assert!(status.last_error.unwrap().contains("connection refused"));
    assert_eq!(backend.calls(), 3);

    let record = p.tracker().load(&id).await.unwrap().unwrap();
    assert_eq!(
        record.state_trail(),
        vec![
            JobState::Queued,
            JobState::Processing,
            JobState::Queued,
            JobState::Processing,
            JobState::Queued,
            JobState::Processing,
            JobState::Failed,
        ]
    );

    let dead = p.dead_letters().await.unwrap();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].job_id, id);
    assert_eq!(dead[0].user_id.as_deref(), Some("u1"));

    let stats = p.stats();
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.retried, 2);
}

#[tokio::test]
async fn success_on_second_attempt_completes_with_one_retry() {
    let backend = Arc::new(
        MockBackend::new()
            .then(MockStep::status(503))
            .then(MockStep::ok("https://img/ok")),
    );
    let p = processor(&backend, Arc::new(MemoryJobTracker::new()), 2);

    let id = p.enqueue(request("harbor"), JobOptions::default()).await.unwrap();
    drain(&p, 3).await;

    let status = p.get_status(&id).await.unwrap();
    assert_eq!(status.state, JobState::Completed);
    assert_eq!(status.retry_count, 1);
    assert_eq!(
        status.result.unwrap().result_url.as_deref(),
        Some("https://img/ok")
    );
    assert!(status.last_error.is_none());
}

#[tokio::test]
async fn per_job_attempt_budget_overrides_default() {
    let backend = Arc::new(MockBackend::new().fallback(MockStep::network("down")));
    let p = processor(&backend, Arc::new(MemoryJobTracker::new()), 1);

    let id = p
        .enqueue(request("x"), JobOptions::default().with_max_attempts(1))
        .await
        .unwrap();
    drain(&p, 2).await;

    assert_eq!(p.get_status(&id).await.unwrap().state, JobState::Failed);
    assert_eq!(backend.calls(), 1);
}

#[tokio::test]
async fn higher_priority_jobs_start_first() {
    let backend = Arc::new(MockBackend::new().fallback(MockStep::ok("u")));
    let p = processor(&backend, Arc::new(MemoryJobTracker::new()), 1);

    for (prompt, priority) in [
        ("low", Priority::Low),
        ("normal", Priority::Normal),
        ("premium", Priority::Premium),
        ("high", Priority::High),
    ] {
        p.enqueue(request(prompt), JobOptions::default().with_priority(priority))
            .await
            .unwrap();
    }
    drain(&p, 4).await;

    let order: Vec<String> = backend
        .payloads()
        .iter()
        .map(|v| v["prompt"].as_str().unwrap_or_default().to_string())
        .collect();
    assert_eq!(order, ["premium", "high", "normal", "low"]);
}

#[tokio::test]
async fn request_priority_used_when_options_do_not_set_one() {
    let backend = Arc::new(MockBackend::new().fallback(MockStep::ok("u")));
    let p = processor(&backend, Arc::new(MemoryJobTracker::new()), 1);

    p.enqueue(request("first"), JobOptions::default()).await.unwrap();
    p.enqueue(
        request("urgent").with_priority(Priority::Premium),
        JobOptions::default(),
    )
    .await
    .unwrap();
    drain(&p, 2).await;

    assert_eq!(backend.payloads()[0]["prompt"], "urgent");
}

#[tokio::test]
async fn concurrency_cap_limits_processing_jobs() {
    let backend = Arc::new(
        MockBackend::new()
            .fallback(MockStep::ok("u"))
            .with_latency(Duration::from_millis(50)),
    );
    let p = processor(&backend, Arc::new(MemoryJobTracker::new()), 2);

    let mut ids = Vec::new();
    for i in 0..5 {
        ids.push(
            p.enqueue(request(&format!("job {i}")), JobOptions::default())
                .await
                .unwrap(),
        );
    }

    assert_eq!(p.tick().await, 2);
    let stats = p.stats();
    assert_eq!(stats.processing, 2);
    assert_eq!(stats.queued, 3);
    assert_eq!(p.tick().await, 0);

    drain(&p, 3).await;
    assert!(backend.max_concurrency() <= 2);
    for id in &ids {
        assert_eq!(p.get_status(id).await.unwrap().state, JobState::Completed);
    }
}

#[tokio::test]
async fn list_jobs_filters_by_user() {
    let backend = Arc::new(MockBackend::new().fallback(MockStep::ok("u")));
    let p = processor(&backend, Arc::new(MemoryJobTracker::new()), 1);

    p.enqueue(request("a"), JobOptions::for_user("alice")).await.unwrap();
    p.enqueue(request("b"), JobOptions::for_user("bob")).await.unwrap();
    p.enqueue(request("c"), JobOptions::for_user("alice")).await.unwrap();

    assert_eq!(p.list_jobs(Some("alice")).await.unwrap().len(), 2);
    assert_eq!(p.list_jobs(None).await.unwrap().len(), 3);
}

#[tokio::test]
async fn finished_jobs_pruned_after_retention() {
    let backend = Arc::new(MockBackend::new().fallback(MockStep::ok("u")));
    let p = processor(&backend, Arc::new(MemoryJobTracker::new()), 1);

    let done = p.enqueue(request("done"), JobOptions::default()).await.unwrap();
    drain(&p, 1).await;
    let waiting = p.enqueue(request("waiting"), JobOptions::default()).await.unwrap();

    assert_eq!(p.prune_at(Utc::now()).await.unwrap(), 0);
    let later = Utc::now() + chrono::Duration::days(2);
    assert_eq!(p.prune_at(later).await.unwrap(), 1);

    assert!(matches!(
        p.get_status(&done).await,
        Err(ShieldError::NotFound { .. })
    ));
    assert_eq!(
        p.get_status(&waiting).await.unwrap().state,
        JobState::Queued
    );
}

#[tokio::test]
async fn sqlite_jobs_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("jobs.db");
    let path = path.to_str().unwrap();
    let backend = Arc::new(MockBackend::new().fallback(MockStep::ok("https://img/r")));

    let ids = {
        let tracker = Arc::new(SqliteJobTracker::open(path).await.unwrap());
        let first = processor(&backend, tracker.clone(), 1);
        let a = first.enqueue(request("a"), JobOptions::default()).await.unwrap();
        let b = first.enqueue(request("b"), JobOptions::default()).await.unwrap();
        tracker.shutdown().await.unwrap();
        vec![a, b]
    };

    let tracker = Arc::new(SqliteJobTracker::open(path).await.unwrap());
    let second = processor(&backend, tracker, 1);
    assert_eq!(second.recover().await.unwrap(), 2);
    drain(&second, 2).await;

    for id in &ids {
        let status = second.get_status(id).await.unwrap();
        assert_eq!(status.state, JobState::Completed);
    }
    assert_eq!(backend.calls(), 2);
}

#[tokio::test]
async fn run_loop_dispatches_until_cancelled() {
    let backend = Arc::new(MockBackend::new().fallback(MockStep::ok("u")));
    let p = processor(&backend, Arc::new(MemoryJobTracker::new()), 2);
    let cancel = tokio_util::sync::CancellationToken::new();

    let runner = {
        let p = p.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { p.run(cancel).await })
    };

    let id = p.enqueue(request("bg"), JobOptions::default()).await.unwrap();
    let mut state = JobState::Queued;
    for _ in 0..100 {
        state = p.get_status(&id).await.unwrap().state;
        if state.is_terminal() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(state, JobState::Completed);

    cancel.cancel();
    runner.await.unwrap();
}
