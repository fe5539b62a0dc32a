// SPDX-FileCopyrightText: 2026 GenShield Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Background job dispatch.
//!
//! Jobs wait in a [`PriorityQueue`]. Each tick promotes retries whose backoff
//! has elapsed, then starts as many of the highest-priority jobs as the
//! concurrency cap allows. A job runs to completion or failure once started;
//! there is no caller-initiated cancellation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use genshield_core::{GenerationRequest, GenerationResult, JobId, Priority, ShieldError};
use genshield_queue::PriorityQueue;
use genshield_resilience::RetryPolicy;
use metrics::counter;
use tokio::sync::Notify;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::model::{DeadLetter, JobOptions, JobRecord, JobState, JobStats, JobStatus};
use crate::tracker::JobStatusTracker;

/// Duration assumed for progress estimates before any job has completed.
const DEFAULT_JOB_ESTIMATE: Duration = Duration::from_secs(30);

/// How often the run loop drops expired terminal records.
const PRUNE_EVERY: Duration = Duration::from_secs(60);

/// Runs one attempt of a job.
#[async_trait]
pub trait JobExecutor: Send + Sync {
    async fn execute(&self, job: &JobRecord) -> Result<GenerationResult, ShieldError>;
}

/// Dispatch tunables.
#[derive(Debug, Clone)]
pub struct ProcessorSettings {
    pub dispatch_interval: Duration,
    /// Jobs allowed in `processing` at once.
    pub max_concurrent: usize,
    /// Default attempt budget per job.
    pub max_attempts: u32,
    /// How long terminal jobs stay queryable.
    pub retention: Duration,
    /// Backoff between attempts of the same job.
    pub retry: RetryPolicy,
}

impl Default for ProcessorSettings {
    fn default() -> Self {
        Self {
            dispatch_interval: Duration::from_secs(1),
            max_concurrent: 3,
            max_attempts: 3,
            retention: Duration::from_secs(24 * 60 * 60),
            retry: RetryPolicy::default(),
        }
    }
}

impl ProcessorSettings {
    pub fn from_config(config: &genshield_config::ShieldConfig) -> Self {
        Self {
            dispatch_interval: config.jobs.dispatch_interval(),
            max_concurrent: config.jobs.max_concurrent.max(1),
            max_attempts: config.jobs.max_attempts.max(1),
            retention: config.jobs.retention(),
            retry: RetryPolicy::from_config(&config.retry),
        }
    }
}

struct Delayed {
    ready_at: DateTime<Utc>,
    id: JobId,
    priority: Priority,
}

#[derive(Default)]
struct Scheduler {
    ready: PriorityQueue<JobId>,
    delayed: Vec<Delayed>,
    processing: HashMap<JobId, Instant>,
}

#[derive(Default)]
struct Counters {
    enqueued: u64,
    completed: u64,
    failed: u64,
    retried: u64,
    completed_time: Duration,
}

impl Counters {
    fn average_duration(&self) -> Option<Duration> {
        (self.completed > 0).then(|| self.completed_time / self.completed as u32)
    }
}

struct ProcessorInner {
    executor: Arc<dyn JobExecutor>,
    tracker: Arc<dyn JobStatusTracker>,
    settings: ProcessorSettings,
    scheduler: Mutex<Scheduler>,
    counters: Mutex<Counters>,
    idle: Notify,
}

impl ProcessorInner {
    fn scheduler(&self) -> MutexGuard<'_, Scheduler> {
        self.scheduler.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn counters(&self) -> MutexGuard<'_, Counters> {
        self.counters.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Give up a processing slot, optionally parking the job for a later attempt.
    fn release_slot(&self, id: &JobId, retry: Option<Delayed>) {
        let mut scheduler = self.scheduler();
        scheduler.processing.remove(id);
        if let Some(delayed) = retry {
            scheduler.delayed.push(delayed);
        }
        if scheduler.processing.is_empty() {
            self.idle.notify_waiters();
        }
    }
}

/// Background job processor.
#[derive(Clone)]
pub struct JobProcessor {
    inner: Arc<ProcessorInner>,
}

impl JobProcessor {
    pub fn new(
        executor: Arc<dyn JobExecutor>,
        tracker: Arc<dyn JobStatusTracker>,
        settings: ProcessorSettings,
    ) -> Self {
        Self {
            inner: Arc::new(ProcessorInner {
                executor,
                tracker,
                settings,
                scheduler: Mutex::new(Scheduler::default()),
                counters: Mutex::new(Counters::default()),
                idle: Notify::new(),
            }),
        }
    }

    pub fn tracker(&self) -> &Arc<dyn JobStatusTracker> {
        &self.inner.tracker
    }

    pub fn settings(&self) -> &ProcessorSettings {
        &self.inner.settings
    }

    pub async fn enqueue(
        &self,
        request: GenerationRequest,
        options: JobOptions,
    ) -> Result<JobId, ShieldError> {
        self.enqueue_at(request, options, Utc::now()).await
    }

    /// Record a new `queued` job and return its id.
    pub async fn enqueue_at(
        &self,
        request: GenerationRequest,
        options: JobOptions,
        now: DateTime<Utc>,
    ) -> Result<JobId, ShieldError> {
        let priority = options.priority.unwrap_or(request.priority());
        let max_attempts = options
            .max_attempts
            .unwrap_or(self.inner.settings.max_attempts);
        let record = JobRecord::new(request, options.user_id, priority, max_attempts, now);
        self.inner.tracker.save(&record).await?;

        self.inner.scheduler().ready.enqueue(record.id.clone(), priority);
        self.inner.counters().enqueued += 1;
        counter!("genshield_jobs_total", "state" => "queued").increment(1);
        info!(job_id = %record.id, %priority, max_attempts = record.max_attempts, "job enqueued");
        Ok(record.id)
    }

    pub async fn tick(&self) -> usize {
        self.tick_at(Utc::now()).await
    }

    /// Promote due retries and start jobs up to the concurrency cap.
    ///
    /// Returns how many jobs were started.
    pub async fn tick_at(&self, now: DateTime<Utc>) -> usize {
        let picked: Vec<(JobId, Priority)> = {
            let mut scheduler = self.inner.scheduler();
            let (due, waiting): (Vec<Delayed>, Vec<Delayed>) = scheduler
                .delayed
                .drain(..)
                .partition(|d| d.ready_at <= now);
            scheduler.delayed = waiting;
            for d in due {
                scheduler.ready.enqueue(d.id, d.priority);
            }

            let slots = self
                .inner
                .settings
                .max_concurrent
                .saturating_sub(scheduler.processing.len());
            let mut picked = Vec::with_capacity(slots);
            while picked.len() < slots {
                let Some((id, priority)) = scheduler.ready.dequeue_with_priority() else {
                    break;
                };
                scheduler.processing.insert(id.clone(), Instant::now());
                picked.push((id, priority));
            }
            picked
        };

        let mut started = 0;
        for (id, priority) in picked {
            match self.start(&id, now).await {
                Ok(true) => started += 1,
                Ok(false) => {
                    warn!(job_id = %id, "queued job has no record, dropping");
                    self.inner.release_slot(&id, None);
                }
                Err(e) => {
                    warn!(job_id = %id, error = %e, "failed to start job, will try again");
                    let ready_at = now
                        + chrono::Duration::from_std(self.inner.settings.dispatch_interval)
                            .unwrap_or_default();
                    self.inner.release_slot(
                        &id,
                        Some(Delayed {
                            ready_at,
                            id: id.clone(),
                            priority,
                        }),
                    );
                }
            }
        }
        started
    }

    /// Mark a job `processing` and spawn its attempt.
    async fn start(&self, id: &JobId, now: DateTime<Utc>) -> Result<bool, ShieldError> {
        let Some(mut record) = self.inner.tracker.load(id).await? else {
            return Ok(false);
        };
        record.attempts += 1;
        record.started_at = Some(now);
        record.next_attempt_at = None;
        let message = format!(
            "Processing (attempt {} of {})",
            record.attempts, record.max_attempts
        );
        record.transition(JobState::Processing, message, now);
        self.inner.tracker.save(&record).await?;

        counter!("genshield_jobs_total", "state" => "processing").increment(1);
        debug!(job_id = %record.id, attempt = record.attempts, "job started");
        tokio::spawn(run_job(Arc::clone(&self.inner), record));
        Ok(true)
    }

    /// Wait until no job is processing.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.inner.scheduler().processing.is_empty() {
                return;
            }
            notified.await;
        }
    }

    pub async fn get_status(&self, id: &JobId) -> Result<JobStatus, ShieldError> {
        self.get_status_at(id, Utc::now()).await
    }

    pub async fn get_status_at(
        &self,
        id: &JobId,
        now: DateTime<Utc>,
    ) -> Result<JobStatus, ShieldError> {
        let record = self
            .inner
            .tracker
            .load(id)
            .await?
            .ok_or_else(|| ShieldError::NotFound {
                kind: "job",
                id: id.to_string(),
            })?;
        Ok(self.status_of(&record, now))
    }

    /// Jobs oldest first, optionally for one user.
    pub async fn list_jobs(&self, user_id: Option<&str>) -> Result<Vec<JobStatus>, ShieldError> {
        let now = Utc::now();
        Ok(self
            .inner
            .tracker
            .list(user_id)
            .await?
            .iter()
            .map(|r| self.status_of(r, now))
            .collect())
    }

    /// Jobs that used up their attempts without succeeding.
    pub async fn dead_letters(&self) -> Result<Vec<DeadLetter>, ShieldError> {
        Ok(self
            .inner
            .tracker
            .list_in_states(&[JobState::Failed])
            .await?
            .iter()
            .map(DeadLetter::from)
            .collect())
    }

    pub fn stats(&self) -> JobStats {
        let (queued, delayed, processing) = {
            let s = self.inner.scheduler();
            (s.ready.len(), s.delayed.len(), s.processing.len())
        };
        let c = self.inner.counters();
        JobStats {
            queued,
            delayed,
            processing,
            total_enqueued: c.enqueued,
            completed: c.completed,
            failed: c.failed,
            retried: c.retried,
            avg_duration_ms: c
                .average_duration()
                .map_or(0.0, |d| d.as_secs_f64() * 1000.0),
        }
    }

    /// Drop terminal jobs older than the retention window.
    pub async fn prune_at(&self, now: DateTime<Utc>) -> Result<usize, ShieldError> {
        let retention =
            chrono::Duration::from_std(self.inner.settings.retention).unwrap_or(chrono::Duration::MAX);
        let cutoff = now.checked_sub_signed(retention).unwrap_or(DateTime::<Utc>::MIN_UTC);
        let pruned = self.inner.tracker.prune_finished_before(cutoff).await?;
        if pruned > 0 {
            info!(pruned, "expired jobs pruned");
        }
        Ok(pruned)
    }

    /// Re-queue jobs a previous process left `queued` or `processing`.
    pub async fn recover(&self) -> Result<usize, ShieldError> {
        let now = Utc::now();
        let pending = self
            .inner
            .tracker
            .list_in_states(&[JobState::Queued, JobState::Processing])
            .await?;
        let mut recovered = 0;
        for mut record in pending {
            if record.state == JobState::Processing {
                record.transition(
                    JobState::Queued,
                    "Re-queued after restart".to_string(),
                    now,
                );
                self.inner.tracker.save(&record).await?;
            }
            let mut scheduler = self.inner.scheduler();
            match record.next_attempt_at {
                Some(ready_at) if ready_at > now => scheduler.delayed.push(Delayed {
                    ready_at,
                    id: record.id.clone(),
                    priority: record.priority,
                }),
                _ => scheduler.ready.enqueue(record.id.clone(), record.priority),
            }
            recovered += 1;
        }
        if recovered > 0 {
            info!(recovered, "recovered unfinished jobs");
        }
        Ok(recovered)
    }

    /// Dispatch on a fixed interval until `cancel` fires.
    ///
    /// Jobs already processing keep running after the loop exits.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.inner.settings.dispatch_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_prune = Instant::now();
        info!(
            interval_ms = self.inner.settings.dispatch_interval.as_millis() as u64,
            max_concurrent = self.inner.settings.max_concurrent,
            "job dispatcher started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            self.tick().await;

            if last_prune.elapsed() >= PRUNE_EVERY {
                if let Err(e) = self.prune_at(Utc::now()).await {
                    warn!(error = %e, "job pruning failed");
                }
                last_prune = Instant::now();
            }
        }
        info!("job dispatcher stopped");
    }

    fn status_of(&self, record: &JobRecord, now: DateTime<Utc>) -> JobStatus {
        JobStatus {
            id: record.id.clone(),
            state: record.state,
            progress: self.progress(record, now),
            message: record.message.clone(),
            attempts: record.attempts,
            retry_count: record.retry_count(),
            result: record.result.clone(),
            last_error: record.last_error.clone(),
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }

    /// 0 while queued, 100 once finished; in between, elapsed time against
    /// the average completed job mapped onto 10..=90.
    fn progress(&self, record: &JobRecord, now: DateTime<Utc>) -> u8 {
        match record.state {
            JobState::Queued => 0,
            JobState::Completed | JobState::Failed => 100,
            JobState::Processing => {
                let expected = self
                    .inner
                    .counters()
                    .average_duration()
                    .unwrap_or(DEFAULT_JOB_ESTIMATE)
                    .as_secs_f64()
                    .max(0.001);
                let elapsed = record
                    .started_at
                    .map(|at| (now - at).to_std().unwrap_or_default().as_secs_f64())
                    .unwrap_or(0.0);
                let fraction = (elapsed / expected).min(1.0);
                (10.0 + 80.0 * fraction).round() as u8
            }
        }
    }
}

impl std::fmt::Debug for JobProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobProcessor")
            .field("tracker", &self.inner.tracker.name())
            .field("settings", &self.inner.settings)
            .finish()
    }
}

async fn run_job(inner: Arc<ProcessorInner>, mut record: JobRecord) {
    let started = Instant::now();
    let outcome = inner.executor.execute(&record).await;
    let elapsed = started.elapsed();
    let now = Utc::now();
    let mut retry = None;

    match outcome {
        Ok(result) => {
            record.result = Some(result);
            record.last_error = None;
            record.finished_at = Some(now);
            let message = match record.attempts {
                1 => "Completed".to_string(),
                n => format!("Completed after {n} attempts"),
            };
            record.transition(JobState::Completed, message, now);
            {
                let mut c = inner.counters();
                c.completed += 1;
                c.completed_time += elapsed;
            }
            counter!("genshield_jobs_total", "state" => "completed").increment(1);
            info!(job_id = %record.id, attempts = record.attempts, elapsed_ms = elapsed.as_millis() as u64, "job completed");
        }
        Err(e) => {
            // A saturated pool is worth another try at job level.
            let retryable = e.is_retryable() || matches!(e, ShieldError::PoolTimeout { .. });
            record.last_error = Some(e.to_string());

            if retryable && record.attempts < record.max_attempts {
                let delay = inner.settings.retry.delay_for(record.attempts);
                let ready_at = now + chrono::Duration::from_std(delay).unwrap_or_default();
                record.next_attempt_at = Some(ready_at);
                let message = format!(
                    "Attempt {} of {} failed, retrying in {}s",
                    record.attempts,
                    record.max_attempts,
                    delay.as_secs()
                );
                record.transition(JobState::Queued, message, now);
                retry = Some(Delayed {
                    ready_at,
                    id: record.id.clone(),
                    priority: record.priority,
                });
                inner.counters().retried += 1;
                counter!("genshield_jobs_total", "state" => "retried").increment(1);
                warn!(job_id = %record.id, attempt = record.attempts, error = %e, ?delay, "job attempt failed, re-queued");
            } else {
                let failure = ShieldError::JobPermanentFailure {
                    job_id: record.id.to_string(),
                    attempts: record.attempts,
                    last_error: e.to_string(),
                };
                record.finished_at = Some(now);
                record.transition(JobState::Failed, failure.to_string(), now);
                inner.counters().failed += 1;
                counter!("genshield_jobs_total", "state" => "failed").increment(1);
                error!(job_id = %record.id, error = %failure, "job moved to dead letters");
            }
        }
    }

    if let Err(e) = inner.tracker.save(&record).await {
        error!(job_id = %record.id, error = %e, "failed to persist job status");
    }
    inner.release_slot(&record.id, retry);
}
