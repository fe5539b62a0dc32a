// SPDX-FileCopyrightText: 2026 GenShield Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The orchestrator that ties cache, client, jobs, and monitor together.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use genshield_cache::{CacheFilter, CacheStore, EntryMetadata, MemoryStore, SimilarityCache};
use genshield_client::{ClientSettings, HttpBackend, OptimizedClient};
use genshield_config::ShieldConfig;
use genshield_core::{
    AlertEvent, AlertNotifier, BackendHealth, GenerationBackend, GenerationRequest, JobId,
    Priority, RequestId, ShieldError,
};
use genshield_jobs::{
    JobOptions, JobProcessor, JobStatus, JobStatusTracker, MemoryJobTracker, ProcessorSettings,
    SqliteJobTracker,
};
use genshield_monitor::{
    AlertEngine, ConsoleNotifier, MonitorSettings, OperationSample, PerformanceMonitor,
    WebhookNotifier, derive_health, run_monitor,
};
use genshield_resilience::ConnectionPool;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::executor::{PipelineExecutor, prompt_of};
use crate::response::{
    OptimizedResponse, ProcessingInfo, QueueMetrics, ResponseMetrics, StatusSummary, SystemStatus,
};

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

/// Per-call knobs for [`GenShield::optimized_generate_with`].
#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    /// Cache key text. Defaults to the payload's `prompt` field.
    pub prompt: Option<String>,
    pub user_id: Option<String>,
    pub preset_id: Option<String>,
    pub tags: BTreeSet<String>,
    /// Skip both cache lookup and cache store.
    pub bypass_cache: bool,
}

impl GenerateOptions {
    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            ..Self::default()
        }
    }

    pub fn with_preset(mut self, preset_id: impl Into<String>) -> Self {
        self.preset_id = Some(preset_id.into());
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn bypassing_cache(mut self) -> Self {
        self.bypass_cache = true;
        self
    }

    fn filter(&self) -> CacheFilter {
        CacheFilter {
            user_id: self.user_id.clone(),
            preset_id: self.preset_id.clone(),
            tags: self.tags.clone(),
        }
    }

    fn metadata(&self, processing_time: Duration) -> EntryMetadata {
        EntryMetadata {
            user_id: self.user_id.clone(),
            preset_id: self.preset_id.clone(),
            processing_time_ms: processing_time.as_millis() as u64,
            tags: self.tags.clone(),
        }
    }
}

/// Assembles a [`GenShield`] from configuration plus optional adapters.
pub struct GenShieldBuilder {
    config: ShieldConfig,
    backend: Option<Arc<dyn GenerationBackend>>,
    cache_store: Option<Arc<dyn CacheStore>>,
    tracker: Option<Arc<dyn JobStatusTracker>>,
    notifiers: Vec<Arc<dyn AlertNotifier>>,
}

impl GenShieldBuilder {
    pub fn new(config: ShieldConfig) -> Self {
        Self {
            config,
            backend: None,
            cache_store: None,
            tracker: None,
            notifiers: Vec::new(),
        }
    }

    /// Replace the HTTP backend built from `[backend]`.
    pub fn with_backend(mut self, backend: Arc<dyn GenerationBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Replace the in-process cache store, e.g. with a shared one.
    pub fn with_cache_store(mut self, store: Arc<dyn CacheStore>) -> Self {
        self.cache_store = Some(store);
        self
    }

    pub fn with_job_tracker(mut self, tracker: Arc<dyn JobStatusTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    /// Add an alert channel. A channel named like a built-in one replaces it.
    pub fn with_notifier(mut self, notifier: Arc<dyn AlertNotifier>) -> Self {
        self.notifiers.push(notifier);
        self
    }

    /// Build every component and re-queue unfinished jobs.
    ///
    /// Starts the client dispatcher; call [`GenShield::spawn_background`] to
    /// start job dispatch and the monitor ticks.
    pub async fn build(self) -> Result<GenShield, ShieldError> {
        let config = self.config;
        let client_settings = ClientSettings::from_config(&config);

        let backend = match self.backend {
            Some(backend) => backend,
            None => Arc::new(HttpBackend::new(
                &config.backend,
                client_settings.request_timeout,
            )?),
        };

        let cancel = CancellationToken::new();
        let client = OptimizedClient::start(
            backend,
            ConnectionPool::from_config(&config.pool),
            client_settings,
            cancel.child_token(),
        );

        let store = self
            .cache_store
            .unwrap_or_else(|| Arc::new(MemoryStore::new()));
        let cache = Arc::new(SimilarityCache::from_config(&config.cache, store));
        let monitor = Arc::new(PerformanceMonitor::from_config(&config.monitor));

        let mut engine =
            AlertEngine::from_config(&config)?.with_notifier(Arc::new(ConsoleNotifier));
        if let Some(url) = &config.monitor.alert_webhook_url {
            engine = engine.with_notifier(Arc::new(WebhookNotifier::new(url, WEBHOOK_TIMEOUT)?));
        }
        for notifier in self.notifiers {
            engine = engine.with_notifier(notifier);
        }

        let tracker: Arc<dyn JobStatusTracker> = match (self.tracker, &config.jobs.database_path) {
            (Some(tracker), _) => tracker,
            (None, Some(path)) => Arc::new(SqliteJobTracker::open(path).await?),
            (None, None) => Arc::new(MemoryJobTracker::new()),
        };
        let executor = Arc::new(PipelineExecutor::new(
            client.clone(),
            Arc::clone(&cache),
            Arc::clone(&monitor),
        ));
        let jobs = JobProcessor::new(executor, tracker, ProcessorSettings::from_config(&config));
        let recovered = jobs.recover().await?;

        info!(
            service = %config.service.name,
            pool = config.pool.max_connections,
            cache_enabled = config.cache.enabled,
            tracker = jobs.tracker().name(),
            recovered,
            "pipeline ready"
        );

        Ok(GenShield {
            cache,
            client,
            jobs,
            monitor,
            alerts: Arc::new(engine),
            monitor_settings: MonitorSettings::from_config(&config.monitor),
            cancel,
            tasks: Mutex::new(Vec::new()),
        })
    }
}

/// The request-optimization pipeline.
pub struct GenShield {
    cache: Arc<SimilarityCache>,
    client: OptimizedClient,
    jobs: JobProcessor,
    monitor: Arc<PerformanceMonitor>,
    alerts: Arc<AlertEngine>,
    monitor_settings: MonitorSettings,
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

enum Served {
    Cache(genshield_cache::CacheLookup),
    Backend {
        response: genshield_client::ClientResponse,
        cache_key: Option<String>,
    },
    Failed(genshield_client::ClientFailure),
}

impl GenShield {
    pub fn builder(config: ShieldConfig) -> GenShieldBuilder {
        GenShieldBuilder::new(config)
    }

    /// Start the job dispatcher and the monitor loops.
    pub fn spawn_background(&self) {
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        if !tasks.is_empty() {
            return;
        }
        let jobs = self.jobs.clone();
        let token = self.cancel.child_token();
        tasks.push(tokio::spawn(async move { jobs.run(token).await }));
        tasks.push(tokio::spawn(run_monitor(
            Arc::clone(&self.monitor),
            Arc::clone(&self.alerts),
            self.monitor_settings.clone(),
            self.cancel.child_token(),
        )));
    }

    pub async fn optimized_generate(&self, request: GenerationRequest) -> OptimizedResponse {
        self.optimized_generate_with(request, GenerateOptions::default())
            .await
    }

    /// Serve from the similarity cache when possible, otherwise through the
    /// optimized client, caching successful results.
    pub async fn optimized_generate_with(
        &self,
        request: GenerationRequest,
        options: GenerateOptions,
    ) -> OptimizedResponse {
        let started = Instant::now();
        let request_id = RequestId::generate();
        let correlation_id = request.correlation_id().to_string();
        let prompt = options
            .prompt
            .clone()
            .or_else(|| prompt_of(request.payload()).map(str::to_string))
            .filter(|_| self.cache.settings().enabled && !options.bypass_cache);

        let mut served = None;
        if let Some(prompt) = &prompt {
            match self.cache.find(prompt, &options.filter()).await {
                Ok(Some(hit)) => served = Some(Served::Cache(hit)),
                Ok(None) => {}
                Err(e) => warn!(%request_id, error = %e, "cache lookup failed, calling backend"),
            }
        }

        let served = match served {
            Some(served) => served,
            None => match self.client.submit(request).await {
                Ok(response) => {
                    let cache_key = match &prompt {
                        Some(prompt) => self
                            .cache
                            .store(
                                prompt,
                                response.result.clone(),
                                options.metadata(response.network_latency),
                            )
                            .await
                            .inspect_err(|e| {
                                warn!(%request_id, error = %e, "failed to cache result")
                            })
                            .ok(),
                        None => None,
                    };
                    Served::Backend {
                        response,
                        cache_key,
                    }
                }
                Err(e) => Served::Failed(e),
            },
        };

        let total = started.elapsed();
        let mut metrics = ResponseMetrics {
            total_time_ms: total.as_millis() as u64,
            ..ResponseMetrics::default()
        };
        let mut sample = OperationSample {
            duration: total,
            queue_length: self.client.queue_length(),
            ..OperationSample::default()
        };

        let (result, error, cache_key) = match served {
            Served::Cache(hit) => {
                metrics.cache_hit = true;
                metrics.similarity = Some(hit.similarity);
                sample.success = true;
                sample.cache_hit = true;
                info!(
                    %request_id,
                    %correlation_id,
                    similarity = hit.similarity,
                    kind = hit.kind.as_str(),
                    "served from cache"
                );
                (Some(hit.entry.result), None, Some(hit.entry.hash))
            }
            Served::Backend {
                response,
                cache_key,
            } => {
                metrics.retry_count = response.retry_count;
                metrics.network_latency_ms = response.network_latency.as_millis() as u64;
                metrics.queue_wait_ms = response.queue_wait.as_millis() as u64;
                sample.success = true;
                sample.retry_count = response.retry_count;
                sample.queue_wait = response.queue_wait;
                info!(
                    %request_id,
                    %correlation_id,
                    retries = response.retry_count,
                    total_ms = metrics.total_time_ms,
                    "generation completed"
                );
                (Some(response.result), None, cache_key)
            }
            Served::Failed(failure) => {
                metrics.retry_count = failure.retry_count();
                sample.retry_count = failure.retry_count();
                sample.timed_out = failure.error.is_timeout();
                warn!(
                    %request_id,
                    %correlation_id,
                    kind = failure.error.kind(),
                    retries = failure.retry_count(),
                    error = %failure.error,
                    "generation failed"
                );
                (None, Some(failure.error), None)
            }
        };
        self.monitor.record_operation(&sample);

        OptimizedResponse {
            success: error.is_none(),
            result,
            error_kind: error.as_ref().map(ShieldError::kind),
            error: error.map(|e| e.to_string()),
            metrics,
            processing_info: ProcessingInfo {
                request_id: request_id.to_string(),
                correlation_id,
                cache_key,
            },
            system_status: self.status_summary().await,
        }
    }

    pub async fn enqueue_background(
        &self,
        request: GenerationRequest,
        priority: Priority,
    ) -> Result<JobId, ShieldError> {
        self.jobs
            .enqueue(request, JobOptions::default().with_priority(priority))
            .await
    }

    pub async fn enqueue_background_with(
        &self,
        request: GenerationRequest,
        options: JobOptions,
    ) -> Result<JobId, ShieldError> {
        self.jobs.enqueue(request, options).await
    }

    pub async fn get_job_status(&self, id: &JobId) -> Result<JobStatus, ShieldError> {
        self.jobs.get_status(id).await
    }

    pub async fn get_system_status(&self) -> SystemStatus {
        let performance = self.monitor.snapshot();
        let active_alerts = self.alerts.active_alerts();
        SystemStatus {
            health: derive_health(&performance, &active_alerts),
            performance,
            cache: self.cache.stats().await,
            queue: QueueMetrics {
                client: self.client.stats(),
                jobs: self.jobs.stats(),
            },
            active_alerts,
        }
    }

    /// Probe the external backend.
    pub async fn health_check(&self) -> Result<BackendHealth, ShieldError> {
        self.client.backend().probe().await
    }

    /// Run one alert evaluation now.
    pub async fn evaluate_alerts(&self) -> Vec<AlertEvent> {
        self.alerts.evaluate(&self.monitor).await
    }

    pub fn acknowledge_alert(&self, alert_id: &str) -> Result<AlertEvent, ShieldError> {
        self.alerts.acknowledge(alert_id)
    }

    async fn status_summary(&self) -> StatusSummary {
        let performance = self.monitor.snapshot();
        StatusSummary {
            queue_length: self.client.queue_length(),
            cache_hit_rate: self.cache.stats().await.hit_rate,
            health: derive_health(&performance, &self.alerts.active_alerts()).label(),
        }
    }

    pub fn cache(&self) -> &Arc<SimilarityCache> {
        &self.cache
    }

    pub fn client(&self) -> &OptimizedClient {
        &self.client
    }

    pub fn jobs(&self) -> &JobProcessor {
        &self.jobs
    }

    pub fn monitor(&self) -> &Arc<PerformanceMonitor> {
        &self.monitor
    }

    pub fn alerts(&self) -> &Arc<AlertEngine> {
        &self.alerts
    }

    /// Stop every background loop and flush the job tracker.
    ///
    /// Jobs already processing are left to finish.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let tasks: Vec<JoinHandle<()>> = self
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "background task ended abnormally");
            }
        }
        self.jobs.wait_idle().await;
        if let Err(e) = self.jobs.tracker().shutdown().await {
            warn!(error = %e, "job tracker shutdown failed");
        }
        info!("pipeline stopped");
    }
}

impl std::fmt::Debug for GenShield {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenShield")
            .field("jobs", &self.jobs)
            .field("alerts", &self.alerts)
            .finish_non_exhaustive()
    }
}
