// SPDX-FileCopyrightText: 2026 GenShield Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Runs background jobs through the cache and the optimized client.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use genshield_cache::{CacheFilter, EntryMetadata, SimilarityCache};
use genshield_client::OptimizedClient;
use genshield_core::{GenerationResult, ShieldError};
use genshield_jobs::{JobExecutor, JobRecord};
use genshield_monitor::{OperationSample, PerformanceMonitor};
use tracing::{debug, warn};

/// Prompt text used for cache keys, when the payload carries one.
pub(crate) fn prompt_of(payload: &serde_json::Value) -> Option<&str> {
    payload
        .get("prompt")
        .and_then(serde_json::Value::as_str)
        .filter(|p| !p.trim().is_empty())
}

/// [`JobExecutor`] backed by the synchronous pipeline.
///
/// Each job attempt makes a single client attempt; retry and backoff happen
/// at job level.
pub struct PipelineExecutor {
    client: OptimizedClient,
    cache: Arc<SimilarityCache>,
    monitor: Arc<PerformanceMonitor>,
}

impl PipelineExecutor {
    pub fn new(
        client: OptimizedClient,
        cache: Arc<SimilarityCache>,
        monitor: Arc<PerformanceMonitor>,
    ) -> Self {
        Self {
            client,
            cache,
            monitor,
        }
    }

    async fn cached(&self, prompt: &str, job: &JobRecord) -> Option<GenerationResult> {
        let filter = job
            .user_id
            .as_deref()
            .map(CacheFilter::for_user)
            .unwrap_or_default();
        match self.cache.find(prompt, &filter).await {
            Ok(Some(hit)) => {
                debug!(job_id = %job.id, similarity = hit.similarity, "job served from cache");
                Some(hit.entry.result)
            }
            Ok(None) => None,
            Err(e) => {
                warn!(job_id = %job.id, error = %e, "cache lookup failed, calling backend");
                None
            }
        }
    }
}

#[async_trait]
impl JobExecutor for PipelineExecutor {
    async fn execute(&self, job: &JobRecord) -> Result<GenerationResult, ShieldError> {
        let started = Instant::now();
        let prompt = prompt_of(job.request.payload())
            .filter(|_| self.cache.settings().enabled)
            .map(str::to_string);

        if let Some(prompt) = &prompt
            && let Some(result) = self.cached(prompt, job).await
        {
            self.monitor.record_operation(&OperationSample {
                duration: started.elapsed(),
                success: true,
                cache_hit: true,
                queue_length: self.client.queue_length(),
                ..OperationSample::default()
            });
            return Ok(result);
        }

        let outcome = self
            .client
            .submit(job.request.clone().with_max_retries(1))
            .await;

        let mut sample = OperationSample {
            duration: started.elapsed(),
            success: outcome.is_ok(),
            queue_length: self.client.queue_length(),
            ..OperationSample::default()
        };
        match &outcome {
            Ok(response) => sample.queue_wait = response.queue_wait,
            Err(failure) => sample.timed_out = failure.error.is_timeout(),
        }
        self.monitor.record_operation(&sample);

        let response = outcome?;
        if let Some(prompt) = &prompt {
            let metadata = EntryMetadata {
                user_id: job.user_id.clone(),
                processing_time_ms: response.network_latency.as_millis() as u64,
                ..EntryMetadata::default()
            };
            if let Err(e) = self
                .cache
                .store(prompt, response.result.clone(), metadata)
                .await
            {
                warn!(job_id = %job.id, error = %e, "failed to cache job result");
            }
        }
        Ok(response.result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_extraction() {
        assert_eq!(
            prompt_of(&serde_json::json!({"prompt": "a red fox"})),
            Some("a red fox")
        );
        assert_eq!(prompt_of(&serde_json::json!({"prompt": "   "})), None);
        assert_eq!(prompt_of(&serde_json::json!({"prompt": 7})), None);
        assert_eq!(prompt_of(&serde_json::json!({"seed": 1})), None);
    }
}
