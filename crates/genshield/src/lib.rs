// SPDX-FileCopyrightText: 2026 GenShield Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! GenShield: a request-optimization layer in front of a slow, unreliable
//! image-generation backend.
//!
//! [`GenShield`] wires the pipeline together. A synchronous call goes
//! similarity cache first, then the priority dispatcher, connection pool,
//! and retry policy of the [`OptimizedClient`](genshield_client::OptimizedClient).
//! Background work goes through the [`JobProcessor`](genshield_jobs::JobProcessor).
//! Every completed operation is recorded by the performance monitor, whose
//! snapshots drive the alert engine.
//!
//! ```no_run
//! # async fn demo() -> Result<(), genshield_core::ShieldError> {
//! use genshield::{GenShield, GenerationRequest};
//!
//! let shield = GenShield::builder(genshield_config::ShieldConfig::default())
//!     .build()
//!     .await?;
//! shield.spawn_background();
//!
//! let request = GenerationRequest::new(serde_json::json!({"prompt": "a lighthouse at dusk"}));
//! let response = shield.optimized_generate(request).await;
//! println!("cache hit: {}", response.metrics.cache_hit);
//!
//! shield.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod executor;
pub mod pipeline;
pub mod response;
pub mod shutdown;

pub use executor::PipelineExecutor;
pub use pipeline::{GenShield, GenShieldBuilder, GenerateOptions};
pub use response::{
    OptimizedResponse, ProcessingInfo, QueueMetrics, ResponseMetrics, StatusSummary, SystemStatus,
};

pub use genshield_core::{GenerationRequest, GenerationResult, JobId, Priority, ShieldError};
pub use genshield_jobs::{JobOptions, JobState, JobStatus};
