// SPDX-FileCopyrightText: 2026 GenShield Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end pipeline tests.
//!
//! `TestHarness` builds a complete [`GenShield`] over a [`MockBackend`] with
//! short retry delays and a fast job dispatch interval. The console alert
//! channel is replaced by a [`RecordingNotifier`].

use std::sync::Arc;

use genshield::GenShield;
use genshield_config::ShieldConfig;
use genshield_core::ShieldError;

use crate::mock_backend::MockBackend;
use crate::recording_notifier::RecordingNotifier;

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    backend: MockBackend,
    config: ShieldConfig,
    sqlite_jobs: bool,
    start_background: bool,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        let mut config = ShieldConfig::default();
        config.retry.base_delay_ms = 1;
        config.retry.max_delay_ms = 5;
        config.jobs.dispatch_interval_ms = 10;
        Self {
            backend: MockBackend::new(),
            config,
            sqlite_jobs: false,
            start_background: false,
        }
    }

    pub fn with_backend(mut self, backend: MockBackend) -> Self {
        self.backend = backend;
        self
    }

    /// Adjust the configuration before the pipeline is built.
    pub fn with_config(mut self, tweak: impl FnOnce(&mut ShieldConfig)) -> Self {
        tweak(&mut self.config);
        self
    }

    /// Persist job records in a SQLite file inside the harness temp dir.
    pub fn with_sqlite_jobs(mut self) -> Self {
        self.sqlite_jobs = true;
        self
    }

    /// Start the job dispatcher and monitor loops after building.
    pub fn with_background(mut self) -> Self {
        self.start_background = true;
        self
    }

    pub async fn build(self) -> Result<TestHarness, ShieldError> {
        let temp_dir = tempfile::TempDir::new().map_err(|e| ShieldError::Storage {
            source: Box::new(e),
        })?;

        let mut config = self.config;
        if self.sqlite_jobs {
            let path = temp_dir.path().join("jobs.db");
            config.jobs.database_path = Some(path.to_string_lossy().to_string());
        }

        let backend = Arc::new(self.backend);
        let console = Arc::new(RecordingNotifier::new("console"));
        let shield = GenShield::builder(config.clone())
            .with_backend(backend.clone())
            .with_notifier(console.clone())
            .build()
            .await?;
        if self.start_background {
            shield.spawn_background();
        }

        Ok(TestHarness {
            shield,
            backend,
            console,
            config,
            _temp_dir: temp_dir,
        })
    }
}

/// A complete pipeline wired to mock adapters.
pub struct TestHarness {
    pub shield: GenShield,
    pub backend: Arc<MockBackend>,
    /// Receives everything routed to the `console` alert channel.
    pub console: Arc<RecordingNotifier>,
    pub config: ShieldConfig,
    /// Temp directory kept alive for cleanup on drop.
    _temp_dir: tempfile::TempDir,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }
}
