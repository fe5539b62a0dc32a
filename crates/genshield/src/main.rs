// SPDX-FileCopyrightText: 2026 GenShield Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! GenShield command-line entry point.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use genshield::{GenShield, GenerationRequest, JobOptions, Priority, ShieldError};
use genshield_config::ShieldConfig;
use genshield_monitor::PrometheusExporter;
use serde::Serialize;
use tracing::{info, warn};

const JOB_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// GenShield - request optimization for image-generation backends.
#[derive(Parser, Debug)]
#[command(name = "genshield", version, about, long_about = None)]
struct Cli {
    /// Read configuration from this file instead of the standard locations.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the pipeline against the configured backend until interrupted.
    Serve,
    /// Submit one optimized generation and print the response as JSON.
    Generate {
        #[arg(long)]
        prompt: String,
        #[arg(long, default_value = "normal")]
        priority: Priority,
        #[arg(long)]
        user: Option<String>,
        /// Run as a background job and print its final status.
        #[arg(long)]
        background: bool,
    },
    /// Probe the backend health endpoint.
    Health,
    /// Validate configuration and print the effective settings.
    Config,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => genshield_config::load_and_validate_path(path),
        None => genshield_config::load_and_validate(),
    };
    let config = match loaded {
        Ok(config) => config,
        Err(errors) => {
            genshield_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    init_tracing(&config.service.log_level);

    let outcome = match cli.command {
        Some(Commands::Serve) => run_serve(config).await,
        Some(Commands::Generate {
            prompt,
            priority,
            user,
            background,
        }) => run_generate(config, prompt, priority, user, background).await,
        Some(Commands::Health) => run_health(config).await,
        Some(Commands::Config) => print_config(&config),
        None => {
            println!("genshield: use --help for available commands");
            Ok(())
        }
    };

    if let Err(e) = outcome {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run_serve(config: ShieldConfig) -> Result<(), ShieldError> {
    let exporter = if config.monitor.prometheus {
        match PrometheusExporter::install() {
            Ok(exporter) => Some(exporter),
            Err(e) => {
                warn!(error = %e, "prometheus initialization failed, continuing without metrics");
                None
            }
        }
    } else {
        None
    };

    let cancel = genshield::shutdown::install_signal_handler();
    let shield = GenShield::builder(config).build().await?;
    shield.spawn_background();
    info!("genshield serving, press Ctrl+C to stop");

    cancel.cancelled().await;
    shield.shutdown().await;

    if let Some(exporter) = exporter {
        print!("{}", exporter.render());
    }
    Ok(())
}

async fn run_generate(
    config: ShieldConfig,
    prompt: String,
    priority: Priority,
    user: Option<String>,
    background: bool,
) -> Result<(), ShieldError> {
    let shield = GenShield::builder(config).build().await?;
    let request =
        GenerationRequest::new(serde_json::json!({ "prompt": prompt })).with_priority(priority);

    if background {
        shield.spawn_background();
        let options = JobOptions {
            user_id: user,
            ..JobOptions::default()
        }
        .with_priority(priority);
        let job_id = shield.enqueue_background_with(request, options).await?;
        info!(%job_id, "job enqueued");
        let status = loop {
            let status = shield.get_job_status(&job_id).await?;
            if status.state.is_terminal() {
                break status;
            }
            tokio::time::sleep(JOB_POLL_INTERVAL).await;
        };
        print_json(&status)?;
    } else {
        let options = match user {
            Some(user) => genshield::GenerateOptions::for_user(user),
            None => genshield::GenerateOptions::default(),
        };
        let response = shield.optimized_generate_with(request, options).await;
        print_json(&response)?;
    }

    shield.shutdown().await;
    Ok(())
}

async fn run_health(config: ShieldConfig) -> Result<(), ShieldError> {
    let shield = GenShield::builder(config).build().await?;
    let health = shield.health_check().await;
    shield.shutdown().await;
    print_json(&health?)
}

fn print_config(config: &ShieldConfig) -> Result<(), ShieldError> {
    let rendered = toml::to_string_pretty(config)
        .map_err(|e| ShieldError::Config(format!("failed to render configuration: {e}")))?;
    print!("{rendered}");
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<(), ShieldError> {
    let rendered = serde_json::to_string_pretty(value)
        .map_err(|e| ShieldError::Internal(format!("failed to render output: {e}")))?;
    println!("{rendered}");
    Ok(())
}

/// Initialize the tracing subscriber with the configured log level.
///
/// `RUST_LOG` takes precedence when set.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("genshield={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .init();
}
