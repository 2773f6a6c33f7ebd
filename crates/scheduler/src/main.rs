use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Layer as _;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig as _;

use rq_domain::config::{Config, LogFormat, ObservabilityConfig};
use rq_scheduler::cli::{Cli, Command, ConfigCommand};
use rq_scheduler::{LogHandler, Scheduler, SystemClock};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        // Default to serve when no subcommand is given.
        None | Some(Command::Serve) => {
            let (config, config_path) = rq_scheduler::cli::load_config()?;
            let tracer_provider = init_tracing(&config.observability);
            let result = serve(config, &config_path).await;
            if let Some(provider) = tracer_provider {
                if let Err(e) = provider.shutdown() {
                    tracing::warn!(error = ?e, "OpenTelemetry tracer provider shutdown failed");
                }
            }
            result
        }
        Some(Command::Next(args)) => {
            init_cli_tracing();
            rq_scheduler::cli::next::run(args)
        }
        Some(Command::Check { pattern }) => {
            init_cli_tracing();
            if !rq_scheduler::cli::check::run(&pattern) {
                std::process::exit(1);
            }
            Ok(())
        }
        Some(Command::Config(ConfigCommand::Validate)) => {
            init_cli_tracing();
            let (config, config_path) = rq_scheduler::cli::load_config()?;
            if !rq_scheduler::cli::config::validate(&config, &config_path) {
                std::process::exit(1);
            }
            Ok(())
        }
        Some(Command::Config(ConfigCommand::Show)) => {
            init_cli_tracing();
            let (config, _config_path) = rq_scheduler::cli::load_config()?;
            rq_scheduler::cli::config::show(&config)
        }
        Some(Command::Version) => {
            println!("repeatq {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

/// Enqueue every configured job with a logging handler, then run until
/// SIGINT/SIGTERM.
async fn serve(config: Config, config_path: &str) -> anyhow::Result<()> {
    let scheduler = Scheduler::new(config.scheduler.clone(), Arc::new(SystemClock));
    let handler = Arc::new(LogHandler);

    for job in config.jobs {
        let name = job.name.clone();
        let handle = scheduler
            .enqueue_repeatable(job.name, job.payload, job.repeat)
            .with_context(|| format!("enqueueing job '{name}' from {config_path}"))?;
        scheduler
            .on_due(handle, handler.clone())
            .with_context(|| format!("starting job '{name}'"))?;
    }

    tracing::info!(
        config = %config_path,
        jobs = scheduler.list().len(),
        missed_policy = ?config.scheduler.missed_policy,
        "repeatq scheduler started"
    );

    shutdown_signal().await?;
    scheduler.shutdown().await;
    tracing::info!("shutdown complete");
    Ok(())
}

/// Initialize tracing for the `serve` command.
///
/// Log lines use the configured format (JSON by default). When an OTLP
/// endpoint is configured, an OpenTelemetry layer is added so every
/// `tracing` span is also exported via OTLP/gRPC. The returned
/// [`SdkTracerProvider`] must be shut down on exit to flush pending spans.
///
/// [`SdkTracerProvider`]: opentelemetry_sdk::trace::SdkTracerProvider
fn init_tracing(
    obs: &ObservabilityConfig,
) -> Option<opentelemetry_sdk::trace::SdkTracerProvider> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&obs.log_filter));

    let fmt_layer = match obs.log_format {
        LogFormat::Json => tracing_subscriber::fmt::layer().json().boxed(),
        LogFormat::Compact => tracing_subscriber::fmt::layer().compact().boxed(),
    };

    let Some(endpoint) = obs.otlp_target() else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .init();
        return None;
    };

    let exporter = match opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()
    {
        Ok(e) => e,
        Err(e) => {
            eprintln!(
                "WARNING: failed to create OTLP exporter for {endpoint}: {e}; \
                 starting without OpenTelemetry"
            );
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt_layer)
                .init();
            return None;
        }
    };

    let resource = opentelemetry_sdk::Resource::builder()
        .with_service_name(obs.service_name.clone())
        .build();

    let tracer_provider = opentelemetry_sdk::trace::SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_sampler(opentelemetry_sdk::trace::Sampler::TraceIdRatioBased(
            obs.sampling_ratio(),
        ))
        .with_resource(resource)
        .build();

    let otel_layer =
        tracing_opentelemetry::layer().with_tracer(tracer_provider.tracer("repeatq"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .with(otel_layer)
        .init();

    Some(tracer_provider)
}

/// Initialize compact stderr-only tracing for CLI one-shot commands.
///
/// Defaults to `warn` level so diagnostic output does not pollute stdout.
fn init_cli_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() -> anyhow::Result<()> {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .context("registering SIGTERM handler")?;

        tokio::select! {
            _ = ctrl_c => tracing::info!("received SIGINT, shutting down"),
            _ = sigterm.recv() => tracing::info!("received SIGTERM, shutting down"),
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.context("waiting for ctrl-c")?;
        tracing::info!("received SIGINT, shutting down");
    }

    Ok(())
}
