//! httpmeter - probe HTTP endpoints through an instrumented client
//!
//! Usage:
//!     httpmeter --config <path>
//!
//! See --help for more options.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use httpmeter::config::{load_config, Config};
use httpmeter::metrics::{MetricRegistry, MetricsServer};
use httpmeter::new_instrumented_client_with;
use httpmeter::probe::Prober;
use httpmeter::util::{init_logging, ShutdownSignal};

/// Probe HTTP endpoints and export client metrics for Prometheus.
#[derive(Parser, Debug)]
#[command(name = "httpmeter")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, value_name = "FILE")]
    config: PathBuf,

    /// Override log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Validate configuration and exit
    #[arg(long)]
    validate: bool,

    /// Probe every target once, print the metrics and exit
    #[arg(long)]
    once: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(&cli.config).with_context(|| {
        format!(
            "failed to load configuration from '{}'",
            cli.config.display()
        )
    })?;

    // CLI overrides config
    let log_level = cli
        .log_level
        .as_deref()
        .unwrap_or(&config.global.log_level);
    init_logging(log_level, &config.global.log_format).context("failed to initialize logging")?;

    if cli.validate {
        info!("Configuration is valid");
        println!("Configuration is valid.");
        println!("  Targets: {}", config.targets.len());
        for target in &config.targets {
            println!(
                "    - {} {} {} every {}",
                target.name,
                target.method,
                target.url,
                humantime::format_duration(target.interval)
            );
        }
        return Ok(());
    }

    info!(
        config_path = %cli.config.display(),
        targets = config.targets.len(),
        "httpmeter starting"
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    runtime.block_on(run(config, cli.once))
}

async fn run(config: Config, once: bool) -> Result<()> {
    let mut registry = MetricRegistry::new();
    let client = new_instrumented_client_with(&config.client, &mut registry)
        .context("failed to register client metrics")?;
    let registry = Arc::new(registry);
    let prober = Prober::new(client.into_client(), config.targets);

    if once {
        prober.probe_once().await;
        let encoded = registry.encode().context("failed to encode metrics")?;
        print!("{encoded}");
        return Ok(());
    }

    let shutdown = ShutdownSignal::new();
    let mut handles = Vec::new();

    let metrics = &config.global.metrics;
    if metrics.enabled {
        let server = MetricsServer::bind(metrics.address, &metrics.path, Arc::clone(&registry))
            .await
            .with_context(|| format!("failed to bind metrics server on {}", metrics.address))?;
        handles.push(tokio::spawn(server.run(shutdown.subscribe())));
    }

    let prober_shutdown = shutdown.clone();
    handles.push(tokio::spawn(async move {
        prober.run(&prober_shutdown).await;
    }));

    info!("httpmeter is running");
    info!("press Ctrl+C to stop");
    shutdown.shutdown_on_ctrl_c().await;

    for handle in handles {
        let _ = handle.await;
    }

    info!("httpmeter shut down complete");
    Ok(())
}
