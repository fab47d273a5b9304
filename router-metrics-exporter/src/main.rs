//! Prometheus exporter for Qpid Dispatch router metrics.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use prometheus_client::registry::Registry;
use tokio::sync::watch;
use tracing::{error, info, warn};

use router_metrics_common::init_tracing;
use router_metrics_exporter::{
    AmqpManagementClient, ExporterConfig, ExporterMetrics, HttpServer, RouterCollector,
    exposition, telemetry,
};

/// Prometheus exporter for Qpid Dispatch router metrics.
#[derive(Parser, Debug)]
#[command(name = "router-metrics-exporter")]
#[command(about = "Export Qpid Dispatch router statistics as Prometheus metrics")]
#[command(version)]
struct Args {
    /// Path to configuration file (JSON5 format).
    #[arg(short, long)]
    config: Option<String>,

    /// HTTP listen address (overrides config).
    #[arg(long)]
    listen: Option<String>,

    /// Router management address, host:port (overrides config).
    #[arg(long)]
    router: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long)]
    log_level: Option<String>,

    /// Run a single collection pass, print it and exit.
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load configuration
    let mut config = if let Some(config_path) = &args.config {
        ExporterConfig::load_from_file(config_path)?
    } else {
        ExporterConfig::default()
    };

    if let Some(listen) = args.listen {
        config.prometheus.listen = listen;
    }
    if let Some(router) = args.router {
        config.management.address = router;
    }
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }
    config.validate()?;

    init_tracing(&config.logging)?;

    info!(
        router = %config.management.address,
        timeout_secs = config.management.timeout_secs,
        "Starting router metrics exporter"
    );

    let mut registry = Registry::default();
    let metrics = ExporterMetrics::new(&mut registry);
    let client = Arc::new(AmqpManagementClient::new(&config.management));
    let collector = Arc::new(RouterCollector::new(
        client,
        config.management.timeout(),
        metrics,
    ));

    if args.once {
        let families = collector.collect().await?;
        print!("{}", exposition::render(&families));
        print!("{}", telemetry::encode(&registry)?);
        return Ok(());
    }

    let listen_addr = config
        .prometheus
        .listen
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid listen address: {}", e))?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let http_server = HttpServer::new(
        collector,
        Arc::new(registry),
        listen_addr,
        config.prometheus.path.clone(),
    );
    let http_task = tokio::spawn(async move {
        if let Err(e) = http_server.run(shutdown_rx).await {
            error!("HTTP server error: {}", e);
        }
    });

    // Wait for shutdown signal
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
        }
        _ = terminate() => {
            info!("Received SIGTERM, shutting down...");
        }
    }

    shutdown_tx.send(true)?;

    if tokio::time::timeout(Duration::from_secs(5), http_task)
        .await
        .is_err()
    {
        warn!("HTTP server did not stop within 5s");
    }

    info!("Exporter stopped");
    Ok(())
}

#[cfg(unix)]
async fn terminate() {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            warn!(error = %e, "Cannot listen for SIGTERM");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate() {
    std::future::pending::<()>().await;
}
