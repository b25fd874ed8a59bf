use anyhow::Result;
use clap::Parser;
use commvault_exporter::{
    client::CommvaultClient,
    config::{LogFormat, Settings},
    metrics::MetricsCollector,
    poller::Poller,
    server::start_server,
    snapshot::SnapshotStore,
};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Commvault Exporter - Prometheus metrics exporter for Commvault
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", env = "COMMVAULT_EXPORTER_CONFIG")]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse();

    // Load configuration
    let settings = Settings::load(args.config.as_deref())?;

    // Initialize logging
    init_logging(&settings.exporter.log_level, &settings.exporter.log_format)?;

    let commvault = &settings.commvault;
    let host = commvault.host_label();
    info!("Starting Commvault Exporter {}", env!("CARGO_PKG_VERSION"));
    info!("Commvault URL: {}", commvault.base_url);
    info!("Commvault host: {}", host);
    info!("Commvault user: {}", commvault.username);
    info!("TLS verification: {}", commvault.verify_tls);
    info!("Request timeout: {}s", commvault.timeout_seconds);
    info!("Poll interval: {}s", commvault.poll_interval_seconds);
    info!("Listen address: {}", settings.exporter.listen_address);
    info!("Log format: {:?}", settings.exporter.log_format);

    // Log in once; nothing else works without a token
    let mut client = CommvaultClient::new(settings.commvault.clone())?;
    if let Err(e) = client.login().await {
        error!("Cannot continue without a Commvault token: {}", e);
        return Err(e.into());
    }

    let snapshots = Arc::new(SnapshotStore::new());
    let metrics = MetricsCollector::new(snapshots.clone(), host)?;
    info!("Metrics collector initialized");

    // Fill the snapshots before the first scrape can arrive
    let poller = Poller::new(client, snapshots)
        .with_cycle_histogram(metrics.request_processing_seconds());
    poller.refresh().await;
    poller.spawn();

    // Start HTTP server
    if let Err(e) = start_server(&settings.exporter.listen_address, metrics).await {
        error!("Server error: {}", e);
        return Err(e.into());
    }

    Ok(())
}

/// Initialize structured logging with tracing.
fn init_logging(log_level: &str, log_format: &LogFormat) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let (json, text) = match log_format {
        LogFormat::Json => (Some(tracing_subscriber::fmt::layer().json()), None),
        LogFormat::Text => (None, Some(tracing_subscriber::fmt::layer())),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json)
        .with(text)
        .init();

    Ok(())
}
