//! # lapgate
//!
//! Lap-trigger broadcaster binary — acquires the sensor lines, starts the
//! gateway, and wires lap detection into the session registry.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use lapgate_core::LapCounter;
use lapgate_sensor::{Debouncer, GpioEdgeSource, SensorWatcher};
use lapgate_server::{GatewayConfig, GatewayServer, SessionRegistry};
use lapgate_settings::LapgateSettings;

/// Track-side lap-trigger broadcaster.
#[derive(Parser, Debug)]
#[command(name = "lapgate", about = "Lap-trigger gateway and broadcaster")]
struct Cli {
    /// Host to bind both listeners on.
    #[arg(long)]
    host: Option<String>,

    /// Public gateway port (0 for auto-assign).
    #[arg(long)]
    port: Option<u16>,

    /// Admin port for /health and /metrics (0 for auto-assign).
    #[arg(long)]
    admin_port: Option<u16>,

    /// Upstream origin to forward non-stream traffic to.
    #[arg(long)]
    upstream: Option<String>,

    /// Debounce window in milliseconds.
    #[arg(long)]
    debounce_ms: Option<u64>,

    /// Input channel to watch (repeatable; replaces the configured set).
    #[arg(long = "channel")]
    channels: Vec<u32>,

    /// GPIO character device path.
    #[arg(long)]
    gpio_chip: Option<String>,

    /// Run the gateway without sensor hardware (no lap detection).
    #[arg(long)]
    no_sensor: bool,

    /// Path to the settings file (default `~/.lapgate/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,
}

/// Fold CLI flags over the loaded settings (CLI wins).
fn apply_cli_overrides(settings: &mut LapgateSettings, cli: &Cli) {
    if let Some(ref host) = cli.host {
        settings.server.host.clone_from(host);
    }
    if let Some(port) = cli.port {
        settings.server.port = port;
    }
    if let Some(admin_port) = cli.admin_port {
        settings.server.admin_port = admin_port;
    }
    if let Some(ref upstream) = cli.upstream {
        settings.upstream.origin.clone_from(upstream);
    }
    if let Some(debounce_ms) = cli.debounce_ms {
        settings.sensor.debounce_ms = debounce_ms;
    }
    if !cli.channels.is_empty() {
        settings.sensor.channels.clone_from(&cli.channels);
    }
    if let Some(ref chip) = cli.gpio_chip {
        settings.sensor.chip.clone_from(chip);
    }
}

/// Install the tracing subscriber (`LAPGATE_LOG` > `RUST_LOG` > `info`).
fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = std::env::var("LAPGATE_LOG")
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| "info".to_owned());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing();

    let settings_path = args
        .settings
        .clone()
        .unwrap_or_else(lapgate_settings::settings_path);
    let mut settings = lapgate_settings::load_settings_from_path(&settings_path)
        .context("Failed to load settings")?;
    apply_cli_overrides(&mut settings, &args);

    let metrics_handle = lapgate_server::metrics::install_recorder();
    let config = GatewayConfig::from_settings(&settings)?;

    // Acquire the input lines before anything is listening: a gateway that
    // cannot detect laps must not come up looking healthy.
    let sources = if args.no_sensor {
        tracing::warn!("running without sensor hardware (--no-sensor): lap detection disabled");
        None
    } else {
        let sources = GpioEdgeSource::open_all(&settings.sensor.chip, &settings.sensor.channels)
            .with_context(|| {
                format!(
                    "Failed to acquire sensor lines {:?} on {}",
                    settings.sensor.channels, settings.sensor.chip
                )
            })?;
        tracing::info!(
            chip = settings.sensor.chip.as_str(),
            channels = ?settings.sensor.channels,
            debounce_ms = settings.sensor.debounce_ms,
            "sensor lines acquired"
        );
        Some(sources)
    };

    let registry = Arc::new(SessionRegistry::new());
    let laps = Arc::new(LapCounter::new());
    let server = GatewayServer::new(config, Arc::clone(&registry), Arc::clone(&laps))?
        .with_metrics(metrics_handle);

    let listening = server.listen().await.context("Failed to bind listeners")?;

    let mut background = Vec::new();
    if let Some(sources) = sources {
        let watcher = SensorWatcher::new(
            Debouncer::new(std::time::Duration::from_millis(settings.sensor.debounce_ms)),
            laps,
            registry,
        );
        let cancel = server.shutdown().token();
        background.push(tokio::spawn(watcher.run(sources, cancel)));
    }

    tracing::info!(
        public = %listening.public_addr,
        admin = %listening.admin_addr,
        "lapgate ready"
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("shutting down...");
    server.shutdown().drain(background, None).await;
    let _ = listening.handle.await;
    tracing::info!("shutdown complete");
    Ok(())
}
