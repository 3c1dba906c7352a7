//! Ingestor - daemon entry point
//!
//! Loads configuration, starts the enabled UDP listeners and runs until
//! SIGTERM or SIGINT.

use anyhow::{Context, Result};
use clap::{Arg, Command};
use futures_util::stream::StreamExt;
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook_tokio::Signals;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use ingestor::config::LogRotation;
use ingestor::listener::{SyslogHandler, TrapHandler};
use ingestor::{
    start_listener, Config, EndpointHealthChecker, ListenerKind, NormalizerForwarder,
};

const CONFIG_ENV: &str = "INGESTOR_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config.json";

#[tokio::main]
async fn main() -> Result<()> {
    let matches = Command::new("ingestor")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Receives syslog lines and SNMP traps over UDP and forwards them for normalization and routing.")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path (default: $INGESTOR_CONFIG or config.json)"),
        )
        .arg(
            Arg::new("daemon")
                .short('d')
                .long("daemon")
                .help("Run as daemon (suppress console output)")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("generate-config")
                .long("generate-config")
                .help("Write a default configuration file and exit")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("check-health")
                .long("check-health")
                .help("Probe the normalizer and downstream services, print their health and exit")
                .action(clap::ArgAction::SetTrue),
        )
        .get_matches();

    let config_path = match matches.get_one::<String>("config") {
        Some(path) => PathBuf::from(path),
        None => PathBuf::from(
            std::env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string()),
        ),
    };
    let daemon_mode = matches.get_flag("daemon");

    if matches.get_flag("generate-config") {
        return generate_default_config(&config_path).await;
    }

    let config = load_configuration(&config_path).await?;

    initialise_logging(&config, daemon_mode)?;

    info!("Starting ingestor v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded from: {}", config_path.display());

    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        return Err(anyhow::Error::new(e).context("Configuration validation failed"));
    }

    if matches.get_flag("check-health") {
        return check_health(&config).await;
    }

    run_application(config).await
}

async fn generate_default_config(config_path: &Path) -> Result<()> {
    if config_path.exists() {
        anyhow::bail!("Configuration file already exists: {}", config_path.display());
    }

    Config::default()
        .save_to_file(config_path)
        .await
        .context("Failed to save default configuration")?;

    println!("Default configuration generated: {}", config_path.display());
    println!("Edit the normalizer URL and the routing section, then start the ingestor.");
    Ok(())
}

/// Load configuration, writing the defaults first if the file is missing
async fn load_configuration(config_path: &Path) -> Result<Config> {
    if !config_path.exists() {
        let default_config = Config::default();
        default_config
            .save_to_file(config_path)
            .await
            .context("Failed to create default configuration file")?;

        // Logging is not initialised yet.
        eprintln!(
            "Configuration file not found, created defaults at {}",
            config_path.display()
        );
        return Ok(default_config);
    }

    Config::load_from_file(config_path)
        .await
        .with_context(|| format!("Failed to load configuration file {}", config_path.display()))
}

fn initialise_logging(config: &Config, daemon_mode: bool) -> Result<()> {
    // Unknown levels fall back to info and are reported once the subscriber is up.
    let parsed_level = config.logging.level.parse::<tracing::Level>().ok();
    let level = parsed_level.unwrap_or(tracing::Level::INFO);

    let mut layers = Vec::new();

    // Console output, suppressed in daemon mode
    if config.logging.console_output && !daemon_mode {
        let console_layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stdout)
            .with_ansi(true);
        layers.push(console_layer.boxed());
    }

    // File output, rolled by the configured rotation
    if let Some(ref log_file_path) = config.logging.file_output {
        let log_path = Path::new(log_file_path);
        let log_dir = log_path.parent().unwrap_or(Path::new("."));
        let log_filename = log_path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("ingestor.log");

        // Create the log directory if it doesn't exist
        std::fs::create_dir_all(log_dir).context("Failed to create log directory")?;

        let file_appender = match config.logging.rotation {
            LogRotation::Daily => tracing_appender::rolling::daily(log_dir, log_filename),
            LogRotation::Hourly => tracing_appender::rolling::hourly(log_dir, log_filename),
            LogRotation::Never => tracing_appender::rolling::never(log_dir, log_filename),
        };

        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        let file_layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_file(true)
            .with_line_number(true)
            .with_target(false);
        layers.push(file_layer.boxed());

        // Held for the process lifetime; the writer stops flushing once the guard drops.
        static GUARD_HOLDER: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
            std::sync::OnceLock::new();
        let _ = GUARD_HOLDER.set(guard);
    }

    // Fallback to stderr if no output configured
    if layers.is_empty() {
        let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
        layers.push(stderr_layer.boxed());
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(tracing_subscriber::filter::LevelFilter::from_level(level))
        .init();

    if parsed_level.is_none() {
        warn!("Unknown log level '{}', using info", config.logging.level);
    }

    Ok(())
}

async fn check_health(config: &Config) -> Result<()> {
    let checker = EndpointHealthChecker::new().context("Failed to create health checker")?;

    let endpoints = std::iter::once(("normalizer", config.normalizer.url.as_str())).chain(
        config
            .routing
            .services
            .iter()
            .map(|(name, url)| (name.as_str(), url.as_str())),
    );

    for (name, status) in checker.check_all(endpoints).await {
        println!("{:<20} {}", name, status);
    }
    Ok(())
}

async fn run_application(config: Config) -> Result<()> {
    let normalizer = Arc::new(
        NormalizerForwarder::new(&config.normalizer).context("Failed to create normalizer forwarder")?,
    );
    info!("Forwarding events to normalizer at {}", normalizer.url());

    let mut listeners = Vec::new();

    if config.listeners.syslog.enabled {
        let handler = Arc::new(SyslogHandler::new(Arc::clone(&normalizer)));
        let handle = start_listener(ListenerKind::Syslog, &config.listeners.syslog, handler)
            .await
            .context("Syslog listener failed to start")?;
        listeners.push(handle);
    } else {
        info!("Syslog listener disabled");
    }

    if config.listeners.snmp.enabled {
        let handler = Arc::new(TrapHandler::new(Arc::clone(&normalizer)));
        let handle = start_listener(ListenerKind::SnmpTrap, &config.listeners.snmp, handler)
            .await
            .context("SNMP trap listener failed to start")?;
        listeners.push(handle);
    } else {
        info!("SNMP trap listener disabled");
    }

    if listeners.is_empty() {
        anyhow::bail!("No listeners enabled - enable syslog or snmp in the configuration");
    }

    for (listener, kind) in [
        (&config.listeners.syslog, ListenerKind::Syslog),
        (&config.listeners.snmp, ListenerKind::SnmpTrap),
    ] {
        if listener.enabled && listener.max_in_flight.is_none() {
            info!("{} listener fan-out is unbounded; set max_in_flight to cap it", kind);
        }
    }

    let mut signals =
        Signals::new([SIGTERM, SIGINT]).context("Failed to register signal handlers")?;

    info!("Ingestor started, {} listener(s) running", listeners.len());

    signals.next().await;
    info!("Received shutdown signal, stopping listeners");

    // In-flight forwards are abandoned, not drained.
    for handle in listeners {
        handle.stop().await;
    }

    info!("Ingestor stopped");
    Ok(())
}
