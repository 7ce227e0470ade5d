//! grouped-process-exporter
//!
//! Prometheus exporter for per-group process statistics with tracing logging.
//! This is the main entry point that initializes the server and handles subcommands.

mod cli;
mod config;
mod handlers;
mod state;

use anyhow::Context;
use axum::{routing::get, Router};
use axum_server::tls_rustls::RustlsConfig;
use clap::Parser;
use grouped_process_exporter::metric::Accumulator;
use grouped_process_exporter::{GroupedProcCollector, HealthStats};
use prometheus::Registry;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::{net::TcpListener, signal};
use tracing::level_filters::LevelFilter;
use tracing::{debug, error, info};

use cli::{Args, Commands, ConfigFormat, LogLevel};
use config::{
    render_config, resolve_config, show_config, validate_effective_config, Config,
    DEFAULT_BIND_ADDR, DEFAULT_PORT,
};
use handlers::{health_handler, metrics_handler, root_handler};
use state::{AppState, SharedState, Telemetry};

/// Initializes tracing logging subsystem with configured log level.
fn setup_logging(args: &Args) -> anyhow::Result<()> {
    let log_level = match args.log_level {
        LogLevel::Off => LevelFilter::OFF,
        LogLevel::Error => LevelFilter::ERROR,
        LogLevel::Warn => LevelFilter::WARN,
        LogLevel::Info => LevelFilter::INFO,
        LogLevel::Debug => LevelFilter::DEBUG,
        LogLevel::Trace => LevelFilter::TRACE,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    info!("Logging initialized with level: {:?}", args.log_level);
    Ok(())
}

/// Loads and validates configuration, exiting with code 1 when it is invalid.
fn load_validated_config(args: &Args) -> anyhow::Result<Config> {
    let config = resolve_config(args)?;
    if let Err(e) = validate_effective_config(&config) {
        eprintln!("❌ Configuration invalid: {:#}", e);
        std::process::exit(1);
    }
    Ok(config)
}

/// Builds the collector for `config`, registering its descriptors in `registry`.
fn build_collector(config: &Config, registry: &Registry) -> anyhow::Result<GroupedProcCollector> {
    let grouper = config.build_grouper()?;
    let enabled = config.enabled_metrics()?;
    let options = config.collector_options()?;
    info!(
        "Grouping by {} (max concurrency {}), collecting {:?}",
        grouper.name(),
        options.max_concurrency,
        enabled
    );
    GroupedProcCollector::new(grouper, enabled, registry, options)
        .context("Failed to register grouped process metrics")
}

/// Runs one collection cycle and prints the grouped table.
async fn command_debug(config: &Config) -> anyhow::Result<()> {
    let registry = Registry::new();
    let collector = build_collector(config, &registry)?;

    let start = Instant::now();
    collector.collect().await?;
    let elapsed = start.elapsed();

    for (group, gproc) in collector.table().snapshot() {
        if !gproc.exists() {
            continue;
        }
        println!("{}: procs={}", group, gproc.num_procs());
        for acc in gproc.accumulators() {
            match acc {
                Accumulator::Stat(s) => println!("  stat: {:?}", s.totals()),
                Accumulator::Io(i) => println!("  io: {:?}", i.totals()),
            }
        }
    }
    let stats = collector.table().stats();
    println!(
        "\n{} groups in {:.3}s ({:?})",
        collector.table().len(),
        elapsed.as_secs_f64(),
        stats
    );
    Ok(())
}

/// Writes a starter configuration to `output` or stdout.
fn command_config(output: Option<PathBuf>, format: ConfigFormat) -> anyhow::Result<()> {
    let config = Config {
        collect_stat: Some(true),
        ..Config::default()
    };
    let rendered = render_config(&config, format)?;
    match output {
        Some(path) => {
            std::fs::write(&path, rendered)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("✅ Configuration written to {}", path.display());
        }
        None => println!("{rendered}"),
    }
    Ok(())
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C), shutting down gracefully...");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down gracefully...");
        }
    }
}

/// Main application entry point.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Early config resolution for show/check modes
    if args.show_config || args.check_config {
        let config = resolve_config(&args)?;

        if args.check_config {
            if let Err(e) = validate_effective_config(&config) {
                eprintln!("❌ Configuration invalid: {:#}", e);
                std::process::exit(1);
            }
            println!("✅ Configuration is valid");
            return Ok(());
        }

        return show_config(&config, args.config_format);
    }

    if let Some(command) = &args.command {
        return match command {
            Commands::Config { output, format } => command_config(output.clone(), *format),
            Commands::Debug => {
                setup_logging(&args)?;
                let config = load_validated_config(&args)?;
                command_debug(&config).await
            }
        };
    }

    let config = load_validated_config(&args)?;
    setup_logging(&args)?;

    info!("Starting grouped-process-exporter");

    let bind_ip_str = config.bind.as_deref().unwrap_or(DEFAULT_BIND_ADDR);
    let port = config.port.unwrap_or(DEFAULT_PORT);

    // Initialize Prometheus metrics registry
    let registry = Registry::new();
    debug!("Prometheus registry initialized");

    let collector = Arc::new(build_collector(&config, &registry)?);
    let telemetry = if config.enable_telemetry.unwrap_or(true) {
        Some(Telemetry::new(&registry)?)
    } else {
        debug!("Exporter telemetry disabled");
        None
    };
    debug!("All metrics registered successfully");

    let state: SharedState = Arc::new(AppState {
        registry,
        collector: Arc::clone(&collector),
        telemetry,
        config: Arc::new(config.clone()),
        health_stats: Arc::new(HealthStats::new()),
        start_time: Instant::now(),
    });

    // Configure HTTP server routes
    let addr: SocketAddr = format!("{}:{}", bind_ip_str, port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", bind_ip_str, port))?;

    let mut app = Router::new()
        .route("/", get(root_handler))
        .route(config.metrics_path(), get(metrics_handler));

    if config.enable_health.unwrap_or(true) {
        app = app.route("/health", get(health_handler));
    }

    let app = app.with_state(state);

    let enable_tls = config.enable_tls.unwrap_or(false);

    if enable_tls {
        // Both paths are checked by validate_effective_config
        let (Some(cert_path), Some(key_path)) =
            (config.tls_cert_path.as_ref(), config.tls_key_path.as_ref())
        else {
            anyhow::bail!("TLS is enabled but certificate or key path is missing");
        };

        info!("Loading TLS certificate from: {}", cert_path);
        info!("Loading TLS private key from: {}", key_path);

        let tls_config = RustlsConfig::from_pem_file(cert_path, key_path)
            .await
            .context("Failed to load TLS configuration")?;

        info!(
            "grouped-process-exporter listening on https://{}:{}{}",
            bind_ip_str,
            port,
            config.metrics_path()
        );

        let server = axum_server::bind_rustls(addr, tls_config).serve(app.into_make_service());

        tokio::select! {
            result = server => {
                if let Err(e) = result {
                    error!("Server error: {}", e);
                    return Err(e.into());
                }
            }
            _ = shutdown_signal() => {
                collector.shutdown();
                info!("Shutdown signal received, exiting...");
            }
        }
    } else {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind {}", addr))?;
        info!(
            "grouped-process-exporter listening on http://{}:{}{}",
            bind_ip_str,
            port,
            config.metrics_path()
        );

        let server = axum::serve(listener, app);

        tokio::select! {
            result = server => {
                if let Err(e) = result {
                    error!("Server error: {}", e);
                    return Err(e.into());
                }
            }
            _ = shutdown_signal() => {
                collector.shutdown();
                info!("Shutdown signal received, exiting...");
            }
        }
    }

    info!("grouped-process-exporter stopped gracefully");
    Ok(())
}
