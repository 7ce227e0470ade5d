//! CLI arguments and subcommands for grouped-process-exporter.
//!
//! This module defines the command-line interface structure using the clap library,
//! including all flags, options, and subcommands.

use clap::{Parser, Subcommand, ValueEnum};
use grouped_process_exporter::GroupType;
use std::net::IpAddr;
use std::path::PathBuf;

/// Log level options for CLI parsing
#[derive(Debug, Clone, ValueEnum)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Configuration format options for output
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ConfigFormat {
    Yaml,
    Json,
    Toml,
}

/// Main CLI arguments structure
#[derive(Parser, Debug)]
#[command(
    name = "grouped-process-exporter",
    about = "Prometheus exporter for process statistics grouped by cgroup or process name",
    long_about = "Prometheus exporter for process statistics grouped by cgroup or process name.\n\n\
                  Walks the cgroup hierarchy (or every process in /proc), sums each member's \
                  /proc/<pid>/stat and /proc/<pid>/io counters per group and exports the totals.",
    version,
    propagate_version = true
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// HTTP listen port
    #[arg(short = 'p', long)]
    pub port: Option<u16>,

    /// Bind to specific interface/IP
    #[arg(long)]
    pub bind: Option<IpAddr>,

    /// Path under which to expose metrics
    #[arg(long)]
    pub metrics_path: Option<String>,

    /// Log level
    #[arg(long, value_enum, default_value = "info")]
    pub log_level: LogLevel,

    /// Config file (YAML/JSON/TOML)
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Disable all config file loading
    #[arg(long)]
    pub no_config: bool,

    /// Print effective merged config and exit
    #[arg(long)]
    pub show_config: bool,

    /// Output format for --show-config
    #[arg(long, value_enum, default_value = "yaml")]
    pub config_format: ConfigFormat,

    /// Validate config and exit (return code 1 on error)
    #[arg(long)]
    pub check_config: bool,

    /// Grouping strategy
    #[arg(long, value_enum)]
    pub group_type: Option<GroupType>,

    /// Normalize pattern with exactly one capture group
    #[arg(long)]
    pub group_normalize: Option<String>,

    /// Skip groups whose raw cgroup path or process name matches this pattern
    #[arg(long)]
    pub group_exclude: Option<String>,

    /// Collect /proc/<pid>/stat
    #[arg(long)]
    pub collector_stat: bool,

    /// Collect /proc/<pid>/io
    #[arg(long)]
    pub collector_io: bool,

    /// cgroup mount root
    #[arg(long)]
    pub cgroup_root: Option<PathBuf>,

    /// proc mount root (GROUPED_PROCESS_PROC_MOUNT_POINT takes precedence)
    #[arg(long)]
    pub proc_root: Option<PathBuf>,

    /// Maximum weight of concurrent directory inspections and process reads
    #[arg(long)]
    pub max_concurrency: Option<u32>,

    /// Keep groups that were not seen in the last cycle
    #[arg(long)]
    pub keep_stale_groups: bool,

    /// Disable /health endpoint
    #[arg(long)]
    pub disable_health: bool,

    /// Disable internal grouped_process_exporter_* metrics
    #[arg(long)]
    pub disable_telemetry: bool,

    /// Enable TLS/SSL for HTTPS
    #[arg(long)]
    pub enable_tls: bool,

    /// Path to TLS certificate file (PEM format)
    #[arg(long)]
    pub tls_cert: Option<PathBuf>,

    /// Path to TLS private key file (PEM format)
    #[arg(long)]
    pub tls_key: Option<PathBuf>,
}

/// Subcommands for additional functionality
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one collection cycle and print the grouped table
    Debug,

    /// Generate a configuration file
    Config {
        /// Output file path (stdout if omitted)
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,

        /// Output format
        #[arg(long, value_enum, default_value = "yaml")]
        format: ConfigFormat,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_grouping_flags() {
        let args = Args::try_parse_from([
            "grouped-process-exporter",
            "--group-type",
            "name",
            "--group-normalize",
            "^(.+)-worker$",
            "--collector-stat",
            "--collector-io",
            "--max-concurrency",
            "8",
        ])
        .expect("Failed to parse args");

        assert_eq!(args.group_type, Some(GroupType::Name));
        assert_eq!(args.group_normalize.as_deref(), Some("^(.+)-worker$"));
        assert!(args.collector_stat);
        assert!(args.collector_io);
        assert_eq!(args.max_concurrency, Some(8));
        assert!(args.command.is_none());
    }

    #[test]
    fn test_unknown_group_type_rejected() {
        let res = Args::try_parse_from(["grouped-process-exporter", "--group-type", "pid"]);
        assert!(res.is_err());
    }

    #[test]
    fn test_config_subcommand() {
        let args = Args::try_parse_from(["grouped-process-exporter", "config", "--format", "toml"])
            .expect("Failed to parse args");
        assert!(matches!(
            args.command,
            Some(Commands::Config {
                output: None,
                format: ConfigFormat::Toml
            })
        ));
    }
}
