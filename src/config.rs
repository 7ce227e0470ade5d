//! Configuration management for grouped-process-exporter.
//!
//! This module handles loading, merging, and validating configuration from files
//! and CLI arguments. It supports YAML, JSON, and TOML formats.

use anyhow::{bail, Context};
use grouped_process_exporter::grouper::cgroup::DEFAULT_CGROUP_ROOT;
use grouped_process_exporter::procfs::resolve_proc_root;
use grouped_process_exporter::{
    CollectorOptions, ConfigError, EnabledMetrics, GroupType, Grouper, MetricKind,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::cli::{Args, ConfigFormat};

// Default configuration constants
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 9644;
pub const DEFAULT_METRICS_PATH: &str = "/metrics";

const DEFAULT_LOCATIONS: &[&str] = &[
    "/etc/grouped-process-exporter/config.yaml",
    "/etc/grouped-process-exporter/config.yml",
    "/etc/grouped-process-exporter/config.json",
    "./grouped-process-exporter.yaml",
    "./grouped-process-exporter.yml",
    "./grouped-process-exporter.json",
];

/// Exporter configuration. Every field is optional so a file only needs to
/// name what it overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Server configuration
    pub port: Option<u16>,
    pub bind: Option<String>,
    #[serde(alias = "telemetry-endpoint")]
    pub metrics_path: Option<String>,

    // Grouping
    #[serde(alias = "group-type")]
    pub group_type: Option<GroupType>,
    #[serde(alias = "group-normalize")]
    pub normalize: Option<String>,
    #[serde(alias = "group-exclude")]
    pub exclude: Option<String>,

    // Metric kinds
    #[serde(alias = "collector-stat")]
    pub collect_stat: Option<bool>,
    #[serde(alias = "collector-io")]
    pub collect_io: Option<bool>,

    // Filesystem roots
    #[serde(alias = "cgroup-root")]
    pub cgroup_root: Option<PathBuf>,
    #[serde(alias = "proc-root")]
    pub proc_root: Option<PathBuf>,

    // Collection tuning
    #[serde(alias = "max-concurrency")]
    pub max_concurrency: Option<u32>,
    #[serde(alias = "evict-stale-groups")]
    pub evict_stale_groups: Option<bool>,

    // Feature flags
    pub enable_health: Option<bool>,
    pub enable_telemetry: Option<bool>,

    // TLS/SSL Configuration
    #[serde(alias = "enable-tls")]
    pub enable_tls: Option<bool>,
    #[serde(alias = "tls-cert-path")]
    pub tls_cert_path: Option<String>,
    #[serde(alias = "tls-key-path")]
    pub tls_key_path: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        let collector = CollectorOptions::default();
        Self {
            port: Some(DEFAULT_PORT),
            bind: Some(DEFAULT_BIND_ADDR.to_string()),
            metrics_path: Some(DEFAULT_METRICS_PATH.to_string()),
            group_type: Some(GroupType::Cgroup),
            normalize: None,
            exclude: None,
            collect_stat: Some(false),
            collect_io: Some(false),
            cgroup_root: Some(PathBuf::from(DEFAULT_CGROUP_ROOT)),
            proc_root: None,
            max_concurrency: Some(collector.max_concurrency),
            evict_stale_groups: Some(collector.evict_stale_groups),
            enable_health: Some(true),
            enable_telemetry: Some(true),
            enable_tls: Some(false),
            tls_cert_path: None,
            tls_key_path: None,
        }
    }
}

impl Config {
    /// Metric kinds turned on in this config. Empty is a configuration error.
    pub fn enabled_metrics(&self) -> Result<EnabledMetrics, ConfigError> {
        let mut enabled = EnabledMetrics::new();
        if self.collect_stat.unwrap_or(false) {
            enabled.insert(MetricKind::Stat);
        }
        if self.collect_io.unwrap_or(false) {
            enabled.insert(MetricKind::Io);
        }
        if enabled.is_empty() {
            return Err(ConfigError::NoMetricsEnabled);
        }
        Ok(enabled)
    }

    pub fn proc_root(&self) -> PathBuf {
        resolve_proc_root(self.proc_root.as_deref().and_then(|p| p.to_str()))
    }

    pub fn cgroup_root(&self) -> PathBuf {
        self.cgroup_root
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CGROUP_ROOT))
    }

    pub fn metrics_path(&self) -> &str {
        self.metrics_path.as_deref().unwrap_or(DEFAULT_METRICS_PATH)
    }

    pub fn collector_options(&self) -> Result<CollectorOptions, ConfigError> {
        let defaults = CollectorOptions::default();
        let max_concurrency = self.max_concurrency.unwrap_or(defaults.max_concurrency);
        if max_concurrency == 0 {
            return Err(ConfigError::InvalidConcurrency);
        }
        Ok(CollectorOptions {
            max_concurrency,
            evict_stale_groups: self
                .evict_stale_groups
                .unwrap_or(defaults.evict_stale_groups),
        })
    }

    /// Builds the configured strategy with its exclude and normalize rules.
    pub fn build_grouper(&self) -> Result<Grouper, ConfigError> {
        let group_type = self.group_type.unwrap_or(GroupType::Cgroup);
        let mut grouper = Grouper::new(group_type, &self.cgroup_root(), &self.proc_root());
        if let Some(pattern) = self.normalize.as_deref() {
            grouper.set_normalize_regexp(pattern)?;
        }
        if let Some(pattern) = self.exclude.as_deref() {
            grouper.set_exclude_regexp(pattern)?;
        }
        Ok(grouper)
    }
}

/// Validate effective config (used by --check-config and at startup)
pub fn validate_effective_config(cfg: &Config) -> anyhow::Result<()> {
    cfg.enabled_metrics()?;
    cfg.collector_options()?;
    cfg.build_grouper()?;

    let path = cfg.metrics_path();
    if !path.starts_with('/') || path == "/" {
        bail!("metrics_path must start with '/' and must not be '/', got '{}'", path);
    }

    // TLS validation
    if cfg.enable_tls.unwrap_or(false) {
        let cert_path = cfg.tls_cert_path.as_deref();
        let key_path = cfg.tls_key_path.as_deref();

        match (cert_path, key_path) {
            (None, None) => {
                bail!("TLS is enabled but neither tls_cert_path nor tls_key_path are set");
            }
            (Some(_), None) => bail!("TLS is enabled but tls_key_path is not set"),
            (None, Some(_)) => bail!("TLS is enabled but tls_cert_path is not set"),
            (Some(cert), Some(key)) => {
                check_pem_file(cert, "certificate")?;
                check_pem_file(key, "private key")?;
            }
        }
    }

    Ok(())
}

fn check_pem_file(path: &str, what: &str) -> anyhow::Result<()> {
    let meta = fs::metadata(path)
        .with_context(|| format!("TLS {} file is not readable: {}", what, path))?;
    if meta.len() == 0 {
        bail!("TLS {} file is empty: {}", what, path);
    }
    Ok(())
}

/// Resolves configuration from CLI args, config file, and defaults.
/// This enforces precedence: CLI (if provided) > config file > default.
pub fn resolve_config(args: &Args) -> anyhow::Result<Config> {
    let mut config = if args.no_config {
        Config::default()
    } else {
        load_config(args.config.as_deref())?
    };

    // Server
    if let Some(bind_ip) = args.bind {
        config.bind = Some(bind_ip.to_string());
    }
    if let Some(cli_port) = args.port {
        config.port = Some(cli_port);
    }
    if let Some(path) = &args.metrics_path {
        config.metrics_path = Some(path.clone());
    }

    // Grouping
    if let Some(group_type) = args.group_type {
        config.group_type = Some(group_type);
    }
    if let Some(pattern) = &args.group_normalize {
        config.normalize = Some(pattern.clone());
    }
    if let Some(pattern) = &args.group_exclude {
        config.exclude = Some(pattern.clone());
    }

    // Metric kinds are switched on by flags, never off
    if args.collector_stat {
        config.collect_stat = Some(true);
    }
    if args.collector_io {
        config.collect_io = Some(true);
    }

    if let Some(root) = &args.cgroup_root {
        config.cgroup_root = Some(root.clone());
    }
    if let Some(root) = &args.proc_root {
        config.proc_root = Some(root.clone());
    }
    if let Some(n) = args.max_concurrency {
        config.max_concurrency = Some(n);
    }
    if args.keep_stale_groups {
        config.evict_stale_groups = Some(false);
    }

    // Feature flags
    if args.disable_health {
        config.enable_health = Some(false);
    }
    if args.disable_telemetry {
        config.enable_telemetry = Some(false);
    }

    // TLS configuration: CLI wins if provided
    if args.enable_tls {
        config.enable_tls = Some(true);
    }
    if let Some(cert_path) = &args.tls_cert {
        config.tls_cert_path = Some(cert_path.to_string_lossy().to_string());
    }
    if let Some(key_path) = &args.tls_key {
        config.tls_key_path = Some(key_path.to_string_lossy().to_string());
    }

    Ok(config)
}

/// Loads a config file, or the first default location that exists.
/// Falls back to defaults when no file is found.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => match DEFAULT_LOCATIONS.iter().map(Path::new).find(|p| p.exists()) {
            Some(p) => p.to_path_buf(),
            None => return Ok(Config::default()),
        },
    };

    if !path.exists() {
        bail!("Config file not found: {}", path.display());
    }

    let content = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;

    let config: Config = match path.extension().and_then(|s| s.to_str()) {
        Some("json") => serde_json::from_str(&content)
            .with_context(|| format!("Invalid JSON in {}", path.display()))?,
        Some("toml") => toml::from_str(&content)
            .with_context(|| format!("Invalid TOML in {}", path.display()))?,
        // Default to YAML
        _ => serde_yaml::from_str(&content)
            .with_context(|| format!("Invalid YAML in {}", path.display()))?,
    };
    info!("Loaded configuration from: {}", path.display());
    Ok(config.merged_over_defaults())
}

impl Config {
    /// Fills fields the file left out with their defaults.
    fn merged_over_defaults(self) -> Config {
        let d = Config::default();
        Config {
            port: self.port.or(d.port),
            bind: self.bind.or(d.bind),
            metrics_path: self.metrics_path.or(d.metrics_path),
            group_type: self.group_type.or(d.group_type),
            normalize: self.normalize.or(d.normalize),
            exclude: self.exclude.or(d.exclude),
            collect_stat: self.collect_stat.or(d.collect_stat),
            collect_io: self.collect_io.or(d.collect_io),
            cgroup_root: self.cgroup_root.or(d.cgroup_root),
            proc_root: self.proc_root.or(d.proc_root),
            max_concurrency: self.max_concurrency.or(d.max_concurrency),
            evict_stale_groups: self.evict_stale_groups.or(d.evict_stale_groups),
            enable_health: self.enable_health.or(d.enable_health),
            enable_telemetry: self.enable_telemetry.or(d.enable_telemetry),
            enable_tls: self.enable_tls.or(d.enable_tls),
            tls_cert_path: self.tls_cert_path.or(d.tls_cert_path),
            tls_key_path: self.tls_key_path.or(d.tls_key_path),
        }
    }
}

/// Renders configuration in the requested format.
pub fn render_config(config: &Config, format: ConfigFormat) -> anyhow::Result<String> {
    Ok(match format {
        ConfigFormat::Json => serde_json::to_string_pretty(config)?,
        ConfigFormat::Toml => toml::to_string_pretty(config)?,
        ConfigFormat::Yaml => serde_yaml::to_string(config)?,
    })
}

/// Shows configuration in requested format
pub fn show_config(config: &Config, format: ConfigFormat) -> anyhow::Result<()> {
    println!("{}", render_config(config, format)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use tempfile::tempdir;

    fn stat_enabled() -> Config {
        Config {
            collect_stat: Some(true),
            ..Config::default()
        }
    }

    #[test]
    fn test_defaults_require_a_metric_kind() {
        let cfg = Config::default();
        assert!(matches!(
            cfg.enabled_metrics(),
            Err(ConfigError::NoMetricsEnabled)
        ));
        assert!(validate_effective_config(&cfg).is_err());
        assert!(validate_effective_config(&stat_enabled()).is_ok());
    }

    #[test]
    fn test_enabled_metrics() {
        let cfg = Config {
            collect_stat: Some(true),
            collect_io: Some(true),
            ..Config::default()
        };
        let enabled = cfg.enabled_metrics().unwrap();
        assert_eq!(
            enabled.into_iter().collect::<Vec<_>>(),
            vec![MetricKind::Stat, MetricKind::Io]
        );
    }

    #[test]
    fn test_bad_normalize_pattern_fails_validation() {
        let cfg = Config {
            normalize: Some("^/app/.+$".to_string()),
            ..stat_enabled()
        };
        let err = validate_effective_config(&cfg).unwrap_err();
        assert!(err.to_string().contains("should be 1"));
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let cfg = Config {
            max_concurrency: Some(0),
            ..stat_enabled()
        };
        assert!(matches!(
            cfg.collector_options(),
            Err(ConfigError::InvalidConcurrency)
        ));
    }

    #[test]
    fn test_metrics_path_validation() {
        let cfg = Config {
            metrics_path: Some("metrics".to_string()),
            ..stat_enabled()
        };
        assert!(validate_effective_config(&cfg).is_err());
    }

    #[test]
    fn test_tls_requires_both_paths() {
        let cfg = Config {
            enable_tls: Some(true),
            tls_cert_path: Some("/nonexistent/cert.pem".to_string()),
            ..stat_enabled()
        };
        let err = validate_effective_config(&cfg).unwrap_err();
        assert!(err.to_string().contains("tls_key_path"));
    }

    #[test]
    fn test_load_yaml_with_aliases() {
        let dir = tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("config.yaml");
        fs::write(
            &path,
            "group-type: name\ngroup-normalize: \"^(.+)d$\"\ncollector-io: true\nport: 9999\n",
        )
        .expect("Failed to write config");

        let cfg = load_config(Some(&path)).expect("Failed to load config");
        assert_eq!(cfg.group_type, Some(GroupType::Name));
        assert_eq!(cfg.normalize.as_deref(), Some("^(.+)d$"));
        assert_eq!(cfg.collect_io, Some(true));
        assert_eq!(cfg.port, Some(9999));
        // Unset fields fall back to defaults
        assert_eq!(cfg.metrics_path.as_deref(), Some(DEFAULT_METRICS_PATH));
        assert_eq!(cfg.evict_stale_groups, Some(true));
    }

    #[test]
    fn test_load_toml_and_json() {
        let dir = tempdir().expect("Failed to create temp dir");

        let toml_path = dir.path().join("config.toml");
        fs::write(&toml_path, "group_type = \"cgroup\"\nmax_concurrency = 4\n")
            .expect("Failed to write config");
        let cfg = load_config(Some(&toml_path)).expect("Failed to load config");
        assert_eq!(cfg.max_concurrency, Some(4));

        let json_path = dir.path().join("config.json");
        fs::write(&json_path, r#"{"collect_stat": true, "exclude": "^/init"}"#)
            .expect("Failed to write config");
        let cfg = load_config(Some(&json_path)).expect("Failed to load config");
        assert_eq!(cfg.collect_stat, Some(true));
        assert_eq!(cfg.exclude.as_deref(), Some("^/init"));
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        assert!(load_config(Some(Path::new("/nonexistent/config.yaml"))).is_err());
    }

    #[test]
    fn test_cli_overrides_file() {
        let dir = tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("config.yaml");
        fs::write(&path, "group_type: cgroup\nport: 1000\nmax_concurrency: 16\n")
            .expect("Failed to write config");

        let args = Args::try_parse_from([
            "grouped-process-exporter",
            "--config",
            path.to_str().unwrap(),
            "--group-type",
            "name",
            "--port",
            "2000",
            "--collector-stat",
        ])
        .expect("Failed to parse args");

        let cfg = resolve_config(&args).expect("Failed to resolve config");
        assert_eq!(cfg.group_type, Some(GroupType::Name));
        assert_eq!(cfg.port, Some(2000));
        assert_eq!(cfg.max_concurrency, Some(16));
        assert_eq!(cfg.collect_stat, Some(true));
    }

    #[test]
    fn test_render_all_formats() {
        let cfg = stat_enabled();
        for format in [ConfigFormat::Yaml, ConfigFormat::Json, ConfigFormat::Toml] {
            let out = render_config(&cfg, format).expect("Failed to render config");
            assert!(out.contains("group_type"));
            assert!(out.contains("cgroup"));
        }
    }
}
