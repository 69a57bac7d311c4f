//! Command-line options, tuning constants and environment overrides.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};

// Liveness probing
pub const PROBE_WORKERS: usize = 10;
pub const DNS_TIMEOUT: Duration = Duration::from_secs(5);
pub const HTTP_PROBE_TIMEOUT: Duration = Duration::from_secs(10);
pub const HTTPX_PROBE_TIMEOUT_SECS: u64 = 5;

// Subdomain enumeration
pub const SUBFINDER_TIMEOUT: Duration = Duration::from_secs(120);

// URL discovery
pub const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(60);
pub const KATANA_MAX_PAGES: usize = 50;

// Endpoint probing
pub const ENDPOINT_TIMEOUT: Duration = Duration::from_secs(7);
pub const USER_AGENT: &str = "RevulneraRecon/1.0";
pub const ACCEPT_HEADER: &str = "text/html,application/json;q=0.9,*/*;q=0.8";
/// How much of a response body is read for title extraction and tagging.
pub const BODY_SNIPPET_BYTES: usize = 4096;
pub const HEADER_VALUE_MAX_BYTES: usize = 180;

// Network analysis
pub const NETWORK_WORKERS: usize = 10;
pub const TOP_PORTS: usize = 200;
pub const NMAP_TIMEOUT: Duration = Duration::from_secs(6 * 60);
pub const TLS_DIAL_TIMEOUT: Duration = Duration::from_secs(5);
pub const DIRECTORY_TIMEOUT: Duration = Duration::from_secs(5);

// Ingestion
pub const INGEST_TIMEOUT: Duration = Duration::from_secs(10);
pub const INGEST_CHUNK_SIZE: usize = 50;

#[derive(Clone, Debug, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for log::LevelFilter {
    fn from(l: LogLevel) -> Self {
        match l {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

#[derive(Clone, Debug, ValueEnum)]
pub enum LogFormat {
    Plain,
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "recon-agent",
    about = "Streaming reconnaissance pipeline orchestrator."
)]
pub struct Opt {
    /// Listen address for the control surface (RECON_HTTP_ADDR overrides)
    #[arg(long, default_value = "0.0.0.0:8080")]
    pub listen: String,

    /// Directory for per-scan result artifacts
    #[arg(long, value_parser, default_value = "data")]
    pub data_dir: PathBuf,

    /// Technology signature file (JSON); built-in catalog when absent
    #[arg(long, value_parser)]
    pub signatures: Option<PathBuf>,

    /// Run the coarse per-host fingerprint pass during liveness probing
    #[arg(long)]
    pub enable_domain_fingerprint: bool,

    /// Do not inject root URLs when gau/katana discover nothing
    #[arg(long)]
    pub no_root_fallback: bool,

    /// Log level: error|warn|info|debug|trace
    #[arg(long, value_enum, default_value_t = LogLevel::Info)]
    pub log_level: LogLevel,

    /// Log format: plain|json
    #[arg(long, value_enum, default_value_t = LogFormat::Plain)]
    pub log_format: LogFormat,

    /// Override path to subfinder
    #[arg(long, default_value = "subfinder")]
    pub subfinder_bin: String,

    /// Override path to gau
    #[arg(long, default_value = "gau")]
    pub gau_bin: String,

    /// Override path to katana
    #[arg(long, default_value = "katana")]
    pub katana_bin: String,

    /// Override path to httpx
    #[arg(long, default_value = "httpx")]
    pub httpx_bin: String,

    /// Override path to nmap
    #[arg(long, default_value = "nmap")]
    pub nmap_bin: String,
}

/// Reads a positive integer from the environment, falling back to `default`
/// when the variable is unset, unparseable or not positive.
pub fn env_usize_or(key: &str, default: usize) -> usize {
    match std::env::var(key) {
        Ok(v) => match v.parse::<usize>() {
            Ok(n) if n > 0 => n,
            _ => default,
        },
        Err(_) => default,
    }
}

/// Per-scan worker/depth/rate tuning, resolved from the environment at scan
/// start so operators can adjust without restarting the agent.
#[derive(Debug, Clone, Copy)]
pub struct StageTuning {
    pub discovery_workers: usize,
    pub katana_depth: usize,
    pub max_urls_per_host: usize,
    pub endpoint_workers: usize,
    pub endpoint_rps: usize,
}

impl StageTuning {
    pub fn from_env() -> Self {
        StageTuning {
            discovery_workers: env_usize_or("ENDPOINT_DISCOVERY_WORKERS", 5),
            katana_depth: env_usize_or("KATANA_DEPTH", 2),
            max_urls_per_host: env_usize_or("MAX_URLS_PER_HOST", 500),
            endpoint_workers: env_usize_or("ENDPOINT_WORKERS", 20),
            endpoint_rps: env_usize_or("ENDPOINT_RPS", 10),
        }
    }
}
