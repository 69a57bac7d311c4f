//! recon-agent: a streaming reconnaissance pipeline orchestrator.
//!
//! Given a target domain and a scan identifier, the pipeline enumerates
//! subdomains, probes liveness, discovers and probes URL endpoints, and
//! runs port/TLS/directory analysis on alive hosts, streaming every
//! finding to an external ingestion backend while the scan runs and
//! persisting per-stage artifacts on disk so later stages can resume from
//! earlier ones.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use recon_agent::fingerprint;
//! use recon_agent::pipeline::{run_pipeline, ScanContext, ScanRequest, ToolPaths};
//! use recon_agent::registry::ScanRegistry;
//!
//! # async fn example() {
//! let registry = Arc::new(ScanRegistry::new());
//! let ctx = Arc::new(ScanContext {
//!     engine: fingerprint::init_engine(None),
//!     resolver: recon_agent::probe::init_resolver(std::time::Duration::from_secs(5)),
//!     data_dir: "data".into(),
//!     tools: ToolPaths::default(),
//!     inject_root_urls: true,
//!     domain_fingerprint: false,
//! });
//! let req = ScanRequest {
//!     scan_id: 1,
//!     target: "example.com".into(),
//!     user_id: 7,
//!     backend_base: "http://127.0.0.1:8000".into(),
//!     auth_header: String::new(),
//! };
//! let token = registry.register(req.scan_id).unwrap();
//! run_pipeline(req, ctx, registry, token).await;
//! # }
//! ```

pub mod config;
pub mod discovery;
pub mod endpoints;
pub mod error;
pub mod fingerprint;
pub mod ingest;
pub mod logging;
pub mod models;
pub mod network;
pub mod pipeline;
pub mod probe;
pub mod rate_limiter;
pub mod registry;
pub mod server;
pub mod storage;
pub mod tools;

pub use error::{PipelineError, ToolError};
pub use models::{
    DirectoryFinding, EndpointResult, LogLevel, PortFinding, ScanStatus, SubdomainResult,
    TlsReport,
};
pub use pipeline::{ScanContext, ScanRequest};
pub use registry::ScanRegistry;
