//! Scan pipeline orchestration.
//!
//! Stage order: subdomain enumeration + liveness → endpoint discovery +
//! probing → network analysis. Stages run strictly in sequence; each one
//! streams its items into a bounded channel that the orchestrator drains,
//! POSTing every item to the ingestion backend before accepting the next,
//! so a slow backend backpressures the producing workers.
//!
//! Cancellation is checked before every stage, at every worker loop head
//! inside the stages, and inside tool invocations. Once cancellation has
//! been observed the scan terminates as CANCELLED; late errors never
//! demote that to FAILED.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use hickory_resolver::TokioAsyncResolver;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::{self, Opt, StageTuning};
use crate::discovery::{self, DiscoveryOptions};
use crate::endpoints::{self, EndpointProbeOptions};
use crate::error::{PipelineError, ToolError};
use crate::fingerprint::FingerprintEngine;
use crate::ingest::IngestClient;
use crate::models::{EndpointResult, LogLevel, ScanStatus, SubdomainResult};
use crate::network::{self, NetworkOptions};
use crate::probe::{self, ProbeOptions};
use crate::registry::ScanRegistry;
use crate::storage;
use crate::tools::subfinder;

/// Control request that starts a scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanRequest {
    pub scan_id: i64,
    pub target: String,
    #[serde(default)]
    pub user_id: i64,
    pub backend_base: String,
    #[serde(default)]
    pub auth_header: String,
}

/// Overridable binary paths for the wrapped tools.
#[derive(Debug, Clone)]
pub struct ToolPaths {
    pub subfinder: String,
    pub gau: String,
    pub katana: String,
    pub httpx: String,
    pub nmap: String,
}

impl Default for ToolPaths {
    fn default() -> Self {
        ToolPaths {
            subfinder: "subfinder".to_string(),
            gau: "gau".to_string(),
            katana: "katana".to_string(),
            httpx: "httpx".to_string(),
            nmap: "nmap".to_string(),
        }
    }
}

/// Shared services injected into every scan. Constructed once at startup;
/// nothing in here mutates afterwards.
pub struct ScanContext {
    pub engine: Arc<FingerprintEngine>,
    pub resolver: Arc<TokioAsyncResolver>,
    pub data_dir: PathBuf,
    pub tools: ToolPaths,
    pub inject_root_urls: bool,
    pub domain_fingerprint: bool,
}

impl ScanContext {
    pub fn from_opt(opt: &Opt, engine: Arc<FingerprintEngine>) -> Self {
        ScanContext {
            engine,
            resolver: probe::init_resolver(config::DNS_TIMEOUT),
            data_dir: opt.data_dir.clone(),
            tools: ToolPaths {
                subfinder: opt.subfinder_bin.clone(),
                gau: opt.gau_bin.clone(),
                katana: opt.katana_bin.clone(),
                httpx: opt.httpx_bin.clone(),
                nmap: opt.nmap_bin.clone(),
            },
            inject_root_urls: !opt.no_root_fallback,
            domain_fingerprint: opt.enable_domain_fingerprint,
        }
    }
}

/// Destination for human-readable progress lines. The backend variant is
/// used by streaming scans; resume operations run without one.
pub enum ScanLogger {
    Backend(Arc<IngestClient>),
    Null,
}

impl ScanLogger {
    pub async fn log(&self, message: &str, level: LogLevel) {
        match self {
            ScanLogger::Backend(client) => client.post_log(message, level).await,
            ScanLogger::Null => {}
        }
    }
}

fn check_cancelled(cancel: &CancellationToken) -> Result<(), PipelineError> {
    if cancel.is_cancelled() {
        return Err(PipelineError::Cancelled);
    }
    Ok(())
}

/// Runs a full scan to a terminal state. The cancel handle must already be
/// registered; it is deregistered here before the terminal status goes out.
pub async fn run_pipeline(
    req: ScanRequest,
    ctx: Arc<ScanContext>,
    registry: Arc<ScanRegistry>,
    cancel: CancellationToken,
) {
    let ingest = match IngestClient::new(&req.backend_base, req.scan_id, &req.auth_header) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            warn!("scan {}: could not build ingest client: {e}", req.scan_id);
            registry.remove(req.scan_id);
            return;
        }
    };

    let outcome = run_stages(&req, &ctx, &ingest, &cancel).await;

    // The registry entry must be gone before any terminal status is
    // visible to the backend.
    registry.remove(req.scan_id);

    match outcome {
        Ok(()) => {
            ingest.post_status(ScanStatus::Completed, None).await;
            ingest
                .post_log("Scan completed successfully", LogLevel::Success)
                .await;
            info!("scan {} completed", req.scan_id);
        }
        Err(PipelineError::Cancelled) => {
            ingest
                .post_status(ScanStatus::Cancelled, Some("Scan cancelled by user"))
                .await;
            ingest
                .post_log("Scan cancelled by user", LogLevel::Warning)
                .await;
            info!("scan {} cancelled", req.scan_id);
        }
        Err(PipelineError::Failed(e)) => {
            let msg = format!("{e:#}");
            ingest.post_status(ScanStatus::Failed, Some(&msg)).await;
            ingest
                .post_log(&format!("Scan failed: {msg}"), LogLevel::Error)
                .await;
            warn!("scan {} failed: {msg}", req.scan_id);
        }
    }
}

async fn run_stages(
    req: &ScanRequest,
    ctx: &Arc<ScanContext>,
    ingest: &Arc<IngestClient>,
    cancel: &CancellationToken,
) -> Result<(), PipelineError> {
    ingest.post_status(ScanStatus::Running, None).await;
    let logger = ScanLogger::Backend(Arc::clone(ingest));
    let tuning = StageTuning::from_env();

    // 1) Subdomains, streamed item by item.
    check_cancelled(cancel)?;
    info!("scan {}: starting subdomain discovery", req.scan_id);
    logger
        .log(
            &format!("Starting subdomain enumeration for {}...", req.target),
            LogLevel::Info,
        )
        .await;

    let (tx, mut rx) = mpsc::channel::<SubdomainResult>(1);
    let producer = handle_job(ctx, req.scan_id, &req.target, None, &logger, tx, cancel);
    let consumer = async {
        while let Some(item) = rx.recv().await {
            ingest.post_subdomain(&item).await;
            log::debug!("streamed subdomain {} (alive={})", item.name, item.alive);
        }
    };
    let (subs, ()) = tokio::join!(producer, consumer);
    let subs = subs?;

    let alive: Vec<String> = subs
        .iter()
        .filter(|s| s.alive)
        .map(|s| s.name.clone())
        .collect();
    logger
        .log(
            &format!(
                "Subdomain enumeration complete: found {} subdomains ({} alive)",
                subs.len(),
                alive.len()
            ),
            LogLevel::Success,
        )
        .await;

    // 2) Endpoints, streamed item by item.
    check_cancelled(cancel)?;
    info!("scan {}: starting endpoint discovery", req.scan_id);
    logger
        .log(
            "Starting endpoint discovery (gau + katana)...",
            LogLevel::Info,
        )
        .await;

    let (tx, mut rx) = mpsc::channel::<EndpointResult>(1);
    let producer = discover_endpoints(ctx, &tuning, req.scan_id, &req.target, &logger, tx, cancel);
    let consumer = async {
        while let Some(item) = rx.recv().await {
            ingest.post_endpoint(&item).await;
            log::debug!("streamed endpoint {} (status={})", item.url, item.status_code);
        }
    };
    let (eps, ()) = tokio::join!(producer, consumer);
    let eps = eps?;
    info!("scan {}: endpoint discovery complete, {} endpoints", req.scan_id, eps.len());

    // 3) Network analysis over alive hosts.
    check_cancelled(cancel)?;
    if alive.is_empty() {
        info!("scan {}: no alive hosts, skipping network analysis", req.scan_id);
        logger
            .log(
                "No alive hosts found, skipping network analysis",
                LogLevel::Warning,
            )
            .await;
        return Ok(());
    }

    logger
        .log(
            &format!("Starting network analysis for {} hosts...", alive.len()),
            LogLevel::Info,
        )
        .await;
    let net_opts = NetworkOptions {
        nmap_bin: ctx.tools.nmap.clone(),
        ..NetworkOptions::default()
    };
    network::run_network_analysis(&alive, &net_opts, Arc::clone(ingest), cancel).await;
    check_cancelled(cancel)?;
    logger
        .log(
            &format!("Network analysis complete for {} hosts", alive.len()),
            LogLevel::Success,
        )
        .await;

    Ok(())
}

/// Subdomain stage: enumerate, probe liveness with streaming, persist the
/// artifact. Also serves the `/jobs` resume operation directly.
///
/// A missing or failing subfinder degrades to an empty enumeration; the
/// scan itself never fails because a tool is absent.
pub async fn handle_job(
    ctx: &ScanContext,
    scan_id: i64,
    target: &str,
    workers: Option<usize>,
    logger: &ScanLogger,
    tx: mpsc::Sender<SubdomainResult>,
    cancel: &CancellationToken,
) -> Result<Vec<SubdomainResult>, PipelineError> {
    let names = match subfinder::enumerate(
        &ctx.tools.subfinder,
        target,
        config::SUBFINDER_TIMEOUT,
        cancel,
    )
    .await
    {
        Ok(names) => names,
        Err(ToolError::Cancelled { .. }) => return Err(PipelineError::Cancelled),
        Err(e) if e.is_missing() => {
            warn!("subfinder not installed, continuing with empty enumeration");
            logger
                .log(
                    "subfinder not installed, no subdomains enumerated",
                    LogLevel::Warning,
                )
                .await;
            Vec::new()
        }
        Err(e) => {
            warn!("subfinder error for {target}: {e}");
            logger
                .log(
                    &format!("Subdomain enumeration error: {e}"),
                    LogLevel::Warning,
                )
                .await;
            Vec::new()
        }
    };
    info!("found {} subdomains for {target}, probing liveness", names.len());

    let opts = ProbeOptions {
        workers: workers.unwrap_or(config::PROBE_WORKERS),
        httpx_bin: ctx.tools.httpx.clone(),
        domain_fingerprint: ctx.domain_fingerprint,
        ..ProbeOptions::default()
    };
    let results = probe::probe_hosts(names, &opts, Arc::clone(&ctx.resolver), tx, cancel)
        .await
        .context("probing subdomains")?;

    if let Err(e) = storage::save_subdomains(&ctx.data_dir, scan_id, target, &results).await {
        warn!("failed to save subdomain artifact for scan {scan_id}: {e:#}");
    }

    let alive = results.iter().filter(|r| r.alive).count();
    info!("probing complete: {alive} alive out of {} subdomains", results.len());
    Ok(results)
}

/// Endpoint stage: load the subdomain artifact, discover URLs over alive
/// hosts, probe them with streaming, persist the artifact. Also serves the
/// `/endpoints` resume operation.
///
/// Failing to load the artifact is a stage error: without it the stage
/// cannot produce any output.
pub async fn discover_endpoints(
    ctx: &ScanContext,
    tuning: &StageTuning,
    scan_id: i64,
    target: &str,
    logger: &ScanLogger,
    tx: mpsc::Sender<EndpointResult>,
    cancel: &CancellationToken,
) -> Result<Vec<EndpointResult>, PipelineError> {
    let subs = storage::load_subdomains(&ctx.data_dir, scan_id, target)
        .await
        .context("load subdomains")?;
    info!("loaded {} subdomains for endpoint discovery", subs.len());

    let alive: Vec<String> = subs
        .iter()
        .filter(|s| s.alive)
        .map(|s| s.name.clone())
        .collect();
    if alive.is_empty() {
        info!("no alive hosts, skipping endpoint discovery");
        return Ok(Vec::new());
    }

    check_cancelled(cancel)?;

    let disc_opts = DiscoveryOptions {
        workers: tuning.discovery_workers,
        katana_depth: tuning.katana_depth,
        max_urls_per_host: tuning.max_urls_per_host,
        gau_bin: ctx.tools.gau.clone(),
        katana_bin: ctx.tools.katana.clone(),
        ..DiscoveryOptions::default()
    };
    let mut urls = discovery::discover_urls(&alive, &disc_opts, cancel).await;

    if urls.is_empty() {
        if ctx.inject_root_urls {
            info!("no urls discovered, falling back to root paths");
            logger
                .log(
                    "No URLs discovered from gau/katana, using basic paths",
                    LogLevel::Warning,
                )
                .await;
            for host in &alive {
                urls.push(format!("https://{host}/"));
                urls.push(format!("http://{host}/"));
            }
        } else {
            info!("no urls discovered and root fallback disabled");
            return Ok(Vec::new());
        }
    } else {
        logger
            .log(
                &format!("Discovered {} unique URLs from gau/katana", urls.len()),
                LogLevel::Info,
            )
            .await;
    }

    check_cancelled(cancel)?;
    logger
        .log(
            &format!("Starting probing of {} URLs...", urls.len()),
            LogLevel::Info,
        )
        .await;

    let probe_opts = EndpointProbeOptions {
        workers: tuning.endpoint_workers,
        rps: tuning.endpoint_rps,
        use_httpx: true,
        httpx_bin: ctx.tools.httpx.clone(),
    };
    let results = endpoints::probe_urls(&urls, &probe_opts, Arc::clone(&ctx.engine), tx, cancel)
        .await
        .context("probing endpoints")?;

    logger
        .log(
            &format!(
                "Probing complete: {}/{} endpoints responding",
                results.len(),
                urls.len()
            ),
            LogLevel::Success,
        )
        .await;

    if let Err(e) = storage::save_endpoints(&ctx.data_dir, scan_id, target, &results).await {
        warn!("failed to save endpoint artifact for scan {scan_id}: {e:#}");
    }

    Ok(results)
}
