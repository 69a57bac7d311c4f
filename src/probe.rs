//! Host liveness probing.
//!
//! For each candidate subdomain: resolve every A/AAAA record under a DNS
//! deadline, then establish HTTP(S) reachability, via `httpx` when it is
//! enabled and installed, otherwise with a redirect-suppressing native
//! client trying `https://` then `http://`. Any response at all, including
//! 4xx/5xx, counts as alive.
//!
//! Results stream out over a bounded channel as each host finishes, in
//! whatever order the workers complete.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use futures::stream::FuturesUnordered;
use futures::StreamExt;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::TokioAsyncResolver;
use log::{debug, warn};
use tokio::sync::mpsc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::config;
use crate::fingerprint::heuristics::fingerprint_domain;
use crate::models::SubdomainResult;
use crate::tools::httpx;

#[derive(Debug, Clone)]
pub struct ProbeOptions {
    pub workers: usize,
    pub http_timeout: Duration,
    pub dns_timeout: Duration,
    pub use_httpx: bool,
    pub httpx_bin: String,
    pub httpx_timeout_secs: u64,
    /// Coarse per-host fingerprint tags, logged when the native path runs.
    pub domain_fingerprint: bool,
}

impl Default for ProbeOptions {
    fn default() -> Self {
        ProbeOptions {
            workers: config::PROBE_WORKERS,
            http_timeout: config::HTTP_PROBE_TIMEOUT,
            dns_timeout: config::DNS_TIMEOUT,
            use_httpx: true,
            httpx_bin: "httpx".to_string(),
            httpx_timeout_secs: config::HTTPX_PROBE_TIMEOUT_SECS,
            domain_fingerprint: false,
        }
    }
}

/// Builds the shared DNS resolver with aggressive timeouts so a dead
/// nameserver cannot stall the probe pool.
pub fn init_resolver(dns_timeout: Duration) -> Arc<TokioAsyncResolver> {
    let mut opts = ResolverOpts::default();
    opts.timeout = dns_timeout;
    opts.attempts = 2;
    Arc::new(TokioAsyncResolver::tokio(ResolverConfig::default(), opts))
}

/// Builds the redirect-suppressing probe client. TLS verification is
/// disabled: reachability is the question, not trust.
pub fn probe_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .redirect(reqwest::redirect::Policy::none())
        .danger_accept_invalid_certs(true)
        .user_agent(config::USER_AGENT)
        .build()
        .context("building probe client")
}

/// Probes all hosts with a bounded worker pool, emitting each result on `tx`
/// the moment its worker finishes. Returns every result once the pool has
/// drained. No ordering is guaranteed across workers.
pub async fn probe_hosts(
    hosts: Vec<String>,
    opts: &ProbeOptions,
    resolver: Arc<TokioAsyncResolver>,
    tx: mpsc::Sender<SubdomainResult>,
    cancel: &CancellationToken,
) -> Result<Vec<SubdomainResult>> {
    if hosts.is_empty() {
        return Ok(Vec::new());
    }

    let client = Arc::new(probe_client(opts.http_timeout)?);
    let semaphore = Arc::new(Semaphore::new(opts.workers.max(1)));
    let mut tasks = FuturesUnordered::new();

    for host in hosts {
        // Stop feeding the pool once the scan is cancelled; already-running
        // workers finish their current host.
        let permit = tokio::select! {
            permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
            _ = cancel.cancelled() => break,
        };

        let opts = opts.clone();
        let resolver = Arc::clone(&resolver);
        let client = Arc::clone(&client);
        let tx = tx.clone();
        let cancel = cancel.clone();
        tasks.push(tokio::spawn(async move {
            let _permit = permit;
            if cancel.is_cancelled() {
                return None;
            }
            let result = check_host(&host, &opts, &resolver, &client, &cancel).await;
            // A full channel is intentional backpressure from the drain side.
            let _ = tx.send(result.clone()).await;
            Some(result)
        }));
    }
    drop(tx);

    let mut results = Vec::new();
    while let Some(joined) = tasks.next().await {
        match joined {
            Ok(Some(result)) => results.push(result),
            Ok(None) => {}
            Err(e) => warn!("probe worker panicked: {e:?}"),
        }
    }
    Ok(results)
}

/// Probes one host: DNS first, then httpx, then the native client.
pub async fn check_host(
    host: &str,
    opts: &ProbeOptions,
    resolver: &TokioAsyncResolver,
    client: &reqwest::Client,
    cancel: &CancellationToken,
) -> SubdomainResult {
    let host = host.trim();
    let mut result = SubdomainResult {
        name: host.to_string(),
        ip: String::new(),
        ips: Vec::new(),
        alive: false,
        error_msg: String::new(),
    };

    match resolve_all_ips(resolver, host, opts.dns_timeout).await {
        Ok(ips) if ips.is_empty() => {
            result.error_msg = "No IPs resolved".to_string();
            return result;
        }
        Ok(ips) => {
            result.ip = ips[0].clone();
            result.ips = ips;
        }
        Err(e) => {
            result.error_msg = format!("DNS resolution failed: {e}");
            return result;
        }
    }

    if opts.use_httpx {
        match httpx::is_alive(&opts.httpx_bin, host, opts.httpx_timeout_secs, cancel).await {
            Ok(true) => {
                result.alive = true;
                return result;
            }
            Ok(false) => {}
            Err(e) if e.is_missing() => {
                debug!("httpx not installed, using native probe for {host}");
            }
            Err(e) => {
                result.error_msg = format!("httpx check failed: {e}");
            }
        }
    }

    let (alive, err) = check_native(client, host, opts.domain_fingerprint).await;
    result.alive = alive;
    if !alive {
        if let Some(err) = err {
            if !result.error_msg.is_empty() {
                result.error_msg.push_str("; ");
            }
            result.error_msg.push_str(&format!("HTTP check failed: {err}"));
        }
    }
    result
}

/// Resolves all addresses for a host, deduplicated, IPv4 and IPv6 alike.
async fn resolve_all_ips(
    resolver: &TokioAsyncResolver,
    host: &str,
    deadline: Duration,
) -> Result<Vec<String>, String> {
    let lookup = tokio::time::timeout(deadline, resolver.lookup_ip(host))
        .await
        .map_err(|_| format!("lookup timed out after {}s", deadline.as_secs()))?
        .map_err(|e| e.to_string())?;

    let mut seen = HashSet::new();
    let mut ips = Vec::new();
    for addr in lookup.iter() {
        let ip = addr.to_string();
        if seen.insert(ip.clone()) {
            ips.push(ip);
        }
    }
    Ok(ips)
}

/// Tries `https://<host>/` then `http://<host>/` without following
/// redirects. Any status code means the host is alive.
async fn check_native(
    client: &reqwest::Client,
    host: &str,
    domain_fingerprint: bool,
) -> (bool, Option<String>) {
    let mut last_err = None;
    for scheme in ["https", "http"] {
        let url = format!("{scheme}://{host}/");
        match client.get(&url).send().await {
            Ok(resp) => {
                if domain_fingerprint {
                    log_domain_tags(host, resp).await;
                }
                return (true, None);
            }
            Err(e) => last_err = Some(e.to_string()),
        }
    }
    (false, last_err)
}

/// Coarse technology tags for a host, emitted to the local log only.
/// Off by default; the tags are not part of any wire payload.
async fn log_domain_tags(host: &str, resp: reqwest::Response) {
    let headers: std::collections::HashMap<String, String> = resp
        .headers()
        .iter()
        .map(|(k, v)| {
            (
                k.as_str().to_string(),
                v.to_str().unwrap_or_default().to_string(),
            )
        })
        .collect();
    let body = resp.text().await.unwrap_or_default();
    let tags = fingerprint_domain(&headers, &body);
    if !tags.tags.is_empty() {
        log::info!("domain fingerprint for {host}: {}", tags.tags.join(", "));
    }
}
