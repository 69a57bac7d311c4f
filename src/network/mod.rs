//! Network analysis over alive hosts: port scanning, TLS posture and
//! sensitive-path probing, fanned out over a bounded worker pool. Findings
//! are posted directly from the workers: port and directory findings in
//! chunks, TLS reports one per host.

pub mod dirs;
pub mod ports;
pub mod tls;

use std::sync::Arc;

use futures::stream::FuturesUnordered;
use futures::StreamExt;
use log::{debug, info, warn};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::config::{NETWORK_WORKERS, TOP_PORTS};
use crate::ingest::IngestClient;

#[derive(Debug, Clone)]
pub struct NetworkOptions {
    pub workers: usize,
    pub top_ports: usize,
    pub nmap_bin: String,
}

impl Default for NetworkOptions {
    fn default() -> Self {
        NetworkOptions {
            workers: NETWORK_WORKERS,
            top_ports: TOP_PORTS,
            nmap_bin: "nmap".to_string(),
        }
    }
}

/// Analyzes every host with a bounded pool. Cancellation stops job
/// distribution and is observed at each worker's loop head; in-flight nmap
/// children are killed through the token.
pub async fn run_network_analysis(
    hosts: &[String],
    opts: &NetworkOptions,
    ingest: Arc<IngestClient>,
    cancel: &CancellationToken,
) {
    info!("analyzing {} hosts", hosts.len());
    let semaphore = Arc::new(Semaphore::new(opts.workers.max(1)));
    let mut tasks = FuturesUnordered::new();

    for host in hosts {
        let permit = tokio::select! {
            permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
            _ = cancel.cancelled() => {
                debug!("network analysis cancelled, stopping job distribution");
                break;
            }
        };

        let host = host.clone();
        let opts = opts.clone();
        let ingest = Arc::clone(&ingest);
        let cancel = cancel.clone();
        tasks.push(tokio::spawn(async move {
            let _permit = permit;
            if cancel.is_cancelled() {
                return;
            }
            analyze_host(&host, &opts, &ingest, &cancel).await;
        }));
    }

    while let Some(joined) = tasks.next().await {
        if let Err(e) = joined {
            warn!("network worker panicked: {e:?}");
        }
    }
}

async fn analyze_host(
    host: &str,
    opts: &NetworkOptions,
    ingest: &IngestClient,
    cancel: &CancellationToken,
) {
    debug!("analyzing host {host}");

    match ports::scan_host_ports(&opts.nmap_bin, host, opts.top_ports, cancel).await {
        Ok(findings) if !findings.is_empty() => {
            info!("found {} open ports on {host}", findings.len());
            ingest.post_port_findings(&findings).await;
        }
        Ok(_) => {}
        Err(e) if e.is_missing() => debug!("nmap not installed, skipping port scan for {host}"),
        Err(e) => warn!("port scan failed for {host}: {e}"),
    }

    if cancel.is_cancelled() {
        return;
    }

    let tls_report = tls::check_tls(host).await;
    if tls_report.has_https || !tls_report.issues.is_empty() {
        debug!(
            "tls for {host}: https={} issues={}",
            tls_report.has_https,
            tls_report.issues.len()
        );
        ingest.post_tls(&tls_report).await;
    }

    if cancel.is_cancelled() {
        return;
    }

    let dir_findings = dirs::check_directories(host, tls_report.has_https).await;
    if !dir_findings.is_empty() {
        info!("found {} directory issues on {host}", dir_findings.len());
        ingest.post_dir_findings(&dir_findings).await;
    }
}
