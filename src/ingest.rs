//! Ingestion backend client.
//!
//! At-least-once POST delivery of status transitions, log lines and
//! per-item findings. Every failure here is logged and swallowed: the
//! pipeline never aborts because the backend is unreachable.

use anyhow::Result;
use chrono::Utc;
use log::{debug, warn};
use serde::Serialize;
use serde_json::json;

use crate::config::{INGEST_CHUNK_SIZE, INGEST_TIMEOUT};
use crate::models::{
    DirectoryFinding, EndpointResult, LogLevel, PortFinding, ScanStatus, SubdomainResult,
    TlsReport,
};

pub struct IngestClient {
    http: reqwest::Client,
    base: String,
    scan_id: i64,
    auth_header: String,
}

impl IngestClient {
    pub fn new(backend_base: &str, scan_id: i64, auth_header: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(INGEST_TIMEOUT)
            .build()?;
        Ok(IngestClient {
            http,
            base: backend_base.trim_end_matches('/').to_string(),
            scan_id,
            auth_header: auth_header.to_string(),
        })
    }

    fn url(&self, template: &str) -> String {
        format!("{}/api/recon/scans/{}/{template}", self.base, self.scan_id)
    }

    pub fn status_url(&self) -> String {
        self.url("status/")
    }

    pub fn logs_url(&self) -> String {
        self.url("logs/")
    }

    pub fn subdomains_url(&self) -> String {
        self.url("ingest/subdomains/")
    }

    pub fn endpoints_url(&self) -> String {
        self.url("ingest/endpoints/")
    }

    pub fn ports_url(&self) -> String {
        self.url("network/ports/ingest/")
    }

    pub fn tls_url(&self) -> String {
        self.url("network/tls/ingest/")
    }

    pub fn dirs_url(&self) -> String {
        self.url("network/dirs/ingest/")
    }

    /// Fire-and-forget JSON POST. Failures are logged, never propagated.
    pub async fn post_json<T: Serialize + ?Sized>(&self, url: &str, payload: &T) {
        let mut req = self
            .http
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .json(payload);
        if !self.auth_header.is_empty() {
            req = req.header(reqwest::header::AUTHORIZATION, self.auth_header.clone());
        }
        match req.send().await {
            Ok(resp) if resp.status().is_client_error() || resp.status().is_server_error() => {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                warn!("POST {url} returned {status}: {body}");
            }
            Ok(resp) => debug!("POST {url} succeeded ({})", resp.status()),
            Err(e) => warn!("POST {url} failed: {e}"),
        }
    }

    pub async fn post_status(&self, status: ScanStatus, error: Option<&str>) {
        let mut body = json!({ "status": status });
        if let Some(error) = error {
            if !error.is_empty() {
                body["error"] = json!(error);
            }
        }
        self.post_json(&self.status_url(), &body).await;
    }

    pub async fn post_log(&self, message: &str, level: LogLevel) {
        let body = json!({
            "message": message,
            "level": level,
            "timestamp": Utc::now().to_rfc3339(),
        });
        self.post_json(&self.logs_url(), &body).await;
    }

    /// Streams a single subdomain record the moment it is produced.
    pub async fn post_subdomain(&self, item: &SubdomainResult) {
        self.post_json(&self.subdomains_url(), &json!({ "items": [item] }))
            .await;
    }

    /// Streams a single endpoint record the moment it is produced.
    pub async fn post_endpoint(&self, item: &EndpointResult) {
        self.post_json(&self.endpoints_url(), &json!({ "items": [item] }))
            .await;
    }

    pub async fn post_port_findings(&self, findings: &[PortFinding]) {
        for chunk in findings.chunks(INGEST_CHUNK_SIZE) {
            self.post_json(&self.ports_url(), &json!({ "items": chunk }))
                .await;
        }
    }

    /// TLS results go up unwrapped, one object per host.
    pub async fn post_tls(&self, report: &TlsReport) {
        self.post_json(&self.tls_url(), report).await;
    }

    pub async fn post_dir_findings(&self, findings: &[DirectoryFinding]) {
        for chunk in findings.chunks(INGEST_CHUNK_SIZE) {
            self.post_json(&self.dirs_url(), &json!({ "items": chunk }))
                .await;
        }
    }
}
