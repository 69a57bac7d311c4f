//! Sensitive-path probing.
//!
//! A fixed path list is requested against the host's preferred base URL.
//! Only 200 responses are reported; the first 2 KiB of body is scanned for
//! directory-listing markers, which override the path-derived issue type.

use anyhow::{Context, Result};
use log::debug;

use crate::config::{DIRECTORY_TIMEOUT, USER_AGENT};
use crate::models::DirectoryFinding;

const SENSITIVE_PATHS: [&str; 14] = [
    "/.git/",
    "/.git/config",
    "/.env",
    "/backup/",
    "/backups/",
    "/admin/",
    "/uploads/",
    "/server-status",
    "/actuator",
    "/actuator/health",
    "/swagger",
    "/swagger-ui/",
    "/api-docs",
    "/.well-known/",
];

const BODY_SCAN_BYTES: usize = 2048;

/// Checks every sensitive path on the host. `has_https` picks the base
/// scheme discovered by the TLS stage.
pub async fn check_directories(host: &str, has_https: bool) -> Vec<DirectoryFinding> {
    let scheme = if has_https { "https" } else { "http" };
    let base_url = format!("{scheme}://{host}");

    let client = match directory_client() {
        Ok(client) => client,
        Err(e) => {
            debug!("directory client build failed for {host}: {e}");
            return Vec::new();
        }
    };

    let mut findings = Vec::new();
    for path in SENSITIVE_PATHS {
        let url = format!("{base_url}{path}");
        if let Some(finding) = check_path(&client, host, &base_url, path, &url).await {
            findings.push(finding);
        }
    }
    findings
}

fn directory_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(DIRECTORY_TIMEOUT)
        .redirect(reqwest::redirect::Policy::limited(3))
        .danger_accept_invalid_certs(true)
        .user_agent(USER_AGENT)
        .build()
        .context("building directory client")
}

async fn check_path(
    client: &reqwest::Client,
    host: &str,
    base_url: &str,
    path: &str,
    url: &str,
) -> Option<DirectoryFinding> {
    let resp = client.get(url).send().await.ok()?;
    if resp.status().as_u16() != 200 {
        return None;
    }

    let mut body = Vec::with_capacity(BODY_SCAN_BYTES);
    let mut resp = resp;
    while body.len() < BODY_SCAN_BYTES {
        match resp.chunk().await {
            Ok(Some(chunk)) => {
                let room = BODY_SCAN_BYTES - body.len();
                body.extend_from_slice(&chunk[..chunk.len().min(room)]);
            }
            _ => break,
        }
    }
    let body = String::from_utf8_lossy(&body).to_lowercase();

    let (issue_type, evidence) = classify_finding(path, &body);
    debug!("{url} accessible ({issue_type})");
    Some(DirectoryFinding {
        host: host.to_string(),
        base_url: base_url.to_string(),
        path: path.to_string(),
        status_code: 200,
        issue_type: issue_type.to_string(),
        evidence,
    })
}

/// Issue type for an accessible path: listing markers win, then the
/// path-derived classification.
pub fn classify_finding(path: &str, body_lower: &str) -> (&'static str, String) {
    if body_lower.contains("index of /")
        || body_lower.contains("directory listing")
        || body_lower.contains("<title>index of")
        || body_lower.contains("parent directory")
    {
        return ("directory_listing", "Directory listing detected".to_string());
    }
    if path.contains(".git") {
        return (
            "sensitive_file_exposed",
            ".git directory or file is accessible".to_string(),
        );
    }
    if path.contains(".env") {
        return (
            "sensitive_file_exposed",
            ".env file is accessible".to_string(),
        );
    }
    if path.contains("backup") {
        return (
            "sensitive_path_accessible",
            "Backup directory is accessible".to_string(),
        );
    }
    if path.contains("admin") {
        return (
            "admin_panel_accessible",
            "Admin panel or path is accessible".to_string(),
        );
    }
    ("path_accessible", format!("Path {path} returned 200 OK"))
}
