//! Result types shared across pipeline stages and the ingestion wire.
//!
//! Field names and serde attributes match the JSON the ingestion backend
//! expects; changing them is a wire-format change.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// One probed subdomain. Exactly one record is produced per enumerated name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubdomainResult {
    pub name: String,
    /// Primary IP (first resolved), kept for backend compatibility.
    pub ip: String,
    /// All resolved addresses (IPv4 + IPv6). Always an array, never null.
    pub ips: Vec<String>,
    pub alive: bool,
    pub error_msg: String,
}

/// One probed endpoint that responded with a kept status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointResult {
    pub url: String,
    pub status_code: u16,
    pub content_length: i64,
    pub title: String,
    /// Allow-listed response headers, values truncated to 180 bytes.
    pub headers: HashMap<String, String>,
    pub fingerprints: Vec<String>,
    /// Tag -> source string that produced it.
    pub evidence: HashMap<String, String>,
}

/// One open port reported by the port scanner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortFinding {
    pub host: String,
    pub ip: String,
    pub port: u16,
    pub protocol: String,
    pub state: String,
    pub service: String,
    pub product: String,
    pub version: String,
    pub banner: String,
    pub risk_tags: Vec<String>,
}

/// TLS posture of a single host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TlsReport {
    pub host: String,
    pub has_https: bool,
    pub supported_versions: Vec<String>,
    pub weak_versions: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cert_valid: Option<bool>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cert_expires_at: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cert_issuer: String,
    pub issues: Vec<String>,
}

impl TlsReport {
    pub fn new(host: &str) -> Self {
        TlsReport {
            host: host.to_string(),
            has_https: false,
            supported_versions: Vec::new(),
            weak_versions: Vec::new(),
            cert_valid: None,
            cert_expires_at: String::new(),
            cert_issuer: String::new(),
            issues: Vec::new(),
        }
    }
}

/// An accessible sensitive path on a host. Only 200 responses are reported.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryFinding {
    pub host: String,
    pub base_url: String,
    pub path: String,
    pub status_code: u16,
    pub issue_type: String,
    pub evidence: String,
}

/// Scan lifecycle states posted to the backend status endpoint.
///
/// `Cancelled` strictly dominates: once observed, neither `Completed` nor
/// `Failed` may be posted for the same scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScanStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ScanStatus::Running => "RUNNING",
            ScanStatus::Completed => "COMPLETED",
            ScanStatus::Failed => "FAILED",
            ScanStatus::Cancelled => "CANCELLED",
        };
        f.write_str(s)
    }
}

/// Severity of a backend log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
    Success,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogLevel::Info => "info",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
            LogLevel::Success => "success",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_status_serializes_screaming() {
        assert_eq!(
            serde_json::to_string(&ScanStatus::Running).unwrap(),
            "\"RUNNING\""
        );
        assert_eq!(
            serde_json::to_string(&ScanStatus::Cancelled).unwrap(),
            "\"CANCELLED\""
        );
    }

    #[test]
    fn log_level_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&LogLevel::Warning).unwrap(), "\"warning\"");
        assert_eq!(serde_json::to_string(&LogLevel::Success).unwrap(), "\"success\"");
    }

    #[test]
    fn tls_report_omits_empty_cert_fields() {
        let report = TlsReport::new("example.com");
        let json = serde_json::to_value(&report).unwrap();
        assert!(json.get("cert_valid").is_none());
        assert!(json.get("cert_expires_at").is_none());
        assert!(json.get("cert_issuer").is_none());
        assert_eq!(json["has_https"], false);
    }

    #[test]
    fn subdomain_result_ips_always_present() {
        let sub = SubdomainResult {
            name: "a.example.com".into(),
            ip: String::new(),
            ips: Vec::new(),
            alive: false,
            error_msg: "No IPs resolved".into(),
        };
        let json = serde_json::to_value(&sub).unwrap();
        assert!(json["ips"].is_array());
    }
}
