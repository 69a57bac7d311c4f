//! TLS posture analysis.
//!
//! Each protocol version is probed independently with the version pinned as
//! both minimum and maximum. rustls does not implement TLS 1.0/1.1, so the
//! matrix is split: legacy versions go through `native-tls` on the blocking
//! pool, modern versions through version-pinned `tokio-rustls` with
//! certificate verification disabled. The leaf certificate itself is fetched
//! over one version-flexible handshake and inspected for expiry problems.

use std::net::ToSocketAddrs;
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use log::debug;
use tokio::net::TcpStream;
use tokio_rustls::rustls::{self, pki_types::ServerName};
use tokio_rustls::TlsConnector;
use x509_parser::prelude::FromDer;

use crate::config::TLS_DIAL_TIMEOUT;
use crate::models::TlsReport;

const WEAK_TLS_10: &str = "weak_tls_version_10";
const WEAK_TLS_11: &str = "weak_tls_version_11";
const CERT_EXPIRED: &str = "certificate_expired";
const CERT_EXPIRING_SOON: &str = "certificate_expiring_soon";
const CERT_NOT_YET_VALID: &str = "certificate_not_yet_valid";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TlsVersion {
    Tls10,
    Tls11,
    Tls12,
    Tls13,
}

impl TlsVersion {
    const ALL: [TlsVersion; 4] = [
        TlsVersion::Tls10,
        TlsVersion::Tls11,
        TlsVersion::Tls12,
        TlsVersion::Tls13,
    ];

    fn label(self) -> &'static str {
        match self {
            TlsVersion::Tls10 => "TLS1.0",
            TlsVersion::Tls11 => "TLS1.1",
            TlsVersion::Tls12 => "TLS1.2",
            TlsVersion::Tls13 => "TLS1.3",
        }
    }

    fn weak_issue(self) -> Option<&'static str> {
        match self {
            TlsVersion::Tls10 => Some(WEAK_TLS_10),
            TlsVersion::Tls11 => Some(WEAK_TLS_11),
            _ => None,
        }
    }
}

/// Probes the full version matrix on `<host>:443` and inspects the peer
/// certificate when any version handshakes.
pub async fn check_tls(host: &str) -> TlsReport {
    let mut report = TlsReport::new(host);

    for version in TlsVersion::ALL {
        if probe_version(host, version).await {
            report.supported_versions.push(version.label().to_string());
            report.has_https = true;
            if let Some(issue) = version.weak_issue() {
                report.weak_versions.push(version.label().to_string());
                report.issues.push(issue.to_string());
            }
        }
    }

    if report.has_https {
        match fetch_leaf_certificate(host).await {
            Some(cert) => apply_certificate(&mut report, &cert, Utc::now()),
            None => debug!("no peer certificate obtained from {host}:443"),
        }
    }

    report
}

async fn probe_version(host: &str, version: TlsVersion) -> bool {
    match version {
        TlsVersion::Tls10 | TlsVersion::Tls11 => probe_legacy(host, version).await,
        TlsVersion::Tls12 => probe_rustls(host, &[&rustls::version::TLS12]).await,
        TlsVersion::Tls13 => probe_rustls(host, &[&rustls::version::TLS13]).await,
    }
}

/// TLS 1.0/1.1 handshake on the blocking pool; rustls cannot speak these.
async fn probe_legacy(host: &str, version: TlsVersion) -> bool {
    let host = host.to_string();
    let protocol = match version {
        TlsVersion::Tls10 => native_tls::Protocol::Tlsv10,
        TlsVersion::Tls11 => native_tls::Protocol::Tlsv11,
        _ => return false,
    };
    tokio::task::spawn_blocking(move || {
        let Ok(connector) = native_tls::TlsConnector::builder()
            .min_protocol_version(Some(protocol))
            .max_protocol_version(Some(protocol))
            .danger_accept_invalid_certs(true)
            .danger_accept_invalid_hostnames(true)
            .build()
        else {
            return false;
        };
        let Some(addr) = resolve_addr(&host) else {
            return false;
        };
        let Ok(stream) = std::net::TcpStream::connect_timeout(&addr, TLS_DIAL_TIMEOUT) else {
            return false;
        };
        let _ = stream.set_read_timeout(Some(TLS_DIAL_TIMEOUT));
        let _ = stream.set_write_timeout(Some(TLS_DIAL_TIMEOUT));
        connector.connect(&host, stream).is_ok()
    })
    .await
    .unwrap_or(false)
}

async fn probe_rustls(host: &str, versions: &[&'static rustls::SupportedProtocolVersion]) -> bool {
    // The provider is pinned rather than taken from the process default so
    // the probe works no matter what the embedding application installed.
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = match rustls::ClientConfig::builder_with_provider(provider)
        .with_protocol_versions(versions)
    {
        Ok(builder) => builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(NoVerification::new()))
            .with_no_client_auth(),
        Err(e) => {
            debug!("unsupported protocol version combination: {e}");
            return false;
        }
    };

    let Ok(server_name) = ServerName::try_from(host.to_string()) else {
        return false;
    };

    let stream = match tokio::time::timeout(
        TLS_DIAL_TIMEOUT,
        TcpStream::connect((host.to_string(), 443)),
    )
    .await
    {
        Ok(Ok(stream)) => stream,
        _ => return false,
    };

    let connector = TlsConnector::from(Arc::new(config));
    matches!(
        tokio::time::timeout(TLS_DIAL_TIMEOUT, connector.connect(server_name, stream)).await,
        Ok(Ok(_))
    )
}

/// One flexible handshake to obtain the peer leaf certificate in DER form.
async fn fetch_leaf_certificate(host: &str) -> Option<Vec<u8>> {
    let host = host.to_string();
    tokio::task::spawn_blocking(move || {
        let connector = native_tls::TlsConnector::builder()
            .danger_accept_invalid_certs(true)
            .danger_accept_invalid_hostnames(true)
            .build()
            .ok()?;
        let addr = resolve_addr(&host)?;
        let stream = std::net::TcpStream::connect_timeout(&addr, TLS_DIAL_TIMEOUT).ok()?;
        let _ = stream.set_read_timeout(Some(TLS_DIAL_TIMEOUT));
        let _ = stream.set_write_timeout(Some(TLS_DIAL_TIMEOUT));
        let tls = connector.connect(&host, stream).ok()?;
        tls.peer_certificate().ok().flatten()?.to_der().ok()
    })
    .await
    .ok()
    .flatten()
}

/// Fills the certificate fields of a report from a DER-encoded leaf.
fn apply_certificate(report: &mut TlsReport, der: &[u8], now: DateTime<Utc>) {
    let Ok((_, cert)) = x509_parser::certificate::X509Certificate::from_der(der) else {
        debug!("could not parse peer certificate for {}", report.host);
        return;
    };

    let not_before = DateTime::from_timestamp(cert.validity().not_before.timestamp(), 0)
        .unwrap_or_default();
    let not_after = DateTime::from_timestamp(cert.validity().not_after.timestamp(), 0)
        .unwrap_or_default();

    report.cert_valid = Some(true);
    report.cert_expires_at = not_after.to_rfc3339();
    report.cert_issuer = cert.issuer().to_string();

    let (valid, issues) = classify_validity(now, not_before, not_after);
    report.cert_valid = Some(valid);
    report.issues.extend(issues);
}

/// Validity classification shared with the tests: expired, expiring within
/// 30 days, or not yet valid.
fn classify_validity(
    now: DateTime<Utc>,
    not_before: DateTime<Utc>,
    not_after: DateTime<Utc>,
) -> (bool, Vec<String>) {
    let mut valid = true;
    let mut issues = Vec::new();

    if now > not_after {
        valid = false;
        issues.push(CERT_EXPIRED.to_string());
    } else if not_after - now < TimeDelta::days(30) {
        issues.push(CERT_EXPIRING_SOON.to_string());
    }

    if now < not_before {
        valid = false;
        issues.push(CERT_NOT_YET_VALID.to_string());
    }

    (valid, issues)
}

fn resolve_addr(host: &str) -> Option<std::net::SocketAddr> {
    format!("{host}:443").to_socket_addrs().ok()?.next()
}

/// Accepts any certificate: these probes measure protocol support, not
/// trust.
#[derive(Debug)]
struct NoVerification(rustls::crypto::CryptoProvider);

impl NoVerification {
    fn new() -> Self {
        NoVerification(rustls::crypto::ring::default_provider())
    }
}

impl rustls::client::danger::ServerCertVerifier for NoVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &rustls::pki_types::CertificateDer<'_>,
        dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &rustls::pki_types::CertificateDer<'_>,
        dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        self.0
            .signature_verification_algorithms
            .supported_schemes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn healthy_certificate_has_no_issues() {
        let (valid, issues) = classify_validity(
            ts("2026-08-02T00:00:00Z"),
            ts("2026-01-01T00:00:00Z"),
            ts("2027-01-01T00:00:00Z"),
        );
        assert!(valid);
        assert!(issues.is_empty());
    }

    #[test]
    fn expired_certificate_is_invalid() {
        let (valid, issues) = classify_validity(
            ts("2026-08-02T00:00:00Z"),
            ts("2024-01-01T00:00:00Z"),
            ts("2025-01-01T00:00:00Z"),
        );
        assert!(!valid);
        assert_eq!(issues, vec![CERT_EXPIRED.to_string()]);
    }

    #[test]
    fn certificate_expiring_in_ten_days_is_flagged() {
        let (valid, issues) = classify_validity(
            ts("2026-08-02T00:00:00Z"),
            ts("2026-01-01T00:00:00Z"),
            ts("2026-08-12T00:00:00Z"),
        );
        assert!(valid);
        assert_eq!(issues, vec![CERT_EXPIRING_SOON.to_string()]);
    }

    #[test]
    fn exactly_thirty_days_out_is_not_flagged() {
        let (valid, issues) = classify_validity(
            ts("2026-08-02T00:00:00Z"),
            ts("2026-01-01T00:00:00Z"),
            ts("2026-09-01T00:00:00Z"),
        );
        assert!(valid);
        assert!(issues.is_empty());
    }

    #[test]
    fn not_yet_valid_certificate_is_invalid() {
        let (valid, issues) = classify_validity(
            ts("2026-08-02T00:00:00Z"),
            ts("2026-09-01T00:00:00Z"),
            ts("2027-09-01T00:00:00Z"),
        );
        assert!(!valid);
        assert_eq!(issues, vec![CERT_NOT_YET_VALID.to_string()]);
    }

    #[test]
    fn version_labels_and_weakness() {
        assert_eq!(TlsVersion::Tls10.label(), "TLS1.0");
        assert_eq!(TlsVersion::Tls13.label(), "TLS1.3");
        assert!(TlsVersion::Tls10.weak_issue().is_some());
        assert!(TlsVersion::Tls11.weak_issue().is_some());
        assert!(TlsVersion::Tls12.weak_issue().is_none());
        assert!(TlsVersion::Tls13.weak_issue().is_none());
    }
}
