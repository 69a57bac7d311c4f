//! On-disk artifacts: one subdomain file and one endpoint file per scan.
//!
//! Files are written whole at the end of a stage; mid-stage progress exists
//! only on the wire. The subdomain artifact doubles as the endpoint stage's
//! input, which is what makes resumed endpoint discovery possible.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::info;
use serde::{Deserialize, Serialize};

use crate::models::{EndpointResult, SubdomainResult};

#[derive(Debug, Serialize, Deserialize)]
struct SubdomainArtifact {
    scan_id: i64,
    target: String,
    subdomains: Vec<SubdomainResult>,
    saved_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct EndpointArtifact {
    scan_id: i64,
    target: String,
    endpoints: Vec<EndpointResult>,
    saved_at: DateTime<Utc>,
}

fn sanitize_target(target: &str) -> String {
    target.replace(['/', ':'], "_")
}

pub fn scan_file_path(data_dir: &Path, scan_id: i64, target: &str) -> PathBuf {
    data_dir.join(format!("scan_{}_{}.json", scan_id, sanitize_target(target)))
}

pub fn endpoints_file_path(data_dir: &Path, scan_id: i64, target: &str) -> PathBuf {
    data_dir.join(format!(
        "endpoints_{}_{}.json",
        scan_id,
        sanitize_target(target)
    ))
}

async fn ensure_data_dir(data_dir: &Path) -> Result<()> {
    tokio::fs::create_dir_all(data_dir)
        .await
        .with_context(|| format!("creating data dir {}", data_dir.display()))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o755);
        let _ = tokio::fs::set_permissions(data_dir, perms).await;
    }
    Ok(())
}

/// Writes the subdomain artifact and returns its path.
pub async fn save_subdomains(
    data_dir: &Path,
    scan_id: i64,
    target: &str,
    subdomains: &[SubdomainResult],
) -> Result<PathBuf> {
    ensure_data_dir(data_dir).await?;
    let path = scan_file_path(data_dir, scan_id, target);
    let artifact = SubdomainArtifact {
        scan_id,
        target: target.to_string(),
        subdomains: subdomains.to_vec(),
        saved_at: Utc::now(),
    };
    let data = serde_json::to_vec_pretty(&artifact).context("encoding subdomain artifact")?;
    tokio::fs::write(&path, data)
        .await
        .with_context(|| format!("writing {}", path.display()))?;
    info!("saved {} subdomains to {}", subdomains.len(), path.display());
    Ok(path)
}

/// Loads the subdomain artifact a previous stage (or process) saved.
pub async fn load_subdomains(
    data_dir: &Path,
    scan_id: i64,
    target: &str,
) -> Result<Vec<SubdomainResult>> {
    let path = scan_file_path(data_dir, scan_id, target);
    let data = tokio::fs::read(&path)
        .await
        .with_context(|| format!("load subdomains: opening {}", path.display()))?;
    let artifact: SubdomainArtifact =
        serde_json::from_slice(&data).with_context(|| format!("decoding {}", path.display()))?;
    Ok(artifact.subdomains)
}

/// Writes the endpoint artifact and returns its path.
pub async fn save_endpoints(
    data_dir: &Path,
    scan_id: i64,
    target: &str,
    endpoints: &[EndpointResult],
) -> Result<PathBuf> {
    ensure_data_dir(data_dir).await?;
    let path = endpoints_file_path(data_dir, scan_id, target);
    let artifact = EndpointArtifact {
        scan_id,
        target: target.to_string(),
        endpoints: endpoints.to_vec(),
        saved_at: Utc::now(),
    };
    let data = serde_json::to_vec_pretty(&artifact).context("encoding endpoint artifact")?;
    tokio::fs::write(&path, data)
        .await
        .with_context(|| format!("writing {}", path.display()))?;
    info!("saved {} endpoints to {}", endpoints.len(), path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_sanitize_slashes_and_colons() {
        let dir = Path::new("data");
        assert_eq!(
            scan_file_path(dir, 1, "example.com"),
            Path::new("data/scan_1_example.com.json")
        );
        assert_eq!(
            scan_file_path(dir, 2, "https://example.com/x"),
            Path::new("data/scan_2_https___example.com_x.json")
        );
        assert_eq!(
            endpoints_file_path(dir, 3, "host:8080"),
            Path::new("data/endpoints_3_host_8080.json")
        );
    }

    #[tokio::test]
    async fn subdomain_artifact_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let subs = vec![
            SubdomainResult {
                name: "a.example.com".into(),
                ip: "1.2.3.4".into(),
                ips: vec!["1.2.3.4".into()],
                alive: true,
                error_msg: String::new(),
            },
            SubdomainResult {
                name: "b.example.com".into(),
                ip: String::new(),
                ips: vec![],
                alive: false,
                error_msg: "No IPs resolved".into(),
            },
        ];

        let path = save_subdomains(dir.path(), 1, "example.com", &subs)
            .await
            .unwrap();
        assert!(path.exists());

        let loaded = load_subdomains(dir.path(), 1, "example.com").await.unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].name, "a.example.com");
        assert!(loaded[0].alive);
        assert!(!loaded[1].alive);
        assert!(loaded[1].ips.is_empty());
    }

    #[tokio::test]
    async fn loading_a_missing_artifact_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_subdomains(dir.path(), 99, "nope.example.com")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("load subdomains"));
    }

    #[tokio::test]
    async fn endpoint_artifact_is_written_with_payload_shape() {
        let dir = tempfile::tempdir().unwrap();
        let eps = vec![EndpointResult {
            url: "https://a.example.com/".into(),
            status_code: 200,
            content_length: 128,
            title: "Home".into(),
            headers: Default::default(),
            fingerprints: vec!["html".into()],
            evidence: Default::default(),
        }];
        let path = save_endpoints(dir.path(), 5, "example.com", &eps)
            .await
            .unwrap();

        let raw = tokio::fs::read_to_string(&path).await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["scan_id"], 5);
        assert_eq!(value["target"], "example.com");
        assert_eq!(value["endpoints"].as_array().unwrap().len(), 1);
        assert!(value["saved_at"].is_string());
    }
}
