//! Active crawling via `katana`.

use std::time::Duration;

use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use super::run_command;
use crate::error::ToolError;

const EXCLUDED_EXTENSIONS: &str =
    "woff,woff2,ttf,eot,svg,png,jpg,jpeg,gif,ico,css,webp,mp4,mp3,avi,mov,pdf,zip,tar,gz,bmp,tiff";

pub struct CrawlOptions {
    pub depth: usize,
    pub max_pages: usize,
    pub follow_redirects: bool,
    pub include_subdomains: bool,
}

/// Crawls `host`, seeding `https://` when no scheme is present.
///
/// Script-link extraction and known-file probing (robots.txt, sitemap.xml)
/// are always on; JSON output is requested so endpoints can be projected
/// from the request object.
pub async fn crawl(
    bin: &str,
    host: &str,
    opts: &CrawlOptions,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<Vec<String>, ToolError> {
    let seed = if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("https://{host}")
    };

    let mut cmd = Command::new(bin);
    cmd.arg("-u")
        .arg(&seed)
        .arg("-d")
        .arg(opts.depth.to_string())
        .arg("-ps")
        .arg(opts.max_pages.to_string())
        .arg("-jc")
        .arg("-kf")
        .arg("robotstxt,sitemapxml")
        .arg("-aff")
        .arg("-silent")
        .arg("-jsl")
        .arg("-timeout")
        .arg(timeout.as_secs().to_string())
        .arg("-ef")
        .arg(EXCLUDED_EXTENSIONS)
        .arg("-json");
    if opts.follow_redirects {
        cmd.arg("-rl").arg("5");
    }
    if !opts.include_subdomains {
        cmd.arg("-ns");
    }

    let out = run_command("katana", cmd, timeout, cancel).await?;
    Ok(parse_output(&out.stdout))
}

/// Parses katana output: NDJSON with a `request.endpoint` field, falling
/// back to treating the line as a plain URL. Malformed lines are skipped.
fn parse_output(stdout: &str) -> Vec<String> {
    let mut urls = Vec::new();
    for line in stdout.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Ok(value) = serde_json::from_str::<serde_json::Value>(line) {
            if let Some(endpoint) = value
                .get("request")
                .and_then(|r| r.get("endpoint"))
                .and_then(|e| e.as_str())
            {
                if !endpoint.is_empty() {
                    urls.push(endpoint.to_string());
                    continue;
                }
            }
        }

        if line.starts_with("http") {
            urls.push(line.to_string());
        }
    }
    urls
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn projects_request_endpoint_from_json() {
        let out = r#"{"request":{"endpoint":"https://example.com/api/users","method":"GET"}}
{"request":{"endpoint":"https://example.com/login"}}"#;
        assert_eq!(
            parse_output(out),
            vec!["https://example.com/api/users", "https://example.com/login"]
        );
    }

    #[test]
    fn falls_back_to_plain_urls() {
        let out = "https://example.com/raw\n{\"request\":{}}\nnot json and not url\n";
        assert_eq!(parse_output(out), vec!["https://example.com/raw"]);
    }

    #[test]
    fn skips_empty_endpoints() {
        let out = r#"{"request":{"endpoint":""}}"#;
        assert!(parse_output(out).is_empty());
    }
}
