//! Liveness checks and bulk endpoint probing via `httpx`.

use std::collections::HashMap;
use std::io::Write;
use std::time::Duration;

use log::warn;
use serde::Deserialize;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use super::run_command;
use crate::error::ToolError;
use crate::models::EndpointResult;

/// Kept status codes, in httpx `-match-code` form.
const MATCH_CODES: &str = "200,201,202,204,301,302,307,308,401,403,405";

/// Checks whether a host serves HTTP(S) anywhere.
///
/// `httpx -silent -nc -u <host> -timeout <t>` prints responding URLs; any
/// URL in stdout means the host is alive.
pub async fn is_alive(
    bin: &str,
    host: &str,
    timeout_secs: u64,
    cancel: &CancellationToken,
) -> Result<bool, ToolError> {
    let mut cmd = Command::new(bin);
    cmd.arg("-silent")
        .arg("-nc")
        .arg("-u")
        .arg(host)
        .arg("-timeout")
        .arg(timeout_secs.to_string());

    let out = run_command(
        "httpx",
        cmd,
        Duration::from_secs(timeout_secs + 5),
        cancel,
    )
    .await?;
    let stdout = out.stdout.trim();
    Ok(stdout.contains("http://") || stdout.contains("https://"))
}

/// One line of `httpx -json` output. Unknown fields are ignored.
#[derive(Debug, Deserialize)]
struct HttpxResponse {
    #[serde(default)]
    url: String,
    #[serde(default)]
    status_code: u16,
    #[serde(default)]
    content_length: i64,
    #[serde(default)]
    title: String,
    #[serde(default)]
    tech: Vec<String>,
    #[serde(default, rename = "webserver")]
    server: String,
    #[serde(default)]
    content_type: String,
    #[serde(default)]
    response_time: String,
}

/// Probes a URL list in one httpx batch, filtered to kept status codes.
///
/// URLs are written to a temp file and fed with `-l`; results come back as
/// newline-delimited JSON. Malformed lines are skipped with a warning.
pub async fn probe_batch(
    bin: &str,
    urls: &[String],
    threads: usize,
    rps: usize,
    cancel: &CancellationToken,
) -> Result<Vec<EndpointResult>, ToolError> {
    let mut input = tempfile::NamedTempFile::new().map_err(|e| ToolError::Io {
        tool: "httpx",
        source: e,
    })?;
    for url in urls {
        writeln!(input, "{url}").map_err(|e| ToolError::Io {
            tool: "httpx",
            source: e,
        })?;
    }
    input.flush().map_err(|e| ToolError::Io {
        tool: "httpx",
        source: e,
    })?;

    let mut cmd = Command::new(bin);
    cmd.arg("-silent")
        .arg("-json")
        .arg("-l")
        .arg(input.path())
        .arg("-threads")
        .arg(threads.to_string())
        .arg("-rate-limit")
        .arg(rps.to_string())
        .arg("-timeout")
        .arg("7")
        .arg("-retries")
        .arg("1")
        .arg("-status-code")
        .arg("-content-length")
        .arg("-title")
        .arg("-tech-detect")
        .arg("-web-server")
        .arg("-content-type")
        .arg("-response-time")
        .arg("-match-code")
        .arg(MATCH_CODES)
        .arg("-no-color");

    // Generous ceiling: httpx paces itself with its own rate limit.
    let timeout = batch_timeout(urls.len(), rps);
    let out = run_command("httpx", cmd, timeout, cancel).await?;
    Ok(parse_batch(&out.stdout))
}

fn batch_timeout(url_count: usize, rps: usize) -> Duration {
    let rps = rps.max(1);
    let expected = (url_count / rps) as u64 + 60;
    Duration::from_secs(expected.clamp(120, 3600))
}

fn parse_batch(stdout: &str) -> Vec<EndpointResult> {
    let mut results = Vec::new();
    for line in stdout.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let resp: HttpxResponse = match serde_json::from_str(line) {
            Ok(resp) => resp,
            Err(e) => {
                warn!("skipping malformed httpx line: {e}");
                continue;
            }
        };
        if resp.url.is_empty() {
            continue;
        }

        let mut headers = HashMap::new();
        if !resp.server.is_empty() {
            headers.insert("Server".to_string(), resp.server);
        }
        if !resp.content_type.is_empty() {
            headers.insert("Content-Type".to_string(), resp.content_type);
        }

        let mut evidence = HashMap::new();
        if !resp.response_time.is_empty() {
            evidence.insert("response_time".to_string(), resp.response_time);
        }

        results.push(EndpointResult {
            url: resp.url,
            status_code: resp.status_code,
            content_length: resp.content_length,
            title: resp.title,
            headers,
            fingerprints: resp.tech,
            evidence,
        });
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_httpx_json_lines() {
        let out = concat!(
            r#"{"url":"https://a.example.com/","status_code":200,"content_length":512,"title":"Home","tech":["Nginx"],"webserver":"nginx/1.18","content_type":"text/html","response_time":"120ms"}"#,
            "\n",
            "garbage line\n",
            r#"{"url":"https://a.example.com/admin","status_code":403}"#,
            "\n",
        );
        let results = parse_batch(out);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].url, "https://a.example.com/");
        assert_eq!(results[0].status_code, 200);
        assert_eq!(results[0].headers["Server"], "nginx/1.18");
        assert_eq!(results[0].evidence["response_time"], "120ms");
        assert_eq!(results[0].fingerprints, vec!["Nginx"]);
        assert_eq!(results[1].status_code, 403);
        assert!(results[1].headers.is_empty());
    }

    #[test]
    fn skips_entries_without_url() {
        let out = r#"{"status_code":200}"#;
        assert!(parse_batch(out).is_empty());
    }

    #[test]
    fn batch_timeout_scales_with_volume() {
        assert_eq!(batch_timeout(0, 10), Duration::from_secs(120));
        assert!(batch_timeout(10_000, 10) > Duration::from_secs(1000));
        assert_eq!(batch_timeout(1_000_000, 1), Duration::from_secs(3600));
    }
}
