//! Endpoint probing.
//!
//! Discovered URLs are probed with a single `httpx` batch when the tool is
//! available; when it is missing or returns nothing, a native worker pool
//! takes over, throttled by the scan's global token bucket. Only responses
//! whose status is in the kept set are retained, each annotated with
//! endpoint fingerprint tags before being streamed out.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use futures::stream::FuturesUnordered;
use futures::StreamExt;
use log::{debug, info, warn};
use regex::Regex;
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::config;
use crate::fingerprint::heuristics::fingerprint_endpoint;
use crate::fingerprint::{ExtractedData, FingerprintEngine};
use crate::models::EndpointResult;
use crate::rate_limiter::new_rate_limiter;
use crate::tools::httpx;

/// Response headers worth keeping on an endpoint record.
const KEPT_HEADERS: [&str; 5] = [
    "Server",
    "X-Powered-By",
    "Content-Type",
    "Set-Cookie",
    "CF-RAY",
];

#[derive(Debug, Clone)]
pub struct EndpointProbeOptions {
    pub workers: usize,
    pub rps: usize,
    pub use_httpx: bool,
    pub httpx_bin: String,
}

/// Probes `urls`, streaming every kept result on `tx` as soon as a worker
/// produces it and returning the accumulated list.
pub async fn probe_urls(
    urls: &[String],
    opts: &EndpointProbeOptions,
    engine: Arc<FingerprintEngine>,
    tx: mpsc::Sender<EndpointResult>,
    cancel: &CancellationToken,
) -> Result<Vec<EndpointResult>> {
    if urls.is_empty() {
        return Ok(Vec::new());
    }

    if opts.use_httpx {
        match httpx::probe_batch(&opts.httpx_bin, urls, opts.workers, opts.rps, cancel).await {
            Ok(results) if !results.is_empty() => {
                info!("httpx probed {} endpoints", results.len());
                for result in &results {
                    let _ = tx.send(result.clone()).await;
                }
                return Ok(results);
            }
            Ok(_) => debug!("httpx returned no results, using native client"),
            Err(e) if e.is_missing() => debug!("httpx not installed, using native client"),
            Err(e) => warn!("httpx batch failed ({e}), using native client"),
        }
    }

    probe_native(urls, opts, engine, tx, cancel).await
}

/// Native fallback: a bounded worker pool where every request first takes a
/// token from the scan-global rate limiter.
async fn probe_native(
    urls: &[String],
    opts: &EndpointProbeOptions,
    engine: Arc<FingerprintEngine>,
    tx: mpsc::Sender<EndpointResult>,
    cancel: &CancellationToken,
) -> Result<Vec<EndpointResult>> {
    let client = Arc::new(endpoint_client()?);
    let limiter = new_rate_limiter(opts.rps, cancel);
    let semaphore = Arc::new(Semaphore::new(opts.workers.max(1)));
    let mut tasks = FuturesUnordered::new();

    for url in urls {
        let permit = tokio::select! {
            permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
            _ = cancel.cancelled() => break,
        };

        let url = url.clone();
        let client = Arc::clone(&client);
        let limiter = Arc::clone(&limiter);
        let engine = Arc::clone(&engine);
        let tx = tx.clone();
        let cancel = cancel.clone();
        tasks.push(tokio::spawn(async move {
            let _permit = permit;
            if cancel.is_cancelled() {
                return None;
            }
            limiter.acquire().await;
            match probe_url(&client, &engine, &url).await {
                Some(result) => {
                    let _ = tx.send(result.clone()).await;
                    Some(result)
                }
                None => None,
            }
        }));
    }
    drop(tx);

    let mut results = Vec::new();
    while let Some(joined) = tasks.next().await {
        match joined {
            Ok(Some(result)) => results.push(result),
            Ok(None) => {}
            Err(e) => warn!("endpoint worker panicked: {e:?}"),
        }
    }
    Ok(results)
}

fn endpoint_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(config::ENDPOINT_TIMEOUT)
        .redirect(reqwest::redirect::Policy::none())
        .danger_accept_invalid_certs(true)
        .build()
        .context("building endpoint client")
}

/// 2xx/3xx plus the auth-ish statuses that still prove an endpoint exists.
pub fn should_keep_status(code: u16) -> bool {
    if (200..400).contains(&code) {
        return true;
    }
    matches!(code, 401 | 403 | 405)
}

/// Probes one URL. Returns `None` for network errors and discarded
/// statuses; per-item failures never abort the stage.
async fn probe_url(
    client: &reqwest::Client,
    engine: &FingerprintEngine,
    url: &str,
) -> Option<EndpointResult> {
    let resp = match client
        .get(url)
        .header(reqwest::header::USER_AGENT, config::USER_AGENT)
        .header(reqwest::header::ACCEPT, config::ACCEPT_HEADER)
        .send()
        .await
    {
        Ok(resp) => resp,
        Err(e) => {
            debug!("probe failed for {url}: {e}");
            return None;
        }
    };

    let status = resp.status().as_u16();
    if !should_keep_status(status) {
        return None;
    }

    let content_length = resp
        .content_length()
        .map(|n| n as i64)
        .unwrap_or(-1);
    let headers = snapshot_headers(resp.headers());
    let snippet = read_body_prefix(resp, config::BODY_SNIPPET_BYTES).await;
    let title = extract_title(&snippet);

    let mut tags = fingerprint_endpoint(status, &title, &headers);

    // Signature engine detections over the same snippet; tech names join
    // the heuristic tags, each carrying one evidence string.
    let extracted = ExtractedData::from_response(headers.clone(), &snippet);
    for tech in engine.detect(&extracted) {
        if !tags.tags.contains(&tech.name) {
            tags.tags.push(tech.name.clone());
            tags.evidence.insert(
                tech.name,
                tech.evidence.into_iter().next().unwrap_or_default(),
            );
        }
    }

    Some(EndpointResult {
        url: url.to_string(),
        status_code: status,
        content_length,
        title,
        headers,
        fingerprints: tags.tags,
        evidence: tags.evidence,
    })
}

/// Reads at most `limit` bytes of the response body, discarding the rest.
async fn read_body_prefix(mut resp: reqwest::Response, limit: usize) -> String {
    let mut buf: Vec<u8> = Vec::with_capacity(limit.min(4096));
    while buf.len() < limit {
        match resp.chunk().await {
            Ok(Some(chunk)) => {
                let room = limit - buf.len();
                buf.extend_from_slice(&chunk[..chunk.len().min(room)]);
            }
            Ok(None) => break,
            Err(_) => break,
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// Keeps the allow-listed headers, truncating each value to 180 bytes.
pub fn snapshot_headers(headers: &reqwest::header::HeaderMap) -> HashMap<String, String> {
    let mut out = HashMap::new();
    for name in KEPT_HEADERS {
        if let Some(value) = headers.get(name) {
            let Ok(mut value) = value.to_str().map(str::to_string) else {
                continue;
            };
            if value.len() > config::HEADER_VALUE_MAX_BYTES {
                let mut cut = config::HEADER_VALUE_MAX_BYTES;
                while !value.is_char_boundary(cut) {
                    cut -= 1;
                }
                value.truncate(cut);
            }
            if !value.is_empty() {
                out.insert(name.to_string(), value);
            }
        }
    }
    out
}

static TITLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<\s*title[^>]*>(.*?)<\s*/\s*title\s*>").expect("title regex")
});

/// Pulls the first `<title>` out of a body snippet: HTML-unescaped,
/// whitespace collapsed to single spaces.
pub fn extract_title(snippet: &str) -> String {
    let Some(captures) = TITLE_RE.captures(snippet) else {
        return String::new();
    };
    let raw = captures.get(1).map(|m| m.as_str()).unwrap_or_default();
    let unescaped = unescape_html(raw);
    unescaped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Minimal entity decoding for the named entities titles actually contain,
/// plus numeric references.
fn unescape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        rest = &rest[start..];
        let Some(end) = rest.find(';') else {
            out.push_str(rest);
            return out;
        };
        let entity = &rest[1..end];
        let decoded = match entity {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" | "#39" => Some('\''),
            "nbsp" => Some(' '),
            _ => entity
                .strip_prefix("#x")
                .or_else(|| entity.strip_prefix("#X"))
                .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                .or_else(|| entity.strip_prefix('#').and_then(|d| d.parse().ok()))
                .and_then(char::from_u32),
        };
        match decoded {
            Some(c) => {
                out.push(c);
                rest = &rest[end + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kept_status_set_is_exact() {
        for code in [200, 201, 202, 204, 301, 302, 307, 308, 401, 403, 405] {
            assert!(should_keep_status(code), "{code} should be kept");
        }
        for code in [100, 400, 402, 404, 418, 429, 500, 502, 503] {
            assert!(!should_keep_status(code), "{code} should be dropped");
        }
        // The whole 2xx/3xx range is kept, not just the httpx match list.
        assert!(should_keep_status(226));
        assert!(should_keep_status(303));
    }

    #[test]
    fn title_extraction_unescapes_and_collapses() {
        let body = "<html><head><title>\n  Admin &amp; Login\t&#39;Panel&#39;  </title></head>";
        assert_eq!(extract_title(body), "Admin & Login 'Panel'");
    }

    #[test]
    fn title_extraction_is_case_insensitive_and_first_match() {
        let body = "<TITLE attr=\"x\">First</TITLE><title>Second</title>";
        assert_eq!(extract_title(body), "First");
    }

    #[test]
    fn missing_title_is_empty() {
        assert_eq!(extract_title("<html><body>no title</body></html>"), "");
    }

    #[test]
    fn unescape_handles_numeric_and_unknown_entities() {
        assert_eq!(unescape_html("a&#x41;b"), "aAb");
        assert_eq!(unescape_html("a&#65;b"), "aAb");
        assert_eq!(unescape_html("a&bogus;b"), "a&bogus;b");
        assert_eq!(unescape_html("trailing&amp"), "trailing&amp");
    }

    #[test]
    fn header_snapshot_is_allowlisted_and_truncated() {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("Server", "nginx/1.18".parse().unwrap());
        headers.insert("X-Request-Id", "not-kept".parse().unwrap());
        let long = "c".repeat(500);
        headers.insert("Set-Cookie", long.parse().unwrap());

        let out = snapshot_headers(&headers);
        assert_eq!(out.len(), 2);
        assert_eq!(out["Server"], "nginx/1.18");
        assert_eq!(out["Set-Cookie"].len(), config::HEADER_VALUE_MAX_BYTES);
        assert!(!out.contains_key("X-Request-Id"));
    }

    #[tokio::test]
    async fn empty_url_list_is_a_noop() {
        let opts = EndpointProbeOptions {
            workers: 2,
            rps: 10,
            use_httpx: false,
            httpx_bin: "httpx".into(),
        };
        let cancel = CancellationToken::new();
        let engine = crate::fingerprint::init_engine(None);
        let (tx, mut rx) = mpsc::channel(1);
        let results = probe_urls(&[], &opts, engine, tx, &cancel).await.unwrap();
        assert!(results.is_empty());
        assert!(rx.recv().await.is_none());
    }
}
