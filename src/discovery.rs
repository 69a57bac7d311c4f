//! Dynamic URL discovery over alive hosts.
//!
//! Each host is handed to a worker that runs the enabled sources
//! concurrently (`gau` for historical URLs, `katana` for crawling) under a
//! shared per-host timeout. Raw URLs fan into one channel; a single
//! collector drains it. The combined list is then normalized and
//! deduplicated, bounded by `max_urls_per_host × host_count`.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::LazyLock;
use std::time::Duration;

use futures::stream::FuturesUnordered;
use futures::StreamExt;
use log::{debug, info, warn};
use regex::Regex;
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::config;
use crate::tools::{gau, katana};

#[derive(Debug, Clone)]
pub struct DiscoveryOptions {
    pub use_gau: bool,
    pub use_katana: bool,
    pub katana_depth: usize,
    pub katana_max_pages: usize,
    /// Per tool, per host.
    pub timeout: Duration,
    pub workers: usize,
    pub gau_bin: String,
    pub katana_bin: String,
    pub max_urls_per_host: usize,
    pub follow_redirects: bool,
    pub include_subdomains: bool,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        DiscoveryOptions {
            use_gau: true,
            use_katana: true,
            katana_depth: 2,
            katana_max_pages: config::KATANA_MAX_PAGES,
            timeout: config::DISCOVERY_TIMEOUT,
            workers: 5,
            gau_bin: "gau".to_string(),
            katana_bin: "katana".to_string(),
            max_urls_per_host: 500,
            follow_redirects: true,
            include_subdomains: false,
        }
    }
}

/// Discovers URLs for all hosts and returns them normalized and
/// deduplicated, ready for probing.
pub async fn discover_urls(
    hosts: &[String],
    opts: &DiscoveryOptions,
    cancel: &CancellationToken,
) -> Vec<String> {
    if hosts.is_empty() {
        return Vec::new();
    }
    info!("starting url discovery for {} hosts", hosts.len());

    let (url_tx, mut url_rx) = mpsc::channel::<String>(1000);
    let collector = tokio::spawn(async move {
        let mut all = Vec::new();
        while let Some(url) = url_rx.recv().await {
            all.push(url);
        }
        all
    });

    let semaphore = Arc::new(Semaphore::new(opts.workers.max(1)));
    let mut tasks = FuturesUnordered::new();
    for host in hosts {
        let permit = tokio::select! {
            permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
            _ = cancel.cancelled() => {
                debug!("discovery cancelled, stopping job distribution");
                break;
            }
        };

        let host = host.clone();
        let opts = opts.clone();
        let url_tx = url_tx.clone();
        let cancel = cancel.clone();
        tasks.push(tokio::spawn(async move {
            let _permit = permit;
            if cancel.is_cancelled() {
                return;
            }
            discover_host(&host, &opts, &url_tx, &cancel).await;
        }));
    }
    drop(url_tx);

    while let Some(joined) = tasks.next().await {
        if let Err(e) = joined {
            warn!("discovery worker panicked: {e:?}");
        }
    }
    let raw = collector.await.unwrap_or_default();

    info!("collected {} raw urls, normalizing", raw.len());
    normalize_and_deduplicate(&raw, opts.max_urls_per_host.saturating_mul(hosts.len()))
}

/// Runs the enabled sources for one host concurrently.
async fn discover_host(
    host: &str,
    opts: &DiscoveryOptions,
    url_tx: &mpsc::Sender<String>,
    cancel: &CancellationToken,
) {
    debug!("discovering urls for {host}");

    let gau_fut = async {
        if !opts.use_gau {
            return Vec::new();
        }
        match gau::collect(
            &opts.gau_bin,
            host,
            opts.include_subdomains,
            opts.timeout,
            cancel,
        )
        .await
        {
            Ok(urls) => {
                debug!("gau found {} urls for {host}", urls.len());
                urls
            }
            Err(e) if e.is_missing() => {
                warn!("gau not installed, skipping for {host}");
                Vec::new()
            }
            Err(e) => {
                warn!("gau error for {host}: {e}");
                Vec::new()
            }
        }
    };

    let katana_fut = async {
        if !opts.use_katana {
            return Vec::new();
        }
        let crawl_opts = katana::CrawlOptions {
            depth: opts.katana_depth,
            max_pages: opts.katana_max_pages,
            follow_redirects: opts.follow_redirects,
            include_subdomains: opts.include_subdomains,
        };
        match katana::crawl(&opts.katana_bin, host, &crawl_opts, opts.timeout, cancel).await {
            Ok(urls) => {
                debug!("katana found {} urls for {host}", urls.len());
                urls
            }
            Err(e) if e.is_missing() => {
                warn!("katana not installed, skipping for {host}");
                Vec::new()
            }
            Err(e) => {
                warn!("katana error for {host}: {e}");
                Vec::new()
            }
        }
    };

    let (gau_urls, katana_urls) = tokio::join!(gau_fut, katana_fut);
    for url in gau_urls.into_iter().chain(katana_urls) {
        if url_tx.send(url).await.is_err() {
            return;
        }
    }
}

/// Normalizes and deduplicates raw URLs, keeping first-seen order and
/// stopping once `max_urls` have been kept.
pub fn normalize_and_deduplicate(urls: &[String], max_urls: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for raw in urls {
        let Ok(parsed) = Url::parse(raw) else {
            continue;
        };
        if parsed.host_str().is_none() || parsed.scheme().is_empty() {
            continue;
        }
        let normalized = normalize_url(parsed);
        if seen.insert(normalized.clone()) {
            out.push(normalized);
            if out.len() >= max_urls {
                break;
            }
        }
    }
    out
}

/// Canonical form of a URL. Total and idempotent:
/// lowercase scheme and host, default ports stripped, fragment dropped,
/// query re-encoded with keys sorted, trailing slash stripped except root.
pub fn normalize_url(mut url: Url) -> String {
    // The url crate already lowercases scheme and host and elides default
    // ports on serialization; what is left is query ordering, the fragment
    // and the trailing slash.
    url.set_fragment(None);

    if url.query().is_some() {
        let mut pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        pairs.sort_by(|a, b| a.0.cmp(&b.0));
        if pairs.is_empty() {
            url.set_query(None);
        } else {
            let encoded = url::form_urlencoded::Serializer::new(String::new())
                .extend_pairs(pairs)
                .finish();
            url.set_query(Some(&encoded));
        }
    }

    // Strip trailing slashes from non-root paths. All of them at once, so
    // the result is stable under re-normalization.
    if url.path().len() > 1 && url.path().ends_with('/') {
        let trimmed = url.path().trim_end_matches('/').to_string();
        if trimmed.is_empty() {
            url.set_path("/");
        } else {
            url.set_path(&trimmed);
        }
    }
    url.to_string()
}

static NUMERIC_SEGMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/\d+").expect("numeric segment regex"));
static UUID_SEGMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"/[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}")
        .expect("uuid segment regex")
});
static HEX_SEGMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/[0-9a-fA-F]{32,}").expect("hex segment regex"));

/// Collapses volatile path segments so URLs that differ only in identifiers
/// group together: numeric ids become `{id}`, UUIDs `{uuid}`, long hex
/// strings `{hash}`.
pub fn url_pattern(raw: &str) -> String {
    let Ok(parsed) = Url::parse(raw) else {
        return raw.to_string();
    };
    let path = parsed.path();
    // UUID and hash first: both contain digit runs a bare numeric pass
    // would otherwise mangle.
    let path = UUID_SEGMENT.replace_all(path, "/{uuid}");
    let path = HEX_SEGMENT.replace_all(&path, "/{hash}");
    let path = NUMERIC_SEGMENT.replace_all(&path, "/{id}");
    format!(
        "{}://{}{}",
        parsed.scheme(),
        parsed.host_str().unwrap_or_default(),
        path
    )
}

/// Groups URLs by pattern and keeps the first URL of each group.
pub fn dedupe_by_pattern(urls: &[String]) -> Vec<String> {
    let mut groups: HashMap<String, &String> = HashMap::new();
    let mut order = Vec::new();
    for url in urls {
        let pattern = url_pattern(url);
        if !groups.contains_key(&pattern) {
            groups.insert(pattern.clone(), url);
            order.push(pattern);
        }
    }
    order
        .into_iter()
        .filter_map(|p| groups.get(&p).map(|u| (*u).clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn norm(s: &str) -> String {
        normalize_url(Url::parse(s).unwrap())
    }

    #[test]
    fn normalization_canonicalizes_scheme_host_and_port() {
        assert_eq!(norm("HTTPS://Example.com:443/a/b"), "https://example.com/a/b");
        assert_eq!(norm("http://EXAMPLE.com:80/"), "http://example.com/");
        // Non-default ports survive.
        assert_eq!(norm("http://example.com:8080/x"), "http://example.com:8080/x");
    }

    #[test]
    fn normalization_sorts_query_and_drops_fragment() {
        assert_eq!(
            norm("HTTPS://Example.com:443/a/b/?b=2&a=1#frag"),
            "https://example.com/a/b?a=1&b=2"
        );
        assert_eq!(
            norm("https://example.com/a/b?a=1&b=2"),
            "https://example.com/a/b?a=1&b=2"
        );
    }

    #[test]
    fn normalization_handles_trailing_slash_and_empty_path() {
        assert_eq!(norm("https://example.com"), "https://example.com/");
        assert_eq!(norm("https://example.com/"), "https://example.com/");
        assert_eq!(norm("https://example.com/a/"), "https://example.com/a");
    }

    #[test]
    fn normalization_is_idempotent() {
        for input in [
            "HTTPS://Example.com:443/a/b/?b=2&a=1#frag",
            "http://example.com",
            "https://example.com/x/y/?z=1",
            "https://example.com/a//",
            "http://example.com:8080/p?b=2&a=1&a=0",
        ] {
            let once = norm(input);
            let twice = norm(&once);
            assert_eq!(once, twice, "normalize must be idempotent for {input}");
        }
    }

    #[test]
    fn dedup_collapses_equivalent_urls() {
        let urls = vec![
            "HTTPS://Example.com:443/a/b/?b=2&a=1#frag".to_string(),
            "https://example.com/a/b?a=1&b=2".to_string(),
            "https://example.com/other".to_string(),
        ];
        let out = normalize_and_deduplicate(&urls, 100);
        assert_eq!(
            out,
            vec![
                "https://example.com/a/b?a=1&b=2".to_string(),
                "https://example.com/other".to_string(),
            ]
        );
    }

    #[test]
    fn dedup_drops_invalid_and_schemeless_entries() {
        let urls = vec![
            "not a url".to_string(),
            "/relative/path".to_string(),
            "https://example.com/ok".to_string(),
        ];
        let out = normalize_and_deduplicate(&urls, 100);
        assert_eq!(out, vec!["https://example.com/ok".to_string()]);
    }

    #[test]
    fn dedup_respects_the_bound() {
        let urls: Vec<String> = (0..20)
            .map(|i| format!("https://example.com/page{i}"))
            .collect();
        assert_eq!(normalize_and_deduplicate(&urls, 5).len(), 5);
    }

    #[test]
    fn url_pattern_collapses_identifier_segments() {
        assert_eq!(
            url_pattern("https://example.com/users/123"),
            "https://example.com/users/{id}"
        );
        assert_eq!(
            url_pattern("https://example.com/users/550e8400-e29b-41d4-a716-446655440000"),
            "https://example.com/users/{uuid}"
        );
        assert_eq!(
            url_pattern("https://example.com/users/deadbeefdeadbeefdeadbeefdeadbeefdeadbeef"),
            "https://example.com/users/{hash}"
        );
    }

    #[test]
    fn pattern_dedup_keeps_first_per_group() {
        let urls = vec![
            "https://example.com/users/123".to_string(),
            "https://example.com/users/456".to_string(),
            "https://example.com/users/550e8400-e29b-41d4-a716-446655440000".to_string(),
            "https://example.com/users/deadbeefdeadbeefdeadbeefdeadbeefdeadbeef".to_string(),
        ];
        let out = dedupe_by_pattern(&urls);
        assert_eq!(
            out,
            vec![
                "https://example.com/users/123".to_string(),
                "https://example.com/users/550e8400-e29b-41d4-a716-446655440000".to_string(),
                "https://example.com/users/deadbeefdeadbeefdeadbeefdeadbeefdeadbeef".to_string(),
            ]
        );
    }

    // Property coverage for the idempotence invariant over generated inputs.
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn normalize_idempotent_for_generated_urls(
            host in "[a-z]{3,12}\\.[a-z]{2,4}",
            path in prop::collection::vec("[a-zA-Z0-9]{1,8}", 0..4),
            key_a in "[a-z]{1,5}",
            key_b in "[a-z]{1,5}",
        ) {
            let url = format!(
                "https://{}/{}?{}=1&{}=2",
                host,
                path.join("/"),
                key_b,
                key_a
            );
            if let Ok(parsed) = Url::parse(&url) {
                let once = normalize_url(parsed);
                let twice = normalize_url(Url::parse(&once).unwrap());
                prop_assert_eq!(once, twice);
            }
        }
    }
}
