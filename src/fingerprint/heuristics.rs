//! Lightweight fingerprinting used inline during probing.
//!
//! These are coarse substring checks, deliberately cheaper than the
//! signature engine: the endpoint variant runs for every kept endpoint, the
//! domain variant once per host when enabled.

use std::collections::HashMap;

/// Tags plus one evidence string per tag (`tag -> source=value`).
#[derive(Debug, Default, Clone)]
pub struct TagResult {
    pub tags: Vec<String>,
    pub evidence: HashMap<String, String>,
}

impl TagResult {
    fn add(&mut self, tag: &str, key: &str, value: &str) {
        if self.tags.iter().any(|t| t == tag) {
            return;
        }
        self.tags.push(tag.to_string());
        self.evidence
            .insert(tag.to_string(), format!("{key}={value}"));
    }
}

fn header<'a>(headers: &'a HashMap<String, String>, name: &str) -> &'a str {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
        .unwrap_or_default()
}

/// Coarse host-level tags from server/runtime/cookie/html substrings.
/// Runs once per host, behind a flag.
pub fn fingerprint_domain(headers: &HashMap<String, String>, body: &str) -> TagResult {
    let mut res = TagResult::default();

    let server = header(headers, "Server").to_lowercase();
    let xpb = header(headers, "X-Powered-By").to_lowercase();
    let cookies = header(headers, "Set-Cookie").to_lowercase();
    let html = body.to_lowercase();

    // Infra
    if server.contains("nginx") {
        res.add("nginx", "Server", header(headers, "Server"));
    }
    if server.contains("apache") {
        res.add("apache", "Server", header(headers, "Server"));
    }
    if !header(headers, "CF-RAY").is_empty() {
        res.add("cloudflare", "Header", "CF-RAY");
    }

    // Runtime
    if xpb.contains("php") || cookies.contains("phpsessid") {
        res.add("php", "runtime", "php");
    }
    if xpb.contains("express") {
        res.add("nodejs", "runtime", "express");
    }

    // CMS / framework
    if html.contains("wp-content") {
        res.add("wordpress", "html", "wp-content");
    }
    if cookies.contains("laravel_session") {
        res.add("laravel", "cookie", "laravel_session");
    }
    if cookies.contains("csrftoken") {
        res.add("django", "cookie", "csrftoken");
    }

    // Frontend
    if html.contains("__next") {
        res.add("nextjs", "html", "__next");
    }
    if html.contains("data-reactroot") {
        res.add("react", "html", "data-reactroot");
    }
    if html.contains("ng-version") {
        res.add("angular", "html", "ng-version");
    }

    res
}

/// Per-endpoint tags: content type, known admin-panel titles, and the
/// status class.
pub fn fingerprint_endpoint(
    status: u16,
    title: &str,
    headers: &HashMap<String, String>,
) -> TagResult {
    let mut res = TagResult::default();

    let ct = header(headers, "Content-Type").to_lowercase();
    let tl = title.to_lowercase();

    if ct.contains("application/json") {
        res.add("json-api", "Content-Type", header(headers, "Content-Type"));
    }
    if ct.contains("text/html") {
        res.add("html", "Content-Type", header(headers, "Content-Type"));
    }

    if tl.contains("grafana") {
        res.add("grafana", "title", title);
    }
    if tl.contains("jenkins") {
        res.add("jenkins", "title", title);
    }
    if tl.contains("admin") {
        res.add("admin-panel", "title", title);
    }

    match status {
        200..=299 => res.add("2xx", "status", &status.to_string()),
        300..=399 => res.add("3xx", "status", &status.to_string()),
        400..=499 => res.add("4xx", "status", &status.to_string()),
        500..=599 => res.add("5xx", "status", &status.to_string()),
        _ => {}
    }

    res
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn endpoint_tags_content_type_and_status_class() {
        let res = fingerprint_endpoint(
            200,
            "API docs",
            &headers(&[("Content-Type", "application/json; charset=utf-8")]),
        );
        assert!(res.tags.contains(&"json-api".to_string()));
        assert!(res.tags.contains(&"2xx".to_string()));
        assert_eq!(res.evidence["2xx"], "status=200");
    }

    #[test]
    fn endpoint_tags_admin_panels_by_title() {
        let res = fingerprint_endpoint(401, "Grafana Admin Sign-in", &headers(&[]));
        assert!(res.tags.contains(&"grafana".to_string()));
        assert!(res.tags.contains(&"admin-panel".to_string()));
        assert!(res.tags.contains(&"4xx".to_string()));
    }

    #[test]
    fn endpoint_tags_are_deduplicated() {
        let res = fingerprint_endpoint(200, "admin admin", &headers(&[]));
        let admin_count = res.tags.iter().filter(|t| *t == "admin-panel").count();
        assert_eq!(admin_count, 1);
    }

    #[test]
    fn domain_tags_from_headers_cookies_and_body() {
        let res = fingerprint_domain(
            &headers(&[
                ("Server", "nginx/1.22"),
                ("X-Powered-By", "PHP/8.1"),
                ("Set-Cookie", "laravel_session=abc"),
            ]),
            "<div data-reactroot></div> wp-content",
        );
        for tag in ["nginx", "php", "laravel", "react", "wordpress"] {
            assert!(res.tags.contains(&tag.to_string()), "missing {tag}");
        }
        assert!(!res.tags.contains(&"apache".to_string()));
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let res = fingerprint_endpoint(
            200,
            "",
            &headers(&[("content-type", "text/html")]),
        );
        assert!(res.tags.contains(&"html".to_string()));
    }
}
