//! Signature-based technology detection.
//!
//! Signatures carry regex pattern groups for headers, cookies, body text,
//! script sources and meta tags. All patterns compile case-insensitively at
//! engine construction; a pattern that fails to compile is skipped with a
//! warning rather than aborting the load. The compiled list is immutable,
//! so concurrent detection needs no locking.

use std::collections::HashMap;
use std::sync::LazyLock;

use log::warn;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Scoring weights per pattern group. Within a group only the first match
/// counts; the sum is clamped to 100.
const HEADER_WEIGHT: u32 = 25;
const COOKIE_WEIGHT: u32 = 25;
const BODY_WEIGHT: u32 = 20;
const SCRIPT_WEIGHT: u32 = 30;
const META_WEIGHT: u32 = 30;

/// How much body is considered during extraction.
const MAX_BODY_BYTES: usize = 20 * 1024;

/// A technology signature as written in the signature file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TechSignature {
    pub name: String,
    pub category: String,
    #[serde(default)]
    pub header_regex: Vec<String>,
    #[serde(default)]
    pub cookie_regex: Vec<String>,
    #[serde(default)]
    pub body_regex: Vec<String>,
    #[serde(default)]
    pub script_regex: Vec<String>,
    #[serde(default)]
    pub meta_regex: Vec<String>,
}

/// One detected technology.
#[derive(Debug, Clone, Serialize)]
pub struct TechResult {
    pub name: String,
    pub category: String,
    pub confidence: u32,
    pub evidence: Vec<String>,
}

struct CompiledSignature {
    name: String,
    category: String,
    header_regex: Vec<Regex>,
    cookie_regex: Vec<Regex>,
    body_regex: Vec<Regex>,
    script_regex: Vec<Regex>,
    meta_regex: Vec<Regex>,
}

pub struct FingerprintEngine {
    signatures: Vec<CompiledSignature>,
}

impl FingerprintEngine {
    /// Compiles a signature list. Invalid patterns are dropped per-pattern.
    pub fn compile(signatures: Vec<TechSignature>) -> Self {
        let compiled = signatures
            .into_iter()
            .map(|sig| CompiledSignature {
                header_regex: compile_group(&sig.name, "header", &sig.header_regex),
                cookie_regex: compile_group(&sig.name, "cookie", &sig.cookie_regex),
                body_regex: compile_group(&sig.name, "body", &sig.body_regex),
                script_regex: compile_group(&sig.name, "script", &sig.script_regex),
                meta_regex: compile_group(&sig.name, "meta", &sig.meta_regex),
                name: sig.name,
                category: sig.category,
            })
            .collect();
        FingerprintEngine {
            signatures: compiled,
        }
    }

    pub fn signature_count(&self) -> usize {
        self.signatures.len()
    }

    /// Scores every signature against the extracted response data and
    /// returns each technology with confidence in `[1, 100]`.
    pub fn detect(&self, data: &ExtractedData) -> Vec<TechResult> {
        let mut results = Vec::new();

        for sig in &self.signatures {
            let mut confidence = 0u32;
            let mut evidence = Vec::new();

            for (key, value) in &data.headers {
                let line = format!("{key}: {value}");
                if sig.header_regex.iter().any(|re| re.is_match(&line)) {
                    confidence += HEADER_WEIGHT;
                    evidence.push(format!("Header: {key}"));
                    break;
                }
            }

            for cookie in &data.cookies {
                if sig.cookie_regex.iter().any(|re| re.is_match(cookie)) {
                    confidence += COOKIE_WEIGHT;
                    evidence.push(format!("Cookie: {}", cookie_name(cookie)));
                    break;
                }
            }

            for re in &sig.body_regex {
                if let Some(found) = re.find(&data.body) {
                    confidence += BODY_WEIGHT;
                    let mut sample = found.as_str().to_string();
                    if sample.len() > 50 {
                        let mut cut = 50;
                        while !sample.is_char_boundary(cut) {
                            cut -= 1;
                        }
                        sample.truncate(cut);
                        sample.push_str("...");
                    }
                    evidence.push(format!("Body: {sample}"));
                    break;
                }
            }

            for src in &data.script_srcs {
                if sig.script_regex.iter().any(|re| re.is_match(src)) {
                    confidence += SCRIPT_WEIGHT;
                    evidence.push(format!("Script: {src}"));
                    break;
                }
            }

            for (name, content) in &data.meta_tags {
                let line = format!("{name} {content}");
                if sig.meta_regex.iter().any(|re| re.is_match(&line)) {
                    confidence += META_WEIGHT;
                    evidence.push(format!("Meta: {name}"));
                    break;
                }
            }

            if confidence > 0 {
                results.push(TechResult {
                    name: sig.name.clone(),
                    category: sig.category.clone(),
                    confidence: confidence.min(100),
                    evidence,
                });
            }
        }

        results
    }
}

fn compile_group(sig_name: &str, group: &str, patterns: &[String]) -> Vec<Regex> {
    patterns
        .iter()
        .filter_map(|pattern| match Regex::new(&format!("(?i){pattern}")) {
            Ok(re) => Some(re),
            Err(e) => {
                warn!("invalid {group} pattern for {sig_name}: {e}");
                None
            }
        })
        .collect()
}

fn cookie_name(cookie: &str) -> &str {
    cookie.split('=').next().unwrap_or(cookie).trim()
}

/// Everything the engine needs from one HTTP response.
pub struct ExtractedData {
    pub headers: HashMap<String, String>,
    pub cookies: Vec<String>,
    pub body: String,
    pub script_srcs: Vec<String>,
    pub meta_tags: HashMap<String, String>,
}

static SCRIPT_SRC_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<script[^>]+src=["']([^"']+)["']"#).expect("script src regex")
});
static META_NAME_CONTENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<meta[^>]+name=["']([^"']+)["'][^>]+content=["']([^"']+)["']"#)
        .expect("meta name/content regex")
});
static META_CONTENT_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<meta[^>]+content=["']([^"']+)["'][^>]+name=["']([^"']+)["']"#)
        .expect("meta content/name regex")
});

impl ExtractedData {
    /// Extracts detection inputs from response headers and body. The body is
    /// capped at 20 KiB; cookies are split from `Set-Cookie` on commas; meta
    /// tags are collected for both attribute orders with lowercased names.
    pub fn from_response(headers: HashMap<String, String>, body: &str) -> Self {
        let mut cookies = Vec::new();
        if let Some(set_cookie) = header_get(&headers, "Set-Cookie") {
            for cookie in set_cookie.split(',') {
                let cookie = cookie.trim();
                if !cookie.is_empty() {
                    cookies.push(cookie.to_string());
                }
            }
        }

        let mut capped = body;
        if capped.len() > MAX_BODY_BYTES {
            let mut cut = MAX_BODY_BYTES;
            while !capped.is_char_boundary(cut) {
                cut -= 1;
            }
            capped = &capped[..cut];
        }

        let script_srcs = SCRIPT_SRC_RE
            .captures_iter(capped)
            .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
            .collect();

        let mut meta_tags = HashMap::new();
        for caps in META_NAME_CONTENT_RE.captures_iter(capped) {
            if let (Some(name), Some(content)) = (caps.get(1), caps.get(2)) {
                meta_tags.insert(
                    name.as_str().to_lowercase(),
                    content.as_str().to_string(),
                );
            }
        }
        for caps in META_CONTENT_NAME_RE.captures_iter(capped) {
            if let (Some(content), Some(name)) = (caps.get(1), caps.get(2)) {
                meta_tags.insert(
                    name.as_str().to_lowercase(),
                    content.as_str().to_string(),
                );
            }
        }

        ExtractedData {
            headers,
            cookies,
            body: capped.to_string(),
            script_srcs,
            meta_tags,
        }
    }
}

fn header_get<'a>(headers: &'a HashMap<String, String>, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}
