//! Passive subdomain enumeration via `subfinder`.

use std::collections::HashSet;
use std::time::Duration;

use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use super::run_command;
use crate::error::ToolError;

/// Enumerates subdomains of `domain` with `subfinder -silent -d <domain>`.
///
/// Output is one name per line; names are lowercased and deduplicated in
/// first-seen order.
pub async fn enumerate(
    bin: &str,
    domain: &str,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<Vec<String>, ToolError> {
    let domain = domain.trim();
    if domain.is_empty() {
        return Ok(Vec::new());
    }

    let mut cmd = Command::new(bin);
    cmd.arg("-silent").arg("-d").arg(domain);

    let out = run_command("subfinder", cmd, timeout, cancel).await?;
    Ok(parse_lines(&out.stdout))
}

fn parse_lines(stdout: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut subdomains = Vec::new();
    for line in stdout.lines() {
        let name = line.trim().to_lowercase();
        if name.is_empty() {
            continue;
        }
        if seen.insert(name.clone()) {
            subdomains.push(name);
        }
    }
    subdomains
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowercases_and_deduplicates() {
        let out = "A.Example.com\nb.example.com\n\na.example.com\n";
        assert_eq!(parse_lines(out), vec!["a.example.com", "b.example.com"]);
    }

    #[test]
    fn empty_output_is_empty_list() {
        assert!(parse_lines("").is_empty());
        assert!(parse_lines("\n  \n").is_empty());
    }
}
