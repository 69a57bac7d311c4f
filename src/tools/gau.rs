//! Historical URL collection via `gau`.

use std::time::Duration;

use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use super::run_command;
use crate::error::ToolError;

/// Static-asset extensions excluded from historical URL collection.
pub const EXTENSION_BLACKLIST: &str =
    "ttf,woff,woff2,svg,png,jpg,jpeg,gif,ico,css,webp,mp4,mp3,avi,mov,pdf,zip,tar,gz";

/// Collects historical URLs for `host`.
pub async fn collect(
    bin: &str,
    host: &str,
    include_subdomains: bool,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<Vec<String>, ToolError> {
    let mut cmd = Command::new(bin);
    cmd.arg("--blacklist")
        .arg(EXTENSION_BLACKLIST)
        .arg("--threads")
        .arg("5")
        .arg("--timeout")
        .arg(timeout.as_secs().to_string());
    if include_subdomains {
        cmd.arg("--subs");
    }
    cmd.arg(host);

    let out = run_command("gau", cmd, timeout, cancel).await?;
    Ok(parse_lines(&out.stdout))
}

fn parse_lines(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && line.starts_with("http"))
        .map(str::to_string)
        .collect()
}
