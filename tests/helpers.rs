//! Shared helpers for integration tests: stub tool binaries and a scan
//! context wired to a scratch directory.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use recon_agent::fingerprint;
use recon_agent::pipeline::{ScanContext, ToolPaths};
use recon_agent::probe;

/// A binary name that is guaranteed not to exist on PATH.
pub const MISSING_TOOL: &str = "definitely-not-a-real-tool-xyz";

/// Writes an executable shell script into `dir` and returns its path.
pub fn stub_tool(dir: &Path, name: &str, body: &str) -> String {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("writing stub tool");
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = std::fs::metadata(&path).expect("stub metadata").permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).expect("marking stub executable");
    }
    path.to_string_lossy().into_owned()
}

/// Tool paths where every binary is missing.
pub fn missing_tools() -> ToolPaths {
    ToolPaths {
        subfinder: MISSING_TOOL.to_string(),
        gau: MISSING_TOOL.to_string(),
        katana: MISSING_TOOL.to_string(),
        httpx: MISSING_TOOL.to_string(),
        nmap: MISSING_TOOL.to_string(),
    }
}

/// Scan context over a scratch data dir with a fast-failing resolver, so
/// unresolvable test hosts come back dead quickly.
pub fn test_ctx(data_dir: PathBuf, tools: ToolPaths) -> Arc<ScanContext> {
    Arc::new(ScanContext {
        engine: fingerprint::init_engine(None),
        resolver: probe::init_resolver(Duration::from_millis(300)),
        data_dir,
        tools,
        inject_root_urls: true,
        domain_fingerprint: false,
    })
}
