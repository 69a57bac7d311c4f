use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;

use recon_agent::config::Opt;
use recon_agent::pipeline::ScanContext;
use recon_agent::registry::ScanRegistry;
use recon_agent::server::{self, AppState};
use recon_agent::{fingerprint, logging};

#[tokio::main]
async fn main() -> Result<()> {
    let opt = Opt::parse();

    logging::init_logger(opt.log_level.clone().into(), opt.log_format.clone())
        .context("failed to initialize logger")?;

    // rustls needs a process-wide crypto provider before any TLS probe runs.
    let _ = rustls::crypto::ring::default_provider().install_default();

    let engine = fingerprint::init_engine(opt.signatures.as_deref());
    info!("fingerprint engine ready ({} signatures)", engine.signature_count());

    let state = AppState {
        registry: Arc::new(ScanRegistry::new()),
        ctx: Arc::new(ScanContext::from_opt(&opt, engine)),
    };

    let addr = std::env::var("RECON_HTTP_ADDR").unwrap_or_else(|_| opt.listen.clone());
    server::serve(&addr, state).await
}
