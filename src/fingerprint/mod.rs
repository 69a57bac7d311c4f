//! Technology fingerprinting.
//!
//! Two layers: a signature engine compiled once at startup and evaluated
//! against full responses, and lightweight heuristic taggers used inline
//! during probing where loading a response into the engine would be
//! overkill.

mod builtin;
pub mod engine;
pub mod heuristics;

use std::path::Path;
use std::sync::Arc;

pub use engine::{ExtractedData, FingerprintEngine, TechResult, TechSignature};

/// Builds the engine from an external signature file when one is given and
/// readable, otherwise from the built-in catalog. Never fails: a broken
/// signature file degrades to the built-ins with a warning.
pub fn init_engine(signatures: Option<&Path>) -> Arc<FingerprintEngine> {
    let sigs = match signatures {
        Some(path) => match load_signature_file(path) {
            Ok(sigs) => {
                log::info!("loaded {} signatures from {}", sigs.len(), path.display());
                sigs
            }
            Err(e) => {
                log::warn!(
                    "could not load signatures from {}: {e}; using built-in catalog",
                    path.display()
                );
                builtin::catalog()
            }
        },
        None => builtin::catalog(),
    };
    Arc::new(FingerprintEngine::compile(sigs))
}

fn load_signature_file(path: &Path) -> anyhow::Result<Vec<TechSignature>> {
    let data = std::fs::read(path)?;
    let sigs: Vec<TechSignature> = serde_json::from_slice(&data)?;
    Ok(sigs)
}
