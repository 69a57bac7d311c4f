//! Process-wide registry of active scans.
//!
//! Entries are strictly add-on-start, remove-on-end: a scan's cancel handle
//! is registered before the pipeline posts RUNNING and removed before any
//! terminal status is posted. A scan id may hold at most one handle;
//! re-registering a running id is rejected rather than replacing the handle.

use std::collections::HashMap;
use std::sync::RwLock;

use tokio_util::sync::CancellationToken;

#[derive(Debug, thiserror::Error)]
#[error("scan {0} is already running")]
pub struct AlreadyRunning(pub i64);

#[derive(Default)]
pub struct ScanRegistry {
    scans: RwLock<HashMap<i64, CancellationToken>>,
}

impl ScanRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new scan and returns its cancellation token.
    pub fn register(&self, scan_id: i64) -> Result<CancellationToken, AlreadyRunning> {
        let mut scans = self.scans.write().expect("scan registry poisoned");
        if scans.contains_key(&scan_id) {
            return Err(AlreadyRunning(scan_id));
        }
        let token = CancellationToken::new();
        scans.insert(scan_id, token.clone());
        Ok(token)
    }

    /// Fires the cancel handle for a scan. Returns false when no active scan
    /// matches (already finished, cancelled, or never started).
    pub fn cancel(&self, scan_id: i64) -> bool {
        let scans = self.scans.read().expect("scan registry poisoned");
        match scans.get(&scan_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Drops a scan's handle. Idempotent.
    pub fn remove(&self, scan_id: i64) {
        let mut scans = self.scans.write().expect("scan registry poisoned");
        scans.remove(&scan_id);
    }

    pub fn is_active(&self, scan_id: i64) -> bool {
        self.scans
            .read()
            .expect("scan registry poisoned")
            .contains_key(&scan_id)
    }

    pub fn active_count(&self) -> usize {
        self.scans.read().expect("scan registry poisoned").len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_cancel_remove_lifecycle() {
        let registry = ScanRegistry::new();
        let token = registry.register(1).unwrap();
        assert!(registry.is_active(1));
        assert!(!token.is_cancelled());

        assert!(registry.cancel(1));
        assert!(token.is_cancelled());
        // Cancelling does not remove; the pipeline removes on exit.
        assert!(registry.is_active(1));

        registry.remove(1);
        assert!(!registry.is_active(1));
        assert!(!registry.cancel(1));
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let registry = ScanRegistry::new();
        let first = registry.register(7).unwrap();
        let err = registry.register(7).unwrap_err();
        assert_eq!(err.0, 7);
        // The original handle survives the rejected attempt.
        assert!(!first.is_cancelled());
        assert!(registry.cancel(7));
        assert!(first.is_cancelled());
    }

    #[test]
    fn cancel_unknown_scan_reports_false() {
        let registry = ScanRegistry::new();
        assert!(!registry.cancel(404));
    }

    #[test]
    fn remove_is_idempotent() {
        let registry = ScanRegistry::new();
        registry.register(3).unwrap();
        registry.remove(3);
        registry.remove(3);
        assert_eq!(registry.active_count(), 0);
    }

    #[test]
    fn independent_scans_do_not_interfere() {
        let registry = ScanRegistry::new();
        let a = registry.register(1).unwrap();
        let b = registry.register(2).unwrap();
        registry.cancel(1);
        assert!(a.is_cancelled());
        assert!(!b.is_cancelled());
    }
}
