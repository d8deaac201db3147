//! Per-target in-flight gate.
//!
//! A key is claimed synchronously before the first await and released when
//! the returned guard drops, including when the operation's future is
//! cancelled.

use platter_core::{EngineError, EngineResult};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tracing::debug;

#[derive(Clone, Default)]
pub(crate) struct InFlight {
    keys: Arc<Mutex<HashSet<String>>>,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `key`, or fail with `OperationInProgress` naming `target`.
    pub fn try_begin(&self, key: String, target: &str) -> EngineResult<InFlightGuard> {
        self.try_begin_all(vec![key], target)
    }

    /// Claim every key or none of them.
    pub fn try_begin_all(&self, claim: Vec<String>, target: &str) -> EngineResult<InFlightGuard> {
        let mut keys = self.keys.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(busy) = claim.iter().find(|k| keys.contains(*k)) {
            debug!(key = %busy, "rejected, operation already in flight");
            return Err(EngineError::in_progress(target));
        }
        keys.extend(claim.iter().cloned());
        Ok(InFlightGuard {
            keys: Arc::clone(&self.keys),
            claimed: claim,
        })
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(key)
    }
}

#[must_use]
pub(crate) struct InFlightGuard {
    keys: Arc<Mutex<HashSet<String>>>,
    claimed: Vec<String>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut keys = self.keys.lock().unwrap_or_else(|e| e.into_inner());
        for key in &self.claimed {
            keys.remove(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_claim_rejected_until_release() {
        let gate = InFlight::new();
        let guard = gate.try_begin("device:d|dish|d1".to_string(), "dish d1").unwrap();
        let second = gate.try_begin("device:d|dish|d1".to_string(), "dish d1");
        assert!(matches!(second, Err(EngineError::OperationInProgress { .. })));
        assert!(gate.try_begin("device:d|dish|d2".to_string(), "dish d2").is_ok());

        drop(guard);
        assert!(!gate.contains("device:d|dish|d1"));
        assert!(gate.try_begin("device:d|dish|d1".to_string(), "dish d1").is_ok());
    }

    #[test]
    fn test_claim_all_is_all_or_nothing() {
        let gate = InFlight::new();
        let _item = gate.try_begin("item:r1".to_string(), "r1").unwrap();

        let both = gate.try_begin_all(vec!["resource:d1".to_string(), "item:r1".to_string()], "r1");
        assert!(matches!(both, Err(EngineError::OperationInProgress { .. })));
        assert!(!gate.contains("resource:d1"));

        let guard = gate
            .try_begin_all(vec!["resource:d1".to_string(), "item:r2".to_string()], "r2")
            .unwrap();
        assert!(gate.contains("resource:d1") && gate.contains("item:r2"));
        drop(guard);
        assert!(!gate.contains("resource:d1") && !gate.contains("item:r2"));
    }
}
