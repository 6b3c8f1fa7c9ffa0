use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// Process-wide map of product codes currently claimed by an in-flight
/// request. The value is the identity of the claimant (its peer address).
///
/// A caller that crashes between claim and release leaves its codes stuck
/// until the process restarts; entries carry no TTL. Reaping stale claims is
/// an external concern.
#[derive(Debug, Default)]
pub struct ProductRegistry {
    in_use: Mutex<HashMap<String, String>>,
}

impl ProductRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims every code for `holder`, or claims nothing at all.
    ///
    /// The full decision runs under a single lock acquisition, so a
    /// concurrent claimer can never observe a half-claimed request and there
    /// is no window between checking a code and recording it. Codes already
    /// held by `holder` itself count as claimed, not as conflicts.
    ///
    /// Returns the codes held by a different caller; empty means the claim
    /// succeeded in full.
    pub fn try_claim(&self, codes: &[String], holder: &str) -> Vec<String> {
        let mut in_use = self.lock();

        let conflicts: Vec<String> = codes
            .iter()
            .filter(|code| matches!(in_use.get(*code), Some(current) if current.as_str() != holder))
            .cloned()
            .collect();
        if !conflicts.is_empty() {
            return conflicts;
        }

        for code in codes {
            in_use.insert(code.clone(), holder.to_string());
        }
        Vec::new()
    }

    /// Removes each mapping unconditionally, whoever holds it.
    pub fn release(&self, codes: &[String]) {
        let mut in_use = self.lock();
        for code in codes {
            in_use.remove(code);
        }
    }

    pub fn contains(&self, code: &str) -> bool {
        self.lock().contains_key(code)
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.in_use.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Releases the guarded codes when dropped, so every exit path of a request
/// releases exactly once.
pub struct ClaimGuard {
    registry: Arc<ProductRegistry>,
    codes: Vec<String>,
}

impl ClaimGuard {
    pub fn new(registry: Arc<ProductRegistry>, codes: Vec<String>) -> Self {
        Self { registry, codes }
    }
}

impl Drop for ClaimGuard {
    fn drop(&mut self) {
        self.registry.release(&self.codes);
    }
}
