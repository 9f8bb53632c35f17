//! Submission Guard: at most one in-flight submission per key
//!
//! Keys are payment ids for mediated payments and recipient addresses for
//! direct transfers. Acquisition is an atomic compare-and-insert on a
//! [`DashMap`] entry, so two tasks racing on the same key resolve without a
//! lock around the whole submission. Holding a permit conveys no ordering
//! or priority, only exclusion.
//!
//! Each claim carries a token, and a permit only releases the claim it
//! made: a stale permit surviving `clear()` cannot void a claim someone
//! else has since taken on the same key.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// In-flight submission set
#[derive(Default)]
pub struct SubmissionGuard {
    in_flight: Arc<DashMap<String, u64>>,
    next_token: AtomicU64,
}

impl SubmissionGuard {
    /// Create an empty guard
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to claim `key`. Returns a release-on-drop permit, or `None` if a
    /// submission for this key is already in flight.
    pub fn acquire(&self, key: &str) -> Option<SubmissionPermit> {
        match self.in_flight.entry(key.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => None,
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                let token = self.next_token.fetch_add(1, Ordering::Relaxed);
                entry.insert(token);
                Some(SubmissionPermit {
                    in_flight: Arc::clone(&self.in_flight),
                    key: key.to_string(),
                    token,
                })
            }
        }
    }

    /// Release `key` unconditionally. Idempotent; safe for keys that were
    /// never acquired. Prefer letting the permit drop.
    pub fn release(&self, key: &str) {
        self.in_flight.remove(key);
    }

    /// Whether a submission for `key` is currently in flight
    pub fn is_in_flight(&self, key: &str) -> bool {
        self.in_flight.contains_key(key)
    }

    /// Number of keys currently claimed
    pub fn len(&self) -> usize {
        self.in_flight.len()
    }

    /// Whether no submission is in flight
    pub fn is_empty(&self) -> bool {
        self.in_flight.is_empty()
    }

    /// Drop every claim (session reset; outstanding permits become no-ops)
    pub fn clear(&self) {
        self.in_flight.clear();
    }
}

/// Exclusive claim on a submission key, released when dropped.
///
/// Tying release to `Drop` means every exit path out of a submission, the
/// `?` operator included, gives the key back. The drop releases only this
/// permit's own claim, identified by its token.
pub struct SubmissionPermit {
    in_flight: Arc<DashMap<String, u64>>,
    key: String,
    token: u64,
}

impl SubmissionPermit {
    /// The claimed key
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for SubmissionPermit {
    fn drop(&mut self) {
        self.in_flight
            .remove_if(&self.key, |_, &token| token == self.token);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_and_release_on_drop() {
        let guard = SubmissionGuard::new();

        let permit = guard.acquire("pay_0000000001000").unwrap();
        assert_eq!(permit.key(), "pay_0000000001000");
        assert!(guard.is_in_flight("pay_0000000001000"));
        assert!(guard.acquire("pay_0000000001000").is_none());

        drop(permit);
        assert!(!guard.is_in_flight("pay_0000000001000"));
        assert!(guard.acquire("pay_0000000001000").is_some());
    }

    #[test]
    fn test_release_is_idempotent() {
        let guard = SubmissionGuard::new();
        // Never acquired: still safe
        guard.release("pay_0000000001000");

        let permit = guard.acquire("pay_0000000001000").unwrap();
        guard.release("pay_0000000001000");
        guard.release("pay_0000000001000");
        assert!(!guard.is_in_flight("pay_0000000001000"));
        drop(permit);
    }

    #[test]
    fn test_independent_keys() {
        let guard = SubmissionGuard::new();
        let _a = guard.acquire("pay_0000000001000").unwrap();
        let _b = guard.acquire("pay_0000000002000").unwrap();
        assert_eq!(guard.len(), 2);
    }

    #[test]
    fn test_clear_resets_claims() {
        let guard = SubmissionGuard::new();
        let permit = guard.acquire("pay_0000000001000").unwrap();
        guard.clear();
        assert!(guard.is_empty());

        // The stale permit releases nothing and the key is claimable again
        drop(permit);
        assert!(guard.acquire("pay_0000000001000").is_some());
    }

    #[test]
    fn test_stale_permit_cannot_void_a_newer_claim() {
        let guard = SubmissionGuard::new();
        let stale = guard.acquire("pay_0000000001000").unwrap();
        guard.clear();

        // Someone else claims the key after the reset
        let live = guard.acquire("pay_0000000001000").unwrap();
        drop(stale);
        assert!(guard.is_in_flight("pay_0000000001000"));
        assert!(guard.acquire("pay_0000000001000").is_none());

        drop(live);
        assert!(!guard.is_in_flight("pay_0000000001000"));
    }

    #[test]
    fn test_concurrent_acquire_admits_exactly_one() {
        let guard = Arc::new(SubmissionGuard::new());
        let mut handles = Vec::new();
        for _ in 0..16 {
            let guard = Arc::clone(&guard);
            handles.push(std::thread::spawn(move || {
                // Hold the permit until all threads have raced
                guard.acquire("pay_0000000001000")
            }));
        }
        let permits: Vec<_> = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .collect();
        assert_eq!(permits.iter().filter(|p| p.is_some()).count(), 1);
    }
}
