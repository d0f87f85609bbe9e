//! Pending-write ledger for side-effecting GitHub calls.
//!
//! A create is marked before the request is sent. The mark is cleared only
//! when the outcome is known. If the call is cancelled, times out after
//! sending, or otherwise ends without a definite answer, the mark stays and
//! the next identical create is told that a duplicate is possible.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

/// Identity of one side-effecting request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WriteKey {
    pub operation: &'static str,
    pub owner: String,
    pub repo: String,
    pub subject: String,
}

impl WriteKey {
    pub fn new(
        operation: &'static str,
        owner: impl Into<String>,
        repo: impl Into<String>,
        subject: impl Into<String>,
    ) -> Self {
        Self {
            operation,
            owner: owner.into(),
            repo: repo.into(),
            subject: subject.into(),
        }
    }
}

impl std::fmt::Display for WriteKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} in {}/{} ('{}')",
            self.operation, self.owner, self.repo, self.subject
        )
    }
}

#[derive(Debug, Default)]
pub struct PendingWrites {
    marks: Mutex<HashSet<WriteKey>>,
}

impl PendingWrites {
    pub fn new() -> Self {
        Self::default()
    }

    fn marks(&self) -> MutexGuard<'_, HashSet<WriteKey>> {
        // The set stays consistent even if a holder panicked.
        self.marks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn is_marked(&self, key: &WriteKey) -> bool {
        self.marks().contains(key)
    }

    pub fn len(&self) -> usize {
        self.marks().len()
    }

    pub fn is_empty(&self) -> bool {
        self.marks().is_empty()
    }

    /// Mark `key` and return the guard that owns the mark.
    pub fn begin(self: &Arc<Self>, key: WriteKey) -> PendingGuard {
        self.marks().insert(key.clone());
        self.guard(key)
    }

    /// Check for an existing mark and take one under a single lock.
    ///
    /// An existing mark refuses the write unless `acknowledged` is set, in
    /// which case the caller takes over the mark.
    pub fn try_begin(
        self: &Arc<Self>,
        key: WriteKey,
        acknowledged: bool,
    ) -> Result<PendingGuard, PossibleDuplicate> {
        let fresh = self.marks().insert(key.clone());
        if !fresh {
            if !acknowledged {
                tracing::warn!(write = %key, "refusing possible duplicate write");
                return Err(PossibleDuplicate(key));
            }
            tracing::warn!(write = %key, "resending write despite unknown earlier outcome");
        }
        Ok(self.guard(key))
    }

    fn guard(self: &Arc<Self>, key: WriteKey) -> PendingGuard {
        PendingGuard {
            ledger: Arc::clone(self),
            key: Some(key),
        }
    }
}

/// An identical write is marked and was not acknowledged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PossibleDuplicate(pub WriteKey);

impl std::fmt::Display for PossibleDuplicate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "an earlier {} may already have been applied or is still in flight; check the \
             repository, then call again with acknowledge_possible_duplicate: true to send it anyway",
            self.0
        )
    }
}

/// Owns one mark until the outcome is known.
///
/// Dropping the guard without calling [`settle`](Self::settle) or
/// [`keep`](Self::keep) leaves the mark in place.
#[must_use = "an unsettled guard leaves the write marked as ambiguous"]
pub struct PendingGuard {
    ledger: Arc<PendingWrites>,
    key: Option<WriteKey>,
}

impl PendingGuard {
    /// The outcome is known; clear the mark.
    pub fn settle(mut self) {
        if let Some(key) = self.key.take() {
            self.ledger.marks().remove(&key);
        }
    }

    /// The outcome is unknown; keep the mark.
    pub fn keep(mut self) {
        if let Some(key) = self.key.take() {
            tracing::warn!(write = %key, "write outcome unknown, keeping pending mark");
        }
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            tracing::warn!(write = %key, "write abandoned before completion, keeping pending mark");
        }
    }
}
