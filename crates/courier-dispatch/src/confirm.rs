//! The confirmation ledger.
//!
//! Requests the policy guard marks `RequireConfirmation` park here, holding
//! a oneshot the operator's verdict travels down. Entries live only in
//! memory; a restart drops every pending confirmation, and the suspended
//! calls fail with their channel closed.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::oneshot;

use courier_core::RequestId;

/// A confirmation awaiting an operator verdict.
#[derive(Debug, Clone)]
pub struct PendingConfirmation {
    /// The suspended request.
    pub id: RequestId,
    /// Operation name, so the operator knows what they are approving.
    pub operation: String,
    /// When the request parked.
    pub requested_at: DateTime<Utc>,
}

struct Entry {
    operation: String,
    requested_at: DateTime<Utc>,
    verdict: oneshot::Sender<bool>,
}

/// In-memory registry of suspended requests.
#[derive(Default)]
pub struct ConfirmationLedger {
    entries: DashMap<RequestId, Entry>,
}

impl ConfirmationLedger {
    /// An empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Park a request; the returned receiver yields the operator's verdict.
    ///
    /// A second `begin` for the same id replaces the first entry, whose
    /// receiver then observes a closed channel.
    #[must_use]
    pub fn begin(&self, id: RequestId, operation: &str) -> oneshot::Receiver<bool> {
        let (tx, rx) = oneshot::channel();
        self.entries.insert(
            id,
            Entry {
                operation: operation.to_string(),
                requested_at: Utc::now(),
                verdict: tx,
            },
        );
        rx
    }

    /// Deliver the operator's verdict for a parked request.
    ///
    /// Returns `false` when no such request is pending (unknown id, already
    /// resolved, or cancelled).
    pub fn resolve(&self, id: &RequestId, approved: bool) -> bool {
        match self.entries.remove(id) {
            Some((_, entry)) => entry.verdict.send(approved).is_ok(),
            None => false,
        }
    }

    /// Drop a parked request without a verdict (cancellation path).
    pub fn forget(&self, id: &RequestId) {
        self.entries.remove(id);
    }

    /// Snapshot of everything currently awaiting confirmation.
    #[must_use]
    pub fn pending(&self) -> Vec<PendingConfirmation> {
        self.entries
            .iter()
            .map(|entry| PendingConfirmation {
                id: entry.key().clone(),
                operation: entry.value().operation.clone(),
                requested_at: entry.value().requested_at,
            })
            .collect()
    }

    /// Number of parked requests.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is parked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for ConfirmationLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfirmationLedger")
            .field("pending", &self.entries.len())
            .finish()
    }
}
