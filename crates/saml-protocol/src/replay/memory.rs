//! In-process replay store.

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, warn};

use super::{ConsumedResponseRecord, PendingRequest, ReplayStore, SweepOutcome};
use crate::error::{SamlError, SamlResult};

/// [`ReplayStore`] on two `DashMap`s.
///
/// Every check-and-mutate runs under the shard lock of its key.
#[derive(Debug, Default)]
pub struct InMemoryReplayStore {
    pending: DashMap<String, PendingRequest>,
    consumed: DashMap<String, ConsumedResponseRecord>,
}

impl InMemoryReplayStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of pending requests, expired ones included.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Number of consumed-response records, expired ones included.
    #[must_use]
    pub fn consumed_len(&self) -> usize {
        self.consumed.len()
    }
}

impl ReplayStore for InMemoryReplayStore {
    fn store_pending(&self, request: PendingRequest) -> SamlResult<()> {
        match self.pending.entry(request.request_id.clone()) {
            Entry::Occupied(_) => Err(SamlError::Internal(format!(
                "request {} is already pending",
                request.request_id
            ))),
            Entry::Vacant(slot) => {
                debug!(request_id = %request.request_id, idp = %request.idp_entity_id, "pending request stored");
                slot.insert(request);
                Ok(())
            }
        }
    }

    fn consume_pending(&self, request_id: &str, now: DateTime<Utc>) -> SamlResult<PendingRequest> {
        self.pending
            .remove_if(request_id, |_, pending| !pending.is_expired(now))
            .map(|(_, pending)| pending)
            .ok_or_else(|| {
                SamlError::UnsolicitedResponse(format!(
                    "InResponseTo {request_id} matches no outstanding request"
                ))
            })
    }

    fn is_pending(&self, request_id: &str, now: DateTime<Utc>) -> bool {
        self.pending
            .get(request_id)
            .is_some_and(|pending| !pending.is_expired(now))
    }

    fn record_consumed(&self, record: ConsumedResponseRecord) -> SamlResult<()> {
        match self.consumed.entry(record.response_id.clone()) {
            Entry::Occupied(mut slot) => {
                if !slot.get().is_expired(record.consumed_at) {
                    warn!(response_id = %record.response_id, "response replayed");
                    return Err(SamlError::ReplayedResponse(record.response_id));
                }
                slot.insert(record);
            }
            Entry::Vacant(slot) => {
                slot.insert(record);
            }
        }
        Ok(())
    }

    fn sweep(&self, now: DateTime<Utc>) -> SweepOutcome {
        let (pending_before, consumed_before) = (self.pending.len(), self.consumed.len());
        self.pending.retain(|_, pending| !pending.is_expired(now));
        self.consumed.retain(|_, record| !record.is_expired(now));
        let outcome = SweepOutcome {
            pending: pending_before.saturating_sub(self.pending.len()),
            consumed: consumed_before.saturating_sub(self.consumed.len()),
        };
        if outcome != SweepOutcome::default() {
            debug!(pending = outcome.pending, consumed = outcome.consumed, "replay store swept");
        }
        outcome
    }
}
