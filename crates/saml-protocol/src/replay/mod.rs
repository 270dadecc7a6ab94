//! Request correlation and replay defence.
//!
//! The SP records each AuthnRequest it sends as a [`PendingRequest`] and
//! each Response it accepts as a [`ConsumedResponseRecord`]. Both checks
//! are single atomic operations per key, so two threads racing on the
//! same id cannot both succeed.

mod memory;

pub use memory::InMemoryReplayStore;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SamlResult;

/// An AuthnRequest that awaits its Response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingRequest {
    /// The request ID; expected as `InResponseTo`.
    pub request_id: String,
    /// The IdP the request was sent to.
    pub idp_entity_id: String,
    /// When the request was created.
    pub created_at: DateTime<Utc>,
    /// When the request stops being answerable.
    pub expires_at: DateTime<Utc>,
    /// RelayState sent with the request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relay_state: Option<String>,
}

impl PendingRequest {
    /// Creates a record that expires `lifetime` after `created_at`.
    #[must_use]
    pub fn new(
        request_id: impl Into<String>,
        idp_entity_id: impl Into<String>,
        created_at: DateTime<Utc>,
        lifetime: Duration,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            idp_entity_id: idp_entity_id.into(),
            created_at,
            expires_at: created_at + lifetime,
            relay_state: None,
        }
    }

    /// Attaches the RelayState sent alongside the request.
    #[must_use]
    pub fn with_relay_state(mut self, relay_state: Option<String>) -> Self {
        self.relay_state = relay_state;
        self
    }

    /// Returns true once `now` reaches `expires_at`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// A Response ID that has been accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumedResponseRecord {
    /// The Response ID.
    pub response_id: String,
    /// When it was accepted.
    pub consumed_at: DateTime<Utc>,
    /// Until when a second copy must be refused: the latest
    /// `NotOnOrAfter` of its assertions.
    pub retain_until: DateTime<Utc>,
}

impl ConsumedResponseRecord {
    /// Creates a record.
    #[must_use]
    pub fn new(
        response_id: impl Into<String>,
        consumed_at: DateTime<Utc>,
        retain_until: DateTime<Utc>,
    ) -> Self {
        Self {
            response_id: response_id.into(),
            consumed_at,
            retain_until,
        }
    }

    /// Returns true once the record may be dropped.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.retain_until
    }
}

/// Entries removed by one [`ReplayStore::sweep`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepOutcome {
    /// Expired pending requests removed.
    pub pending: usize,
    /// Expired consumed-response records removed.
    pub consumed: usize,
}

/// Shared store behind the SP engine.
///
/// Implementations must be `Send + Sync`; every method takes `&self`.
///
/// # Atomicity
///
/// `consume_pending` and `record_consumed` must each check and mutate as
/// one operation. `sweep` must only remove entries that are expired at the
/// moment of removal.
pub trait ReplayStore: Send + Sync {
    /// Records an outstanding request.
    ///
    /// # Errors
    ///
    /// Returns `Internal` if the request ID is already pending.
    fn store_pending(&self, request: PendingRequest) -> SamlResult<()>;

    /// Removes and returns the unexpired pending request `request_id`.
    ///
    /// # Errors
    ///
    /// Returns `UnsolicitedResponse` if it is unknown, already consumed or
    /// expired.
    fn consume_pending(&self, request_id: &str, now: DateTime<Utc>) -> SamlResult<PendingRequest>;

    /// Returns true if `request_id` is pending and unexpired.
    fn is_pending(&self, request_id: &str, now: DateTime<Utc>) -> bool;

    /// Records an accepted response.
    ///
    /// # Errors
    ///
    /// Returns `ReplayedResponse` if an unexpired record with the same
    /// response ID exists.
    fn record_consumed(&self, record: ConsumedResponseRecord) -> SamlResult<()>;

    /// Drops every entry expired at `now`.
    fn sweep(&self, now: DateTime<Utc>) -> SweepOutcome;
}
